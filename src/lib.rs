// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod buffer_pool;
pub mod cache;
pub mod config;
mod connection;
pub mod exception;
pub mod handler;
pub mod json;
pub mod logging;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod static_files;
pub mod stats;
pub mod util;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use cache::FileCache;
pub use config::ServerConfig;
pub use exception::{Exception, HandlerError, JsonError, ParseError};
pub use handler::{JsonHandler, RequestHandler};
pub use json::{JsonAccelerator, JsonObject, JsonValue};
pub use logging::LogHandle;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::{ParseStatus, Request, RequestParser};
pub use response::{Response, ResponseBuilder};
pub use router::{RouteMatch, Router};
pub use server::{RunningServer, Server};
pub use stats::{Stats, StatsSnapshot};
pub use util::HtmlBuilder;
