// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求处理器
//!
//! 嵌入方通过 `Server::set_request_handler` 注册一个 `RequestHandler`。
//! 处理器在阻塞线程池中被同步调用，每个请求调用一次。
//!
//! 适配方式在注册时显式选定：普通闭包直接实现 `RequestHandler`，
//! 只处理 JSON 的应用可以包一层 `JsonHandler`。

use crate::{
    exception::HandlerError,
    json::JsonValue,
    request::Request,
    response::Response,
};

#[cfg_attr(test, mockall::automock)]
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &Request) -> Result<Response, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&Request) -> Result<Response, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        self(request)
    }
}

/// JSON 进、JSON 出的适配器。
///
/// 请求体不是合法 JSON 时直接返回 400，不调用内部函数；空请求体按 `null` 处理。
pub struct JsonHandler<F> {
    inner: F,
}

impl<F> JsonHandler<F>
where
    F: Fn(&Request, JsonValue) -> Result<(u16, JsonValue), HandlerError> + Send + Sync,
{
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F> RequestHandler for JsonHandler<F>
where
    F: Fn(&Request, JsonValue) -> Result<(u16, JsonValue), HandlerError> + Send + Sync,
{
    fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        let input = if request.body().is_empty() {
            JsonValue::Null
        } else {
            match request.json() {
                Ok(value) => value,
                Err(e) => return Ok(Response::error(400, Some(&e.to_string()), true)),
            }
        };
        let (status, output) = (self.inner)(request, input)?;
        Ok(Response::json(status, &output))
    }
}
