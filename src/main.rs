// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # PySpeed 服务器
//!
//! 命令行入口：初始化日志、载入配置、注册演示处理器与静态路由，然后启动服务器。
//!
//! - `GET /health`：健康检查
//! - `GET /stats`：运行统计
//! - `POST /echo`：解析并回显 JSON 请求体
//! - `/static/...`：当前目录存在 `static/` 时提供静态文件

use std::{env, io, path::Path, process, sync::Arc};

use log::{error, info, warn};

use pyspeed::{
    exception::HandlerError,
    json::{JsonObject, JsonValue},
    logging, Exception, HttpRequestMethod, JsonAccelerator, LogHandle, Request, Response,
    Server, ServerConfig, Stats,
};

const LOG_CONFIG: &str = "config/log4rs.yaml";
const DEFAULT_CONFIG: &str = "config/development.toml";
const STATIC_DIR: &str = "static";

fn main() {
    if let Err(e) = logging::init(LOG_CONFIG) {
        eprintln!("{}", e);
    }

    let log = LogHandle::default();
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = match ServerConfig::from_toml_file(&config_path, &log.child("config")) {
        Ok(config) => config,
        Err(Exception::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            warn!(target: log.target(), "配置文件 {} 不存在，使用默认配置", config_path);
            ServerConfig::default()
        }
        Err(e) => {
            error!(target: log.target(), "无法载入配置文件 {}: {}", config_path, e);
            process::exit(1);
        }
    };
    let json = JsonAccelerator::new(config.json_max_depth);

    let server = match Server::with_log(config, log.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!(target: log.target(), "{}", e);
            process::exit(1);
        }
    };

    let stats = server.stats();
    server.set_request_handler(move |request: &Request| demo_handler(request, &stats, &json));

    if Path::new(STATIC_DIR).is_dir() {
        server.add_static_route("/static", STATIC_DIR);
        info!(target: log.target(), "静态路由 /static -> {}", STATIC_DIR);
    }

    if let Err(e) = server.run() {
        error!(target: log.target(), "服务器异常退出: {}", e);
        process::exit(1);
    }
}

fn demo_handler(
    request: &Request,
    stats: &Arc<Stats>,
    json: &JsonAccelerator,
) -> Result<Response, HandlerError> {
    match (request.method(), request.path()) {
        (HttpRequestMethod::Get | HttpRequestMethod::Head, "/health") => {
            let mut body = JsonObject::new();
            body.insert("status", JsonValue::from("ok"));
            Ok(Response::json(200, &JsonValue::from(body)))
        }
        (HttpRequestMethod::Get | HttpRequestMethod::Head, "/stats") => {
            let body = serde_json::to_string(&stats.snapshot())
                .map_err(|e| HandlerError::new(e.to_string()))?;
            Ok(Response::with_body(200, "application/json", body))
        }
        (HttpRequestMethod::Post, "/echo") => match json.parse_bytes(request.body()) {
            Ok(value) => Ok(Response::json(200, &value)),
            Err(e) => Ok(Response::error(400, Some(&e.to_string()), true)),
        },
        (_, "/health" | "/stats" | "/echo") => {
            let mut response = Response::error(405, None, request.accepts_json());
            response.set_header("Allow", if request.path() == "/echo" { "POST" } else { "GET, HEAD" });
            Ok(response)
        }
        _ => Ok(Response::error(404, None, request.accepts_json())),
    }
}
