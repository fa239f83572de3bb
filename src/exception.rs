// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了引擎在启动、接收连接、解析请求、处理 JSON 以及调用业务回调时
//! 可能产生的各类错误。
//!
//! ## 设计意图
//! - **错误分类**：协议解析错误、JSON 错误、回调错误、静态文件错误与启动期致命错误互相独立。
//! - **语义映射**：请求级错误都能通过 `status_code()` 转换为对应的 HTTP 状态码。
//! - **隔离**：除 `Bind`、`InvalidConfig`、`Logging` 外，任何错误都只影响单个连接。

use std::{fmt, io};

/// 请求解析失败的具体原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// 请求行不是 `METHOD SP TARGET SP VERSION` 的形式。
    MalformedRequestLine,
    /// 头部字段格式非法，或 `Content-Length` / `Transfer-Encoding` 冲突。
    MalformedHeader,
    /// 请求头总长度或字段数量超出限制。
    HeaderTooLarge,
    /// 请求总大小超出 `max_request_size`。
    BodyTooLarge,
    /// 形如 `HTTP/x.y` 但不是 1.0 或 1.1。
    UnsupportedVersion,
}

impl ParseErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ParseErrorKind::MalformedRequestLine => 400,
            ParseErrorKind::MalformedHeader => 400,
            ParseErrorKind::HeaderTooLarge => 431,
            ParseErrorKind::BodyTooLarge => 413,
            ParseErrorKind::UnsupportedVersion => 505,
        }
    }

    /// 出错的请求能否整体跳过。超限类错误意味着请求边界已经丢失。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ParseErrorKind::MalformedRequestLine
                | ParseErrorKind::MalformedHeader
                | ParseErrorKind::UnsupportedVersion
        )
    }
}

/// 请求解析错误，携带失败原因与出错时已消费的字节偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self.kind {
            ParseErrorKind::MalformedRequestLine => "Malformed request line",
            ParseErrorKind::MalformedHeader => "Malformed header field",
            ParseErrorKind::HeaderTooLarge => "Request header too large",
            ParseErrorKind::BodyTooLarge => "Request body too large",
            ParseErrorKind::UnsupportedVersion => "Unsupported HTTP version",
        };
        write!(f, "{} (at byte {})", description, self.offset)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonErrorKind {
    Syntax,
    DepthExceeded,
}

/// JSON 解析错误。`offset` 为输入中出错位置的字节下标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonError {
    pub kind: JsonErrorKind,
    pub offset: usize,
}

impl JsonError {
    pub fn syntax(offset: usize) -> Self {
        Self {
            kind: JsonErrorKind::Syntax,
            offset,
        }
    }

    pub fn depth_exceeded(offset: usize) -> Self {
        Self {
            kind: JsonErrorKind::DepthExceeded,
            offset,
        }
    }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            JsonErrorKind::Syntax => write!(f, "JSON syntax error at byte {}", self.offset),
            JsonErrorKind::DepthExceeded => {
                write!(f, "JSON nesting too deep at byte {}", self.offset)
            }
        }
    }
}

impl std::error::Error for JsonError {}

/// 业务回调返回的错误。详细信息只写入日志，客户端只会看到通用的 500 页面。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request handler failed: {}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<JsonError> for HandlerError {
    fn from(e: JsonError) -> Self {
        HandlerError::new(e.to_string())
    }
}

/// 引擎内部统一使用的错误类型。
#[derive(Debug)]
pub enum Exception {
    /// 接收连接失败。文件描述符耗尽等可重试，监听套接字失效时由 `run` 返回。
    Accept(io::Error),
    Parse(ParseError),
    Json(JsonError),
    Handler(HandlerError),
    /// 静态路由下找不到请求的文件。对应 `404 Not Found`。
    FileNotFound,
    /// 隐藏文件或被禁止的扩展名。对应 `403 Forbidden`。
    Forbidden,
    /// 请求的路径格式非法或包含目录遍历尝试。对应 `400 Bad Request`。
    InvalidPath,
    /// Range 超出文件大小，携带文件总长度。对应 `416`。
    RangeNotSatisfiable(u64),
    /// 静态路由只接受 GET/HEAD。对应 `405`。
    MethodNotAllowed,
    /// 路由模式格式非法。
    InvalidRoute(String),
    /// 配置值超出合法范围，启动期致命错误。
    InvalidConfig(String),
    /// 监听套接字创建失败，启动期致命错误。
    Bind(io::Error),
    /// 日志系统初始化失败。
    Logging(String),
    Io(io::Error),
}

use Exception::*;

impl Exception {
    /// 将请求级错误映射为 HTTP 状态码，其余错误统一视为 500。
    pub fn status_code(&self) -> u16 {
        match self {
            Parse(e) => e.status_code(),
            Json(_) => 400,
            FileNotFound => 404,
            Forbidden => 403,
            InvalidPath => 400,
            RangeNotSatisfiable(_) => 416,
            MethodNotAllowed => 405,
            Io(e) if e.kind() == io::ErrorKind::NotFound => 404,
            Io(e) if e.kind() == io::ErrorKind::PermissionDenied => 403,
            _ => 500,
        }
    }

    /// 启动期致命错误，出现时服务器不会运行。
    pub fn is_fatal(&self) -> bool {
        matches!(self, InvalidConfig(_) | Bind(_) | Logging(_))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accept(e) => write!(f, "Failed to accept connection: {}", e),
            Parse(e) => write!(f, "{}", e),
            Json(e) => write!(f, "{}", e),
            Handler(e) => write!(f, "{}", e),
            FileNotFound => write!(f, "File not found (404)"),
            Forbidden => write!(f, "Access forbidden (403)"),
            InvalidPath => write!(f, "Invalid path (400)"),
            RangeNotSatisfiable(size) => write!(f, "Range not satisfiable for {} bytes", size),
            MethodNotAllowed => write!(f, "Method not allowed (405)"),
            InvalidRoute(reason) => write!(f, "Invalid route pattern {}", reason),
            InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
            Bind(e) => write!(f, "Failed to bind listening socket: {}", e),
            Logging(reason) => write!(f, "Failed to initialize logging: {}", reason),
            Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Accept(e) | Bind(e) | Io(e) => Some(e),
            Parse(e) => Some(e),
            Json(e) => Some(e),
            Handler(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for Exception {
    fn from(e: ParseError) -> Self {
        Parse(e)
    }
}

impl From<JsonError> for Exception {
    fn from(e: JsonError) -> Self {
        Json(e)
    }
}

impl From<HandlerError> for Exception {
    fn from(e: HandlerError) -> Self {
        Handler(e)
    }
}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Io(e)
    }
}
