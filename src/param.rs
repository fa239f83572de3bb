// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 `pyspeed` 引擎遵循的 HTTP/1.x 协议相关常量和数据结构，包括：
//! - HTTP 状态码及其原因短语（Reason Phrase）。
//! - 静态文件服务使用的 MIME 类型映射表。
//! - HTTP 方法、版本及内容编码的强类型枚举。

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "PySpeed/1.0";

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// 单个请求允许携带的最大头部字段数量
pub const MAX_HEADERS: usize = 100;

/// 目录请求默认返回的文件
pub const INDEX_FILE: &str = "index.html";

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 1xx
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");

        // 2xx
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        // 3xx
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        // 4xx
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(411, "Length Required");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(416, "Range Not Satisfiable");
        map.insert(422, "Unprocessable Content");
        map.insert(429, "Too Many Requests");
        map.insert(431, "Request Header Fields Too Large");

        // 5xx
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表，用于设置静态文件响应的 `Content-Type`。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("html", "text/html;charset=utf-8");
        map.insert("htm", "text/html;charset=utf-8");
        map.insert("css", "text/css;charset=utf-8");
        map.insert("js", "text/javascript;charset=utf-8");
        map.insert("mjs", "text/javascript;charset=utf-8");
        map.insert("json", "application/json");
        map.insert("xml", "application/xml");
        map.insert("txt", "text/plain;charset=utf-8");
        map.insert("csv", "text/csv");
        map.insert("md", "text/markdown;charset=utf-8");
        map.insert("svg", "image/svg+xml");
        map.insert("png", "image/png");
        map.insert("jpg", "image/jpeg");
        map.insert("jpeg", "image/jpeg");
        map.insert("gif", "image/gif");
        map.insert("webp", "image/webp");
        map.insert("avif", "image/avif");
        map.insert("ico", "image/x-icon");
        map.insert("bmp", "image/bmp");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("ttf", "font/ttf");
        map.insert("otf", "font/otf");
        map.insert("mp3", "audio/mpeg");
        map.insert("wav", "audio/wav");
        map.insert("mp4", "video/mp4");
        map.insert("webm", "video/webm");
        map.insert("pdf", "application/pdf");
        map.insert("zip", "application/zip");
        map.insert("gz", "application/gzip");
        map.insert("tar", "application/x-tar");
        map.insert("7z", "application/x-7z-compressed");
        map.insert("wasm", "application/wasm");
        map
    };
}

/// 兜底的 MIME 类型（无法识别后缀的二进制流）
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    /// HTTP/1.0：默认短连接
    V1_0,
    /// HTTP/1.1：默认长连接
    V1_1,
}

/// HTTP 请求方法
///
/// 标准方法之外的合法 token 被保留为 `Extension`，由连接层回复 501。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Trace,
    Connect,
    Extension(String),
}

impl HttpRequestMethod {
    /// 不区分大小写地解析方法名。
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "DELETE" => HttpRequestMethod::Delete,
            "PATCH" => HttpRequestMethod::Patch,
            "OPTIONS" => HttpRequestMethod::Options,
            "TRACE" => HttpRequestMethod::Trace,
            "CONNECT" => HttpRequestMethod::Connect,
            other => HttpRequestMethod::Extension(other.to_string()),
        }
    }

    pub fn is_extension(&self) -> bool {
        matches!(self, HttpRequestMethod::Extension(_))
    }
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// zlib 压缩
    Deflate,
    /// Brotli 压缩
    Br,
}

impl HttpEncoding {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(HttpEncoding::Gzip),
            "deflate" => Some(HttpEncoding::Deflate),
            "br" => Some(HttpEncoding::Br),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Patch => write!(f, "PATCH"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Trace => write!(f, "TRACE"),
            HttpRequestMethod::Connect => write!(f, "CONNECT"),
            HttpRequestMethod::Extension(token) => write!(f, "{}", token),
        }
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}

/// 状态码对应的原因短语，未登记的状态码按类别给出兜底短语。
pub fn reason_phrase(code: u16) -> &'static str {
    match STATUS_CODES.get(&code) {
        Some(reason) => reason,
        None => match code / 100 {
            1 => "Informational",
            2 => "Success",
            3 => "Redirection",
            4 => "Client Error",
            _ => "Server Error",
        },
    }
}

/// RFC 9110 token 字符，用于方法名与头部名。
pub fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_case_insensitive() {
        assert_eq!(HttpRequestMethod::from_token("get"), HttpRequestMethod::Get);
        assert_eq!(HttpRequestMethod::from_token("Post"), HttpRequestMethod::Post);
        assert_eq!(
            HttpRequestMethod::from_token("PATCH").to_string(),
            "PATCH"
        );
    }

    #[test]
    fn test_extension_method() {
        let method = HttpRequestMethod::from_token("BREW");
        assert!(method.is_extension());
        assert_eq!(method.to_string(), "BREW");
    }

    #[test]
    fn test_encoding_tokens() {
        assert_eq!(HttpEncoding::from_token(" gzip"), Some(HttpEncoding::Gzip));
        assert_eq!(HttpEncoding::from_token("BR"), Some(HttpEncoding::Br));
        assert_eq!(HttpEncoding::from_token("identity"), None);
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(413), "Content Too Large");
        assert_eq!(reason_phrase(431), "Request Header Fields Too Large");
        assert_eq!(reason_phrase(299), "Success");
        assert_eq!(reason_phrase(599), "Server Error");
    }

    #[test]
    fn test_is_tchar() {
        assert!(b"X-Request-Id".iter().all(|&b| is_tchar(b)));
        assert!(!is_tchar(b' '));
        assert!(!is_tchar(b':'));
        assert!(!is_tchar(b'\r'));
    }

    #[test]
    fn test_version_display() {
        assert_eq!(HttpVersion::V1_0.to_string(), "HTTP/1.0");
        assert_eq!(HttpVersion::V1_1.to_string(), "HTTP/1.1");
    }
}
