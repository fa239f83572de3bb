// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应与响应构建器
//!
//! `Response` 由处理器或静态文件服务创建，`ResponseBuilder::build` 把它序列化为
//! 线上字节：状态行、按插入顺序排列的头部、可选压缩后的正文。大文件正文不进入
//! 缓冲区，由连接层在写出头部后分块发送。

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::{BufMut, Bytes};
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, warn};

use crate::{
    buffer_pool::{BufferPool, PooledBuffer},
    config::ServerConfig,
    json::{JsonObject, JsonValue},
    logging::LogHandle,
    param::{is_tchar, reason_phrase, HttpEncoding, HttpRequestMethod, CRLF, SERVER_NAME},
    request::Request,
    stats::Stats,
    util::{http_date, HtmlBuilder},
};

const HTML_CONTENT_TYPE: &str = "text/html;charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain;charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// 磁盘上的一段文件，由连接层流式发送。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBody {
    pub path: PathBuf,
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Full(Bytes),
    File(FileBody),
}

/// `set_cookie` 的可选属性
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<u64>,
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: Body::Empty,
        }
    }

    pub fn with_body(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Type", content_type);
        response.body = Body::Full(body.into());
        response
    }

    pub fn json(status: u16, value: &JsonValue) -> Self {
        Self::with_body(status, JSON_CONTENT_TYPE, value.to_json())
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self::with_body(status, TEXT_CONTENT_TYPE, text.into())
    }

    pub fn html(status: u16, html: impl Into<String>) -> Self {
        Self::with_body(status, HTML_CONTENT_TYPE, html.into())
    }

    /// 错误页。客户端接受 JSON 时返回 `{"error": ..., "status": ...}`，否则返回 HTML。
    pub fn error(status: u16, note: Option<&str>, as_json: bool) -> Self {
        if as_json {
            let mut object = JsonObject::new();
            object.insert("error", JsonValue::from(note.unwrap_or(reason_phrase(status))));
            object.insert("status", JsonValue::from(status as i64));
            return Self::json(status, &JsonValue::from(object));
        }
        Self::html(status, HtmlBuilder::from_status_code(status, note).build())
    }

    pub fn redirect(location: &str, permanent: bool) -> Self {
        let status = if permanent { 301 } else { 302 };
        let mut response = Self::new(status);
        response.set_header("Location", location);
        response
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// 不区分大小写地查找第一个同名头部。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// 设置头部。已存在时在原位置替换值并移除其余同名项。
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.headers[index].1 = value;
                let mut i = 0;
                self.headers.retain(|(n, _)| {
                    let keep = i <= index || !n.eq_ignore_ascii_case(name);
                    i += 1;
                    keep
                });
            }
            None => self.headers.push((name.to_string(), value)),
        }
        self
    }

    /// 追加头部，允许重复（如 `Set-Cookie`）。
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, options: &CookieOptions) -> &mut Self {
        let mut cookie = format!("{}={}", name, value);
        if let Some(path) = &options.path {
            cookie.push_str(&format!("; Path={}", path));
        }
        if let Some(domain) = &options.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }
        if let Some(max_age) = options.max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age));
        }
        if options.secure {
            cookie.push_str("; Secure");
        }
        if options.http_only {
            cookie.push_str("; HttpOnly");
        }
        self.append_header("Set-Cookie", cookie)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = Body::Full(body.into());
        self
    }

    pub fn set_file_body(&mut self, file: FileBody) -> &mut Self {
        self.body = Body::File(file);
        self
    }

    pub fn clear_body(&mut self) -> &mut Self {
        self.body = Body::Empty;
        self
    }

    fn has_header_token(&self, name: &str, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }
}

/// 构建响应所需的请求侧信息。
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    pub id: u64,
    pub head_only: bool,
    pub accept_encoding: Vec<HttpEncoding>,
    pub keep_alive: bool,
}

impl ExchangeContext {
    pub fn from_request(request: &Request, keep_alive: bool) -> Self {
        Self {
            id: request.id(),
            head_only: *request.method() == HttpRequestMethod::Head,
            accept_encoding: request.accept_encoding(),
            keep_alive,
        }
    }

    /// 请求未能解析时使用：不压缩，响应后关闭连接。
    pub fn fallback(id: u64) -> Self {
        Self {
            id,
            head_only: false,
            accept_encoding: vec![],
            keep_alive: false,
        }
    }
}

/// 序列化后的响应。`wire` 包含状态行、头部和内存中的正文。
#[derive(Debug)]
pub struct WireResponse {
    pub status: u16,
    pub wire: PooledBuffer,
    pub file: Option<FileBody>,
    pub keep_alive: bool,
}

impl WireResponse {
    pub fn total_len(&self) -> u64 {
        self.wire.len() as u64 + self.file.as_ref().map_or(0, |f| f.len)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8], encoding: HttpEncoding) -> io::Result<Vec<u8>>;
}

/// flate2 与 brotli 实现的压缩器
pub struct StandardCompressor;

impl Compressor for StandardCompressor {
    fn compress(&self, data: &[u8], encoding: HttpEncoding) -> io::Result<Vec<u8>> {
        compress(data, encoding)
    }
}

pub struct ResponseBuilder {
    pool: Arc<BufferPool>,
    stats: Arc<Stats>,
    log: LogHandle,
    enable_compression: bool,
    compression_threshold: usize,
    compressor: Box<dyn Compressor>,
}

impl ResponseBuilder {
    pub fn new(
        config: &ServerConfig,
        pool: Arc<BufferPool>,
        stats: Arc<Stats>,
        log: LogHandle,
    ) -> Self {
        Self {
            pool,
            stats,
            log,
            enable_compression: config.enable_compression,
            compression_threshold: config.compression_threshold,
            compressor: Box::new(StandardCompressor),
        }
    }

    pub fn with_compressor(mut self, compressor: Box<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn build(&self, mut response: Response, ctx: &ExchangeContext) -> WireResponse {
        let start = Instant::now();
        let id = ctx.id;
        let status = response.status;

        if response.header("Server").is_none() {
            response.set_header("Server", SERVER_NAME);
        }
        if response.header("Date").is_none() {
            response.set_header("Date", http_date(SystemTime::now()));
        }

        self.sanitize_headers(&mut response, id);
        // HEAD 也走压缩，保证头部与同一 GET 一致
        self.maybe_compress(&mut response, ctx);

        let bodyless_status = status < 200 || status == 204 || status == 304;
        if bodyless_status {
            response.remove_header("Content-Length");
            response.body = Body::Empty;
        } else {
            let body_len = match &response.body {
                Body::Full(bytes) => Some(bytes.len() as u64),
                Body::File(file) => Some(file.len),
                Body::Empty => None,
            };
            match body_len {
                Some(len) => {
                    response.set_header("Content-Length", len.to_string());
                }
                // 只有 HEAD 可以声明长度而不带正文
                None if ctx.head_only && response.header("Content-Length").is_some() => {}
                None => {
                    response.set_header("Content-Length", "0");
                }
            }
        }

        let keep_alive = ctx.keep_alive && !response.has_header_token("Connection", "close");
        response.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });

        let mut wire = self.pool.acquire();
        wire.put_slice(b"HTTP/1.1 ");
        wire.put_slice(status.to_string().as_bytes());
        wire.put_u8(b' ');
        wire.put_slice(reason_phrase(status).as_bytes());
        wire.put_slice(CRLF.as_bytes());
        for (name, value) in &response.headers {
            wire.put_slice(name.as_bytes());
            wire.put_slice(b": ");
            wire.put_slice(value.as_bytes());
            wire.put_slice(CRLF.as_bytes());
        }
        wire.put_slice(CRLF.as_bytes());

        let file = if ctx.head_only {
            None
        } else {
            match response.body {
                Body::Full(bytes) => {
                    wire.put_slice(&bytes);
                    None
                }
                Body::File(file) => Some(file),
                Body::Empty => None,
            }
        };

        let elapsed = start.elapsed();
        self.stats.record_build_time(elapsed);
        debug!(
            target: self.log.target(),
            "[ID{}]响应构建完成: {} {}，头部与正文 {} bytes，耗时 {:?}",
            id,
            status,
            reason_phrase(status),
            wire.len(),
            elapsed
        );

        WireResponse {
            status,
            wire,
            file,
            keep_alive,
        }
    }

    /// 丢弃名称不是 token 的头部，去掉值中的 CR、LF 与 NUL，防止响应拆分。
    fn sanitize_headers(&self, response: &mut Response, id: u64) {
        let log = &self.log;
        response.headers.retain_mut(|(name, value)| {
            if name.is_empty() || !name.bytes().all(is_tchar) {
                warn!(target: log.target(), "[ID{}]非法响应头名称 {:?}，已丢弃", id, name);
                return false;
            }
            if value.contains(|c: char| matches!(c, '\r' | '\n' | '\0')) {
                warn!(target: log.target(), "[ID{}]响应头 {} 含控制字符，已移除", id, name);
                value.retain(|c| !matches!(c, '\r' | '\n' | '\0'));
            }
            true
        });
    }

    fn maybe_compress(&self, response: &mut Response, ctx: &ExchangeContext) {
        if !self.enable_compression
            || response.header("Content-Encoding").is_some()
            || response.header("Content-Range").is_some()
        {
            return;
        }
        let data = match &response.body {
            Body::Full(bytes) if bytes.len() >= self.compression_threshold => bytes.clone(),
            _ => return,
        };
        if response
            .header("Content-Type")
            .map_or(false, should_skip_compression)
        {
            debug!(target: self.log.target(), "[ID{}]内容类型已压缩，跳过压缩", ctx.id);
            return;
        }
        let encoding = match decide_encoding(&ctx.accept_encoding) {
            Some(e) => e,
            None => return,
        };
        match self.compressor.compress(&data, encoding) {
            Ok(compressed) => {
                debug!(
                    target: self.log.target(),
                    "[ID{}]{} 压缩: {} bytes -> {} bytes",
                    ctx.id,
                    encoding,
                    data.len(),
                    compressed.len()
                );
                response.body = Body::Full(Bytes::from(compressed));
                response.set_header("Content-Encoding", encoding.to_string());
                if !response.has_header_token("Vary", "Accept-Encoding") {
                    response.append_header("Vary", "Accept-Encoding");
                }
                self.stats.record_compressed();
            }
            Err(e) => {
                warn!(
                    target: self.log.target(),
                    "[ID{}]{} 压缩失败: {}，返回未压缩内容",
                    ctx.id,
                    encoding,
                    e
                );
            }
        }
    }
}

pub fn compress(data: &[u8], encoding: HttpEncoding) -> io::Result<Vec<u8>> {
    match encoding {
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        HttpEncoding::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        HttpEncoding::Br => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
    }
}

// 已经压缩过的格式不再压缩
fn should_skip_compression(content_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "image/bmp",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/gzip",
        "application/x-7z-compressed",
        "font/woff",
        "font/woff2",
    ];
    let content_type = content_type.trim().to_ascii_lowercase();
    skip_types
        .iter()
        .any(|skip_type| content_type.starts_with(skip_type))
}

// gzip 优先，其次 deflate，最后 br
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    [HttpEncoding::Gzip, HttpEncoding::Deflate, HttpEncoding::Br]
        .into_iter()
        .find(|e| accept_encoding.contains(e))
}
