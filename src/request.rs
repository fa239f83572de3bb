// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责将 TCP 流中读取的原始字节解析为 `Request`。它涵盖了：
//! 1. 流式状态机 `RequestParser`：数据不完整时返回 `NeedMoreData`，完整时一次性切出整个请求。
//! 2. 请求行（方法、目标、版本）与头部字段的校验。
//! 3. `Content-Length` 与 `chunked` 两种请求体分帧方式。
//! 4. 查询参数、表单、Cookie、内容协商、Range 等便捷访问器。
//!
//! 解析完成的请求持有一块冻结的 `Bytes`，请求行与头部都以下标区间的形式引用这块内存，
//! 启用零拷贝时请求体也是同一块内存上的切片。

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use log::trace;

use crate::{
    config::ServerConfig,
    exception::{JsonError, ParseError, ParseErrorKind},
    json::{self, JsonValue},
    logging::LogHandle,
    param::*,
    util::form_decode,
};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// 分块编码中单行（块大小或 trailer）允许的最大长度
const MAX_CHUNK_LINE: usize = 4096;

/// `Range` 头部解析结果（只支持单一区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-` 或 `bytes=start-end`
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`，最后 n 个字节
    Suffix(u64),
}

impl ByteRange {
    /// 按文件大小求出闭区间 `[start, end]`，不可满足时返回 `None`。
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match *self {
            ByteRange::From { start, end } => {
                if start >= size {
                    return None;
                }
                let end = end.map_or(size - 1, |e| e.min(size - 1));
                if start > end {
                    None
                } else {
                    Some((start, end))
                }
            }
            ByteRange::Suffix(0) => None,
            ByteRange::Suffix(n) => Some((size.saturating_sub(n), size - 1)),
        }
    }
}

/// 一个完整的 HTTP 请求。创建后不可变。
#[derive(Debug, Clone)]
pub struct Request {
    id: u64,
    raw: Bytes,
    method: HttpRequestMethod,
    target: Range<usize>,
    path: Range<usize>,
    query: Option<Range<usize>>,
    version: HttpVersion,
    headers: Vec<(Range<usize>, Range<usize>)>,
    body: Bytes,
    json_max_depth: usize,
    parse_time: Duration,
    params: Vec<(String, String)>,
}

impl Request {
    /// 从一段完整的请求字节构建 `Request`，使用默认限制。
    ///
    /// 数据不完整同样视为错误，错误位置为输入末尾。
    pub fn try_from(buffer: &[u8], id: u64) -> Result<Self, ParseError> {
        let mut parser = RequestParser::new(ParserLimits::default());
        let mut buf = BytesMut::from(buffer);
        match parser.parse(&mut buf)? {
            ParseStatus::Complete(mut request) => {
                request.id = id;
                Ok(request)
            }
            ParseStatus::NeedMoreData => Err(ParseError::new(
                ParseErrorKind::MalformedRequestLine,
                buffer.len(),
            )),
        }
    }

    fn slice_str(&self, range: &Range<usize>) -> &str {
        // 头部在解析阶段已校验为 UTF-8
        std::str::from_utf8(&self.raw[range.clone()]).unwrap_or_default()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &HttpRequestMethod {
        &self.method
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 请求行中的原始目标（含查询字符串）
    pub fn target(&self) -> &str {
        self.slice_str(&self.target)
    }

    /// 未解码的路径部分
    pub fn path(&self) -> &str {
        self.slice_str(&self.path)
    }

    /// 路径模式路由提取的参数，例如 `/users/{id}` 中的 `id`。
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.params
    }

    pub(crate) fn set_path_params(&mut self, params: Vec<(String, String)>) {
        self.params = params;
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_ref().map(|r| self.slice_str(r))
    }

    /// 不区分大小写地查找头部字段。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| self.raw[n.clone()].eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| self.slice_str(v))
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(move |(n, v)| (self.slice_str(n), self.slice_str(v)))
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 请求在解析器中累计花费的时间
    pub fn parse_time(&self) -> Duration {
        self.parse_time
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_json(&self) -> bool {
        self.content_type().map_or(false, is_json_media_type)
    }

    pub fn accepts_json(&self) -> bool {
        self.header("accept").map_or(false, is_json_media_type)
    }

    /// 按 HTTP/1.0 与 HTTP/1.1 各自的默认值判断连接是否保持。
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").unwrap_or("");
        let has_token = |token: &str| {
            connection
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        };
        if has_token("close") {
            return false;
        }
        match self.version {
            HttpVersion::V1_1 => true,
            HttpVersion::V1_0 => has_token("keep-alive"),
        }
    }

    /// 客户端支持的压缩编码，按出现顺序排列，`q=0` 的编码被排除。
    pub fn accept_encoding(&self) -> Vec<HttpEncoding> {
        let mut encodings = vec![];
        let value = match self.header("accept-encoding") {
            Some(v) => v,
            None => return encodings,
        };
        for item in value.split(',') {
            let mut parts = item.split(';');
            let name = parts.next().unwrap_or("");
            let refused = parts.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .map_or(false, |q| q <= 0.0)
            });
            if refused {
                continue;
            }
            if let Some(encoding) = HttpEncoding::from_token(name) {
                if !encodings.contains(&encoding) {
                    encodings.push(encoding);
                }
            }
        }
        encodings
    }

    /// 解析 `Range: bytes=...`，多区间或格式错误时忽略。
    pub fn range(&self) -> Option<ByteRange> {
        let value = self.header("range")?;
        let spec = value.trim().strip_prefix("bytes=")?;
        if spec.contains(',') {
            return None;
        }
        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() {
            return end.parse::<u64>().ok().map(ByteRange::Suffix);
        }
        let start = start.parse::<u64>().ok()?;
        let end = if end.is_empty() {
            None
        } else {
            Some(end.parse::<u64>().ok()?)
        };
        Some(ByteRange::From { start, end })
    }

    /// 解码后的查询参数，保持出现顺序。
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.query().map(parse_urlencoded).unwrap_or_default()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// `application/x-www-form-urlencoded` 请求体中的字段。其他类型返回空。
    pub fn form_params(&self) -> Vec<(String, String)> {
        let is_form = self.content_type().map_or(false, |t| {
            t.to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        });
        if !is_form {
            return vec![];
        }
        parse_urlencoded(&String::from_utf8_lossy(&self.body))
    }

    pub fn cookies(&self) -> Vec<(String, String)> {
        let value = match self.header("cookie") {
            Some(v) => v,
            None => return vec![],
        };
        value
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let value = value.trim().trim_matches('"');
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// 用 JSON 加速器解析请求体。
    pub fn json(&self) -> Result<JsonValue, JsonError> {
        json::parse_bytes(&self.body, self.json_max_depth)
    }
}

fn is_json_media_type(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    value.contains("application/json") || value.contains("+json")
}

fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (form_decode(k), form_decode(v)),
            None => (form_decode(pair), String::new()),
        })
        .collect()
}

/// 解析器的各项限制，一般由 `ServerConfig` 得出。
#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    pub max_request_size: usize,
    pub max_header_size: usize,
    pub zero_copy: bool,
    pub json_max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl ParserLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_request_size: config.max_request_size,
            max_header_size: config.max_header_size,
            zero_copy: config.enable_zero_copy,
            json_max_depth: config.json_max_depth,
        }
    }

    fn head_limit(&self) -> usize {
        self.max_header_size.min(self.max_request_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingRequestLine,
    AwaitingHeaders,
    AwaitingBody,
    Complete,
    Error,
}

#[derive(Debug)]
pub enum ParseStatus {
    Complete(Request),
    NeedMoreData,
}

#[derive(Debug, Clone, Copy)]
enum ChunkPhase {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
}

#[derive(Debug)]
enum Framing {
    Empty,
    Length(usize),
    Chunked {
        cursor: usize,
        phase: ChunkPhase,
        decoded: BytesMut,
    },
}

#[derive(Debug, Clone)]
struct RequestLine {
    method: HttpRequestMethod,
    target: Range<usize>,
    path: Range<usize>,
    query: Option<Range<usize>>,
    version: HttpVersion,
}

/// 流式请求解析器。
///
/// 每个连接持有一个解析器，连接每读到新数据就把整个读缓冲区交给 `parse`。
/// 请求不完整时缓冲区保持不变，只记录扫描进度；请求完整时从缓冲区头部切走
/// 该请求的全部字节，剩余数据（流水线中的后续请求）留给下一次调用。
#[derive(Debug)]
pub struct RequestParser {
    limits: ParserLimits,
    state: ParserState,
    scan_pos: usize,
    line: Option<RequestLine>,
    headers: Vec<(Range<usize>, Range<usize>)>,
    head_end: usize,
    framing: Framing,
    error: Option<ParseError>,
    elapsed: Duration,
    log: LogHandle,
}

impl RequestParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            log: LogHandle::new("pyspeed::parser"),
            limits,
            state: ParserState::AwaitingRequestLine,
            scan_pos: 0,
            line: None,
            headers: Vec::new(),
            head_end: 0,
            framing: Framing::Empty,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_log(mut self, log: LogHandle) -> Self {
        self.log = log;
        self
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// 缓冲区中是否有尚未完成的请求
    pub fn in_progress(&self) -> bool {
        matches!(
            self.state,
            ParserState::AwaitingHeaders | ParserState::AwaitingBody
        )
    }

    fn reset(&mut self) {
        self.state = ParserState::AwaitingRequestLine;
        self.scan_pos = 0;
        self.line = None;
        self.headers.clear();
        self.head_end = 0;
        self.framing = Framing::Empty;
        self.elapsed = Duration::ZERO;
    }

    fn fail(&mut self, kind: ParseErrorKind, offset: usize) -> ParseError {
        let error = ParseError::new(kind, offset);
        self.state = ParserState::Error;
        self.error = Some(error);
        error
    }

    /// 跳过出错的请求并复位解析器，成功时连接可以继续使用。
    ///
    /// 只有头部结尾已在缓冲区内、且头部没有声明请求体时才能确定下一个请求
    /// 从哪里开始；否则返回 `false`，缓冲区保持不变。
    pub fn recover(&mut self, buf: &mut BytesMut) -> bool {
        match self.error {
            Some(error) if error.kind.is_recoverable() => {}
            _ => return false,
        }
        let mut pos = 0;
        loop {
            let line_end = match find_lf(buf, pos) {
                Some(i) if i < self.limits.head_limit() => i,
                _ => return false,
            };
            let content_end = trim_cr(buf, pos, line_end);
            if content_end == pos && pos > 0 {
                buf.advance(line_end + 1);
                break;
            }
            if pos > 0 && declares_body(&buf[pos..content_end]) {
                return false;
            }
            pos = line_end + 1;
        }
        trace!(target: self.log.target(), "跳过无法解析的请求，继续处理后续数据");
        self.error = None;
        self.reset();
        true
    }

    /// 推进状态机。进入 `Error` 后每次调用都返回同一个错误。
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<ParseStatus, ParseError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.state == ParserState::Complete {
            self.reset();
        }
        let started = Instant::now();
        let result = self.advance(buf);
        self.elapsed += started.elapsed();
        match result {
            Ok(ParseStatus::Complete(mut request)) => {
                request.parse_time = self.elapsed;
                self.state = ParserState::Complete;
                Ok(ParseStatus::Complete(request))
            }
            other => other,
        }
    }

    fn advance(&mut self, buf: &mut BytesMut) -> Result<ParseStatus, ParseError> {
        loop {
            match self.state {
                ParserState::AwaitingRequestLine => {
                    if !self.read_request_line(buf)? {
                        return Ok(ParseStatus::NeedMoreData);
                    }
                }
                ParserState::AwaitingHeaders => {
                    if !self.read_headers(buf)? {
                        return Ok(ParseStatus::NeedMoreData);
                    }
                }
                ParserState::AwaitingBody => {
                    return match self.read_body(buf)? {
                        Some(total) => Ok(ParseStatus::Complete(self.finish(buf, total))),
                        None => Ok(ParseStatus::NeedMoreData),
                    };
                }
                ParserState::Complete | ParserState::Error => {
                    return Ok(ParseStatus::NeedMoreData);
                }
            }
        }
    }

    fn read_request_line(&mut self, buf: &mut BytesMut) -> Result<bool, ParseError> {
        // 请求之间允许出现多余的空行
        let blank = buf
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        if blank > 0 {
            buf.advance(blank);
        }
        let line_end = match find_lf(buf, 0) {
            Some(i) => i,
            None => {
                if buf.len() > self.limits.head_limit() {
                    return Err(self.fail(ParseErrorKind::HeaderTooLarge, buf.len()));
                }
                return Ok(false);
            }
        };
        if line_end >= self.limits.head_limit() {
            return Err(self.fail(ParseErrorKind::HeaderTooLarge, line_end));
        }
        let content_end = trim_cr(buf, 0, line_end);
        match parse_request_line(&buf[..content_end]) {
            Ok(line) => {
                trace!(
                    target: self.log.target(),
                    "请求行解析完成: {} {}",
                    line.method,
                    line.version
                );
                self.line = Some(line);
            }
            Err(kind) => return Err(self.fail(kind, 0)),
        }
        self.scan_pos = line_end + 1;
        self.state = ParserState::AwaitingHeaders;
        Ok(true)
    }

    fn read_headers(&mut self, buf: &mut BytesMut) -> Result<bool, ParseError> {
        loop {
            let line_end = match find_lf(buf, self.scan_pos) {
                Some(i) => i,
                None => {
                    if buf.len() > self.limits.head_limit() {
                        return Err(self.fail(ParseErrorKind::HeaderTooLarge, buf.len()));
                    }
                    return Ok(false);
                }
            };
            if line_end >= self.limits.head_limit() {
                return Err(self.fail(ParseErrorKind::HeaderTooLarge, line_end));
            }
            let line_start = self.scan_pos;
            let content_end = trim_cr(buf, line_start, line_end);
            self.scan_pos = line_end + 1;

            if content_end == line_start {
                self.head_end = self.scan_pos;
                self.framing = self.decide_framing(buf)?;
                self.state = ParserState::AwaitingBody;
                return Ok(true);
            }

            let (name, value) = match parse_header_line(buf, line_start, content_end) {
                Ok(parsed) => parsed,
                Err(kind) => return Err(self.fail(kind, line_start)),
            };
            self.insert_header(buf, name, value, line_start)?;
        }
    }

    /// 重复的头部字段保留首次出现的位置，值取最后一次；
    /// 互相矛盾的 `Content-Length` 视为非法请求。
    fn insert_header(
        &mut self,
        buf: &BytesMut,
        name: Range<usize>,
        value: Range<usize>,
        offset: usize,
    ) -> Result<(), ParseError> {
        let existing = self
            .headers
            .iter()
            .position(|(n, _)| buf[n.clone()].eq_ignore_ascii_case(&buf[name.clone()]));
        match existing {
            Some(index) => {
                let is_length = buf[name.clone()].eq_ignore_ascii_case(b"content-length");
                if is_length && buf[self.headers[index].1.clone()] != buf[value.clone()] {
                    return Err(self.fail(ParseErrorKind::MalformedHeader, offset));
                }
                self.headers[index].1 = value;
            }
            None => {
                if self.headers.len() >= MAX_HEADERS {
                    return Err(self.fail(ParseErrorKind::HeaderTooLarge, offset));
                }
                self.headers.push((name, value));
            }
        }
        Ok(())
    }

    fn find_header<'b>(&self, buf: &'b BytesMut, name: &str) -> Option<&'b [u8]> {
        self.headers
            .iter()
            .find(|(n, _)| buf[n.clone()].eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| &buf[v.clone()])
    }

    fn decide_framing(&mut self, buf: &BytesMut) -> Result<Framing, ParseError> {
        let transfer_encoding = self.find_header(buf, "transfer-encoding");
        let content_length = self.find_header(buf, "content-length");

        if let Some(te) = transfer_encoding {
            let chunked = te
                .rsplit(|&b| b == b',')
                .next()
                .map_or(false, |last| trim_ows(last).eq_ignore_ascii_case(b"chunked"));
            if !chunked || content_length.is_some() {
                return Err(self.fail(ParseErrorKind::MalformedHeader, self.head_end));
            }
            return Ok(Framing::Chunked {
                cursor: self.head_end,
                phase: ChunkPhase::Size,
                decoded: BytesMut::new(),
            });
        }

        let length = match content_length {
            None => return Ok(Framing::Empty),
            Some(raw) => match parse_decimal(raw) {
                Some(n) => n,
                None => return Err(self.fail(ParseErrorKind::MalformedHeader, self.head_end)),
            },
        };
        if self.head_end.saturating_add(length) > self.limits.max_request_size {
            return Err(self.fail(ParseErrorKind::BodyTooLarge, self.head_end));
        }
        Ok(if length == 0 {
            Framing::Empty
        } else {
            Framing::Length(length)
        })
    }

    /// 请求体完整时返回整个请求占用的字节数。
    fn read_body(&mut self, buf: &BytesMut) -> Result<Option<usize>, ParseError> {
        let head_end = self.head_end;
        let max_request_size = self.limits.max_request_size;
        let outcome = match &mut self.framing {
            Framing::Empty => Ok(Some(head_end)),
            Framing::Length(n) => {
                let total = head_end + *n;
                Ok(if buf.len() >= total { Some(total) } else { None })
            }
            Framing::Chunked {
                cursor,
                phase,
                decoded,
            } => decode_chunked(buf, cursor, phase, decoded, head_end, max_request_size),
        };
        match outcome {
            Ok(done) => Ok(done),
            Err((kind, offset)) => Err(self.fail(kind, offset)),
        }
    }

    fn finish(&mut self, buf: &mut BytesMut, total: usize) -> Request {
        let frame = buf.split_to(total).freeze();
        let head_end = self.head_end;
        let body = match std::mem::replace(&mut self.framing, Framing::Empty) {
            Framing::Empty => Bytes::new(),
            Framing::Length(_) if self.limits.zero_copy => frame.slice(head_end..total),
            Framing::Length(_) => Bytes::copy_from_slice(&frame[head_end..total]),
            Framing::Chunked { decoded, .. } => decoded.freeze(),
        };
        let line = match self.line.take() {
            Some(line) => line,
            None => RequestLine {
                method: HttpRequestMethod::Get,
                target: 0..0,
                path: 0..0,
                query: None,
                version: HttpVersion::V1_1,
            },
        };
        Request {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            raw: frame,
            method: line.method,
            target: line.target,
            path: line.path,
            query: line.query,
            version: line.version,
            headers: std::mem::take(&mut self.headers),
            body,
            json_max_depth: self.limits.json_max_depth,
            parse_time: Duration::ZERO,
            params: Vec::new(),
        }
    }
}

fn decode_chunked(
    buf: &BytesMut,
    cursor: &mut usize,
    phase: &mut ChunkPhase,
    decoded: &mut BytesMut,
    head_end: usize,
    max_request_size: usize,
) -> Result<Option<usize>, (ParseErrorKind, usize)> {
    loop {
        if *cursor > max_request_size {
            return Err((ParseErrorKind::BodyTooLarge, *cursor));
        }
        match *phase {
            ChunkPhase::Size => {
                let line_end = match find_lf(buf, *cursor) {
                    Some(i) => i,
                    None if buf.len() - *cursor > MAX_CHUNK_LINE => {
                        return Err((ParseErrorKind::MalformedHeader, *cursor))
                    }
                    None => return Ok(None),
                };
                let content_end = trim_cr(buf, *cursor, line_end);
                let line = &buf[*cursor..content_end];
                let size_part = match line.iter().position(|&b| b == b';') {
                    Some(i) => &line[..i],
                    None => line,
                };
                let size = match parse_hex(trim_ows(size_part)) {
                    Some(size) => size,
                    None => return Err((ParseErrorKind::MalformedHeader, *cursor)),
                };
                *cursor = line_end + 1;
                if size == 0 {
                    *phase = ChunkPhase::Trailer;
                } else {
                    if head_end + decoded.len() + size > max_request_size {
                        return Err((ParseErrorKind::BodyTooLarge, *cursor));
                    }
                    *phase = ChunkPhase::Data(size);
                }
            }
            ChunkPhase::Data(remaining) => {
                let available = buf.len() - *cursor;
                let take = available.min(remaining);
                decoded.extend_from_slice(&buf[*cursor..*cursor + take]);
                *cursor += take;
                if take < remaining {
                    *phase = ChunkPhase::Data(remaining - take);
                    return Ok(None);
                }
                *phase = ChunkPhase::DataEnd;
            }
            ChunkPhase::DataEnd => match buf.get(*cursor) {
                None => return Ok(None),
                Some(b'\n') => {
                    *cursor += 1;
                    *phase = ChunkPhase::Size;
                }
                Some(b'\r') => match buf.get(*cursor + 1) {
                    None => return Ok(None),
                    Some(b'\n') => {
                        *cursor += 2;
                        *phase = ChunkPhase::Size;
                    }
                    Some(_) => return Err((ParseErrorKind::MalformedHeader, *cursor)),
                },
                Some(_) => return Err((ParseErrorKind::MalformedHeader, *cursor)),
            },
            ChunkPhase::Trailer => {
                let line_end = match find_lf(buf, *cursor) {
                    Some(i) => i,
                    None if buf.len() - *cursor > MAX_CHUNK_LINE => {
                        return Err((ParseErrorKind::MalformedHeader, *cursor))
                    }
                    None => return Ok(None),
                };
                let empty = trim_cr(buf, *cursor, line_end) == *cursor;
                *cursor = line_end + 1;
                if empty {
                    return Ok(Some(*cursor));
                }
            }
        }
    }
}

fn find_lf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| from + i)
}

/// 去掉行尾的 `\r`，返回行内容的结束下标。
fn trim_cr(buf: &[u8], start: usize, line_end: usize) -> usize {
    if line_end > start && buf[line_end - 1] == b'\r' {
        line_end - 1
    } else {
        line_end
    }
}

fn trim_ows(mut raw: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = raw {
        raw = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = raw {
        raw = rest;
    }
    raw
}

// 头部行是否声明了请求体（含折叠行），大小写不敏感
fn declares_body(line: &[u8]) -> bool {
    let name = match line.iter().position(|&b| b == b':') {
        Some(colon) => &line[..colon],
        None => line,
    };
    let name = trim_ows(name);
    name.eq_ignore_ascii_case(b"content-length") || name.eq_ignore_ascii_case(b"transfer-encoding")
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine, ParseErrorKind> {
    let mut parts = line.split(|&b| b == b' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(ParseErrorKind::MalformedRequestLine),
    };
    if method.is_empty() || !method.iter().all(|&b| is_tchar(b)) {
        return Err(ParseErrorKind::MalformedRequestLine);
    }
    if target.is_empty()
        || !(target[0] == b'/' || target == b"*")
        || target.iter().any(|&b| b <= 0x20 || b >= 0x7f)
    {
        return Err(ParseErrorKind::MalformedRequestLine);
    }
    let version = parse_version(version)?;

    // method、target 都是 ASCII，这里的转换不会失败
    let method = HttpRequestMethod::from_token(std::str::from_utf8(method).unwrap_or_default());
    let target_start = method_len(line);
    let target_range = target_start..target_start + target.len();
    let (path, query) = match target.iter().position(|&b| b == b'?') {
        Some(q) => (
            target_range.start..target_range.start + q,
            Some(target_range.start + q + 1..target_range.end),
        ),
        None => (target_range.clone(), None),
    };
    Ok(RequestLine {
        method,
        target: target_range,
        path,
        query,
        version,
    })
}

fn method_len(line: &[u8]) -> usize {
    line.iter().position(|&b| b == b' ').map_or(0, |i| i + 1)
}

fn parse_version(version: &[u8]) -> Result<HttpVersion, ParseErrorKind> {
    if version.eq_ignore_ascii_case(b"HTTP/1.1") {
        return Ok(HttpVersion::V1_1);
    }
    if version.eq_ignore_ascii_case(b"HTTP/1.0") {
        return Ok(HttpVersion::V1_0);
    }
    let looks_like_http = version.len() == 8
        && version[..5].eq_ignore_ascii_case(b"HTTP/")
        && version[5].is_ascii_digit()
        && version[6] == b'.'
        && version[7].is_ascii_digit();
    if looks_like_http {
        Err(ParseErrorKind::UnsupportedVersion)
    } else {
        Err(ParseErrorKind::MalformedRequestLine)
    }
}

fn parse_header_line(
    buf: &[u8],
    start: usize,
    end: usize,
) -> Result<(Range<usize>, Range<usize>), ParseErrorKind> {
    let line = &buf[start..end];
    let colon = match line.iter().position(|&b| b == b':') {
        Some(i) => i,
        None => return Err(ParseErrorKind::MalformedHeader),
    };
    let name = &line[..colon];
    // 以空白开头的续行（obs-fold）同样落在这里被拒绝
    if name.is_empty() || !name.iter().all(|&b| is_tchar(b)) {
        return Err(ParseErrorKind::MalformedHeader);
    }
    let mut value_start = colon + 1;
    let mut value_end = line.len();
    while value_start < value_end && matches!(line[value_start], b' ' | b'\t') {
        value_start += 1;
    }
    while value_end > value_start && matches!(line[value_end - 1], b' ' | b'\t') {
        value_end -= 1;
    }
    let value = &line[value_start..value_end];
    if value.iter().any(|&b| (b < 0x20 && b != b'\t') || b == 0x7f) {
        return Err(ParseErrorKind::MalformedHeader);
    }
    if std::str::from_utf8(value).is_err() {
        return Err(ParseErrorKind::MalformedHeader);
    }
    Ok((
        start..start + colon,
        start + value_start..start + value_end,
    ))
}

fn parse_decimal(raw: &[u8]) -> Option<usize> {
    if raw.is_empty() || raw.len() > 19 || !raw.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn parse_hex(raw: &[u8]) -> Option<usize> {
    if raw.is_empty() || raw.len() > 15 || !raw.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    usize::from_str_radix(std::str::from_utf8(raw).ok()?, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limits(max_request_size: usize) -> ParserLimits {
        ParserLimits {
            max_request_size,
            max_header_size: 8192,
            zero_copy: true,
            json_max_depth: 100,
        }
    }

    fn parse_all(input: &[u8]) -> Result<ParseStatus, ParseError> {
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::from(input);
        parser.parse(&mut buf)
    }

    fn complete(input: &[u8]) -> Request {
        match parse_all(input) {
            Ok(ParseStatus::Complete(request)) => request,
            other => panic!("expected complete request, got {:?}", other),
        }
    }

    fn error_kind(input: &[u8]) -> ParseErrorKind {
        match parse_all(input) {
            Err(e) => e.kind,
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_get_request() {
        let request = complete(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(request.method(), &HttpRequestMethod::Get);
        assert_eq!(request.path(), "/health");
        assert_eq!(request.version(), HttpVersion::V1_1);
        assert_eq!(request.header("host"), Some("x"));
        assert!(request.body().is_empty());
        assert!(request.keep_alive());
    }

    #[test]
    fn test_missing_version_is_malformed() {
        assert_eq!(
            error_kind(b"GET /health\r\nHost: x\r\n\r\n"),
            ParseErrorKind::MalformedRequestLine
        );
    }

    #[test]
    fn test_malformed_request_lines() {
        for line in [
            &b"GET  /a HTTP/1.1\r\n\r\n"[..],
            b"GET /a HTTP/1.1 extra\r\n\r\n",
            b"GET a HTTP/1.1\r\n\r\n",
            b"G(T /a HTTP/1.1\r\n\r\n",
            b"GET /a FOO/1.1\r\n\r\n",
            b"GET /\x01 HTTP/1.1\r\n\r\n",
        ] {
            assert_eq!(error_kind(line), ParseErrorKind::MalformedRequestLine);
        }
    }

    #[test]
    fn test_unsupported_http_version() {
        assert_eq!(
            error_kind(b"GET / HTTP/2.0\r\n\r\n"),
            ParseErrorKind::UnsupportedVersion
        );
    }

    #[test]
    fn test_http10_connection_defaults() {
        let request = complete(b"GET / HTTP/1.0\r\n\r\n");
        assert_eq!(request.version(), HttpVersion::V1_0);
        assert!(!request.keep_alive());
        let request = complete(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n");
        assert!(request.keep_alive());
        let request = complete(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!request.keep_alive());
    }

    #[test]
    fn test_lowercase_method() {
        let request = complete(b"post /submit HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(request.method(), &HttpRequestMethod::Post);
    }

    #[test]
    fn test_extension_method_is_parsed() {
        let request = complete(b"BREW /pot HTTP/1.1\r\n\r\n");
        assert!(request.method().is_extension());
    }

    #[test]
    fn test_path_with_query_string() {
        let request = complete(b"GET /search?q=rust+lang&page=2&x=%41 HTTP/1.1\r\n\r\n");
        assert_eq!(request.path(), "/search");
        assert_eq!(request.target(), "/search?q=rust+lang&page=2&x=%41");
        assert_eq!(request.query(), Some("q=rust+lang&page=2&x=%41"));
        assert_eq!(
            request.query_params(),
            vec![
                ("q".to_string(), "rust lang".to_string()),
                ("page".to_string(), "2".to_string()),
                ("x".to_string(), "A".to_string()),
            ]
        );
        assert_eq!(request.query_param("page"), Some("2".to_string()));
    }

    #[test]
    fn test_case_insensitive_headers() {
        let request = complete(b"GET / HTTP/1.1\r\nCONTENT-TYPE: text/plain\r\nX-Custom:  spaced  \r\n\r\n");
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.header("x-custom"), Some("spaced"));
        assert_eq!(request.header("missing"), None);
    }

    #[test]
    fn test_duplicate_headers_keep_last_value() {
        let request = complete(b"GET / HTTP/1.1\r\nX-A: 1\r\nX-B: 2\r\nx-a: 3\r\n\r\n");
        assert_eq!(request.header("x-a"), Some("3"));
        let names: Vec<_> = request.headers().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["X-A", "X-B"]);
    }

    #[test]
    fn test_recover_skips_bad_request_without_body() {
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::from(
            &b"GET /health\r\nHost: x\r\n\r\nGET /ok HTTP/1.1\r\nHost: x\r\n\r\n"[..],
        );
        let error = parser.parse(&mut buf).unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::MalformedRequestLine);
        assert!(parser.recover(&mut buf));
        assert_eq!(parser.state(), ParserState::AwaitingRequestLine);
        match parser.parse(&mut buf) {
            Ok(ParseStatus::Complete(request)) => assert_eq!(request.path(), "/ok"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_recover_after_bad_header() {
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\nGET /next HTTP/1.1\r\n\r\n"[..]);
        assert!(parser.parse(&mut buf).is_err());
        assert!(parser.recover(&mut buf));
        assert!(matches!(parser.parse(&mut buf), Ok(ParseStatus::Complete(_))));
    }

    #[test]
    fn test_recover_refuses_when_boundary_is_lost() {
        let cases: [&[u8]; 4] = [
            // 声明了请求体
            b"POST /x\r\nContent-Length: 3\r\n\r\nabc",
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 3\r\n\r\n",
            b"POST / HTTP/1.1\r\nX: a\r\n\ttransfer-encoding: chunked\r\nBad Name: y\r\n\r\n",
            // 头部尚未结束
            b"GET /a b HTTP/1.1\r\nHost: x\r\n",
        ];
        for raw in cases {
            let mut parser = RequestParser::new(limits(1 << 20));
            let mut buf = BytesMut::from(raw);
            assert!(parser.parse(&mut buf).is_err(), "{}", String::from_utf8_lossy(raw));
            assert!(!parser.recover(&mut buf), "{}", String::from_utf8_lossy(raw));
            assert_eq!(&buf[..], raw);
            assert_eq!(parser.state(), ParserState::Error);
        }

        let mut parser = RequestParser::new(limits(64));
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 1000\r\n\r\n"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap_err().kind, ParseErrorKind::BodyTooLarge);
        assert!(!parser.recover(&mut buf));
    }

    #[test]
    fn test_conflicting_content_length() {
        assert_eq!(
            error_kind(b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab"),
            ParseErrorKind::MalformedHeader
        );
        let request = complete(b"POST / HTTP/1.1\r\nContent-Length: 2\r\nContent-Length: 2\r\n\r\nab");
        assert_eq!(&request.body()[..], b"ab");
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(
            error_kind(b"GET / HTTP/1.1\r\nNoColon\r\n\r\n"),
            ParseErrorKind::MalformedHeader
        );
        assert_eq!(
            error_kind(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n"),
            ParseErrorKind::MalformedHeader
        );
        assert_eq!(
            error_kind(b"GET / HTTP/1.1\r\nA: b\r\n folded\r\n\r\n"),
            ParseErrorKind::MalformedHeader
        );
        assert_eq!(
            error_kind(b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n"),
            ParseErrorKind::MalformedHeader
        );
        assert_eq!(
            error_kind(b"POST / HTTP/1.1\r\nContent-Length: 2\r\nTransfer-Encoding: chunked\r\n\r\n"),
            ParseErrorKind::MalformedHeader
        );
    }

    #[test]
    fn test_invalid_utf8_header_value() {
        assert_eq!(
            error_kind(b"GET / HTTP/1.1\r\nX: \xff\xfe\r\n\r\n"),
            ParseErrorKind::MalformedHeader
        );
    }

    #[test]
    fn test_body_with_content_length() {
        let request = complete(b"POST /echo HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 7\r\n\r\n{\"a\":1}");
        assert_eq!(&request.body()[..], b"{\"a\":1}");
        assert!(request.is_json());
        assert_eq!(request.json().unwrap().get("a").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_body_too_large() {
        let mut parser = RequestParser::new(limits(64));
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n"[..]);
        let err = parser.parse(&mut buf).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::BodyTooLarge);
        assert_eq!(err.status_code(), 413);
        assert_eq!(parser.state(), ParserState::Error);
        // 错误状态不可恢复
        assert_eq!(parser.parse(&mut buf).unwrap_err(), err);
    }

    #[test]
    fn test_header_too_large() {
        let mut parser = RequestParser::new(ParserLimits {
            max_request_size: 1 << 20,
            max_header_size: 64,
            zero_copy: true,
            json_max_depth: 100,
        });
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        assert!(matches!(parser.parse(&mut buf), Ok(ParseStatus::NeedMoreData)));
        buf.extend_from_slice(&[b'a'; 80]);
        let err = parser.parse(&mut buf).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::HeaderTooLarge);
    }

    #[test]
    fn test_too_many_headers() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            raw.extend_from_slice(format!("X-H{}: v\r\n", i).as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::from(&raw[..]);
        assert_eq!(
            parser.parse(&mut buf).unwrap_err().kind,
            ParseErrorKind::HeaderTooLarge
        );
    }

    #[test]
    fn test_incremental_parse() {
        let raw = b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::new();
        let mut states = vec![];
        for &b in &raw[..raw.len() - 1] {
            buf.extend_from_slice(&[b]);
            assert!(matches!(parser.parse(&mut buf), Ok(ParseStatus::NeedMoreData)));
            states.push(parser.state());
        }
        assert!(states.contains(&ParserState::AwaitingRequestLine));
        assert!(states.contains(&ParserState::AwaitingHeaders));
        assert!(states.contains(&ParserState::AwaitingBody));
        buf.extend_from_slice(&raw[raw.len() - 1..]);
        match parser.parse(&mut buf) {
            Ok(ParseStatus::Complete(request)) => assert_eq!(&request.body()[..], b"hello"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(parser.state(), ParserState::Complete);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pipelined_requests() {
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::from(
            &b"GET /1 HTTP/1.1\r\n\r\nPOST /2 HTTP/1.1\r\nContent-Length: 2\r\n\r\nokGET /3 HTTP/1.1\r\n"[..],
        );
        let mut paths = vec![];
        while let Ok(ParseStatus::Complete(request)) = parser.parse(&mut buf) {
            paths.push(request.path().to_string());
        }
        assert_eq!(paths, vec!["/1", "/2"]);
        assert_eq!(parser.state(), ParserState::AwaitingHeaders);
        buf.extend_from_slice(b"\r\n");
        match parser.parse(&mut buf) {
            Ok(ParseStatus::Complete(request)) => assert_eq!(request.path(), "/3"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let request = complete(b"\r\n\r\nGET /x HTTP/1.1\r\n\r\n");
        assert_eq!(request.path(), "/x");
    }

    #[test]
    fn test_chunked_body() {
        let raw = b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: y\r\n\r\n";
        let request = complete(raw);
        assert_eq!(&request.body()[..], b"hello world");

        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::new();
        let mut result = None;
        for chunk in raw.chunks(3) {
            buf.extend_from_slice(chunk);
            if let Ok(ParseStatus::Complete(request)) = parser.parse(&mut buf) {
                result = Some(request);
            }
        }
        assert_eq!(&result.unwrap().body()[..], b"hello world");
    }

    #[test]
    fn test_chunked_errors() {
        assert_eq!(
            error_kind(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"),
            ParseErrorKind::MalformedHeader
        );
        let mut parser = RequestParser::new(limits(80));
        let mut buf = BytesMut::from(
            &b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n40\r\n"[..],
        );
        assert_eq!(
            parser.parse(&mut buf).unwrap_err().kind,
            ParseErrorKind::BodyTooLarge
        );
    }

    #[test]
    fn test_zero_copy_body_shares_buffer() {
        let mut parser = RequestParser::new(limits(1 << 20));
        let mut buf = BytesMut::from(&b"PUT /z HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc"[..]);
        let request = match parser.parse(&mut buf) {
            Ok(ParseStatus::Complete(r)) => r,
            other => panic!("unexpected {:?}", other),
        };
        let raw_start = request.raw.as_ptr() as usize;
        let body_start = request.body().as_ptr() as usize;
        assert_eq!(body_start - raw_start, request.raw.len() - 3);

        let mut copying = RequestParser::new(ParserLimits {
            zero_copy: false,
            ..limits(1 << 20)
        });
        let mut buf = BytesMut::from(&b"PUT /z HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc"[..]);
        match copying.parse(&mut buf) {
            Ok(ParseStatus::Complete(r)) => assert_eq!(&r.body()[..], b"abc"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_accept_encoding() {
        let request = complete(b"GET / HTTP/1.1\r\nAccept-Encoding: br;q=0.9, gzip, deflate;q=0\r\n\r\n");
        assert_eq!(
            request.accept_encoding(),
            vec![HttpEncoding::Br, HttpEncoding::Gzip]
        );
        let request = complete(b"GET / HTTP/1.1\r\n\r\n");
        assert!(request.accept_encoding().is_empty());
    }

    #[test]
    fn test_range_header() {
        let request = complete(b"GET / HTTP/1.1\r\nRange: bytes=0-1023\r\n\r\n");
        assert_eq!(
            request.range(),
            Some(ByteRange::From {
                start: 0,
                end: Some(1023)
            })
        );
        let request = complete(b"GET / HTTP/1.1\r\nRange: bytes=100-\r\n\r\n");
        assert_eq!(
            request.range(),
            Some(ByteRange::From {
                start: 100,
                end: None
            })
        );
        let request = complete(b"GET / HTTP/1.1\r\nRange: bytes=-500\r\n\r\n");
        assert_eq!(request.range(), Some(ByteRange::Suffix(500)));
        let request = complete(b"GET / HTTP/1.1\r\nRange: bytes=0-1,5-6\r\n\r\n");
        assert_eq!(request.range(), None);
    }

    #[test]
    fn test_range_resolve() {
        let range = ByteRange::From {
            start: 10,
            end: Some(1000),
        };
        assert_eq!(range.resolve(100), Some((10, 99)));
        assert_eq!(ByteRange::Suffix(30).resolve(100), Some((70, 99)));
        assert_eq!(ByteRange::Suffix(300).resolve(100), Some((0, 99)));
        assert_eq!(
            ByteRange::From {
                start: 100,
                end: None
            }
            .resolve(100),
            None
        );
        assert_eq!(ByteRange::Suffix(0).resolve(100), None);
    }

    #[test]
    fn test_cookies_and_form() {
        let request = complete(
            b"POST /login HTTP/1.1\r\nCookie: session=abc123; theme=\"dark\"\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 27\r\n\r\nuser=bob+smith&pass=p%40ss1",
        );
        assert_eq!(request.cookie("session"), Some("abc123".to_string()));
        assert_eq!(request.cookie("theme"), Some("dark".to_string()));
        assert_eq!(
            request.form_params(),
            vec![
                ("user".to_string(), "bob smith".to_string()),
                ("pass".to_string(), "p@ss1".to_string()),
            ]
        );
    }

    #[test]
    fn test_accepts_json() {
        let request = complete(b"GET / HTTP/1.1\r\nAccept: application/json\r\n\r\n");
        assert!(request.accepts_json());
        let request = complete(b"GET / HTTP/1.1\r\nAccept: text/html\r\n\r\n");
        assert!(!request.accepts_json());
    }

    #[test]
    fn test_try_from() {
        let request = Request::try_from(b"GET / HTTP/1.1\r\n\r\n", 42).unwrap();
        assert_eq!(request.id(), 42);
        let err = Request::try_from(b"GET / HTTP/1.1\r\nHost", 1).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedRequestLine);
    }

    fn arb_request() -> impl Strategy<Value = Vec<u8>> {
        (
            prop::sample::select(vec!["GET", "POST", "PUT", "DELETE"]),
            "/[a-z0-9/]{0,20}",
            prop::collection::vec(("[A-Za-z][A-Za-z0-9-]{0,10}", "[ -~]{0,30}"), 0..8),
            prop::collection::vec(any::<u8>(), 0..200),
        )
            .prop_map(|(method, path, headers, body)| {
                let mut raw = format!("{} {} HTTP/1.1\r\n", method, path).into_bytes();
                for (name, value) in headers {
                    if name.eq_ignore_ascii_case("content-length")
                        || name.eq_ignore_ascii_case("transfer-encoding")
                    {
                        continue;
                    }
                    raw.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
                }
                raw.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
                raw.extend_from_slice(&body);
                raw
            })
    }

    proptest! {
        #[test]
        fn prop_complete_input_never_needs_more_data(raw in arb_request(), split in 0usize..400) {
            let mut parser = RequestParser::new(limits(1 << 20));
            let mut buf = BytesMut::new();
            let split = split.min(raw.len());
            buf.extend_from_slice(&raw[..split]);
            let first = parser.parse(&mut buf);
            if split == raw.len() {
                // 一次收齐全部字节时必须立即得出结论
                prop_assert!(!matches!(first, Ok(ParseStatus::NeedMoreData)));
            } else if first.is_ok() {
                prop_assert!(!matches!(first, Ok(ParseStatus::Complete(_))));
                buf.extend_from_slice(&raw[split..]);
                let result = parser.parse(&mut buf);
                prop_assert!(!matches!(result, Ok(ParseStatus::NeedMoreData)));
            }
        }

        #[test]
        fn prop_arbitrary_head_terminates(line in "[ -~]{0,60}", header in "[ -~]{0,60}") {
            prop_assume!(!(line.is_empty() && header.is_empty()));
            let raw = format!("{}\r\n{}\r\n\r\n", line, header);
            prop_assume!(!header.to_ascii_lowercase().contains("content-length"));
            prop_assume!(!header.to_ascii_lowercase().contains("transfer-encoding"));
            let result = parse_all(raw.as_bytes());
            prop_assert!(!matches!(result, Ok(ParseStatus::NeedMoreData)));
        }
    }
}
