// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态文件服务
//!
//! `add_static_route(prefix, directory)` 注册的路由按最长前缀匹配。文件内容经由
//! `FileCache` 缓存，超过流式阈值的文件交给连接层从磁盘分块发送。

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::{
    cache::FileCache,
    config::ServerConfig,
    exception::Exception,
    logging::LogHandle,
    param::{HttpRequestMethod, DEFAULT_MIME, INDEX_FILE, MIME_TYPES},
    request::Request,
    response::{FileBody, Response},
    stats::Stats,
    util::{http_date, parse_http_date, percent_decode, HtmlBuilder, ListingEntry},
};

lazy_static! {
    // 隐藏文件与临时、备份、日志文件
    static ref FORBIDDEN_NAME: Regex = Regex::new(r"(?i)^[._]|\.(tmp|bak|log)$").unwrap();
}

const ALLOW: &str = "GET, HEAD";

#[derive(Debug, Clone)]
struct StaticRoute {
    prefix: String,
    directory: PathBuf,
}

impl StaticRoute {
    /// 路径命中该前缀时返回剩余部分
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.prefix == "/" {
            return Some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

pub struct StaticFiles {
    routes: RwLock<Vec<StaticRoute>>,
    cache: Mutex<FileCache>,
    enable_cache: bool,
    streaming_threshold: u64,
    max_age: u64,
    directory_listing: bool,
    stats: Arc<Stats>,
    log: LogHandle,
}

impl StaticFiles {
    pub fn new(config: &ServerConfig, stats: Arc<Stats>, log: LogHandle) -> Self {
        Self {
            routes: RwLock::new(vec![]),
            cache: Mutex::new(FileCache::from_capacity(config.static_cache_bytes())),
            enable_cache: config.enable_static_cache,
            streaming_threshold: config.streaming_threshold,
            max_age: config.static_cache_max_age,
            directory_listing: config.directory_listing,
            stats,
            log,
        }
    }

    /// 注册静态路由。同一前缀重复注册时替换目录。
    pub fn add_route(&self, prefix: &str, directory: impl Into<PathBuf>) {
        let prefix = normalize_prefix(prefix);
        let directory = directory.into();
        debug!(
            target: self.log.target(),
            "注册静态路由 {} -> {}",
            prefix,
            directory.display()
        );
        let mut routes = match self.routes.write() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        routes.retain(|r| r.prefix != prefix);
        routes.push(StaticRoute { prefix, directory });
        // 长前缀优先
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// 删除静态路由，返回是否存在。该路由的缓存条目会在淘汰时自然移除。
    pub fn remove_route(&self, prefix: &str) -> bool {
        let prefix = normalize_prefix(prefix);
        let mut routes = match self.routes.write() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = routes.len();
        routes.retain(|r| r.prefix != prefix);
        let removed = routes.len() != before;
        if removed {
            debug!(target: self.log.target(), "删除静态路由 {}", prefix);
        }
        removed
    }

    /// 已注册的前缀，按匹配优先级排列
    pub fn list_routes(&self) -> Vec<String> {
        self.read_routes().iter().map(|r| r.prefix.clone()).collect()
    }

    pub fn route_count(&self) -> usize {
        self.read_routes().len()
    }

    /// 移除一个文件的缓存。`path` 为路由目录拼接请求路径后的磁盘路径。
    pub fn invalidate_file(&self, path: &Path) -> bool {
        let removed = self.lock_cache().invalidate(path);
        debug!(
            target: self.log.target(),
            "缓存失效 {}: {}",
            path.display(),
            if removed { "已移除" } else { "未缓存" }
        );
        removed
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
        debug!(target: self.log.target(), "静态文件缓存已清空");
    }

    pub fn set_cache_size_limit(&self, capacity_bytes: usize) {
        self.lock_cache().set_capacity(capacity_bytes);
    }

    /// 请求路径是否命中任何静态路由
    pub fn matches(&self, path: &str) -> bool {
        self.read_routes().iter().any(|r| r.strip(path).is_some())
    }

    fn read_routes(&self) -> std::sync::RwLockReadGuard<'_, Vec<StaticRoute>> {
        match self.routes.read() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, FileCache> {
        match self.cache.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!(target: self.log.target(), "缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    /// 处理命中静态路由的请求，未命中时返回 `None`。会执行阻塞的文件 I/O。
    pub fn serve(&self, request: &Request) -> Option<Response> {
        let (route, rest) = {
            let routes = self.read_routes();
            let path = request.path();
            routes
                .iter()
                .find_map(|r| r.strip(path).map(|rest| (r.clone(), rest.to_string())))?
        };
        let id = request.id();
        let response = match self.serve_route(&route, &rest, request) {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    target: self.log.target(),
                    "[ID{}]静态文件 {} 处理失败: {}",
                    id,
                    request.path(),
                    e
                );
                error_response(&e, request)
            }
        };
        Some(response)
    }

    fn serve_route(
        &self,
        route: &StaticRoute,
        rest: &str,
        request: &Request,
    ) -> Result<Response, Exception> {
        match request.method() {
            HttpRequestMethod::Get | HttpRequestMethod::Head => {}
            _ => return Err(Exception::MethodNotAllowed),
        }
        let relative = resolve_relative(rest)?;
        let full_path = route.directory.join(&relative);
        debug!(
            target: self.log.target(),
            "[ID{}]映射物理路径：{}",
            request.id(),
            full_path.display()
        );
        let metadata = fs::metadata(&full_path).map_err(map_io_error)?;

        if !metadata.is_dir() {
            return self.serve_file(&full_path, &metadata, request);
        }
        if !request.path().ends_with('/') {
            let mut location = format!("{}/", request.path());
            if let Some(query) = request.query() {
                location.push('?');
                location.push_str(query);
            }
            return Ok(Response::redirect(&location, true));
        }
        let index = full_path.join(INDEX_FILE);
        if let Ok(index_metadata) = fs::metadata(&index) {
            if index_metadata.is_file() {
                return self.serve_file(&index, &index_metadata, request);
            }
        }
        if self.directory_listing {
            return self.list_directory(&full_path, request);
        }
        Err(Exception::FileNotFound)
    }

    fn list_directory(&self, dir: &Path, request: &Request) -> Result<Response, Exception> {
        let mut entries = vec![];
        for entry in fs::read_dir(dir).map_err(map_io_error)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if FORBIDDEN_NAME.is_match(&name) {
                continue;
            }
            let metadata = entry.metadata().ok();
            entries.push(ListingEntry {
                name,
                is_dir: metadata.as_ref().map_or(false, |m| m.is_dir()),
                size: metadata.as_ref().map_or(0, |m| m.len()),
                modified: metadata.and_then(|m| m.modified().ok()),
            });
        }
        let html = HtmlBuilder::from_dir(request.path(), &mut entries).build();
        Ok(Response::html(200, html))
    }

    fn serve_file(
        &self,
        path: &Path,
        metadata: &Metadata,
        request: &Request,
    ) -> Result<Response, Exception> {
        let size = metadata.len();
        let modified = metadata.modified().ok();
        let etag = entity_tag(size, modified);

        let mut response = Response::new(200);
        response.set_header("Content-Type", mime_for(path));
        response.set_header("ETag", etag.as_str());
        if let Some(modified) = modified {
            response.set_header("Last-Modified", http_date(modified));
        }
        response.set_header("Cache-Control", format!("public, max-age={}", self.max_age));
        response.set_header("Accept-Ranges", "bytes");

        if not_modified(request, &etag, modified) {
            response.set_status(304);
            response.remove_header("Content-Type");
            return Ok(response);
        }

        let (offset, len) = match request.range() {
            Some(range) => {
                let (start, end) = range
                    .resolve(size)
                    .ok_or(Exception::RangeNotSatisfiable(size))?;
                response.set_status(206);
                response.set_header("Content-Range", format!("bytes {}-{}/{}", start, end, size));
                (start, end - start + 1)
            }
            None => (0, size),
        };

        // HEAD 与 GET 走同一路径，压缩后的头部才一致
        if len > self.streaming_threshold {
            debug!(
                target: self.log.target(),
                "[ID{}]文件 {} 以流式方式发送 {} bytes",
                request.id(),
                path.display(),
                len
            );
            response.set_file_body(FileBody {
                path: path.to_path_buf(),
                offset,
                len,
            });
            return Ok(response);
        }

        let content = match modified {
            Some(modified) if self.enable_cache && size <= self.streaming_threshold => {
                let whole = self.load_cached(path, size, modified)?;
                let end = (offset + len) as usize;
                if end <= whole.len() {
                    whole.slice(offset as usize..end)
                } else {
                    // 读取期间文件被截断
                    return Err(Exception::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
                }
            }
            _ => read_range(path, offset, len)?,
        };
        response.set_body(content);
        Ok(response)
    }

    fn load_cached(&self, path: &Path, size: u64, modified: SystemTime) -> Result<Bytes, Exception> {
        if let Some(bytes) = self.lock_cache().find(path, modified) {
            self.stats.record_cache_hit();
            debug!(target: self.log.target(), "缓存命中: {}", path.display());
            return Ok(bytes);
        }
        self.stats.record_cache_miss();
        let content = Bytes::from(fs::read(path).map_err(map_io_error)?);
        let mut cache = self.lock_cache();
        if cache.should_cache(size) && cache.push(path, content.clone(), modified) {
            debug!(target: self.log.target(), "文件已加入缓存: {}", path.display());
        } else {
            debug!(
                target: self.log.target(),
                "文件过大({} bytes)，跳过缓存: {}",
                size,
                path.display()
            );
        }
        Ok(content)
    }

    pub fn cached_files(&self) -> usize {
        self.lock_cache().len()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// 解码路由剩余部分并做安全检查，返回相对于路由目录的路径。
fn resolve_relative(rest: &str) -> Result<PathBuf, Exception> {
    let decoded = percent_decode(rest).ok_or(Exception::InvalidPath)?;
    if decoded.contains('\0') || decoded.contains('\\') {
        return Err(Exception::InvalidPath);
    }
    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Exception::InvalidPath),
            s if FORBIDDEN_NAME.is_match(s) => return Err(Exception::Forbidden),
            s => relative.push(s),
        }
    }
    Ok(relative)
}

fn map_io_error(e: io::Error) -> Exception {
    match e.kind() {
        io::ErrorKind::NotFound => Exception::FileNotFound,
        io::ErrorKind::PermissionDenied => Exception::Forbidden,
        _ => Exception::Io(e),
    }
}

fn mime_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| MIME_TYPES.get(e.as_str()).copied())
        .unwrap_or(DEFAULT_MIME)
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// `"<长度十六进制>-<修改时间十六进制>"`
pub fn entity_tag(size: u64, modified: Option<SystemTime>) -> String {
    format!("\"{:x}-{:x}\"", size, modified.map_or(0, unix_seconds))
}

fn not_modified(request: &Request, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(value) = request.header("if-none-match") {
        return value.split(',').map(str::trim).any(|tag| {
            tag == "*" || tag.strip_prefix("W/").unwrap_or(tag) == etag
        });
    }
    match (request.header("if-modified-since").and_then(parse_http_date), modified) {
        (Some(since), Some(modified)) => unix_seconds(modified) <= unix_seconds(since),
        _ => false,
    }
}

fn read_range(path: &Path, offset: u64, len: u64) -> Result<Bytes, Exception> {
    let mut file = File::open(path).map_err(map_io_error)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer)?;
    Ok(Bytes::from(buffer))
}

fn error_response(e: &Exception, request: &Request) -> Response {
    let status = e.status_code();
    let mut response = Response::error(status, None, request.accepts_json());
    match e {
        Exception::MethodNotAllowed => {
            response.set_header("Allow", ALLOW);
        }
        Exception::RangeNotSatisfiable(size) => {
            response.set_header("Content-Range", format!("bytes */{}", size));
        }
        _ => {}
    }
    response
}
