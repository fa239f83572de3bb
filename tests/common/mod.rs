// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 集成测试公共工具
//!
//! 在 `127.0.0.1:0` 上启动进程内服务器，并提供一个基于原始 TCP 的最小 HTTP 客户端，
//! 以便精确控制报文的发送时机与内容。

#![allow(dead_code)]

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use pyspeed::{
    exception::HandlerError,
    json::{JsonObject, JsonValue},
    Request, Response, RunningServer, Server, ServerConfig,
};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1".to_string(),
        port: 0,
        threads: 2,
        ..ServerConfig::default()
    }
}

/// 测试用处理器，按路径分派。
pub fn test_handler(request: &Request) -> Result<Response, HandlerError> {
    let path = request.path();
    match path {
        "/health" => {
            let mut body = JsonObject::new();
            body.insert("status", JsonValue::from("ok"));
            Ok(Response::json(200, &JsonValue::from(body)))
        }
        "/echo" => match request.json() {
            Ok(value) => Ok(Response::json(200, &value)),
            Err(e) => Ok(Response::error(400, Some(&e.to_string()), true)),
        },
        "/big" => Ok(Response::text(200, "a".repeat(10_000))),
        "/slow" => {
            thread::sleep(Duration::from_millis(300));
            Ok(Response::text(200, "done"))
        }
        "/fail" => Err(HandlerError::new("secret database password leaked")),
        "/panic" => panic!("handler exploded"),
        _ if path.starts_with("/token/") => Ok(Response::text(200, &path["/token/".len()..])),
        _ => Ok(Response::error(404, None, request.accepts_json())),
    }
}

pub async fn start_server(config: ServerConfig) -> RunningServer {
    let server = Server::new(config).expect("配置应当合法");
    server.set_request_handler(test_handler);
    server.start().await.expect("服务器应当启动成功")
}

pub async fn start_bare_server(config: ServerConfig) -> RunningServer {
    let server = Server::new(config).expect("配置应当合法");
    server.start().await.expect("服务器应当启动成功")
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.expect("连接服务器失败");
        Client {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn send(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).await.expect("发送请求失败");
    }

    /// 发送后不关心写入结果，用于对端可能已经关闭连接的场景。
    pub async fn try_send(&mut self, raw: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(raw).await
    }

    pub async fn request(&mut self, raw: &str) -> RawResponse {
        self.send(raw.as_bytes()).await;
        self.read_response().await.expect("连接意外关闭")
    }

    pub async fn read_response(&mut self) -> Option<RawResponse> {
        self.read_response_inner(false).await
    }

    /// HEAD 响应带 `Content-Length` 但没有响应体。
    pub async fn read_head_response(&mut self) -> Option<RawResponse> {
        self.read_response_inner(true).await
    }

    async fn read_response_inner(&mut self, head_only: bool) -> Option<RawResponse> {
        let head_end = loop {
            if let Some(i) = find(&self.buf, b"\r\n\r\n") {
                break i + 4;
            }
            if !self.fill().await {
                return None;
            }
        };

        let head = String::from_utf8_lossy(&self.buf[..head_end]).into_owned();
        let mut lines = head.split("\r\n");
        let status_line = lines.next()?;
        let status = status_line.split(' ').nth(1)?.parse::<u16>().ok()?;
        let headers: Vec<(String, String)> = lines
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        let length = if head_only || status == 204 || status == 304 || status < 200 {
            0
        } else {
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0)
        };

        while self.buf.len() < head_end + length {
            if !self.fill().await {
                return None;
            }
        }
        let rest = self.buf.split_off(head_end + length);
        let body = self.buf.split_off(head_end);
        self.buf = rest;
        Some(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// 在超时时间内等待对端关闭连接。
    pub async fn is_closed(&mut self) -> bool {
        let mut chunk = [0u8; 1024];
        loop {
            match time::timeout(IO_TIMEOUT, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(n)) => self.buf.extend_from_slice(&chunk[..n]),
                Err(_) => return false,
            }
        }
    }

    async fn fill(&mut self) -> bool {
        let mut chunk = [0u8; 8192];
        match time::timeout(IO_TIMEOUT, self.stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) => false,
            Ok(Ok(n)) => {
                self.buf.extend_from_slice(&chunk[..n]);
                true
            }
            Err(_) => panic!("读取响应超时"),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
