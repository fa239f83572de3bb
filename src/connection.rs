// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接处理
//!
//! 每个 TCP 连接由一个 `Connection` 独占处理：读入数据、交给 `RequestParser`、
//! 分发到静态路由或处理器、写回响应。同一连接上的请求严格串行，流水线请求
//! 按到达顺序依次响应。

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::{
    fs::File as TokioFile,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    net::TcpStream,
    sync::{broadcast, mpsc},
    task, time,
};

use crate::{
    buffer_pool::PooledBuffer,
    exception::{Exception, ParseError},
    request::{ParseStatus, ParserLimits, Request, RequestParser},
    response::{ExchangeContext, FileBody, Response, WireResponse},
    server::ServerState,
};

/// 监听停机通知。通知只需收到一次。
#[derive(Debug)]
pub(crate) struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub(crate) fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub(crate) async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        // 发送端全部关闭同样视为停机
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

pub(crate) struct Connection {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    buffer: PooledBuffer,
    parser: RequestParser,
    state: Arc<ServerState>,
    shutdown: Shutdown,
    served: usize,
    _shutdown_complete: mpsc::Sender<()>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        state: Arc<ServerState>,
        shutdown: Shutdown,
        shutdown_complete: mpsc::Sender<()>,
    ) -> Self {
        let buffer = state.pool.acquire();
        let parser = RequestParser::new(ParserLimits::from_config(&state.config))
            .with_log(state.log.child("parser"));
        Self {
            id,
            peer,
            stream,
            buffer,
            parser,
            state,
            shutdown,
            served: 0,
            _shutdown_complete: shutdown_complete,
        }
    }

    pub(crate) async fn run(&mut self) -> Result<(), Exception> {
        let log = self.state.log.clone();
        debug!(target: log.target(), "[CONN{}]连接建立: {}", self.id, self.peer);
        let result = self.serve().await;
        let _ = self.stream.shutdown().await;
        debug!(
            target: log.target(),
            "[CONN{}]连接关闭，共处理 {} 个请求",
            self.id,
            self.served
        );
        result
    }

    async fn serve(&mut self) -> Result<(), Exception> {
        let keep_alive = self.state.config.keep_alive();
        let read_size = self.state.config.io_buffer_size;
        loop {
            // 先处理缓冲区里已有的请求，流水线请求不需要等待新数据
            match self.parser.parse(&mut self.buffer) {
                Ok(ParseStatus::Complete(request)) => {
                    self.state.stats.record_parse_time(request.parse_time());
                    if !self.respond(request).await? {
                        return Ok(());
                    }
                    continue;
                }
                Ok(ParseStatus::NeedMoreData) => {}
                Err(e) => {
                    let recovered = self.parser.recover(&mut self.buffer);
                    if !self.respond_parse_error(e, recovered).await? {
                        return Ok(());
                    }
                    continue;
                }
            }
            if self.shutdown.is_shutdown() {
                return Ok(());
            }

            self.buffer.reserve(read_size);
            let read = tokio::select! {
                res = time::timeout(keep_alive, self.stream.read_buf(&mut *self.buffer)) => res,
                _ = self.shutdown.recv() => {
                    debug!(target: self.state.log.target(), "[CONN{}]收到停机通知", self.id);
                    return Ok(());
                }
            };
            match read {
                Err(_) => {
                    debug!(
                        target: self.state.log.target(),
                        "[CONN{}]空闲超过 {:?}，关闭连接",
                        self.id,
                        keep_alive
                    );
                    return Ok(());
                }
                Ok(Ok(0)) => {
                    if !self.buffer.is_empty() {
                        debug!(
                            target: self.state.log.target(),
                            "[CONN{}]对端在请求未完整时关闭，丢弃 {} bytes",
                            self.id,
                            self.buffer.len()
                        );
                    }
                    return Ok(());
                }
                Ok(Ok(n)) => self.state.stats.record_bytes_received(n),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// 处理一个完整请求，返回连接是否保持。
    async fn respond(&mut self, request: Request) -> Result<bool, Exception> {
        let id = request.id();
        self.served += 1;
        let keep_alive = request.keep_alive()
            && self.served < self.state.config.max_requests_per_connection
            && !self.shutdown.is_shutdown();
        let ctx = ExchangeContext::from_request(&request, keep_alive);
        let summary = format!("{} {} {}", request.method(), request.target(), request.version());
        if request.is_json() {
            self.state.stats.record_json_request();
        }

        let response = self.dispatch(request).await;
        let wire = self.state.builder.build(response, &ctx);
        let status = wire.status;
        let keep_alive = wire.keep_alive;
        self.write_response(wire, id).await?;
        self.state.stats.record_request();
        info!(
            target: self.state.log.target(),
            "[ID{}] {} {} -> {}",
            id,
            self.peer,
            summary,
            status
        );
        Ok(keep_alive)
    }

    async fn dispatch(&self, mut request: Request) -> Response {
        let id = request.id();
        let accepts_json = request.accepts_json();
        // 同时运行的处理器不超过 threads 个
        let permit = match Arc::clone(&self.state.handler_slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(target: self.state.log.target(), "[ID{}]处理器名额不可用: {}", id, e);
                return Response::error(503, None, accepts_json);
            }
        };
        let state = Arc::clone(&self.state);
        let task = task::spawn_blocking(move || {
            let _permit = permit;
            state.dispatch(&mut request)
        });
        match task.await {
            Ok(response) => response,
            Err(e) => {
                // 处理器 panic
                error!(
                    target: self.state.log.target(),
                    "[ID{}]请求处理任务异常终止: {}",
                    id,
                    e
                );
                self.state.stats.record_error();
                Response::error(500, None, accepts_json)
            }
        }
    }

    /// 回复解析错误，返回连接是否保持。只有跳过了出错请求时才保持。
    async fn respond_parse_error(
        &mut self,
        e: ParseError,
        recovered: bool,
    ) -> Result<bool, Exception> {
        warn!(
            target: self.state.log.target(),
            "[CONN{}]请求解析失败: {}{}",
            self.id,
            e,
            if recovered { "，连接继续" } else { "" }
        );
        self.state.stats.record_error();
        self.served += 1;
        let ctx = ExchangeContext {
            keep_alive: recovered
                && self.served < self.state.config.max_requests_per_connection
                && !self.shutdown.is_shutdown(),
            ..ExchangeContext::fallback(self.id)
        };
        let wire = self
            .state
            .builder
            .build(Response::error(e.status_code(), None, false), &ctx);
        let keep_alive = wire.keep_alive;
        self.write_response(wire, self.id).await?;
        Ok(keep_alive)
    }

    async fn write_response(&mut self, wire: WireResponse, id: u64) -> Result<(), Exception> {
        self.stream.write_all(&wire.wire).await?;
        let mut sent = wire.wire.len();
        if let Some(file) = &wire.file {
            sent += self.stream_file(file, id).await?;
        }
        self.stream.flush().await?;
        self.state.stats.record_bytes_sent(sent);
        debug!(
            target: self.state.log.target(),
            "[ID{}]响应发送完毕，共 {} bytes",
            id,
            sent
        );
        Ok(())
    }

    // 按 io_buffer_size 分块把文件区间写入连接
    async fn stream_file(&mut self, body: &FileBody, id: u64) -> Result<usize, Exception> {
        let chunk_size = self.state.config.io_buffer_size;
        let mut file = TokioFile::open(&body.path).await?;
        file.seek(SeekFrom::Start(body.offset)).await?;
        let mut reader = file.take(body.len);
        let mut chunk = self.state.pool.acquire();
        let mut sent = 0usize;
        loop {
            chunk.clear();
            chunk.reserve(chunk_size);
            let n = reader.read_buf(&mut *chunk).await?;
            if n == 0 {
                break;
            }
            self.stream.write_all(&chunk).await?;
            sent += n;
        }
        if (sent as u64) < body.len {
            error!(
                target: self.state.log.target(),
                "[ID{}]文件 {} 在发送过程中被截断: {}/{} bytes",
                id,
                body.path.display(),
                sent,
                body.len
            );
            return Err(Exception::Io(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )));
        }
        debug!(
            target: self.state.log.target(),
            "[ID{}]流式传输完成，共发送 {} bytes",
            id,
            sent
        );
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_on_send() {
        let (tx, _) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(tx.subscribe());
        assert!(!shutdown.is_shutdown());
        tx.send(()).unwrap();
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
        // 再次调用立即返回
        shutdown.recv().await;
    }

    #[tokio::test]
    async fn test_shutdown_on_sender_dropped() {
        let (tx, _) = broadcast::channel::<()>(1);
        let mut shutdown = Shutdown::new(tx.subscribe());
        drop(tx);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}
