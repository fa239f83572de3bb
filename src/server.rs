// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器
//!
//! `Server` 是嵌入方使用的入口：注册处理器与静态路由、读取统计、启动监听。
//! `start()` 返回的 `RunningServer` 负责停机：停止接受新连接，等待正在处理的
//! 请求完成，再等待所有连接退出。

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    runtime::Builder,
    signal,
    sync::{broadcast, mpsc, Semaphore},
    task::JoinHandle,
    time,
};

use crate::{
    buffer_pool::BufferPool,
    config::ServerConfig,
    connection::{Connection, Shutdown},
    exception::Exception,
    handler::RequestHandler,
    logging::LogHandle,
    request::Request,
    response::{Response, ResponseBuilder},
    router::Router,
    static_files::StaticFiles,
    stats::{Stats, StatsSnapshot},
};

const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// 所有连接共享的服务器状态
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) stats: Arc<Stats>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) builder: ResponseBuilder,
    pub(crate) static_files: StaticFiles,
    pub(crate) router: Router,
    /// 同时执行的处理器数量上限，等于 `threads`
    pub(crate) handler_slots: Arc<Semaphore>,
    pub(crate) log: LogHandle,
    handler: RwLock<Option<Arc<dyn RequestHandler>>>,
}

impl ServerState {
    fn new(config: ServerConfig, log: LogHandle) -> Self {
        let stats = Arc::new(Stats::new());
        let pool = BufferPool::new(
            config.io_buffer_size,
            config.buffer_pool_size,
            config.use_memory_pool,
            log.child("pool"),
        );
        let builder = ResponseBuilder::new(
            &config,
            Arc::clone(&pool),
            Arc::clone(&stats),
            log.child("response"),
        );
        let static_files = StaticFiles::new(&config, Arc::clone(&stats), log.child("static"));
        Self {
            stats,
            pool,
            builder,
            static_files,
            router: Router::new(log.child("router")),
            handler_slots: Arc::new(Semaphore::new(config.threads)),
            log: log.child("connection"),
            handler: RwLock::new(None),
            config,
        }
    }

    fn handler(&self) -> Option<Arc<dyn RequestHandler>> {
        match self.handler.read() {
            Ok(lock) => lock.clone(),
            Err(poisoned) => {
                warn!(target: self.log.target(), "处理器锁被污染，恢复并继续");
                poisoned.into_inner().clone()
            }
        }
    }

    fn set_handler(&self, handler: Arc<dyn RequestHandler>) {
        let mut lock = match self.handler.write() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!(target: self.log.target(), "处理器锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        };
        *lock = Some(handler);
    }

    /// 同步分发：扩展方法、静态路由、模式路由、默认处理器。在阻塞线程池中执行。
    pub(crate) fn dispatch(&self, request: &mut Request) -> Response {
        let id = request.id();
        let accepts_json = request.accepts_json();
        if request.method().is_extension() {
            debug!(
                target: self.log.target(),
                "[ID{}]不支持的请求方法 {}",
                id,
                request.method()
            );
            return Response::error(501, None, accepts_json);
        }
        if let Some(response) = self.static_files.serve(request) {
            return response;
        }
        if let Some(matched) = self.router.match_route(request.path()) {
            debug!(
                target: self.log.target(),
                "[ID{}]命中路由，参数 {:?}",
                id,
                matched.params
            );
            request.set_path_params(matched.params);
            return self.invoke(matched.handler.as_ref(), request);
        }
        match self.handler() {
            Some(handler) => self.invoke(handler.as_ref(), request),
            None => Response::error(501, Some("No request handler configured"), accepts_json),
        }
    }

    fn invoke(&self, handler: &dyn RequestHandler, request: &Request) -> Response {
        let id = request.id();
        let accepts_json = request.accepts_json();
        match handler.handle(request) {
            Ok(response) => response,
            Err(e) => {
                error!(target: self.log.target(), "[ID{}]{}", id, e);
                self.stats.record_error();
                Response::error(500, None, accepts_json)
            }
        }
    }
}

pub struct Server {
    state: Arc<ServerState>,
    root_log: LogHandle,
}

impl Server {
    /// 校验配置并创建服务器。配置非法时返回 `Exception::InvalidConfig`。
    pub fn new(config: ServerConfig) -> Result<Self, Exception> {
        Self::with_log(config, LogHandle::default())
    }

    pub fn with_log(config: ServerConfig, log: LogHandle) -> Result<Self, Exception> {
        if let Err(e) = config.validate(&log) {
            error!(target: log.target(), "配置校验失败: {}", e);
            return Err(e);
        }
        Ok(Self {
            state: Arc::new(ServerState::new(config, log.clone())),
            root_log: log,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn set_request_handler<H: RequestHandler + 'static>(&self, handler: H) {
        self.state.set_handler(Arc::new(handler));
    }

    /// 注册路径模式路由，如 `/users/{id}`。模式非法时返回 `Exception::InvalidRoute`。
    pub fn add_route<H: RequestHandler + 'static>(
        &self,
        pattern: &str,
        handler: H,
    ) -> Result<(), Exception> {
        self.state.router.add_route(pattern, Arc::new(handler))
    }

    pub fn remove_route(&self, pattern: &str) -> bool {
        self.state.router.remove_route(pattern)
    }

    pub fn list_routes(&self) -> Vec<String> {
        self.state.router.list_routes()
    }

    pub fn add_static_route(&self, prefix: &str, directory: impl Into<PathBuf>) {
        self.state.static_files.add_route(prefix, directory);
    }

    pub fn remove_static_route(&self, prefix: &str) -> bool {
        self.state.static_files.remove_route(prefix)
    }

    pub fn list_static_routes(&self) -> Vec<String> {
        self.state.static_files.list_routes()
    }

    /// 从静态文件缓存中移除一个文件，返回是否曾被缓存。
    pub fn invalidate_file(&self, path: impl AsRef<Path>) -> bool {
        self.state.static_files.invalidate_file(path.as_ref())
    }

    pub fn clear_cache(&self) {
        self.state.static_files.clear_cache();
    }

    pub fn get_stats(&self) -> BTreeMap<String, serde_json::Value> {
        self.state.stats.snapshot().to_map()
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    /// 共享的统计对象，供处理器内部读取
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.state.stats)
    }

    /// 绑定监听地址并开始接受连接。绑定失败是致命错误。
    pub async fn start(self) -> Result<RunningServer, Exception> {
        let log = self.root_log;
        let address = self.state.config.bind_address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(target: log.target(), "无法绑定地址：{}，错误：{}", address, e);
                return Err(Exception::Bind(e));
            }
        };
        let local_addr = listener.local_addr()?;
        info!(
            target: log.target(),
            "服务端在 {} 上监听Socket连接，工作线程 {}",
            local_addr,
            self.state.config.threads
        );

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);
        let running = Arc::new(AtomicBool::new(true));

        let mut accept_loop = Listener {
            listener,
            state: Arc::clone(&self.state),
            limit_connections: Arc::new(Semaphore::new(self.state.config.max_connections)),
            notify_shutdown: notify_shutdown.clone(),
            shutdown_complete_tx,
            next_id: AtomicU64::new(1),
            log: log.child("listener"),
        };
        let mut shutdown = Shutdown::new(notify_shutdown.subscribe());
        let accept_running = Arc::clone(&running);
        let accept_log = log.clone();
        let accept_task = tokio::spawn(async move {
            let result = tokio::select! {
                res = accept_loop.run() => {
                    if let Err(e) = &res {
                        error!(target: accept_log.target(), "接受连接循环退出: {}", e);
                    }
                    res
                }
                _ = shutdown.recv() => {
                    info!(target: accept_log.target(), "停止接受新连接");
                    Ok(())
                }
            };
            accept_running.store(false, Ordering::SeqCst);
            result
        });

        Ok(RunningServer {
            state: self.state,
            local_addr,
            running,
            notify_shutdown: Some(notify_shutdown),
            shutdown_complete_rx,
            accept_task: Some(accept_task),
            log,
        })
    }

    /// 构建 `threads` 个工作线程的运行时并服务，直到收到 Ctrl-C。
    pub fn run(self) -> Result<(), Exception> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.state.config.threads)
            .enable_all()
            .build()?;
        runtime.block_on(async move {
            let log = self.root_log.clone();
            let mut running = self.start().await?;
            let outcome = tokio::select! {
                res = signal::ctrl_c() => {
                    match res {
                        Ok(()) => info!(target: log.target(), "收到 Ctrl-C，开始停机"),
                        Err(e) => error!(target: log.target(), "无法监听停机信号: {}", e),
                    }
                    Ok(())
                }
                res = running.accept_finished() => res,
            };
            running.shutdown().await;
            outcome
        })
    }
}

pub struct RunningServer {
    state: Arc<ServerState>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    notify_shutdown: Option<broadcast::Sender<()>>,
    shutdown_complete_rx: mpsc::Receiver<()>,
    accept_task: Option<JoinHandle<Result<(), Exception>>>,
    log: LogHandle,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> BTreeMap<String, serde_json::Value> {
        self.state.stats.snapshot().to_map()
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    pub fn set_request_handler<H: RequestHandler + 'static>(&self, handler: H) {
        self.state.set_handler(Arc::new(handler));
    }

    /// 注册路径模式路由，如 `/users/{id}`。模式非法时返回 `Exception::InvalidRoute`。
    pub fn add_route<H: RequestHandler + 'static>(
        &self,
        pattern: &str,
        handler: H,
    ) -> Result<(), Exception> {
        self.state.router.add_route(pattern, Arc::new(handler))
    }

    pub fn remove_route(&self, pattern: &str) -> bool {
        self.state.router.remove_route(pattern)
    }

    pub fn list_routes(&self) -> Vec<String> {
        self.state.router.list_routes()
    }

    pub fn add_static_route(&self, prefix: &str, directory: impl Into<PathBuf>) {
        self.state.static_files.add_route(prefix, directory);
    }

    pub fn remove_static_route(&self, prefix: &str) -> bool {
        self.state.static_files.remove_route(prefix)
    }

    pub fn list_static_routes(&self) -> Vec<String> {
        self.state.static_files.list_routes()
    }

    /// 从静态文件缓存中移除一个文件，返回是否曾被缓存。
    pub fn invalidate_file(&self, path: impl AsRef<Path>) -> bool {
        self.state.static_files.invalidate_file(path.as_ref())
    }

    pub fn clear_cache(&self) {
        self.state.static_files.clear_cache();
    }

    /// 等待接受连接的循环结束。监听套接字失效时返回其错误。
    pub async fn accept_finished(&mut self) -> Result<(), Exception> {
        let result = match self.accept_task.as_mut() {
            Some(task) => task.await,
            None => return Ok(()),
        };
        self.accept_task = None;
        match result {
            Ok(res) => res,
            Err(e) => Err(Exception::Io(io::Error::new(io::ErrorKind::Other, e))),
        }
    }

    /// 停止接受连接，等待进行中的请求完成、所有连接退出。
    pub async fn shutdown(mut self) {
        info!(target: self.log.target(), "开始停机");
        self.running.store(false, Ordering::SeqCst);
        if let Some(notify) = self.notify_shutdown.take() {
            // 没有订阅者时发送失败，无需处理
            let _ = notify.send(());
        }
        if let Some(task) = self.accept_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(target: self.log.target(), "接受连接循环此前已退出: {}", e),
                Err(e) => warn!(target: self.log.target(), "接受连接任务异常结束: {}", e),
            }
        }
        let _ = self.shutdown_complete_rx.recv().await;
        info!(
            target: self.log.target(),
            "停机完成，共处理 {} 个请求",
            self.state.stats.snapshot().requests_processed
        );
    }
}

struct Listener {
    listener: TcpListener,
    state: Arc<ServerState>,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    next_id: AtomicU64,
    log: LogHandle,
}

impl Listener {
    async fn run(&mut self) -> Result<(), Exception> {
        info!(target: self.log.target(), "开始接受连接");
        loop {
            let permit = Arc::clone(&self.limit_connections)
                .acquire_owned()
                .await
                .map_err(|e| Exception::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

            let (socket, peer) = self.accept().await?;
            if let Err(e) = socket.set_nodelay(true) {
                debug!(target: self.log.target(), "设置 TCP_NODELAY 失败: {}", e);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let stats = Arc::clone(&self.state.stats);
            let log = self.log.clone();
            let mut connection = Connection::new(
                id,
                socket,
                peer,
                Arc::clone(&self.state),
                Shutdown::new(self.notify_shutdown.subscribe()),
                self.shutdown_complete_tx.clone(),
            );
            stats.connection_opened();
            tokio::spawn(async move {
                if let Err(e) = connection.run().await {
                    warn!(target: log.target(), "[CONN{}]连接异常结束: {}", id, e);
                    stats.record_error();
                }
                stats.connection_closed();
                drop(permit);
            });
        }
    }

    // 暂时性错误按指数退避重试；监听套接字失效时返回错误，监听循环退出
    async fn accept(&mut self) -> Result<(TcpStream, SocketAddr), Exception> {
        let mut backoff = INITIAL_ACCEPT_BACKOFF;
        loop {
            match self.listener.accept().await {
                Ok(pair) => return Ok(pair),
                Err(e) => {
                    self.state.stats.record_error();
                    if is_fatal_accept_error(&e) {
                        error!(target: self.log.target(), "监听套接字不可用: {}", e);
                        return Err(Exception::Accept(e));
                    }
                    let e = Exception::Accept(e);
                    warn!(
                        target: self.log.target(),
                        "{}，{}ms 后重试",
                        e,
                        backoff.as_millis()
                    );
                }
            }
            time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
        }
    }
}

#[cfg(unix)]
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EBADF) | Some(libc::EINVAL) | Some(libc::ENOTSOCK)
    )
}

#[cfg(not(unix))]
fn is_fatal_accept_error(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::InvalidInput
}
