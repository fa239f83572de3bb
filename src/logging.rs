// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 日志模块
//!
//! 日志后端使用 log4rs，优先从 YAML 文件加载配置，文件缺失时退回控制台输出。
//!
//! 各组件不直接依赖全局的模块路径作为日志目标，而是在构造时接收一个 `LogHandle`，
//! 所有日志都写到该句柄指定的 target 下，便于在 log4rs 配置中按组件调整级别。

use std::path::Path;
use std::sync::Arc;

use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

use crate::exception::Exception;

const FALLBACK_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} [{t}] {m}{n}";

/// 初始化日志系统。
///
/// `path` 指向的 YAML 存在且有效时按其配置，否则安装一个 Info 级别的控制台输出。
/// 重复初始化会返回 `Exception::Logging`。
pub fn init<P: AsRef<Path>>(path: P) -> Result<(), Exception> {
    let path = path.as_ref();
    if !path.exists() {
        return init_console(LevelFilter::Info);
    }
    match log4rs::init_file(path, Default::default()) {
        Ok(()) => Ok(()),
        Err(e) => {
            init_console(LevelFilter::Info)?;
            log::warn!(
                target: LogHandle::default().target(),
                "日志配置 {} 无效，改用控制台输出: {}",
                path.display(),
                e
            );
            Ok(())
        }
    }
}

pub fn init_console(level: LevelFilter) -> Result<(), Exception> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FALLBACK_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| Exception::Logging(e.to_string()))?;
    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|e| Exception::Logging(e.to_string()))
}

/// 传递给各组件的日志句柄，决定日志记录的 target。
#[derive(Debug, Clone)]
pub struct LogHandle {
    target: Arc<str>,
}

impl LogHandle {
    pub fn new(target: &str) -> Self {
        Self {
            target: Arc::from(target),
        }
    }

    /// 派生子组件的句柄，target 为 `父::name`。
    pub fn child(&self, name: &str) -> Self {
        Self {
            target: Arc::from(format!("{}::{}", self.target, name)),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for LogHandle {
    fn default() -> Self {
        Self::new("pyspeed")
    }
}
