// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::fs::File;
use std::io::prelude::*;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::{exception::Exception, logging::LogHandle};

/// 配置文件中可识别的键，其余键只会产生警告。
const KNOWN_KEYS: &[&str] = &[
    "address",
    "port",
    "threads",
    "enable_compression",
    "enable_static_cache",
    "static_cache_size",
    "max_request_size",
    "keep_alive_timeout",
    "use_memory_pool",
    "enable_zero_copy",
    "io_buffer_size",
    "max_header_size",
    "max_requests_per_connection",
    "max_connections",
    "compression_threshold",
    "json_max_depth",
    "streaming_threshold",
    "buffer_pool_size",
    "static_cache_max_age",
    "directory_listing",
];

const MAX_THREADS: usize = 1024;

/// 服务器配置快照。服务器启动后不再修改。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 工作线程数，缺省为 CPU 核数
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_true")]
    pub enable_compression: bool,
    #[serde(default = "default_true")]
    pub enable_static_cache: bool,
    /// 静态文件缓存容量（MB）
    #[serde(default = "default_static_cache_size")]
    pub static_cache_size: usize,
    /// 单个请求（头部加请求体）允许的最大字节数
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// 空闲连接的超时时间（秒）
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout: u64,
    #[serde(default = "default_true")]
    pub use_memory_pool: bool,
    #[serde(default = "default_true")]
    pub enable_zero_copy: bool,
    #[serde(default = "default_io_buffer_size")]
    pub io_buffer_size: usize,
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,
    /// 单个长连接最多处理的请求数，达到后响应携带 `Connection: close`
    #[serde(default = "default_max_requests_per_connection")]
    pub max_requests_per_connection: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 小于该字节数的响应体不压缩
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    #[serde(default = "default_json_max_depth")]
    pub json_max_depth: usize,
    /// 超过该大小的静态文件直接从磁盘流式发送
    #[serde(default = "default_streaming_threshold")]
    pub streaming_threshold: u64,
    /// 缓冲池最多保留的空闲缓冲区数量
    #[serde(default = "default_buffer_pool_size")]
    pub buffer_pool_size: usize,
    /// 静态文件 `Cache-Control: max-age`（秒）
    #[serde(default = "default_static_cache_max_age")]
    pub static_cache_max_age: u64,
    #[serde(default)]
    pub directory_listing: bool,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_true() -> bool {
    true
}

fn default_static_cache_size() -> usize {
    1024 // 1GB
}

fn default_max_request_size() -> usize {
    10485760 // 10MB
}

fn default_keep_alive_timeout() -> u64 {
    30
}

fn default_io_buffer_size() -> usize {
    65536 // 64KB
}

fn default_max_header_size() -> usize {
    65536
}

fn default_max_requests_per_connection() -> usize {
    1000
}

fn default_max_connections() -> usize {
    10000
}

fn default_compression_threshold() -> usize {
    1024
}

fn default_json_max_depth() -> usize {
    100
}

fn default_streaming_threshold() -> u64 {
    10485760 // 10MB
}

fn default_buffer_pool_size() -> usize {
    256
}

fn default_static_cache_max_age() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            threads: default_threads(),
            enable_compression: true,
            enable_static_cache: true,
            static_cache_size: default_static_cache_size(),
            max_request_size: default_max_request_size(),
            keep_alive_timeout: default_keep_alive_timeout(),
            use_memory_pool: true,
            enable_zero_copy: true,
            io_buffer_size: default_io_buffer_size(),
            max_header_size: default_max_header_size(),
            max_requests_per_connection: default_max_requests_per_connection(),
            max_connections: default_max_connections(),
            compression_threshold: default_compression_threshold(),
            json_max_depth: default_json_max_depth(),
            streaming_threshold: default_streaming_threshold(),
            buffer_pool_size: default_buffer_pool_size(),
            static_cache_max_age: default_static_cache_max_age(),
            directory_listing: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文本构建配置。未识别的键记录警告后忽略。
    pub fn from_toml_str(text: &str, log: &LogHandle) -> Result<Self, Exception> {
        let table: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| Exception::InvalidConfig(e.to_string()))?;
        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warn!(target: log.target(), "未知的配置项 `{}`，已忽略", key);
            }
        }
        toml::Value::Table(table)
            .try_into::<ServerConfig>()
            .map_err(|e| Exception::InvalidConfig(e.to_string()))
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P, log: &LogHandle) -> Result<Self, Exception> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)?;
        let config = Self::from_toml_str(&str_val, log)?;
        info!(target: log.target(), "配置文件 {} 已载入", path.display());
        Ok(config)
    }

    /// 检查配置值是否在合法范围内。任何一项不合法都会阻止服务器启动。
    pub fn validate(&self, log: &LogHandle) -> Result<(), Exception> {
        if self.threads == 0 {
            return Err(Exception::InvalidConfig("threads must be at least 1".into()));
        }
        if self.threads > MAX_THREADS {
            return Err(Exception::InvalidConfig(format!(
                "threads must not exceed {}",
                MAX_THREADS
            )));
        }
        if self.io_buffer_size == 0 {
            return Err(Exception::InvalidConfig("io_buffer_size must be positive".into()));
        }
        if self.max_request_size == 0 {
            return Err(Exception::InvalidConfig("max_request_size must be positive".into()));
        }
        if self.max_header_size == 0 {
            return Err(Exception::InvalidConfig("max_header_size must be positive".into()));
        }
        if self.keep_alive_timeout == 0 {
            return Err(Exception::InvalidConfig("keep_alive_timeout must be positive".into()));
        }
        if self.max_connections == 0 {
            return Err(Exception::InvalidConfig("max_connections must be positive".into()));
        }
        if self.max_requests_per_connection == 0 {
            return Err(Exception::InvalidConfig(
                "max_requests_per_connection must be positive".into(),
            ));
        }
        if self.address.parse::<IpAddr>().is_err() {
            return Err(Exception::InvalidConfig(format!(
                "address `{}` is not an IP address",
                self.address
            )));
        }
        if self.enable_static_cache && self.static_cache_size == 0 {
            warn!(
                target: log.target(),
                "static_cache_size 为 0，静态文件缓存将不会保存任何内容"
            );
        }
        Ok(())
    }

    pub fn static_cache_bytes(&self) -> usize {
        self.static_cache_size.saturating_mul(1024 * 1024)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout)
    }

    pub fn bind_address(&self) -> String {
        match self.address.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.address, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> LogHandle {
        LogHandle::new("pyspeed::config")
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.threads, num_cpus::get());
        assert_eq!(config.max_request_size, 10 * 1024 * 1024);
        assert_eq!(config.keep_alive_timeout, 30);
        assert_eq!(config.io_buffer_size, 65536);
        assert!(config.enable_compression);
        assert!(config.validate(&log()).is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml_str("port = 9000\nthreads = 2\n", &log()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.threads, 2);
        assert_eq!(config.keep_alive_timeout, 30);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config =
            ServerConfig::from_toml_str("port = 9001\nturbo_mode = true\n", &log()).unwrap();
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result = ServerConfig::from_toml_str("port = \"eighty\"\n", &log());
        assert!(matches!(result, Err(Exception::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_threads_is_fatal() {
        let config = ServerConfig::from_toml_str("threads = 0\n", &log()).unwrap();
        let err = config.validate(&log()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ServerConfig::default();
        config.io_buffer_size = 0;
        assert!(config.validate(&log()).is_err());

        let mut config = ServerConfig::default();
        config.address = "localhost".to_string();
        assert!(config.validate(&log()).is_err());

        let mut config = ServerConfig::default();
        config.threads = 4096;
        assert!(config.validate(&log()).is_err());
    }

    #[test]
    fn test_bind_address() {
        let mut config = ServerConfig::default();
        config.address = "127.0.0.1".into();
        config.port = 0;
        assert_eq!(config.bind_address(), "127.0.0.1:0");
        config.address = "::1".into();
        assert_eq!(config.bind_address(), "[::1]:0");
    }

    #[test]
    fn test_from_missing_file() {
        let result = ServerConfig::from_toml_file("/nonexistent/pyspeed.toml", &log());
        assert!(matches!(result, Err(Exception::Io(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "address = \"127.0.0.1\"\nenable_compression = false").unwrap();
        let config = ServerConfig::from_toml_file(file.path(), &log()).unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert!(!config.enable_compression);
    }
}
