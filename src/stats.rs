// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 运行统计
//!
//! 工作线程通过原子计数器更新统计信息，控制面通过 `snapshot()` 读取一致性要求不高的快照。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_derive::Serialize;

#[derive(Debug)]
pub struct Stats {
    requests_processed: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    errors: AtomicU64,
    json_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    parse_time_ns: AtomicU64,
    parse_count: AtomicU64,
    build_time_ns: AtomicU64,
    build_count: AtomicU64,
    compressed_responses: AtomicU64,
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    start_time: Instant,
}

/// `get_stats()` 返回的统计快照。
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub requests_processed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests_per_second: f64,
    pub cache_hit_ratio: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub json_requests: u64,
    pub average_parse_time_us: f64,
    pub average_build_time_us: f64,
    pub errors: u64,
    pub compressed_responses: u64,
    pub connections_total: u64,
    pub connections_active: u64,
    pub uptime_seconds: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests_processed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            json_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            parse_time_ns: AtomicU64::new(0),
            parse_count: AtomicU64::new(0),
            build_time_ns: AtomicU64::new(0),
            build_count: AtomicU64::new(0),
            compressed_responses: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_bytes_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_json_request(&self) {
        self.json_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compressed(&self) {
        self.compressed_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_time(&self, elapsed: Duration) {
        self.parse_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.parse_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_time(&self, elapsed: Duration) {
        self.build_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.build_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let requests_processed = self.requests_processed.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs_f64();

        StatsSnapshot {
            requests_processed,
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            requests_per_second: if uptime > 0.0 {
                requests_processed as f64 / uptime
            } else {
                0.0
            },
            cache_hit_ratio: ratio(cache_hits, cache_hits + cache_misses),
            cache_hits,
            cache_misses,
            json_requests: self.json_requests.load(Ordering::Relaxed),
            average_parse_time_us: average_us(&self.parse_time_ns, &self.parse_count),
            average_build_time_us: average_us(&self.build_time_ns, &self.build_count),
            errors: self.errors.load(Ordering::Relaxed),
            compressed_responses: self.compressed_responses.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            uptime_seconds: uptime,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// 以键值映射的形式输出，键名与字段名一致。
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn average_us(total_ns: &AtomicU64, count: &AtomicU64) -> f64 {
    let count = count.load(Ordering::Relaxed);
    if count == 0 {
        return 0.0;
    }
    total_ns.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
}
