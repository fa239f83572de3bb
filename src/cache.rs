// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

/// 按字节数限制容量的 LRU 文件缓存，条目以修改时间校验。
pub struct FileCache {
    cache: LruCache<PathBuf, CacheEntry>,
    capacity_bytes: usize,
    used_bytes: usize,
}

impl FileCache {
    // 根据总字节容量构造
    pub fn from_capacity(capacity_bytes: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            capacity_bytes,
            used_bytes: 0,
        }
    }

    // 检查文件大小是否适合缓存
    pub fn should_cache(&self, file_size: u64) -> bool {
        file_size <= self.capacity_bytes as u64
    }

    // 放入，必要时淘汰最久未使用的条目
    pub fn push(&mut self, path: &Path, bytes: Bytes, modified_time: SystemTime) -> bool {
        let size = bytes.len();
        if size > self.capacity_bytes {
            return false;
        }
        if let Some(old) = self.cache.pop(path) {
            self.used_bytes -= old.content.len();
        }
        while self.used_bytes + size > self.capacity_bytes {
            match self.cache.pop_lru() {
                Some((_, evicted)) => self.used_bytes -= evicted.content.len(),
                None => break,
            }
        }
        self.used_bytes += size;
        self.cache.put(
            path.to_path_buf(),
            CacheEntry {
                content: bytes,
                modified_time,
            },
        );
        true
    }

    // 查询有效缓存，过期条目顺带移除
    pub fn find(&mut self, path: &Path, current_modified_time: SystemTime) -> Option<Bytes> {
        let stale = match self.cache.get(path) {
            Some(entry) if entry.modified_time == current_modified_time => {
                return Some(entry.content.clone())
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            if let Some(old) = self.cache.pop(path) {
                self.used_bytes -= old.content.len();
            }
        }
        None
    }

    /// 移除单个条目，返回是否存在
    pub fn invalidate(&mut self, path: &Path) -> bool {
        match self.cache.pop(path) {
            Some(old) => {
                self.used_bytes -= old.content.len();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.used_bytes = 0;
    }

    // 调整容量，超出部分按 LRU 淘汰
    pub fn set_capacity(&mut self, capacity_bytes: usize) {
        self.capacity_bytes = capacity_bytes;
        while self.used_bytes > self.capacity_bytes {
            match self.cache.pop_lru() {
                Some((_, evicted)) => self.used_bytes -= evicted.content.len(),
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }
}
