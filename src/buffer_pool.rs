// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 缓冲池
//!
//! 连接的读缓冲区和响应构建器的写缓冲区都从这里借出。借出的 `PooledBuffer`
//! 在 drop 时清空并归还，同一个缓冲区在任何时刻只会被一个持有者访问。

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use log::warn;

use crate::logging::LogHandle;

pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    buffer_size: usize,
    max_buffers: usize,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    log: LogHandle,
}

impl BufferPool {
    /// `buffer_size` 为每个缓冲区的初始容量，`max_buffers` 为最多保留的空闲缓冲区数。
    /// `enabled` 为 false 时每次都新分配，归还时直接释放。
    pub fn new(buffer_size: usize, max_buffers: usize, enabled: bool, log: LogHandle) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(if enabled { max_buffers } else { 0 })),
            buffer_size,
            max_buffers,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            log,
        })
    }

    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let reused = if self.enabled {
            self.lock_free_list().pop()
        } else {
            None
        };
        let buf = match reused {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.buffer_size)
            }
        };
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        if !self.enabled {
            return;
        }
        // 容量缩水或膨胀过大的缓冲区不回收
        let capacity = buf.capacity();
        if capacity < self.buffer_size || capacity > self.buffer_size.saturating_mul(4) {
            return;
        }
        buf.clear();
        let mut free = self.lock_free_list();
        if free.len() < self.max_buffers {
            free.push(buf);
        }
    }

    fn lock_free_list(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        match self.free.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!(target: self.log.target(), "缓冲池锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    pub fn available(&self) -> usize {
        self.lock_free_list().len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// 从 `BufferPool` 借出的缓冲区，drop 时自动归还。
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// 取走内部缓冲区，不再归还给缓冲池。
    pub fn detach(mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // detach 之后留下的是零容量缓冲区，release 会直接丢弃
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
