//! Scratch buffer pool for the mix path.
//!
//! Buffers are rented for the duration of a scope and returned when the
//! [`PooledBuffer`] guard drops, on every exit path including unwinding.
//! Once warm, renting a buffer no larger than the pre-warmed capacity does
//! not allocate.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// Number of buffers a default pool is warmed with.
pub const DEFAULT_POOL_BUFFERS: usize = 4;

/// Samples per pre-warmed buffer (one second of 8 channels at 48 kHz).
pub const DEFAULT_BUFFER_CAPACITY: usize = 48_000 * 8;

/// A shared free-list of `f32` buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<f32>>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_buffers(DEFAULT_POOL_BUFFERS, DEFAULT_BUFFER_CAPACITY)
    }
}

impl BufferPool {
    /// A pool pre-filled with `count` buffers of `capacity` samples.
    pub fn with_buffers(count: usize, capacity: usize) -> Self {
        let mut free = Vec::with_capacity(count.max(1) * 2);
        for _ in 0..count {
            free.push(Vec::with_capacity(capacity));
        }
        Self { free: Mutex::new(free) }
    }

    /// Rent a zeroed buffer of `len` samples.
    pub fn rent(&self, len: usize) -> PooledBuffer<'_> {
        let mut buffer = match self.free.lock() {
            Ok(mut free) => {
                // First buffer that fits; otherwise any buffer, grown below.
                match free.iter().position(|b| b.capacity() >= len) {
                    Some(idx) => free.swap_remove(idx),
                    None => free.pop().unwrap_or_default(),
                }
            }
            Err(_) => Vec::new(),
        };
        buffer.clear();
        buffer.resize(len, 0.0);
        PooledBuffer { pool: self, buffer }
    }

    /// Buffers currently available.
    pub fn available(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }

    fn give_back(&self, buffer: Vec<f32>) {
        if let Ok(mut free) = self.free.lock() {
            free.push(buffer);
        }
    }
}

/// A rented buffer, returned to its pool on drop.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: Vec<f32>,
}

impl PooledBuffer<'_> {
    /// Zero the whole buffer.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_returns_on_drop() {
        let pool = BufferPool::with_buffers(2, 16);
        {
            let a = pool.rent(8);
            let _b = pool.rent(8);
            assert_eq!(a.len(), 8);
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn rented_buffers_are_zeroed() {
        let pool = BufferPool::with_buffers(1, 4);
        {
            let mut a = pool.rent(4);
            a.fill(1.0);
        }
        let b = pool.rent(4);
        assert!(b.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn returned_even_on_panic() {
        let pool = BufferPool::with_buffers(1, 4);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _buf = pool.rent(4);
            panic!("mix failed");
        }));
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn empty_pool_still_rents() {
        let pool = BufferPool::with_buffers(0, 0);
        let buf = pool.rent(3);
        assert_eq!(buf.len(), 3);
        drop(buf);
        assert_eq!(pool.available(), 1);
    }
}
