use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, PoisonError},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A pool of fixed-size relay buffers shared by all proxied connections.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Box<[u8]>>>,
}

/// A buffer borrowed from a [`BufferPool`]. It goes back to the pool when dropped.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BufferPool {
    /// Creates a pool of `buffer_size` byte buffers keeping at most `max_idle` of them around.
    pub fn new(buffer_size: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            max_idle,
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Takes an idle buffer, allocating a new one when none is left.
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        let buffer = self
            .idle()
            .pop()
            .unwrap_or_else(|| vec![0; self.buffer_size].into_boxed_slice());

        PooledBuffer {
            buffer: Some(buffer),
            pool: Arc::clone(self),
        }
    }

    /// The number of buffers waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    fn put(&self, buffer: Box<[u8]>) {
        let mut idle = self.idle();
        if idle.len() < self.max_idle {
            idle.push(buffer);
        }
    }

    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<Box<[u8]>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.put(buffer);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_return_to_pool() {
        let pool = BufferPool::new(16, 2);
        let mut first = pool.get();
        first[0] = 7;
        assert_eq!(first.len(), 16);
        assert_eq!(pool.idle_count(), 0);

        drop(first);
        assert_eq!(pool.idle_count(), 1);

        // The returned buffer is handed out again.
        let again = pool.get();
        assert_eq!(again[0], 7);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_pool_caps_idle_buffers() {
        let pool = BufferPool::new(8, 2);
        let buffers: Vec<_> = (0..4).map(|_| pool.get()).collect();
        drop(buffers);
        assert_eq!(pool.idle_count(), 2);
    }
}
