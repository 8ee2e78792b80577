//! Ring buffer pool
//!
//! A fixed arena of app buffers addressed by [`BufferHandle`] (an index,
//! never a pointer). Every buffer sits behind its own reentrant mutex so
//! the soundcard thread can drain the current buffer while producers
//! render into the next one. Finer-grained sub-block locks keyed by
//! `(buffer, channel, sub_block)` let per-channel renderers work in
//! parallel without serializing on the whole buffer.
//!
//! ```text
//!          prev        current        next        current+2
//!        ┌──────┐     ┌──────┐     ┌──────┐     ┌──────┐
//!   ...  │  3   │ ──▶ │  0   │ ──▶ │  1   │ ──▶ │  2   │  ...
//!        └──────┘     └──────┘     └──────┘     └──────┘
//!                      backend      producer     ClearBuffer
//! ```

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{ArcReentrantMutexGuard, RawMutex, RawThreadId, ReentrantMutex, ReentrantMutexGuard, RwLock};

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Index of one buffer in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(usize);

impl BufferHandle {
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GUARDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Whole-buffer lock
///
/// Reentrant: the owning thread may lock the same buffer again while this
/// guard is alive. Bytes are reached through [`read`](Self::read) and
/// [`write`](Self::write); calling `write` from inside another closure on
/// the same buffer panics like a nested `RefCell::borrow_mut`.
pub struct BufferGuard<'a> {
    handle: BufferHandle,
    guard: ReentrantMutexGuard<'a, RefCell<Vec<u8>>>,
}

impl BufferGuard<'_> {
    #[inline]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Buffer size in bytes
    pub fn len(&self) -> usize {
        self.guard.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.guard.borrow())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.guard.borrow_mut())
    }

    /// Explicit unlock (same as dropping the guard)
    pub fn unlock(self) {}
}

/// Sub-block lock obtained from [`RingBufferPool::try_lock_sub_block`]
pub struct SubBlockGuard {
    key: SubBlockKey,
    _guard: ArcReentrantMutexGuard<RawMutex, RawThreadId, ()>,
}

impl SubBlockGuard {
    #[inline]
    pub fn key(&self) -> SubBlockKey {
        self.key
    }

    pub fn unlock(self) {}
}

/// `(buffer, channel, sub_block)` address of a sub-block lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubBlockKey {
    pub buffer: usize,
    pub channel: u32,
    pub sub_block: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// POOL
// ═══════════════════════════════════════════════════════════════════════════════

struct SubBlockTable {
    channels: u32,
    sub_block_count: u32,
    locks: Vec<Arc<ReentrantMutex<()>>>,
}

impl SubBlockTable {
    fn new(buffers: usize, channels: u32, sub_block_count: u32) -> Self {
        let count = buffers * channels as usize * sub_block_count as usize;

        Self {
            channels,
            sub_block_count,
            locks: (0..count).map(|_| Arc::new(ReentrantMutex::new(()))).collect(),
        }
    }

    fn slot(&self, buffer: usize, channel: u32, sub_block: u32) -> Option<usize> {
        if channel >= self.channels || sub_block >= self.sub_block_count {
            return None;
        }

        let per_buffer = self.channels as usize * self.sub_block_count as usize;
        let slot = buffer * per_buffer + channel as usize * self.sub_block_count as usize + sub_block as usize;

        (slot < self.locks.len()).then_some(slot)
    }
}

/// Fixed pool of N app buffers with one reentrant mutex each
pub struct RingBufferPool {
    buffers: Box<[ReentrantMutex<RefCell<Vec<u8>>>]>,
    sub_blocks: RwLock<SubBlockTable>,
    current: AtomicUsize,
}

impl RingBufferPool {
    /// Allocate `count` zeroed buffers of `bytes` each
    pub fn new(count: usize, channels: u32, sub_block_count: u32, bytes: usize) -> Self {
        let count = count.max(1);

        Self {
            buffers: (0..count)
                .map(|_| ReentrantMutex::new(RefCell::new(vec![0u8; bytes])))
                .collect(),
            sub_blocks: RwLock::new(SubBlockTable::new(count, channels, sub_block_count)),
            current: AtomicUsize::new(0),
        }
    }

    /// Number of buffers (N)
    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Index of the buffer the backend consumes this cycle
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn current(&self) -> BufferHandle {
        BufferHandle(self.current_index())
    }

    pub fn next(&self) -> BufferHandle {
        self.ahead(1)
    }

    pub fn prev(&self) -> BufferHandle {
        self.ahead(self.len() - 1)
    }

    /// Buffer `n` slots after current (mod N)
    pub fn ahead(&self, n: usize) -> BufferHandle {
        BufferHandle((self.current_index() + n) % self.len())
    }

    /// Handle for `index`, if it belongs to this pool
    pub fn handle(&self, index: usize) -> Option<BufferHandle> {
        (index < self.len()).then_some(BufferHandle(index))
    }

    /// Lock a whole buffer, blocking while another thread holds it.
    ///
    /// Returns `None` for a handle outside the pool.
    pub fn lock(&self, handle: BufferHandle) -> Option<BufferGuard<'_>> {
        let mutex = self.buffers.get(handle.0)?;

        Some(BufferGuard {
            handle,
            guard: mutex.lock(),
        })
    }

    /// Non-blocking variant of [`lock`](Self::lock)
    pub fn try_lock(&self, handle: BufferHandle) -> Option<BufferGuard<'_>> {
        let mutex = self.buffers.get(handle.0)?;

        Some(BufferGuard {
            handle,
            guard: mutex.try_lock()?,
        })
    }

    /// Try to take one sub-block lock without blocking.
    ///
    /// `None` on contention with another thread or for an address outside
    /// the pool; callers retry later or skip the sub-block.
    pub fn try_lock_sub_block(&self, handle: BufferHandle, channel: u32, sub_block: u32) -> Option<SubBlockGuard> {
        if handle.0 >= self.len() {
            return None;
        }

        let mutex = {
            let table = self.sub_blocks.read();
            let slot = table.slot(handle.0, channel, sub_block)?;
            Arc::clone(&table.locks[slot])
        };

        let guard = mutex.try_lock_arc()?;

        Some(SubBlockGuard {
            key: SubBlockKey {
                buffer: handle.0,
                channel,
                sub_block,
            },
            _guard: guard,
        })
    }

    /// Number of sub-blocks per channel
    pub fn sub_block_count(&self) -> u32 {
        self.sub_blocks.read().sub_block_count
    }

    /// Zero-fill a buffer
    pub fn clear(&self, handle: BufferHandle) {
        if let Some(buffer) = self.lock(handle) {
            buffer.write(|bytes| bytes.fill(0));
        }
    }

    /// Byte size of a buffer
    pub fn buffer_len(&self, handle: BufferHandle) -> Option<usize> {
        self.lock(handle).map(|buffer| buffer.len())
    }

    /// Advance `current` by one slot (mod N).
    ///
    /// Takes the outgoing buffer's lock first, so the rotation waits for
    /// any producer or copy pass still holding it.
    pub fn switch_current(&self) -> BufferHandle {
        let outgoing = self.current_index();
        let _held = self.buffers[outgoing].lock();

        let next = (outgoing + 1) % self.len();
        self.current.store(next, Ordering::Release);

        BufferHandle(next)
    }

    /// Resize every buffer to `bytes` (zeroed) and rebuild the sub-block
    /// table when the channel count changed.
    ///
    /// Each buffer is resized under its own lock, so this waits for
    /// in-flight readers and writers.
    pub fn realloc(&self, channels: u32, bytes: usize) {
        for mutex in self.buffers.iter() {
            let buffer = mutex.lock();
            let mut buffer = buffer.borrow_mut();
            buffer.clear();
            buffer.resize(bytes, 0);
        }

        let mut table = self.sub_blocks.write();
        if table.channels != channels {
            *table = SubBlockTable::new(self.len(), channels, table.sub_block_count);
        }

        log::debug!("Ring buffer pool reallocated: {} x {} bytes, {} channels", self.len(), bytes, channels);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn pool() -> RingBufferPool {
        RingBufferPool::new(4, 2, 8, 16)
    }

    #[test]
    fn test_adjacent_handles() {
        let pool = pool();

        assert_eq!(pool.current().index(), 0);
        assert_eq!(pool.next().index(), 1);
        assert_eq!(pool.prev().index(), 3);
        assert_eq!(pool.ahead(2).index(), 2);

        pool.switch_current();
        assert_eq!(pool.prev().index(), 0);
        assert_eq!(pool.ahead(3).index(), 0);
    }

    #[test]
    fn test_switch_cycles_all_slots() {
        let pool = RingBufferPool::new(8, 2, 8, 4);
        let mut seen = Vec::new();

        for _ in 0..8 {
            seen.push(pool.current_index());
            pool.switch_current();
        }

        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(pool.current_index(), 0);
    }

    #[test]
    fn test_foreign_handles_are_noops() {
        let pool = pool();
        let foreign = BufferHandle::new(17);

        assert!(pool.lock(foreign).is_none());
        assert!(pool.try_lock_sub_block(foreign, 0, 0).is_none());
        assert!(pool.try_lock_sub_block(pool.current(), 2, 0).is_none());
        assert!(pool.try_lock_sub_block(pool.current(), 0, 8).is_none());
        assert!(pool.handle(4).is_none());
        pool.clear(foreign);
    }

    #[test]
    fn test_clear_zeroes() {
        let pool = pool();
        let handle = pool.next();

        pool.lock(handle).unwrap().write(|bytes| bytes.fill(0xAB));
        pool.clear(handle);

        pool.lock(handle).unwrap().read(|bytes| assert!(bytes.iter().all(|&b| b == 0)));
    }

    #[test]
    fn test_realloc_resizes_every_buffer() {
        let pool = pool();

        for (channels, bytes) in [(2, 2048), (6, 64), (1, 1024)] {
            pool.realloc(channels, bytes);

            for index in 0..pool.len() {
                assert_eq!(pool.buffer_len(BufferHandle::new(index)), Some(bytes));
            }
            assert!(pool.try_lock_sub_block(pool.current(), channels - 1, 7).is_some());
            assert!(pool.try_lock_sub_block(pool.current(), channels, 0).is_none());
        }
    }

    #[test]
    fn test_reentrant_lock_same_thread() {
        let pool = pool();
        let handle = pool.current();

        let outer = pool.lock(handle).unwrap();
        let inner = pool.lock(handle).unwrap();
        inner.write(|bytes| bytes[0] = 7);
        inner.unlock();
        outer.read(|bytes| assert_eq!(bytes[0], 7));
    }

    #[test]
    fn test_lock_blocks_other_thread_until_outer_unlock() {
        let pool = Arc::new(pool());
        let handle = pool.current();

        let outer = pool.lock(handle).unwrap();
        let inner = pool.lock(handle).unwrap();

        let (tx, rx) = mpsc::channel();
        let other = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let _guard = pool.lock(handle).unwrap();
                tx.send(()).unwrap();
            })
        };

        drop(inner);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        drop(outer);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        other.join().unwrap();
    }

    #[test]
    fn test_try_lock_sub_block_never_blocks() {
        let pool = Arc::new(pool());
        let handle = pool.current();

        let held = pool.try_lock_sub_block(handle, 1, 3).unwrap();
        assert_eq!(held.key(), SubBlockKey { buffer: 0, channel: 1, sub_block: 3 });

        let other = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let start = Instant::now();
                let same = pool.try_lock_sub_block(handle, 1, 3).is_some();
                let neighbour = pool.try_lock_sub_block(handle, 1, 4).is_some();
                (same, neighbour, start.elapsed())
            })
        };

        let (same, neighbour, elapsed) = other.join().unwrap();
        assert!(!same);
        assert!(neighbour);
        assert!(elapsed < Duration::from_millis(100));

        held.unlock();
        assert!(pool.try_lock_sub_block(handle, 1, 3).is_some());
    }

    #[test]
    fn test_switch_waits_for_outgoing_buffer() {
        let pool = Arc::new(pool());
        let guard = pool.lock(pool.current()).unwrap();

        let switcher = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.switch_current().index())
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.current_index(), 0);

        drop(guard);
        assert_eq!(switcher.join().unwrap(), 1);
        assert_eq!(pool.current_index(), 1);
    }
}
