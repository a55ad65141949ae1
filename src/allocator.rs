//! Sources of record buffer memory.
//!
//! The connection never allocates on its own: every TX/RX buffer is obtained
//! from a [`BufferAllocator`] and handed back to it once idle. [`Heap`] uses the
//! global allocator directly, [`Budget`] caps and accounts the bytes held by
//! all connections sharing it.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use portable_atomic::{AtomicUsize, Ordering};

/// The allocator could not provide a buffer of the requested size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AllocError;

/// A zero-initialised, fixed-size record buffer.
pub struct RecordBuffer {
    buf: Box<[u8]>,
}

impl RecordBuffer {
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl From<Box<[u8]>> for RecordBuffer {
    fn from(buf: Box<[u8]>) -> Self {
        Self { buf }
    }
}

impl Deref for RecordBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for RecordBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl core::fmt::Debug for RecordBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordBuffer")
            .field("len", &self.buf.len())
            .finish()
    }
}

pub trait BufferAllocator {
    /// Obtains a zeroed buffer of exactly `len` bytes.
    fn allocate(&self, len: usize) -> Result<RecordBuffer, AllocError>;

    /// Returns a buffer previously obtained from [`Self::allocate`].
    fn release(&self, buffer: RecordBuffer) {
        drop(buffer);
    }
}

impl<T> BufferAllocator for &T
where
    T: BufferAllocator + ?Sized,
{
    fn allocate(&self, len: usize) -> Result<RecordBuffer, AllocError> {
        T::allocate(self, len)
    }

    fn release(&self, buffer: RecordBuffer) {
        T::release(self, buffer);
    }
}

/// Allocates from the global allocator, reporting exhaustion as [`AllocError`]
/// instead of aborting.
#[derive(Debug, Copy, Clone, Default)]
pub struct Heap;

impl BufferAllocator for Heap {
    fn allocate(&self, len: usize) -> Result<RecordBuffer, AllocError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| AllocError)?;
        buf.resize(len, 0);
        Ok(RecordBuffer::from(buf.into_boxed_slice()))
    }
}

/// Snapshot of the counters kept by a [`Budget`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferStats {
    pub live_buffers: usize,
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub allocations: usize,
    pub releases: usize,
    pub failures: usize,
}

/// A byte limit shared by every connection allocating through it.
///
/// `Budget::new` is `const`, so a device can keep one in a `static` and pass
/// `&BUDGET` to each connection.
pub struct Budget {
    limit: usize,
    used: AtomicUsize,
    peak: AtomicUsize,
    live: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
    failures: AtomicUsize,
}

impl Budget {
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes still available for new buffers.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            live_buffers: self.live.load(Ordering::Relaxed),
            live_bytes: self.used.load(Ordering::Acquire),
            peak_bytes: self.peak.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn try_reserve(&self, n: usize) -> bool {
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let Some(new) = cur.checked_add(n).filter(|new| *new <= self.limit) else {
                return false;
            };
            match self
                .used
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.peak.fetch_max(new, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => cur = actual,
            }
        }
    }

    fn fail(&self, len: usize) -> AllocError {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            "record buffer of {} bytes refused, {} of {} bytes in use",
            len,
            self.used.load(Ordering::Relaxed),
            self.limit
        );
        AllocError
    }
}

impl BufferAllocator for Budget {
    fn allocate(&self, len: usize) -> Result<RecordBuffer, AllocError> {
        if !self.try_reserve(len) {
            return Err(self.fail(len));
        }
        match Heap.allocate(len) {
            Ok(buffer) => {
                self.live.fetch_add(1, Ordering::Relaxed);
                self.allocations.fetch_add(1, Ordering::Relaxed);
                Ok(buffer)
            }
            Err(e) => {
                self.used.fetch_sub(len, Ordering::AcqRel);
                let _ = self.fail(len);
                Err(e)
            }
        }
    }

    fn release(&self, buffer: RecordBuffer) {
        let len = buffer.len();
        drop(buffer);
        self.used.fetch_sub(len, Ordering::AcqRel);
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}
