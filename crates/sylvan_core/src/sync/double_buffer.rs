//! # Double Buffer
//!
//! Two instances of a buffer set with an atomic role flag.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to hand out `&mut T` and `&T` to the two
//! halves without a lock. Every unsafe block documents the invariant it
//! relies on.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │       DoubleBuffered<T>     │
//!                    │                             │
//!                    │  ┌─────────┐  ┌─────────┐   │
//!                    │  │  Set A  │  │  Set B  │   │
//!                    │  └────┬────┘  └────┬────┘   │
//!                    │       │            │        │
//!                    │  ┌────┴────────────┴────┐   │
//!                    │  │ Atomic write index   │   │
//!                    │  │ Reader count per set │   │
//!                    │  └──────────────────────┘   │
//!                    └─────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!      ┌──────────────┐ ┌────────────┐ ┌────────────┐
//!      │ WriteHandle  │ │ ReadHandle │ │  publish   │
//!      │ (cull passes)│ │   (draw)   │ │  (flip)    │
//!      └──────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `WriteHandle`: exclusive access to the write set, refused while the set
//!   still has readers
//! - `ReadHandle`: shared access to the most recently published set
//! - `publish`: flips roles, refused while a write handle is held

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};

/// Names one of the two buffer sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferSetId {
    /// First set.
    A,
    /// Second set.
    B,
}

impl BufferSetId {
    /// Returns the set's slot in the pair.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Returns the opposite set.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    #[inline]
    const fn from_index(index: usize) -> Self {
        if index & 1 == 0 {
            Self::A
        } else {
            Self::B
        }
    }
}

/// Current assignment of the two sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roles {
    /// The set the next frame's passes write into.
    pub write: BufferSetId,
    /// The set holding the last published output.
    pub read: BufferSetId,
}

/// A pair of `T` with exactly one writable half at a time.
///
/// ## Usage
///
/// ```rust,ignore
/// let buffers = DoubleBuffered::new(SurvivorBuffers::new(&layout)?, SurvivorBuffers::new(&layout)?);
///
/// loop {
///     let mut write = buffers.write_handle()?;
///     run_passes(&mut write);
///     drop(write); // Release before publish
///
///     buffers.publish()?;
///
///     let read = buffers.read_handle();
///     issue_draws(&read);
/// }
/// ```
pub struct DoubleBuffered<T> {
    /// The two sets.
    /// Using UnsafeCell because exclusive access is enforced through handles.
    buffers: [UnsafeCell<T>; 2],

    /// Index of the current write set (0 or 1).
    /// Read set is always (write_index ^ 1).
    write_index: AtomicUsize,

    /// Whether a write handle is currently held (or a publish is running).
    write_locked: AtomicBool,

    /// Active read handles per set.
    read_counts: [AtomicUsize; 2],

    /// Number of successful publishes.
    publish_count: AtomicU64,
}

impl<T> DoubleBuffered<T> {
    /// Creates a pair from two initial values. `a` is the first write target.
    #[must_use]
    pub fn new(a: T, b: T) -> Arc<Self> {
        Arc::new(Self {
            buffers: [UnsafeCell::new(a), UnsafeCell::new(b)],
            write_index: AtomicUsize::new(0),
            write_locked: AtomicBool::new(false),
            read_counts: [AtomicUsize::new(0), AtomicUsize::new(0)],
            publish_count: AtomicU64::new(0),
        })
    }

    /// Returns the current role assignment.
    #[inline]
    #[must_use]
    pub fn roles(&self) -> Roles {
        let write = BufferSetId::from_index(self.write_index.load(Ordering::Acquire));
        Roles {
            write,
            read: write.other(),
        }
    }

    /// Returns how many times the roles have flipped.
    #[inline]
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    /// Returns whether a write handle is currently active.
    #[inline]
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.write_locked.load(Ordering::Acquire)
    }

    /// Returns the number of active read handles on a set.
    #[inline]
    #[must_use]
    pub fn reader_count(&self, set: BufferSetId) -> usize {
        self.read_counts[set.index()].load(Ordering::Acquire)
    }

    /// Acquires exclusive access to the current write set.
    ///
    /// # Errors
    ///
    /// - [`SyncError::WriteInProgress`] if a write handle is already held
    /// - [`SyncError::ReadersActive`] if a consumer still reads the write set
    pub fn write_handle(self: &Arc<Self>) -> SyncResult<WriteHandle<T>> {
        if self
            .write_locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::WriteInProgress);
        }

        let index = self.write_index.load(Ordering::SeqCst);
        let readers = self.read_counts[index].load(Ordering::SeqCst);
        if readers > 0 {
            self.write_locked.store(false, Ordering::Release);
            return Err(SyncError::ReadersActive {
                set: BufferSetId::from_index(index),
                readers,
            });
        }

        Ok(WriteHandle {
            owner: Arc::clone(self),
            index,
        })
    }

    /// Acquires shared access to the most recently published set.
    ///
    /// Multiple read handles can coexist, and they can outlive later
    /// publishes. While one is alive the set it reads is not writable.
    #[must_use]
    pub fn read_handle(self: &Arc<Self>) -> ReadHandle<T> {
        loop {
            let index = self.write_index.load(Ordering::SeqCst) ^ 1;
            self.read_counts[index].fetch_add(1, Ordering::SeqCst);
            // A publish may have flipped roles between the load and the
            // increment. Back out and retry so the count always guards the
            // set actually being read.
            if self.write_index.load(Ordering::SeqCst) ^ 1 == index {
                return ReadHandle {
                    owner: Arc::clone(self),
                    index,
                };
            }
            self.read_counts[index].fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Flips the roles: the set just written becomes the read set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WriteInProgress`] if a write handle is still held.
    pub fn publish(&self) -> SyncResult<Roles> {
        if self
            .write_locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::WriteInProgress);
        }

        self.write_index.fetch_xor(1, Ordering::SeqCst);
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        self.write_locked.store(false, Ordering::Release);
        Ok(self.roles())
    }

    /// Gets mutable access to a set by index.
    ///
    /// # Safety
    ///
    /// Caller must hold the write lock for `index`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn get_write_buffer(&self, index: usize) -> &mut T {
        &mut *self.buffers[index].get()
    }

    /// Gets shared access to a set by index.
    ///
    /// # Safety
    ///
    /// Caller must ensure no concurrent writes to `index`.
    #[inline]
    unsafe fn get_read_buffer(&self, index: usize) -> &T {
        &*self.buffers[index].get()
    }
}

// SAFETY: the pair owns its `T`s, so moving it moves them.
unsafe impl<T: Send> Send for DoubleBuffered<T> {}
// SAFETY: `&mut T` only reaches one thread at a time (write_locked) and is
// never handed out for a set with readers; readers share `&T`.
unsafe impl<T: Send + Sync> Sync for DoubleBuffered<T> {}

/// Exclusive access to the write set.
///
/// The lock is released when the handle drops. Dropping it is the point
/// after which every pass's writes are visible to readers of the set.
pub struct WriteHandle<T> {
    owner: Arc<DoubleBuffered<T>>,
    index: usize,
}

impl<T> WriteHandle<T> {
    /// Returns the set this handle writes to.
    #[inline]
    #[must_use]
    pub fn set(&self) -> BufferSetId {
        BufferSetId::from_index(self.index)
    }
}

impl<T> Deref for WriteHandle<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: we hold exclusive write access (guaranteed by write_locked)
        unsafe { self.owner.get_read_buffer(self.index) }
    }
}

impl<T> DerefMut for WriteHandle<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: we hold exclusive write access and the set had no readers
        // when the handle was issued; new readers only target the other set
        // until the next publish, which this handle blocks.
        unsafe { self.owner.get_write_buffer(self.index) }
    }
}

impl<T> Drop for WriteHandle<T> {
    fn drop(&mut self) {
        self.owner.write_locked.store(false, Ordering::Release);
    }
}

/// Shared access to a published set.
pub struct ReadHandle<T> {
    owner: Arc<DoubleBuffered<T>>,
    index: usize,
}

impl<T> ReadHandle<T> {
    /// Returns the set this handle reads from.
    #[inline]
    #[must_use]
    pub fn set(&self) -> BufferSetId {
        BufferSetId::from_index(self.index)
    }
}

impl<T> Clone for ReadHandle<T> {
    fn clone(&self) -> Self {
        self.owner.read_counts[self.index].fetch_add(1, Ordering::SeqCst);
        Self {
            owner: Arc::clone(&self.owner),
            index: self.index,
        }
    }
}

impl<T> Deref for ReadHandle<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: a write handle is never issued for a set with readers
        unsafe { self.owner.get_read_buffer(self.index) }
    }
}

impl<T> Drop for ReadHandle<T> {
    fn drop(&mut self) {
        self.owner.read_counts[self.index].fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> std::fmt::Debug for ReadHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHandle").field("set", &self.set()).finish()
    }
}
