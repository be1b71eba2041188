//! Reference-counted, multi-plane buffers.
//!
//! A [`Buffer`] is a cheap handle (an [`Rc`] clone) shared between a channel's idle pool, its
//! output queue, a downstream channel's input queue, and whatever the channel's adapter itself
//! holds onto (e.g. a driver's in-flight queue slot). [`Buffer::get`] takes out a new reference;
//! [`Context::put_buffer`](crate::context::Context::put_buffer) releases one, and when the last
//! reference goes away the owning channel's recycle contract decides whether the buffer is
//! handed back to the idle pool or torn down.
//!
//! This breaks the cyclic ownership a naive translation would have (buffer -> pool -> buffer):
//! a buffer only remembers the [`ChannelId`] of the channel that owns it, never a direct
//! reference to the channel or its pools.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use nix::sys::mman::munmap;

use crate::error::ChannelId;

bitflags! {
    /// Per-buffer flags.
    pub struct BufferFlags: u32 {
        /// This is the last buffer of the stream; no more will follow it on this channel.
        const LAST = 1 << 0;
        /// The adapter marked this buffer's contents as corrupt.
        const ERROR = 1 << 1;
        /// The buffer starts a new key/IDR frame.
        const KEYFRAME = 1 << 2;
    }
}

/// Backing storage for a [`Plane`].
enum Storage {
    /// Heap-allocated memory owned by the plane (file and converter adapters).
    Owned(Vec<u8>),
    /// Memory mapped from a device file descriptor; unmapped on drop.
    Mapped(MappedRegion),
}

struct MappedRegion {
    ptr: *mut c_void,
    len: usize,
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // Safety: `ptr`/`len` were returned by a prior successful `mmap` of this same length,
        // and `MappedRegion` is never cloned, so this is the one and only unmap.
        unsafe {
            munmap(self.ptr, self.len).ok();
        }
    }
}

/// One plane of image, compressed, or metadata payload inside a [`Buffer`].
///
/// Mirrors `struct pitcher_plane`: a base address, a capacity, how many of those bytes are
/// actually valid, and a byte offset used when several planes share one underlying allocation.
pub struct Plane {
    storage: Storage,
    bytes_used: usize,
    offset: usize,
    phys_addr: Option<u64>,
}

impl Plane {
    /// Creates a plane backed by a freshly allocated, zeroed buffer of `capacity` bytes.
    pub fn owned(capacity: usize) -> Self {
        Self {
            storage: Storage::Owned(vec![0u8; capacity]),
            bytes_used: 0,
            offset: 0,
            phys_addr: None,
        }
    }

    /// Creates a plane backed by memory already mapped into this process, e.g. by `mmap`ing a
    /// V4L2 device's buffer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a unique `len`-byte mapping that remains valid until this `Plane` (and
    /// any clone of the buffer it belongs to) is dropped; it will be `munmap`ped then.
    pub unsafe fn mapped(ptr: *mut c_void, len: usize) -> Self {
        Self {
            storage: Storage::Mapped(MappedRegion { ptr, len }),
            bytes_used: 0,
            offset: 0,
            phys_addr: None,
        }
    }

    /// Total capacity of this plane in bytes.
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Owned(v) => v.len(),
            Storage::Mapped(m) => m.len,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(v) => v.as_slice(),
            // Safety: the mapping is valid for `len` bytes for the plane's lifetime.
            Storage::Mapped(m) => unsafe {
                std::slice::from_raw_parts(m.ptr as *const u8, m.len)
            },
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Owned(v) => v.as_mut_slice(),
            // Safety: see `as_slice`; `&mut self` guarantees exclusive access.
            Storage::Mapped(m) => unsafe {
                std::slice::from_raw_parts_mut(m.ptr as *mut u8, m.len)
            },
        }
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn set_bytes_used(&mut self, n: usize) {
        assert!(n <= self.capacity(), "bytes_used exceeds plane capacity");
        self.bytes_used = n;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn physical_address(&self) -> Option<u64> {
        self.phys_addr
    }

    pub fn set_physical_address(&mut self, addr: Option<u64>) {
        self.phys_addr = addr;
    }
}

struct BufferState {
    planes: Vec<Plane>,
    flags: BufferFlags,
    /// Opaque back-reference used by adapters, e.g. to pin the upstream buffer whose memory
    /// this buffer's planes alias (see the converter adapter).
    priv_data: Option<Buffer>,
}

struct BufferCell {
    owner: ChannelId,
    index: u32,
    state: RefCell<BufferState>,
    /// The context's memory-accounting counter, decremented when this cell is actually freed.
    /// `None` for buffers built outside a [`Context`](crate::context::Context) (unit tests).
    memory_counter: Option<Rc<Cell<i64>>>,
}

impl Drop for BufferCell {
    fn drop(&mut self) {
        if let Some(counter) = &self.memory_counter {
            counter.set(counter.get() - 1);
        }
    }
}

/// A reference-counted handle to a multi-plane buffer.
///
/// Cloning via [`Buffer::get`] is the `pitcher_get_buffer` operation: it increments the
/// refcount. Releasing a reference is `Context::put_buffer`, which decrements it and, on the
/// zero transition, calls the owning channel's recycle contract.
pub struct Buffer(Rc<BufferCell>);

impl Buffer {
    pub(crate) fn new(owner: ChannelId, index: u32, planes: Vec<Plane>) -> Self {
        Self(Rc::new(BufferCell {
            owner,
            index,
            state: RefCell::new(BufferState {
                planes,
                flags: BufferFlags::empty(),
                priv_data: None,
            }),
            memory_counter: None,
        }))
    }

    /// Like [`Buffer::new`], but registers the allocation with a context's memory-accounting
    /// counter (incremented here, decremented when the last handle to this buffer is dropped).
    pub(crate) fn new_tracked(
        owner: ChannelId,
        index: u32,
        planes: Vec<Plane>,
        memory_counter: Rc<Cell<i64>>,
    ) -> Self {
        memory_counter.set(memory_counter.get() + 1);
        Self(Rc::new(BufferCell {
            owner,
            index,
            state: RefCell::new(BufferState {
                planes,
                flags: BufferFlags::empty(),
                priv_data: None,
            }),
            memory_counter: Some(memory_counter),
        }))
    }

    /// `pitcher_get_buffer`: take out a new reference to this buffer.
    pub fn get(&self) -> Buffer {
        Buffer(Rc::clone(&self.0))
    }

    /// `pitcher_get_buffer_refcount`: the number of live handles to this buffer.
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub(crate) fn owner(&self) -> ChannelId {
        self.0.owner
    }

    pub fn index(&self) -> u32 {
        self.0.index
    }

    pub fn plane_count(&self) -> usize {
        self.0.state.borrow().planes.len()
    }

    pub fn plane(&self, index: usize) -> Ref<'_, Plane> {
        Ref::map(self.0.state.borrow(), |s| &s.planes[index])
    }

    pub fn plane_mut(&self, index: usize) -> RefMut<'_, Plane> {
        RefMut::map(self.0.state.borrow_mut(), |s| &mut s.planes[index])
    }

    pub fn flags(&self) -> BufferFlags {
        self.0.state.borrow().flags
    }

    pub fn set_flags(&self, flags: BufferFlags) {
        self.0.state.borrow_mut().flags = flags;
    }

    pub fn insert_flags(&self, flags: BufferFlags) {
        self.0.state.borrow_mut().flags.insert(flags);
    }

    pub fn is_last(&self) -> bool {
        self.flags().contains(BufferFlags::LAST)
    }

    /// Stashes a reference to another buffer inside this one's private slot, e.g. so a
    /// converter's output buffer keeps its input buffer alive until it is itself recycled.
    pub fn set_priv(&self, buffer: Option<Buffer>) {
        self.0.state.borrow_mut().priv_data = buffer;
    }

    pub fn take_priv(&self) -> Option<Buffer> {
        self.0.state.borrow_mut().priv_data.take()
    }

    pub(crate) fn ptr_eq(a: &Buffer, b: &Buffer) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Resets per-cycle state before a buffer re-enters the idle pool.
    pub(crate) fn reset_for_reuse(&self) {
        let mut state = self.0.state.borrow_mut();
        state.flags = BufferFlags::empty();
        state.priv_data = None;
        for plane in &mut state.planes {
            plane.bytes_used = 0;
        }
    }
}

impl Clone for Buffer {
    /// Equivalent to [`Buffer::get`].
    fn clone(&self) -> Self {
        self.get()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("owner", &self.0.owner)
            .field("index", &self.0.index)
            .field("refcount", &self.refcount())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer() -> Buffer {
        Buffer::new(ChannelId(0), 0, vec![Plane::owned(16)])
    }

    #[test]
    fn get_increments_refcount() {
        let b = test_buffer();
        assert_eq!(b.refcount(), 1);
        let b2 = b.get();
        assert_eq!(b.refcount(), 2);
        assert_eq!(b2.refcount(), 2);
        drop(b2);
        assert_eq!(b.refcount(), 1);
    }

    #[test]
    fn last_flag_roundtrip() {
        let b = test_buffer();
        assert!(!b.is_last());
        b.insert_flags(BufferFlags::LAST);
        assert!(b.is_last());
    }

    #[test]
    fn reset_clears_flags_and_usage() {
        let b = test_buffer();
        b.plane_mut(0).set_bytes_used(10);
        b.insert_flags(BufferFlags::LAST);
        b.reset_for_reuse();
        assert_eq!(b.plane(0).bytes_used(), 0);
        assert!(!b.is_last());
    }
}
