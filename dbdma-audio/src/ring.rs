//! Page-aligned ring buffer of sample blocks.
//!
//! One ring exists per stream direction. The hardware walks it repeatedly
//! through the descriptor chain while the real-time path writes (playback)
//! or reads (capture) one block per callback. The ring and its descriptor
//! chain are (re)built together on format activation and discarded together
//! on format change.

use crate::error::{Error, Result};
use crate::platform::{DmaMemory, Platform, PhysSegment};

/// Contiguous, page-aligned sample storage of `block_count × block_bytes`
/// bytes.
pub struct RingBuffer<M: DmaMemory> {
    memory: M,
    block_count: usize,
    block_bytes: usize,
}

impl<M: DmaMemory> RingBuffer<M> {
    /// Allocate a zeroed ring through the platform's DMA allocator.
    ///
    /// Fails with [`Error::AllocationFailure`] on exhaustion or degenerate
    /// geometry; nothing is installed on failure.
    pub fn allocate<P: Platform<Memory = M>>(
        platform: &P,
        block_count: usize,
        block_bytes: usize,
    ) -> Result<Self> {
        if block_count < 2 || block_bytes == 0 {
            return Err(Error::AllocationFailure);
        }
        let len = block_count * block_bytes;
        let memory = platform
            .alloc_dma(len, platform.page_size())
            .ok_or(Error::AllocationFailure)?;
        debug_assert_eq!(memory.len(), len);
        Ok(RingBuffer {
            memory,
            block_count,
            block_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.block_count * self.block_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Byte offset of block `index` within the ring.
    pub fn block_offset(&self, index: usize) -> usize {
        debug_assert!(index < self.block_count);
        index * self.block_bytes
    }

    /// Physical segment covering `offset`, limited to the page end.
    pub fn physical_segment(&self, offset: usize) -> Option<PhysSegment> {
        self.memory.physical_segment(offset)
    }

    /// Mutable byte view of `len` bytes starting at `offset`.
    ///
    /// Exclusive access is guaranteed by `&mut self`; the underlying
    /// allocation outlives the returned slice.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset + len <= self.len());
        // SAFETY: the allocation is `self.len()` bytes long, the range was
        // just bounds-checked, and `&mut self` makes this the only CPU view.
        unsafe { core::slice::from_raw_parts_mut(self.memory.as_mut_ptr().add(offset), len) }
    }

    /// Zero the entire ring (stop flush).
    pub fn fill_silence(&mut self) {
        let len = self.len();
        self.bytes_mut(0, len).fill(0);
    }
}
