//! Descriptor chain construction.
//!
//! A chain turns the ring buffer into a closed cycle of hardware
//! descriptors: one data descriptor per block plus a trailing stop marker.
//!
//! ```text
//!        ┌────────────────────────────────────────────────┐
//!        ▼                                                │
//!  [desc 0] → [desc 1] → … → [desc N-1] ──branch-always───┘
//!     │          │                │        + interrupt
//!     └──────────┴── branch-if-true ──► [stop marker]
//! ```
//!
//! Two page-boundary rules apply, and they are independent of each other:
//!
//! - The channel engine cannot be assumed to walk non-contiguous
//!   descriptor-*table* pages implicitly, so the last descriptor placed on
//!   a table page carries an explicit branch (interrupt-never) to the first
//!   descriptor on the next page.
//! - When a block's sample *data* straddles a data-page boundary, the
//!   physical segment is re-queried at the new page; the continuation must
//!   be physically contiguous since one descriptor transfers the block.
//!
//! Any failed physical lookup aborts the build; no partial chain is ever
//! installed.

use alloc::vec::Vec;

use crate::constants::DESCRIPTOR_BYTES;
use crate::dma::descriptor::{op, Condition, Descriptor};
use crate::error::{Error, Result};
use crate::platform::{Direction, DmaMemory, Platform, PhysAddr};
use crate::ring::RingBuffer;

/// A built chain: `block_count + 1` descriptors in DMA-visible memory.
pub struct DescriptorChain<M: DmaMemory> {
    table: M,
    count: usize,
    head: PhysAddr,
    slot_phys: Vec<PhysAddr>,
}

impl<M: DmaMemory> DescriptorChain<M> {
    /// Build a chain for `ring` in the given direction.
    ///
    /// Building is deterministic: identical parameters and identical
    /// physical layouts yield structurally identical chains.
    pub fn build<P: Platform<Memory = M>>(
        platform: &P,
        ring: &RingBuffer<M>,
        direction: Direction,
    ) -> Result<Self> {
        let blocks = ring.block_count();
        let block_bytes = ring.block_bytes();
        if block_bytes > u16::MAX as usize {
            return Err(Error::AllocationFailure);
        }

        let count = blocks + 1;
        let table = platform
            .alloc_dma(count * DESCRIPTOR_BYTES, DESCRIPTOR_BYTES)
            .ok_or(Error::AllocationFailure)?;

        // Resolve every descriptor slot's physical address up front, and
        // note which slots are the last on their table page.
        let mut slot_phys = Vec::with_capacity(count);
        let mut last_on_page = Vec::with_capacity(count);
        for slot in 0..count {
            let seg = table
                .physical_segment(slot * DESCRIPTOR_BYTES)
                .ok_or(Error::AllocationFailure)?;
            slot_phys.push(seg.addr);
            last_on_page.push(seg.len < 2 * DESCRIPTOR_BYTES);
        }

        let head = slot_phys[0];
        let stop_phys = slot_phys[blocks];

        for block in 0..blocks {
            let address = Self::block_physical(ring, block)?;
            let last = block == blocks - 1;

            let opcode = match (direction, last) {
                (Direction::Output, false) => op::OUTPUT_MORE,
                (Direction::Output, true) => op::OUTPUT_LAST,
                (Direction::Input, false) => op::INPUT_MORE,
                (Direction::Input, true) => op::INPUT_LAST,
            };

            // The tail closes the cycle and is the one interrupt source
            // (the heartbeat). A descriptor ending a table page must branch
            // explicitly to the next page. Everything else conditionally
            // branches to the stop marker so an explicit stop halts the
            // chain at a block boundary.
            let (branch_to, branch, interrupt) = if last {
                (head, Condition::Always, Condition::Always)
            } else if last_on_page[block] {
                (slot_phys[block + 1], Condition::Always, Condition::Never)
            } else {
                (stop_phys, Condition::IfTrue, Condition::Never)
            };

            let descriptor = Descriptor::transfer(
                opcode,
                block_bytes as u16,
                address,
                branch_to,
                interrupt,
                branch,
                Condition::Never,
            );
            // SAFETY: `block < count`, the table allocation holds `count`
            // descriptors, and the chain is not yet visible to hardware.
            unsafe { Self::write_slot(&table, block, descriptor) };
        }

        // SAFETY: as above; slot `blocks` is the final slot.
        unsafe { Self::write_slot(&table, blocks, Descriptor::stop()) };

        Ok(DescriptorChain {
            table,
            count,
            head,
            slot_phys,
        })
    }

    /// Physical start of a block's sample data. A block straddling a data
    /// page boundary is re-queried at the crossing and must continue
    /// physically contiguously.
    fn block_physical(ring: &RingBuffer<M>, block: usize) -> Result<PhysAddr> {
        let offset = ring.block_offset(block);
        let block_bytes = ring.block_bytes();

        let first = ring
            .physical_segment(offset)
            .ok_or(Error::AllocationFailure)?;
        let start = first.addr;
        let mut covered = first.len.min(block_bytes);
        while covered < block_bytes {
            let next = ring
                .physical_segment(offset + covered)
                .ok_or(Error::AllocationFailure)?;
            if next.addr != start.offset(covered) {
                return Err(Error::AllocationFailure);
            }
            covered += next.len.min(block_bytes - covered);
        }
        Ok(start)
    }

    unsafe fn write_slot(table: &M, slot: usize, descriptor: Descriptor) {
        let ptr = table.as_mut_ptr().cast::<Descriptor>();
        unsafe { ptr.add(slot).write_unaligned(descriptor) };
    }

    /// Total descriptors, including the stop marker.
    pub fn descriptor_count(&self) -> usize {
        self.count
    }

    /// Number of data descriptors (equals the ring's block count).
    pub fn data_descriptors(&self) -> usize {
        self.count - 1
    }

    /// Index of the stop marker.
    pub fn stop_index(&self) -> usize {
        self.count - 1
    }

    /// Physical address of descriptor 0, handed to the channel's command
    /// pointer at start.
    pub fn head(&self) -> PhysAddr {
        self.head
    }

    /// Physical address of descriptor `index`.
    pub fn descriptor_phys(&self, index: usize) -> PhysAddr {
        self.slot_phys[index]
    }

    /// Resolve a physical address back to a descriptor index.
    pub fn index_of_phys(&self, addr: PhysAddr) -> Option<usize> {
        self.slot_phys.iter().position(|&p| p == addr)
    }

    /// Copy descriptor `index` out of the table.
    pub fn descriptor(&self, index: usize) -> Descriptor {
        assert!(index < self.count);
        let ptr = self.table.as_mut_ptr().cast::<Descriptor>();
        // SAFETY: bounds-checked above; the table holds `count` descriptors
        // and hardware only ever writes the result word.
        unsafe { ptr.add(index).read_unaligned() }
    }

    /// Copy the whole table out (diagnostics).
    pub fn snapshot(&self) -> Vec<Descriptor> {
        (0..self.count).map(|i| self.descriptor(i)).collect()
    }

    /// The descriptor the channel engine fetches after `index`, assuming
    /// the conditional branch is not taken.
    pub fn successor(&self, index: usize) -> Option<usize> {
        let descriptor = self.descriptor(index);
        match descriptor.branch_condition() {
            Condition::Always => self.index_of_phys(descriptor.branch_target()),
            _ => Some(index + 1),
        }
    }
}
