//! Software mocks of the hardware seams, shared by the module tests.
//!
//! [`MockPlatform`] emulates just enough channel behavior to exercise the
//! controller: control-register writes apply the mask/value protocol to the
//! status register, RUN implies ACTIVE, and a raised stop condition lets
//! ACTIVE linger for a configurable number of status reads before the
//! channel goes idle.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use spin::Mutex;

use crate::dma::controller::{regs, ChannelStatus};
use crate::platform::{
    AuxTransport, CoefficientSink, Direction, DmaMemory, Platform, PhysAddr, PhysSegment,
};

fn dir_index(direction: Direction) -> usize {
    match direction {
        Direction::Output => 0,
        Direction::Input => 1,
    }
}

/// DMA-capable mock allocation with a configurable physical page layout.
pub struct MockMemory {
    ptr: *mut u8,
    len: usize,
    page_size: usize,
    page_phys: Vec<u32>,
    null_page: Option<usize>,
}

// SAFETY: the backing allocation is owned exclusively by this value and
// freed exactly once on drop; tests serialize their own access.
unsafe impl Send for MockMemory {}

impl MockMemory {
    fn new(
        len: usize,
        page_size: usize,
        phys_base: u32,
        scatter: bool,
        null_page: Option<usize>,
    ) -> MockMemory {
        let ptr = Box::into_raw(vec![0u8; len].into_boxed_slice()) as *mut u8;
        let pages = len.div_ceil(page_size);
        let stride = if scatter {
            // Physically non-adjacent pages.
            page_size as u32 * 3
        } else {
            page_size as u32
        };
        let page_phys = (0..pages as u32).map(|i| phys_base + i * stride).collect();
        MockMemory {
            ptr,
            len,
            page_size,
            page_phys,
            null_page,
        }
    }
}

impl Drop for MockMemory {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from Box::into_raw of a boxed slice.
        unsafe {
            drop(Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                self.ptr, self.len,
            )));
        }
    }
}

impl DmaMemory for MockMemory {
    fn len(&self) -> usize {
        self.len
    }

    fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn physical_segment(&self, offset: usize) -> Option<PhysSegment> {
        if offset >= self.len {
            return None;
        }
        let page = offset / self.page_size;
        if self.null_page == Some(page) {
            return None;
        }
        let in_page = offset % self.page_size;
        let len = (self.page_size - in_page).min(self.len - offset);
        Some(PhysSegment {
            addr: PhysAddr(self.page_phys[page] + in_page as u32),
            len,
        })
    }
}

/// One recorded register write.
#[derive(Clone, Copy, Debug)]
pub struct RegWrite {
    pub direction: Direction,
    pub offset: u32,
    pub value: u32,
}

/// Mock platform: DMA allocator plus two emulated channel register files.
pub struct MockPlatform {
    page_sizes: Mutex<Vec<usize>>,
    next_phys: AtomicU32,
    fail_allocs: AtomicU32,
    scatter_next: AtomicBool,
    null_page_next: Mutex<Option<usize>>,

    registers: Mutex<[[u32; 8]; 2]>,
    writes: Mutex<Vec<RegWrite>>,
    active_linger: AtomicU32,
    linger_left: [AtomicU32; 2],

    output_present: bool,
    input_present: bool,
    interrupt_present: bool,
    irq_enabled: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> MockPlatform {
        MockPlatform {
            page_sizes: Mutex::new(Vec::new()),
            next_phys: AtomicU32::new(0x1000_0000),
            fail_allocs: AtomicU32::new(0),
            scatter_next: AtomicBool::new(false),
            null_page_next: Mutex::new(None),
            registers: Mutex::new([[0; 8]; 2]),
            writes: Mutex::new(Vec::new()),
            active_linger: AtomicU32::new(1),
            linger_left: [AtomicU32::new(0), AtomicU32::new(0)],
            output_present: true,
            input_present: true,
            interrupt_present: true,
            irq_enabled: AtomicBool::new(false),
        }
    }

    /// Page sizes handed to successive allocations, then 4096 thereafter.
    pub fn with_page_sizes(sizes: &[usize]) -> MockPlatform {
        let platform = MockPlatform::new();
        *platform.page_sizes.lock() = sizes.iter().rev().copied().collect();
        platform
    }

    pub fn without_output_channel() -> MockPlatform {
        MockPlatform {
            output_present: false,
            ..MockPlatform::new()
        }
    }

    pub fn without_interrupt_source() -> MockPlatform {
        MockPlatform {
            interrupt_present: false,
            ..MockPlatform::new()
        }
    }

    pub fn fail_next_alloc(&self) {
        self.fail_allocs.store(1, Ordering::Relaxed);
    }

    pub fn scatter_next_alloc(&self) {
        self.scatter_next.store(true, Ordering::Relaxed);
    }

    pub fn null_page_on_next_alloc(&self, page: usize) {
        *self.null_page_next.lock() = Some(page);
    }

    /// Status reads for which ACTIVE lingers after a stop request.
    pub fn set_active_linger(&self, reads: u32) {
        self.active_linger.store(reads, Ordering::Relaxed);
    }

    /// Raw register value, without status-read side effects.
    pub fn reg(&self, direction: Direction, offset: u32) -> u32 {
        self.registers.lock()[dir_index(direction)][(offset / 4) as usize]
    }

    pub fn status(&self, direction: Direction) -> ChannelStatus {
        ChannelStatus::from_bits_truncate(self.reg(direction, regs::CHANNEL_STATUS))
    }

    pub fn clear_status(&self, direction: Direction, bits: ChannelStatus) {
        let mut registers = self.registers.lock();
        registers[dir_index(direction)][1] &= !bits.bits();
    }

    pub fn writes(&self) -> Vec<RegWrite> {
        self.writes.lock().clone()
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::Relaxed)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockPlatform {
    type Memory = MockMemory;

    fn alloc_dma(&self, len: usize, _align: usize) -> Option<MockMemory> {
        if self.fail_allocs.load(Ordering::Relaxed) > 0 {
            self.fail_allocs.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        let page_size = self.page_sizes.lock().pop().unwrap_or(4096);
        let phys_base = self.next_phys.fetch_add(0x0010_0000, Ordering::Relaxed);
        let scatter = self.scatter_next.swap(false, Ordering::Relaxed);
        let null_page = self.null_page_next.lock().take();
        Some(MockMemory::new(len, page_size, phys_base, scatter, null_page))
    }

    fn page_size(&self) -> usize {
        4096
    }

    fn has_channel(&self, direction: Direction) -> bool {
        match direction {
            Direction::Output => self.output_present,
            Direction::Input => self.input_present,
        }
    }

    fn read_reg(&self, direction: Direction, offset: u32) -> u32 {
        let idx = dir_index(direction);
        let value = self.registers.lock()[idx][(offset / 4) as usize];
        if offset == regs::CHANNEL_STATUS {
            // A pending stop lets ACTIVE linger for a few reads before the
            // channel reaches a block boundary and goes idle.
            let left = self.linger_left[idx].load(Ordering::Relaxed);
            if left > 0 && left != u32::MAX {
                self.linger_left[idx].store(left - 1, Ordering::Relaxed);
                if left - 1 == 0 {
                    self.clear_status(direction, ChannelStatus::ACTIVE);
                }
            }
        }
        value
    }

    fn write_reg(&self, direction: Direction, offset: u32, value: u32) {
        self.writes.lock().push(RegWrite {
            direction,
            offset,
            value,
        });
        let idx = dir_index(direction);
        let mut registers = self.registers.lock();
        if offset == regs::CHANNEL_CONTROL {
            let mask = value >> 16;
            let bits = value & 0xFFFF;
            let mut status = registers[idx][1];
            status = (status & !mask) | (bits & mask);

            let run = status & ChannelStatus::RUN.bits() != 0;
            let stop_requested = status & ChannelStatus::STOP_CONDITION.bits() != 0;
            if run && !stop_requested {
                status |= ChannelStatus::ACTIVE.bits();
                self.linger_left[idx].store(0, Ordering::Relaxed);
            } else if !run {
                status &= !ChannelStatus::ACTIVE.bits();
                self.linger_left[idx].store(0, Ordering::Relaxed);
            } else {
                // Stop condition raised while running: idle after linger.
                self.linger_left[idx]
                    .store(self.active_linger.load(Ordering::Relaxed), Ordering::Relaxed);
            }
            registers[idx][1] = status;
        } else {
            registers[idx][(offset / 4) as usize] = value;
        }
    }

    fn interrupt_source_present(&self) -> bool {
        self.interrupt_present
    }

    fn enable_interrupt_source(&self) {
        self.irq_enabled.store(true, Ordering::Relaxed);
    }

    fn disable_interrupt_source(&self) {
        self.irq_enabled.store(false, Ordering::Relaxed);
    }
}

/// Auxiliary transport mock with externally scripted read-back positions.
pub struct MockAuxTransport {
    rate: u32,
    channels: u32,
    frames: u32,
    loops: AtomicU32,
    bytes: AtomicU32,
    started: AtomicBool,
    resync: AtomicBool,
}

impl MockAuxTransport {
    pub fn new(rate: u32, frames: u32) -> Arc<MockAuxTransport> {
        Arc::new(MockAuxTransport {
            rate,
            channels: 1,
            frames,
            loops: AtomicU32::new(0),
            bytes: AtomicU32::new(0),
            started: AtomicBool::new(false),
            resync: AtomicBool::new(false),
        })
    }

    /// Script the reader position: loop count plus byte offset.
    pub fn set_position(&self, loops: u32, bytes: u32) {
        self.loops.store(loops, Ordering::Relaxed);
        self.bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn request_resync(&self) {
        self.resync.store(true, Ordering::Relaxed);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }
}

impl AuxTransport for Arc<MockAuxTransport> {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channel_count(&self) -> u32 {
        self.channels
    }

    fn buffer_frames(&self) -> u32 {
        self.frames
    }

    fn loop_count(&self) -> u32 {
        self.loops.load(Ordering::Relaxed)
    }

    fn byte_count(&self) -> u32 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn start(&self) {
        self.started.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.started.store(false, Ordering::Relaxed);
    }

    fn take_resync_request(&self) -> bool {
        self.resync.swap(false, Ordering::Relaxed)
    }
}

/// Coefficient sink that counts pushes per family.
#[derive(Default)]
pub struct RecordingSink {
    pub eq_pushes: AtomicU32,
    pub limiter_pushes: AtomicU32,
    pub crossover_pushes: AtomicU32,
}

impl CoefficientSink for RecordingSink {
    fn push_eq(&self, _snapshot: &crate::coeffs::EqState) {
        self.eq_pushes.fetch_add(1, Ordering::Relaxed);
    }

    fn push_limiter(&self, _snapshot: &crate::coeffs::LimiterState) {
        self.limiter_pushes.fetch_add(1, Ordering::Relaxed);
    }

    fn push_crossover(&self, _snapshot: &crate::coeffs::CrossoverState) {
        self.crossover_pushes.fetch_add(1, Ordering::Relaxed);
    }
}
