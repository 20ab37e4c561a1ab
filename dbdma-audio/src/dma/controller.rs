//! DMA channel control: start/stop sequencing, heartbeat and freeze
//! recovery.
//!
//! ## State machine
//!
//! ```text
//! Stopped → Starting → Running → StoppingFlush → Stopped
//!              ▲                      │
//!              └────── restart ◄──────┘
//! ```
//!
//! ## Heartbeat
//!
//! Every interrupt increments a monotonic counter. A periodic health check
//! (never run from interrupt context) compares the counter to its previous
//! value; no change across [`FREEZE_CHECKS`](crate::constants::FREEZE_CHECKS)
//! consecutive checks declares the engine frozen and asks the caller to
//! restart it. The interrupt handler itself only *raises* a needs-restart
//! flag when a channel goes inactive unexpectedly; it never acts on it.
//!
//! Freeze is a bounded, retried, non-fatal condition. Only repeated
//! unsuccessful recoveries escalate to a persistent engine-health fault.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use bitflags::bitflags;
use log::{error, warn};

use crate::constants::{FREEZE_CHECKS, MAX_RECOVERIES, STOP_POLL_RETRIES};
use crate::platform::{Direction, Platform, PhysAddr};

/// Channel register offsets from the channel base.
pub mod regs {
    pub const CHANNEL_CONTROL: u32 = 0x00;
    pub const CHANNEL_STATUS: u32 = 0x04;
    pub const COMMAND_PTR_HI: u32 = 0x08;
    pub const COMMAND_PTR_LO: u32 = 0x0C;
    pub const INTERRUPT_SELECT: u32 = 0x10;
    pub const BRANCH_SELECT: u32 = 0x14;
    pub const WAIT_SELECT: u32 = 0x18;
}

bitflags! {
    /// Channel status bits (lower halfword of the status register).
    ///
    /// Writes to the control register carry a bit mask in the upper
    /// halfword and values in the lower one, so single bits can be set or
    /// cleared without read-modify-write races against the hardware.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ChannelStatus: u32 {
        const RUN = 1 << 15;
        const PAUSE = 1 << 14;
        const FLUSH = 1 << 13;
        const WAKE = 1 << 12;
        const DEAD = 1 << 11;
        const ACTIVE = 1 << 10;
        const BRANCH_TAKEN = 1 << 8;
        /// Software-settable condition bit driving branch-if-true.
        const STOP_CONDITION = 1 << 0;
    }
}

/// Administrative run state of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    StoppingFlush = 3,
}

impl EngineState {
    fn from_u8(raw: u8) -> EngineState {
        match raw {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::StoppingFlush,
            _ => EngineState::Stopped,
        }
    }
}

/// Outcome of a periodic health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    Healthy,
    /// The engine looks frozen; restart it from a safe context.
    NeedsRestart,
    /// Recovery has failed repeatedly; the engine is out of service.
    Dead,
}

/// Shared controller state touched from all three execution contexts.
///
/// The interrupt path only ever increments counters, reads channel status
/// and sets flags; everything that sequences hardware runs on the control
/// path.
pub struct ControllerState {
    state: AtomicU8,
    irq_count: AtomicU32,
    last_seen_irq: AtomicU32,
    stalled_checks: AtomicU32,
    needs_restart: AtomicBool,
    frozen_count: AtomicU32,
    recoveries: AtomicU32,
    dead: AtomicBool,
}

impl ControllerState {
    pub const fn new() -> ControllerState {
        ControllerState {
            state: AtomicU8::new(EngineState::Stopped as u8),
            irq_count: AtomicU32::new(0),
            last_seen_irq: AtomicU32::new(0),
            stalled_checks: AtomicU32::new(0),
            needs_restart: AtomicBool::new(false),
            frozen_count: AtomicU32::new(0),
            recoveries: AtomicU32::new(0),
            dead: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn interrupt_count(&self) -> u32 {
        self.irq_count.load(Ordering::Relaxed)
    }

    pub fn frozen_count(&self) -> u32 {
        self.frozen_count.load(Ordering::Relaxed)
    }

    pub fn recovery_count(&self) -> u32 {
        self.recoveries.load(Ordering::Relaxed)
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    fn control_write<P: Platform>(
        platform: &P,
        direction: Direction,
        mask: ChannelStatus,
        value: ChannelStatus,
    ) {
        platform.write_reg(
            direction,
            regs::CHANNEL_CONTROL,
            (mask.bits() << 16) | value.bits(),
        );
    }

    fn read_status<P: Platform>(platform: &P, direction: Direction) -> ChannelStatus {
        ChannelStatus::from_bits_truncate(platform.read_reg(direction, regs::CHANNEL_STATUS))
    }

    /// Start the hardware channels.
    ///
    /// The input channel (if present) starts before the output channel so
    /// capture never lags the first played block. The caller resets
    /// processing and sync state before invoking this.
    pub fn start<P: Platform>(
        &self,
        platform: &P,
        output_head: PhysAddr,
        input_head: Option<PhysAddr>,
    ) {
        self.set_state(EngineState::Starting);

        // Seed the heartbeat so a stale counter from a previous run cannot
        // mask a freeze, and clear any pending restart request.
        self.last_seen_irq
            .store(self.irq_count.load(Ordering::Relaxed), Ordering::Relaxed);
        self.stalled_checks.store(0, Ordering::Relaxed);
        self.needs_restart.store(false, Ordering::Relaxed);

        platform.enable_interrupt_source();

        if let Some(head) = input_head {
            Self::start_channel(platform, Direction::Input, head);
        }
        Self::start_channel(platform, Direction::Output, output_head);

        self.set_state(EngineState::Running);
    }

    fn start_channel<P: Platform>(platform: &P, direction: Direction, head: PhysAddr) {
        // Clear the run bit and every stale condition, including a stop
        // condition left over from the previous stop.
        Self::control_write(
            platform,
            direction,
            ChannelStatus::RUN
                | ChannelStatus::PAUSE
                | ChannelStatus::FLUSH
                | ChannelStatus::WAKE
                | ChannelStatus::DEAD
                | ChannelStatus::STOP_CONDITION,
            ChannelStatus::empty(),
        );

        // Route the software stop condition into branch-if-true.
        platform.write_reg(
            direction,
            regs::BRANCH_SELECT,
            (ChannelStatus::STOP_CONDITION.bits() << 16) | ChannelStatus::STOP_CONDITION.bits(),
        );

        platform.write_reg(direction, regs::COMMAND_PTR_HI, 0);
        platform.write_reg(direction, regs::COMMAND_PTR_LO, head.0);

        Self::control_write(
            platform,
            direction,
            ChannelStatus::RUN | ChannelStatus::WAKE,
            ChannelStatus::RUN | ChannelStatus::WAKE,
        );
    }

    /// Stop the hardware channels.
    ///
    /// Raises the stop condition so the chain halts at a block boundary,
    /// polls the ACTIVE bit for a bounded number of retries, then forces a
    /// hardware stop unconditionally. This never blocks indefinitely.
    pub fn stop<P: Platform>(&self, platform: &P, has_input: bool) {
        self.set_state(EngineState::StoppingFlush);

        Self::stop_channel(platform, Direction::Output);
        if has_input {
            Self::stop_channel(platform, Direction::Input);
        }
        platform.disable_interrupt_source();

        self.set_state(EngineState::Stopped);
    }

    fn stop_channel<P: Platform>(platform: &P, direction: Direction) {
        Self::control_write(
            platform,
            direction,
            ChannelStatus::STOP_CONDITION,
            ChannelStatus::STOP_CONDITION,
        );

        let mut idle = false;
        for _ in 0..STOP_POLL_RETRIES {
            if !Self::read_status(platform, direction).contains(ChannelStatus::ACTIVE) {
                idle = true;
                break;
            }
            core::hint::spin_loop();
        }
        if !idle {
            warn!(
                "{:?} channel still active after {} polls, forcing stop",
                direction, STOP_POLL_RETRIES
            );
        }

        // Forced stop/reset, applied whether or not idle was observed.
        Self::control_write(
            platform,
            direction,
            ChannelStatus::RUN
                | ChannelStatus::PAUSE
                | ChannelStatus::WAKE
                | ChannelStatus::DEAD
                | ChannelStatus::STOP_CONDITION
                | ChannelStatus::FLUSH,
            ChannelStatus::FLUSH,
        );
        Self::control_write(
            platform,
            direction,
            ChannelStatus::FLUSH,
            ChannelStatus::empty(),
        );
    }

    /// Interrupt entry: count the heartbeat and inspect both channels.
    ///
    /// Interrupt-context-legal: atomics and register reads only, no
    /// allocation, no locks. A channel found inactive while the engine is
    /// running raises the needs-restart flag; acting on it is left to the
    /// next health check.
    pub fn on_interrupt<P: Platform>(&self, platform: &P, has_input: bool) {
        self.irq_count.fetch_add(1, Ordering::Relaxed);

        if self.state() != EngineState::Running {
            return;
        }
        let mut lost = !Self::read_status(platform, Direction::Output).contains(ChannelStatus::ACTIVE);
        if has_input {
            lost |= !Self::read_status(platform, Direction::Input).contains(ChannelStatus::ACTIVE);
        }
        if lost {
            self.needs_restart.store(true, Ordering::Release);
        }
    }

    /// Periodic health check, run from a non-interrupt context.
    pub fn health_check(&self) -> Health {
        if self.is_dead() {
            return Health::Dead;
        }
        if self.state() != EngineState::Running {
            return Health::Healthy;
        }

        if self.needs_restart.swap(false, Ordering::AcqRel) {
            return self.recovery();
        }

        let now = self.irq_count.load(Ordering::Relaxed);
        let last = self.last_seen_irq.swap(now, Ordering::Relaxed);
        if now != last {
            // Heartbeat advanced: the engine is healthy and any earlier
            // recovery evidently succeeded.
            self.stalled_checks.store(0, Ordering::Relaxed);
            self.recoveries.store(0, Ordering::Relaxed);
            return Health::Healthy;
        }

        let stalls = self.stalled_checks.fetch_add(1, Ordering::Relaxed) + 1;
        if stalls < FREEZE_CHECKS {
            return Health::Healthy;
        }
        self.stalled_checks.store(0, Ordering::Relaxed);
        self.frozen_count.fetch_add(1, Ordering::Relaxed);
        self.recovery()
    }

    fn recovery(&self) -> Health {
        let attempts = self.recoveries.fetch_add(1, Ordering::Relaxed) + 1;
        if attempts > MAX_RECOVERIES {
            self.dead.store(true, Ordering::Release);
            error!("engine still frozen after {MAX_RECOVERIES} recovery attempts, giving up");
            Health::Dead
        } else {
            Health::NeedsRestart
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}
