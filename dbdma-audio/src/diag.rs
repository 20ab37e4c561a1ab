//! Read-only diagnostic copy-out for external tooling.
//!
//! Everything here is a snapshot by value; handing it out never exposes
//! live engine state or requires the caller to hold any lock.

use alloc::vec::Vec;

use crate::coeffs::{CrossoverState, EqState, LimiterState};
use crate::dma::controller::EngineState;
use crate::dma::descriptor::Descriptor;
use crate::format::StreamFormat;
use crate::platform::Direction;

/// Copied channel register contents for one direction.
#[derive(Clone, Copy, Debug)]
pub struct ChannelRegisters {
    pub direction: Direction,
    pub control: u32,
    pub status: u32,
    pub command_ptr: u32,
    pub interrupt_select: u32,
    pub branch_select: u32,
    pub wait_select: u32,
}

/// One complete diagnostic snapshot.
#[derive(Clone, Debug)]
pub struct DiagnosticSnapshot {
    pub state: EngineState,
    pub interrupt_count: u32,
    pub frozen_count: u32,
    pub recovery_count: u32,
    pub engine_dead: bool,

    pub format: StreamFormat,
    pub sample_rate: u32,
    pub aux_attached: bool,

    /// Output descriptor-table contents, head first.
    pub output_descriptors: Vec<Descriptor>,
    /// Input descriptor-table contents, when a capture stream exists.
    pub input_descriptors: Option<Vec<Descriptor>>,
    pub channels: Vec<ChannelRegisters>,

    pub eq: EqState,
    pub limiter: LimiterState,
    pub crossover: CrossoverState,
}
