//! Descriptor-based DMA: hardware records, chain construction and channel
//! control.
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`descriptor`] | 16-byte hardware descriptor records |
//! | [`chain`] | closed-cycle descriptor chain construction |
//! | [`controller`] | channel start/stop, heartbeat, freeze recovery |

pub mod chain;
pub mod controller;
pub mod descriptor;

pub use chain::DescriptorChain;
pub use controller::{ControllerState, EngineState, Health};
pub use descriptor::{Condition, Descriptor};
