//! # dbdma-audio
//!
//! A `no_std` (plus `alloc`) real-time audio streaming engine for
//! descriptor-based scatter-gather DMA hardware, written in pure Rust. It
//! feeds the hardware channel from a software ring buffer through a closed
//! cycle of hardware descriptors, converts and clips mixer output per
//! block through interchangeable routines, and keeps a separately clocked
//! auxiliary low-frequency device phase-aligned with the main stream via
//! adaptive resampling.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Seams | [`platform`] | Hardware traits: registers, DMA memory, aux transport |
//! | Memory | [`ring`] | Page-aligned ring buffer of sample blocks |
//! | DMA | [`dma`] | Descriptor records, chain builder, channel controller |
//! | Convert | [`convert`] | Closed routine enumeration + atomic selector |
//! | State | [`dbuf`] / [`coeffs`] | Double-buffered EQ/limiter/crossover state |
//! | Sync | [`aux_sync`] | Auxiliary-device drift correction (feature `aux-sync`) |
//! | Facade | [`engine`] | [`DbdmaAudioEngine`] tying it all together |
//!
//! ## Execution contexts
//!
//! No threads are created here. The host supplies three contexts: a
//! hardware interrupt (counters and flags only), a real-time per-block
//! callback (conversion + aux sync), and a non-real-time control context
//! (allocation, rebuilds, coefficient writes). Hand-off between the
//! real-time and control contexts never blocks: coefficients move through
//! two-slot double buffers, the conversion routine through a single atomic
//! reference.
//!
//! ## Quick start
//!
//! ```ignore
//! use dbdma_audio::{DbdmaAudioEngine, EngineConfig};
//!
//! let engine = DbdmaAudioEngine::new(platform, EngineConfig {
//!     block_count: 4,
//!     block_bytes: 512,
//!     with_input: false,
//! })?;
//!
//! // Platform glue registers this with the host interrupt facility:
//! let events = engine.events();
//! // ... in the ISR:        events.on_interrupt();
//! // ... per RT callback:   engine.process_output_block(&mix, block);
//! // ... periodically:      engine.health_check()?;
//!
//! engine.start()?;
//! ```

#![no_std]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod platform;
pub mod format;
pub mod ring;
pub mod dbuf;
pub mod coeffs;
pub mod convert;
pub mod dma;
pub mod diag;
pub mod engine;

#[cfg(feature = "aux-sync")]
pub mod aux_sync;

#[cfg(test)]
pub(crate) mod testing;


pub use engine::{DbdmaAudioEngine, EngineConfig, EngineEvents, FixupFlags, StreamConfig};
pub use error::{Error, Result};
