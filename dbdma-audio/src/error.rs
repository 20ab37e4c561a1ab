//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the streaming engine's control path.
///
/// Real-time and interrupt contexts never construct these; transient
/// conditions there (heartbeat stalls, auxiliary drift) are handled with
/// bounded internal retry/resync loops and only escalate through
/// [`Error::EngineDead`] after repeated failed recoveries.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// DMA memory allocation or physical segment lookup failed while
    /// building a ring buffer or descriptor chain. No partial chain is
    /// ever installed.
    #[error("DMA allocation or physical segment lookup failed")]
    AllocationFailure,

    /// The platform exposes no interrupt source or no output channel.
    #[error("missing interrupt source or channel address")]
    ConfigurationMissing,

    /// Input and output stream formats must share the same bit width.
    #[error("input and output formats must share bit width")]
    FormatMismatch,

    /// A coefficient write named a filter bank outside the valid range.
    #[error("filter bank index {0} out of range")]
    InvalidBand(usize),

    /// The operation requires the engine to be administratively stopped.
    #[error("engine must be stopped for this operation")]
    NotStopped,

    /// The engine heartbeat stalled repeatedly and every bounded recovery
    /// attempt failed.
    #[error("engine health fault after repeated failed recoveries")]
    EngineDead,
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
