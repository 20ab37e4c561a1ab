/// Size in bytes of one hardware DMA descriptor.
pub const DESCRIPTOR_BYTES: usize = 16;

/// Consecutive unchanged heartbeat checks before the engine is declared frozen.
pub const FREEZE_CHECKS: u32 = 3;

/// Failed recovery attempts before the engine is declared dead.
pub const MAX_RECOVERIES: u32 = 5;

/// Channel-status poll budget while waiting for hardware idle during stop.
pub const STOP_POLL_RETRIES: u32 = 1000;

/// The adaptive source rate is nudged by `nominal >> RATE_NUDGE_SHIFT`.
pub const RATE_NUDGE_SHIFT: u32 = 4;

/// Number of EQ filter banks per processing-state instance.
pub const EQ_BANDS: usize = 8;

/// Maximum number of crossover points per processing-state instance.
pub const CROSSOVER_POINTS: usize = 4;
