//! Processing-state families: EQ, limiter and crossover coefficients.
//!
//! Each family keeps two complete instances behind a [`DoubleBuffer`] so the
//! control path can update coefficients live without the real-time callback
//! ever observing a half-updated set. The three families swap independently
//! of one another; a single callback may therefore see new crossover
//! coefficients together with old limiter coefficients. That is an accepted
//! tradeoff of the independent-swap design, not a bug.

use crate::constants::{CROSSOVER_POINTS, EQ_BANDS};
use crate::dbuf::DoubleBuffer;
use crate::error::{Error, Result};
use crate::platform::CoefficientSink;

/// Second-order filter section coefficients, consumed as-is.
///
/// Coefficient *computation* belongs to the filter-design collaborator;
/// this engine only stores and hands the values to the real-time path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    /// The identity filter (unity passthrough).
    pub const IDENTITY: BiquadCoeffs = BiquadCoeffs {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };
}

/// One complete EQ instance: a fixed bank of filter sections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EqState {
    pub bands: [BiquadCoeffs; EQ_BANDS],
    /// Number of banks the real-time path actually runs.
    pub active_bands: usize,
    pub enabled: bool,
}

impl EqState {
    pub const fn flat() -> EqState {
        EqState {
            bands: [BiquadCoeffs::IDENTITY; EQ_BANDS],
            active_bands: 0,
            enabled: false,
        }
    }
}

/// One complete limiter instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimiterState {
    pub threshold: f32,
    pub attack: f32,
    pub release: f32,
    pub lookahead: f32,
    pub enabled: bool,
}

impl LimiterState {
    pub const fn bypass() -> LimiterState {
        LimiterState {
            threshold: 1.0,
            attack: 0.0,
            release: 0.0,
            lookahead: 0.0,
            enabled: false,
        }
    }
}

/// One complete crossover instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossoverState {
    pub frequencies: [f32; CROSSOVER_POINTS],
    pub point_count: usize,
}

impl CrossoverState {
    pub const fn none() -> CrossoverState {
        CrossoverState {
            frequencies: [0.0; CROSSOVER_POINTS],
            point_count: 0,
        }
    }
}

/// Coherent per-callback view of all three families, taken once at the
/// top of a real-time callback and used for the entire call.
///
/// Because the families swap independently, a snapshot may pair a new
/// crossover instance with an old limiter instance; within each family,
/// however, the instance is always complete.
#[derive(Clone, Copy, Debug)]
pub struct ProcessingSnapshot {
    pub eq: EqState,
    pub limiter: LimiterState,
    pub crossover: CrossoverState,
}

/// The three independently swapped processing-state families.
///
/// Created once at engine init and kept until teardown; only instance
/// contents are ever mutated.
pub struct ProcessingBanks {
    eq: DoubleBuffer<EqState>,
    limiter: DoubleBuffer<LimiterState>,
    crossover: DoubleBuffer<CrossoverState>,
}

impl ProcessingBanks {
    pub fn new() -> Self {
        ProcessingBanks {
            eq: DoubleBuffer::new(EqState::flat()),
            limiter: DoubleBuffer::new(LimiterState::bypass()),
            crossover: DoubleBuffer::new(CrossoverState::none()),
        }
    }

    /// Replace one EQ filter bank. The index is validated here, at the
    /// control-path boundary, before anything reaches the double buffer.
    pub fn set_eq_band(&self, band: usize, coeffs: BiquadCoeffs) -> Result<()> {
        if band >= EQ_BANDS {
            return Err(Error::InvalidBand(band));
        }
        self.eq.update(|eq| {
            eq.bands[band] = coeffs;
            if band >= eq.active_bands {
                eq.active_bands = band + 1;
            }
        });
        Ok(())
    }

    pub fn set_eq(&self, state: EqState) -> Result<()> {
        if state.active_bands > EQ_BANDS {
            return Err(Error::InvalidBand(state.active_bands));
        }
        self.eq.publish(state);
        Ok(())
    }

    pub fn set_limiter(&self, state: LimiterState) {
        self.limiter.publish(state);
    }

    pub fn set_crossover(&self, state: CrossoverState) -> Result<()> {
        if state.point_count > CROSSOVER_POINTS {
            return Err(Error::InvalidBand(state.point_count));
        }
        self.crossover.publish(state);
        Ok(())
    }

    /// Reset every family to its initial instance (engine start).
    pub fn reset(&self) {
        self.eq.publish(EqState::flat());
        self.limiter.publish(LimiterState::bypass());
        self.crossover.publish(CrossoverState::none());
    }

    #[inline]
    pub fn eq_snapshot(&self) -> EqState {
        self.eq.snapshot()
    }

    #[inline]
    pub fn limiter_snapshot(&self) -> LimiterState {
        self.limiter.snapshot()
    }

    #[inline]
    pub fn crossover_snapshot(&self) -> CrossoverState {
        self.crossover.snapshot()
    }

    /// One coherent per-callback read of every family (real-time path).
    #[inline]
    pub fn rt_snapshot(&self) -> ProcessingSnapshot {
        ProcessingSnapshot {
            eq: self.eq_snapshot(),
            limiter: self.limiter_snapshot(),
            crossover: self.crossover_snapshot(),
        }
    }

    /// Push current snapshots of every family to a non-real-time consumer.
    pub fn push_to<S: CoefficientSink>(&self, sink: &S) {
        sink.push_eq(&self.eq_snapshot());
        sink.push_limiter(&self.limiter_snapshot());
        sink.push_crossover(&self.crossover_snapshot());
    }
}

impl Default for ProcessingBanks {
    fn default() -> Self {
        Self::new()
    }
}
