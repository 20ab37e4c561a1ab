//! The concrete conversion/clip routines.
//!
//! Every routine takes one block of interleaved stereo `f32` frames from
//! the host mixer, applies its fixup set, clips, and writes hardware
//! samples into the ring buffer block in hardware byte order (big-endian).
//! Aux-path routines additionally stage a mono low-frequency feed for the
//! auxiliary downsampler.
//!
//! Fixups apply in a fixed order: mixdown, channel delay, balance, phase
//! inversion. The flag combinations are monomorphized through const
//! generics, so the per-sample loops carry no branching over the options.

use alloc::vec::Vec;

use super::Routine;

/// Saturate an `i32` to the 16-bit sample range.
#[inline(always)]
pub(crate) fn saturate16(val: i32) -> i16 {
    val.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Saturate an `i64` to the 32-bit sample range.
#[inline(always)]
fn saturate32(val: i64) -> i32 {
    val.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Clip a mixer sample to a signed 16-bit hardware sample.
#[inline(always)]
fn clip16(sample: f32) -> i16 {
    saturate16((sample * 32768.0) as i32)
}

/// Clip a mixer sample to a left-justified signed 32-bit hardware sample.
#[inline(always)]
fn clip32(sample: f32) -> i32 {
    saturate32((sample as f64 * 2_147_483_648.0) as i64)
}

/// Per-routine parameter values, published separately from the routine
/// choice (the choice says *whether* balance applies, these say *how much*).
#[derive(Clone, Copy, Debug)]
pub struct ConvertParams {
    pub balance_left: f32,
    pub balance_right: f32,
}

impl Default for ConvertParams {
    fn default() -> Self {
        ConvertParams {
            balance_left: 1.0,
            balance_right: 1.0,
        }
    }
}

/// Carry state the delay fixup keeps between blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixupState {
    delayed_right: f32,
}

impl FixupState {
    pub fn reset(&mut self) {
        self.delayed_right = 0.0;
    }
}

#[inline(always)]
fn apply_fixups<const DELAY: bool, const MIX: bool, const BALANCE: bool, const INVERT: bool>(
    mut left: f32,
    mut right: f32,
    params: &ConvertParams,
    state: &mut FixupState,
) -> (f32, f32) {
    if MIX {
        let mono = 0.5 * (left + right);
        left = mono;
        right = mono;
    }
    if DELAY {
        let current = right;
        right = state.delayed_right;
        state.delayed_right = current;
    }
    if BALANCE {
        left *= params.balance_left;
        right *= params.balance_right;
    }
    if INVERT {
        right = -right;
    }
    (left, right)
}

fn convert16<
    const AUX: bool,
    const DELAY: bool,
    const MIX: bool,
    const BALANCE: bool,
    const INVERT: bool,
>(
    mix: &[f32],
    out: &mut [u8],
    params: &ConvertParams,
    state: &mut FixupState,
    aux_feed: Option<&mut Vec<f32>>,
) {
    let frames = mix.len() / 2;
    debug_assert!(out.len() >= frames * 4);
    let feed = if AUX { aux_feed } else { None };
    let mut feed = feed.map(|f| {
        f.clear();
        f
    });

    for frame in 0..frames {
        let (left, right) = apply_fixups::<DELAY, MIX, BALANCE, INVERT>(
            mix[frame * 2],
            mix[frame * 2 + 1],
            params,
            state,
        );
        if let Some(feed) = feed.as_mut() {
            feed.push(0.5 * (left + right));
        }
        out[frame * 4..frame * 4 + 2].copy_from_slice(&clip16(left).to_be_bytes());
        out[frame * 4 + 2..frame * 4 + 4].copy_from_slice(&clip16(right).to_be_bytes());
    }
}

fn convert32<
    const AUX: bool,
    const DELAY: bool,
    const MIX: bool,
    const BALANCE: bool,
    const INVERT: bool,
>(
    mix: &[f32],
    out: &mut [u8],
    params: &ConvertParams,
    state: &mut FixupState,
    aux_feed: Option<&mut Vec<f32>>,
) {
    let frames = mix.len() / 2;
    debug_assert!(out.len() >= frames * 8);
    let feed = if AUX { aux_feed } else { None };
    let mut feed = feed.map(|f| {
        f.clear();
        f
    });

    for frame in 0..frames {
        let (left, right) = apply_fixups::<DELAY, MIX, BALANCE, INVERT>(
            mix[frame * 2],
            mix[frame * 2 + 1],
            params,
            state,
        );
        if let Some(feed) = feed.as_mut() {
            feed.push(0.5 * (left + right));
        }
        out[frame * 8..frame * 8 + 4].copy_from_slice(&clip32(left).to_be_bytes());
        out[frame * 8 + 4..frame * 8 + 8].copy_from_slice(&clip32(right).to_be_bytes());
    }
}

/// The one dispatch site of the real-time path.
pub fn run(
    routine: Routine,
    mix: &[f32],
    out: &mut [u8],
    params: &ConvertParams,
    state: &mut FixupState,
    aux_feed: Option<&mut Vec<f32>>,
) {
    use Routine::*;
    match routine {
        Out16 => convert16::<false, false, false, false, false>(mix, out, params, state, aux_feed),
        Out16Delay => convert16::<false, true, false, false, false>(mix, out, params, state, aux_feed),
        Out16Balance => convert16::<false, false, false, true, false>(mix, out, params, state, aux_feed),
        Out16DelayBalance => convert16::<false, true, false, true, false>(mix, out, params, state, aux_feed),
        Out16Invert => convert16::<false, false, false, false, true>(mix, out, params, state, aux_feed),
        Out16DelayInvert => convert16::<false, true, false, false, true>(mix, out, params, state, aux_feed),
        Out16Mix => convert16::<false, false, true, false, false>(mix, out, params, state, aux_feed),
        Out16MixDelay => convert16::<false, true, true, false, false>(mix, out, params, state, aux_feed),
        Out16Aux => convert16::<true, false, false, false, false>(mix, out, params, state, aux_feed),
        Out16AuxDelay => convert16::<true, true, false, false, false>(mix, out, params, state, aux_feed),
        Out16AuxBalance => convert16::<true, false, false, true, false>(mix, out, params, state, aux_feed),
        Out16AuxDelayBalance => convert16::<true, true, false, true, false>(mix, out, params, state, aux_feed),
        Out16AuxInvert => convert16::<true, false, false, false, true>(mix, out, params, state, aux_feed),
        Out16AuxDelayInvert => convert16::<true, true, false, false, true>(mix, out, params, state, aux_feed),
        Out16AuxMix => convert16::<true, false, true, false, false>(mix, out, params, state, aux_feed),
        Out16AuxMixDelay => convert16::<true, true, true, false, false>(mix, out, params, state, aux_feed),
        Out32 => convert32::<false, false, false, false, false>(mix, out, params, state, aux_feed),
        Out32Delay => convert32::<false, true, false, false, false>(mix, out, params, state, aux_feed),
        Out32Balance => convert32::<false, false, false, true, false>(mix, out, params, state, aux_feed),
        Out32DelayBalance => convert32::<false, true, false, true, false>(mix, out, params, state, aux_feed),
        Out32Invert => convert32::<false, false, false, false, true>(mix, out, params, state, aux_feed),
        Out32DelayInvert => convert32::<false, true, false, false, true>(mix, out, params, state, aux_feed),
        Out32Mix => convert32::<false, false, true, false, false>(mix, out, params, state, aux_feed),
        Out32MixDelay => convert32::<false, true, true, false, false>(mix, out, params, state, aux_feed),
        Out32Aux => convert32::<true, false, false, false, false>(mix, out, params, state, aux_feed),
        Out32AuxDelay => convert32::<true, true, false, false, false>(mix, out, params, state, aux_feed),
        Out32AuxBalance => convert32::<true, false, false, true, false>(mix, out, params, state, aux_feed),
        Out32AuxDelayBalance => convert32::<true, true, false, true, false>(mix, out, params, state, aux_feed),
        Out32AuxInvert => convert32::<true, false, false, false, true>(mix, out, params, state, aux_feed),
        Out32AuxDelayInvert => convert32::<true, true, false, false, true>(mix, out, params, state, aux_feed),
        Out32AuxMix => convert32::<true, false, true, false, false>(mix, out, params, state, aux_feed),
        Out32AuxMixDelay => convert32::<true, true, true, false, false>(mix, out, params, state, aux_feed),
    }
}
