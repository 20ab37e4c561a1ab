//! Per-block sample conversion and routine selection.
//!
//! The combination of container width, auxiliary-path presence and channel
//! fixups is a *closed* domain: every combination maps to exactly one
//! concrete conversion routine, chosen once whenever an input changes. The
//! real-time path loads the active routine from a single atomic and runs it
//! for the whole block; it contains no conditional logic over these options
//! beyond the one dispatch site.

pub mod routines;

use core::sync::atomic::{AtomicU8, Ordering};

use crate::format::BitWidth;

pub use routines::{ConvertParams, FixupState};

/// Channel fixup combinations with a dedicated routine.
///
/// Unsupported flag combinations resolve to the nearest supported set:
/// mixdown folds the delay fixup in and drops the others, and balance takes
/// precedence over phase inversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FixupSet {
    Plain = 0,
    Delay = 1,
    Balance = 2,
    DelayBalance = 3,
    Invert = 4,
    DelayInvert = 5,
    Mix = 6,
    MixDelay = 7,
}

/// Inputs the routine selection depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutineInputs {
    pub width: BitWidth,
    pub aux: bool,
    pub delay: bool,
    pub mix: bool,
    pub balance: bool,
    pub invert: bool,
}

impl RoutineInputs {
    fn fixups(&self) -> FixupSet {
        if self.mix {
            if self.delay {
                FixupSet::MixDelay
            } else {
                FixupSet::Mix
            }
        } else {
            match (self.delay, self.balance, self.invert) {
                (false, false, false) => FixupSet::Plain,
                (true, false, false) => FixupSet::Delay,
                (false, true, _) => FixupSet::Balance,
                (true, true, _) => FixupSet::DelayBalance,
                (false, false, true) => FixupSet::Invert,
                (true, false, true) => FixupSet::DelayInvert,
            }
        }
    }
}

/// The closed enumeration of conversion routines.
///
/// Discriminants encode `(width, aux, fixups)` positionally: 16 routines
/// per width, 8 per aux flavor, one per fixup set. [`select`] is the total
/// mapping from inputs onto this domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Routine {
    Out16 = 0,
    Out16Delay = 1,
    Out16Balance = 2,
    Out16DelayBalance = 3,
    Out16Invert = 4,
    Out16DelayInvert = 5,
    Out16Mix = 6,
    Out16MixDelay = 7,
    Out16Aux = 8,
    Out16AuxDelay = 9,
    Out16AuxBalance = 10,
    Out16AuxDelayBalance = 11,
    Out16AuxInvert = 12,
    Out16AuxDelayInvert = 13,
    Out16AuxMix = 14,
    Out16AuxMixDelay = 15,
    Out32 = 16,
    Out32Delay = 17,
    Out32Balance = 18,
    Out32DelayBalance = 19,
    Out32Invert = 20,
    Out32DelayInvert = 21,
    Out32Mix = 22,
    Out32MixDelay = 23,
    Out32Aux = 24,
    Out32AuxDelay = 25,
    Out32AuxBalance = 26,
    Out32AuxDelayBalance = 27,
    Out32AuxInvert = 28,
    Out32AuxDelayInvert = 29,
    Out32AuxMix = 30,
    Out32AuxMixDelay = 31,
}

const ROUTINES: [Routine; 32] = [
    Routine::Out16,
    Routine::Out16Delay,
    Routine::Out16Balance,
    Routine::Out16DelayBalance,
    Routine::Out16Invert,
    Routine::Out16DelayInvert,
    Routine::Out16Mix,
    Routine::Out16MixDelay,
    Routine::Out16Aux,
    Routine::Out16AuxDelay,
    Routine::Out16AuxBalance,
    Routine::Out16AuxDelayBalance,
    Routine::Out16AuxInvert,
    Routine::Out16AuxDelayInvert,
    Routine::Out16AuxMix,
    Routine::Out16AuxMixDelay,
    Routine::Out32,
    Routine::Out32Delay,
    Routine::Out32Balance,
    Routine::Out32DelayBalance,
    Routine::Out32Invert,
    Routine::Out32DelayInvert,
    Routine::Out32Mix,
    Routine::Out32MixDelay,
    Routine::Out32Aux,
    Routine::Out32AuxDelay,
    Routine::Out32AuxBalance,
    Routine::Out32AuxDelayBalance,
    Routine::Out32AuxInvert,
    Routine::Out32AuxDelayInvert,
    Routine::Out32AuxMix,
    Routine::Out32AuxMixDelay,
];

impl Routine {
    fn from_raw(raw: u8) -> Routine {
        ROUTINES[(raw & 0x1F) as usize]
    }

    pub fn width(self) -> BitWidth {
        if (self as u8) & 16 == 0 {
            BitWidth::W16
        } else {
            BitWidth::W32
        }
    }

    pub fn has_aux(self) -> bool {
        (self as u8) & 8 != 0
    }

    pub fn fixups(self) -> FixupSet {
        match (self as u8) & 0b111 {
            0 => FixupSet::Plain,
            1 => FixupSet::Delay,
            2 => FixupSet::Balance,
            3 => FixupSet::DelayBalance,
            4 => FixupSet::Invert,
            5 => FixupSet::DelayInvert,
            6 => FixupSet::Mix,
            _ => FixupSet::MixDelay,
        }
    }
}

/// Pure, total mapping from selection inputs to a routine.
pub fn select(inputs: RoutineInputs) -> Routine {
    let width = match inputs.width {
        BitWidth::W16 => 0u8,
        BitWidth::W32 => 16,
    };
    let aux = if inputs.aux { 8u8 } else { 0 };
    Routine::from_raw(width | aux | inputs.fixups() as u8)
}

/// Holder of the active routine reference.
///
/// Replacement is a single atomic store, so an in-flight real-time call
/// that already loaded the previous routine keeps using it safely for the
/// remainder of its block.
pub struct RoutineSelector {
    active: AtomicU8,
}

impl RoutineSelector {
    pub fn new(initial: Routine) -> RoutineSelector {
        RoutineSelector {
            active: AtomicU8::new(initial as u8),
        }
    }

    /// Recompute and publish the routine for changed inputs.
    pub fn reselect(&self, inputs: RoutineInputs) -> Routine {
        let routine = select(inputs);
        self.active.store(routine as u8, Ordering::Release);
        routine
    }

    /// The routine the real-time path runs until the next change.
    #[inline]
    pub fn active(&self) -> Routine {
        Routine::from_raw(self.active.load(Ordering::Acquire))
    }
}
