//! Stream formats and the negotiation table.

use crate::error::{Error, Result};

/// Container width of one sample on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitWidth {
    W16,
    W32,
}

impl BitWidth {
    /// Bytes occupied by one sample.
    pub const fn bytes(self) -> usize {
        match self {
            BitWidth::W16 => 2,
            BitWidth::W32 => 4,
        }
    }
}

/// Numeric representation of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    LinearPcm,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// One negotiable stream format.
///
/// `bit_depth` counts the significant bits within the `bit_width` container
/// (24-in-32 formats carry depth 24, width [`BitWidth::W32`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u32,
    pub bit_depth: u32,
    pub bit_width: BitWidth,
    pub kind: SampleKind,
    pub byte_order: ByteOrder,
    /// Whether the host mixer may blend other clients into this stream.
    pub mixable: bool,
}

impl StreamFormat {
    /// Bytes occupied by one frame (all channels of one sample instant).
    pub const fn frame_bytes(&self) -> usize {
        self.bit_width.bytes() * self.channels as usize
    }
}

/// A negotiation-table entry: a format and the rates it supports.
#[derive(Clone, Copy, Debug)]
pub struct FormatEntry {
    pub format: StreamFormat,
    pub rates: &'static [u32],
}

/// Formats the engine offers, in preference order. The first entry is the
/// default selected and applied at initialization.
pub const FORMATS: &[FormatEntry] = &[
    FormatEntry {
        format: StreamFormat {
            channels: 2,
            bit_depth: 16,
            bit_width: BitWidth::W16,
            kind: SampleKind::LinearPcm,
            byte_order: ByteOrder::Big,
            mixable: true,
        },
        rates: &[44_100],
    },
    FormatEntry {
        format: StreamFormat {
            channels: 2,
            bit_depth: 24,
            bit_width: BitWidth::W32,
            kind: SampleKind::LinearPcm,
            byte_order: ByteOrder::Big,
            mixable: true,
        },
        rates: &[44_100, 48_000],
    },
];

/// The default format applied at initialization.
pub fn default_format() -> StreamFormat {
    FORMATS[0].format
}

/// The default sample rate of the default format.
pub fn default_rate() -> u32 {
    FORMATS[0].rates[0]
}

/// Validate an output/input format pairing.
///
/// The two directions may diverge in sample format (kind, depth, byte
/// order) but must share the same container width, since both directions
/// walk the same block geometry.
pub fn validate_pair(output: &StreamFormat, input: Option<&StreamFormat>) -> Result<()> {
    if let Some(input) = input {
        if input.bit_width != output.bit_width {
            return Err(Error::FormatMismatch);
        }
    }
    Ok(())
}
