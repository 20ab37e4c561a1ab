//! Hardware DMA descriptor records.
//!
//! Each descriptor is a 16-byte record the channel engine reads directly
//! from memory:
//!
//! ```text
//!  31      28 27    24 23  20 19  18 17  16 15           0
//! ┌──────────┬────────┬──────┬──────┬──────┬──────────────┐
//! │ opcode   │ key    │ intr │ brch │ wait │ request count│  command
//! ├──────────┴────────┴──────┴──────┴──────┴──────────────┤
//! │ source/target physical address                        │  address
//! ├───────────────────────────────────────────────────────┤
//! │ branch-target physical address                        │  branch
//! ├───────────────────────────────────────────────────────┤
//! │ transfer result / status (written back by hardware)   │  result
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Descriptors are stored little-endian as the channel engine requires,
//! regardless of host endianness; the accessors decode on the way out.

use crate::platform::PhysAddr;

/// Descriptor opcodes (bits 28–31 of the command word).
pub mod op {
    pub const OUTPUT_MORE: u32 = 0x0000_0000;
    pub const OUTPUT_LAST: u32 = 0x1000_0000;
    pub const INPUT_MORE: u32 = 0x2000_0000;
    pub const INPUT_LAST: u32 = 0x3000_0000;
    pub const STORE_QUAD: u32 = 0x4000_0000;
    pub const LOAD_QUAD: u32 = 0x5000_0000;
    pub const NOP: u32 = 0x6000_0000;
    pub const STOP: u32 = 0x7000_0000;
    pub const MASK: u32 = 0xF000_0000;
}

const INTERRUPT_SHIFT: u32 = 20;
const BRANCH_SHIFT: u32 = 18;
const WAIT_SHIFT: u32 = 16;
const CONDITION_MASK: u32 = 0b11;
const COUNT_MASK: u32 = 0xFFFF;

/// Condition code shared by the interrupt, branch and wait fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Condition {
    Never = 0,
    IfTrue = 1,
    IfFalse = 2,
    Always = 3,
}

impl Condition {
    fn from_bits(bits: u32) -> Condition {
        match bits & CONDITION_MASK {
            0 => Condition::Never,
            1 => Condition::IfTrue,
            2 => Condition::IfFalse,
            _ => Condition::Always,
        }
    }
}

/// One 16-byte hardware descriptor, stored in hardware byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    command: u32,
    address: u32,
    branch: u32,
    result: u32,
}

impl Descriptor {
    pub const fn zeroed() -> Descriptor {
        Descriptor {
            command: 0,
            address: 0,
            branch: 0,
            result: 0,
        }
    }

    /// A non-transferring stop marker. The channel engine halts when it
    /// fetches this descriptor.
    pub fn stop() -> Descriptor {
        Descriptor {
            command: op::STOP.to_le(),
            address: 0,
            branch: 0,
            result: 0,
        }
    }

    /// A data-transfer descriptor.
    ///
    /// # Arguments
    ///
    /// - `opcode`: one of the [`op`] transfer opcodes.
    /// - `count`: transfer length in bytes (one block).
    /// - `address`: physical address of the block's sample data.
    /// - `branch_to`: physical branch target; meaningful when `branch`
    ///   is not [`Condition::Never`].
    /// - `interrupt` / `branch` / `wait`: hardware condition codes.
    pub fn transfer(
        opcode: u32,
        count: u16,
        address: PhysAddr,
        branch_to: PhysAddr,
        interrupt: Condition,
        branch: Condition,
        wait: Condition,
    ) -> Descriptor {
        debug_assert_eq!(opcode & !op::MASK, 0);
        let command = opcode
            | ((interrupt as u32) << INTERRUPT_SHIFT)
            | ((branch as u32) << BRANCH_SHIFT)
            | ((wait as u32) << WAIT_SHIFT)
            | (count as u32 & COUNT_MASK);
        Descriptor {
            command: command.to_le(),
            address: address.0.to_le(),
            branch: branch_to.0.to_le(),
            result: 0,
        }
    }

    pub fn opcode(&self) -> u32 {
        u32::from_le(self.command) & op::MASK
    }

    pub fn is_stop(&self) -> bool {
        self.opcode() == op::STOP
    }

    /// Whether this descriptor transfers sample data.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self.opcode(),
            op::OUTPUT_MORE | op::OUTPUT_LAST | op::INPUT_MORE | op::INPUT_LAST
        )
    }

    pub fn req_count(&self) -> u16 {
        (u32::from_le(self.command) & COUNT_MASK) as u16
    }

    pub fn address(&self) -> PhysAddr {
        PhysAddr(u32::from_le(self.address))
    }

    pub fn branch_target(&self) -> PhysAddr {
        PhysAddr(u32::from_le(self.branch))
    }

    pub fn interrupt(&self) -> Condition {
        Condition::from_bits(u32::from_le(self.command) >> INTERRUPT_SHIFT)
    }

    pub fn branch_condition(&self) -> Condition {
        Condition::from_bits(u32::from_le(self.command) >> BRANCH_SHIFT)
    }

    pub fn wait_condition(&self) -> Condition {
        Condition::from_bits(u32::from_le(self.command) >> WAIT_SHIFT)
    }
}
