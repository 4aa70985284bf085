//! Decoded NWScript instructions.
//!
//! NWScript compiles to a stack machine whose evaluation stack is made of 4-byte frames. Every
//! instruction starts with a two byte pair, the opcode and a *type qualifier* that selects the
//! operand types (`ADDII`, `ADDIF`, `ADDFF`, ... all share opcode `0x14`). This module models
//! such instructions after decoding: the [`InstructionType`] names the (opcode, qualifier) pair,
//! [`Operand`] holds the decoded immediate operands and [`Instruction`] ties both to a byte
//! offset within the program.
//!
//! # Key Components
//!
//! - [`InstructionType`] - Closed set of every instruction of the ISA
//! - [`InstructionFlags`] - Control-flow and addressing classification
//! - [`Operand`] - Immediate operand shapes
//! - [`Instruction`] - An instruction at a specific offset

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Classification of an instruction's effect on control flow and stack addressing
    pub struct InstructionFlags : u8 {
        /// Transfers control to a relative jump target
        const BRANCH = 0x01;
        /// Control never falls through to the next instruction
        const TERMINATOR = 0x02;
        /// Registers an implicit target that is executed later (`STORE_STATE`)
        const DEFERRED_TARGET = 0x04;
        /// Addresses a frame relative to the globals base pointer
        const BASE_RELATIVE = 0x08;
    }
}

/// Every instruction of the NWScript virtual machine.
///
/// The `Display` and `FromStr` forms are the canonical upper-case mnemonics used in pcode
/// listings (`CPDOWNSP`, `RSADDI`, `STORE_STATE`, ...).
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, EnumCount,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum InstructionType {
    CpDownSp,
    RsAddI,
    RsAddF,
    RsAddS,
    RsAddO,
    RsAddEff,
    RsAddEvt,
    RsAddLoc,
    RsAddTal,
    CpTopSp,
    ConstI,
    ConstF,
    ConstS,
    ConstO,
    Action,
    LogAndII,
    LogOrII,
    IncOrII,
    ExcOrII,
    BoolAndII,
    EqualII,
    EqualFF,
    EqualSS,
    EqualOO,
    EqualTT,
    EqualEffEff,
    EqualEvtEvt,
    EqualLocLoc,
    EqualTalTal,
    NEqualII,
    NEqualFF,
    NEqualSS,
    NEqualOO,
    NEqualTT,
    NEqualEffEff,
    NEqualEvtEvt,
    NEqualLocLoc,
    NEqualTalTal,
    GeqII,
    GeqFF,
    GtII,
    GtFF,
    LtII,
    LtFF,
    LeqII,
    LeqFF,
    ShLeftII,
    ShRightII,
    UShRightII,
    AddII,
    AddIF,
    AddFI,
    AddFF,
    AddSS,
    AddVV,
    SubII,
    SubIF,
    SubFI,
    SubFF,
    SubVV,
    MulII,
    MulIF,
    MulFI,
    MulFF,
    MulVF,
    MulFV,
    DivII,
    DivIF,
    DivFI,
    DivFF,
    DivVF,
    DivFV,
    ModII,
    NegI,
    NegF,
    CompI,
    MovSp,
    #[strum(serialize = "STORE_STATEALL")]
    StoreStateAll,
    Jmp,
    Jsr,
    Jz,
    Retn,
    Destruct,
    NotI,
    DecISp,
    IncISp,
    Jnz,
    CpDownBp,
    CpTopBp,
    DecIBp,
    IncIBp,
    SaveBp,
    RestoreBp,
    #[strum(serialize = "STORE_STATE")]
    StoreState,
    Nop,
    Nop2,
}

impl InstructionType {
    /// Returns the `(opcode, qualifier)` byte pair that encodes this instruction in NCS files.
    #[must_use]
    pub const fn encoding(self) -> (u8, u8) {
        use InstructionType as T;
        match self {
            T::CpDownSp => (0x01, 0x01),
            T::RsAddI => (0x02, 0x03),
            T::RsAddF => (0x02, 0x04),
            T::RsAddS => (0x02, 0x05),
            T::RsAddO => (0x02, 0x06),
            T::RsAddEff => (0x02, 0x10),
            T::RsAddEvt => (0x02, 0x11),
            T::RsAddLoc => (0x02, 0x12),
            T::RsAddTal => (0x02, 0x13),
            T::CpTopSp => (0x03, 0x01),
            T::ConstI => (0x04, 0x03),
            T::ConstF => (0x04, 0x04),
            T::ConstS => (0x04, 0x05),
            T::ConstO => (0x04, 0x06),
            T::Action => (0x05, 0x00),
            T::LogAndII => (0x06, 0x20),
            T::LogOrII => (0x07, 0x20),
            T::IncOrII => (0x08, 0x20),
            T::ExcOrII => (0x09, 0x20),
            T::BoolAndII => (0x0A, 0x20),
            T::EqualII => (0x0B, 0x20),
            T::EqualFF => (0x0B, 0x21),
            T::EqualSS => (0x0B, 0x23),
            T::EqualOO => (0x0B, 0x22),
            T::EqualTT => (0x0B, 0x24),
            T::EqualEffEff => (0x0B, 0x30),
            T::EqualEvtEvt => (0x0B, 0x31),
            T::EqualLocLoc => (0x0B, 0x32),
            T::EqualTalTal => (0x0B, 0x33),
            T::NEqualII => (0x0C, 0x20),
            T::NEqualFF => (0x0C, 0x21),
            T::NEqualSS => (0x0C, 0x23),
            T::NEqualOO => (0x0C, 0x22),
            T::NEqualTT => (0x0C, 0x24),
            T::NEqualEffEff => (0x0C, 0x30),
            T::NEqualEvtEvt => (0x0C, 0x31),
            T::NEqualLocLoc => (0x0C, 0x32),
            T::NEqualTalTal => (0x0C, 0x33),
            T::GeqII => (0x0D, 0x20),
            T::GeqFF => (0x0D, 0x21),
            T::GtII => (0x0E, 0x20),
            T::GtFF => (0x0E, 0x21),
            T::LtII => (0x0F, 0x20),
            T::LtFF => (0x0F, 0x21),
            T::LeqII => (0x10, 0x20),
            T::LeqFF => (0x10, 0x21),
            T::ShLeftII => (0x11, 0x20),
            T::ShRightII => (0x12, 0x20),
            T::UShRightII => (0x13, 0x20),
            T::AddII => (0x14, 0x20),
            T::AddIF => (0x14, 0x25),
            T::AddFI => (0x14, 0x26),
            T::AddFF => (0x14, 0x21),
            T::AddSS => (0x14, 0x23),
            T::AddVV => (0x14, 0x3A),
            T::SubII => (0x15, 0x20),
            T::SubIF => (0x15, 0x25),
            T::SubFI => (0x15, 0x26),
            T::SubFF => (0x15, 0x21),
            T::SubVV => (0x15, 0x3A),
            T::MulII => (0x16, 0x20),
            T::MulIF => (0x16, 0x25),
            T::MulFI => (0x16, 0x26),
            T::MulFF => (0x16, 0x21),
            T::MulVF => (0x16, 0x3B),
            T::MulFV => (0x16, 0x3C),
            T::DivII => (0x17, 0x20),
            T::DivIF => (0x17, 0x25),
            T::DivFI => (0x17, 0x26),
            T::DivFF => (0x17, 0x21),
            T::DivVF => (0x17, 0x3B),
            T::DivFV => (0x17, 0x3C),
            T::ModII => (0x18, 0x20),
            T::NegI => (0x19, 0x03),
            T::NegF => (0x19, 0x04),
            T::CompI => (0x1A, 0x03),
            T::MovSp => (0x1B, 0x00),
            T::StoreStateAll => (0x1C, 0x08),
            T::Jmp => (0x1D, 0x00),
            T::Jsr => (0x1E, 0x00),
            T::Jz => (0x1F, 0x00),
            T::Retn => (0x20, 0x00),
            T::Destruct => (0x21, 0x01),
            T::NotI => (0x22, 0x03),
            T::DecISp => (0x23, 0x03),
            T::IncISp => (0x24, 0x03),
            T::Jnz => (0x25, 0x00),
            T::CpDownBp => (0x26, 0x01),
            T::CpTopBp => (0x27, 0x01),
            T::DecIBp => (0x28, 0x03),
            T::IncIBp => (0x29, 0x03),
            T::SaveBp => (0x2A, 0x00),
            T::RestoreBp => (0x2B, 0x00),
            T::StoreState => (0x2C, 0x10),
            T::Nop => (0x2D, 0x00),
            T::Nop2 => (0x00, 0x00),
        }
    }

    /// The opcode byte.
    #[must_use]
    pub const fn byte_code(self) -> u8 {
        self.encoding().0
    }

    /// The type qualifier byte.
    #[must_use]
    pub const fn qualifier(self) -> u8 {
        self.encoding().1
    }

    /// Looks up the instruction encoded by an `(opcode, qualifier)` pair.
    #[must_use]
    pub fn from_encoding(byte_code: u8, qualifier: u8) -> Option<Self> {
        Self::iter().find(|ty| ty.encoding() == (byte_code, qualifier))
    }

    /// Control-flow and addressing classification of this instruction.
    #[must_use]
    pub fn flags(self) -> InstructionFlags {
        use InstructionType as T;
        match self {
            T::Jmp => InstructionFlags::BRANCH | InstructionFlags::TERMINATOR,
            T::Jz | T::Jnz => InstructionFlags::BRANCH,
            T::Retn => InstructionFlags::TERMINATOR,
            T::StoreState => InstructionFlags::DEFERRED_TARGET,
            T::CpDownBp | T::CpTopBp | T::DecIBp | T::IncIBp => InstructionFlags::BASE_RELATIVE,
            _ => InstructionFlags::empty(),
        }
    }

    /// Returns `true` if the instruction refers to a label that must exist before
    /// decompilation: any jump, and the implicit resume point of `STORE_STATE`.
    #[must_use]
    pub fn has_label_target(self) -> bool {
        self.flags()
            .intersects(InstructionFlags::BRANCH | InstructionFlags::DEFERRED_TARGET)
    }

    /// Total encoded length in bytes of an instruction of this type carrying `operand`.
    ///
    /// Only `CONSTS` depends on the operand, through the length of its string.
    #[must_use]
    pub fn encoded_size(self, operand: &Operand) -> u32 {
        use InstructionType as T;
        match self {
            T::CpDownSp | T::CpTopSp | T::CpDownBp | T::CpTopBp | T::Destruct => 8,
            T::ConstI
            | T::ConstF
            | T::ConstO
            | T::MovSp
            | T::Jmp
            | T::Jsr
            | T::Jz
            | T::Jnz
            | T::DecISp
            | T::IncISp
            | T::DecIBp
            | T::IncIBp => 6,
            T::ConstS => {
                let len = match operand {
                    Operand::String(value) => u32::try_from(value.len()).unwrap_or(u32::MAX),
                    _ => 0,
                };
                len.saturating_add(4)
            }
            T::Action => 5,
            T::StoreState => 10,
            T::EqualTT | T::NEqualTT => 4,
            _ => 2,
        }
    }
}

/// Immediate operands of an instruction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    /// No operand.
    #[default]
    None,
    /// `CONSTI` value.
    Int(i32),
    /// `CONSTF` value.
    Float(f32),
    /// `CONSTS` value.
    String(String),
    /// `CONSTO` object id.
    Object(u32),
    /// Frame copy (`CPDOWN*`/`CPTOP*`): a byte offset and a byte count.
    StackCopy {
        /// Signed byte offset relative to the stack or base pointer
        stack_offset: i32,
        /// Number of bytes copied
        size: u16,
    },
    /// `MOVSP`, `INC*`, `DEC*` byte offset.
    StackOffset(i32),
    /// Relative jump delta from the instruction's own offset.
    Jump(i32),
    /// Engine routine call.
    Action {
        /// Index into the routine table
        routine: u16,
        /// Number of arguments passed
        arg_count: u8,
    },
    /// `DESTRUCT` span description.
    Destruct {
        /// Number of bytes removed from the top of the stack
        size: u16,
        /// Byte offset of the preserved span within the removed bytes
        stack_offset: i32,
        /// Number of bytes preserved
        size_no_destroy: u16,
    },
    /// `STORE_STATE` snapshot sizes.
    StoreState {
        /// Bytes of globals captured
        size: u32,
        /// Bytes of locals captured
        size_locals: u32,
    },
    /// `EQUALTT`/`NEQUALTT` byte count per side.
    Size(u16),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int(value) => write!(f, "{value}"),
            Operand::Float(value) => write!(f, "{value}"),
            Operand::String(value) => write!(f, "\"{value}\""),
            Operand::Object(id) => write!(f, "{id}"),
            Operand::StackCopy { stack_offset, size } => write!(f, "{stack_offset}, {size}"),
            Operand::StackOffset(offset) | Operand::Jump(offset) => write!(f, "{offset}"),
            Operand::Action { routine, arg_count } => write!(f, "{routine}, {arg_count}"),
            Operand::Destruct {
                size,
                stack_offset,
                size_no_destroy,
            } => write!(f, "{size}, {stack_offset}, {size_no_destroy}"),
            Operand::StoreState { size, size_locals } => write!(f, "{size}, {size_locals}"),
            Operand::Size(size) => write!(f, "{size}"),
        }
    }
}

/// A decoded instruction at a fixed byte offset.
///
/// Instructions are immutable once constructed. `next_offset` is derived from the encoded size
/// so a program can be walked linearly without re-encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Instruction kind
    pub ins_type: InstructionType,
    /// Byte offset within the program
    pub offset: u32,
    /// Byte offset of the following instruction
    pub next_offset: u32,
    /// Immediate operands
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction and computes its successor offset.
    ///
    /// # Arguments
    ///
    /// * `ins_type` - The instruction kind
    /// * `offset` - Byte offset of the instruction
    /// * `operand` - Decoded operands
    #[must_use]
    pub fn new(ins_type: InstructionType, offset: u32, operand: Operand) -> Self {
        let next_offset = offset.saturating_add(ins_type.encoded_size(&operand));
        Self {
            ins_type,
            offset,
            next_offset,
            operand,
        }
    }

    /// `CONSTI` value.
    #[must_use]
    pub fn int_value(&self) -> Option<i32> {
        match self.operand {
            Operand::Int(value) => Some(value),
            _ => None,
        }
    }

    /// `CONSTF` value.
    #[must_use]
    pub fn float_value(&self) -> Option<f32> {
        match self.operand {
            Operand::Float(value) => Some(value),
            _ => None,
        }
    }

    /// `CONSTS` value.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        match &self.operand {
            Operand::String(value) => Some(value),
            _ => None,
        }
    }

    /// `CONSTO` object id.
    #[must_use]
    pub fn object_id(&self) -> Option<u32> {
        match self.operand {
            Operand::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Signed stack byte offset of frame copies, `MOVSP`, `INC*`/`DEC*` and `DESTRUCT`.
    #[must_use]
    pub fn stack_offset(&self) -> Option<i32> {
        match self.operand {
            Operand::StackCopy { stack_offset, .. }
            | Operand::Destruct { stack_offset, .. }
            | Operand::StackOffset(stack_offset) => Some(stack_offset),
            _ => None,
        }
    }

    /// Byte count of frame copies, `DESTRUCT` and tuple comparisons.
    #[must_use]
    pub fn size(&self) -> Option<u16> {
        match self.operand {
            Operand::StackCopy { size, .. } | Operand::Destruct { size, .. } | Operand::Size(size) => {
                Some(size)
            }
            _ => None,
        }
    }

    /// Preserved byte count of `DESTRUCT`.
    #[must_use]
    pub fn size_no_destroy(&self) -> Option<u16> {
        match self.operand {
            Operand::Destruct {
                size_no_destroy, ..
            } => Some(size_no_destroy),
            _ => None,
        }
    }

    /// Relative jump delta.
    #[must_use]
    pub fn jump_offset(&self) -> Option<i32> {
        match self.operand {
            Operand::Jump(delta) => Some(delta),
            _ => None,
        }
    }

    /// Routine index of `ACTION`.
    #[must_use]
    pub fn routine(&self) -> Option<u16> {
        match self.operand {
            Operand::Action { routine, .. } => Some(routine),
            _ => None,
        }
    }

    /// Argument count of `ACTION`.
    #[must_use]
    pub fn arg_count(&self) -> Option<u8> {
        match self.operand {
            Operand::Action { arg_count, .. } => Some(arg_count),
            _ => None,
        }
    }

    /// Absolute target offset of a jump, or the resume offset of `STORE_STATE`.
    ///
    /// `STORE_STATE` always resumes 16 bytes past its own offset, skipping itself and the
    /// `JMP` over the deferred block. Returns `None` for instructions without a target or when
    /// the target falls outside the 32-bit address space.
    #[must_use]
    pub fn jump_target(&self) -> Option<u32> {
        if self.ins_type == InstructionType::StoreState {
            return self.offset.checked_add(0x10);
        }
        let delta = self.jump_offset()?;
        u32::try_from(i64::from(self.offset) + i64::from(delta)).ok()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x} {}", self.offset, self.ins_type)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, str::FromStr};

    use strum::EnumCount;

    use super::*;

    #[test]
    fn mnemonics_round_trip() {
        for ty in InstructionType::iter() {
            let mnemonic = ty.to_string();
            assert_eq!(InstructionType::from_str(&mnemonic).ok(), Some(ty), "{mnemonic}");
        }
        assert_eq!(InstructionType::CpDownSp.to_string(), "CPDOWNSP");
        assert_eq!(InstructionType::StoreState.to_string(), "STORE_STATE");
        assert_eq!(InstructionType::StoreStateAll.to_string(), "STORE_STATEALL");
        assert_eq!(InstructionType::EqualEffEff.to_string(), "EQUALEFFEFF");
        assert!(InstructionType::from_str("LDARG").is_err());
    }

    #[test]
    fn encodings_are_unique() {
        let encodings: HashSet<_> = InstructionType::iter().map(InstructionType::encoding).collect();
        assert_eq!(encodings.len(), InstructionType::COUNT);
        assert_eq!(
            InstructionType::from_encoding(0x14, 0x3A),
            Some(InstructionType::AddVV)
        );
        assert_eq!(InstructionType::from_encoding(0xFF, 0xFF), None);
    }

    #[test]
    fn encoded_sizes() {
        assert_eq!(
            InstructionType::CpDownSp.encoded_size(&Operand::StackCopy {
                stack_offset: -8,
                size: 4
            }),
            8
        );
        assert_eq!(InstructionType::ConstI.encoded_size(&Operand::Int(1)), 6);
        assert_eq!(
            InstructionType::ConstS.encoded_size(&Operand::String("hello".to_string())),
            9
        );
        assert_eq!(
            InstructionType::Action.encoded_size(&Operand::Action {
                routine: 0,
                arg_count: 0
            }),
            5
        );
        assert_eq!(InstructionType::StoreState.encoded_size(&Operand::None), 10);
        assert_eq!(InstructionType::EqualTT.encoded_size(&Operand::Size(12)), 4);
        assert_eq!(InstructionType::Retn.encoded_size(&Operand::None), 2);
    }

    #[test]
    fn jump_targets() {
        let jmp = Instruction::new(InstructionType::Jmp, 0x20, Operand::Jump(-6));
        assert_eq!(jmp.next_offset, 0x26);
        assert_eq!(jmp.jump_target(), Some(0x1a));

        let state = Instruction::new(
            InstructionType::StoreState,
            0x30,
            Operand::StoreState {
                size: 0,
                size_locals: 0,
            },
        );
        assert_eq!(state.jump_target(), Some(0x40));

        let underflow = Instruction::new(InstructionType::Jz, 4, Operand::Jump(-8));
        assert_eq!(underflow.jump_target(), None);

        let retn = Instruction::new(InstructionType::Retn, 0x40, Operand::None);
        assert_eq!(retn.jump_target(), None);
    }

    #[test]
    fn flags_classify_control_flow() {
        assert!(InstructionType::Jz.has_label_target());
        assert!(InstructionType::StoreState.has_label_target());
        assert!(!InstructionType::Jsr.has_label_target());
        assert!(InstructionType::Jmp
            .flags()
            .contains(InstructionFlags::TERMINATOR));
        assert!(InstructionType::CpTopBp
            .flags()
            .contains(InstructionFlags::BASE_RELATIVE));
    }

    #[test]
    fn only_jmp_and_retn_terminate() {
        let terminators: Vec<_> = InstructionType::iter()
            .filter(|ty| ty.flags().contains(InstructionFlags::TERMINATOR))
            .collect();
        assert_eq!(terminators, vec![InstructionType::Jmp, InstructionType::Retn]);
    }

    #[test]
    fn operand_accessors() {
        let copy = Instruction::new(
            InstructionType::CpTopSp,
            13,
            Operand::StackCopy {
                stack_offset: -12,
                size: 12,
            },
        );
        assert_eq!(copy.stack_offset(), Some(-12));
        assert_eq!(copy.size(), Some(12));
        assert_eq!(copy.int_value(), None);
        assert_eq!(copy.to_string(), "0000000d CPTOPSP -12, 12");
    }
}
