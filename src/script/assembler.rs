//! Fluent construction of [`ScriptProgram`]s.
//!
//! [`ProgramAssembler`] lays instructions out at their encoded offsets and resolves named labels
//! into relative jump deltas when the program is finished. It is the quickest way to build
//! bytecode for tests and benchmarks without going through a pcode listing.
//!
//! ```rust
//! use ncsdecomp::script::{InstructionType, ProgramAssembler, VariableType};
//!
//! let mut asm = ProgramAssembler::new();
//! asm.rsadd(VariableType::Int)
//!     .consti(1)
//!     .jz("skip")
//!     .consti(2)
//!     .cpdownsp(-8, 4)
//!     .movsp(-4)
//!     .label("skip")
//!     .retn();
//! let program = asm.finish("example")?;
//! assert_eq!(program.instructions().len(), 7);
//! # Ok::<(), ncsdecomp::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    script::{Instruction, InstructionType, Operand, ScriptProgram, VariableType, PROGRAM_START},
    Error, Result,
};

/// Builder that emits instructions at consecutive offsets.
#[derive(Debug, Clone)]
pub struct ProgramAssembler {
    offset: u32,
    instructions: Vec<(Instruction, Option<String>)>,
    labels: HashMap<String, u32>,
    duplicate: Option<String>,
}

impl Default for ProgramAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramAssembler {
    /// Creates an assembler that places the first instruction at [`PROGRAM_START`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_origin(PROGRAM_START)
    }

    /// Creates an assembler that places the first instruction at `origin`.
    #[must_use]
    pub fn with_origin(origin: u32) -> Self {
        Self {
            offset: origin,
            instructions: Vec::new(),
            labels: HashMap::new(),
            duplicate: None,
        }
    }

    /// Offset at which the next instruction will be placed.
    #[must_use]
    pub fn current_offset(&self) -> u32 {
        self.offset
    }

    /// Names the offset of the next instruction.
    ///
    /// Redefining a label is reported by [`ProgramAssembler::finish`].
    pub fn label(&mut self, name: &str) -> &mut Self {
        if self.labels.insert(name.to_string(), self.offset).is_some() && self.duplicate.is_none()
        {
            self.duplicate = Some(name.to_string());
        }
        self
    }

    /// Emits an arbitrary instruction.
    pub fn raw(&mut self, ins_type: InstructionType, operand: Operand) -> &mut Self {
        self.emit(ins_type, operand, None)
    }

    fn emit(&mut self, ins_type: InstructionType, operand: Operand, label: Option<&str>) -> &mut Self {
        let instruction = Instruction::new(ins_type, self.offset, operand);
        self.offset = instruction.next_offset;
        self.instructions
            .push((instruction, label.map(str::to_string)));
        self
    }

    /// `RSADDx` reserving one frame of `variable_type`.
    ///
    /// Types without a dedicated `RSADD` form (vectors, actions, void) emit `RSADDI`.
    pub fn rsadd(&mut self, variable_type: VariableType) -> &mut Self {
        let ins_type = match variable_type {
            VariableType::Float => InstructionType::RsAddF,
            VariableType::String => InstructionType::RsAddS,
            VariableType::Object => InstructionType::RsAddO,
            VariableType::Effect => InstructionType::RsAddEff,
            VariableType::Event => InstructionType::RsAddEvt,
            VariableType::Location => InstructionType::RsAddLoc,
            VariableType::Talent => InstructionType::RsAddTal,
            _ => InstructionType::RsAddI,
        };
        self.emit(ins_type, Operand::None, None)
    }

    /// `CONSTI value`.
    pub fn consti(&mut self, value: i32) -> &mut Self {
        self.emit(InstructionType::ConstI, Operand::Int(value), None)
    }

    /// `CONSTF value`.
    pub fn constf(&mut self, value: f32) -> &mut Self {
        self.emit(InstructionType::ConstF, Operand::Float(value), None)
    }

    /// `CONSTS "value"`.
    pub fn consts(&mut self, value: &str) -> &mut Self {
        self.emit(InstructionType::ConstS, Operand::String(value.to_string()), None)
    }

    /// `CONSTO id`.
    pub fn consto(&mut self, id: u32) -> &mut Self {
        self.emit(InstructionType::ConstO, Operand::Object(id), None)
    }

    /// `ACTION routine, arg_count`.
    pub fn action(&mut self, routine: u16, arg_count: u8) -> &mut Self {
        self.emit(
            InstructionType::Action,
            Operand::Action { routine, arg_count },
            None,
        )
    }

    fn stack_copy(&mut self, ins_type: InstructionType, stack_offset: i32, size: u16) -> &mut Self {
        self.emit(ins_type, Operand::StackCopy { stack_offset, size }, None)
    }

    /// `CPDOWNSP stack_offset, size`.
    pub fn cpdownsp(&mut self, stack_offset: i32, size: u16) -> &mut Self {
        self.stack_copy(InstructionType::CpDownSp, stack_offset, size)
    }

    /// `CPTOPSP stack_offset, size`.
    pub fn cptopsp(&mut self, stack_offset: i32, size: u16) -> &mut Self {
        self.stack_copy(InstructionType::CpTopSp, stack_offset, size)
    }

    /// `CPDOWNBP stack_offset, size`.
    pub fn cpdownbp(&mut self, stack_offset: i32, size: u16) -> &mut Self {
        self.stack_copy(InstructionType::CpDownBp, stack_offset, size)
    }

    /// `CPTOPBP stack_offset, size`.
    pub fn cptopbp(&mut self, stack_offset: i32, size: u16) -> &mut Self {
        self.stack_copy(InstructionType::CpTopBp, stack_offset, size)
    }

    /// `MOVSP stack_offset`.
    pub fn movsp(&mut self, stack_offset: i32) -> &mut Self {
        self.emit(InstructionType::MovSp, Operand::StackOffset(stack_offset), None)
    }

    /// `JMP label`.
    pub fn jmp(&mut self, label: &str) -> &mut Self {
        self.emit(InstructionType::Jmp, Operand::Jump(0), Some(label))
    }

    /// `JSR label`.
    pub fn jsr(&mut self, label: &str) -> &mut Self {
        self.emit(InstructionType::Jsr, Operand::Jump(0), Some(label))
    }

    /// `JZ label`.
    pub fn jz(&mut self, label: &str) -> &mut Self {
        self.emit(InstructionType::Jz, Operand::Jump(0), Some(label))
    }

    /// `JNZ label`.
    pub fn jnz(&mut self, label: &str) -> &mut Self {
        self.emit(InstructionType::Jnz, Operand::Jump(0), Some(label))
    }

    /// `RETN`.
    pub fn retn(&mut self) -> &mut Self {
        self.emit(InstructionType::Retn, Operand::None, None)
    }

    /// Any operand-less binary instruction (`ADDII`, `EQUALSS`, `MULVF`, ...).
    pub fn binary(&mut self, ins_type: InstructionType) -> &mut Self {
        self.emit(ins_type, Operand::None, None)
    }

    /// Any unary instruction (`NEGI`, `NEGF`, `COMPI`, `NOTI`).
    pub fn unary(&mut self, ins_type: InstructionType) -> &mut Self {
        self.emit(ins_type, Operand::None, None)
    }

    /// `EQUALTT size`.
    pub fn equal_tt(&mut self, size: u16) -> &mut Self {
        self.emit(InstructionType::EqualTT, Operand::Size(size), None)
    }

    /// `NEQUALTT size`.
    pub fn nequal_tt(&mut self, size: u16) -> &mut Self {
        self.emit(InstructionType::NEqualTT, Operand::Size(size), None)
    }

    /// `DESTRUCT size, stack_offset, size_no_destroy`.
    pub fn destruct(&mut self, size: u16, stack_offset: i32, size_no_destroy: u16) -> &mut Self {
        self.emit(
            InstructionType::Destruct,
            Operand::Destruct {
                size,
                stack_offset,
                size_no_destroy,
            },
            None,
        )
    }

    /// `INCISP stack_offset`.
    pub fn incisp(&mut self, stack_offset: i32) -> &mut Self {
        self.emit(InstructionType::IncISp, Operand::StackOffset(stack_offset), None)
    }

    /// `DECISP stack_offset`.
    pub fn decisp(&mut self, stack_offset: i32) -> &mut Self {
        self.emit(InstructionType::DecISp, Operand::StackOffset(stack_offset), None)
    }

    /// `INCIBP stack_offset`.
    pub fn incibp(&mut self, stack_offset: i32) -> &mut Self {
        self.emit(InstructionType::IncIBp, Operand::StackOffset(stack_offset), None)
    }

    /// `DECIBP stack_offset`.
    pub fn decibp(&mut self, stack_offset: i32) -> &mut Self {
        self.emit(InstructionType::DecIBp, Operand::StackOffset(stack_offset), None)
    }

    /// `SAVEBP`.
    pub fn savebp(&mut self) -> &mut Self {
        self.emit(InstructionType::SaveBp, Operand::None, None)
    }

    /// `RESTOREBP`.
    pub fn restorebp(&mut self) -> &mut Self {
        self.emit(InstructionType::RestoreBp, Operand::None, None)
    }

    /// `STORE_STATE size, size_locals`.
    pub fn store_state(&mut self, size: u32, size_locals: u32) -> &mut Self {
        self.emit(
            InstructionType::StoreState,
            Operand::StoreState { size, size_locals },
            None,
        )
    }

    /// `NOP`.
    pub fn nop(&mut self) -> &mut Self {
        self.emit(InstructionType::Nop, Operand::None, None)
    }

    /// Resolves labels and produces the program.
    ///
    /// The assembler is left untouched, so the same listing can be finished more than once.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateLabel`] - A label was defined more than once
    /// - [`Error::UndefinedLabel`] - A jump references a label that was never defined
    /// - [`Error::InvalidArgument`] - A jump delta does not fit in 32 bits
    pub fn finish(&self, name: &str) -> Result<ScriptProgram> {
        if let Some(label) = &self.duplicate {
            return Err(Error::DuplicateLabel(label.clone()));
        }

        let mut program = ScriptProgram::new(name);
        for (instruction, label) in &self.instructions {
            let mut instruction = instruction.clone();
            if let Some(label) = label {
                let target = self
                    .labels
                    .get(label)
                    .ok_or_else(|| Error::UndefinedLabel(label.clone()))?;
                let delta = i64::from(*target) - i64::from(instruction.offset);
                instruction.operand = Operand::Jump(i32::try_from(delta).map_err(|_| {
                    Error::InvalidArgument(format!("jump to '{label}' is out of range"))
                })?);
            }
            program.add(instruction);
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_and_forward_labels() -> Result<()> {
        let mut asm = ProgramAssembler::new();
        asm.label("top").consti(0).jz("out").jmp("top").label("out").retn();
        let program = asm.finish("loop")?;

        let targets: Vec<Option<u32>> = program
            .instructions()
            .iter()
            .map(Instruction::jump_target)
            .collect();
        // CONSTI @13, JZ @19, JMP @25, RETN @31
        assert_eq!(targets, vec![None, Some(31), Some(13), None]);
        assert_eq!(program.length(), 33);
        Ok(())
    }

    #[test]
    fn label_errors() {
        let mut asm = ProgramAssembler::new();
        asm.jmp("missing");
        assert!(matches!(asm.finish("x"), Err(Error::UndefinedLabel(l)) if l == "missing"));

        let mut asm = ProgramAssembler::new();
        asm.label("a").nop().label("a").retn();
        assert!(matches!(asm.finish("x"), Err(Error::DuplicateLabel(l)) if l == "a"));
    }

    #[test]
    fn rsadd_picks_typed_form() -> Result<()> {
        let mut asm = ProgramAssembler::with_origin(0);
        asm.rsadd(VariableType::Location).rsadd(VariableType::Vector);
        let program = asm.finish("x")?;
        let types: Vec<InstructionType> =
            program.instructions().iter().map(|i| i.ins_type).collect();
        assert_eq!(types, vec![InstructionType::RsAddLoc, InstructionType::RsAddI]);
        assert_eq!(program.instructions()[1].offset, 2);
        Ok(())
    }
}
