use std::collections::HashMap;

use crate::script::{Instruction, PROGRAM_START};

/// An ordered sequence of decoded instructions forming one compiled script.
///
/// Instructions are stored in insertion order and indexed by byte offset for the random access
/// the decompiler needs when following jumps.
#[derive(Debug, Clone, Default)]
pub struct ScriptProgram {
    name: String,
    instructions: Vec<Instruction>,
    index: HashMap<u32, usize>,
    length: u32,
}

impl ScriptProgram {
    /// Creates an empty program.
    ///
    /// # Arguments
    ///
    /// * `name` - Script name, usually the resource name without extension
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            index: HashMap::new(),
            length: PROGRAM_START,
        }
    }

    /// Appends an instruction.
    ///
    /// An instruction at an offset that is already present replaces the earlier one in the
    /// offset index.
    pub fn add(&mut self, instruction: Instruction) {
        self.length = self.length.max(instruction.next_offset);
        self.index
            .insert(instruction.offset, self.instructions.len());
        self.instructions.push(instruction);
    }

    /// Script name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All instructions in insertion order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Looks up the instruction starting at `offset`.
    #[must_use]
    pub fn get_instruction(&self, offset: u32) -> Option<&Instruction> {
        self.index
            .get(&offset)
            .and_then(|&idx| self.instructions.get(idx))
    }

    /// End offset of the program: the offset just past the last instruction, and never less
    /// than [`PROGRAM_START`].
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns `true` if the program holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{InstructionType, Operand};

    #[test]
    fn offsets_and_length() {
        let mut program = ScriptProgram::new("k_test");
        assert_eq!(program.length(), PROGRAM_START);
        assert!(program.is_empty());

        program.add(Instruction::new(InstructionType::ConstI, 13, Operand::Int(5)));
        program.add(Instruction::new(InstructionType::Retn, 19, Operand::None));

        assert_eq!(program.length(), 21);
        assert_eq!(
            program.get_instruction(19).map(|i| i.ins_type),
            Some(InstructionType::Retn)
        );
        assert!(program.get_instruction(14).is_none());
        assert_eq!(program.name(), "k_test");
    }
}
