//! Reader for textual pcode listings.
//!
//! Pcode is the human readable disassembly of an NCS program: one instruction per line,
//! followed by its comma separated operands, with jump targets named by labels.
//!
//! ```text
//! RSADDI
//! CONSTI 5
//! CPDOWNSP -8, 4
//! MOVSP -4
//! JZ loc_end
//! ACTION PrintString, 1
//! loc_end:
//! RETN
//! ```
//!
//! Addresses are not written in the listing. They are recomputed from the encoded size of each
//! instruction, starting at [`PROGRAM_START`], so a listing round-trips to the same offsets as
//! the compiled program it was produced from.

use std::{collections::HashMap, path::Path, str::FromStr};

use crate::{
    script::{Instruction, InstructionType, Operand, Routines, ScriptProgram, PROGRAM_START},
    Error, Result,
};

/// An instruction parsed in the first pass, before labels are resolved.
struct PendingInstruction {
    line: usize,
    ins_type: InstructionType,
    operand: Operand,
    label: Option<String>,
    offset: u32,
}

/// Parses pcode listings into [`ScriptProgram`]s.
pub struct PcodeReader;

impl PcodeReader {
    /// Reads a listing from disk.
    ///
    /// The program is named after the file with its `.pcode` and `.ncs` extensions dropped, so
    /// `k_ai_master.ncs.pcode` becomes `k_ai_master`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the file cannot be read, otherwise see [`PcodeReader::parse`].
    pub fn from_file(path: &Path, routines: &dyn Routines) -> Result<ScriptProgram> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&program_name(path), &text, routines)
    }

    /// Parses a listing.
    ///
    /// # Arguments
    ///
    /// * `name` - Name given to the resulting program
    /// * `text` - The listing
    /// * `routines` - Routine table used to resolve `ACTION` routine names
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMnemonic`] - A line starts with an unknown instruction
    /// - [`Error::Pcode`] - Operands are missing or malformed
    /// - [`Error::DuplicateLabel`] - A label is defined twice
    /// - [`Error::UndefinedLabel`] - A jump names a label that is never defined
    pub fn parse(name: &str, text: &str, routines: &dyn Routines) -> Result<ScriptProgram> {
        let mut labels: HashMap<String, u32> = HashMap::new();
        let mut pending = Vec::new();
        let mut offset = PROGRAM_START;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = idx + 1;

            if let Some(label) = parse_label(line) {
                if labels.insert(label.to_string(), offset).is_some() {
                    return Err(Error::DuplicateLabel(label.to_string()));
                }
                continue;
            }

            let (mnemonic, args) = match line.split_once(char::is_whitespace) {
                Some((mnemonic, args)) => (mnemonic, args.trim()),
                None => (line, ""),
            };
            let ins_type = InstructionType::from_str(mnemonic)
                .map_err(|_| Error::InvalidMnemonic(mnemonic.to_string()))?;
            let (operand, label) = parse_operand(ins_type, args, line_no, routines)?;

            let size = ins_type.encoded_size(&operand);
            pending.push(PendingInstruction {
                line: line_no,
                ins_type,
                operand,
                label,
                offset,
            });
            offset = offset.checked_add(size).ok_or_else(|| Error::Pcode {
                line: line_no,
                message: "program exceeds the 32-bit address space".to_string(),
            })?;
        }

        let mut program = ScriptProgram::new(name);
        for ins in pending {
            let operand = match &ins.label {
                Some(label) => {
                    let target = labels
                        .get(label)
                        .ok_or_else(|| Error::UndefinedLabel(label.clone()))?;
                    let delta = i64::from(*target) - i64::from(ins.offset);
                    Operand::Jump(i32::try_from(delta).map_err(|_| Error::Pcode {
                        line: ins.line,
                        message: format!("jump to '{label}' is out of range"),
                    })?)
                }
                None => ins.operand,
            };
            program.add(Instruction::new(ins.ins_type, ins.offset, operand));
        }

        Ok(program)
    }
}

/// Strips the `.pcode` and `.ncs` extensions from a listing's file name.
fn program_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map_or_else(String::new, |f| f.to_string_lossy().to_string());
    let name = file_name.strip_suffix(".pcode").unwrap_or(&file_name);
    let name = name.strip_suffix(".ncs").unwrap_or(name);
    name.to_string()
}

/// Returns the label name if `line` is a `name:` definition.
fn parse_label(line: &str) -> Option<&str> {
    let name = line.strip_suffix(':')?;
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(name)
    } else {
        None
    }
}

fn pcode_error(line: usize, message: impl Into<String>) -> Error {
    Error::Pcode {
        line,
        message: message.into(),
    }
}

/// Splits `args` on commas and checks the argument count.
fn split_args(args: &str, expected: usize, line: usize) -> Result<Vec<&str>> {
    let parts: Vec<&str> = if args.is_empty() {
        Vec::new()
    } else {
        args.split(',').map(str::trim).collect()
    };
    if parts.len() != expected {
        return Err(pcode_error(
            line,
            format!("expected {expected} argument(s), found {}", parts.len()),
        ));
    }
    Ok(parts)
}

fn number<T: FromStr>(arg: &str, line: usize) -> Result<T> {
    arg.parse()
        .map_err(|_| pcode_error(line, format!("invalid numeric argument '{arg}'")))
}

/// Parses the operands of one instruction. Jumps return their label in the second slot and a
/// placeholder operand that is replaced once every label is known.
fn parse_operand(
    ins_type: InstructionType,
    args: &str,
    line: usize,
    routines: &dyn Routines,
) -> Result<(Operand, Option<String>)> {
    use InstructionType as T;

    let operand = match ins_type {
        T::CpDownSp | T::CpTopSp | T::CpDownBp | T::CpTopBp => {
            let parts = split_args(args, 2, line)?;
            Operand::StackCopy {
                stack_offset: number(parts[0], line)?,
                size: number(parts[1], line)?,
            }
        }
        T::ConstI => Operand::Int(number(split_args(args, 1, line)?[0], line)?),
        T::ConstF => Operand::Float(number(split_args(args, 1, line)?[0], line)?),
        T::ConstS => {
            let value = args
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .ok_or_else(|| pcode_error(line, "expected a double-quoted string"))?;
            Operand::String(value.to_string())
        }
        T::ConstO => Operand::Object(number(split_args(args, 1, line)?[0], line)?),
        T::Action => {
            let parts = split_args(args, 2, line)?;
            let routine = match routines.index_by_name(parts[0]) {
                Some(index) => index,
                None => parts[0]
                    .parse()
                    .map_err(|_| pcode_error(line, format!("unknown routine '{}'", parts[0])))?,
            };
            Operand::Action {
                routine,
                arg_count: number(parts[1], line)?,
            }
        }
        T::MovSp | T::DecISp | T::IncISp | T::DecIBp | T::IncIBp => {
            Operand::StackOffset(number(split_args(args, 1, line)?[0], line)?)
        }
        T::Jmp | T::Jsr | T::Jz | T::Jnz => {
            let label = split_args(args, 1, line)?[0];
            if parse_label(&format!("{label}:")).is_none() {
                return Err(pcode_error(line, format!("invalid label '{label}'")));
            }
            return Ok((Operand::Jump(0), Some(label.to_string())));
        }
        T::Destruct => {
            let parts = split_args(args, 3, line)?;
            Operand::Destruct {
                size: number(parts[0], line)?,
                stack_offset: number(parts[1], line)?,
                size_no_destroy: number(parts[2], line)?,
            }
        }
        T::StoreState => {
            let parts = split_args(args, 2, line)?;
            Operand::StoreState {
                size: number(parts[0], line)?,
                size_locals: number(parts[1], line)?,
            }
        }
        T::EqualTT | T::NEqualTT => Operand::Size(number(split_args(args, 1, line)?[0], line)?),
        _ => {
            split_args(args, 0, line)?;
            Operand::None
        }
    };

    Ok((operand, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{RoutineDecl, RoutineTable, VariableType};

    fn routines() -> RoutineTable {
        RoutineTable::from_decls([
            RoutineDecl::new("Random", VariableType::Int, vec![VariableType::Int]),
            RoutineDecl::new("PrintString", VariableType::Void, vec![VariableType::String]),
        ])
    }

    #[test]
    fn addresses_follow_encoded_sizes() -> Result<()> {
        let text = "
            RSADDI
            CONSTS \"hi\"
            ACTION PrintString, 1
            RETN
        ";
        let program = PcodeReader::parse("test", text, &routines())?;
        let offsets: Vec<u32> = program.instructions().iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![13, 15, 21, 26]);
        assert_eq!(program.length(), 28);
        assert_eq!(
            program.get_instruction(21).and_then(Instruction::routine),
            Some(1)
        );
        Ok(())
    }

    #[test]
    fn labels_resolve_to_relative_deltas() -> Result<()> {
        let text = "
            start:
            JMP end
            NOP
            end:
            JMP start
        ";
        let program = PcodeReader::parse("test", text, &routines())?;
        let jumps: Vec<Option<u32>> = program
            .instructions()
            .iter()
            .filter(|i| i.ins_type == InstructionType::Jmp)
            .map(Instruction::jump_target)
            .collect();
        assert_eq!(jumps, vec![Some(21), Some(13)]);
        Ok(())
    }

    #[test]
    fn operand_grammar() -> Result<()> {
        let text = "
            CPDOWNSP -8, 4
            CONSTF -1.5
            CONSTO 2130706432
            DESTRUCT 12, -4, 4
            STORE_STATE 8, 0
            EQUALTT 12
            ACTION 0, 1
            DECIBP -4
        ";
        let program = PcodeReader::parse("test", text, &routines())?;
        let operands: Vec<&Operand> = program.instructions().iter().map(|i| &i.operand).collect();
        assert_eq!(
            operands,
            vec![
                &Operand::StackCopy {
                    stack_offset: -8,
                    size: 4
                },
                &Operand::Float(-1.5),
                &Operand::Object(2_130_706_432),
                &Operand::Destruct {
                    size: 12,
                    stack_offset: -4,
                    size_no_destroy: 4
                },
                &Operand::StoreState {
                    size: 8,
                    size_locals: 0
                },
                &Operand::Size(12),
                &Operand::Action {
                    routine: 0,
                    arg_count: 1
                },
                &Operand::StackOffset(-4),
            ]
        );
        Ok(())
    }

    #[test]
    fn malformed_input() {
        let table = routines();
        assert!(matches!(
            PcodeReader::parse("t", "FROB 1", &table),
            Err(Error::InvalidMnemonic(m)) if m == "FROB"
        ));
        assert!(matches!(
            PcodeReader::parse("t", "RETN\nCPDOWNSP -8", &table),
            Err(Error::Pcode { line: 2, .. })
        ));
        assert!(matches!(
            PcodeReader::parse("t", "JMP nowhere", &table),
            Err(Error::UndefinedLabel(l)) if l == "nowhere"
        ));
        assert!(matches!(
            PcodeReader::parse("t", "a:\nNOP\na:\nRETN", &table),
            Err(Error::DuplicateLabel(l)) if l == "a"
        ));
        assert!(matches!(
            PcodeReader::parse("t", "ACTION Missing, 0", &table),
            Err(Error::Pcode { line: 1, .. })
        ));
        assert!(matches!(
            PcodeReader::parse("t", "RETN 4", &table),
            Err(Error::Pcode { .. })
        ));
    }

    #[test]
    fn names_drop_listing_extensions() {
        assert_eq!(program_name(Path::new("dir/k_ai_master.ncs.pcode")), "k_ai_master");
        assert_eq!(program_name(Path::new("plain.pcode")), "plain");
        assert_eq!(program_name(Path::new("other.txt")), "other.txt");
    }
}
