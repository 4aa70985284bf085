use std::path::Path;

use ncsdecomp::script::{Instruction, Operand, RoutineTable, Routines};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_program, load_routines},
    output::{hex_offset, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct InstructionEntry {
    offset: String,
    mnemonic: String,
    operand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct InstructionsOutput {
    file: String,
    code_size: u32,
    instructions: Vec<InstructionEntry>,
}

pub fn run(path: &Path, routines: Option<&Path>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let routines = load_routines(routines)?;
    let program = load_program(path, &routines)?;

    let output = InstructionsOutput {
        file: file_display_name(path),
        code_size: program.length(),
        instructions: program
            .instructions()
            .iter()
            .map(|ins| InstructionEntry {
                offset: hex_offset(ins.offset),
                mnemonic: ins.ins_type.to_string(),
                operand: ins.operand.to_string(),
                note: note(ins, &routines),
            })
            .collect(),
    };

    print_output(&output, opts, |output| {
        println!(
            "{}: {} instructions, {} bytes",
            output.file,
            output.instructions.len(),
            output.code_size
        );
        println!();

        let mut table = TabWriter::new(vec![
            ("Offset", Align::Left),
            ("Mnemonic", Align::Left),
            ("Operand", Align::Left),
            ("", Align::Left),
        ])
        .indent("  ");
        for entry in &output.instructions {
            table.row(vec![
                entry.offset.clone(),
                entry.mnemonic.clone(),
                entry.operand.clone(),
                entry.note.as_ref().map_or_else(String::new, |n| format!("; {n}")),
            ]);
        }
        table.print();
    })
}

/// Jump destinations and routine names.
fn note(ins: &Instruction, routines: &RoutineTable) -> Option<String> {
    if let Some(target) = ins.jump_target() {
        return Some(format!("-> loc_{}", hex_offset(target)));
    }
    match ins.operand {
        Operand::Action { routine, .. } => routines.get(routine).map(|decl| decl.name.clone()),
        _ => None,
    }
}
