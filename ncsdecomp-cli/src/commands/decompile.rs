use std::{collections::BTreeMap, path::Path};

use ncsdecomp::{decompiler::ExpressionTree, script::RoutineTable};
use serde::Serialize;

use crate::{
    app::{DecompileOptions, GlobalOptions},
    commands::common::{
        argument_label, collect_inputs, decompiler_config, file_display_name, function_label,
        load_program, load_routines, process_files,
    },
    output::{hex_offset, join_or_dash, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct FunctionInfo {
    name: String,
    offset: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    return_type: String,
    statements: usize,
}

#[derive(Debug, Serialize)]
struct ScriptInfo {
    file: String,
    instructions: usize,
    code_size: u32,
    functions: Vec<FunctionInfo>,
    globals: Vec<String>,
    expressions: usize,
    kinds: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Serialize)]
struct BatchInfo {
    scripts: Vec<ScriptInfo>,
    total_files: usize,
    failed: usize,
    total_functions: usize,
}

pub fn run(
    paths: &[std::path::PathBuf],
    options: &DecompileOptions,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let routines = load_routines(options.routines.as_deref())?;
    let files = collect_inputs(paths)?;

    if let [single] = files.as_slice() {
        let info = decompile_file(single, &routines, options)?;
        return print_output(&info, opts, display_script);
    }

    let (scripts, failed) = process_files(&files, |path| decompile_file(path, &routines, options));
    let batch = BatchInfo {
        total_files: files.len(),
        failed,
        total_functions: scripts.iter().map(|s| s.functions.len()).sum(),
        scripts,
    };

    print_output(&batch, opts, |batch| {
        let mut table = TabWriter::new(vec![
            ("File", Align::Left),
            ("Instructions", Align::Right),
            ("Functions", Align::Right),
            ("Globals", Align::Right),
            ("Expressions", Align::Right),
        ]);
        for script in &batch.scripts {
            table.row(vec![
                script.file.clone(),
                script.instructions.to_string(),
                script.functions.len().to_string(),
                script.globals.len().to_string(),
                script.expressions.to_string(),
            ]);
        }
        table.print();
        println!();
        println!(
            "Decompiled {} of {} files, {} functions, {} failed",
            batch.scripts.len(),
            batch.total_files,
            batch.total_functions,
            batch.failed
        );
    })
}

fn decompile_file(
    path: &Path,
    routines: &RoutineTable,
    options: &DecompileOptions,
) -> anyhow::Result<ScriptInfo> {
    let program = load_program(path, routines)?;
    let tree = ExpressionTree::from_program_with_config(
        &program,
        routines,
        &decompiler_config(options),
    )?;

    let functions = tree
        .functions()
        .map(|function| FunctionInfo {
            name: function_label(function),
            offset: format!("0x{}", hex_offset(function.offset())),
            inputs: function.inputs().iter().map(argument_label).collect(),
            outputs: function.outputs().iter().map(argument_label).collect(),
            return_type: function.return_type().to_string(),
            statements: tree.statements(function).len(),
        })
        .collect();

    let globals = tree
        .globals()
        .iter()
        .filter_map(|&id| tree.parameter(id))
        .map(|param| param.variable_type.to_string())
        .collect();

    Ok(ScriptInfo {
        file: file_display_name(path),
        instructions: program.instructions().len(),
        code_size: program.length(),
        functions,
        globals,
        expressions: tree.expressions().len(),
        kinds: tree.kind_histogram(),
    })
}

fn display_script(info: &ScriptInfo) {
    println!(
        "{}: {} instructions, {} bytes, {} functions, {} globals",
        info.file,
        info.instructions,
        info.code_size,
        info.functions.len(),
        info.globals.len()
    );
    println!();

    let mut table = TabWriter::new(vec![
        ("Name", Align::Left),
        ("Offset", Align::Left),
        ("Inputs", Align::Left),
        ("Outputs", Align::Left),
        ("Returns", Align::Left),
        ("Statements", Align::Right),
    ])
    .indent("  ");
    for function in &info.functions {
        table.row(vec![
            function.name.clone(),
            function.offset.clone(),
            join_or_dash(&function.inputs),
            join_or_dash(&function.outputs),
            function.return_type.clone(),
            function.statements.to_string(),
        ]);
    }
    table.print();

    if !info.globals.is_empty() {
        println!();
        println!("  Globals: {}", info.globals.join(", "));
    }

    println!();
    let kinds: Vec<String> = info
        .kinds
        .iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .collect();
    println!("  {} expressions: {}", info.expressions, kinds.join(" "));
}
