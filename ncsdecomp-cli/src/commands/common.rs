use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use ncsdecomp::{
    decompiler::{DecompilerConfig, Function, FunctionArgument},
    script::{PcodeReader, RoutineDecl, RoutineTable, ScriptProgram, VariableType},
};
use rayon::prelude::*;

use crate::{app::DecompileOptions, output::hex_offset};

/// Load the routine catalogue, or an empty table if none was given.
pub fn load_routines(path: Option<&Path>) -> anyhow::Result<RoutineTable> {
    let Some(path) = path else {
        return Ok(RoutineTable::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read routine catalogue: {}", path.display()))?;
    parse_routines(&text)
        .with_context(|| format!("failed to parse routine catalogue: {}", path.display()))
}

/// Parse `nwscript.nss` style prototypes. Routine indices follow declaration order; constants,
/// comments and preprocessor lines are skipped.
pub fn parse_routines(text: &str) -> anyhow::Result<RoutineTable> {
    let mut table = RoutineTable::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split("//").next().unwrap_or_default().trim();
        let Some((head, rest)) = line.split_once('(') else {
            continue;
        };
        let mut head_tokens = head.split_whitespace();
        let (Some(return_type), Some(name), None) =
            (head_tokens.next(), head_tokens.next(), head_tokens.next())
        else {
            continue;
        };
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        let Some(arguments) = rest.trim_end().strip_suffix(");") else {
            continue;
        };

        let line_no = index + 1;
        let return_type = variable_type(return_type, line_no)?;
        let argument_types = split_arguments(arguments)
            .into_iter()
            .map(|arg| {
                let ty = arg.split_whitespace().next().unwrap_or_default();
                variable_type(ty, line_no)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        table.add(RoutineDecl::new(name, return_type, argument_types));
    }
    Ok(table)
}

fn variable_type(keyword: &str, line: usize) -> anyhow::Result<VariableType> {
    match VariableType::from_str(keyword) {
        Ok(ty) => Ok(ty),
        Err(_) => bail!("line {line}: unsupported type '{keyword}'"),
    }
}

/// Split an argument list at commas outside of brackets, parentheses and string literals.
fn split_arguments(arguments: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in arguments.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' | '(' if !quoted => depth += 1,
            ']' | ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(arguments[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(arguments[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Load a pcode listing, resolving `ACTION` names through `routines`.
pub fn load_program(path: &Path, routines: &RoutineTable) -> anyhow::Result<ScriptProgram> {
    PcodeReader::from_file(path, routines)
        .with_context(|| format!("failed to load pcode listing: {}", path.display()))
}

/// Build the decompiler configuration from the command-line flags.
pub fn decompiler_config(options: &DecompileOptions) -> DecompilerConfig {
    DecompilerConfig::default()
        .with_entry_offset(options.entry_offset)
        .with_max_call_depth(options.max_call_depth)
        .with_hoist_declarations(!options.no_hoist)
        .with_infer_function_names(!options.no_names)
}

/// Expand directories into the `.pcode` files below them. Plain files are kept as given.
pub fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            collect_pcode_recursive(path, &mut found)?;
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn collect_pcode_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_pcode_recursive(&path, files)?;
        } else if is_pcode_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Returns true if the path has a `.pcode` extension.
pub fn is_pcode_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("pcode")
}

/// Run `process` on every file in parallel. Failures are logged and counted.
pub fn process_files<T, F>(files: &[PathBuf], process: F) -> (Vec<T>, usize)
where
    T: Send,
    F: Fn(&Path) -> anyhow::Result<T> + Sync,
{
    let results: Vec<_> = files
        .par_iter()
        .map(|path| (path, process(path)))
        .collect();

    let mut ok = Vec::with_capacity(results.len());
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => {
                log::error!("{}: {e:#}", file_display_name(path));
                failed += 1;
            }
        }
    }
    (ok, failed)
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

/// The function's name, or `sub_<offset>` when the decompiler left it unnamed.
pub fn function_label(function: &Function) -> String {
    if function.name().is_empty() {
        format!("sub_{}", hex_offset(function.offset()))
    } else {
        function.name().to_string()
    }
}

/// `int@-1` style rendering of a signature slot.
pub fn argument_label(argument: &FunctionArgument) -> String {
    format!("{}@{}", argument.variable_type, argument.stack_offset)
}
