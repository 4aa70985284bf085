use std::path::Path;

use anyhow::bail;
use ncsdecomp::{
    decompiler::{ExprId, ExpressionKind, ExpressionTree, Function, FunctionArgument, Locality},
    script::{RoutineTable, Routines},
};
use serde::Serialize;

use crate::{
    app::{DecompileOptions, GlobalOptions},
    commands::common::{
        argument_label, decompiler_config, function_label, load_program, load_routines,
    },
    output::{hex_offset, print_output},
};

#[derive(Debug, Serialize)]
struct FunctionDump {
    name: String,
    offset: String,
    signature: String,
    nodes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DumpOutput {
    functions: Vec<FunctionDump>,
}

pub fn run(
    path: &Path,
    function: Option<&str>,
    options: &DecompileOptions,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let routines = load_routines(options.routines.as_deref())?;
    let program = load_program(path, &routines)?;
    let tree =
        ExpressionTree::from_program_with_config(&program, &routines, &decompiler_config(options))?;

    let selected: Vec<&Function> = match function {
        Some(filter) => {
            let offset = parse_offset(filter);
            let found: Vec<_> = tree
                .functions()
                .filter(|f| f.name() == filter || Some(f.offset()) == offset)
                .collect();
            if found.is_empty() {
                bail!("no function named or located at '{filter}'");
            }
            found
        }
        None => tree.functions().collect(),
    };

    let printer = NodePrinter {
        tree: &tree,
        routines: &routines,
    };
    let output = DumpOutput {
        functions: selected
            .into_iter()
            .map(|function| {
                let mut nodes = Vec::new();
                for &statement in tree.statements(function) {
                    printer.node(statement, 0, &mut nodes);
                }
                FunctionDump {
                    name: function_label(function),
                    offset: hex_offset(function.offset()),
                    signature: signature(function),
                    nodes,
                }
            })
            .collect(),
    };

    print_output(&output, opts, |output| {
        for (i, function) in output.functions.iter().enumerate() {
            if i > 0 {
                println!();
            }
            println!(
                "{} @ {}: {}",
                function.name, function.offset, function.signature
            );
            for line in &function.nodes {
                println!("  {line}");
            }
        }
    })
}

/// Accepts `0x1b` style hex or a decimal offset.
fn parse_offset(text: &str) -> Option<u32> {
    match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn signature(function: &Function) -> String {
    let list = |args: &[FunctionArgument]| {
        args.iter()
            .map(argument_label)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "({}) -> ({}) returns {}",
        list(function.inputs()),
        list(function.outputs()),
        function.return_type()
    )
}

/// Writes one line per node, children indented below their parent.
struct NodePrinter<'a> {
    tree: &'a ExpressionTree,
    routines: &'a RoutineTable,
}

impl NodePrinter<'_> {
    fn node(&self, id: ExprId, depth: usize, out: &mut Vec<String>) {
        let pad = "  ".repeat(depth);
        let Some(expr) = self.tree.expression(id) else {
            out.push(format!("{pad}{id} <missing>"));
            return;
        };

        let (detail, children): (String, Vec<ExprId>) = match &expr.kind {
            ExpressionKind::Label => (format!("loc_{}", hex_offset(expr.offset)), Vec::new()),
            ExpressionKind::Goto { label } => (self.label_name(*label), Vec::new()),
            ExpressionKind::Return { value } => (String::new(), value.iter().copied().collect()),
            ExpressionKind::Parameter(param) => {
                let mut detail = format!("{} {}", param.variable_type, param.locality);
                if matches!(param.locality, Locality::Input | Locality::Output) {
                    detail.push_str(&format!("@{}", param.stack_offset));
                }
                if !param.suffix.is_empty() {
                    detail.push_str(&format!(" .{}", param.suffix));
                }
                (detail, Vec::new())
            }
            ExpressionKind::Constant(value) => (value.to_string(), Vec::new()),
            ExpressionKind::Unary { op, operand } => (op.to_string(), vec![*operand]),
            ExpressionKind::Binary {
                op,
                left,
                right,
                declare_left,
            } => {
                let detail = if *declare_left {
                    format!("{op} declare")
                } else {
                    op.to_string()
                };
                (detail, vec![*left, *right])
            }
            ExpressionKind::Vector { components } => (String::new(), components.to_vec()),
            ExpressionKind::VectorIndex { vector, index } => (format!("[{index}]"), vec![*vector]),
            ExpressionKind::Action { routine, arguments } => {
                let name = self
                    .routines
                    .get(*routine)
                    .map_or_else(|| format!("#{routine}"), |decl| decl.name.clone());
                (name, arguments.clone())
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => {
                let name = self
                    .tree
                    .function(*function)
                    .map_or_else(|| function.to_string(), function_label);
                (name, arguments.clone())
            }
            ExpressionKind::Block(block) => {
                (format!("{} statements", block.len()), block.expressions.clone())
            }
            ExpressionKind::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let mut children = vec![*test, *if_true];
                children.extend(*if_false);
                (String::new(), children)
            }
        };

        let kind = expr.kind_name();
        out.push(if detail.is_empty() {
            format!("{pad}{id} {kind}")
        } else {
            format!("{pad}{id} {kind} {detail}")
        });
        for child in children {
            self.node(child, depth + 1, out);
        }
    }

    fn label_name(&self, label: ExprId) -> String {
        self.tree
            .expression(label)
            .map_or_else(|| label.to_string(), |e| format!("loc_{}", hex_offset(e.offset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_in_hex_or_decimal() {
        assert_eq!(parse_offset("0x1b"), Some(27));
        assert_eq!(parse_offset("27"), Some(27));
        assert_eq!(parse_offset("main"), None);
    }
}
