//! Pcode listing integration tests.
//!
//! These tests read the listings under `tests/samples`, decompile them and verify the
//! resulting functions, as well as the error reporting of the reader.

use std::path::Path;

use ncsdecomp::{
    decompiler::{ExpressionKind, ExpressionTree, Function, FunctionArgument, Locality, UnaryOp},
    script::{InstructionType, PcodeReader, RoutineDecl, RoutineTable, VariableType},
    Error, Result,
};

fn routines() -> RoutineTable {
    RoutineTable::from_decls([
        RoutineDecl::new("PrintString", VariableType::Void, vec![VariableType::String]),
        RoutineDecl::new(
            "DelayCommand",
            VariableType::Void,
            vec![VariableType::Float, VariableType::Action],
        ),
        RoutineDecl::new("Random", VariableType::Int, vec![VariableType::Int]),
    ])
}

fn load(name: &str) -> Result<ExpressionTree> {
    let routines = routines();
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("samples")
        .join(name);
    let program = PcodeReader::from_file(&path, &routines)?;
    ExpressionTree::from_program(&program, &routines)
}

#[test]
fn test_starting_conditional() -> Result<()> {
    let tree = load("k_con_example.ncs.pcode")?;

    let names: Vec<&str> = tree.functions().map(Function::name).collect();
    assert_eq!(names, vec!["StartingConditional", "_start"]);

    let conditional = tree
        .functions()
        .next()
        .ok_or(Error::InvalidArgument("no functions".into()))?;
    assert!(conditional.inputs().is_empty());
    // both branches write the same caller slot
    assert_eq!(
        conditional.outputs(),
        &[FunctionArgument::new(VariableType::Int, -1)]
    );
    assert_eq!(tree.entry().return_type(), VariableType::Int);

    let returns = tree
        .statements(conditional)
        .iter()
        .filter(|&&id| matches!(tree.expression(id).map(|e| &e.kind), Some(ExpressionKind::Return { .. })))
        .count();
    assert_eq!(returns, 2);
    Ok(())
}

#[test]
fn test_globals_script() -> Result<()> {
    let tree = load("k_glob_example.ncs.pcode")?;

    let names: Vec<&str> = tree.functions().map(Function::name).collect();
    assert_eq!(names, vec!["main", "_globals", "_start"]);

    let globals: Vec<VariableType> = tree
        .globals()
        .iter()
        .filter_map(|&id| tree.parameter(id))
        .map(|p| p.variable_type)
        .collect();
    assert_eq!(globals, vec![VariableType::Int, VariableType::String]);

    let main = tree
        .functions()
        .next()
        .ok_or(Error::InvalidArgument("no functions".into()))?;
    assert!(main.inputs().is_empty());
    assert!(main.outputs().is_empty());

    // the increment addresses the first global directly
    let incremented = tree.statements(main).iter().find_map(|&id| {
        match tree.expression(id).map(|e| &e.kind) {
            Some(ExpressionKind::Unary {
                op: UnaryOp::Increment,
                operand,
            }) => tree.parameter(*operand),
            _ => None,
        }
    });
    assert_eq!(
        incremented.map(|p| (p.variable_type, p.locality)),
        Some((VariableType::Int, Locality::Global))
    );

    let histogram = tree.kind_histogram();
    assert_eq!(histogram.get("action"), Some(&3));
    Ok(())
}

#[test]
fn test_program_name_from_file() -> Result<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/samples/k_con_example.ncs.pcode");
    let program = PcodeReader::from_file(&path, &routines())?;
    assert_eq!(program.name(), "k_con_example");
    assert_eq!(
        program.instructions().first().map(|i| i.ins_type),
        Some(InstructionType::RsAddI)
    );
    Ok(())
}

#[test]
fn test_missing_file() {
    let result = PcodeReader::from_file(Path::new("tests/samples/missing.pcode"), &routines());
    assert!(matches!(result, Err(Error::FileError(_))));
}

#[test]
fn test_reader_errors() {
    let routines = routines();

    assert!(matches!(
        PcodeReader::parse("bad", "FROBNICATE\n", &routines),
        Err(Error::InvalidMnemonic(m)) if m == "FROBNICATE"
    ));
    assert!(matches!(
        PcodeReader::parse("bad", "JMP nowhere\n", &routines),
        Err(Error::UndefinedLabel(l)) if l == "nowhere"
    ));
    assert!(matches!(
        PcodeReader::parse("bad", "a:\nNOP\na:\nRETN\n", &routines),
        Err(Error::DuplicateLabel(l)) if l == "a"
    ));
    assert!(matches!(
        PcodeReader::parse("bad", "RETN\nCPDOWNSP -8\n", &routines),
        Err(Error::Pcode { line: 2, .. })
    ));
    assert!(matches!(
        PcodeReader::parse("bad", "ACTION NoSuchRoutine, 1\n", &routines),
        Err(Error::Pcode { line: 1, .. })
    ));
}
