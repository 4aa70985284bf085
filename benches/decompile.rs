//! Benchmarks for decompilation.
//!
//! Tests decompilation performance for synthetic programs of growing size:
//! - Straight-line arithmetic in the entry function
//! - Chains of conditional jumps draining many branches
//! - Many small subroutines reached from the entry function
//! - Parsing a pcode listing of the same program

extern crate ncsdecomp;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ncsdecomp::{
    decompiler::{DecompilerConfig, ExpressionTree},
    script::{InstructionType, PcodeReader, ProgramAssembler, RoutineTable, ScriptProgram},
};
use std::hint::black_box;

/// `n` additions folded into one accumulator.
fn arithmetic(n: usize) -> ScriptProgram {
    let mut asm = ProgramAssembler::new();
    asm.consti(0);
    for i in 0..n {
        asm.consti(i32::try_from(i).unwrap_or(i32::MAX))
            .binary(InstructionType::AddII);
    }
    asm.retn();
    asm.finish("arithmetic").unwrap()
}

/// `n` consecutive `if` statements, each skipping one assignment.
fn branches(n: usize) -> ScriptProgram {
    let mut asm = ProgramAssembler::new();
    asm.rsadd(ncsdecomp::script::VariableType::Int);
    for i in 0..n {
        let label = format!("skip_{i}");
        asm.consti(1)
            .jz(&label)
            .consti(2)
            .cpdownsp(-8, 4)
            .movsp(-4)
            .label(&label);
    }
    asm.retn();
    asm.finish("branches").unwrap()
}

/// `n` subroutines each reading and writing one caller frame.
fn subroutines(n: usize) -> ScriptProgram {
    let mut asm = ProgramAssembler::new();
    asm.rsadd(ncsdecomp::script::VariableType::Int);
    for i in 0..n {
        asm.jsr(&format!("sub_{i}"));
    }
    asm.movsp(-4).retn();
    for i in 0..n {
        asm.label(&format!("sub_{i}"))
            .cptopsp(-4, 4)
            .consti(1)
            .binary(InstructionType::AddII)
            .cpdownsp(-8, 4)
            .movsp(-4)
            .retn();
    }
    asm.finish("subroutines").unwrap()
}

fn bench_decompile(c: &mut Criterion) {
    let routines = RoutineTable::new();
    let config = DecompilerConfig::default();

    let mut group = c.benchmark_group("decompile");
    for size in [16, 256, 2048] {
        let programs = [
            ("arithmetic", arithmetic(size)),
            ("branches", branches(size)),
            ("subroutines", subroutines(size)),
        ];
        for (name, program) in &programs {
            group.bench_with_input(BenchmarkId::new(*name, size), program, |b, program| {
                b.iter(|| {
                    let tree = ExpressionTree::from_program_with_config(
                        black_box(program),
                        &routines,
                        &config,
                    )
                    .unwrap();
                    black_box(tree)
                });
            });
        }
    }
    group.finish();
}

fn bench_pcode(c: &mut Criterion) {
    let routines = RoutineTable::new();
    let mut listing = String::from("RSADDI\n");
    for i in 0..1024 {
        listing.push_str(&format!(
            "CONSTI {i}\nJZ skip_{i}\nCONSTI 2\nCPDOWNSP -8, 4\nMOVSP -4\nskip_{i}:\n"
        ));
    }
    listing.push_str("RETN\n");

    c.bench_function("pcode_parse_1024_branches", |b| {
        b.iter(|| {
            let program = PcodeReader::parse("bench", black_box(&listing), &routines).unwrap();
            black_box(program)
        });
    });
}

criterion_group!(benches, bench_decompile, bench_pcode);
criterion_main!(benches);
