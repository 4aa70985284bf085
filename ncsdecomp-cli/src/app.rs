use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// ncsdecomp - NWScript bytecode decompilation and inspection
#[derive(Debug, Parser)]
#[command(name = "ncsdecomp", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Decompiler settings shared by the commands that build an expression tree.
#[derive(Debug, Args)]
pub struct DecompileOptions {
    /// Routine catalogue in nwscript.nss prototype format, one routine per declaration.
    #[arg(short, long, value_name = "FILE")]
    pub routines: Option<PathBuf>,

    /// Offset of the entry function.
    #[arg(long, value_name = "OFFSET", default_value_t = 13)]
    pub entry_offset: u32,

    /// Maximum subroutine nesting followed before a body is left empty.
    #[arg(long, value_name = "DEPTH", default_value_t = 64)]
    pub max_call_depth: usize,

    /// Keep declarations and their initializing assignments as separate statements.
    #[arg(long)]
    pub no_hoist: bool,

    /// Do not name the globals initializer and main function.
    #[arg(long)]
    pub no_names: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decompile pcode listings and summarize the recovered functions.
    Decompile {
        /// Pcode listings, or directories searched recursively for *.pcode files.
        #[arg(value_name = "FILE", required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        options: DecompileOptions,
    },

    /// List the instructions of a pcode listing with their offsets.
    Instructions {
        /// Path to the pcode listing.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Routine catalogue used to resolve ACTION routine names.
        #[arg(short, long, value_name = "FILE")]
        routines: Option<PathBuf>,
    },

    /// Print the expression tree of a listing node by node.
    Dump {
        /// Path to the pcode listing.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Only dump the function with this name or offset (hex like 0x1b or decimal).
        #[arg(long, value_name = "NAME|OFFSET")]
        function: Option<String>,

        #[command(flatten)]
        options: DecompileOptions,
    },
}
