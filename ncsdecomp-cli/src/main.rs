mod app;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;

use crate::app::{Cli, Command, GlobalOptions};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    if !cli.global.json {
        init_logging(&cli.global);
    }

    match &cli.command {
        Command::Decompile { paths, options } => {
            commands::decompile::run(paths, options, &cli.global)
        }
        Command::Instructions { path, routines } => {
            commands::instructions::run(path, routines.as_deref(), &cli.global)
        }
        Command::Dump {
            path,
            function,
            options,
        } => commands::dump::run(path, function.as_deref(), options, &cli.global),
    }
}

/// ncsdecomp messages go to stderr at info, or debug with `--verbose`. `RUST_LOG` overrides.
fn init_logging(opts: &GlobalOptions) {
    let level = if opts.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("ncsdecomp", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();
}
