mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // dotboot info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotboot", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Identity { path } => commands::identity::run(path, &cli.global),
        Command::Refs { path } => commands::refs::run(path, &cli.global),
        Command::Rewrite {
            path,
            map,
            live,
            output,
            prefix,
            no_verify,
        } => commands::rewrite::run(
            path,
            &commands::rewrite::RewriteOptions {
                map,
                live,
                output,
                prefix,
                verify: !*no_verify,
                global: &cli.global,
            },
        ),
    }
}
