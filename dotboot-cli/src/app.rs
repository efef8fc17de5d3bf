use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dotboot - inspect and retarget the dependency table of .NET addon assemblies
#[derive(Debug, Parser)]
#[command(name = "dotboot", version, about, long_about = None)]
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

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display the assembly identity: full name, version, culture, public key token.
    Identity {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// List the dependency table (AssemblyRef rows).
    Refs {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Retarget references to live identities and write the patched image.
    Rewrite {
        /// Path to the .NET assembly file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Map a stable name to a live display name, e.g.
        /// 'Combat=Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null'.
        #[arg(short, long, value_name = "STABLE=DISPLAY NAME")]
        map: Vec<String>,

        /// Take live identities from these assemblies; prefixed names map to their stable name.
        #[arg(long, value_name = "FILE")]
        live: Vec<PathBuf>,

        /// Where to write the patched image.
        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        /// Reserved first name segment of host-generated assemblies.
        #[arg(long, default_value = "Dynamic")]
        prefix: String,

        /// Skip re-parsing and checking the patched image.
        #[arg(long)]
        no_verify: bool,
    },
}
