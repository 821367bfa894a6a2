//! Command line arguments.
//!
//! spec.md §1 puts full argument-grammar design out of scope: this only
//! selects a config source and, eventually, an API-channel transport at
//! startup, the way the teacher's `delegation-feed/arg.rs` selects its
//! feed parameters.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Policy-neutral BGP-4 speaker daemon")]
pub struct Args {
    /// Path to a configuration source understood by an external loader.
    ///
    /// This core has no file-format parser of its own (spec.md §1,
    /// SPEC_FULL.md §1): a deployment wires its own loader to build a
    /// [`crate::config::Config`] and hands it to [`crate::reactor::run`].
    /// Accepted here so `--config` round-trips through `bgpd --help` the
    /// way a real deployment's wrapper expects, even though this binary
    /// does not read the file itself yet.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose logging (debug level instead of info).
    #[arg(short, long)]
    pub verbose: bool,
}
