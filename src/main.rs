mod cli;
mod constants;
mod output;
mod summary;
mod system;
mod ui;
mod vcs;

use crate::cli::{Cli, Format};
use crate::constants::{
    DEFAULT_HG_PROGRAM, HG_PROGRAM_ENV, SKIP_VCS_ENV, UTMP_ENV, VERBOSE_ENV,
};
use crate::output::Report;
use crate::system::SystemInfo;
use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

fn main() {
    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbose = cli.verbose || env::var_os(VERBOSE_ENV).is_some();
    let skip_vcs = cli.no_vcs || env::var_os(SKIP_VCS_ENV).is_some();

    // relative paths have no usable base name or ancestors, so resolve them first
    let directory = match cli.directory {
        Some(directory) => fs::canonicalize(&directory)
            .with_context(|| format!("failed to resolve directory {}", directory.display()))?,
        None => env::current_dir().context("failed to determine current directory")?,
    };

    // everything is gathered before anything is printed, so a failure leaves stdout empty
    let utmp = env::var_os(UTMP_ENV).map(PathBuf::from);
    let system = SystemInfo::gather(utmp.as_deref())?;

    let summary = if skip_vcs {
        None
    } else {
        let hg_program =
            env::var_os(HG_PROGRAM_ENV).unwrap_or_else(|| OsString::from(DEFAULT_HG_PROGRAM));
        vcs::detect(&directory, &vcs::default_backends(hg_program), verbose)
    };

    let report = Report::new(&system, summary.as_ref());
    let rendered = match cli.format {
        Format::Shell => report.to_shell(),
        Format::Json => report.to_json()?,
    };

    io::stdout()
        .write_all(rendered.as_bytes())
        .context("failed to write output")?;
    Ok(())
}
