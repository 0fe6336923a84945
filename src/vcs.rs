pub mod git;
pub mod hg;

use crate::summary::{Bucket, Counters, FileState, FileStatusRecord, Head, StatusSummary, VcsKind};
use crate::warning;
use anyhow::Result;
use std::ffi::OsString;
use std::path::Path;

/// an open, read-only session on one repository
pub trait RepositoryHandle {
    /// name shown in the prompt, from the first remote or the working directory
    fn root_name(&mut self, cwd: &Path) -> Result<String>;

    fn head(&mut self) -> Result<Head>;

    /// every file that is not clean relative to the checked-out revision
    fn file_statuses(&mut self) -> Result<Vec<FileStatusRecord>>;
}

/// a version-control system that can be detected and summarised
pub trait Backend {
    fn kind(&self) -> VcsKind;

    /// open the repository containing `cwd`; an error means "no repository here"
    fn locate(&self, cwd: &Path) -> Result<Box<dyn RepositoryHandle>>;

    /// this backend's table from file state to counter (`None` leaves the file uncounted)
    fn classify(&self, state: &FileState) -> Option<Bucket>;

    /// read everything the prompt needs, failing as a whole if any read fails
    fn summarize(&self, handle: &mut dyn RepositoryHandle, cwd: &Path) -> Result<StatusSummary> {
        let root = handle.root_name(cwd)?;
        let head = handle.head()?;
        let records = handle.file_statuses()?;
        let counters = Counters::tally(&records, |state| self.classify(state));
        Ok(StatusSummary {
            kind: self.kind(),
            root,
            branch: head.branch,
            revision: head.revision,
            counters,
        })
    }
}

/// backends in priority order: git, then mercurial
pub fn default_backends(hg_program: OsString) -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(git::GitBackend),
        Box::new(hg::HgBackend::new(hg_program)),
    ]
}

/// try each backend in turn and return the first complete summary
///
/// failures never escape: with `verbose` they are reported on stderr and the
/// next backend is tried
pub fn detect(cwd: &Path, backends: &[Box<dyn Backend>], verbose: bool) -> Option<StatusSummary> {
    for backend in backends {
        let kind = backend.kind();

        let mut handle = match backend.locate(cwd) {
            Ok(handle) => handle,
            Err(e) => {
                if verbose {
                    warning!("{}: {:#}", kind, e);
                }
                continue;
            }
        };

        match backend.summarize(handle.as_mut(), cwd) {
            Ok(summary) => return Some(summary),
            Err(e) => {
                if verbose {
                    warning!("{}: failed to read repository status: {:#}", kind, e);
                }
            }
        }
    }

    None
}

/// derive the prompt's repository name
///
/// uses the last path segment of `remote_url` minus `suffix`, falling back to
/// the base name of `cwd` when there is no remote or the segment is empty
pub fn root_name(remote_url: Option<&str>, suffix: &str, cwd: &Path) -> String {
    remote_url
        .and_then(|url| name_from_url(url, suffix))
        .unwrap_or_else(|| dir_name(cwd))
}

fn name_from_url(url: &str, suffix: &str) -> Option<String> {
    // scp-style urls (git@host:owner/repo.git) separate the path with ':'
    let last = url.trim().trim_end_matches('/').rsplit(['/', ':']).next()?;
    let name = if suffix.is_empty() {
        last
    } else {
        last.strip_suffix(suffix).unwrap_or(last)
    };
    (!name.is_empty()).then(|| name.to_string())
}

fn dir_name(cwd: &Path) -> String {
    cwd.file_name().map_or_else(
        || cwd.to_string_lossy().to_string(),
        |name| name.to_string_lossy().to_string(),
    )
}
