mod command_server;

use crate::constants::{HG_DEFAULT_PATH, HG_REVISION_LENGTH, HG_SUFFIX};
use crate::summary::{Bucket, FileState, FileStatusRecord, Head, VcsKind};
use crate::vcs::{Backend, RepositoryHandle, root_name};
use anyhow::{Context, Result, bail};
use command_server::CommandServer;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// mercurial support through a command server child process
pub struct HgBackend {
    program: OsString,
}

impl HgBackend {
    pub fn new(program: OsString) -> Self {
        Self { program }
    }
}

impl Backend for HgBackend {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    fn locate(&self, cwd: &Path) -> Result<Box<dyn RepositoryHandle>> {
        // look for .hg ourselves so no process is spawned outside a repository
        let root = find_root(cwd)
            .with_context(|| format!("not in a mercurial repository: {}", cwd.display()))?;
        let server = CommandServer::spawn(&self.program, &root)?;
        Ok(Box::new(HgRepository { server }))
    }

    fn classify(&self, state: &FileState) -> Option<Bucket> {
        match state {
            FileState::Modified => Some(Bucket::Modified),
            FileState::Added => Some(Bucket::Added),
            FileState::Removed => Some(Bucket::Deleted),
            // hg never reports 'D'; the code is matched but not counted
            FileState::Deleted => None,
            FileState::Untracked | FileState::Other(_) => Some(Bucket::Untracked),
            // never produced by `file_state`; listed only to keep the match exhaustive
            FileState::Renamed => None,
        }
    }
}

pub struct HgRepository {
    server: CommandServer,
}

impl RepositoryHandle for HgRepository {
    fn root_name(&mut self, cwd: &Path) -> Result<String> {
        let output = self.server.run_command(&["paths"])?;
        let url = remote_url(&output);
        Ok(root_name(url, HG_SUFFIX, cwd))
    }

    fn head(&mut self) -> Result<Head> {
        let output = self.server.run_command(&["identify", "-i", "-b"])?;
        parse_identify(&output)
    }

    fn file_statuses(&mut self) -> Result<Vec<FileStatusRecord>> {
        let output = self.server.run_command(&["status"])?;
        Ok(parse_status(&output))
    }
}

/// nearest ancestor of `cwd` (inclusive) holding a `.hg` directory
fn find_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| dir.join(".hg").is_dir())
        .map(Path::to_path_buf)
}

/// url of the `default` path, else of the first path listed by `hg paths`
fn remote_url(paths: &str) -> Option<&str> {
    let entries: Vec<(&str, &str)> = paths
        .lines()
        .filter_map(|line| line.split_once(" = "))
        .map(|(name, url)| (name.trim(), url.trim()))
        .collect();

    entries
        .iter()
        .find(|(name, _)| *name == HG_DEFAULT_PATH)
        .or_else(|| entries.first())
        .map(|(_, url)| *url)
}

/// parse `hg identify -i -b` output: `<node>[+] <branch>`
fn parse_identify(output: &str) -> Result<Head> {
    let line = output.trim_end_matches('\n');
    let Some((id, branch)) = line.split_once(' ') else {
        bail!("unexpected hg identify output: {line:?}");
    };
    if id.len() < HG_REVISION_LENGTH || branch.is_empty() {
        bail!("unexpected hg identify output: {line:?}");
    }

    Ok(Head {
        branch: branch.to_string(),
        revision: id.chars().take(HG_REVISION_LENGTH).collect(),
    })
}

/// parse `hg status` output, one `<code> <path>` line per file
fn parse_status(output: &str) -> Vec<FileStatusRecord> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut chars = line.chars();
            let code = chars.next().unwrap_or(' ');
            FileStatusRecord {
                path: chars.as_str().trim_start().to_string(),
                state: file_state(code),
            }
        })
        .collect()
}

fn file_state(code: char) -> FileState {
    match code {
        'M' => FileState::Modified,
        'A' => FileState::Added,
        'R' => FileState::Removed,
        'D' => FileState::Deleted,
        '?' => FileState::Untracked,
        other => FileState::Other(other.to_string()),
    }
}
