use crate::constants::{GIT_SUFFIX, NULL_REVISION};
use crate::summary::{Bucket, FileState, FileStatusRecord, Head, VcsKind};
use crate::vcs::{Backend, RepositoryHandle, root_name};
use anyhow::{Context, Result};
use git2::{ErrorCode, Repository, Status, StatusOptions};
use std::path::Path;

/// git support through libgit2; the repository is opened in-process
pub struct GitBackend;

impl Backend for GitBackend {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    fn locate(&self, cwd: &Path) -> Result<Box<dyn RepositoryHandle>> {
        // can be anywhere within the repo
        let repo = Repository::discover(cwd)
            .with_context(|| format!("not in a git repository: {}", cwd.display()))?;
        Ok(Box::new(GitRepository { repo }))
    }

    fn classify(&self, state: &FileState) -> Option<Bucket> {
        match state {
            FileState::Added => Some(Bucket::Added),
            FileState::Modified => Some(Bucket::Modified),
            FileState::Deleted => Some(Bucket::Deleted),
            FileState::Untracked => Some(Bucket::Untracked),
            // renames, conflicts and anything unrecognised are left uncounted
            FileState::Renamed | FileState::Other(_) => None,
            // never produced by `file_state`; listed only to keep the match exhaustive
            FileState::Removed => None,
        }
    }
}

pub struct GitRepository {
    repo: Repository,
}

impl RepositoryHandle for GitRepository {
    fn root_name(&mut self, cwd: &Path) -> Result<String> {
        let remotes = self
            .repo
            .remotes()
            .context("failed to list git remotes")?;
        let url = remotes.iter().flatten().find_map(|name| {
            self.repo
                .find_remote(name)
                .ok()
                .and_then(|remote| remote.url().map(str::to_string))
        });
        Ok(root_name(url.as_deref(), GIT_SUFFIX, cwd))
    }

    fn head(&mut self) -> Result<Head> {
        match self.repo.head() {
            Ok(head) => {
                // detached HEAD reports its shorthand as "HEAD"
                let branch = head
                    .shorthand()
                    .context("branch name is not valid utf-8")?
                    .to_string();
                let commit = head
                    .peel_to_commit()
                    .context("failed to resolve HEAD to a commit")?;
                let short_id = commit
                    .as_object()
                    .short_id()
                    .context("failed to abbreviate commit id")?;
                let revision = short_id
                    .as_str()
                    .context("commit id is not valid utf-8")?
                    .to_string();
                Ok(Head { branch, revision })
            }
            // no commits yet: the branch exists only as HEAD's symbolic target
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self
                    .repo
                    .find_reference("HEAD")
                    .context("failed to read HEAD")?;
                let target = head
                    .symbolic_target()
                    .context("HEAD is not a symbolic reference")?;
                Ok(Head {
                    branch: branch_name(target).to_string(),
                    revision: NULL_REVISION.to_string(),
                })
            }
            Err(e) => Err(e).context("failed to read HEAD"),
        }
    }

    fn file_statuses(&mut self) -> Result<Vec<FileStatusRecord>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.recurse_untracked_dirs(false);
        opts.include_ignored(false);
        opts.renames_head_to_index(true);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("failed to enumerate git status")?;

        Ok(statuses
            .iter()
            .map(|entry| FileStatusRecord {
                path: String::from_utf8_lossy(entry.path_bytes()).to_string(),
                state: file_state(entry.status()),
            })
            .collect())
    }
}

/// strip the `refs/heads/` namespace from a full reference name
fn branch_name(reference: &str) -> &str {
    reference.strip_prefix("refs/heads/").unwrap_or(reference)
}

/// map libgit2 status flags to a single state; an entry can carry both an
/// index and a worktree flag, so the checks run in a fixed order
fn file_state(status: Status) -> FileState {
    if status.contains(Status::WT_NEW) {
        FileState::Untracked
    } else if status.contains(Status::INDEX_NEW) {
        FileState::Added
    } else if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
        FileState::Renamed
    } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
        FileState::Deleted
    } else if status.intersects(
        Status::INDEX_MODIFIED
            | Status::WT_MODIFIED
            | Status::INDEX_TYPECHANGE
            | Status::WT_TYPECHANGE,
    ) {
        FileState::Modified
    } else {
        FileState::Other(format!("{status:?}"))
    }
}
