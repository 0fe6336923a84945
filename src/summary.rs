use std::fmt;

/// which version-control system produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Hg,
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcsKind::Git => f.write_str("git"),
            VcsKind::Hg => f.write_str("hg"),
        }
    }
}

/// change kind of a single file, normalised from the backend's native code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Added,
    Modified,
    Deleted,
    Removed,
    Renamed,
    Untracked,
    /// a native code with no named state (conflicts, missing files, ...)
    Other(String),
}

/// one file that differs from the checked-out revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatusRecord {
    pub path: String,
    pub state: FileState,
}

/// counter a file state is tallied under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Modified,
    Added,
    Deleted,
    Untracked,
}

/// branch and revision of the working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub branch: String,
    pub revision: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub untracked: usize,
}

impl Counters {
    /// count each record into the bucket `classify` picks for it; `None` drops the record
    pub fn tally<F>(records: &[FileStatusRecord], classify: F) -> Self
    where
        F: Fn(&FileState) -> Option<Bucket>,
    {
        let mut counters = Self::default();
        for record in records {
            match classify(&record.state) {
                Some(Bucket::Modified) => counters.modified += 1,
                Some(Bucket::Added) => counters.added += 1,
                Some(Bucket::Deleted) => counters.deleted += 1,
                Some(Bucket::Untracked) => counters.untracked += 1,
                None => {}
            }
        }
        counters
    }

    #[cfg(test)]
    pub fn total(&self) -> usize {
        self.modified + self.added + self.deleted + self.untracked
    }
}

/// the one-line repository status shown in the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub kind: VcsKind,
    pub root: String,
    pub branch: String,
    pub revision: String,
    pub counters: Counters,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Counters {
            modified,
            added,
            deleted,
            untracked,
        } = self.counters;
        write!(
            f,
            "{} {} {} {} {modified}m {added}a {deleted}d {untracked}u",
            self.kind, self.root, self.branch, self.revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: FileState) -> FileStatusRecord {
        FileStatusRecord {
            path: String::from("file.txt"),
            state,
        }
    }

    fn summary(counters: Counters) -> StatusSummary {
        StatusSummary {
            kind: VcsKind::Git,
            root: String::from("demo"),
            branch: String::from("main"),
            revision: String::from("abc1234"),
            counters,
        }
    }

    #[test]
    fn renders_prompt_line() {
        let counters = Counters {
            modified: 2,
            added: 1,
            deleted: 0,
            untracked: 3,
        };
        assert_eq!(
            summary(counters).to_string(),
            "git demo main abc1234 2m 1a 0d 3u"
        );
    }

    #[test]
    fn renders_mercurial_kind() {
        let mut s = summary(Counters::default());
        s.kind = VcsKind::Hg;
        s.branch = String::from("default");
        assert_eq!(s.to_string(), "hg demo default abc1234 0m 0a 0d 0u");
    }

    #[test]
    fn empty_status_list_counts_nothing() {
        let counters = Counters::tally(&[], |_| Some(Bucket::Untracked));
        assert_eq!(counters, Counters::default());
        assert_eq!(summary(counters).to_string(), "git demo main abc1234 0m 0a 0d 0u");
    }

    #[test]
    fn dropped_records_are_not_counted() {
        let records = vec![
            record(FileState::Modified),
            record(FileState::Renamed),
            record(FileState::Added),
            record(FileState::Other(String::from("CONFLICTED"))),
        ];
        let counters = Counters::tally(&records, |state| match state {
            FileState::Modified => Some(Bucket::Modified),
            FileState::Added => Some(Bucket::Added),
            _ => None,
        });
        assert_eq!(counters.modified, 1);
        assert_eq!(counters.added, 1);
        assert_eq!(counters.total(), 2);
        assert!(counters.total() <= records.len());
    }

    #[test]
    fn every_classified_record_lands_in_exactly_one_bucket() {
        let records = vec![
            record(FileState::Modified),
            record(FileState::Added),
            record(FileState::Deleted),
            record(FileState::Untracked),
            record(FileState::Untracked),
        ];
        let counters = Counters::tally(&records, |state| match state {
            FileState::Modified => Some(Bucket::Modified),
            FileState::Added => Some(Bucket::Added),
            FileState::Deleted => Some(Bucket::Deleted),
            _ => Some(Bucket::Untracked),
        });
        assert_eq!(
            counters,
            Counters {
                modified: 1,
                added: 1,
                deleted: 1,
                untracked: 2,
            }
        );
        assert_eq!(counters.total(), records.len());
    }
}
