//! Append-only commit graph (`.nt/commit-graph`).
//!
//! Each commit cites the packfiles promoted by one `nt commit`, keyed by the
//! path they replace. The graph diff powers replication: send the missing
//! commits plus bytes for their packfiles, delete the obsolete ones.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{clock, errors::NtError, oid::Oid, utils::atomic_write};

/// One packfile cited by a commit, with the entry it occupies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackFileRef {
    pub oid: Oid,
    pub relative_path: String,
}

/// A named group of packfile references with a creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub oid: Oid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub packfiles: Vec<PackFileRef>,
}

impl Commit {
    /// Build a commit over a set of packfile refs; the OID derives from the
    /// canonical encoding with the OID field nil.
    pub fn new(message: &str, packfiles: Vec<PackFileRef>) -> Result<Commit, NtError> {
        let now = clock::now();
        let mut commit = Commit {
            oid: Oid::nil(),
            message: message.to_string(),
            ctime: now,
            mtime: now,
            packfiles,
        };
        let canonical = serde_yaml::to_string(&commit)
            .map_err(|e| NtError::EncodeObjectError(Oid::zero_str(), e.to_string()))?;
        commit.oid = Oid::for_content(canonical.as_bytes());
        Ok(commit)
    }
}

/// Result of diffing two commit graphs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitGraphDiff {
    /// Commits present in `other` but not in `self`, order preserved.
    pub missing_commits: Vec<Commit>,
    /// Packfiles cited by missing commits and absent from `self`.
    pub missing_packfiles: Vec<Oid>,
    /// Local packfiles superseded by a different OID occupying the same
    /// entry in `other`.
    pub obsolete_packfiles: Vec<Oid>,
}

/// Ordered, append-only record of commits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitGraph {
    pub updated_at: DateTime<Utc>,
    pub commits: Vec<Commit>,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for CommitGraph {
    fn default() -> Self {
        CommitGraph {
            updated_at: DateTime::UNIX_EPOCH,
            commits: Vec::new(),
            path: PathBuf::new(),
        }
    }
}

impl CommitGraph {
    pub fn load(path: &Path) -> Result<CommitGraph, NtError> {
        if !path.exists() {
            let mut graph = CommitGraph::default();
            graph.path = path.to_path_buf();
            return Ok(graph);
        }
        let raw = std::fs::read_to_string(path)?;
        let mut graph: CommitGraph = serde_yaml::from_str(&raw)
            .map_err(|e| NtError::InvalidIndex(path.to_path_buf(), e.to_string()))?;
        graph.path = path.to_path_buf();
        Ok(graph)
    }

    pub fn save(&self) -> Result<(), NtError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| NtError::InvalidIndex(self.path.clone(), e.to_string()))?;
        atomic_write(&self.path, yaml.as_bytes())
    }

    /// Append a commit; its creation time must not precede the graph head.
    pub fn append_commit(&mut self, commit: Commit) -> Result<(), NtError> {
        if commit.ctime < self.updated_at {
            return Err(NtError::OutOfOrderCommit(commit.oid.to_string()));
        }
        info!(oid = %commit.oid, packfiles = commit.packfiles.len(), "appending commit");
        self.updated_at = commit.ctime;
        self.commits.push(commit);
        Ok(())
    }

    pub fn last_commit(&self) -> Option<&Commit> {
        self.commits.last()
    }

    /// Commits strictly after the given OID.
    pub fn last_commits_from(&self, oid: Oid) -> Result<Vec<&Commit>, NtError> {
        let pos = self
            .commits
            .iter()
            .position(|c| c.oid == oid)
            .ok_or_else(|| NtError::UnknownCommit(oid.to_string()))?;
        Ok(self.commits[pos + 1..].iter().collect())
    }

    /// What `self` must fetch or drop to mirror `other`.
    pub fn diff(&self, other: &CommitGraph) -> CommitGraphDiff {
        let mut diff = CommitGraphDiff::default();

        let known: Vec<Oid> = self.commits.iter().map(|c| c.oid).collect();
        for commit in &other.commits {
            if !known.contains(&commit.oid) {
                diff.missing_commits.push(commit.clone());
            }
        }

        let local_packfiles: Vec<Oid> = self
            .commits
            .iter()
            .flat_map(|c| c.packfiles.iter().map(|p| p.oid))
            .collect();
        for commit in &diff.missing_commits {
            for pack_ref in &commit.packfiles {
                if !local_packfiles.contains(&pack_ref.oid)
                    && !diff.missing_packfiles.contains(&pack_ref.oid)
                {
                    diff.missing_packfiles.push(pack_ref.oid);
                }
            }
        }

        // A local packfile is obsolete when the other graph's latest ref for
        // the same entry carries a different OID.
        for (path, ours) in self.latest_refs() {
            if let Some(theirs) = other.latest_refs().into_iter().find(|(p, _)| *p == path)
                && theirs.1 != ours
                && !diff.obsolete_packfiles.contains(&ours)
            {
                diff.obsolete_packfiles.push(ours);
            }
        }
        diff
    }

    /// Latest packfile ref per entry path, in first-seen order.
    fn latest_refs(&self) -> Vec<(String, Oid)> {
        let mut latest: Vec<(String, Oid)> = Vec::new();
        for commit in &self.commits {
            for pack_ref in &commit.packfiles {
                match latest.iter_mut().find(|(p, _)| *p == pack_ref.relative_path) {
                    Some(slot) => slot.1 = pack_ref.oid,
                    None => latest.push((pack_ref.relative_path.clone(), pack_ref.oid)),
                }
            }
        }
        latest
    }
}
