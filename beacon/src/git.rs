//! Git metadata extraction

use tokio::process::Command;
use tracing::debug;

/// Branch and commit identity of the working tree
///
/// Fields degrade to `"unknown"` when git is unavailable so a missing
/// repository never blocks a deployment.
#[derive(Debug, Clone)]
pub struct GitInfo {
    /// Current branch name
    pub branch: String,

    /// Short commit hash
    pub commit: String,

    /// Full commit hash, when resolvable
    pub commit_full: Option<String>,
}

/// Summary of uncommitted changes in the working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncommittedChanges {
    /// Number of changed files reported by `git status`
    pub count: usize,

    /// Total added lines
    pub additions: u64,

    /// Total deleted lines
    pub deletions: u64,

    /// Per-file statistics
    pub files: Vec<FileChange>,
}

/// Line statistics for a single changed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

/// Collect branch and commit information
pub async fn collect() -> GitInfo {
    let commit = run_git(&["rev-parse", "--short", "HEAD"])
        .await
        .unwrap_or_else(|| "unknown".to_string());
    let branch = run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .unwrap_or_else(|| "unknown".to_string());
    let commit_full = run_git(&["rev-parse", "HEAD"]).await;

    GitInfo {
        branch,
        commit,
        commit_full,
    }
}

/// Collect uncommitted change statistics, or None when the tree is clean
pub async fn uncommitted_changes() -> Option<UncommittedChanges> {
    let status = run_git(&["status", "--porcelain"]).await?;
    if status.is_empty() {
        return None;
    }
    let count = status.lines().filter(|line| !line.is_empty()).count();
    if count == 0 {
        return None;
    }

    let (files, additions, deletions) = match run_git(&["diff", "--numstat", "HEAD"]).await {
        Some(numstat) => parse_numstat(&numstat),
        None => (Vec::new(), 0, 0),
    };

    Some(UncommittedChanges {
        count,
        additions,
        deletions,
        files,
    })
}

/// Parse `git diff --numstat` output into per-file statistics
///
/// Binary files report `-` for both columns and count as zero.
pub fn parse_numstat(output: &str) -> (Vec<FileChange>, u64, u64) {
    let mut files = Vec::new();
    let mut additions = 0;
    let mut deletions = 0;

    for line in output.lines() {
        let mut parts = line.split('\t');
        let (Some(add), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let add = add.parse::<u64>().unwrap_or(0);
        let del = del.parse::<u64>().unwrap_or(0);

        additions += add;
        deletions += del;
        files.push(FileChange {
            path: path.to_string(),
            additions: add,
            deletions: del,
        });
    }

    (files, additions, deletions)
}

async fn run_git(args: &[&str]) -> Option<String> {
    let output = match Command::new("git").args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            debug!("Failed to run git {}: {}", args.join(" "), e);
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
