//! Artifact sinks.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Mutex;

use async_trait::async_trait;
use relayscout_shared::{PublishConfig, RelayScoutError, Result};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// What a sink did with the files it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new commit was created and pushed.
    Committed,
    /// Files were identical to what is already tracked; nothing committed.
    NothingToCommit,
    /// The sink does not persist anything.
    Discarded,
}

impl std::fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Committed => "committed and pushed",
            Self::NothingToCommit => "nothing to commit",
            Self::Discarded => "not published",
        })
    }
}

/// Destination for the files a run generated.
///
/// Implemented by [`GitSink`] (commit + push) and [`NoopSink`] (tests,
/// dry runs).
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Publish the given files. Called at most once per run, after every
    /// file has been fully written.
    async fn publish(&self, files: &[PathBuf]) -> Result<PublishOutcome>;
}

// ---------------------------------------------------------------------------
// GitSink
// ---------------------------------------------------------------------------

/// Commits artifacts under a fixed bot identity and pushes a fixed branch.
#[derive(Debug, Clone)]
pub struct GitSink {
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    message: String,
    author_name: String,
    author_email: String,
}

impl From<&PublishConfig> for GitSink {
    fn from(config: &PublishConfig) -> Self {
        Self {
            repo_dir: config.repo_dir.clone(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            message: config.commit_message.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }
}

impl GitSink {
    /// Run git in the repository and fail on a non-zero exit.
    async fn git(&self, args: &[&str]) -> Result<Output> {
        let output = self.git_raw(args).await?;
        if !output.status.success() {
            return Err(RelayScoutError::publish(format!(
                "git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    async fn git_raw(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, repo = %self.repo_dir.display(), "running git");
        Command::new("git")
            .current_dir(&self.repo_dir)
            .args(args)
            .output()
            .await
            .map_err(|e| RelayScoutError::publish(format!("failed to run git: {e}")))
    }

    /// Whether the index holds staged changes.
    async fn has_staged_changes(&self) -> Result<bool> {
        let output = self.git_raw(&["diff", "--cached", "--quiet"]).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(RelayScoutError::publish(format!(
                "git diff exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

#[async_trait]
impl ArtifactSink for GitSink {
    fn name(&self) -> &str {
        "git"
    }

    #[instrument(skip_all, fields(remote = %self.remote, branch = %self.branch))]
    async fn publish(&self, files: &[PathBuf]) -> Result<PublishOutcome> {
        let paths = files
            .iter()
            .map(|f| absolute(f))
            .collect::<Result<Vec<_>>>()?;

        let mut add = vec!["add", "--"];
        for path in &paths {
            let path = path.to_str().ok_or_else(|| {
                RelayScoutError::publish(format!(
                    "artifact path is not valid UTF-8: {}",
                    path.display()
                ))
            })?;
            add.push(path);
        }
        self.git(&add).await?;

        let outcome = if self.has_staged_changes().await? {
            let name = format!("user.name={}", self.author_name);
            let email = format!("user.email={}", self.author_email);
            self.git(&[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "-m",
                self.message.as_str(),
            ])
            .await?;
            info!(files = files.len(), "artifacts committed");
            PublishOutcome::Committed
        } else {
            info!("artifacts unchanged, nothing to commit");
            PublishOutcome::NothingToCommit
        };

        self.git(&["push", self.remote.as_str(), self.branch.as_str()])
            .await?;
        info!("pushed");

        Ok(outcome)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| RelayScoutError::io(path, e))
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// Sink that keeps nothing; it remembers what it was handed.
#[derive(Debug, Default)]
pub struct NoopSink {
    calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl NoopSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// File lists passed to each `publish` call, in call order.
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn publish(&self, files: &[PathBuf]) -> Result<PublishOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(files.to_vec());
        }
        debug!(files = files.len(), "publishing skipped");
        Ok(PublishOutcome::Discarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn sh_git(dir: &Path, args: &[&str]) -> String {
        let out = std::process::Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .expect("run git");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn sink_for(repo: &Path) -> GitSink {
        GitSink {
            repo_dir: repo.to_path_buf(),
            ..GitSink::from(&PublishConfig::default())
        }
    }

    #[tokio::test]
    async fn noop_sink_records_calls() {
        let sink = NoopSink::new();
        let files = vec![PathBuf::from("source-ip.txt"), PathBuf::from("source-m3u.txt")];
        let outcome = sink.publish(&files).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Discarded);
        assert_eq!(sink.calls(), vec![files]);
    }

    #[tokio::test]
    async fn git_sink_commits_then_reports_nothing_to_commit() {
        if !git_available() {
            return;
        }

        let root = std::env::temp_dir().join(format!("rs-git-test-{}", uuid::Uuid::now_v7()));
        let remote = root.join("remote.git");
        let work = root.join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        sh_git(&remote, &["init", "--bare", "-q"]);
        sh_git(&work, &["init", "-q"]);
        sh_git(&work, &["checkout", "-q", "-b", "main"]);
        sh_git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);

        let file = work.join("source-ip.txt");
        std::fs::write(&file, "1.2.3.4:8888").unwrap();

        let sink = sink_for(&work);
        let outcome = sink.publish(&[file.clone()]).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Committed);

        let author = sh_git(&remote, &["log", "-1", "--format=%an <%ae>|%s", "main"]);
        assert_eq!(
            author,
            "github-actions[bot] <github-actions[bot]@users.noreply.github.com>|Update source IPs and M3U files"
        );

        // Same content again: success without a new commit.
        let outcome = sink.publish(&[file]).await.unwrap();
        assert_eq!(outcome, PublishOutcome::NothingToCommit);
        assert_eq!(sh_git(&remote, &["rev-list", "--count", "main"]), "1");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_artifact_path_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = std::env::temp_dir().join(format!("rs-utf8-test-{}", uuid::Uuid::now_v7()));
        let file = dir.join(OsStr::from_bytes(b"source-\xff.txt"));

        let err = sink_for(&dir).publish(&[file]).await.unwrap_err();
        assert!(matches!(err, RelayScoutError::Publish(_)), "{err}");
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[tokio::test]
    async fn git_sink_outside_a_repository_fails() {
        if !git_available() {
            return;
        }

        let dir = std::env::temp_dir().join(format!("rs-nogit-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("source-ip.txt");
        std::fs::write(&file, "1.2.3.4:8888").unwrap();

        let err = sink_for(&dir).publish(&[file]).await.unwrap_err();
        assert!(matches!(err, RelayScoutError::Publish(_)), "{err}");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
