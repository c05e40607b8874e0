//! Git adapter for autosave cycles.
//!
//! The cycle only needs five operations, kept behind [`VersionControl`] so
//! tests can script repository behaviour without a real remote.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::core::roster::AgentProfile;
use crate::io::process::{CommandOutput, CommandSpec, ProcessError, run_command};

/// Repository operations used by an autosave cycle.
pub trait VersionControl {
    /// True if the working directory is inside a git work tree.
    fn is_work_tree(&self) -> Result<bool, ProcessError>;
    /// Raw `git status --porcelain` output.
    fn status_porcelain(&self) -> Result<String, ProcessError>;
    /// Stage every change, including deletions and untracked files.
    fn add_all(&self) -> Result<(), ProcessError>;
    /// Commit staged changes with `author` as the identity for this commit only.
    fn commit_as(&self, author: &AgentProfile, message: &str) -> Result<(), ProcessError>;
    fn push(&self, remote: &str, branch: &str) -> Result<(), ProcessError>;
}

impl<T: VersionControl + ?Sized> VersionControl for Box<T> {
    fn is_work_tree(&self) -> Result<bool, ProcessError> {
        (**self).is_work_tree()
    }

    fn status_porcelain(&self) -> Result<String, ProcessError> {
        (**self).status_porcelain()
    }

    fn add_all(&self) -> Result<(), ProcessError> {
        (**self).add_all()
    }

    fn commit_as(&self, author: &AgentProfile, message: &str) -> Result<(), ProcessError> {
        (**self).commit_as(author, message)
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), ProcessError> {
        (**self).push(remote, branch)
    }
}

impl<T: VersionControl + ?Sized> VersionControl for Arc<T> {
    fn is_work_tree(&self) -> Result<bool, ProcessError> {
        (**self).is_work_tree()
    }

    fn status_porcelain(&self) -> Result<String, ProcessError> {
        (**self).status_porcelain()
    }

    fn add_all(&self) -> Result<(), ProcessError> {
        (**self).add_all()
    }

    fn commit_as(&self, author: &AgentProfile, message: &str) -> Result<(), ProcessError> {
        (**self).commit_as(author, message)
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), ProcessError> {
        (**self).push(remote, branch)
    }
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run<I, S>(&self, args: I) -> Result<CommandOutput, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        run_command(&CommandSpec::new("git", &self.workdir).args(args))
    }
}

impl VersionControl for Git {
    #[instrument(skip_all)]
    fn is_work_tree(&self) -> Result<bool, ProcessError> {
        match self.run(["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => Ok(out.stdout.trim() == "true"),
            // Outside a repository git exits non-zero ("not a git repository").
            Err(ProcessError::Failed { message, .. }) => {
                debug!(%message, "not a work tree");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn status_porcelain(&self) -> Result<String, ProcessError> {
        Ok(self.run(["status", "--porcelain"])?.stdout)
    }

    fn add_all(&self) -> Result<(), ProcessError> {
        self.run(["add", "-A"])?;
        Ok(())
    }

    #[instrument(skip_all, fields(author = %author.name))]
    fn commit_as(&self, author: &AgentProfile, message: &str) -> Result<(), ProcessError> {
        debug!("committing staged changes");
        self.run([
            "-c".to_string(),
            format!("user.name={}", author.name),
            "-c".to_string(),
            format!("user.email={}", author.email),
            "commit".to_string(),
            "-m".to_string(),
            message.to_string(),
        ])?;
        Ok(())
    }

    #[instrument(skip_all, fields(remote = %remote, branch = %branch))]
    fn push(&self, remote: &str, branch: &str) -> Result<(), ProcessError> {
        debug!("pushing");
        self.run(["push", remote, branch])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::roster::AgentId;
    use crate::test_support::TestRepo;

    #[test]
    fn plain_directory_is_not_a_work_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        assert!(!git.is_work_tree().expect("rev-parse"));
    }

    #[test]
    fn commit_uses_the_given_author() {
        let repo = TestRepo::new().expect("repo");
        std::fs::write(repo.path().join("a.txt"), "a\n").expect("write");
        let git = Git::new(repo.path());
        assert!(git.is_work_tree().expect("rev-parse"));
        assert!(git.status_porcelain().expect("status").contains("a.txt"));

        git.add_all().expect("add");
        let author = AgentProfile::default_for(AgentId::Builder);
        git.commit_as(&author, "subject line").expect("commit");

        assert_eq!(repo.last_commit_author(), "Builder <builder@users.noreply.github.com>");
        assert_eq!(repo.last_commit_subject(), "subject line");
        assert!(git.status_porcelain().expect("status").trim().is_empty());
    }

    #[test]
    fn push_reaches_the_remote_branch() {
        let repo = TestRepo::with_remote().expect("repo");
        std::fs::write(repo.path().join("a.txt"), "a\n").expect("write");
        let git = Git::new(repo.path());
        git.add_all().expect("add");
        git.commit_as(&AgentProfile::default_for(AgentId::Strategist), "first")
            .expect("commit");
        git.push("origin", "main").expect("push");
        assert_eq!(repo.remote_subject("main"), "first");
    }

    #[test]
    fn push_to_unknown_remote_fails_with_git_message() {
        let repo = TestRepo::new().expect("repo");
        std::fs::write(repo.path().join("a.txt"), "a\n").expect("write");
        let git = Git::new(repo.path());
        git.add_all().expect("add");
        git.commit_as(&AgentProfile::default_for(AgentId::Strategist), "first")
            .expect("commit");
        let err = git.push("nowhere", "main").unwrap_err();
        assert!(matches!(err, ProcessError::Failed { .. }));
        assert!(!err.to_string().is_empty());
    }
}
