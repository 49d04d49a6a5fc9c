//! `git worktree`-backed provisioner: one worktree per task, checked out
//! onto its own branch under a configured base directory.

use std::path::PathBuf;

use async_trait::async_trait;
use task_core::error::{Result, TaskError};
use task_core::runtime::WorktreeManager;
use tokio::process::Command;

pub struct GitWorktreeManager {
    repo_root: PathBuf,
    base_dir: PathBuf,
}

impl GitWorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self { repo_root: repo_root.into(), base_dir: base_dir.into() }
    }

    fn branch_name(task_id: &str) -> String {
        format!("taskguild/{task_id}")
    }

    async fn run_git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(|e| TaskError::Internal(format!("failed to spawn git: {e}")))?;

        if !output.status.success() {
            return Err(TaskError::Internal(format!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WorktreeManager for GitWorktreeManager {
    async fn provision(&self, task_id: &str) -> Result<String> {
        let path = self.base_dir.join(task_id);
        let path_str = path.to_string_lossy().to_string();
        self.run_git(&["worktree", "add", "-b", &Self::branch_name(task_id), &path_str, "HEAD"]).await?;
        Ok(path_str)
    }

    async fn release(&self, task_id: &str, worktree_path: &str) -> Result<()> {
        self.run_git(&["worktree", "remove", worktree_path, "--force"]).await?;
        // Best-effort: the branch may already be gone if the worktree was
        // removed out of band. Don't fail the release over it.
        let _ = self.run_git(&["branch", "-D", &Self::branch_name(task_id)]).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_is_namespaced() {
        assert_eq!(GitWorktreeManager::branch_name("T1"), "taskguild/T1");
    }
}
