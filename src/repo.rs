//! Version-control primitives the coordinator drives
//!
//! None of these may run concurrently with each other; callers serialize
//! through the coordinator's repository lock.

use crate::error::RepoError;
use crate::types::RepositoryState;
use async_trait::async_trait;

#[async_trait]
pub trait Repository: Send + Sync {
	/// Stage every working-tree change (symlinks as links) and commit.
	///
	/// Returns `Ok(false)` when there was nothing to commit.
	async fn stage_and_commit(&mut self, message: &str) -> Result<bool, RepoError>;

	/// Push the local branch. Fails with `Rejected` on non-fast-forward.
	async fn push(&mut self) -> Result<(), RepoError>;

	/// Fetch and merge the remote branch into the working tree.
	///
	/// On `MergeConflict` the merge has already been aborted.
	async fn fetch_and_merge(&mut self) -> Result<(), RepoError>;

	/// Whether the working tree differs from the last commit
	async fn is_dirty(&mut self) -> Result<bool, RepoError>;

	/// Current heads and dirtiness
	async fn state(&mut self) -> Result<RepositoryState, RepoError>;
}

// vim: ts=4
