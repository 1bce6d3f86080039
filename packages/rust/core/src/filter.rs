//! Publication filter.

use repoindex_shared::RepositoryFile;
use repoindex_shared::servers::{AWS_VIRGINIA, COLLABORATORY};
use tracing::info;

/// Repositories whose files are withheld when they are the only copy holder.
const EXCLUSIVE_REPOS: [&str; 2] = [AWS_VIRGINIA, COLLABORATORY];

/// Decides which combined records are published.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    require_donor_ids: bool,
}

impl FileFilter {
    pub fn new(require_donor_ids: bool) -> Self {
        Self { require_donor_ids }
    }

    /// Whether `file` is published.
    pub fn retains(&self, file: &RepositoryFile) -> bool {
        let codes = file.repo_codes();
        let exclusive = codes.len() == 1 && EXCLUSIVE_REPOS.iter().any(|r| codes.contains(r));
        if exclusive {
            return false;
        }
        !(self.require_donor_ids && file.unresolved)
    }

    pub fn filter(&self, files: Vec<RepositoryFile>) -> Vec<RepositoryFile> {
        let total = files.len();
        let retained: Vec<_> = files.into_iter().filter(|f| self.retains(f)).collect();
        info!(
            filtered = total - retained.len(),
            retained = retained.len(),
            "filtered combined files"
        );
        retained
    }
}
