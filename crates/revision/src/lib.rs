//! Run identifiers derived from the current source revision.
//!
//! A run is named, in priority order, by:
//! 1. an explicit override (the `COMMIT_ID` set by CI),
//! 2. the commit HEAD points to in the enclosing git repository,
//! 3. the current local time, formatted `%Y%m%d_%H%M%S`.
//!
//! Resolution never fails. Errors from the git lookup are available through
//! [`head_revision`] but the resolver logs them and falls through to the
//! timestamp.

use std::fmt;
use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository, RepositoryOpenFlags};
use tracing::{debug, warn};

/// Format of the timestamp fallback. Sortable, second granularity.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Errors from reading the HEAD revision.
#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error("no git repository found from {0}")]
    NotARepository(PathBuf),
    #[error("repository HEAD has no commits yet")]
    UnbornHead,
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

/// Where a [`RunIdentifier`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource {
    Override,
    Revision,
    Timestamp,
}

impl fmt::Display for IdentifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Override => "override",
            Self::Revision => "git",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Non-empty token naming a run. Remote artifact keys are namespaced by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentifier {
    value: String,
    source: IdentifierSource,
}

impl RunIdentifier {
    /// Wraps `value` verbatim, returning `None` if it is empty.
    #[must_use]
    pub fn new(value: impl Into<String>, source: IdentifierSource) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            return None;
        }
        Some(Self { value, source })
    }

    /// Identifier built from the current local time.
    #[must_use]
    pub fn from_timestamp() -> Self {
        Self {
            value: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            source: IdentifierSource::Timestamp,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub const fn source(&self) -> IdentifierSource {
        self.source
    }
}

impl fmt::Display for RunIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Reads the full hash of the commit HEAD points to.
///
/// The repository is discovered from `path` upwards. Discovery stops before
/// entering any of `ceiling_dirs`.
///
/// # Errors
///
/// Returns [`RevisionError::NotARepository`] when no repository encloses
/// `path`, [`RevisionError::UnbornHead`] when HEAD has no commit, and
/// [`RevisionError::Git`] for any other libgit2 failure.
pub fn head_revision<I, P>(path: &Path, ceiling_dirs: I) -> Result<String, RevisionError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<std::ffi::OsStr>,
{
    let repo = Repository::open_ext(path, RepositoryOpenFlags::empty(), ceiling_dirs).map_err(
        |e| match e.code() {
            ErrorCode::NotFound => RevisionError::NotARepository(path.to_path_buf()),
            _ => RevisionError::Git(e),
        },
    )?;

    let head = repo.head().map_err(|e| match e.code() {
        ErrorCode::UnbornBranch | ErrorCode::NotFound => RevisionError::UnbornHead,
        _ => RevisionError::Git(e),
    })?;

    let commit = head.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// Resolves the [`RunIdentifier`] of the current process.
#[derive(Debug, Clone)]
pub struct RevisionResolver {
    override_value: Option<String>,
    search_from: PathBuf,
    ceiling_dirs: Vec<PathBuf>,
}

impl RevisionResolver {
    /// Creates a resolver that searches for a repository from `search_from`.
    #[must_use]
    pub fn new(search_from: impl Into<PathBuf>) -> Self {
        Self {
            override_value: None,
            search_from: search_from.into(),
            ceiling_dirs: Vec::new(),
        }
    }

    /// Sets the override consulted before git. Empty values are ignored.
    #[must_use]
    pub fn with_override(mut self, value: Option<String>) -> Self {
        self.override_value = value;
        self
    }

    /// Stops repository discovery before entering `dir`.
    #[must_use]
    pub fn with_ceiling_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ceiling_dirs.push(dir.into());
        self
    }

    /// Returns the run identifier. Never fails.
    #[must_use]
    pub fn resolve(&self) -> RunIdentifier {
        if let Some(id) = self
            .override_value
            .clone()
            .and_then(|value| RunIdentifier::new(value, IdentifierSource::Override))
        {
            return id;
        }

        match head_revision(&self.search_from, &self.ceiling_dirs) {
            Ok(hash) => {
                if let Some(id) = RunIdentifier::new(hash, IdentifierSource::Revision) {
                    return id;
                }
            }
            Err(RevisionError::NotARepository(path)) => {
                debug!(path = %path.display(), "No git repository, using timestamp");
            }
            Err(e) => {
                warn!(error = %e, "Failed to read git revision, using timestamp");
            }
        }

        RunIdentifier::from_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use git2::Signature;
    use tempfile::TempDir;

    use super::*;

    fn isolated_dir() -> TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn resolver_in(dir: &TempDir) -> RevisionResolver {
        let ceiling = dir.path().parent().expect("tempdir has a parent");
        RevisionResolver::new(dir.path()).with_ceiling_dir(ceiling)
    }

    fn commit_initial(path: &Path) -> String {
        let repo = Repository::init(path).expect("init repo");
        let sig = Signature::now("runner", "runner@example.com").expect("signature");
        let tree_id = repo.index().expect("index").write_tree().expect("write tree");
        let tree = repo.find_tree(tree_id).expect("find tree");
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .expect("commit")
            .to_string()
    }

    fn is_timestamp(value: &str) -> bool {
        chrono::NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).is_ok()
    }

    #[test]
    fn test_override_wins_without_repository() {
        let dir = isolated_dir();
        let id = resolver_in(&dir)
            .with_override(Some("abc123".to_string()))
            .resolve();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.source(), IdentifierSource::Override);
    }

    #[test]
    fn test_override_wins_over_repository() {
        let dir = isolated_dir();
        commit_initial(dir.path());
        let id = resolver_in(&dir)
            .with_override(Some("release-7".to_string()))
            .resolve();
        assert_eq!(id.as_str(), "release-7");
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let dir = isolated_dir();
        let id = resolver_in(&dir).with_override(Some(String::new())).resolve();
        assert_eq!(id.source(), IdentifierSource::Timestamp);
    }

    #[test]
    fn test_whitespace_override_is_kept_verbatim() {
        let dir = isolated_dir();
        commit_initial(dir.path());
        let id = resolver_in(&dir).with_override(Some(" ".to_string())).resolve();
        assert_eq!(id.as_str(), " ");
        assert_eq!(id.source(), IdentifierSource::Override);
    }

    #[test]
    fn test_head_commit_is_used() {
        let dir = isolated_dir();
        let hash = commit_initial(dir.path());
        let id = resolver_in(&dir).resolve();
        assert_eq!(id.as_str(), hash);
        assert_eq!(id.as_str().len(), 40);
        assert_eq!(id.source(), IdentifierSource::Revision);
    }

    #[test]
    fn test_repository_found_from_subdirectory() {
        let dir = isolated_dir();
        let hash = commit_initial(dir.path());
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let ceiling = dir.path().parent().unwrap();
        let id = RevisionResolver::new(&nested)
            .with_ceiling_dir(ceiling)
            .resolve();
        assert_eq!(id.as_str(), hash);
    }

    #[test]
    fn test_no_repository_falls_back_to_timestamp() {
        let dir = isolated_dir();
        let id = resolver_in(&dir).resolve();
        assert_eq!(id.source(), IdentifierSource::Timestamp);
        assert!(is_timestamp(id.as_str()), "unexpected id {id}");
    }

    #[test]
    fn test_unborn_head_falls_back_to_timestamp() {
        let dir = isolated_dir();
        Repository::init(dir.path()).unwrap();
        assert!(matches!(
            head_revision(dir.path(), dir.path().parent()),
            Err(RevisionError::UnbornHead)
        ));
        assert!(is_timestamp(resolver_in(&dir).resolve().as_str()));
    }

    #[test]
    fn test_head_revision_reports_missing_repository() {
        let dir = isolated_dir();
        let result = head_revision(dir.path(), dir.path().parent());
        assert!(matches!(result, Err(RevisionError::NotARepository(_))));
    }

    #[test]
    fn test_run_identifier_rejects_only_empty() {
        assert!(RunIdentifier::new("", IdentifierSource::Override).is_none());
        assert_eq!(
            RunIdentifier::new("  ", IdentifierSource::Override)
                .unwrap()
                .as_str(),
            "  "
        );
        assert!(RunIdentifier::new("x", IdentifierSource::Override).is_some());
    }
}
