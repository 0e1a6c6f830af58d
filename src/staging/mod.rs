//! Run-scoped staging directories and their guaranteed removal.
//!
//! A [`StagingScope`] owns one uniquely named root per run with one sibling directory per
//! intermediate stage. The scope is released exactly once: explicitly through
//! [`StagingScope::release`] once the run reached its terminal state, or on drop when the run
//! future is abandoned or unwinds.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

use crate::stages::StageKind;
use crate::{CleanupError, PipelineError};

/// A stage-private directory, created on first write
#[derive(Debug, Clone)]
pub struct StagingArea {
    kind: StageKind,
    path: PathBuf,
}

impl StagingArea {
    fn new(root: &Path, kind: StageKind) -> Self {
        Self {
            kind,
            path: root.join(kind.dir_name()),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Create the directory if this is the first write
    pub async fn ensure(&self) -> std::io::Result<&Path> {
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(&self.path)
    }
}

/// The staging areas of one pipeline run
pub struct StagingScope {
    run_id: String,
    root: Option<TempDir>,
    areas: [StagingArea; 3],
}

impl StagingScope {
    /// Reserve a fresh run root under `base`. Stage areas are not created yet.
    pub fn acquire(base: &Path) -> Result<Self, PipelineError> {
        fs_err::create_dir_all(base).map_err(|e| PipelineError::Staging(e.to_string()))?;

        let run_id = Uuid::new_v4().to_string()[..8].to_string();
        let root = tempfile::Builder::new()
            .prefix(&format!("mashup-{}-", run_id))
            .tempdir_in(base)
            .map_err(|e| {
                PipelineError::Staging(format!("{}: {}", base.display(), e))
            })?;

        let areas = [
            StagingArea::new(root.path(), StageKind::Raw),
            StagingArea::new(root.path(), StageKind::Audio),
            StagingArea::new(root.path(), StageKind::Trimmed),
        ];

        tracing::debug!("Reserved staging root {}", root.path().display());

        Ok(Self {
            run_id,
            root: Some(root),
            areas,
        })
    }

    /// Short identifier of this run, also embedded in the root directory name
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_ref().map(TempDir::path)
    }

    pub fn area(&self, kind: StageKind) -> &StagingArea {
        match kind {
            StageKind::Raw => &self.areas[0],
            StageKind::Audio => &self.areas[1],
            StageKind::Trimmed => &self.areas[2],
        }
    }

    pub fn areas(&self) -> &[StagingArea] {
        &self.areas
    }

    /// Remove every staging area and the run root.
    ///
    /// Failures are logged and returned for diagnostics; they never change the run outcome.
    pub fn release(mut self) -> Vec<CleanupError> {
        self.release_once()
    }

    /// [`release`](Self::release) on the blocking pool, for callers on the async runtime
    pub async fn release_async(self) -> Vec<CleanupError> {
        let run_id = self.run_id.clone();
        match tokio::task::spawn_blocking(move || self.release()).await {
            Ok(errors) => errors,
            Err(e) => {
                tracing::warn!("Releasing staging for run {} did not finish: {}", run_id, e);
                Vec::new()
            }
        }
    }

    fn release_once(&mut self) -> Vec<CleanupError> {
        let Some(root) = self.root.take() else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        for area in &self.areas {
            if !area.exists() {
                continue;
            }
            if let Err(source) = fs_err::remove_dir_all(area.path()) {
                errors.push(CleanupError {
                    path: area.path().to_path_buf(),
                    source,
                });
            }
        }

        let root_path = root.path().to_path_buf();
        if let Err(source) = root.close() {
            errors.push(CleanupError {
                path: root_path.clone(),
                source,
            });
        }

        for error in &errors {
            tracing::warn!("{}", error);
        }
        tracing::debug!("Released staging root {}", root_path.display());

        errors
    }
}

impl Drop for StagingScope {
    fn drop(&mut self) {
        if self.root.is_some() {
            tracing::warn!("Staging for run {} released on drop", self.run_id);
            self.release_once();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_areas_are_created_lazily() {
        let base = tempfile::tempdir().unwrap();
        let scope = StagingScope::acquire(base.path()).unwrap();

        assert!(scope.root().unwrap().is_dir());
        assert!(scope.areas().iter().all(|area| !area.exists()));

        scope.area(StageKind::Audio).ensure().await.unwrap();
        assert!(scope.area(StageKind::Audio).exists());
        assert!(!scope.area(StageKind::Raw).exists());
        assert!(!scope.area(StageKind::Trimmed).exists());
    }

    #[test]
    fn test_areas_are_distinct_siblings() {
        let base = tempfile::tempdir().unwrap();
        let scope = StagingScope::acquire(base.path()).unwrap();
        let root = scope.root().unwrap().to_path_buf();

        let paths: Vec<_> = scope.areas().iter().map(|a| a.path().to_path_buf()).collect();
        for (i, a) in paths.iter().enumerate() {
            assert_eq!(a.parent().unwrap(), root);
            for b in &paths[i + 1..] {
                assert!(!a.starts_with(b) && !b.starts_with(a));
            }
        }
    }

    #[test]
    fn test_release_removes_everything() {
        let base = tempfile::tempdir().unwrap();
        let scope = StagingScope::acquire(base.path()).unwrap();
        let root = scope.root().unwrap().to_path_buf();

        tokio_test::block_on(async {
            let raw = scope.area(StageKind::Raw).ensure().await.unwrap();
            fs_err::write(raw.join("00001_a.mp4"), b"data").unwrap();
        });

        let errors = scope.release();
        assert!(errors.is_empty());
        assert!(!root.exists());
        assert_eq!(fs_err::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_release_async_removes_everything() {
        let base = tempfile::tempdir().unwrap();
        let scope = StagingScope::acquire(base.path()).unwrap();
        let root = scope.root().unwrap().to_path_buf();

        let clips = scope.area(StageKind::Trimmed).ensure().await.unwrap();
        fs_err::write(clips.join("clip_00001_a.mp3"), b"data").unwrap();

        let errors = scope.release_async().await;
        assert!(errors.is_empty());
        assert!(!root.exists());
    }

    #[test]
    fn test_drop_releases_when_not_released_explicitly() {
        let base = tempfile::tempdir().unwrap();
        let root = {
            let scope = StagingScope::acquire(base.path()).unwrap();
            scope.root().unwrap().to_path_buf()
        };

        assert!(!root.exists());
    }

    #[test]
    fn test_concurrent_runs_get_unique_roots() {
        let base = tempfile::tempdir().unwrap();
        let first = StagingScope::acquire(base.path()).unwrap();
        let second = StagingScope::acquire(base.path()).unwrap();

        assert_ne!(first.root(), second.root());
        assert_ne!(first.run_id(), second.run_id());

        let second_root = second.root().unwrap().to_path_buf();
        first.release();
        assert!(second_root.is_dir());
    }

    #[test]
    fn test_creates_missing_base_directory() {
        let base = tempfile::tempdir().unwrap();
        let nested = base.path().join("a").join("b");

        let scope = StagingScope::acquire(&nested).unwrap();
        assert!(scope.root().unwrap().starts_with(&nested));
    }
}
