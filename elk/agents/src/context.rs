use crate::error::{self, Result};
use copy_dir::copy_dir;
use elk_test_model::TestData;
use log::{info, warn};
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The directory of the repository that is copied into every working directory.
pub const TEMPLATES_DIR: &str = "examples";

/// Where a [`TestContext`] puts its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkDir {
    /// A fresh temporary directory, removed when the run ends.
    Temporary,
    /// `<root>/<run name>`, created if needed and reused by later runs.
    Stable(PathBuf),
}

impl WorkDir {
    /// A resumed run must find what the earlier process persisted, so it always gets a stable
    /// directory: `work_root` if given, otherwise a fixed location under the system temp dir.
    pub fn choose(work_root: Option<&Path>, resuming: bool) -> Self {
        match (work_root, resuming) {
            (Some(root), _) => WorkDir::Stable(root.to_path_buf()),
            (None, true) => WorkDir::Stable(std::env::temp_dir().join("elk-test")),
            (None, false) => WorkDir::Temporary,
        }
    }
}

/// The working directory of one test case: a copy of the repository's Terraform examples and
/// Packer templates plus the [`TestData`] the stages persist.
#[derive(Debug)]
pub struct TestContext {
    name: String,
    dir: PathBuf,
    temp: Option<TempDir>,
    keep: bool,
}

impl TestContext {
    /// Prepares the working directory of the run `name`. The templates under
    /// `<repo_root>/examples` are copied in unless a stable directory already holds a copy from
    /// an earlier run, which is reused as is.
    pub fn create(name: &str, repo_root: &Path, work_dir: &WorkDir, keep: bool) -> Result<Self> {
        let (dir, temp) = match work_dir {
            WorkDir::Temporary => {
                let temp = tempfile::Builder::new()
                    .prefix(&format!("{}-", name))
                    .tempdir()
                    .context(error::TempDirSnafu)?;
                (temp.path().to_path_buf(), Some(temp))
            }
            WorkDir::Stable(root) => {
                let dir = root.join(name);
                std::fs::create_dir_all(&dir).context(error::CreateDirSnafu { path: &dir })?;
                (dir, None)
            }
        };

        let from = repo_root.join(TEMPLATES_DIR);
        let to = dir.join(TEMPLATES_DIR);
        if to.is_dir() {
            info!("Reusing the templates in '{}'", to.display());
        } else {
            ensure!(
                from.is_dir(),
                error::MissingSnafu {
                    what: TEMPLATES_DIR,
                    from: repo_root.display().to_string(),
                }
            );
            info!("Copying '{}' to '{}'", from.display(), to.display());
            let skipped = copy_dir(&from, &to).context(error::CopyDirSnafu {
                from: &from,
                to: &to,
            })?;
            for e in skipped {
                warn!("Not copied from '{}': {}", from.display(), e);
            }
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            temp,
            keep,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The copy of the repository's `examples` directory.
    pub fn examples_dir(&self) -> PathBuf {
        self.dir.join(TEMPLATES_DIR)
    }

    pub fn data(&self) -> TestData {
        TestData::new(&self.dir)
    }

    /// Ends the run. A temporary directory is deleted unless it was asked to be kept.
    pub fn finish(self) -> Option<PathBuf> {
        match self.temp {
            Some(temp) if !self.keep => {
                info!("[{}] Removing '{}'", self.name, temp.path().display());
                if let Err(e) = temp.close() {
                    warn!("[{}] Unable to remove the working directory: {}", self.name, e);
                }
                None
            }
            Some(temp) => {
                let dir = temp.keep();
                info!("[{}] Working directory kept in '{}'", self.name, dir.display());
                Some(dir)
            }
            None => {
                info!("[{}] Working directory is '{}'", self.name, self.dir.display());
                Some(self.dir)
            }
        }
    }
}
