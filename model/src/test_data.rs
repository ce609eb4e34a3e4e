use crate::constants::TEST_DATA_DIR;
use crate::error::{self, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

/// `TestData` persists named values as JSON files under `<working dir>/.test-data` so that a stage
/// can read what an earlier stage wrote, even when the earlier stage ran in a different process.
///
/// There is no locking: a working directory belongs to exactly one run at a time.
#[derive(Debug, Clone)]
pub struct TestData {
    dir: PathBuf,
}

impl TestData {
    /// Creates a `TestData` store for the run whose working directory is `working_dir`. Nothing is
    /// created on disk until the first value is saved.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Self {
        Self {
            dir: working_dir.as_ref().join(TEST_DATA_DIR),
        }
    }

    /// The directory holding the JSON files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path of the file that holds the value `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Serializes `value` as pretty JSON and writes it, replacing any earlier value.
    pub fn save<T>(&self, name: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        fs::create_dir_all(&self.dir).context(error::CreateDirSnafu { path: &self.dir })?;
        let path = self.path(name);
        let json =
            serde_json::to_string_pretty(value).context(error::SerializeTestDataSnafu { name })?;
        debug!("Storing test data '{}' in '{}'", name, path.display());
        fs::write(&path, json).context(error::WriteTestDataSnafu { path })?;
        Ok(())
    }

    /// Reads and deserializes the value `name`. It is an error for the value to be missing.
    pub fn load<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let path = self.path(name);
        ensure!(path.is_file(), error::MissingTestDataSnafu { path });
        debug!("Loading test data '{}' from '{}'", name, path.display());
        let data = fs::read_to_string(&path).context(error::ReadTestDataSnafu { path: &path })?;
        Ok(serde_json::from_str(&data).context(error::ParseTestDataSnafu { path })?)
    }

    pub fn save_string(&self, name: &str, value: &str) -> Result<()> {
        self.save(name, &value)
    }

    pub fn load_string(&self, name: &str) -> Result<String> {
        self.load(name)
    }
}
