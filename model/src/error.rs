use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Error serializing configuration: {}", source))]
    ConfigSerialization { source: serde_json::Error },

    #[snafu(display(
        "Error serializing configuration: expected Value::Object type but got something else."
    ))]
    ConfigWrongValueType {},

    #[snafu(display("Unable to create test data directory '{}': {}", path.display(), source))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Stage name cannot be empty"))]
    EmptyStageName {},

    #[snafu(display("Unable to parse test data file '{}': {}", path.display(), source))]
    ParseTestData {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display(
        "Test data file '{}' was not found, was the stage that writes it skipped?",
        path.display()
    ))]
    MissingTestData { path: PathBuf },

    #[snafu(display("Unable to read test data file '{}': {}", path.display(), source))]
    ReadTestData {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to serialize test data '{}': {}", name, source))]
    SerializeTestData {
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to write test data file '{}': {}", path.display(), source))]
    WriteTestData {
        path: PathBuf,
        source: std::io::Error,
    },
}
