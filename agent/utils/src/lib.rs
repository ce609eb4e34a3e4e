/*!

`agent-utils` is a collection of functions shared by the ELK test harness crates.
`aws` contains the function that sets up the aws config used by every AWS call of a run.

!*/

use constants::DEFAULT_AGENT_LEVEL_FILTER;
use env_logger::Builder;
pub use error::Error;
use log::LevelFilter;
use serde::Serialize;
use std::env;
use std::process::Output;

pub mod aws;
pub mod constants;
mod error;

/// Extract the value of `RUST_LOG` if it exists, otherwise log this application at
/// `DEFAULT_AGENT_LEVEL_FILTER`.
pub fn init_agent_logger(bin_crate: &str, log_level: Option<LevelFilter>) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level except AWS SDK.
            let log_level = log_level.unwrap_or(DEFAULT_AGENT_LEVEL_FILTER);
            Builder::new()
                // Set log level to Error for crates other than our own.
                .filter_level(LevelFilter::Error)
                // Set all of our crates to the desired level.
                .filter(Some(bin_crate), log_level)
                .filter(Some("agent_utils"), log_level)
                .filter(Some("elk_agents"), log_level)
                .filter(Some("elk_test_model"), log_level)
                .filter(Some("stage_runner"), log_level)
                .init();
        }
    }
}

/// Print a value using `serde_json` `to_string_pretty` for types that implement Serialize.
pub fn json_display<T: Serialize>(object: T) -> String {
    serde_json::to_string_pretty(&object).unwrap_or_else(|e| format!("Serialization failed: {}", e))
}

/// If the command was successful (exit code zero), returns the command's `stdout`. Otherwise
/// returns an error carrying the exit code, `stderr` and `stdout`.
/// - `output`: the `Output` object from a `std::process::Command`
/// - `hint`: the command that was executed, e.g. `echo hello world`
pub fn cmd_output(output: Output, hint: &str) -> Result<String, Error> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        Ok(stdout.to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        Err(Error::CommandFailed {
            hint: hint.to_string(),
            code,
            stderr: stderr.to_string(),
            stdout: stdout.to_string(),
        })
    }
}
