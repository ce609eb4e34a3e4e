use crate::error::{self, Result};
use log::{debug, info};
use snafu::ResultExt;
use std::ffi::OsStr;
use tokio::process::Command;

/// The command line of `command` as it would be typed in a shell, used in logs and error messages.
pub fn command_line(command: &Command) -> String {
    let command = command.as_std();
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `command` to completion and returns its `stdout`. A non-zero exit is an error that carries
/// the command line, the exit code, `stderr` and `stdout`.
pub async fn run(command: &mut Command) -> Result<String> {
    let hint = command_line(command);
    info!("Running '{}'", hint);
    let output = command
        .output()
        .await
        .context(error::ProcessSnafu { what: &hint })?;
    debug!(
        "'{}' exited with {}, stdout:\n{}",
        hint,
        output.status,
        String::from_utf8_lossy(&output.stdout)
    );
    agent_utils::cmd_output(output, &hint).context(error::CommandSnafu)
}

#[cfg(test)]
mod test {
    use super::{command_line, run};
    use tokio::process::Command;

    #[test]
    fn command_line_joins_program_and_args() {
        let mut command = Command::new("packer");
        command.args(["build", "-machine-readable", "-only=kibana-ami-ubuntu-20"]);
        assert_eq!(
            command_line(&command),
            "packer build -machine-readable -only=kibana-ami-ubuntu-20"
        );
    }

    #[tokio::test]
    async fn failure_carries_command_and_output() {
        let message = run(Command::new("sh").args(["-c", "echo partial; echo broken >&2; exit 2"]))
            .await
            .unwrap_err()
            .to_string();
        assert!(message.contains("exit code 2"), "{}", message);
        assert!(message.contains("broken"), "{}", message);
        assert!(message.contains("partial"), "{}", message);
        assert!(message.contains("sh -c"), "{}", message);
    }

    #[tokio::test]
    async fn missing_program_is_a_process_error() {
        let message = run(&mut Command::new("/nonexistent/elk-test-tool"))
            .await
            .unwrap_err()
            .to_string();
        assert!(message.contains("/nonexistent/elk-test-tool"), "{}", message);
    }
}
