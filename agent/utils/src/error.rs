use aws_sdk_sts::error::AssumeRoleError;
use aws_sdk_sts::types::SdkError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to assume role '{}': {}", role_arn, source))]
    AssumeRole {
        role_arn: String,
        source: SdkError<AssumeRoleError>,
    },

    #[snafu(display(
        "Error running '{}', exit code {}\nstderr:\n{}\nstdout:\n{}",
        hint,
        code,
        stderr,
        stdout
    ))]
    CommandFailed {
        hint: String,
        code: i32,
        stderr: String,
        stdout: String,
    },

    #[snafu(display("Credentials were missing for assumed role '{}'", role_arn))]
    CredentialsMissing { role_arn: String },
}

pub type Result<T> = std::result::Result<T, Error>;
