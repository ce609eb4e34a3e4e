use crate::constants::{DEFAULT_ASSUME_ROLE_SESSION_DURATION, DEFAULT_REGION};
use crate::error::{self, Result};
use aws_config::default_provider::credentials::default_provider;
use aws_config::sts::AssumeRoleProvider;
use aws_config::retry::RetryConfig;
use aws_config::ConfigLoader;
use aws_sdk_sts::Region;
use aws_smithy_types::retry::RetryMode;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_types::SdkConfig;
use log::info;
use snafu::OptionExt;
use snafu::ResultExt;
use std::env;
use std::time::Duration;

/// Set up the config for aws calls in `region` (or `DEFAULT_REGION`), using `sts::assume_role` if a
/// role arn is provided.
///
/// When `setup_env` is true and a role is provided, the role is assumed once with the base
/// credentials and the temporary credentials are exported as environment variables. Child
/// processes such as `packer` and `terraform`, and every config loaded afterwards from the default
/// provider chain, then act as the assumed role.
pub async fn aws_config(
    region: &Option<String>,
    assume_role: &Option<String>,
    assume_role_session_duration: &Option<i32>,
    setup_env: bool,
) -> Result<SdkConfig> {
    let region = region
        .as_ref()
        .unwrap_or(&DEFAULT_REGION.to_string())
        .to_string();
    info!(
        "Creating a custom region provider for '{}' to be used in the aws config.",
        region
    );
    let base_provider = SharedCredentialsProvider::new(default_provider().await);

    let provider = match (assume_role, setup_env) {
        (Some(role_arn), true) => {
            export_role_credentials(
                &region,
                role_arn,
                assume_role_session_duration,
                base_provider,
            )
            .await?;
            // The default chain now finds the exported credentials.
            SharedCredentialsProvider::new(default_provider().await)
        }
        (Some(role_arn), false) => SharedCredentialsProvider::new(
            AssumeRoleProvider::builder(role_arn)
                .region(Region::new(region.clone()))
                .session_name("elk-test")
                .session_length(Duration::from_secs(
                    assume_role_session_duration.unwrap_or(DEFAULT_ASSUME_ROLE_SESSION_DURATION)
                        as u64,
                ))
                .build(base_provider),
        ),
        (None, _) => base_provider,
    };

    Ok(config_loader(&region)
        .credentials_provider(provider)
        .load()
        .await)
}

fn config_loader(region: &str) -> ConfigLoader {
    aws_config::from_env()
        .region(Region::new(region.to_string()))
        .retry_config(
            RetryConfig::standard()
                .with_retry_mode(RetryMode::Adaptive)
                .with_max_attempts(15),
        )
}

async fn export_role_credentials(
    region: &str,
    role_arn: &str,
    assume_role_session_duration: &Option<i32>,
    base_provider: SharedCredentialsProvider,
) -> Result<()> {
    info!("Getting credentials for assumed role '{}'.", role_arn);
    let base_config = config_loader(region)
        .credentials_provider(base_provider)
        .load()
        .await;
    let credentials = aws_sdk_sts::Client::new(&base_config)
        .assume_role()
        .role_arn(role_arn)
        .role_session_name("elk-test")
        .set_duration_seconds(*assume_role_session_duration)
        .send()
        .await
        .context(error::AssumeRoleSnafu { role_arn })?
        .credentials()
        .context(error::CredentialsMissingSnafu { role_arn })?
        .clone();
    set_environment_variables(
        credentials
            .access_key_id()
            .context(error::CredentialsMissingSnafu { role_arn })?,
        credentials
            .secret_access_key()
            .context(error::CredentialsMissingSnafu { role_arn })?,
        credentials.session_token(),
    );
    Ok(())
}

fn set_environment_variables(
    access_key_id: &str,
    secret_access_key: &str,
    session_token: Option<&str>,
) {
    env::set_var("AWS_ACCESS_KEY_ID", access_key_id);
    env::set_var("AWS_SECRET_ACCESS_KEY", secret_access_key);
    if let Some(session_token) = session_token {
        env::set_var("AWS_SESSION_TOKEN", session_token);
    }
}

#[cfg(test)]
mod test {
    use super::set_environment_variables;
    use std::env;

    #[test]
    fn exported_credentials_are_visible_to_child_processes() {
        set_environment_variables("AKIDEXAMPLE", "secret", Some("token"));
        let output = std::process::Command::new("sh")
            .args([
                "-c",
                "echo $AWS_ACCESS_KEY_ID $AWS_SECRET_ACCESS_KEY $AWS_SESSION_TOKEN",
            ])
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&output.stdout),
            "AKIDEXAMPLE secret token\n"
        );
        assert_eq!(env::var("AWS_ACCESS_KEY_ID").unwrap(), "AKIDEXAMPLE");
    }
}
