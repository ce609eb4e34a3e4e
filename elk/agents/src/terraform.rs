use crate::command;
use crate::error::{self, Result};
use async_trait::async_trait;
use elk_test_model::constants::TFVARS_FILE;
use elk_test_model::DeploymentConfig;
use log::info;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// The outputs of an applied Terraform root module, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs(BTreeMap<String, Value>);

impl Outputs {
    /// Parses the object printed by `terraform output -json`, in which every output is wrapped as
    /// `{"value": ..., "type": ..., "sensitive": ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Value> =
            serde_json::from_str(json).context(error::ParseOutputsSnafu)?;
        Ok(Self(
            raw.into_iter()
                .map(|(name, mut output)| {
                    let value = output
                        .get_mut("value")
                        .map(Value::take)
                        .unwrap_or(Value::Null);
                    (name, value)
                })
                .collect(),
        ))
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The string output `name`, or an empty string if it is missing or not a string.
    pub fn string(&self, name: &str) -> String {
        self.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// The string output `name`. Missing, non-string and empty outputs are errors.
    pub fn required_string(&self, name: &str) -> Result<String> {
        let value = self.get(name).context(error::MissingSnafu {
            what: name,
            from: "the terraform outputs",
        })?;
        let value = value.as_str().context(error::OutputTypeSnafu {
            name,
            expected: "string",
        })?;
        snafu::ensure!(!value.is_empty(), error::EmptyOutputSnafu { name });
        Ok(value.to_string())
    }

    /// The list-of-strings output `name`, empty when the output is absent.
    pub fn list(&self, name: &str) -> Result<Vec<String>> {
        let value = match self.get(name) {
            Some(value) => value,
            None => return Ok(Vec::new()),
        };
        value
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .context(error::OutputTypeSnafu {
                name,
                expected: "list of strings",
            })
    }
}

/// Applies and destroys Terraform deployments. The production implementation is [`Terraform`];
/// tests inject mocks.
#[async_trait]
pub trait InfraEngine: Send + Sync {
    /// Creates or updates the infrastructure of `config` and returns its outputs.
    async fn apply(&self, config: &DeploymentConfig) -> Result<Outputs>;

    /// Destroys everything `config` created.
    async fn destroy(&self, config: &DeploymentConfig) -> Result<()>;

    /// Reads the outputs of an earlier apply.
    async fn outputs(&self, config: &DeploymentConfig) -> Result<Outputs>;
}

/// Runs the `terraform` binary inside the deployment's directory.
#[derive(Debug, Clone)]
pub struct Terraform {
    program: PathBuf,
}

impl Default for Terraform {
    fn default() -> Self {
        Self {
            program: PathBuf::from("terraform"),
        }
    }
}

impl Terraform {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.current_dir(dir);
        command
    }

    /// Renders the variables of `config` into its directory and runs `terraform init`.
    async fn prepare(&self, config: &DeploymentConfig) -> Result<()> {
        write_tfvars(config).await?;
        command::run(
            self.command(&config.terraform_dir)
                .args(["init", "-input=false"]),
        )
        .await?;
        Ok(())
    }
}

/// Writes the variables of `config` to [`TFVARS_FILE`] in its Terraform directory and returns the
/// file's path.
pub async fn write_tfvars(config: &DeploymentConfig) -> Result<PathBuf> {
    let path = config.terraform_dir.join(TFVARS_FILE);
    let json = serde_json::to_string_pretty(&config.tfvars()?)
        .context(error::SerializeVarsSnafu { path: &path })?;
    tokio::fs::write(&path, json)
        .await
        .context(error::WriteFileSnafu { path: &path })?;
    Ok(path)
}

#[async_trait]
impl InfraEngine for Terraform {
    async fn apply(&self, config: &DeploymentConfig) -> Result<Outputs> {
        info!("Applying '{}'", config.terraform_dir.display());
        self.prepare(config).await?;
        command::run(
            self.command(&config.terraform_dir)
                .args(["apply", "-auto-approve", "-input=false"])
                .arg(format!("-var-file={}", TFVARS_FILE)),
        )
        .await?;
        self.outputs(config).await
    }

    async fn destroy(&self, config: &DeploymentConfig) -> Result<()> {
        info!("Destroying '{}'", config.terraform_dir.display());
        self.prepare(config).await?;
        command::run(
            self.command(&config.terraform_dir)
                .args(["destroy", "-auto-approve", "-input=false"])
                .arg(format!("-var-file={}", TFVARS_FILE)),
        )
        .await?;
        Ok(())
    }

    async fn outputs(&self, config: &DeploymentConfig) -> Result<Outputs> {
        let stdout = command::run(
            self.command(&config.terraform_dir)
                .args(["output", "-json"]),
        )
        .await?;
        Outputs::from_json(&stdout)
    }
}
