use crate::constants::{SSH_CONNECT_TIMEOUT, SSH_USER};
use crate::error::{self, Result};
use crate::probe::{retry, RetryPolicy};
use async_trait::async_trait;
use log::{info, warn};
use openssh::{KnownHosts, Session, SessionBuilder};
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An instance reachable over SSH with the private key of the run's EC2 key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub address: String,
    pub user: String,
    pub key_file: PathBuf,
}

impl RemoteHost {
    /// A host that is logged into as [`SSH_USER`].
    pub fn new<S, P>(address: S, key_file: P) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            address: address.into(),
            user: SSH_USER.to_string(),
            key_file: key_file.into(),
        }
    }
}

/// A connected shell on a remote host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Runs `command` with the remote user's shell and returns its `stdout`. A non-zero exit is an
    /// error.
    async fn run(&self, command: &str) -> Result<String>;

    /// Copies the remote file at `remote` to `local`, creating parent directories as needed.
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;
}

/// Opens [`RemoteShell`]s. The production implementation is [`SshConnector`].
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, host: &RemoteHost) -> Result<Box<dyn RemoteShell>>;
}

/// Connects with the system `ssh` client through a control master.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: SSH_CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, host: &RemoteHost) -> Result<Box<dyn RemoteShell>> {
        let session = SessionBuilder::default()
            .keyfile(&host.key_file)
            .user(host.user.clone())
            .known_hosts_check(KnownHosts::Accept)
            .user_known_hosts_file("/dev/null")
            .connect_timeout(self.connect_timeout)
            .connect_mux(&host.address)
            .await
            .context(error::SshConnectSnafu {
                host: &host.address,
            })?;
        Ok(Box::new(SshShell {
            host: host.address.clone(),
            session,
        }))
    }
}

struct SshShell {
    host: String,
    session: Session,
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, command: &str) -> Result<String> {
        let output = self
            .session
            .shell(command)
            .output()
            .await
            .context(error::SshSnafu {
                host: &self.host,
                command,
            })?;
        ensure!(
            output.status.success(),
            error::RemoteCommandSnafu {
                host: &self.host,
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr),
            }
        );
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        // Logs under /var/log are often only readable by root.
        let command = format!("sudo cat '{}'", remote);
        let output = self
            .session
            .shell(&command)
            .output()
            .await
            .context(error::SshSnafu {
                host: &self.host,
                command: &command,
            })?;
        ensure!(
            output.status.success(),
            error::RemoteCommandSnafu {
                host: &self.host,
                command: &command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr),
            }
        );
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(error::CreateDirSnafu { path: parent })?;
        }
        tokio::fs::write(local, &output.stdout)
            .await
            .context(error::WriteFileSnafu { path: local })
    }
}

/// Waits until `true` can be run on `host`.
pub async fn wait_for_ssh(
    connector: &dyn RemoteConnector,
    host: &RemoteHost,
    policy: RetryPolicy,
) -> Result<()> {
    retry(
        &format!("SSH to '{}'", host.address),
        policy,
        || async move {
            connector.connect(host).await?.run("true").await?;
            Ok(())
        },
    )
    .await
}

/// Appends a line with a fresh unique marker to `path` on the app server, for Filebeat to ship.
/// The host is given `settle` after SSH comes up for the services to start. Returns the marker.
///
/// An app server that never accepts SSH is an error. Failing to write the line itself is only
/// logged: the checks that look for the marker report the failure.
pub async fn write_app_server_log(
    connector: &dyn RemoteConnector,
    host: &RemoteHost,
    path: &str,
    ssh_policy: RetryPolicy,
    settle: Duration,
) -> Result<String> {
    let message = format!("TEST_123_{}", crate::aws::unique_id());
    wait_for_ssh(connector, host, ssh_policy).await?;
    info!(
        "Waiting {}s for services on '{}' to start",
        settle.as_secs(),
        host.address
    );
    tokio::time::sleep(settle).await;

    info!("Writing '{}' to '{}' on '{}'", message, path, host.address);
    if let Err(e) = append_line(connector, host, path, &message).await {
        warn!(
            "Unable to write '{}' to '{}' on '{}': {}",
            message, path, host.address, e
        );
    }
    Ok(message)
}

async fn append_line(
    connector: &dyn RemoteConnector,
    host: &RemoteHost,
    path: &str,
    line: &str,
) -> Result<()> {
    connector
        .connect(host)
        .await?
        .run(&format!("echo \"{}\" >> {}", line, path))
        .await?;
    Ok(())
}
