use crate::command;
use crate::error::Result;
use log::info;
use std::path::PathBuf;
use tokio::process::Command;

/// `docker compose` in one directory with a fixed set of environment variables.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: PathBuf,
    working_dir: PathBuf,
    env: Vec<(String, String)>,
}

impl DockerCompose {
    pub fn new<P, D>(program: P, working_dir: D, env: Vec<(String, String)>) -> Self
    where
        P: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            env,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("compose")
            .args(args)
            .current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }

    /// Starts the stack in the background.
    pub async fn up(&self) -> Result<()> {
        info!("Starting the stack in '{}'", self.working_dir.display());
        command::run(&mut self.command(&["up", "-d"])).await?;
        Ok(())
    }

    /// Returns the combined logs of every container.
    pub async fn logs(&self) -> Result<String> {
        command::run(&mut self.command(&["logs"])).await
    }

    pub async fn down(&self) -> Result<()> {
        info!("Stopping the stack in '{}'", self.working_dir.display());
        command::run(&mut self.command(&["down"])).await?;
        Ok(())
    }
}
