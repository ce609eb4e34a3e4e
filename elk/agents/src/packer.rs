use crate::command;
use crate::error::{self, Result};
use async_trait::async_trait;
use elk_test_model::{AmiSet, ImageRole, ImageSet};
use log::info;
use snafu::{ensure, OptionExt};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Everything Packer needs to build one machine image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// The Packer template, e.g. `elk-amis/kibana/kibana.json`.
    pub template: PathBuf,
    /// The builder in the template to run, e.g. `kibana-ami-ubuntu-20`.
    pub builder: String,
    pub region: String,
    pub instance_type: String,
    pub use_ssl: bool,
    /// The branch of this repository that the image installs the modules from.
    pub branch: String,
}

impl ImageRequest {
    /// The request for the image of `role` in the ELK AMI templates under `amis_dir`. Builders are
    /// named `<role>-ami-<suffix>` and templates live in `<amis_dir>/<role>/<role>.json`.
    pub fn for_role(
        amis_dir: &Path,
        role: ImageRole,
        builder_suffix: &str,
        region: &str,
        instance_type: &str,
        use_ssl: bool,
        branch: &str,
    ) -> Self {
        Self {
            template: amis_dir
                .join(role.to_string())
                .join(format!("{}.json", role)),
            builder: format!("{}-ami-{}", role, builder_suffix),
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            use_ssl,
            branch: branch.to_string(),
        }
    }

    /// The `-var` pairs passed to `packer build`.
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("aws_region", self.region.clone()),
            ("instance_type", self.instance_type.clone()),
            ("use_ssl", self.use_ssl.to_string()),
        ];
        vars.extend(branch_vars(&self.branch));
        vars.push(("module_app_server_branch", self.branch.clone()));
        vars
    }
}

fn branch_vars(branch: &str) -> Vec<(&'static str, String)> {
    [
        "module_branch",
        "module_elasticsearch_branch",
        "module_filebeat_branch",
        "module_kibana_branch",
        "module_logstash_branch",
        "module_collectd_branch",
    ]
    .into_iter()
    .map(|name| (name, branch.to_string()))
    .collect()
}

/// Builds machine images. The production implementation is [`Packer`]; tests inject mocks.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds the image described by `request` and returns its id.
    async fn build_image(&self, request: &ImageRequest) -> Result<String>;

    /// Builds a local Docker image from `builder` in `template`.
    async fn build_docker_image(&self, template: &Path, builder: &str, branch: &str)
        -> Result<()>;
}

/// Runs the `packer` binary.
#[derive(Debug, Clone)]
pub struct Packer {
    program: PathBuf,
}

impl Default for Packer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("packer"),
        }
    }
}

impl Packer {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_command(&self, template: &Path, builder: &str, vars: &[(&str, String)]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("build")
            .arg("-machine-readable")
            .arg(format!("-only={}", builder));
        for (name, value) in vars {
            command.arg("-var").arg(format!("{}={}", name, value));
        }
        command.arg(template);
        command
    }
}

#[async_trait]
impl ImageBuilder for Packer {
    async fn build_image(&self, request: &ImageRequest) -> Result<String> {
        info!(
            "Building image '{}' in '{}' from '{}'",
            request.builder,
            request.region,
            request.template.display()
        );
        let stdout = command::run(&mut self.build_command(
            &request.template,
            &request.builder,
            &request.vars(),
        ))
        .await?;
        let id = parse_artifact_id(&stdout).context(error::MissingArtifactSnafu {
            builder: &request.builder,
        })?;
        info!("Image '{}' built: {}", request.builder, id);
        Ok(id)
    }

    async fn build_docker_image(
        &self,
        template: &Path,
        builder: &str,
        branch: &str,
    ) -> Result<()> {
        info!(
            "Building docker image '{}' from '{}'",
            builder,
            template.display()
        );
        command::run(&mut self.build_command(template, builder, &branch_vars(branch))).await?;
        Ok(())
    }
}

/// Finds the image id in `packer build -machine-readable` output. The artifact line looks like
/// `1616000000,amazon-ebs,artifact,0,id,us-east-1:ami-0abc`. When an artifact spans several
/// regions the first one is used.
pub fn parse_artifact_id(machine_readable: &str) -> Option<String> {
    machine_readable.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(',').collect();
        let position = fields
            .windows(4)
            .position(|window| window[0] == "artifact" && window[2] == "id")?;
        let data = fields.get(position + 3)?;
        let first = data.split("%!(PACKER_COMMA)").next()?;
        let id = first.rsplit(':').next()?.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    })
}

/// Builds all five images concurrently and waits for every build to finish. Each build writes
/// its own result slot. If any build fails or produces an empty id the returned error lists the
/// result of every build.
pub async fn build_all_images<B>(builder: &B, requests: &ImageSet<ImageRequest>) -> Result<AmiSet>
where
    B: ImageBuilder + ?Sized,
{
    let (elasticsearch, logstash, app_server, kibana, elastalert) = futures::join!(
        builder.build_image(&requests.elasticsearch),
        builder.build_image(&requests.logstash),
        builder.build_image(&requests.app_server),
        builder.build_image(&requests.kibana),
        builder.build_image(&requests.elastalert),
    );
    let results = ImageSet {
        elasticsearch,
        logstash,
        app_server,
        kibana,
        elastalert,
    };
    let failed = results.iter().any(|(_, result)| {
        result
            .as_ref()
            .map(|id| id.trim().is_empty())
            .unwrap_or(true)
    });
    ensure!(
        !failed,
        error::ImageBuildsSnafu {
            results: results
                .iter()
                .map(|(role, result)| match result {
                    Ok(id) => format!("{}: '{}'", role, id),
                    Err(e) => format!("{}: error: {}", role, e),
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    );
    Ok(results.map(|_, result| result.unwrap_or_default()))
}

/// The branch currently checked out in `repo`.
pub async fn current_git_branch(repo: &Path) -> Result<String> {
    let stdout = command::run(
        Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(["rev-parse", "--abbrev-ref", "HEAD"]),
    )
    .await?;
    Ok(stdout.trim().to_string())
}
