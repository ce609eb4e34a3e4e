/*!

The four suites of the harness. Every test case builds its own [`Pipeline`] over its own
[`TestContext`]; the stages of a case only communicate through the case's `TestData`, so any prefix
of stages can be skipped and resumed from what an earlier process persisted.

!*/

use crate::aws::{AwsCloud, CloudServices, InstanceLocator};
use crate::constants::{stage, DEFAULT_ZONE_ID, DEFAULT_ZONE_NAME, LOGSTASH_OUTPUT_PATH};
use crate::context::{TestContext, WorkDir};
use crate::error::{self, Error, Result};
use crate::keystore::KeystoreProvisioner;
use crate::logs::{collect_logs, snapshot_dir, LogSource};
use crate::packer::{current_git_branch, ImageBuilder, Packer};
use crate::probe::{remote_log_contains, RetryPolicy};
use crate::remote::{RemoteConnector, RemoteHost, SshConnector};
use crate::terraform::{InfraEngine, Outputs, Terraform};
use elk_test_model::constants::{DEPLOYMENT_CONFIG, EC2_KEY_PAIR};
use elk_test_model::{DeploymentConfig, Ec2KeyPair, SkipStages, TestData};
use futures::future::join_all;
use log::{info, warn};
use snafu::{OptionExt, ResultExt};
use stage_runner::{RunReport, RunState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use all_in_one::AllInOneCase;
pub use docker::DockerCase;
pub use elasticsearch::ElasticsearchCase;
pub use end_to_end::EndToEndCase;

mod all_in_one;
mod docker;
mod elasticsearch;
mod end_to_end;

/// The report of one test case.
pub type CaseReport = RunReport<Error>;

/// What the operator chose for a run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The root of the repository holding `examples/`.
    pub repo_root: PathBuf,
    /// The parent of stable working directories. When unset a temporary directory is used unless
    /// the run resumes.
    pub work_root: Option<PathBuf>,
    pub keep_work_dir: bool,
    /// Log snapshots of failed runs go to `<log_dir>/debug/<case>`.
    pub log_dir: PathBuf,
    pub skip: SkipStages,
    /// Forces the AWS region instead of picking a random stable one.
    pub region: Option<String>,
    pub zone_name: String,
    pub zone_id: String,
    /// The branch the images install modules from. Discovered with git when unset.
    pub branch: Option<String>,
    pub accept_invalid_certs: bool,
    /// How long the app server is given after SSH comes up before the test line is written.
    pub app_log_settle: Duration,
}

impl Settings {
    pub fn new<P: Into<PathBuf>>(repo_root: P) -> Self {
        Self {
            repo_root: repo_root.into(),
            work_root: None,
            keep_work_dir: false,
            log_dir: PathBuf::from("."),
            skip: SkipStages::new(),
            region: None,
            zone_name: DEFAULT_ZONE_NAME.to_string(),
            zone_id: DEFAULT_ZONE_ID.to_string(),
            branch: None,
            accept_invalid_certs: true,
            app_log_settle: Duration::from_secs(30),
        }
    }

    /// Any skipped stage means this run picks up state from an earlier one.
    pub fn work_dir(&self) -> WorkDir {
        WorkDir::choose(self.work_root.as_deref(), self.skip.any())
    }

    fn context(&self, name: &str) -> Result<TestContext> {
        TestContext::create(name, &self.repo_root, &self.work_dir(), self.keep_work_dir)
    }

    async fn branch(&self) -> Result<String> {
        match &self.branch {
            Some(branch) => Ok(branch.clone()),
            None => current_git_branch(&self.repo_root).await,
        }
    }
}

/// The collaborators the stages drive. Tests replace them with mocks.
#[derive(Clone)]
pub struct Toolbox {
    pub images: Arc<dyn ImageBuilder>,
    pub infra: Arc<dyn InfraEngine>,
    pub remote: Arc<dyn RemoteConnector>,
    pub cloud: Arc<dyn CloudServices>,
    pub instances: Arc<dyn InstanceLocator>,
    pub keystore: KeystoreProvisioner,
    /// The `docker` program.
    pub docker: PathBuf,
}

impl Toolbox {
    /// The real programs and AWS APIs. With `assume_role` the role's temporary credentials are
    /// exported to the environment first, so `packer`, `terraform` and the AWS SDK calls all act
    /// as the same principal.
    pub async fn production(assume_role: Option<String>) -> Result<Self> {
        if let Some(role_arn) = &assume_role {
            agent_utils::aws::aws_config(&None, &assume_role, &None, true)
                .await
                .context(error::AssumeRoleSnafu { role_arn })?;
        }
        let aws = Arc::new(AwsCloud);
        Ok(Self {
            images: Arc::new(Packer::default()),
            infra: Arc::new(Terraform::default()),
            remote: Arc::new(SshConnector::default()),
            cloud: aws.clone(),
            instances: aws,
            keystore: KeystoreProvisioner::default(),
            docker: PathBuf::from("docker"),
        })
    }
}

/// A suite of test cases.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Scenario {
    EndToEnd,
    AllInOne,
    Elasticsearch,
    Docker,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::EndToEnd,
        Scenario::AllInOne,
        Scenario::Elasticsearch,
        Scenario::Docker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::EndToEnd => "end-to-end",
            Scenario::AllInOne => "all-in-one",
            Scenario::Elasticsearch => "elasticsearch",
            Scenario::Docker => "docker",
        }
    }

    /// The stages of the scenario in the order they are declared. Always-run stages come last.
    pub fn stages(&self) -> &'static [&'static str] {
        match self {
            Scenario::EndToEnd => &[
                stage::CREATE_SECRETS,
                stage::GENERATE_SSL_CERTS,
                stage::SETUP_AMI,
                stage::DEPLOY,
                stage::VALIDATE,
                stage::VALIDATE_COLLECTD,
                stage::VALIDATE_CLOUDWATCH,
                stage::VALIDATE_CLOUDTRAIL,
                stage::VALIDATE_KIBANA,
                stage::GET_LOGS,
                stage::TEARDOWN,
                stage::REMOVE_SECRETS,
            ],
            Scenario::AllInOne => &[
                stage::SETUP_AMI,
                stage::DEPLOY,
                stage::VALIDATE,
                stage::VALIDATE_COLLECTD,
                stage::VALIDATE_CLOUDWATCH,
                stage::VALIDATE_CLOUDTRAIL,
                stage::VALIDATE_KIBANA,
                stage::TEARDOWN,
            ],
            Scenario::Elasticsearch => &[
                stage::GENERATE_SSL_CERTS,
                stage::SETUP_AMI,
                stage::DEPLOY,
                stage::VALIDATE,
                stage::GET_LOGS,
                stage::TEARDOWN,
            ],
            Scenario::Docker => &[
                stage::GENERATE_SSL_CERTS,
                stage::BUILD_IMAGE,
                stage::COMPOSE_UP,
                stage::VALIDATE,
                stage::COMPOSE_LOGS,
                stage::COMPOSE_DOWN,
            ],
        }
    }

    pub fn cases(&self) -> Vec<Case> {
        match self {
            Scenario::EndToEnd => EndToEndCase::all().into_iter().map(Case::EndToEnd).collect(),
            Scenario::AllInOne => AllInOneCase::all().into_iter().map(Case::AllInOne).collect(),
            Scenario::Elasticsearch => ElasticsearchCase::all()
                .into_iter()
                .map(Case::Elasticsearch)
                .collect(),
            Scenario::Docker => DockerCase::all().into_iter().map(Case::Docker).collect(),
        }
    }
}

/// One test case of any scenario.
#[derive(Debug, Clone)]
pub enum Case {
    EndToEnd(EndToEndCase),
    AllInOne(AllInOneCase),
    Elasticsearch(ElasticsearchCase),
    Docker(DockerCase),
}

impl Case {
    pub fn name(&self) -> &str {
        match self {
            Case::EndToEnd(case) => &case.name,
            Case::AllInOne(case) => &case.name,
            Case::Elasticsearch(case) => &case.name,
            Case::Docker(case) => &case.name,
        }
    }

    /// Runs every stage of the case. An error means the case could not start at all (e.g. its
    /// working directory could not be prepared); stage failures are in the report.
    pub async fn run(&self, settings: &Settings, tools: &Toolbox) -> Result<CaseReport> {
        match self {
            Case::EndToEnd(case) => case.run(settings, tools).await,
            Case::AllInOne(case) => case.run(settings, tools).await,
            Case::Elasticsearch(case) => case.run(settings, tools).await,
            Case::Docker(case) => case.run(settings, tools).await,
        }
    }
}

/// Runs `cases` one after the other, or all at once when `parallel` is set. Each case has its own
/// working directory, so concurrent cases share nothing but the collaborators.
pub async fn run_cases(
    cases: &[Case],
    settings: &Settings,
    tools: &Toolbox,
    parallel: bool,
) -> Vec<(String, Result<CaseReport>)> {
    if parallel {
        join_all(cases.iter().map(|case| async move {
            (case.name().to_string(), case.run(settings, tools).await)
        }))
        .await
    } else {
        let mut reports = Vec::new();
        for case in cases {
            reports.push((case.name().to_string(), case.run(settings, tools).await));
        }
        reports
    }
}

fn load_deployment(data: &TestData) -> Result<DeploymentConfig> {
    Ok(data.load(DEPLOYMENT_CONFIG)?)
}

fn load_key_pair(data: &TestData) -> Result<Ec2KeyPair> {
    Ok(data.load(EC2_KEY_PAIR)?)
}

/// The first entry of the list output `name`.
fn first_of(outputs: &Outputs, name: &str) -> Result<String> {
    outputs
        .list(name)?
        .into_iter()
        .next()
        .context(error::MissingSnafu {
            what: format!("an entry in '{}'", name),
            from: "the terraform outputs",
        })
}

async fn deploy(tools: &Toolbox, data: &TestData) -> Result<()> {
    let config = load_deployment(data)?;
    let outputs = tools.infra.apply(&config).await?;
    info!(
        "Deployed '{}' with outputs {:?}",
        config.terraform_dir.display(),
        outputs
    );
    Ok(())
}

/// Destroys the deployment and deletes the run's key pair. Both are attempted; the first error is
/// returned.
async fn teardown(tools: &Toolbox, data: &TestData) -> Result<()> {
    let destroyed = match load_deployment(data) {
        Ok(config) => tools.infra.destroy(&config).await,
        Err(e) => Err(e),
    };
    let deleted = if data.exists(EC2_KEY_PAIR) {
        match load_key_pair(data) {
            Ok(key_pair) => tools.cloud.delete_key_pair(&key_pair).await,
            Err(e) => Err(e),
        }
    } else {
        Ok(())
    };
    destroyed.and(deleted)
}

/// Polls the Logstash file output on the first instance of `group` for `expected`.
async fn check_logstash_output(
    tools: &Toolbox,
    region: &str,
    group: &str,
    key_file: &Path,
    expected: &str,
) -> Result<()> {
    let ip = tools.instances.first_instance_ip(region, group).await?;
    remote_log_contains(
        tools.remote.as_ref(),
        &RemoteHost::new(ip, key_file),
        LOGSTASH_OUTPUT_PATH,
        expected,
        RetryPolicy::REMOTE_LOG,
    )
    .await
}

/// Writes a line to the CloudWatch log group of the deployment and waits for Logstash to ship it
/// through `group`.
async fn validate_cloudwatch(tools: &Toolbox, data: &TestData, group_output: &str) -> Result<()> {
    let config = load_deployment(data)?;
    let key_pair = load_key_pair(data)?;
    let region = config.vars.region();
    let outputs = tools.infra.outputs(&config).await?;

    let content = "This is a log line_cloudwatch";
    tools
        .cloud
        .put_log_event(region, &outputs.string("log_group"), content)
        .await?;

    let group = first_of(&outputs, group_output)?;
    check_logstash_output(
        tools,
        region,
        &group,
        &key_pair.private_key_path,
        &format!("\"message\":\"{}\"", content),
    )
    .await
}

/// Writes an object to the CloudTrail bucket of the deployment and waits for Logstash to ship it
/// through `group`. The object is deleted whatever the outcome.
async fn validate_cloudtrail(tools: &Toolbox, data: &TestData, group_output: &str) -> Result<()> {
    let config = load_deployment(data)?;
    let key_pair = load_key_pair(data)?;
    let region = config.vars.region();
    let outputs = tools.infra.outputs(&config).await?;

    let content = "This is a log line_cloudtrail";
    let bucket = outputs.string("bucket");
    let key = tools.cloud.put_s3_object(region, &bucket, content).await?;

    let checked = match first_of(&outputs, group_output) {
        Ok(group) => {
            check_logstash_output(
                tools,
                region,
                &group,
                &key_pair.private_key_path,
                &format!("\"message\":\"{}\"", content),
            )
            .await
        }
        Err(e) => Err(e),
    };
    let deleted = tools.cloud.delete_s3_object(region, &bucket, &key).await;
    checked.and(deleted)
}

/// Collects logs from `sources` when the run failed; does nothing for passing runs.
async fn get_logs<F>(
    tools: &Toolbox,
    settings: &Settings,
    data: &TestData,
    run_name: &str,
    state: RunState,
    sources: F,
) -> Result<()>
where
    F: FnOnce(&Outputs) -> Result<Vec<LogSource>>,
{
    if !state.failed() {
        info!("[{}] The run passed, not collecting logs", run_name);
        return Ok(());
    }
    let config = load_deployment(data)?;
    let key_pair = load_key_pair(data)?;
    let outputs = tools.infra.outputs(&config).await?;
    let sources = sources(&outputs)?;
    let dest = snapshot_dir(&settings.log_dir, run_name);
    let report = collect_logs(
        tools.remote.as_ref(),
        tools.instances.as_ref(),
        config.vars.region(),
        &key_pair.private_key_path,
        &sources,
        &dest,
    )
    .await;
    if !report.failures.is_empty() {
        warn!("[{}] Some logs could not be collected: {}", run_name, report);
    }
    Ok(())
}
