use anyhow::{ensure, Context, Result};
use clap::Parser;
use elk_agents::constants::{DEFAULT_ZONE_ID, DEFAULT_ZONE_NAME, ENV_GITHUB_OAUTH_TOKEN};
use elk_agents::scenario::{run_cases, Case, Scenario, Settings, Toolbox};
use elk_test_model::constants::ENV_SKIP_STAGES;
use elk_test_model::{SkipStages, StageName};
use log::info;
use std::path::PathBuf;

/// Run the test cases of a scenario.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// The root of the repository holding the `examples` directory.
    #[clap(long = "repo-root", default_value = ".")]
    repo_root: PathBuf,

    /// The parent of the per-case working directories. Without it a temporary directory is used,
    /// unless stages are skipped.
    #[clap(long = "work-dir", env = "ELK_TEST_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Keep temporary working directories after the run.
    #[clap(long = "keep-work-dir")]
    keep_work_dir: bool,

    /// A stage not to run. Can be repeated or given as a comma-separated list.
    #[clap(
        long = "skip",
        env = ENV_SKIP_STAGES,
        value_delimiter = ',',
        multiple_occurrences = true
    )]
    skip: Vec<String>,

    /// Use this AWS region instead of a random stable one.
    #[clap(long = "region", env = "ELK_TEST_REGION")]
    region: Option<String>,

    /// The Route 53 hosted zone the deployments register their DNS names in.
    #[clap(long = "zone-name", default_value = DEFAULT_ZONE_NAME)]
    zone_name: String,

    #[clap(long = "zone-id", default_value = DEFAULT_ZONE_ID)]
    zone_id: String,

    /// Where the logs of failed runs are written, under `debug/<case>`.
    #[clap(long = "log-dir", env = "ELK_TEST_LOG_DIR", default_value = ".")]
    log_dir: PathBuf,

    /// Only run the named test case. Can be repeated.
    #[clap(long = "case", multiple_occurrences = true)]
    cases: Vec<String>,

    /// Run the selected test cases concurrently.
    #[clap(long = "parallel")]
    parallel: bool,

    /// An IAM role to assume for every AWS call, including those made by Packer and Terraform.
    #[clap(long = "assume-role")]
    assume_role: Option<String>,

    /// The branch the images install the modules from. Defaults to the checked out branch.
    #[clap(long = "branch")]
    branch: Option<String>,

    /// Verify the server certificates of HTTPS endpoints.
    #[clap(long = "verify-certs")]
    verify_certs: bool,
}

impl Run {
    pub(crate) async fn run(self, scenario: Scenario) -> Result<()> {
        let skip = self.skip_stages(scenario)?;
        let cases = self.selected_cases(scenario)?;
        if scenario == Scenario::EndToEnd {
            std::env::var(ENV_GITHUB_OAUTH_TOKEN).with_context(|| {
                format!(
                    "'{}' must be set to build the images of the {} scenario",
                    ENV_GITHUB_OAUTH_TOKEN,
                    scenario.name()
                )
            })?;
        }

        let settings = Settings {
            repo_root: self.repo_root,
            work_root: self.work_dir,
            keep_work_dir: self.keep_work_dir,
            log_dir: self.log_dir,
            skip,
            region: self.region,
            zone_name: self.zone_name,
            zone_id: self.zone_id,
            branch: self.branch,
            accept_invalid_certs: !self.verify_certs,
            ..Settings::new(".")
        };
        let tools = Toolbox::production(self.assume_role)
            .await
            .context("Unable to set up the AWS credentials")?;

        info!(
            "Running {} test cases of the {} scenario",
            cases.len(),
            scenario.name()
        );
        let results = run_cases(&cases, &settings, &tools, self.parallel).await;

        let total = results.len();
        let mut failed = Vec::new();
        for (name, result) in results {
            match result {
                Ok(report) => {
                    println!("{}", report);
                    if !report.passed() {
                        failed.push(name);
                    }
                }
                Err(e) => {
                    eprintln!("{}: unable to run: {}", name, e);
                    failed.push(name);
                }
            }
        }
        ensure!(
            failed.is_empty(),
            "{} of {} test cases failed: {}",
            failed.len(),
            total,
            failed.join(", ")
        );
        Ok(())
    }

    /// Every skipped stage must belong to the scenario.
    fn skip_stages(&self, scenario: Scenario) -> Result<SkipStages> {
        let mut skip = SkipStages::new();
        for stage in self.skip.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            ensure!(
                scenario.stages().contains(&stage),
                "Unknown stage '{}' for the {} scenario, expected one of: {}",
                stage,
                scenario.name(),
                scenario.stages().join(", ")
            );
            skip.set(StageName::new(stage).context("Invalid stage name")?, true);
        }
        Ok(skip)
    }

    fn selected_cases(&self, scenario: Scenario) -> Result<Vec<Case>> {
        let all = scenario.cases();
        if self.cases.is_empty() {
            return Ok(all);
        }
        for wanted in &self.cases {
            ensure!(
                all.iter().any(|case| case.name() == wanted.as_str()),
                "No test case '{}' in the {} scenario",
                wanted,
                scenario.name()
            );
        }
        Ok(all
            .into_iter()
            .filter(|case| self.cases.iter().any(|wanted| wanted.as_str() == case.name()))
            .collect())
    }
}
