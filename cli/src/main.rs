/*!

This is the command line interface for running the staged integration tests of the ELK modules.

!*/

mod run;
mod stages;

use agent_utils::init_agent_logger;
use anyhow::Result;
use clap::Parser;
use elk_agents::scenario::Scenario;
use log::LevelFilter;

/// Builds, deploys, validates and tears down the ELK examples.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level")]
    log_level: Option<LevelFilter>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Run the multi-cluster deployment with Kibana, Logstash, ElastAlert and an app server.
    EndToEnd(run::Run),
    /// Run the single-image deployment.
    AllInOne(run::Run),
    /// Run the standalone Elasticsearch cluster.
    Elasticsearch(run::Run),
    /// Build the Elasticsearch Docker image and run it with Docker Compose.
    Docker(run::Run),
    /// List the stages and test cases of the scenarios.
    Stages(stages::Stages),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_agent_logger(env!("CARGO_CRATE_NAME"), args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::EndToEnd(run) => run.run(Scenario::EndToEnd).await,
        Command::AllInOne(run) => run.run(Scenario::AllInOne).await,
        Command::Elasticsearch(run) => run.run(Scenario::Elasticsearch).await,
        Command::Docker(run) => run.run(Scenario::Docker).await,
        Command::Stages(stages) => stages.run(),
    }
}
