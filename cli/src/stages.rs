use agent_utils::json_display;
use anyhow::{Context, Result};
use clap::Parser;
use elk_agents::scenario::Scenario;
use serde::Serialize;

/// Print the stages and test cases of one or every scenario.
#[derive(Debug, Parser)]
pub(crate) struct Stages {
    /// Only this scenario, e.g. `elasticsearch`.
    scenario: Option<String>,

    /// Output the stages in JSON format.
    #[clap(long = "json")]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ScenarioSummary {
    name: &'static str,
    stages: &'static [&'static str],
    cases: Vec<String>,
}

impl Stages {
    pub(crate) fn run(self) -> Result<()> {
        let scenarios = match &self.scenario {
            Some(name) => vec![Scenario::ALL
                .into_iter()
                .find(|scenario| scenario.name() == name)
                .with_context(|| format!("Unknown scenario '{}'", name))?],
            None => Scenario::ALL.to_vec(),
        };
        let summaries: Vec<_> = scenarios
            .into_iter()
            .map(|scenario| ScenarioSummary {
                name: scenario.name(),
                stages: scenario.stages(),
                cases: scenario
                    .cases()
                    .iter()
                    .map(|case| case.name().to_string())
                    .collect(),
            })
            .collect();

        if self.json {
            println!("{}", json_display(&summaries));
        } else {
            for summary in summaries {
                println!("{}", summary.name);
                println!("  stages: {}", summary.stages.join(", "));
                println!("  cases:  {}", summary.cases.join(", "));
            }
        }
        Ok(())
    }
}
