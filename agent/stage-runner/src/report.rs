use crate::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

/// What happened to one stage.
#[derive(Debug)]
pub enum StageOutcome<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    Passed,
    Failed(Error<E>),
    /// The stage was marked skipped and its body was never run.
    Skipped,
    /// An earlier stage failed so this stage was never run.
    NotRun,
}

impl<E> StageOutcome<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

impl<E> Display for StageOutcome<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutcome::Passed => write!(f, "passed"),
            StageOutcome::Failed(e) => write!(f, "failed: {}", e),
            StageOutcome::Skipped => write!(f, "skipped"),
            StageOutcome::NotRun => write!(f, "not run"),
        }
    }
}

#[derive(Debug)]
pub struct StageRecord<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    pub name: String,
    pub outcome: StageOutcome<E>,
    pub duration: Duration,
}

/// The result of [`Pipeline::finish`](crate::Pipeline::finish): every stage in the order it was
/// run (regular stages first, then the always-run stages).
#[derive(Debug)]
pub struct RunReport<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    name: String,
    stages: Vec<StageRecord<E>>,
    duration: Duration,
}

impl<E> RunReport<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    pub(crate) fn new(name: String, stages: Vec<StageRecord<E>>, duration: Duration) -> Self {
        Self {
            name,
            stages,
            duration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[StageRecord<E>] {
        &self.stages
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `true` if no stage failed.
    pub fn passed(&self) -> bool {
        !self.stages.iter().any(|stage| stage.outcome.is_failed())
    }

    /// The outcome of the first stage named `stage`.
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome<E>> {
        self.stages
            .iter()
            .find(|record| record.name == stage)
            .map(|record| &record.outcome)
    }

    /// The failed stages and their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error<E>)> {
        self.stages.iter().filter_map(|record| match &record.outcome {
            StageOutcome::Failed(e) => Some((record.name.as_str(), e)),
            _ => None,
        })
    }
}

impl<E> Display for RunReport<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let status = if self.passed() { "PASSED" } else { "FAILED" };
        writeln!(f, "{} {} ({:.1?})", self.name, status, self.duration)?;
        for stage in &self.stages {
            writeln!(
                f,
                "  {:<40} {:>10.1?}  {}",
                stage.name, stage.duration, stage.outcome
            )?;
        }
        Ok(())
    }
}
