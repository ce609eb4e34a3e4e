use crate::error::{self, Error};
use crate::report::{RunReport, StageOutcome, StageRecord};
use elk_test_model::{SkipStages, StageName};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use snafu::ResultExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Whether every stage that has run so far has passed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RunState {
    Passing,
    Failed,
}

impl RunState {
    pub fn failed(&self) -> bool {
        *self == RunState::Failed
    }
}

type AlwaysRunBody<'a, E> = Box<dyn FnOnce(RunState) -> BoxFuture<'a, Result<(), E>> + Send + 'a>;

/// A `Pipeline` runs the named stages of one test, in the order they are called, and records the
/// outcome of each.
///
/// - A stage whose name is marked skipped in the [`SkipStages`] given to [`Pipeline::new`] is not
///   executed at all.
/// - Once a stage fails (returns an error or panics) the remaining regular stages are not run.
/// - Stages registered with [`Pipeline::always_run`] (teardown, log collection) are executed by
///   [`Pipeline::finish`], in registration order, whatever happened before. They are subject to
///   their own skip flag and learn whether the run has failed so far.
///
/// Stages cannot hand values to each other in memory. Anything a later stage needs is persisted
/// with `TestData`, which is what makes it possible to skip the early stages of a run and resume
/// from the state saved by an earlier process.
pub struct Pipeline<'a, E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    name: String,
    skip: SkipStages,
    seen: BTreeSet<String>,
    always_run: Vec<(String, AlwaysRunBody<'a, E>)>,
    records: Vec<StageRecord<E>>,
    state: RunState,
    started: Instant,
}

impl<'a, E> Pipeline<'a, E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    pub fn new<S: Into<String>>(name: S, skip: SkipStages) -> Self {
        let name = name.into();
        let skipped: Vec<&str> = skip.skipped().map(StageName::as_str).collect();
        if !skipped.is_empty() {
            info!("[{}] Skipping stages: {}", name, skipped.join(", "));
        }
        Self {
            name,
            skip,
            seen: BTreeSet::new(),
            always_run: Vec::new(),
            records: Vec::new(),
            state: RunState::Passing,
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Whether `stage` is marked skipped. Invalid stage names are never skipped.
    pub fn is_skipped(&self, stage: &str) -> bool {
        StageName::new(stage)
            .map(|stage| self.skip.is_skipped(&stage))
            .unwrap_or(false)
    }

    /// Runs `body` as the stage `stage` unless the stage is skipped or an earlier stage has failed.
    /// `body` is not polled at all in those cases. Returns `true` if the stage ran and passed.
    pub async fn run_stage<F>(&mut self, stage: &str, body: F) -> bool
    where
        F: Future<Output = Result<(), E>>,
    {
        let stage_name = match self.register(stage) {
            Ok(stage_name) => stage_name,
            Err(e) => {
                self.fail(stage, e, Duration::ZERO);
                return false;
            }
        };
        if self.state.failed() {
            debug!(
                "[{}] Not running stage '{}' because an earlier stage failed",
                self.name, stage
            );
            self.record(stage, StageOutcome::NotRun, Duration::ZERO);
            return false;
        }
        if self.skip.is_skipped(&stage_name) {
            info!("[{}] Skipping stage '{}'", self.name, stage);
            self.record(stage, StageOutcome::Skipped, Duration::ZERO);
            return false;
        }
        self.execute(stage, body).await
    }

    /// Registers a stage that [`Pipeline::finish`] runs whether or not the regular stages passed.
    /// `body` is called with the state of the run at the time the stage starts.
    pub fn always_run<F>(&mut self, stage: &str, body: F)
    where
        F: FnOnce(RunState) -> BoxFuture<'a, Result<(), E>> + Send + 'a,
    {
        match self.register(stage) {
            Ok(_) => self.always_run.push((stage.to_string(), Box::new(body))),
            Err(e) => self.fail(stage, e, Duration::ZERO),
        }
    }

    /// Runs the always-run stages in registration order and returns the report of the whole run.
    /// A failing always-run stage is recorded and the remaining ones still run.
    pub async fn finish(mut self) -> RunReport<E> {
        let always_run = std::mem::take(&mut self.always_run);
        for (stage, body) in always_run {
            if self.is_skipped(&stage) {
                info!("[{}] Skipping stage '{}'", self.name, stage);
                self.record(&stage, StageOutcome::Skipped, Duration::ZERO);
                continue;
            }
            let state = self.state;
            self.execute(&stage, body(state)).await;
        }
        let report = RunReport::new(self.name, self.records, self.started.elapsed());
        if report.passed() {
            info!("[{}] All stages passed", report.name());
        } else {
            error!("[{}] Run failed", report.name());
        }
        report
    }

    fn register(&mut self, stage: &str) -> Result<StageName, Error<E>> {
        let stage_name = StageName::new(stage).context(error::StageNameSnafu { name: stage })?;
        if !self.seen.insert(stage.to_string()) {
            return Err(error::DuplicateStageSnafu { name: stage }.build().into());
        }
        Ok(stage_name)
    }

    async fn execute<F>(&mut self, stage: &str, body: F) -> bool
    where
        F: Future<Output = Result<(), E>>,
    {
        info!("[{}] Running stage '{}'", self.name, stage);
        let start = Instant::now();
        let result = AssertUnwindSafe(body).catch_unwind().await;
        let duration = start.elapsed();
        match result {
            Ok(Ok(())) => {
                info!(
                    "[{}] Stage '{}' passed in {:.1?}",
                    self.name, stage, duration
                );
                self.record(stage, StageOutcome::Passed, duration);
                true
            }
            Ok(Err(e)) => {
                self.fail(stage, Error::Stage(e), duration);
                false
            }
            Err(payload) => {
                self.fail(stage, Error::Panic(panic_message(payload)), duration);
                false
            }
        }
    }

    fn fail(&mut self, stage: &str, e: Error<E>, duration: Duration) {
        error!("[{}] Stage '{}' failed: {}", self.name, stage, e);
        self.state = RunState::Failed;
        self.record(stage, StageOutcome::Failed(e), duration);
    }

    fn record(&mut self, stage: &str, outcome: StageOutcome<E>, duration: Duration) {
        self.records.push(StageRecord {
            name: stage.to_string(),
            outcome,
            duration,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
