/*!

These tests drive a `Pipeline` with stage bodies that append to a shared journal so that the order
in which stages ran (or did not run) can be asserted.

!*/

use elk_test_model::{SkipStages, StageName, TestData};
use futures::FutureExt;
use stage_runner::{Error, Pipeline, RunState, StageOutcome};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push<S: Into<String>>(&self, entry: S) {
        self.0.lock().unwrap().push(entry.into())
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn skip(stages: &[&str]) -> SkipStages {
    stages
        .iter()
        .map(|stage| StageName::new(*stage).unwrap())
        .collect()
}

#[tokio::test]
async fn stages_run_in_order() {
    let journal = Journal::default();
    let mut pipeline = Pipeline::<String>::new("ordered", SkipStages::new());
    for stage in ["one", "two", "three"] {
        let journal = journal.clone();
        assert!(
            pipeline
                .run_stage(stage, async move {
                    journal.push(stage);
                    Ok(())
                })
                .await
        );
    }
    let report = pipeline.finish().await;
    assert!(report.passed());
    assert_eq!(journal.entries(), vec!["one", "two", "three"]);
    assert_eq!(report.stages().len(), 3);
}

#[tokio::test]
async fn skipped_stage_has_no_side_effects() {
    let dir = tempfile::TempDir::new().unwrap();
    let journal = Journal::default();
    let mut pipeline = Pipeline::<String>::new("skipping", skip(&["setup_ami"]));

    let data = TestData::new(dir.path());
    let ran = pipeline
        .run_stage("setup_ami", {
            let journal = journal.clone();
            let data = data.clone();
            async move {
                journal.push("setup_ami");
                data.save_string("uniqueID", "abc123")
                    .map_err(|e| e.to_string())
            }
        })
        .await;
    assert!(!ran);

    let report = pipeline.finish().await;
    assert!(report.passed());
    assert!(matches!(
        report.outcome("setup_ami"),
        Some(StageOutcome::Skipped)
    ));
    assert!(journal.entries().is_empty());
    assert!(!data.exists("uniqueID"));
}

#[tokio::test]
async fn failure_stops_regular_stages_but_not_always_run_stages() {
    let journal = Journal::default();
    let mut pipeline = Pipeline::<String>::new("failing", SkipStages::new());
    {
        let journal = journal.clone();
        pipeline.always_run("get_logs", move |state| {
            async move {
                journal.push(format!("get_logs failed={}", state.failed()));
                Ok(())
            }
            .boxed()
        });
    }
    {
        let journal = journal.clone();
        pipeline.always_run("teardown", move |_| {
            async move {
                journal.push("teardown");
                Ok(())
            }
            .boxed()
        });
    }

    pipeline
        .run_stage("deploy_to_aws", async { Err("apply failed".to_string()) })
        .await;
    let ran = pipeline
        .run_stage("validate", {
            let journal = journal.clone();
            async move {
                journal.push("validate");
                Ok(())
            }
        })
        .await;
    assert!(!ran);
    assert_eq!(pipeline.state(), RunState::Failed);

    let report = pipeline.finish().await;
    assert!(!report.passed());
    assert_eq!(journal.entries(), vec!["get_logs failed=true", "teardown"]);
    assert!(matches!(
        report.outcome("validate"),
        Some(StageOutcome::NotRun)
    ));
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "deploy_to_aws");
    assert_eq!(failures[0].1.to_string(), "apply failed");
}

#[tokio::test]
async fn panicking_stage_is_recorded_and_teardown_still_runs() {
    let journal = Journal::default();
    let mut pipeline = Pipeline::<String>::new("panicking", SkipStages::new());
    {
        let journal = journal.clone();
        pipeline.always_run("teardown", move |state| {
            async move {
                journal.push(format!("teardown failed={}", state.failed()));
                Ok(())
            }
            .boxed()
        });
    }
    pipeline
        .run_stage("validate", async {
            if journal.entries().is_empty() {
                panic!("probe exploded");
            }
            Ok(())
        })
        .await;

    let report = pipeline.finish().await;
    assert_eq!(journal.entries(), vec!["teardown failed=true"]);
    match report.outcome("validate") {
        Some(StageOutcome::Failed(Error::Panic(message))) => {
            assert_eq!(message, "probe exploded")
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn always_run_failures_do_not_block_each_other() {
    let journal = Journal::default();
    let mut pipeline = Pipeline::<String>::new("best-effort", SkipStages::new());
    pipeline.always_run("remove_secrets_manager_entries", |_| {
        async { Err("secret not found".to_string()) }.boxed()
    });
    {
        let journal = journal.clone();
        pipeline.always_run("teardown", move |state| {
            async move {
                journal.push(format!("teardown failed={}", state.failed()));
                Ok(())
            }
            .boxed()
        });
    }
    pipeline.run_stage("validate", async { Ok(()) }).await;

    let report = pipeline.finish().await;
    assert!(!report.passed());
    // The earlier always-run failure is visible to the later stages.
    assert_eq!(journal.entries(), vec!["teardown failed=true"]);
    assert!(matches!(
        report.outcome("teardown"),
        Some(StageOutcome::Passed)
    ));
}

#[tokio::test]
async fn always_run_stages_honor_skip_flags() {
    let journal = Journal::default();
    let mut pipeline = Pipeline::<String>::new("keep-infra", skip(&["teardown"]));
    {
        let journal = journal.clone();
        pipeline.always_run("teardown", move |_| {
            async move {
                journal.push("teardown");
                Ok(())
            }
            .boxed()
        });
    }
    pipeline.run_stage("deploy_to_aws", async { Ok(()) }).await;
    let report = pipeline.finish().await;
    assert!(report.passed());
    assert!(journal.entries().is_empty());
    assert!(matches!(
        report.outcome("teardown"),
        Some(StageOutcome::Skipped)
    ));
}

#[tokio::test]
async fn duplicate_stage_name_fails_the_run() {
    let mut pipeline = Pipeline::<String>::new("duplicates", SkipStages::new());
    assert!(pipeline.run_stage("validate", async { Ok(()) }).await);
    assert!(!pipeline.run_stage("validate", async { Ok(()) }).await);
    let report = pipeline.finish().await;
    assert!(!report.passed());
    let (stage, error) = report.failures().next().unwrap();
    assert_eq!(stage, "validate");
    assert!(matches!(error, Error::Pipeline(_)));
}

#[tokio::test]
async fn resumed_run_reads_what_the_first_run_persisted() {
    let dir = tempfile::TempDir::new().unwrap();

    // The first process runs the setup stage and then fails.
    let mut first = Pipeline::<String>::new("first", SkipStages::new());
    let data = TestData::new(dir.path());
    first
        .run_stage("setup", {
            let data = data.clone();
            async move {
                data.save_string("awsRegion", "eu-west-2")
                    .map_err(|e| e.to_string())
            }
        })
        .await;
    first
        .run_stage("validate", async { Err("timed out".to_string()) })
        .await;
    assert!(!first.finish().await.passed());

    // The second process skips setup and only validates.
    let region = Arc::new(Mutex::new(None));
    let mut second = Pipeline::<String>::new("second", skip(&["setup"]));
    let ran = second
        .run_stage("setup", async { Err("setup must not run".to_string()) })
        .await;
    assert!(!ran);
    second
        .run_stage("validate", {
            let region = Arc::clone(&region);
            let data = TestData::new(dir.path());
            async move {
                let loaded = data.load_string("awsRegion").map_err(|e| e.to_string())?;
                *region.lock().unwrap() = Some(loaded);
                Ok(())
            }
        })
        .await;
    assert!(second.finish().await.passed());
    assert_eq!(region.lock().unwrap().as_deref(), Some("eu-west-2"));
}
