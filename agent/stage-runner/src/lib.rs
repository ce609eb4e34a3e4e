/*!

The `stage-runner` library runs a test as a sequence of named stages.

Any stage can be skipped by name, which is how a test that failed half way is resumed: every stage
reads what it needs from the `TestData` persisted by earlier stages, so the stages that already
passed are skipped and the rest run as if nothing happened in between. Teardown and log collection
are registered as always-run stages and execute last, after both passing and failing runs.

```
# use stage_runner::{Pipeline, RunState, SkipStages};
# use futures::FutureExt;
# async fn example() {
let mut pipeline = Pipeline::<String>::new("example", SkipStages::new());
pipeline.always_run("teardown", |state: RunState| {
    async move {
        println!("tearing down, failed: {}", state.failed());
        Ok(())
    }
    .boxed()
});
pipeline.run_stage("deploy", async { Ok(()) }).await;
let report = pipeline.finish().await;
assert!(report.passed());
# }
```

!*/

mod error;
mod pipeline;
mod report;

pub use elk_test_model::{SkipStages, StageName};
pub use error::{Error, PipelineError};
pub use pipeline::{Pipeline, RunState};
pub use report::{RunReport, StageOutcome, StageRecord};
