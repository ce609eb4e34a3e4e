/*!

A run that skips its early stages picks up the deployment an earlier process persisted in the
stable working directory and goes straight to validation.

!*/

mod common;

use common::{toolbox, FakeInfra, HttpServer};
use elk_agents::constants::stage;
use elk_agents::scenario::{Case, ElasticsearchCase, Settings};
use elk_test_model::constants::DEPLOYMENT_CONFIG;
use elk_test_model::{
    DeploymentConfig, DeploymentVars, ElasticsearchOnlyVars, SingleClusterVars, SkipStages,
    StageName, TestData,
};
use stage_runner::StageOutcome;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CASE: &str = "TestElasticsearchUbuntu2004";

fn skip(stages: &[&str]) -> SkipStages {
    stages
        .iter()
        .map(|stage| StageName::new(*stage).unwrap())
        .collect()
}

fn repo() -> TempDir {
    let repo = TempDir::new().unwrap();
    std::fs::create_dir_all(repo.path().join("examples/elasticsearch-only-cluster")).unwrap();
    repo
}

fn persist_deployment(work_root: &Path) -> DeploymentConfig {
    let run_dir = work_root.join(CASE);
    let config = DeploymentConfig::new(
        run_dir.join("examples/elasticsearch-only-cluster"),
        DeploymentVars::ElasticsearchOnly(ElasticsearchOnlyVars {
            aws_region: "us-east-2".to_string(),
            ami_id: "ami-0123".to_string(),
            instance_type: "t3.large".to_string(),
            cluster_name: "es-cluster-abc123".to_string(),
            key_name: "abc123".to_string(),
            route53_zone_name: "gruntwork.in".to_string(),
            tls: None,
        }),
    );
    TestData::new(&run_dir)
        .save(DEPLOYMENT_CONFIG, &config)
        .unwrap();
    config
}

fn case(port: u16) -> Case {
    Case::Elasticsearch(ElasticsearchCase {
        name: CASE.to_string(),
        builder: "elasticsearch-ami-ubuntu-20".to_string(),
        use_ssl: false,
        port,
    })
}

#[tokio::test]
async fn validate_resumes_from_persisted_deployment() {
    let repo = repo();
    let work = TempDir::new().unwrap();
    let config = persist_deployment(work.path());
    let server = HttpServer::start(|_| {
        (
            200,
            r#"{"name":"node-1","cluster_name" : "es-cluster-abc123"}"#.to_string(),
        )
    })
    .await;
    let infra = Arc::new(FakeInfra::with_outputs(
        r#"{"lb_dns_name":{"value":"127.0.0.1","type":"string","sensitive":false}}"#,
    ));

    let mut settings = Settings::new(repo.path());
    settings.work_root = Some(work.path().to_path_buf());
    settings.skip = skip(&[
        stage::GENERATE_SSL_CERTS,
        stage::SETUP_AMI,
        stage::DEPLOY,
        stage::GET_LOGS,
    ]);

    let report = case(server.port)
        .run(&settings, &toolbox(Arc::clone(&infra)))
        .await
        .unwrap();

    assert!(report.passed(), "{}", report);
    assert!(matches!(
        report.outcome(stage::SETUP_AMI),
        Some(StageOutcome::Skipped)
    ));
    assert!(matches!(
        report.outcome(stage::VALIDATE),
        Some(StageOutcome::Passed)
    ));
    assert!(matches!(
        report.outcome(stage::TEARDOWN),
        Some(StageOutcome::Passed)
    ));
    assert_eq!(server.hits(), 1);
    assert_eq!(infra.destroyed(), vec![config.terraform_dir]);
    // The stable directory outlives the run.
    assert!(work.path().join(CASE).join("examples").is_dir());
}

#[tokio::test]
async fn failed_deploy_is_still_torn_down() {
    let repo = repo();
    let work = TempDir::new().unwrap();
    let config = persist_deployment(work.path());
    let infra = Arc::new(FakeInfra {
        fail_apply: true,
        ..Default::default()
    });

    let mut settings = Settings::new(repo.path());
    settings.work_root = Some(work.path().to_path_buf());
    settings.skip = skip(&[stage::GENERATE_SSL_CERTS, stage::SETUP_AMI, stage::GET_LOGS]);

    let report = case(9200)
        .run(&settings, &toolbox(Arc::clone(&infra)))
        .await
        .unwrap();

    assert!(!report.passed());
    assert!(matches!(
        report.outcome(stage::DEPLOY),
        Some(StageOutcome::Failed(_))
    ));
    assert!(matches!(
        report.outcome(stage::VALIDATE),
        Some(StageOutcome::NotRun)
    ));
    assert_eq!(infra.destroyed(), vec![config.terraform_dir]);
}

#[tokio::test]
async fn missing_persisted_state_fails_the_stage_that_needs_it() {
    let repo = repo();
    let work = TempDir::new().unwrap();
    let infra = Arc::new(FakeInfra::default());

    let mut settings = Settings::new(repo.path());
    settings.work_root = Some(work.path().to_path_buf());
    settings.skip = skip(&[
        stage::GENERATE_SSL_CERTS,
        stage::SETUP_AMI,
        stage::DEPLOY,
        stage::GET_LOGS,
        stage::TEARDOWN,
    ]);

    let report = case(9200)
        .run(&settings, &toolbox(Arc::clone(&infra)))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome(stage::VALIDATE),
        Some(StageOutcome::Failed(_))
    ));
    assert!(matches!(
        report.outcome(stage::TEARDOWN),
        Some(StageOutcome::Skipped)
    ));
    assert!(infra.destroyed().is_empty());
}

#[tokio::test]
async fn deployment_of_another_kind_is_not_validated() {
    let repo = repo();
    let work = TempDir::new().unwrap();
    let run_dir = work.path().join(CASE);
    let config = DeploymentConfig::new(
        run_dir.join("examples/elk-single-cluster"),
        DeploymentVars::SingleCluster(SingleClusterVars {
            aws_region: "us-east-2".to_string(),
            ami_id: "ami-0123".to_string(),
            elk_cluster_name: "es-abc123".to_string(),
            filebeat_log_path: "/var/log/source.log".to_string(),
            key_name: "abc123".to_string(),
            alb_name: "alb-abc123".to_string(),
        }),
    );
    TestData::new(&run_dir)
        .save(DEPLOYMENT_CONFIG, &config)
        .unwrap();
    let server = HttpServer::start(|_| (200, r#"{"cluster_name" : ""}"#.to_string())).await;
    let infra = Arc::new(FakeInfra::with_outputs(
        r#"{"lb_dns_name":{"value":"127.0.0.1","type":"string","sensitive":false}}"#,
    ));

    let mut settings = Settings::new(repo.path());
    settings.work_root = Some(work.path().to_path_buf());
    settings.skip = skip(&[
        stage::GENERATE_SSL_CERTS,
        stage::SETUP_AMI,
        stage::DEPLOY,
        stage::GET_LOGS,
        stage::TEARDOWN,
    ]);

    let report = case(server.port)
        .run(&settings, &toolbox(Arc::clone(&infra)))
        .await
        .unwrap();

    match report.outcome(stage::VALIDATE) {
        Some(StageOutcome::Failed(e)) => {
            assert!(e.to_string().contains("cluster name"), "{}", e)
        }
        other => panic!("validate should fail, got {:?}", other),
    }
    assert_eq!(server.hits(), 0);
}
