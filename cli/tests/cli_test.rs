use assert_cmd::Command;

fn elk_test() -> Command {
    let mut cmd = Command::cargo_bin("elk-test").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("ELK_TEST_SKIP_STAGES")
        .env_remove("ELK_TEST_WORK_DIR");
    cmd
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn stages_lists_every_scenario() {
    let output = elk_test().arg("stages").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for scenario in ["end-to-end", "all-in-one", "elasticsearch", "docker"] {
        assert!(stdout.contains(scenario), "{}", stdout);
    }
    assert!(stdout.contains("deploy_to_aws"));
    assert!(stdout.contains("TestElkUbuntu2004SSL"));
}

#[test]
fn stages_as_json() {
    let output = elk_test()
        .args(["stages", "docker", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"name\": \"docker\""), "{}", stdout);
    assert!(stdout.contains("\"compose_down\""));
    assert!(!stdout.contains("end-to-end"));
}

#[test]
fn unknown_scenario_is_rejected() {
    elk_test().args(["stages", "kafka"]).assert().failure();
}

#[test]
fn unknown_skipped_stage_is_rejected() {
    let output = elk_test()
        .args(["docker", "--skip", "create_secrets_manager_entries"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown stage"), "{}", stderr(&output));
}

#[test]
fn skip_env_is_validated_too() {
    let output = elk_test()
        .env("ELK_TEST_SKIP_STAGES", "setup_ami,not_a_stage")
        .arg("elasticsearch")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not_a_stage"), "{}", stderr(&output));
}

#[test]
fn unknown_case_is_rejected() {
    let output = elk_test()
        .args(["all-in-one", "--case", "elk-aio-ami-ubuntu-16"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No test case"), "{}", stderr(&output));
}

#[test]
fn end_to_end_needs_a_github_token() {
    let output = elk_test()
        .env_remove("GITHUB_OAUTH_TOKEN")
        .arg("end-to-end")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("GITHUB_OAUTH_TOKEN"),
        "{}",
        stderr(&output)
    );
}
