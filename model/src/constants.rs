/// Helper macro to avoid retyping the directory that holds persisted test data when creating
/// further path constants from it. When given no parameters, this returns the directory name.
/// When given a string literal parameter it adds `/parameter` to the end.
macro_rules! test_data {
    () => {
        ".test-data"
    };
    ($s:literal) => {
        concat!(test_data!(), "/", $s)
    };
}

/// The directory, relative to a run's working directory, where `TestData` is written.
pub const TEST_DATA_DIR: &str = test_data!();

// Names of persisted values. Each is stored as `<name>.json` in `TEST_DATA_DIR`.
pub const AWS_REGION: &str = "awsRegion";
pub const CERT_INFO: &str = "CERT";
pub const DEPLOYMENT_CONFIG: &str = "DeploymentConfig";
pub const EC2_KEY_PAIR: &str = "Ec2KeyPair";
pub const KIBANA_PASS: &str = "kibanaPass";
pub const KIBANA_PASS_SECRET_ARN: &str = "kibanaPassSecretsManagerARN";
pub const LOGSTASH_PASS_SECRET_ARN: &str = "logstashPassSecretsManagerARN";
pub const UNIQUE_ID: &str = "uniqueID";
pub const URL_INFO: &str = "URL";

/// The file that a deployment's variables are rendered to inside its Terraform directory.
pub const TFVARS_FILE: &str = "elk-test.auto.tfvars.json";

/// The environment variable holding a comma-separated list of stage names to skip.
pub const ENV_SKIP_STAGES: &str = "ELK_TEST_SKIP_STAGES";

#[test]
fn test_data_macro_test() {
    assert_eq!(".test-data", test_data!());
    assert_eq!(".test-data/CERT.json", test_data!("CERT.json"));
}
