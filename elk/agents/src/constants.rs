use std::time::Duration;

/// The user that the ELK images create for SSH access.
pub const SSH_USER: &str = "ubuntu";
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The repository that contains `generate-key-stores.sh`.
pub const KEYSTORE_SCRIPT_REPO: &str = "https://github.com/gruntwork-io/package-kafka.git";
/// The path of the key store generation script relative to the root of [`KEYSTORE_SCRIPT_REPO`].
pub const KEYSTORE_SCRIPT_PATH: &str = "modules/generate-key-stores/generate-key-stores.sh";
/// The directory, relative to the working directory, that the script repository is cloned into.
pub const KEYSTORE_SCRIPT_DIR: &str = "generate-keystore";
/// The password of every key store and trust store generated for a run.
pub const STORE_PASSWORD: &str = "password";
pub const CERT_ALIAS: &str = "localhost";

/// Basic auth user for Elasticsearch and Kibana when SSL is enabled.
pub const KIBANA_USER: &str = "kibana";

/// The file that Filebeat watches on the app server.
pub const FILEBEAT_LOG_PATH: &str = "/var/log/source.log";
/// The file the Logstash file output plugin writes to.
pub const LOGSTASH_OUTPUT_PATH: &str = "/var/log/destination.log";

/// The remote directory and file name filters used to snapshot logs from a failed run.
pub const REMOTE_LOG_DIR: &str = "/var/log";
pub const LOG_FILE_FILTERS: [&str; 4] = ["syslog", "user-data*", "es-cluster*", "logstash*"];

/// Regions that have an ACM certificate for the default hosted zone.
pub const STABLE_REGIONS: [&str; 6] = [
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
];

pub const DEFAULT_ZONE_NAME: &str = "gruntwork.in";
pub const DEFAULT_ZONE_ID: &str = "Z2AJ7S3R6G9UYJ";

pub const LARGE_INSTANCE_TYPES: [&str; 2] = ["t2.large", "t3.large"];
pub const SMALL_INSTANCE_TYPES: [&str; 2] = ["t2.small", "t3.small"];

/// Packer templates fetch private modules with this token.
pub const ENV_GITHUB_OAUTH_TOKEN: &str = "GITHUB_OAUTH_TOKEN";

pub const ELASTICSEARCH_PORT: u16 = 9200;
pub const KIBANA_UI_PORT: u16 = 5601;

/// The names of the stages shared by the scenarios.
pub mod stage {
    pub const CREATE_SECRETS: &str = "create_secrets_manager_entries";
    pub const REMOVE_SECRETS: &str = "remove_secrets_manager_entries";
    pub const GENERATE_SSL_CERTS: &str = "generate_ssl_certs";
    pub const SETUP_AMI: &str = "setup_ami";
    pub const DEPLOY: &str = "deploy_to_aws";
    pub const VALIDATE: &str = "validate";
    pub const VALIDATE_COLLECTD: &str = "validate_collectd";
    pub const VALIDATE_CLOUDWATCH: &str = "validate_cloudwatch";
    pub const VALIDATE_CLOUDTRAIL: &str = "validate_cloudtrail";
    pub const VALIDATE_KIBANA: &str = "validate_kibana";
    pub const GET_LOGS: &str = "get_logs";
    pub const TEARDOWN: &str = "teardown";
    pub const BUILD_IMAGE: &str = "build_docker_image";
    pub const COMPOSE_UP: &str = "compose_up";
    pub const COMPOSE_LOGS: &str = "compose_logs";
    pub const COMPOSE_DOWN: &str = "compose_down";
}
