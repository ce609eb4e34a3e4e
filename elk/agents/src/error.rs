use aws_sdk_autoscaling::error::DescribeAutoScalingGroupsError;
use aws_sdk_cloudwatchlogs::error::{DescribeLogStreamsError, PutLogEventsError};
use aws_sdk_ec2::error::{
    DeleteKeyPairError, DescribeAvailabilityZonesError, DescribeInstanceTypeOfferingsError,
    DescribeInstancesError, ImportKeyPairError,
};
use aws_sdk_ec2::types::SdkError;
use aws_sdk_s3::error::{DeleteObjectError, PutObjectError};
use aws_sdk_secretsmanager::error::{CreateSecretError, DeleteSecretError};
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to assume role '{}': {}", role_arn, source))]
    AssumeRole {
        role_arn: String,
        source: agent_utils::Error,
    },

    #[snafu(display("Unable to load the aws config for region '{}': {}", region, source))]
    AwsConfig {
        region: String,
        source: agent_utils::Error,
    },

    #[snafu(display("Failed to read CA file '{}': {}", path.display(), source))]
    CaFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid CA certificate in '{}': {}", path.display(), source))]
    CaCertificate {
        path: PathBuf,
        source: reqwest::Error,
    },

    #[snafu(display("{}", source))]
    Command { source: agent_utils::Error },

    #[snafu(display("Failed to copy '{}' to '{}': {}", from.display(), to.display(), source))]
    CopyDir {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to create directory '{}': {}", path.display(), source))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to create key pair '{}' in '{}': {}", name, region, source))]
    CreateKeyPair {
        name: String,
        region: String,
        source: SdkError<ImportKeyPairError>,
    },

    #[snafu(display("Unable to create secret '{}': {}", name, source))]
    CreateSecret {
        name: String,
        source: SdkError<CreateSecretError>,
    },

    #[snafu(display("Unable to delete key pair '{}': {}", name, source))]
    DeleteKeyPair {
        name: String,
        source: SdkError<DeleteKeyPairError>,
    },

    #[snafu(display("Unable to delete 's3://{}/{}': {}", bucket, key, source))]
    DeleteObject {
        bucket: String,
        key: String,
        source: SdkError<DeleteObjectError>,
    },

    #[snafu(display("Unable to delete secret '{}': {}", arn, source))]
    DeleteSecret {
        arn: String,
        source: SdkError<DeleteSecretError>,
    },

    #[snafu(display("Unable to describe auto scaling group '{}': {}", name, source))]
    DescribeAutoScalingGroup {
        name: String,
        source: SdkError<DescribeAutoScalingGroupsError>,
    },

    #[snafu(display("Unable to describe availability zones in '{}': {}", region, source))]
    DescribeAvailabilityZones {
        region: String,
        source: SdkError<DescribeAvailabilityZonesError>,
    },

    #[snafu(display("Unable to describe instance '{}': {}", instance_id, source))]
    DescribeInstance {
        instance_id: String,
        source: SdkError<DescribeInstancesError>,
    },

    #[snafu(display(
        "Unable to describe offerings of '{}' in '{}': {}",
        instance_type,
        region,
        source
    ))]
    DescribeInstanceTypeOfferings {
        instance_type: String,
        region: String,
        source: SdkError<DescribeInstanceTypeOfferingsError>,
    },

    #[snafu(display("Unable to describe log streams of '{}': {}", log_group, source))]
    DescribeLogStreams {
        log_group: String,
        source: SdkError<DescribeLogStreamsError>,
    },

    #[snafu(display("Environment variable '{}' must be set: {}", name, reason))]
    EnvMissing { name: String, reason: String },

    #[snafu(display(
        "{} did not succeed after {} attempts, last error: {}",
        description,
        attempts,
        last_error
    ))]
    Exhausted {
        description: String,
        attempts: u32,
        last_error: String,
    },

    #[snafu(display("Failed to build HTTP client: {}", source))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("Request to '{}' failed: {}", url, source))]
    HttpRequest { url: String, source: reqwest::Error },

    #[snafu(display("One or more image builds failed: {}", results))]
    ImageBuilds { results: String },

    #[snafu(display("Invalid address '{}': {}", address, source))]
    InvalidAddress {
        address: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' resolved to no addresses", address))]
    UnresolvedAddress { address: String },

    #[snafu(display("Packer did not report an image id for '{}'", builder))]
    MissingArtifact { builder: String },

    #[snafu(display("'{}' was missing from {}", what, from))]
    Missing { what: String, from: String },

    #[snafu(display("Auto scaling group '{}' has no instances", name))]
    NoInstances { name: String },

    #[snafu(display("Instance '{}' has no public IP address", instance_id))]
    NoPublicIp { instance_id: String },

    #[snafu(display(
        "None of the instance types {:?} is offered in every availability zone of '{}'",
        candidates,
        region
    ))]
    NoInstanceType {
        region: String,
        candidates: Vec<String>,
    },

    #[snafu(display("No region left to choose from after applying {:?}", forbidden))]
    NoRegion { forbidden: Vec<String> },

    #[snafu(display("Terraform output '{}' is empty", name))]
    EmptyOutput { name: String },

    #[snafu(display("Terraform output '{}' is not a {}", name, expected))]
    OutputType { name: String, expected: String },

    #[snafu(display("Unable to parse terraform outputs: {}", source))]
    ParseOutputs { source: serde_json::Error },

    #[snafu(display("Failed to create '{}' process: {}", what, source))]
    Process {
        what: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to write log event to '{}': {}", log_group, source))]
    PutLogEvents {
        log_group: String,
        source: SdkError<PutLogEventsError>,
    },

    #[snafu(display("Unable to write 's3://{}/{}': {}", bucket, key, source))]
    PutObject {
        bucket: String,
        key: String,
        source: SdkError<PutObjectError>,
    },

    #[snafu(display("Failed to read '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "'{}' on '{}' failed with exit code {}\nstderr:\n{}",
        command,
        host,
        code,
        stderr
    ))]
    RemoteCommand {
        host: String,
        command: String,
        code: i32,
        stderr: String,
    },

    #[snafu(display("Remote file '{}' on '{}' {}", path, host, problem))]
    RemoteLog {
        host: String,
        path: String,
        problem: String,
    },

    #[snafu(display("Unable to serialize the variables for '{}': {}", path.display(), source))]
    SerializeVars {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to remove '{}': {}", path.display(), source))]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to run '{}' on '{}': {}", command, host, source))]
    Ssh {
        host: String,
        command: String,
        source: openssh::Error,
    },

    #[snafu(display("Unable to connect to '{}': {}", host, source))]
    SshConnect {
        host: String,
        source: openssh::Error,
    },

    #[snafu(display("Failed to connect to '{}': {}", address, source))]
    TcpConnect {
        address: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to create a temporary directory: {}", source))]
    TempDir { source: std::io::Error },

    #[snafu(display("{}", source))]
    TestData { source: elk_test_model::Error },

    #[snafu(display(
        "'{}' returned status {} and a body without '{}':\n{}",
        url,
        status,
        expected,
        body
    ))]
    UnexpectedResponse {
        url: String,
        status: u16,
        expected: String,
        body: String,
    },

    #[snafu(display("Failed to write '{}': {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<elk_test_model::Error> for Error {
    fn from(source: elk_test_model::Error) -> Self {
        Error::TestData { source }
    }
}
