use crate::command;
use crate::constants::STABLE_REGIONS;
use crate::error::{self, Result};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::model::InputLogEvent;
use aws_sdk_ec2::model::{Filter, LocationType};
use aws_sdk_ec2::types::Blob;
use aws_sdk_s3::model::ServerSideEncryption;
use aws_sdk_s3::types::ByteStream;
use aws_types::SdkConfig;
use elk_test_model::Ec2KeyPair;
use log::{debug, info};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use snafu::{OptionExt, ResultExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::process::Command;

/// A short random identifier (six alphanumeric characters) that keeps the names of the resources
/// of concurrent runs apart.
pub fn unique_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}

/// Picks a random region from `approved` (all [`STABLE_REGIONS`] when `None`) that is not in
/// `forbidden`.
pub fn pick_stable_region(approved: Option<&[&str]>, forbidden: &[&str]) -> Result<String> {
    let candidates: Vec<&str> = approved
        .unwrap_or(&STABLE_REGIONS)
        .iter()
        .copied()
        .filter(|region| !forbidden.contains(region))
        .collect();
    let region = candidates
        .choose(&mut rand::thread_rng())
        .context(error::NoRegionSnafu {
            forbidden: forbidden
                .iter()
                .map(|region| region.to_string())
                .collect::<Vec<_>>(),
        })?;
    info!("Using region '{}'", region);
    Ok(region.to_string())
}

/// The first of `candidates` that `offerings` (instance type to the zones offering it) lists for
/// every zone in `zones`.
pub fn first_offered_everywhere(
    candidates: &[&str],
    zones: &BTreeSet<String>,
    offerings: &BTreeMap<String, BTreeSet<String>>,
) -> Option<String> {
    candidates
        .iter()
        .find(|candidate| {
            offerings
                .get(**candidate)
                .map(|offered_in| zones.is_subset(offered_in))
                .unwrap_or(false)
        })
        .map(|candidate| candidate.to_string())
}

/// The AWS calls the scenarios make outside of Terraform.
#[async_trait]
pub trait CloudServices: Send + Sync {
    /// The first of `candidates` offered in every availability zone of `region`.
    async fn recommended_instance_type(&self, region: &str, candidates: &[&str])
        -> Result<String>;

    /// Generates an RSA key pair in `dir` and imports its public half into EC2 as `name`.
    async fn create_key_pair(&self, region: &str, name: &str, dir: &Path) -> Result<Ec2KeyPair>;

    async fn delete_key_pair(&self, key_pair: &Ec2KeyPair) -> Result<()>;

    /// Stores `value` as a secret string encrypted with the default key. Returns the secret ARN.
    async fn create_secret(
        &self,
        region: &str,
        name: &str,
        description: &str,
        value: &str,
    ) -> Result<String>;

    /// Deletes a secret without a recovery window.
    async fn delete_secret(&self, region: &str, arn: &str) -> Result<()>;

    /// Appends `message` to the first log stream of `log_group`.
    async fn put_log_event(&self, region: &str, log_group: &str, message: &str) -> Result<()>;

    /// Uploads `content` under a random key and returns the key.
    async fn put_s3_object(&self, region: &str, bucket: &str, content: &str) -> Result<String>;

    async fn delete_s3_object(&self, region: &str, bucket: &str, key: &str) -> Result<()>;
}

/// Finds the public IP addresses of deployed instances.
#[async_trait]
pub trait InstanceLocator: Send + Sync {
    /// The public IP of the first instance in the auto scaling group `group`.
    async fn first_instance_ip(&self, region: &str, group: &str) -> Result<String>;

    async fn instance_ip(&self, region: &str, instance_id: &str) -> Result<String>;
}

/// The AWS SDK backed [`CloudServices`] and [`InstanceLocator`]. Credentials come from the default
/// provider chain, which includes the credentials [`Toolbox::production`] exports for an assumed
/// role.
///
/// [`Toolbox::production`]: crate::scenario::Toolbox::production
#[derive(Debug, Clone, Default)]
pub struct AwsCloud;

impl AwsCloud {
    async fn config(&self, region: &str) -> Result<SdkConfig> {
        agent_utils::aws::aws_config(&Some(region.to_string()), &None, &None, false)
            .await
            .context(error::AwsConfigSnafu { region })
    }

    async fn ec2(&self, region: &str) -> Result<aws_sdk_ec2::Client> {
        Ok(aws_sdk_ec2::Client::new(&self.config(region).await?))
    }
}

#[async_trait]
impl CloudServices for AwsCloud {
    async fn recommended_instance_type(
        &self,
        region: &str,
        candidates: &[&str],
    ) -> Result<String> {
        let ec2 = self.ec2(region).await?;
        let zones: BTreeSet<String> = ec2
            .describe_availability_zones()
            .send()
            .await
            .context(error::DescribeAvailabilityZonesSnafu { region })?
            .availability_zones()
            .unwrap_or_default()
            .iter()
            .filter_map(|zone| zone.zone_name().map(str::to_string))
            .collect();

        let mut offerings = BTreeMap::new();
        for candidate in candidates {
            let offered_in: BTreeSet<String> = ec2
                .describe_instance_type_offerings()
                .location_type(LocationType::AvailabilityZone)
                .filters(
                    Filter::builder()
                        .name("instance-type")
                        .values(*candidate)
                        .build(),
                )
                .send()
                .await
                .context(error::DescribeInstanceTypeOfferingsSnafu {
                    instance_type: *candidate,
                    region,
                })?
                .instance_type_offerings()
                .unwrap_or_default()
                .iter()
                .filter_map(|offering| offering.location().map(str::to_string))
                .collect();
            debug!("'{}' is offered in {:?}", candidate, offered_in);
            offerings.insert(candidate.to_string(), offered_in);
        }

        let instance_type = first_offered_everywhere(candidates, &zones, &offerings).context(
            error::NoInstanceTypeSnafu {
                region,
                candidates: candidates
                    .iter()
                    .map(|candidate| candidate.to_string())
                    .collect::<Vec<_>>(),
            },
        )?;
        info!("Using instance type '{}' in '{}'", instance_type, region);
        Ok(instance_type)
    }

    async fn create_key_pair(&self, region: &str, name: &str, dir: &Path) -> Result<Ec2KeyPair> {
        tokio::fs::create_dir_all(dir)
            .await
            .context(error::CreateDirSnafu { path: dir })?;
        let private_key_path = dir.join(format!("{}.pem", name));
        let public_key_path = dir.join(format!("{}.pem.pub", name));
        for path in [&private_key_path, &public_key_path] {
            match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(e).context(error::RemoveFileSnafu { path });
                }
                _ => {}
            }
        }
        command::run(
            Command::new("ssh-keygen")
                .args(["-t", "rsa", "-b", "4096", "-m", "PEM", "-N", "", "-q"])
                .arg("-f")
                .arg(&private_key_path),
        )
        .await?;
        let public_key = tokio::fs::read_to_string(&public_key_path)
            .await
            .context(error::ReadFileSnafu {
                path: &public_key_path,
            })?;

        info!("Importing key pair '{}' into '{}'", name, region);
        self.ec2(region)
            .await?
            .import_key_pair()
            .key_name(name)
            .public_key_material(Blob::new(public_key.trim().as_bytes()))
            .send()
            .await
            .context(error::CreateKeyPairSnafu { name, region })?;
        Ok(Ec2KeyPair {
            name: name.to_string(),
            region: region.to_string(),
            public_key: public_key.trim().to_string(),
            private_key_path,
        })
    }

    async fn delete_key_pair(&self, key_pair: &Ec2KeyPair) -> Result<()> {
        info!(
            "Deleting key pair '{}' from '{}'",
            key_pair.name, key_pair.region
        );
        self.ec2(&key_pair.region)
            .await?
            .delete_key_pair()
            .key_name(&key_pair.name)
            .send()
            .await
            .context(error::DeleteKeyPairSnafu {
                name: &key_pair.name,
            })?;
        Ok(())
    }

    async fn create_secret(
        &self,
        region: &str,
        name: &str,
        description: &str,
        value: &str,
    ) -> Result<String> {
        info!("Creating secret '{}' in '{}'", name, region);
        let output = aws_sdk_secretsmanager::Client::new(&self.config(region).await?)
            .create_secret()
            .name(name)
            .description(description)
            .secret_string(value)
            .send()
            .await
            .context(error::CreateSecretSnafu { name })?;
        output
            .arn()
            .map(str::to_string)
            .context(error::MissingSnafu {
                what: "arn",
                from: format!("the response for secret '{}'", name),
            })
    }

    async fn delete_secret(&self, region: &str, arn: &str) -> Result<()> {
        info!("Deleting secret '{}'", arn);
        aws_sdk_secretsmanager::Client::new(&self.config(region).await?)
            .delete_secret()
            .secret_id(arn)
            .force_delete_without_recovery(true)
            .send()
            .await
            .context(error::DeleteSecretSnafu { arn })?;
        Ok(())
    }

    async fn put_log_event(&self, region: &str, log_group: &str, message: &str) -> Result<()> {
        let logs = aws_sdk_cloudwatchlogs::Client::new(&self.config(region).await?);
        let streams = logs
            .describe_log_streams()
            .log_group_name(log_group)
            .send()
            .await
            .context(error::DescribeLogStreamsSnafu { log_group })?;
        let stream = streams
            .log_streams()
            .and_then(|streams| streams.first())
            .context(error::MissingSnafu {
                what: "log stream",
                from: format!("log group '{}'", log_group),
            })?;
        let stream_name = stream.log_stream_name().context(error::MissingSnafu {
            what: "log stream name",
            from: format!("log group '{}'", log_group),
        })?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis() as i64)
            .unwrap_or_default();

        info!("Writing '{}' to '{}/{}'", message, log_group, stream_name);
        logs.put_log_events()
            .log_group_name(log_group)
            .log_stream_name(stream_name)
            .set_sequence_token(stream.upload_sequence_token().map(str::to_string))
            .log_events(
                InputLogEvent::builder()
                    .message(message)
                    .timestamp(timestamp)
                    .build(),
            )
            .send()
            .await
            .context(error::PutLogEventsSnafu { log_group })?;
        Ok(())
    }

    async fn put_s3_object(&self, region: &str, bucket: &str, content: &str) -> Result<String> {
        let key = uuid::Uuid::new_v4().to_string();
        info!("Writing '{}' to 's3://{}/{}'", content, bucket, key);
        aws_sdk_s3::Client::new(&self.config(region).await?)
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .content_type("text/plain")
            .content_disposition("attachment")
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await
            .context(error::PutObjectSnafu { bucket, key: &key })?;
        Ok(key)
    }

    async fn delete_s3_object(&self, region: &str, bucket: &str, key: &str) -> Result<()> {
        info!("Deleting 's3://{}/{}'", bucket, key);
        aws_sdk_s3::Client::new(&self.config(region).await?)
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(error::DeleteObjectSnafu { bucket, key })?;
        Ok(())
    }
}

#[async_trait]
impl InstanceLocator for AwsCloud {
    async fn first_instance_ip(&self, region: &str, group: &str) -> Result<String> {
        let config = self.config(region).await?;
        let groups = aws_sdk_autoscaling::Client::new(&config)
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(group)
            .send()
            .await
            .context(error::DescribeAutoScalingGroupSnafu { name: group })?;
        let instance_id = groups
            .auto_scaling_groups()
            .and_then(|groups| groups.first())
            .and_then(|group| group.instances())
            .and_then(|instances| instances.first())
            .and_then(|instance| instance.instance_id())
            .context(error::NoInstancesSnafu { name: group })?
            .to_string();
        self.instance_ip(region, &instance_id).await
    }

    async fn instance_ip(&self, region: &str, instance_id: &str) -> Result<String> {
        let reservations = self
            .ec2(region)
            .await?
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context(error::DescribeInstanceSnafu { instance_id })?;
        reservations
            .reservations()
            .unwrap_or_default()
            .iter()
            .flat_map(|reservation| reservation.instances().unwrap_or_default())
            .find_map(|instance| instance.public_ip_address())
            .map(str::to_string)
            .context(error::NoPublicIpSnafu { instance_id })
    }
}
