use super::{
    check_logstash_output, deploy, first_of, load_deployment, load_key_pair, teardown,
    validate_cloudtrail, validate_cloudwatch, CaseReport, Settings, Toolbox,
};
use crate::aws::{pick_stable_region, unique_id};
use crate::constants::{stage, ELASTICSEARCH_PORT, FILEBEAT_LOG_PATH, SMALL_INSTANCE_TYPES};
use crate::context::TestContext;
use crate::error::Result;
use crate::packer::ImageRequest;
use crate::probe::{http_get_until, RetryPolicy};
use crate::remote::{write_app_server_log, RemoteHost};
use elk_test_model::constants::{AWS_REGION, DEPLOYMENT_CONFIG, EC2_KEY_PAIR};
use elk_test_model::{DeploymentConfig, DeploymentVars, SingleClusterVars, TestData};
use futures::FutureExt;
use log::info;
use stage_runner::Pipeline;

const TERRAFORM_DIR: &str = "elk-single-cluster";
const TEMPLATE: &str = "elk-amis/all-in-one/all-in-one.json";
/// Regions the all-in-one image cannot be built in.
const FORBIDDEN_REGIONS: [&str; 2] = ["ap-southeast-1", "sa-east-1"];

/// Elasticsearch, Logstash and Kibana on a single image, behind a load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllInOneCase {
    pub name: String,
    /// The Packer builder of the all-in-one template.
    pub builder: String,
}

impl AllInOneCase {
    pub fn all() -> Vec<Self> {
        ["elk-aio-ami-ubuntu-20", "elk-aio-ami-ubuntu-18"]
            .into_iter()
            .map(|builder| Self {
                name: builder.to_string(),
                builder: builder.to_string(),
            })
            .collect()
    }

    pub(super) async fn run(&self, settings: &Settings, tools: &Toolbox) -> Result<CaseReport> {
        let context = settings.context(&self.name)?;
        let data = context.data();
        let mut pipeline = Pipeline::new(&self.name, settings.skip.clone());

        {
            let data = data.clone();
            pipeline.always_run(stage::TEARDOWN, move |_| {
                async move { teardown(tools, &data).await }.boxed()
            });
        }

        pipeline
            .run_stage(stage::SETUP_AMI, self.setup_ami(tools, settings, &context))
            .await;
        pipeline.run_stage(stage::DEPLOY, deploy(tools, &data)).await;
        pipeline
            .run_stage(stage::VALIDATE, validate(tools, settings, &data))
            .await;
        pipeline
            .run_stage(stage::VALIDATE_COLLECTD, validate_collectd(tools, &data))
            .await;
        pipeline
            .run_stage(
                stage::VALIDATE_CLOUDWATCH,
                validate_cloudwatch(tools, &data, "server_asg_names"),
            )
            .await;
        pipeline
            .run_stage(
                stage::VALIDATE_CLOUDTRAIL,
                validate_cloudtrail(tools, &data, "server_asg_names"),
            )
            .await;
        pipeline
            .run_stage(stage::VALIDATE_KIBANA, validate_kibana(tools, &data))
            .await;

        let report = pipeline.finish().await;
        context.finish();
        Ok(report)
    }

    /// Builds the all-in-one image, creates the key pair and saves the deployment configuration.
    async fn setup_ami(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        context: &TestContext,
    ) -> Result<()> {
        let data = context.data();
        let region = match &settings.region {
            Some(region) => region.clone(),
            None => pick_stable_region(None, &FORBIDDEN_REGIONS)?,
        };
        data.save_string(AWS_REGION, &region)?;
        let branch = settings.branch().await?;
        let instance_type = tools
            .cloud
            .recommended_instance_type(&region, &SMALL_INSTANCE_TYPES)
            .await?;

        let request = ImageRequest {
            template: context.examples_dir().join(TEMPLATE),
            builder: self.builder.clone(),
            region: region.clone(),
            instance_type,
            use_ssl: false,
            branch,
        };
        let ami_id = tools.images.build_image(&request).await?;
        info!("[{}] Built '{}'", self.name, ami_id);

        let id = unique_id().to_lowercase();
        let key_pair = tools.cloud.create_key_pair(&region, &id, data.dir()).await?;
        data.save(EC2_KEY_PAIR, &key_pair)?;

        let vars = SingleClusterVars {
            aws_region: region,
            ami_id,
            elk_cluster_name: format!("es-{}", id),
            filebeat_log_path: FILEBEAT_LOG_PATH.to_string(),
            key_name: key_pair.name,
            alb_name: format!("alb-{}", id),
        };
        data.save(
            DEPLOYMENT_CONFIG,
            &DeploymentConfig::new(
                context.examples_dir().join(TERRAFORM_DIR),
                DeploymentVars::SingleCluster(vars),
            ),
        )?;
        Ok(())
    }
}

/// The IP of the first instance of the cluster, which also acts as the app server.
async fn server_ip(tools: &Toolbox, data: &TestData) -> Result<String> {
    let config = load_deployment(data)?;
    let outputs = tools.infra.outputs(&config).await?;
    let group = first_of(&outputs, "server_asg_names")?;
    tools
        .instances
        .first_instance_ip(config.vars.region(), &group)
        .await
}

/// Writes a unique line to the Filebeat input of the server and searches for it.
async fn validate(tools: &Toolbox, settings: &Settings, data: &TestData) -> Result<()> {
    let config = load_deployment(data)?;
    let key_pair = load_key_pair(data)?;
    let ip = server_ip(tools, data).await?;
    let message = write_app_server_log(
        tools.remote.as_ref(),
        &RemoteHost::new(ip, &key_pair.private_key_path),
        config.vars.filebeat_log_path().unwrap_or(FILEBEAT_LOG_PATH),
        RetryPolicy::SSH,
        settings.app_log_settle,
    )
    .await?;

    let outputs = tools.infra.outputs(&config).await?;
    let query_url = format!(
        "http://{}:{}/_all/_search?q=message:{}",
        outputs.required_string("alb_dns_name")?,
        ELASTICSEARCH_PORT,
        message
    );
    http_get_until(&query_url, &message, RetryPolicy::SEARCH).await?;
    Ok(())
}

/// CollectD on the server reports through Logstash on the same server.
async fn validate_collectd(tools: &Toolbox, data: &TestData) -> Result<()> {
    let config = load_deployment(data)?;
    let key_pair = load_key_pair(data)?;
    let outputs = tools.infra.outputs(&config).await?;
    let group = first_of(&outputs, "server_asg_names")?;
    let ip = server_ip(tools, data).await?;
    check_logstash_output(
        tools,
        config.vars.region(),
        &group,
        &key_pair.private_key_path,
        &format!("\"x_forwarded_for\":\"{}\"", ip),
    )
    .await
}

async fn validate_kibana(tools: &Toolbox, data: &TestData) -> Result<()> {
    let config = load_deployment(data)?;
    let outputs = tools.infra.outputs(&config).await?;
    let status_url = format!(
        "http://{}/api/status",
        outputs.required_string("alb_dns_name")?
    );
    http_get_until(&status_url, "\"state\":\"green\"", RetryPolicy::KIBANA_STATUS).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_case_per_builder() {
        let names: Vec<_> = AllInOneCase::all().into_iter().map(|case| case.name).collect();
        assert_eq!(names, ["elk-aio-ami-ubuntu-20", "elk-aio-ami-ubuntu-18"]);
    }

    #[test]
    fn forbidden_regions_are_never_picked() {
        for _ in 0..50 {
            let region = pick_stable_region(None, &FORBIDDEN_REGIONS).unwrap();
            assert!(!FORBIDDEN_REGIONS.contains(&region.as_str()));
        }
    }
}
