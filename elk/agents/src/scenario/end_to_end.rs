use super::{
    deploy, first_of, get_logs, load_deployment, load_key_pair, teardown, validate_cloudtrail,
    validate_cloudwatch, CaseReport, Settings, Toolbox,
};
use crate::aws::{pick_stable_region, unique_id};
use crate::constants::{
    stage, CERT_ALIAS, ELASTICSEARCH_PORT, FILEBEAT_LOG_PATH, KEYSTORE_SCRIPT_DIR,
    KEYSTORE_SCRIPT_REPO, KIBANA_UI_PORT, LARGE_INSTANCE_TYPES, SMALL_INSTANCE_TYPES,
    STORE_PASSWORD,
};
use crate::context::TestContext;
use crate::error::Result;
use crate::logs::LogSource;
use crate::packer::{build_all_images, ImageRequest};
use crate::probe::{http_get_until, https_get_until, HttpsOptions, RetryPolicy};
use crate::remote::{write_app_server_log, RemoteHost};
use elk_test_model::constants::{
    AWS_REGION, CERT_INFO, DEPLOYMENT_CONFIG, EC2_KEY_PAIR, KIBANA_PASS, KIBANA_PASS_SECRET_ARN,
    LOGSTASH_PASS_SECRET_ARN, UNIQUE_ID, URL_INFO,
};
use elk_test_model::{
    DeploymentConfig, DeploymentVars, ImageSet, KeystoreBundle, MultiClusterTlsVars,
    MultiClusterVars, TestData, UrlInfo,
};
use futures::FutureExt;
use log::info;
use stage_runner::Pipeline;
use std::time::Duration;

const TERRAFORM_DIR: &str = "elk-multi-cluster";
const AMIS_DIR: &str = "elk-amis";
const KEYSTORE_NAME: &str = "elk";
const KEYSTORE_FILE: &str = "elk.server.keystore.jks";
const SSL_POLICY: &str = "ELBSecurityPolicy-2015-05";

/// The full ELK deployment: Elasticsearch, Logstash, Kibana and ElastAlert clusters behind a load
/// balancer plus an app server shipping logs with Filebeat and CollectD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndToEndCase {
    pub name: String,
    /// The suffix of the Packer builders, e.g. `ubuntu-20`.
    pub builder_suffix: String,
    pub use_ssl: bool,
    /// Staggers concurrent cases.
    pub start_delay: Duration,
}

impl EndToEndCase {
    pub fn all() -> Vec<Self> {
        vec![
            Self::new("TestElkUbuntu1804", "ubuntu-18", false, 0),
            Self::new("TestElkUbuntu2004", "ubuntu-20", false, 0),
            Self::new("TestElkUbuntu2004SSL", "ubuntu-20", true, 3),
        ]
    }

    fn new(name: &str, builder_suffix: &str, use_ssl: bool, start_delay: u64) -> Self {
        Self {
            name: name.to_string(),
            builder_suffix: builder_suffix.to_string(),
            use_ssl,
            start_delay: Duration::from_secs(start_delay),
        }
    }

    fn protocol(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    pub(super) async fn run(&self, settings: &Settings, tools: &Toolbox) -> Result<CaseReport> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        let context = settings.context(&self.name)?;
        let data = context.data();
        let mut pipeline = Pipeline::new(&self.name, settings.skip.clone());

        {
            let data = data.clone();
            let name = self.name.clone();
            pipeline.always_run(stage::GET_LOGS, move |state| {
                async move {
                    get_logs(tools, settings, &data, &name, state, |outputs| {
                        let mut sources = vec![LogSource::Address {
                            name: outputs.string("app_server_id"),
                            address: outputs.string("app_server_ip"),
                        }];
                        for group in outputs
                            .list("logstash_server_asg_names")?
                            .into_iter()
                            .chain(outputs.list("es_server_asg_names")?)
                        {
                            sources.push(LogSource::ScalingGroup(group));
                        }
                        Ok(sources)
                    })
                    .await
                }
                .boxed()
            });
        }
        {
            let data = data.clone();
            pipeline.always_run(stage::TEARDOWN, move |_| {
                async move { teardown(tools, &data).await }.boxed()
            });
        }
        {
            let data = data.clone();
            pipeline.always_run(stage::REMOVE_SECRETS, move |_| {
                async move { remove_secrets(tools, &data).await }.boxed()
            });
        }

        pipeline
            .run_stage(stage::CREATE_SECRETS, create_secrets(tools, settings, &data))
            .await;
        pipeline
            .run_stage(
                stage::GENERATE_SSL_CERTS,
                self.generate_ssl_certs(tools, settings, &context),
            )
            .await;
        pipeline
            .run_stage(stage::SETUP_AMI, self.setup_ami(tools, settings, &context))
            .await;
        pipeline
            .run_stage(stage::DEPLOY, deploy(tools, &data))
            .await;
        pipeline
            .run_stage(stage::VALIDATE, self.validate(tools, settings, &data))
            .await;
        pipeline
            .run_stage(stage::VALIDATE_COLLECTD, validate_collectd(tools, &data))
            .await;
        pipeline
            .run_stage(
                stage::VALIDATE_CLOUDWATCH,
                validate_cloudwatch(tools, &data, "logstash_server_asg_names"),
            )
            .await;
        pipeline
            .run_stage(
                stage::VALIDATE_CLOUDTRAIL,
                validate_cloudtrail(tools, &data, "logstash_server_asg_names"),
            )
            .await;
        pipeline
            .run_stage(
                stage::VALIDATE_KIBANA,
                self.validate_kibana(tools, settings, &data),
            )
            .await;

        let report = pipeline.finish().await;
        context.finish();
        Ok(report)
    }

    /// Derives the deployment's DNS name, generates the TLS material for SSL cases and creates the
    /// key pair named after the subdomain.
    async fn generate_ssl_certs(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        context: &TestContext,
    ) -> Result<()> {
        let data = context.data();
        let region = data.load_string(AWS_REGION)?;
        let unique_id = data.load_string(UNIQUE_ID)?;
        let url = UrlInfo {
            subdomain: unique_id.to_lowercase(),
            zone_name: settings.zone_name.clone(),
        };
        data.save(URL_INFO, &url)?;

        if self.use_ssl {
            let amis_dir = context.examples_dir().join(AMIS_DIR);
            let ssl_dir = amis_dir.join("ssl");
            let script_dir = context.dir().join(KEYSTORE_SCRIPT_DIR);
            tools
                .keystore
                .download_keystore_script(KEYSTORE_SCRIPT_REPO, &script_dir)
                .await?;
            let mut bundle = tools
                .keystore
                .generate_key_store(KEYSTORE_NAME, &script_dir, &amis_dir, &url.fqdn())
                .await?;
            let keys = tools
                .keystore
                .export_cert_and_key(
                    &bundle,
                    CERT_ALIAS,
                    &ssl_dir,
                    &ssl_dir.join("keystore.p12"),
                )
                .await?;
            bundle.cert_file = keys.cert_file;
            bundle.key_file = keys.key_file;
            bundle.p8_key_file = keys.p8_key_file;
            data.save(CERT_INFO, &bundle)?;
        } else {
            info!("[{}] Not an SSL case, no certificates needed", self.name);
        }

        let key_pair = tools
            .cloud
            .create_key_pair(&region, &url.subdomain, data.dir())
            .await?;
        data.save(EC2_KEY_PAIR, &key_pair)?;
        Ok(())
    }

    /// Builds the five images and saves the deployment configuration that uses them.
    async fn setup_ami(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        context: &TestContext,
    ) -> Result<()> {
        let data = context.data();
        let region = data.load_string(AWS_REGION)?;
        let url: UrlInfo = data.load(URL_INFO)?;
        let key_pair = load_key_pair(&data)?;
        let branch = settings.branch().await?;

        let large = tools
            .cloud
            .recommended_instance_type(&region, &LARGE_INSTANCE_TYPES)
            .await?;
        let small = tools
            .cloud
            .recommended_instance_type(&region, &SMALL_INSTANCE_TYPES)
            .await?;

        let amis_dir = context.examples_dir().join(AMIS_DIR);
        let requests = ImageSet::from_fn(|role| {
            ImageRequest::for_role(
                &amis_dir,
                role,
                &self.builder_suffix,
                &region,
                &small,
                self.use_ssl,
                &branch,
            )
        });
        let amis = build_all_images(tools.images.as_ref(), &requests).await?;

        let subdomain = &url.subdomain;
        let tls = if self.use_ssl {
            Some(tls_vars(
                data.load_string(KIBANA_PASS_SECRET_ARN)?,
                data.load_string(LOGSTASH_PASS_SECRET_ARN)?,
            ))
        } else {
            None
        };
        let vars = MultiClusterVars {
            aws_region: region.clone(),
            kibana_cluster_name: format!("kibana-{}", subdomain),
            kibana_ami_id: amis.kibana,
            kibana_ui_port: KIBANA_UI_PORT,
            kibana_instance_type: small.clone(),
            elasticsearch_cluster_name: format!("es-cluster-{}", subdomain),
            elasticsearch_ami_id: amis.elasticsearch,
            elasticsearch_instance_type: large.clone(),
            logstash_ami_id: amis.logstash,
            logstash_instance_type: large,
            logstash_cluster_name: format!("logstash-{}", subdomain),
            app_server_ami_id: amis.app_server,
            app_server_name: format!("elk-appserver-{}", subdomain),
            app_server_instance_type: small.clone(),
            filebeat_log_path: FILEBEAT_LOG_PATH.to_string(),
            key_name: key_pair.name,
            subdomain_name: subdomain.clone(),
            route53_zone_id: settings.zone_id.clone(),
            route53_zone_name: url.zone_name.clone(),
            use_ssl: self.use_ssl,
            alb_name: format!("alb-{}", subdomain),
            alb_target_group_protocol: self.protocol().to_uppercase(),
            elastalert_ami_id: amis.elastalert,
            elastalert_instance_type: small,
            sns_topic_name: format!("sns-{}", subdomain),
            tls,
        };
        data.save(
            DEPLOYMENT_CONFIG,
            &DeploymentConfig::new(
                context.examples_dir().join(TERRAFORM_DIR),
                DeploymentVars::MultiCluster(vars),
            ),
        )?;
        Ok(())
    }

    /// Writes a unique line on the app server and searches for it in Elasticsearch.
    async fn validate(&self, tools: &Toolbox, settings: &Settings, data: &TestData) -> Result<()> {
        let config = load_deployment(data)?;
        let key_pair = load_key_pair(data)?;
        let outputs = tools.infra.outputs(&config).await?;
        let host = RemoteHost::new(
            outputs.required_string("app_server_ip")?,
            &key_pair.private_key_path,
        );
        let log_path = config
            .vars
            .filebeat_log_path()
            .unwrap_or(FILEBEAT_LOG_PATH);
        let message = write_app_server_log(
            tools.remote.as_ref(),
            &host,
            log_path,
            RetryPolicy::SSH,
            settings.app_log_settle,
        )
        .await?;

        let alb_url = outputs.required_string("alb_url")?;
        let query_url = format!(
            "{}:{}/_all/_search?q=message:{}",
            alb_url, ELASTICSEARCH_PORT, message
        );
        if self.use_ssl {
            let options = https_options(settings, data)?;
            https_get_until(&query_url, &message, &options, RetryPolicy::HTTPS).await?;
        } else {
            http_get_until(&query_url, &message, RetryPolicy::SEARCH).await?;
        }
        Ok(())
    }

    async fn validate_kibana(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        data: &TestData,
    ) -> Result<()> {
        let config = load_deployment(data)?;
        let outputs = tools.infra.outputs(&config).await?;
        let status_url = format!("{}/api/status", outputs.required_string("alb_url")?);
        let expected = "\"state\":\"green\"";
        if self.use_ssl {
            let options = https_options(settings, data)?;
            https_get_until(&status_url, expected, &options, RetryPolicy::HTTPS).await?;
        } else {
            http_get_until(&status_url, expected, RetryPolicy::KIBANA_STATUS).await?;
        }
        Ok(())
    }
}

/// Picks the region and the run's identifiers and stores the generated Kibana and Logstash
/// passwords in Secrets Manager.
async fn create_secrets(tools: &Toolbox, settings: &Settings, data: &TestData) -> Result<()> {
    let region = match &settings.region {
        Some(region) => region.clone(),
        None => pick_stable_region(None, &[])?,
    };
    data.save_string(AWS_REGION, &region)?;
    let run_id = unique_id();
    data.save_string(UNIQUE_ID, &run_id)?;

    let kibana_pass = unique_id();
    data.save_string(KIBANA_PASS, &kibana_pass)?;
    let kibana_arn = tools
        .cloud
        .create_secret(
            &region,
            &format!("Kibana_{}", run_id),
            &format!("Password for kibana in ELK All in one test {}", run_id),
            &kibana_pass,
        )
        .await?;
    data.save_string(KIBANA_PASS_SECRET_ARN, &kibana_arn)?;

    let logstash_pass = unique_id();
    let logstash_arn = tools
        .cloud
        .create_secret(
            &region,
            &format!("Logstash_{}", run_id),
            &format!("Password for logstash in ELK All in one test {}", run_id),
            &logstash_pass,
        )
        .await?;
    data.save_string(LOGSTASH_PASS_SECRET_ARN, &logstash_arn)?;
    Ok(())
}

/// Deletes whichever secrets were created. Both deletions are attempted.
async fn remove_secrets(tools: &Toolbox, data: &TestData) -> Result<()> {
    let created: Vec<_> = [KIBANA_PASS_SECRET_ARN, LOGSTASH_PASS_SECRET_ARN]
        .into_iter()
        .filter(|name| data.exists(name))
        .collect();
    if created.is_empty() {
        return Ok(());
    }
    let region = data.load_string(AWS_REGION)?;
    let mut result = Ok(());
    for name in created {
        let deleted = match data.load_string(name) {
            Ok(arn) => tools.cloud.delete_secret(&region, &arn).await,
            Err(e) => Err(e.into()),
        };
        result = result.and(deleted);
    }
    result
}

/// The Logstash instance should receive the CollectD metrics of the app server.
async fn validate_collectd(tools: &Toolbox, data: &TestData) -> Result<()> {
    let config = load_deployment(data)?;
    let key_pair = load_key_pair(data)?;
    let outputs = tools.infra.outputs(&config).await?;
    let group = first_of(&outputs, "logstash_server_asg_names")?;
    let app_server_ip = outputs.string("app_server_ip");
    super::check_logstash_output(
        tools,
        config.vars.region(),
        &group,
        &key_pair.private_key_path,
        &format!("\"x_forwarded_for\":\"{}\"", app_server_ip),
    )
    .await
}

fn https_options(settings: &Settings, data: &TestData) -> Result<HttpsOptions> {
    let bundle: KeystoreBundle = data.load(CERT_INFO)?;
    Ok(HttpsOptions {
        ca_file: bundle.ca_file,
        accept_invalid_certs: settings.accept_invalid_certs,
        password: data.load_string(KIBANA_PASS)?,
    })
}

/// Where the images expect the TLS material, plus the secrets holding the service passwords.
fn tls_vars(kibana_secret_arn: String, logstash_secret_arn: String) -> MultiClusterTlsVars {
    let path = |service: &str, file: &str| format!("/etc/{}/{}", service, file);
    MultiClusterTlsVars {
        ssl_policy: SSL_POLICY.to_string(),
        java_keystore_filename: KEYSTORE_FILE.to_string(),
        java_keystore_password: STORE_PASSWORD.to_string(),
        java_keystore_certificate_password: STORE_PASSWORD.to_string(),
        java_keystore_cert_alias: CERT_ALIAS.to_string(),
        logstash_keystore_path: path("logstash", KEYSTORE_FILE),
        logstash_ca_auth_path: path("logstash", "caFile"),
        logstash_cert_pem_path: path("logstash", "localhost.pem"),
        logstash_key_p8_path: path("logstash", "localhost.p8"),
        elasticsearch_password_for_logstash_secrets_manager_arn: logstash_secret_arn,
        kibana_ca_auth_path: path("kibana", "caFile"),
        kibana_cert_pem_path: path("kibana", "localhost.pem"),
        kibana_cert_key_path: path("kibana", "localhost.key"),
        elasticsearch_password_for_kibana_secrets_manager_arn: kibana_secret_arn,
        filebeat_ca_auth_path: path("filebeat", "caFile"),
        filebeat_cert_pem_path: path("filebeat", "localhost.pem"),
        filebeat_cert_key_path: path("filebeat", "localhost.key"),
        elastalert_ca_auth_path: path("elastalert", "caFile"),
        elastalert_cert_pem_path: path("elastalert", "localhost.pem"),
        elastalert_cert_key_path: path("elastalert", "localhost.key"),
        collectd_ca_path: path("collectd", "caFile"),
    }
}
