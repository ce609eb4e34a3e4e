use super::{deploy, get_logs, load_deployment, teardown, CaseReport, Settings, Toolbox};
use crate::aws::{pick_stable_region, unique_id};
use crate::constants::{
    stage, CERT_ALIAS, ELASTICSEARCH_PORT, KEYSTORE_SCRIPT_DIR, KEYSTORE_SCRIPT_REPO,
    LARGE_INSTANCE_TYPES, SMALL_INSTANCE_TYPES, STORE_PASSWORD,
};
use crate::context::TestContext;
use crate::error::{self, Result};
use crate::logs::LogSource;
use crate::packer::ImageRequest;
use crate::probe::{http_get_until, https_get_until, HttpsOptions, RetryPolicy};
use elk_test_model::constants::{AWS_REGION, CERT_INFO, DEPLOYMENT_CONFIG, EC2_KEY_PAIR};
use elk_test_model::{
    DeploymentConfig, DeploymentVars, ElasticsearchOnlyVars, ElasticsearchTlsVars,
    KeystoreBundle, TestData,
};
use futures::FutureExt;
use log::info;
use stage_runner::Pipeline;

const TERRAFORM_DIR: &str = "elasticsearch-only-cluster";
const AMIS_DIR: &str = "elk-amis";
const TEMPLATE: &str = "elk-amis/elasticsearch/elasticsearch.json";
const KEYSTORE_NAME: &str = "elasticsearch";

/// A standalone Elasticsearch cluster behind a load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticsearchCase {
    pub name: String,
    pub builder: String,
    pub use_ssl: bool,
    /// The port the load balancer forwards to Elasticsearch.
    pub port: u16,
}

impl ElasticsearchCase {
    pub fn all() -> Vec<Self> {
        vec![
            Self::new(
                "TestElasticsearchUbuntu1804",
                "elasticsearch-ami-ubuntu-18",
                false,
            ),
            Self::new(
                "TestElasticsearchSSLUbuntu2004",
                "elasticsearch-ami-ubuntu-20",
                true,
            ),
            Self::new(
                "TestElasticsearchUbuntu2004",
                "elasticsearch-ami-ubuntu-20",
                false,
            ),
        ]
    }

    fn new(name: &str, builder: &str, use_ssl: bool) -> Self {
        Self {
            name: name.to_string(),
            builder: builder.to_string(),
            use_ssl,
            port: ELASTICSEARCH_PORT,
        }
    }

    pub(super) async fn run(&self, settings: &Settings, tools: &Toolbox) -> Result<CaseReport> {
        let context = settings.context(&self.name)?;
        let data = context.data();
        let mut pipeline = Pipeline::new(&self.name, settings.skip.clone());

        {
            let data = data.clone();
            let name = self.name.clone();
            pipeline.always_run(stage::GET_LOGS, move |state| {
                async move {
                    get_logs(tools, settings, &data, &name, state, |outputs| {
                        Ok(outputs
                            .list("server_asg_names")?
                            .into_iter()
                            .map(LogSource::ScalingGroup)
                            .collect())
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

        pipeline
            .run_stage(
                stage::GENERATE_SSL_CERTS,
                self.generate_ssl_certs(tools, settings, &context),
            )
            .await;
        pipeline
            .run_stage(stage::SETUP_AMI, self.setup_ami(tools, settings, &context))
            .await;
        pipeline.run_stage(stage::DEPLOY, deploy(tools, &data)).await;
        pipeline
            .run_stage(stage::VALIDATE, self.validate(tools, settings, &data))
            .await;

        let report = pipeline.finish().await;
        context.finish();
        Ok(report)
    }

    async fn generate_ssl_certs(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        context: &TestContext,
    ) -> Result<()> {
        if !self.use_ssl {
            info!("[{}] Not an SSL case, no certificates needed", self.name);
            return Ok(());
        }
        let script_dir = context.dir().join(KEYSTORE_SCRIPT_DIR);
        tools
            .keystore
            .download_keystore_script(KEYSTORE_SCRIPT_REPO, &script_dir)
            .await?;
        let bundle = tools
            .keystore
            .generate_key_store(
                KEYSTORE_NAME,
                &script_dir,
                &context.examples_dir().join(AMIS_DIR),
                &settings.zone_name,
            )
            .await?;
        context.data().save(CERT_INFO, &bundle)?;
        Ok(())
    }

    /// Builds the Elasticsearch image, creates the key pair and saves the deployment
    /// configuration.
    async fn setup_ami(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        context: &TestContext,
    ) -> Result<()> {
        let data = context.data();
        let region = match &settings.region {
            Some(region) => region.clone(),
            None => pick_stable_region(None, &[])?,
        };
        data.save_string(AWS_REGION, &region)?;
        let branch = settings.branch().await?;
        let small = tools
            .cloud
            .recommended_instance_type(&region, &SMALL_INSTANCE_TYPES)
            .await?;
        let large = tools
            .cloud
            .recommended_instance_type(&region, &LARGE_INSTANCE_TYPES)
            .await?;

        let request = ImageRequest {
            template: context.examples_dir().join(TEMPLATE),
            builder: self.builder.clone(),
            region: region.clone(),
            instance_type: small,
            use_ssl: self.use_ssl,
            branch,
        };
        let ami_id = tools.images.build_image(&request).await?;
        info!("[{}] Built '{}'", self.name, ami_id);

        let id = unique_id();
        let key_pair = tools.cloud.create_key_pair(&region, &id, data.dir()).await?;
        data.save(EC2_KEY_PAIR, &key_pair)?;

        let vars = ElasticsearchOnlyVars {
            aws_region: region,
            ami_id,
            instance_type: large,
            cluster_name: format!("es-cluster-{}", id),
            key_name: key_pair.name,
            route53_zone_name: settings.zone_name.clone(),
            tls: self.use_ssl.then(tls_vars),
        };
        data.save(
            DEPLOYMENT_CONFIG,
            &DeploymentConfig::new(
                context.examples_dir().join(TERRAFORM_DIR),
                DeploymentVars::ElasticsearchOnly(vars),
            ),
        )?;
        Ok(())
    }

    /// The root endpoint of the cluster names the cluster it belongs to.
    async fn validate(&self, tools: &Toolbox, settings: &Settings, data: &TestData) -> Result<()> {
        let config = load_deployment(data)?;
        let cluster_name = match &config.vars {
            DeploymentVars::ElasticsearchOnly(vars) => vars.cluster_name.clone(),
            _ => {
                return error::MissingSnafu {
                    what: "an Elasticsearch cluster name",
                    from: DEPLOYMENT_CONFIG,
                }
                .fail()
            }
        };
        let outputs = tools.infra.outputs(&config).await?;
        let protocol = if self.use_ssl { "https" } else { "http" };
        let url = format!(
            "{}://{}:{}",
            protocol,
            outputs.required_string("lb_dns_name")?,
            self.port
        );
        let expected = format!("\"cluster_name\" : \"{}\"", cluster_name);

        if self.use_ssl {
            let bundle: KeystoreBundle = data.load(CERT_INFO)?;
            let options = HttpsOptions {
                ca_file: bundle.ca_file,
                accept_invalid_certs: settings.accept_invalid_certs,
                password: STORE_PASSWORD.to_string(),
            };
            https_get_until(&url, &expected, &options, RetryPolicy::HTTPS).await?;
        } else {
            http_get_until(&url, &expected, RetryPolicy::CLUSTER_UP).await?;
        }
        Ok(())
    }
}

fn tls_vars() -> ElasticsearchTlsVars {
    ElasticsearchTlsVars {
        use_ssl: true,
        java_keystore_filename: format!("{}.server.keystore.jks", KEYSTORE_NAME),
        java_keystore_password: STORE_PASSWORD.to_string(),
        java_keystore_certificate_password: STORE_PASSWORD.to_string(),
        java_keystore_cert_alias: CERT_ALIAS.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cases_probe_the_elasticsearch_port() {
        let cases = ElasticsearchCase::all();
        assert_eq!(cases.len(), 3);
        assert!(cases.iter().all(|case| case.port == 9200));
        assert_eq!(
            cases.iter().filter(|case| case.use_ssl).count(),
            1,
            "only one case uses SSL"
        );
    }

    #[test]
    fn ssl_deployments_use_the_generated_keystore() {
        let tls = tls_vars();
        assert!(tls.use_ssl);
        assert_eq!(tls.java_keystore_filename, "elasticsearch.server.keystore.jks");
        assert_eq!(tls.java_keystore_cert_alias, "localhost");
    }
}
