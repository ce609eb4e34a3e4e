use super::{CaseReport, Settings, Toolbox};
use crate::constants::{stage, KEYSTORE_SCRIPT_DIR, KEYSTORE_SCRIPT_REPO};
use crate::context::TestContext;
use crate::docker::DockerCompose;
use crate::error::Result;
use crate::probe::{http_get_until, https_get_until, tcp_reachable, HttpsOptions, RetryPolicy};
use elk_test_model::constants::CERT_INFO;
use elk_test_model::{KeystoreBundle, TestData};
use futures::FutureExt;
use log::{error, info};
use stage_runner::Pipeline;

/// The cluster name baked into the Docker images.
const CLUSTER_NAME: &str = "mock-elasticsearch-server";
const KEYSTORE_NAME: &str = "elasticsearch";
const KEYSTORE_DOMAIN: &str = "gruntwork.io";
const TLS_OUTPUT_DIR: &str = "elasticsearch-ami";

/// The Elasticsearch image built as a local Docker image and run with Docker Compose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerCase {
    pub name: String,
    pub builder: String,
    /// `OS_NAME` of the compose file, `ubuntu` or `amazon-linux`.
    pub os_name: String,
    pub port: u16,
    pub discovery_port: u16,
    pub ssl: bool,
}

impl DockerCase {
    pub fn all() -> Vec<Self> {
        vec![
            Self::new("elasticsearch-docker-ubuntu", "ubuntu", 9202, 9302, false),
            Self::new("elasticsearch-docker-ubuntu-18", "ubuntu", 9202, 9302, false),
            Self::new(
                "elasticsearch-docker-amazon-linux",
                "amazon-linux",
                9201,
                9301,
                false,
            ),
            Self::new("elasticsearch-ssl-docker-ubuntu", "ubuntu", 9208, 9308, true),
            Self::new("elasticsearch-ssl-docker-ubuntu-18", "ubuntu", 9208, 9308, true),
            Self::new(
                "elasticsearch-ssl-docker-amazon-linux",
                "amazon-linux",
                9209,
                9309,
                true,
            ),
        ]
    }

    fn new(builder: &str, os_name: &str, port: u16, discovery_port: u16, ssl: bool) -> Self {
        Self {
            name: builder.to_string(),
            builder: builder.to_string(),
            os_name: os_name.to_string(),
            port,
            discovery_port,
            ssl,
        }
    }

    fn protocol(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    /// The variables the compose file is parameterized with.
    pub fn compose_env(&self) -> Vec<(String, String)> {
        let container = if self.ssl {
            "elasticsearch-ssl"
        } else {
            "elasticsearch"
        };
        [
            ("OS_NAME", self.os_name.clone()),
            ("PROTOCOL", self.protocol().to_string()),
            ("ELASTICSEARCH_PORT", self.port.to_string()),
            ("ELASTICSEARCH_DISCOVERY_PORT", self.discovery_port.to_string()),
            ("CONTAINER_BASE_NAME", container.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn compose(&self, tools: &Toolbox, context: &TestContext) -> DockerCompose {
        let flavor = if self.ssl { "ssl" } else { "non-ssl" };
        DockerCompose::new(
            &tools.docker,
            context
                .examples_dir()
                .join("elasticsearch-docker")
                .join(flavor),
            self.compose_env(),
        )
    }

    pub(super) async fn run(&self, settings: &Settings, tools: &Toolbox) -> Result<CaseReport> {
        let context = settings.context(&self.name)?;
        let data = context.data();
        let compose = self.compose(tools, &context);
        let mut pipeline = Pipeline::new(&self.name, settings.skip.clone());

        {
            let compose = compose.clone();
            let name = self.name.clone();
            pipeline.always_run(stage::COMPOSE_LOGS, move |state| {
                async move {
                    if state.failed() {
                        let logs = compose.logs().await?;
                        error!("[{}] Container logs:\n{}", name, logs);
                    }
                    Ok(())
                }
                .boxed()
            });
        }
        {
            let compose = compose.clone();
            pipeline.always_run(stage::COMPOSE_DOWN, move |_| {
                async move { compose.down().await }.boxed()
            });
        }

        pipeline
            .run_stage(
                stage::GENERATE_SSL_CERTS,
                self.generate_ssl_certs(tools, &context),
            )
            .await;
        pipeline
            .run_stage(stage::BUILD_IMAGE, self.build_image(tools, settings, &context))
            .await;
        pipeline.run_stage(stage::COMPOSE_UP, compose.up()).await;
        pipeline
            .run_stage(stage::VALIDATE, self.validate(settings, &data))
            .await;

        let report = pipeline.finish().await;
        context.finish();
        Ok(report)
    }

    async fn generate_ssl_certs(&self, tools: &Toolbox, context: &TestContext) -> Result<()> {
        if !self.ssl {
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
                &context.examples_dir().join(TLS_OUTPUT_DIR),
                KEYSTORE_DOMAIN,
            )
            .await?;
        context.data().save(CERT_INFO, &bundle)?;
        Ok(())
    }

    async fn build_image(
        &self,
        tools: &Toolbox,
        settings: &Settings,
        context: &TestContext,
    ) -> Result<()> {
        let template = if self.ssl {
            "elasticsearch-ssl.json"
        } else {
            "elasticsearch.json"
        };
        let template = context
            .examples_dir()
            .join("elk-amis/elasticsearch")
            .join(template);
        let branch = settings.branch().await?;
        tools
            .images
            .build_docker_image(&template, &self.builder, &branch)
            .await
    }

    /// The port must accept connections before the cluster can answer with its name.
    async fn validate(&self, settings: &Settings, data: &TestData) -> Result<()> {
        tcp_reachable(&format!("localhost:{}", self.port), RetryPolicy::TCP).await?;
        let url = format!("{}://localhost:{}", self.protocol(), self.port);
        if self.ssl {
            let bundle: KeystoreBundle = data.load(CERT_INFO)?;
            let options = HttpsOptions {
                ca_file: bundle.ca_file,
                accept_invalid_certs: settings.accept_invalid_certs,
                password: String::new(),
            };
            https_get_until(&url, CLUSTER_NAME, &options, RetryPolicy::HTTPS).await?;
        } else {
            let expected = format!("\"cluster_name\" : \"{}\"", CLUSTER_NAME);
            http_get_until(&url, &expected, RetryPolicy::CLUSTER_UP).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ssl_cases_use_their_own_ports() {
        for case in DockerCase::all() {
            if case.ssl {
                assert!(case.port == 9208 || case.port == 9209, "{}", case.name);
                assert!(case.builder.starts_with("elasticsearch-ssl-docker"));
            } else {
                assert!(case.port == 9201 || case.port == 9202, "{}", case.name);
            }
            assert_eq!(case.discovery_port, case.port + 100);
        }
    }

    #[test]
    fn compose_env_describes_the_container() {
        let case = DockerCase::new(
            "elasticsearch-ssl-docker-amazon-linux",
            "amazon-linux",
            9209,
            9309,
            true,
        );
        let env = case.compose_env();
        let get = |name: &str| {
            env.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("OS_NAME"), "amazon-linux");
        assert_eq!(get("PROTOCOL"), "https");
        assert_eq!(get("ELASTICSEARCH_PORT"), "9209");
        assert_eq!(get("ELASTICSEARCH_DISCOVERY_PORT"), "9309");
        assert_eq!(get("CONTAINER_BASE_NAME"), "elasticsearch-ssl");
    }
}
