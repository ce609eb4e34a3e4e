use crate::error::Result;
use crate::Configuration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Everything needed to apply or destroy one of the Terraform examples: the root module directory
/// and the typed variables for that example. Saved as `DeploymentConfig.json` by the stage that
/// prepares a deployment and loaded by every later stage that touches the infrastructure.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub terraform_dir: PathBuf,
    pub vars: DeploymentVars,
}

impl Configuration for DeploymentConfig {}

impl DeploymentConfig {
    pub fn new<P: Into<PathBuf>>(terraform_dir: P, vars: DeploymentVars) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            vars,
        }
    }

    /// The Terraform input variables as a flat JSON object, ready to be written as a
    /// `*.tfvars.json` file.
    pub fn tfvars(&self) -> Result<Map<String, Value>> {
        self.vars.tfvars()
    }
}

/// The variables of each Terraform example, one variant per example.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeploymentVars {
    /// `examples/elk-multi-cluster`
    MultiCluster(MultiClusterVars),
    /// `examples/elk-single-cluster`
    SingleCluster(SingleClusterVars),
    /// `examples/elasticsearch-only-cluster`
    ElasticsearchOnly(ElasticsearchOnlyVars),
}

impl DeploymentVars {
    pub fn tfvars(&self) -> Result<Map<String, Value>> {
        match self {
            DeploymentVars::MultiCluster(vars) => vars.clone().into_map(),
            DeploymentVars::SingleCluster(vars) => vars.clone().into_map(),
            DeploymentVars::ElasticsearchOnly(vars) => vars.clone().into_map(),
        }
    }

    pub fn region(&self) -> &str {
        match self {
            DeploymentVars::MultiCluster(vars) => &vars.aws_region,
            DeploymentVars::SingleCluster(vars) => &vars.aws_region,
            DeploymentVars::ElasticsearchOnly(vars) => &vars.aws_region,
        }
    }

    pub fn key_name(&self) -> &str {
        match self {
            DeploymentVars::MultiCluster(vars) => &vars.key_name,
            DeploymentVars::SingleCluster(vars) => &vars.key_name,
            DeploymentVars::ElasticsearchOnly(vars) => &vars.key_name,
        }
    }

    /// The file on the app server that Filebeat ships to Logstash, if the example has one.
    pub fn filebeat_log_path(&self) -> Option<&str> {
        match self {
            DeploymentVars::MultiCluster(vars) => Some(&vars.filebeat_log_path),
            DeploymentVars::SingleCluster(vars) => Some(&vars.filebeat_log_path),
            DeploymentVars::ElasticsearchOnly(_) => None,
        }
    }

    pub fn use_ssl(&self) -> bool {
        match self {
            DeploymentVars::MultiCluster(vars) => vars.use_ssl,
            DeploymentVars::SingleCluster(_) => false,
            DeploymentVars::ElasticsearchOnly(vars) => {
                vars.tls.as_ref().map(|tls| tls.use_ssl).unwrap_or(false)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MultiClusterVars {
    pub aws_region: String,

    pub kibana_cluster_name: String,
    pub kibana_ami_id: String,
    pub kibana_ui_port: u16,
    pub kibana_instance_type: String,

    pub elasticsearch_cluster_name: String,
    pub elasticsearch_ami_id: String,
    pub elasticsearch_instance_type: String,

    pub logstash_ami_id: String,
    pub logstash_instance_type: String,
    pub logstash_cluster_name: String,

    pub app_server_ami_id: String,
    pub app_server_name: String,
    pub app_server_instance_type: String,
    pub filebeat_log_path: String,
    pub key_name: String,

    pub subdomain_name: String,
    pub route53_zone_id: String,
    pub route53_zone_name: String,
    pub use_ssl: bool,
    pub alb_name: String,
    pub alb_target_group_protocol: String,

    pub elastalert_ami_id: String,
    pub elastalert_instance_type: String,
    pub sns_topic_name: String,

    /// Only present when `use_ssl` is set.
    #[serde(flatten)]
    pub tls: Option<MultiClusterTlsVars>,
}

impl Configuration for MultiClusterVars {}

/// Key store and certificate locations for every component of the multi-cluster example.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MultiClusterTlsVars {
    pub ssl_policy: String,

    pub java_keystore_filename: String,
    pub java_keystore_password: String,
    pub java_keystore_certificate_password: String,
    pub java_keystore_cert_alias: String,

    pub logstash_keystore_path: String,
    pub logstash_ca_auth_path: String,
    pub logstash_cert_pem_path: String,
    pub logstash_key_p8_path: String,
    pub elasticsearch_password_for_logstash_secrets_manager_arn: String,

    pub kibana_ca_auth_path: String,
    pub kibana_cert_pem_path: String,
    pub kibana_cert_key_path: String,
    pub elasticsearch_password_for_kibana_secrets_manager_arn: String,

    pub filebeat_ca_auth_path: String,
    pub filebeat_cert_pem_path: String,
    pub filebeat_cert_key_path: String,

    pub elastalert_ca_auth_path: String,
    pub elastalert_cert_pem_path: String,
    pub elastalert_cert_key_path: String,

    pub collectd_ca_path: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SingleClusterVars {
    pub aws_region: String,
    pub ami_id: String,
    pub elk_cluster_name: String,
    pub filebeat_log_path: String,
    pub key_name: String,
    pub alb_name: String,
}

impl Configuration for SingleClusterVars {}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchOnlyVars {
    pub aws_region: String,
    pub ami_id: String,
    pub instance_type: String,
    pub cluster_name: String,
    pub key_name: String,
    pub route53_zone_name: String,
    #[serde(flatten)]
    pub tls: Option<ElasticsearchTlsVars>,
}

impl Configuration for ElasticsearchOnlyVars {}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchTlsVars {
    pub use_ssl: bool,
    pub java_keystore_filename: String,
    pub java_keystore_password: String,
    pub java_keystore_certificate_password: String,
    pub java_keystore_cert_alias: String,
}

/// The DNS name a deployment is reachable under, `<subdomain>.<zone name>`. Saved as `URL.json`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UrlInfo {
    pub subdomain: String,
    pub zone_name: String,
}

impl Configuration for UrlInfo {}

impl UrlInfo {
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.subdomain, self.zone_name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::TestData;

    fn es_only(tls: Option<ElasticsearchTlsVars>) -> DeploymentConfig {
        DeploymentConfig::new(
            "/work/examples/elasticsearch-only-cluster",
            DeploymentVars::ElasticsearchOnly(ElasticsearchOnlyVars {
                aws_region: "us-east-2".to_string(),
                ami_id: "ami-0123".to_string(),
                instance_type: "t3.large".to_string(),
                cluster_name: "es-cluster-abc123".to_string(),
                key_name: "abc123".to_string(),
                route53_zone_name: "gruntwork.in".to_string(),
                tls,
            }),
        )
    }

    #[test]
    fn tfvars_are_flat_and_untagged() {
        let vars = es_only(None).tfvars().unwrap();
        assert_eq!(vars.get("cluster_name").unwrap(), "es-cluster-abc123");
        assert!(vars.get("kind").is_none());
        assert!(vars.get("use_ssl").is_none());
        assert_eq!(vars.len(), 6);
    }

    #[test]
    fn tls_vars_are_merged_in() {
        let config = es_only(Some(ElasticsearchTlsVars {
            use_ssl: true,
            java_keystore_filename: "elasticsearch.server.keystore.jks".to_string(),
            java_keystore_password: "password".to_string(),
            java_keystore_certificate_password: "password".to_string(),
            java_keystore_cert_alias: "localhost".to_string(),
        }));
        let vars = config.tfvars().unwrap();
        assert_eq!(vars.get("use_ssl").unwrap(), &Value::Bool(true));
        assert_eq!(vars.get("java_keystore_cert_alias").unwrap(), "localhost");
        assert!(config.vars.use_ssl());
    }

    #[test]
    fn persisted_config_keeps_its_variant() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DeploymentConfig::new(
            "/work/examples/elk-single-cluster",
            DeploymentVars::SingleCluster(SingleClusterVars {
                aws_region: "eu-west-1".to_string(),
                ami_id: "ami-0456".to_string(),
                elk_cluster_name: "elk-xyz".to_string(),
                filebeat_log_path: "/var/log/source.log".to_string(),
                key_name: "xyz".to_string(),
                alb_name: "alb-xyz".to_string(),
            }),
        );
        TestData::new(dir.path())
            .save("DeploymentConfig", &config)
            .unwrap();
        let loaded: DeploymentConfig = TestData::new(dir.path())
            .load("DeploymentConfig")
            .unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.vars.region(), "eu-west-1");
        assert_eq!(loaded.vars.filebeat_log_path(), Some("/var/log/source.log"));
    }

    #[test]
    fn url_info_fqdn() {
        let url = UrlInfo {
            subdomain: "elk-abc".to_string(),
            zone_name: "gruntwork.in".to_string(),
        };
        assert_eq!(url.fqdn(), "elk-abc.gruntwork.in");
    }
}
