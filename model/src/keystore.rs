use crate::Configuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The TLS material generated for a run that enables SSL: a Java key store and trust store plus the
/// certificate and private key exported from them. Created once by the `generate_ssl_certs` stage
/// and only read afterwards.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeystoreBundle {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    #[serde(rename = "P8KeyFile")]
    pub p8_key_file: PathBuf,
    pub ca_file: PathBuf,
    pub key_store_path: PathBuf,
    pub key_store_password: String,
    pub trust_store_path: PathBuf,
    pub trust_store_password: String,
}

impl Configuration for KeystoreBundle {}
