use crate::Configuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An EC2 key pair imported for a run. The private key lives in a file (mode `0600`) next to the
/// other test data so that SSH sessions can be opened from any later stage.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ec2KeyPair {
    /// The name the key pair was imported under.
    pub name: String,
    /// The region the key pair exists in.
    pub region: String,
    /// The OpenSSH formatted public key.
    pub public_key: String,
    /// The path to the PEM encoded private key.
    pub private_key_path: PathBuf,
}

impl Configuration for Ec2KeyPair {}
