/*!

This library provides the data model shared by the ELK test harness: stage names and the skip
configuration, the typed Terraform deployment configuration, the TLS keystore bundle, the set of
machine images, and the `TestData` store that persists all of these between stages.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use configuration::Configuration;
pub use deployment::{
    DeploymentConfig, DeploymentVars, ElasticsearchOnlyVars, ElasticsearchTlsVars,
    MultiClusterTlsVars, MultiClusterVars, SingleClusterVars, UrlInfo,
};
pub use error::{Error, Result};
pub use image::{AmiSet, ImageRole, ImageSet};
pub use key_pair::Ec2KeyPair;
pub use keystore::KeystoreBundle;
pub use stage::{SkipStages, StageName};
pub use test_data::TestData;

mod configuration;
pub mod constants;
mod deployment;
mod error;
mod image;
mod key_pair;
mod keystore;
mod stage;
mod test_data;
