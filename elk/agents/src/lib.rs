/*!

`elk-agents` drives the staged integration tests of the ELK Terraform modules: it builds the
machine images with Packer, provisions TLS key stores, deploys the examples with Terraform, probes
the running stack and snapshots logs when a run fails.
The `scenario` module assembles these pieces into the test suites that the `elk-test` CLI runs.

!*/

pub mod aws;
pub mod command;
pub mod constants;
pub mod context;
pub mod docker;
pub mod error;
pub mod keystore;
pub mod logs;
pub mod packer;
pub mod probe;
pub mod remote;
pub mod scenario;
pub mod terraform;

pub use error::{Error, Result};
