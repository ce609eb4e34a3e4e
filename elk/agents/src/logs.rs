/*!

Pulls log files from the instances of a failed run so that they outlive the infrastructure. Every
step is best-effort: a host that cannot be resolved, reached or read is logged and recorded in the
[`SnapshotReport`], and the remaining hosts are still collected.

!*/

use crate::aws::InstanceLocator;
use crate::constants::{LOG_FILE_FILTERS, REMOTE_LOG_DIR};
use crate::error::Result;
use crate::remote::{RemoteConnector, RemoteHost};
use log::{info, warn};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Where a collection target is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// The first instance of the named auto scaling group.
    ScalingGroup(String),
    /// An instance with a known id.
    Instance(String),
    /// An instance with a known public IP, collected under `name`.
    Address { name: String, address: String },
}

impl LogSource {
    /// The directory name the files of this target are stored under.
    pub fn name(&self) -> &str {
        match self {
            LogSource::ScalingGroup(name) => name,
            LogSource::Instance(id) => id,
            LogSource::Address { name, .. } => name,
        }
    }
}

/// What a snapshot collected and what it could not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub collected: Vec<PathBuf>,
    pub failures: Vec<(String, String)>,
}

impl SnapshotReport {
    fn fail<S: Into<String>>(&mut self, target: &str, problem: S) {
        let problem = problem.into();
        warn!("Unable to collect logs from '{}': {}", target, problem);
        self.failures.push((target.to_string(), problem));
    }
}

impl Display for SnapshotReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "collected {} files, {} failures",
            self.collected.len(),
            self.failures.len()
        )?;
        for (target, problem) in &self.failures {
            write!(f, "\n  {}: {}", target, problem)?;
        }
        Ok(())
    }
}

/// The directory a run's logs are written to: `<log_dir>/debug/<run_name>`.
pub fn snapshot_dir(log_dir: &Path, run_name: &str) -> PathBuf {
    log_dir.join("debug").join(run_name)
}

/// The `find` command listing the log files of interest.
pub fn find_command() -> String {
    let filters = LOG_FILE_FILTERS
        .iter()
        .map(|filter| format!("-name '{}'", filter))
        .collect::<Vec<_>>()
        .join(" -o ");
    format!("sudo find {} -type f \\( {} \\)", REMOTE_LOG_DIR, filters)
}

/// The local path of `remote` (a file under [`REMOTE_LOG_DIR`]) for `target` in `dest`.
pub fn local_path(dest: &Path, target: &str, remote: &str) -> PathBuf {
    let relative = Path::new(remote)
        .strip_prefix(REMOTE_LOG_DIR)
        .unwrap_or_else(|_| Path::new(remote.trim_start_matches('/')));
    dest.join(target).join(relative)
}

/// Collects logs from every target into `dest`.
pub async fn collect_logs(
    connector: &dyn RemoteConnector,
    locator: &dyn InstanceLocator,
    region: &str,
    key_file: &Path,
    targets: &[LogSource],
    dest: &Path,
) -> SnapshotReport {
    let mut report = SnapshotReport::default();
    for target in targets {
        let address = match resolve(locator, region, target).await {
            Ok(address) => address,
            Err(e) => {
                report.fail(target.name(), e.to_string());
                continue;
            }
        };
        let host = RemoteHost::new(address, key_file);
        collect_host(connector, &host, target.name(), dest, &mut report).await;
    }
    info!("Log snapshot in '{}': {}", dest.display(), report);
    report
}

async fn resolve(locator: &dyn InstanceLocator, region: &str, target: &LogSource) -> Result<String> {
    match target {
        LogSource::ScalingGroup(group) => locator.first_instance_ip(region, group).await,
        LogSource::Instance(id) => locator.instance_ip(region, id).await,
        LogSource::Address { address, .. } => Ok(address.clone()),
    }
}

async fn collect_host(
    connector: &dyn RemoteConnector,
    host: &RemoteHost,
    target: &str,
    dest: &Path,
    report: &mut SnapshotReport,
) {
    let shell = match connector.connect(host).await {
        Ok(shell) => shell,
        Err(e) => return report.fail(target, e.to_string()),
    };
    let listing = match shell.run(&find_command()).await {
        Ok(listing) => listing,
        Err(e) => return report.fail(target, e.to_string()),
    };
    for remote in listing.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let local = local_path(dest, target, remote);
        match shell.download(remote, &local).await {
            Ok(()) => report.collected.push(local),
            Err(e) => report.fail(target, format!("{}: {}", remote, e)),
        }
    }
}
