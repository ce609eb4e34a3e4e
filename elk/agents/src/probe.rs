/*!

Validation probes poll an endpoint until it answers the way a healthy deployment would, or until
their [`RetryPolicy`] is used up. Every failed attempt is logged; exhaustion is an error that names
the probe, the number of attempts and the last failure.

!*/

use crate::constants::KIBANA_USER;
use crate::error::{self, Error, Result};
use crate::remote::{RemoteConnector, RemoteHost};
use log::{info, warn};
use snafu::{OptionExt, ResultExt};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::sleep;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many times a probe tries and how long it waits between tries. There is no wait after the
/// last attempt.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub sleep: Duration,
}

impl RetryPolicy {
    /// Search queries against Elasticsearch.
    pub const SEARCH: RetryPolicy = RetryPolicy::new(75, Duration::from_secs(4));
    /// A cluster coming up behind a load balancer.
    pub const CLUSTER_UP: RetryPolicy = RetryPolicy::new(180, Duration::from_secs(5));
    pub const KIBANA_STATUS: RetryPolicy = RetryPolicy::new(30, Duration::from_secs(5));
    pub const HTTPS: RetryPolicy = RetryPolicy::new(180, Duration::from_secs(5));
    pub const TCP: RetryPolicy = RetryPolicy::new(180, Duration::from_secs(5));
    pub const REMOTE_LOG: RetryPolicy = RetryPolicy::new(20, Duration::from_secs(10));
    pub const SSH: RetryPolicy = RetryPolicy::new(10, Duration::from_secs(30));

    pub const fn new(max_attempts: u32, sleep: Duration) -> Self {
        Self {
            max_attempts,
            sleep,
        }
    }
}

/// Calls `attempt` until it succeeds or `policy.max_attempts` calls have failed.
pub async fn retry<T, F, Fut>(description: &str, policy: RetryPolicy, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = String::from("no attempt was made");
    for attempt_number in 1..=policy.max_attempts {
        info!(
            "{} (attempt {} of {})",
            description, attempt_number, policy.max_attempts
        );
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{} failed: {}", description, e);
                last_error = e.to_string();
            }
        }
        if attempt_number < policy.max_attempts {
            sleep(policy.sleep).await;
        }
    }
    error::ExhaustedSnafu {
        description,
        attempts: policy.max_attempts,
        last_error,
    }
    .fail()
}

/// TLS settings for probing an endpoint that uses the certificates generated for the run.
#[derive(Debug, Clone)]
pub struct HttpsOptions {
    /// PEM file holding the CA that signed the server certificate.
    pub ca_file: PathBuf,
    /// Skip server certificate verification. The generated certificates are issued for the
    /// deployment's DNS name, which does not match the load balancer host name being probed.
    pub accept_invalid_certs: bool,
    /// Basic auth password for the [`KIBANA_USER`].
    pub password: String,
}

/// Issues `GET url` until the response status is 200 and the body contains `expected`. Returns the
/// matching body.
pub async fn http_get_until(url: &str, expected: &str, policy: RetryPolicy) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context(error::HttpClientSnafu)?;
    info!("Checking '{}' for '{}'", url, expected);
    retry(&format!("HTTP GET {}", url), policy, || {
        get_and_match(&client, url, expected, None)
    })
    .await
}

/// Like [`http_get_until`] over TLS with the CA of `options` and basic auth.
pub async fn https_get_until(
    url: &str,
    expected: &str,
    options: &HttpsOptions,
    policy: RetryPolicy,
) -> Result<String> {
    let pem = tokio::fs::read(&options.ca_file)
        .await
        .context(error::CaFileSnafu {
            path: &options.ca_file,
        })?;
    let ca = reqwest::Certificate::from_pem(&pem).context(error::CaCertificateSnafu {
        path: &options.ca_file,
    })?;
    let client = reqwest::Client::builder()
        .add_root_certificate(ca)
        .danger_accept_invalid_certs(options.accept_invalid_certs)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context(error::HttpClientSnafu)?;
    info!("Checking '{}' for '{}'", url, expected);
    retry(&format!("HTTPS GET {}", url), policy, || {
        get_and_match(&client, url, expected, Some(options.password.as_str()))
    })
    .await
}

async fn get_and_match(
    client: &reqwest::Client,
    url: &str,
    expected: &str,
    password: Option<&str>,
) -> Result<String> {
    let mut request = client.get(url);
    if let Some(password) = password {
        request = request.basic_auth(KIBANA_USER, Some(password));
    }
    let response = request
        .send()
        .await
        .context(error::HttpRequestSnafu { url })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .context(error::HttpRequestSnafu { url })?;
    if status == reqwest::StatusCode::OK && body.contains(expected) {
        Ok(body)
    } else {
        Err(Error::UnexpectedResponse {
            url: url.to_string(),
            status: status.as_u16(),
            expected: expected.to_string(),
            body,
        })
    }
}

/// Opens TCP connections to `address` (`host:port`) until one succeeds. An address that cannot be
/// parsed or resolved fails immediately.
pub async fn tcp_reachable(address: &str, policy: RetryPolicy) -> Result<()> {
    let resolved = lookup_host(address)
        .await
        .context(error::InvalidAddressSnafu { address })?
        .next()
        .context(error::UnresolvedAddressSnafu { address })?;
    retry(&format!("TCP connect {}", address), policy, || async move {
        TcpStream::connect(resolved)
            .await
            .context(error::TcpConnectSnafu { address })?;
        Ok(())
    })
    .await
}

/// Reads `path` on `host` with `sudo cat` until the file is non-empty and contains `expected`.
/// Connection failures are retried like any other failed attempt.
pub async fn remote_log_contains(
    connector: &dyn RemoteConnector,
    host: &RemoteHost,
    path: &str,
    expected: &str,
    policy: RetryPolicy,
) -> Result<()> {
    let command = format!("sudo cat {}", path);
    let command = command.as_str();
    retry(
        &format!("Check '{}' on '{}'", path, host.address),
        policy,
        || async move {
            let shell = connector.connect(host).await?;
            let contents = shell.run(command).await?;
            if contents.is_empty() {
                return error::RemoteLogSnafu {
                    host: &host.address,
                    path,
                    problem: "is empty",
                }
                .fail();
            }
            if !contents.contains(expected) {
                return error::RemoteLogSnafu {
                    host: &host.address,
                    path,
                    problem: format!("does not contain '{}'", expected),
                }
                .fail();
            }
            Ok(())
        },
    )
    .await
}
