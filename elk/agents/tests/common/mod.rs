// Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use elk_agents::aws::{CloudServices, InstanceLocator};
use elk_agents::error::{self, Error, Result};
use elk_agents::keystore::KeystoreProvisioner;
use elk_agents::packer::{ImageBuilder, ImageRequest};
use elk_agents::remote::{RemoteConnector, RemoteHost, RemoteShell};
use elk_agents::scenario::Toolbox;
use elk_agents::terraform::{InfraEngine, Outputs};
use elk_test_model::{DeploymentConfig, Ec2KeyPair};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

/// A local HTTP server that answers request number `n` (counting from zero) with `respond(n)`.
pub struct HttpServer {
    pub port: u16,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl HttpServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
    {
        Self::serve(None, respond).await
    }

    /// Serves HTTPS with the certificate and key named `name` under `tests/data/tls`.
    pub async fn start_tls<F>(name: &str, respond: F) -> Self
    where
        F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
    {
        Self::serve(Some(tls_acceptor(name)), respond).await
    }

    async fn serve<F>(acceptor: Option<TlsAcceptor>, respond: F) -> Self
    where
        F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::clone(&hits);
        let received = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let answer = respond(counter.fetch_add(1, Ordering::SeqCst));
                match &acceptor {
                    Some(acceptor) => {
                        if let Ok(stream) = acceptor.accept(stream).await {
                            reply(stream, answer, &received).await;
                        }
                    }
                    None => reply(stream, answer, &received).await,
                }
            }
        });
        Self {
            port,
            hits,
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// The heads of the requests read so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn tls_file(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data/tls")
        .join(name)
}

fn tls_acceptor(name: &str) -> TlsAcceptor {
    let cert = std::fs::read(tls_file(&format!("{}.pem", name))).unwrap();
    let key = std::fs::read(tls_file(&format!("{}.key", name))).unwrap();
    let certs = rustls_pemfile::certs(&mut cert.as_slice())
        .unwrap()
        .into_iter()
        .map(rustls::Certificate)
        .collect();
    let key = rustls_pemfile::pkcs8_private_keys(&mut key.as_slice())
        .unwrap()
        .remove(0);
    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, rustls::PrivateKey(key))
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn reply<S>(mut stream: S, (status, body): (u16, String), received: &Mutex<Vec<String>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(head) = read_request(&mut stream).await {
        received.lock().unwrap().push(head);
    }
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        if status == 200 { "OK" } else { "Unavailable" },
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Option<String> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    Some(String::from_utf8_lossy(&request).to_string())
}

pub fn unexpected(call: &str) -> Error {
    error::MissingSnafu {
        what: call,
        from: "the test doubles",
    }
    .build()
}

/// Records what was applied and destroyed and reports fixed outputs.
#[derive(Default)]
pub struct FakeInfra {
    pub outputs: Outputs,
    pub fail_apply: bool,
    pub applied: Mutex<Vec<PathBuf>>,
    pub destroyed: Mutex<Vec<PathBuf>>,
}

impl FakeInfra {
    pub fn with_outputs(json: &str) -> Self {
        Self {
            outputs: Outputs::from_json(json).unwrap(),
            ..Default::default()
        }
    }

    pub fn destroyed(&self) -> Vec<PathBuf> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl InfraEngine for FakeInfra {
    async fn apply(&self, config: &DeploymentConfig) -> Result<Outputs> {
        if self.fail_apply {
            return Err(unexpected("terraform apply"));
        }
        self.applied
            .lock()
            .unwrap()
            .push(config.terraform_dir.clone());
        Ok(self.outputs.clone())
    }

    async fn destroy(&self, config: &DeploymentConfig) -> Result<()> {
        self.destroyed
            .lock()
            .unwrap()
            .push(config.terraform_dir.clone());
        Ok(())
    }

    async fn outputs(&self, _: &DeploymentConfig) -> Result<Outputs> {
        Ok(self.outputs.clone())
    }
}

/// Fails every call. Stands in for collaborators a test must not reach.
pub struct Unreachable;

#[async_trait]
impl ImageBuilder for Unreachable {
    async fn build_image(&self, _: &ImageRequest) -> Result<String> {
        Err(unexpected("build_image"))
    }

    async fn build_docker_image(&self, _: &Path, _: &str, _: &str) -> Result<()> {
        Err(unexpected("build_docker_image"))
    }
}

#[async_trait]
impl CloudServices for Unreachable {
    async fn recommended_instance_type(&self, _: &str, _: &[&str]) -> Result<String> {
        Err(unexpected("recommended_instance_type"))
    }

    async fn create_key_pair(&self, _: &str, _: &str, _: &Path) -> Result<Ec2KeyPair> {
        Err(unexpected("create_key_pair"))
    }

    async fn delete_key_pair(&self, _: &Ec2KeyPair) -> Result<()> {
        Err(unexpected("delete_key_pair"))
    }

    async fn create_secret(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String> {
        Err(unexpected("create_secret"))
    }

    async fn delete_secret(&self, _: &str, _: &str) -> Result<()> {
        Err(unexpected("delete_secret"))
    }

    async fn put_log_event(&self, _: &str, _: &str, _: &str) -> Result<()> {
        Err(unexpected("put_log_event"))
    }

    async fn put_s3_object(&self, _: &str, _: &str, _: &str) -> Result<String> {
        Err(unexpected("put_s3_object"))
    }

    async fn delete_s3_object(&self, _: &str, _: &str, _: &str) -> Result<()> {
        Err(unexpected("delete_s3_object"))
    }
}

#[async_trait]
impl InstanceLocator for Unreachable {
    async fn first_instance_ip(&self, _: &str, group: &str) -> Result<String> {
        Err(unexpected(&format!("first_instance_ip({})", group)))
    }

    async fn instance_ip(&self, _: &str, instance_id: &str) -> Result<String> {
        Err(unexpected(&format!("instance_ip({})", instance_id)))
    }
}

#[async_trait]
impl RemoteConnector for Unreachable {
    async fn connect(&self, host: &RemoteHost) -> Result<Box<dyn RemoteShell>> {
        Err(unexpected(&format!("connect({})", host.address)))
    }
}

/// A remote host whose `run` answers come from a script, one per call. Once the script is used up
/// the last answer repeats. Downloads write the remote path into the local file.
#[derive(Clone, Default)]
pub struct ScriptedHost {
    answers: Arc<Mutex<VecDeque<String>>>,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub connections: Arc<AtomicUsize>,
}

impl ScriptedHost {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(
                answers.iter().map(|answer| answer.to_string()).collect(),
            )),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteConnector for ScriptedHost {
    async fn connect(&self, _: &RemoteHost) -> Result<Box<dyn RemoteShell>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RemoteShell for ScriptedHost {
    async fn run(&self, command: &str) -> Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        let mut answers = self.answers.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front().unwrap_or_default()
        } else {
            answers.front().cloned().unwrap_or_default()
        };
        Ok(answer)
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(local, remote).unwrap();
        Ok(())
    }
}

/// A toolbox where only `infra` does anything.
pub fn toolbox(infra: Arc<FakeInfra>) -> Toolbox {
    Toolbox {
        images: Arc::new(Unreachable),
        infra,
        remote: Arc::new(Unreachable),
        cloud: Arc::new(Unreachable),
        instances: Arc::new(Unreachable),
        keystore: KeystoreProvisioner::default(),
        docker: PathBuf::from("docker"),
    }
}
