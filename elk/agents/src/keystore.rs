use crate::command;
use crate::constants::{KEYSTORE_SCRIPT_PATH, STORE_PASSWORD};
use crate::error::{self, Result};
use elk_test_model::KeystoreBundle;
use log::info;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// The programs the provisioner shells out to. They can be replaced with stand-ins for testing.
#[derive(Debug, Clone)]
pub struct KeystoreTools {
    pub git: PathBuf,
    pub keytool: PathBuf,
    pub openssl: PathBuf,
}

impl Default for KeystoreTools {
    fn default() -> Self {
        Self {
            git: PathBuf::from("git"),
            keytool: PathBuf::from("keytool"),
            openssl: PathBuf::from("openssl"),
        }
    }
}

/// The PEM certificate and the private key (PEM and PKCS8) exported from a Java key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedKeys {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub p8_key_file: PathBuf,
}

/// Produces the Java key store, trust store and derived PEM/PKCS8 files that the SSL variants of
/// the images are built with.
#[derive(Debug, Clone, Default)]
pub struct KeystoreProvisioner {
    tools: KeystoreTools,
}

impl KeystoreProvisioner {
    pub fn new(tools: KeystoreTools) -> Self {
        Self { tools }
    }

    /// Clones the repository holding the key store generation script into `dest`, replacing
    /// whatever was there.
    pub async fn download_keystore_script(&self, repo_url: &str, dest: &Path) -> Result<()> {
        remove_dir_if_exists(dest).await?;
        command::run(
            Command::new(&self.tools.git)
                .arg("clone")
                .arg(repo_url)
                .arg(dest),
        )
        .await?;
        Ok(())
    }

    /// Generates `<name>.server.keystore.jks`, `<name>.server.truststore.jks`, a certificate, its
    /// key and the CA file under `<output_dir>/ssl` for `domain`. Artifacts of an earlier run are
    /// removed first.
    pub async fn generate_key_store(
        &self,
        name: &str,
        script_repo: &Path,
        output_dir: &Path,
        domain: &str,
    ) -> Result<KeystoreBundle> {
        let ssl_dir = output_dir.join("ssl");
        let bundle = KeystoreBundle {
            cert_file: ssl_dir.join("localhost.pem"),
            key_file: ssl_dir.join("localhost.key"),
            p8_key_file: PathBuf::new(),
            ca_file: ssl_dir.join("caFile"),
            key_store_path: ssl_dir.join(format!("{}.server.keystore.jks", name)),
            key_store_password: STORE_PASSWORD.to_string(),
            trust_store_path: ssl_dir.join(format!("{}.server.truststore.jks", name)),
            trust_store_password: STORE_PASSWORD.to_string(),
        };

        for previous in [
            &bundle.key_store_path,
            &bundle.trust_store_path,
            &bundle.cert_file,
            &bundle.ca_file,
        ] {
            remove_file_if_exists(previous).await?;
        }
        tokio::fs::create_dir_all(&ssl_dir)
            .await
            .context(error::CreateDirSnafu { path: &ssl_dir })?;

        info!("Generating key stores for '{}' in '{}'", domain, ssl_dir.display());
        command::run(
            Command::new(script_repo.join(KEYSTORE_SCRIPT_PATH))
                .arg("--key-store-path")
                .arg(&bundle.key_store_path)
                .arg("--trust-store-path")
                .arg(&bundle.trust_store_path)
                .arg("--cert-path")
                .arg(&bundle.cert_file)
                .arg("--ca-path")
                .arg(&bundle.ca_file)
                .args(["--org", "Gruntwork"])
                .args(["--org-unit", "Engineering"])
                .args(["--city", "Phoenix"])
                .args(["--state", "AZ"])
                .args(["--country", "US"])
                .args(["--cert-common-name", domain])
                .args(["--domain", domain])
                .args(["--ip", "127.0.0.1"])
                .arg("--out-cert-key-path")
                .arg(&bundle.key_file)
                .env("KEY_STORE_PASSWORD", STORE_PASSWORD)
                .env("TRUST_STORE_PASSWORD", STORE_PASSWORD),
        )
        .await?;
        Ok(bundle)
    }

    /// Exports the certificate stored under `alias` in the bundle's key store to
    /// `<output_dir>/<alias>.pem` and its private key to `<output_dir>/<alias>.key` (PEM) and
    /// `<output_dir>/<alias>.p8` (unencrypted PKCS8). `p12_path` is an intermediate PKCS12
    /// container that is deleted at the end.
    pub async fn export_cert_and_key(
        &self,
        bundle: &KeystoreBundle,
        alias: &str,
        output_dir: &Path,
        p12_path: &Path,
    ) -> Result<ExportedKeys> {
        let password = &bundle.key_store_password;
        let keys = ExportedKeys {
            cert_file: output_dir.join(format!("{}.pem", alias)),
            key_file: output_dir.join(format!("{}.key", alias)),
            p8_key_file: output_dir.join(format!("{}.p8", alias)),
        };

        command::run(
            Command::new(&self.tools.keytool)
                .arg("-exportcert")
                .args(["-alias", alias])
                .arg("-keystore")
                .arg(&bundle.key_store_path)
                .args(["-storepass", password])
                .arg("-rfc")
                .arg("-file")
                .arg(&keys.cert_file),
        )
        .await?;

        command::run(
            Command::new(&self.tools.keytool)
                .arg("-importkeystore")
                .arg("-srckeystore")
                .arg(&bundle.key_store_path)
                .arg("-destkeystore")
                .arg(p12_path)
                .args(["-srcstorepass", password])
                .args(["-deststorepass", password])
                .args(["-deststoretype", "PKCS12"]),
        )
        .await?;

        command::run(
            Command::new(&self.tools.openssl)
                .arg("pkcs12")
                .arg("-in")
                .arg(p12_path)
                .arg("-nodes")
                .arg("-nocerts")
                .arg("-password")
                .arg(format!("pass:{}", password))
                .arg("-out")
                .arg(&keys.key_file),
        )
        .await?;

        command::run(
            Command::new(&self.tools.openssl)
                .arg("pkcs8")
                .arg("-in")
                .arg(&keys.key_file)
                .arg("-topk8")
                .arg("-nocrypt")
                .arg("-out")
                .arg(&keys.p8_key_file),
        )
        .await?;

        tokio::fs::remove_file(p12_path)
            .await
            .context(error::RemoveFileSnafu { path: p12_path })?;
        Ok(keys)
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).context(error::RemoveFileSnafu { path })
        }
        _ => Ok(()),
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).context(error::RemoveFileSnafu { path })
        }
        _ => Ok(()),
    }
}
