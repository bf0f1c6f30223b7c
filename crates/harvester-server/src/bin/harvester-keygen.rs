//! Writes a fresh RSA key pair for the agent/server key exchange.
//!
//! Usage: `harvester-keygen [private.pem] [public.pem]`

use anyhow::{Context, Result};
use harvester_common::handshake::{generate_key_pair, RSA_KEY_BITS};
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn restrict(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting {}", path.display()))
}

#[cfg(not(unix))]
fn restrict(_path: &Path) -> Result<()> {
    Ok(())
}

fn write_key(path: &Path, pem: &str, private: bool) -> Result<()> {
    std::fs::write(path, pem).with_context(|| format!("writing {}", path.display()))?;
    if private {
        restrict(path)?;
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let private_path = PathBuf::from(args.next().unwrap_or_else(|| "private.pem".to_string()));
    let public_path = PathBuf::from(args.next().unwrap_or_else(|| "public.pem".to_string()));

    let pair = generate_key_pair(RSA_KEY_BITS).context("generating RSA key pair")?;
    write_key(&private_path, &pair.private_pem, true)?;
    write_key(&public_path, &pair.public_pem, false)?;

    println!(
        "wrote {} (server CRYPTO_KEY) and {} (agent CRYPTO_KEY)",
        private_path.display(),
        public_path.display()
    );
    Ok(())
}
