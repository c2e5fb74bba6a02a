//! Device keypair lifecycle
//!
//! The agent's long-term credential is an RSA keypair persisted at a single
//! well-known path. It is generated exactly once; an existing key file is
//! authoritative and is never overwritten. Only the public half ever leaves
//! the machine, PEM-encoded inside the authorization request.

use std::fs;
use std::io::Write;
use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

const KEY_BITS: usize = 2048;

/// Key generation and load failures
#[derive(Debug, Error)]
pub enum KeyError {
    /// Reading or writing the key file failed
    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    Generate(#[from] rsa::Error),

    /// Private key PEM encoding or decoding failed
    #[error("private key PEM error: {0}")]
    Pem(#[from] rsa::pkcs1::Error),

    /// Public key encoding failed
    #[error("public key encoding failed: {0}")]
    Encode(#[from] rsa::pkcs8::spki::Error),
}

/// Ensure a private key exists at `path`, generating one if absent.
///
/// Idempotent: when the file already exists this is a no-op, so the device
/// credential stays stable across restarts and reinstalls that preserve the
/// key file.
pub fn ensure_keypair(path: &Path) -> Result<(), KeyError> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "using existing private key");
        return Ok(());
    }

    tracing::info!(path = %path.display(), "generating new private key");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
    let pem = key.to_pkcs1_pem(LineEnding::LF)?;

    write_owner_only(path, pem.as_bytes())?;

    Ok(())
}

/// Derive the SPKI PEM public key from the private key file.
pub fn load_public_key_pem(path: &Path) -> Result<String, KeyError> {
    let pem = fs::read_to_string(path)?;
    let key = RsaPrivateKey::from_pkcs1_pem(&pem)?;
    let public = RsaPublicKey::from(&key);

    Ok(public.to_public_key_pem(LineEnding::LF)?)
}

/// Write the key file with owner-only permissions, refusing to clobber an
/// existing file.
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;

    Ok(())
}
