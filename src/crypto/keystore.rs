//! Persisted agent key pair.
//!
//! The agent's Ed25519 key pair lives in two PEM files: the private key
//! as PKCS#8 (`PRIVATE KEY`, mode 0600) and the public key as
//! SubjectPublicKeyInfo (`PUBLIC KEY`, mode 0644). Writes are atomic via
//! a sibling temp file and rename, so a crash never leaves a torn key.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::pkcs8::spki::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use pkcs8::LineEnding;
use ed25519_dalek::{SigningKey, VerifyingKey};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::keys::SigningKeyPair;
use crate::error::{Error, Result};

/// Environment override for the key location. A directory gets the
/// default file names inside it; anything else is treated as the private
/// key path with the public path derived as a sibling.
pub const AGENT_KEY_ENV_PATH: &str = "SWITCHBOARD_AGENT_KEY_PATH";

pub const DEFAULT_PRIVATE_KEY_NAME: &str = "agent_ed25519_private.pem";
pub const DEFAULT_PUBLIC_KEY_NAME: &str = "agent_ed25519_public.pem";

/// The agent's persisted credential.
#[derive(Debug, Clone)]
pub struct AgentKey {
    pub keypair: SigningKeyPair,
    pub agent_id: String,
}

/// Load the persisted agent key pair, generating and persisting a fresh
/// one on first use.
pub fn load_or_create_agent_key() -> Result<AgentKey> {
    let (private_path, public_path) = agent_key_paths()?;
    load_or_create_agent_key_at(&private_path, &public_path)
}

/// Load or create the agent key pair at explicit paths.
///
/// A pair with exactly one file present fails loudly: regenerating
/// silently would rotate the agent identity behind the operator's back.
pub fn load_or_create_agent_key_at(private_path: &Path, public_path: &Path) -> Result<AgentKey> {
    let private_bytes = fs::read(private_path);
    let public_bytes = fs::read(public_path);
    let private_missing =
        matches!(&private_bytes, Err(e) if e.kind() == io::ErrorKind::NotFound);
    let public_missing = matches!(&public_bytes, Err(e) if e.kind() == io::ErrorKind::NotFound);

    match (private_bytes, public_bytes) {
        (Ok(private_bytes), Ok(public_bytes)) => {
            let signing = parse_private_key(&private_bytes).map_err(|e| {
                Error::InvalidKey(format!(
                    "invalid private key {}: {e}",
                    private_path.display()
                ))
            })?;
            let public = parse_public_key(&public_bytes).map_err(|e| {
                Error::InvalidKey(format!("invalid public key {}: {e}", public_path.display()))
            })?;

            let keypair = SigningKeyPair::from_signing_key(signing);
            if keypair.verifying_key() != &public {
                return Err(Error::InvalidKey(
                    "public key does not match private key".into(),
                ));
            }

            let agent_id = keypair.agent_id();
            debug!(%agent_id, "loaded agent key pair");
            Ok(AgentKey { keypair, agent_id })
        }

        _ if private_missing && public_missing => {
            let keypair = SigningKeyPair::generate();
            persist_keypair(&keypair, private_path, public_path)?;
            let agent_id = keypair.agent_id();
            info!(%agent_id, path = %private_path.display(), "generated new agent key pair");
            Ok(AgentKey { keypair, agent_id })
        }

        _ if private_missing != public_missing => Err(Error::InvalidKey(format!(
            "keypair incomplete: private {} exists={}, public {} exists={}",
            private_path.display(),
            !private_missing,
            public_path.display(),
            !public_missing,
        ))),

        (Err(err), _) | (_, Err(err)) => Err(err.into()),
    }
}

/// Resolve the key file paths from the environment override or the
/// per-user default location.
pub fn agent_key_paths() -> Result<(PathBuf, PathBuf)> {
    if let Some(overridden) = env::var_os(AGENT_KEY_ENV_PATH) {
        if !overridden.is_empty() {
            return Ok(key_paths_from_override(Path::new(&overridden)));
        }
    }

    let base = directories::BaseDirs::new()
        .ok_or_else(|| Error::Config("cannot determine user config directory".into()))?;
    let key_dir = base.config_dir().join("switchboard").join("keys");
    Ok((
        key_dir.join(DEFAULT_PRIVATE_KEY_NAME),
        key_dir.join(DEFAULT_PUBLIC_KEY_NAME),
    ))
}

/// Resolve key file paths from an explicit override path.
pub fn key_paths_from_override(overridden: &Path) -> (PathBuf, PathBuf) {
    if overridden.is_dir() {
        return (
            overridden.join(DEFAULT_PRIVATE_KEY_NAME),
            overridden.join(DEFAULT_PUBLIC_KEY_NAME),
        );
    }
    (overridden.to_path_buf(), derive_public_path(overridden))
}

fn derive_public_path(private_path: &Path) -> PathBuf {
    let base = private_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let public_base = if base.contains("private") {
        base.replacen("private", "public", 1)
    } else if let Some(stem) = base.strip_suffix(".pem") {
        format!("{stem}.pub.pem")
    } else if let Some(stem) = base.strip_suffix(".der") {
        format!("{stem}.pub.der")
    } else {
        format!("{base}.pub")
    };

    private_path.with_file_name(public_base)
}

fn parse_private_key(bytes: &[u8]) -> std::result::Result<SigningKey, String> {
    if looks_like_pem(bytes) {
        let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
        SigningKey::from_pkcs8_pem(text.trim()).map_err(|e| e.to_string())
    } else {
        // Assume raw PKCS#8 DER.
        SigningKey::from_pkcs8_der(bytes).map_err(|e| e.to_string())
    }
}

fn parse_public_key(bytes: &[u8]) -> std::result::Result<VerifyingKey, String> {
    if looks_like_pem(bytes) {
        let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
        VerifyingKey::from_public_key_pem(text.trim()).map_err(|e| e.to_string())
    } else {
        // Assume raw SubjectPublicKeyInfo DER.
        VerifyingKey::from_public_key_der(bytes).map_err(|e| e.to_string())
    }
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"-----BEGIN")
}

fn persist_keypair(
    keypair: &SigningKeyPair,
    private_path: &Path,
    public_path: &Path,
) -> Result<()> {
    let private_pem: Zeroizing<String> = keypair
        .signing_key()
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::InvalidKey(format!("encode private key: {e}")))?;
    let public_pem = keypair
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::InvalidKey(format!("encode public key: {e}")))?;

    write_file_atomic(private_path, private_pem.as_bytes(), 0o600)?;
    write_file_atomic(public_path, public_pem.as_bytes(), 0o644)?;
    Ok(())
}

fn write_file_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_key_dir(parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("invalid key path {}", path.display())))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    // A stale temp file from a crashed run must not survive into create_new.
    let _ = fs::remove_file(&tmp);
    write_new_with_mode(&tmp, contents, mode)?;

    // Windows rename will not replace an existing file.
    #[cfg(windows)]
    let _ = fs::remove_file(path);

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

#[cfg(unix)]
fn create_key_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_key_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Create the file with the target mode in the same syscall, so key
/// material is never readable under the process umask in between.
#[cfg(unix)]
fn write_new_with_mode(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_new_with_mode(path: &Path, contents: &[u8], _mode: u32) -> io::Result<()> {
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serializes tests that touch AGENT_KEY_ENV_PATH; the process
    // environment is shared across test threads.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn creates_then_reloads_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join(DEFAULT_PRIVATE_KEY_NAME);
        let public = dir.path().join(DEFAULT_PUBLIC_KEY_NAME);

        let created = load_or_create_agent_key_at(&private, &public).unwrap();
        assert!(private.exists());
        assert!(public.exists());

        let reloaded = load_or_create_agent_key_at(&private, &public).unwrap();
        assert_eq!(created.agent_id, reloaded.agent_id);
        assert_eq!(
            created.keypair.public_bytes(),
            reloaded.keypair.public_bytes()
        );
    }

    #[cfg(unix)]
    #[test]
    fn key_files_have_expected_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join(DEFAULT_PRIVATE_KEY_NAME);
        let public = dir.path().join(DEFAULT_PUBLIC_KEY_NAME);
        load_or_create_agent_key_at(&private, &public).unwrap();

        let private_mode = fs::metadata(&private).unwrap().permissions().mode() & 0o777;
        let public_mode = fs::metadata(&public).unwrap().permissions().mode() & 0o777;
        assert_eq!(private_mode, 0o600);
        assert_eq!(public_mode, 0o644);
    }

    #[test]
    fn partial_pair_fails_instead_of_regenerating() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join(DEFAULT_PRIVATE_KEY_NAME);
        let public = dir.path().join(DEFAULT_PUBLIC_KEY_NAME);

        load_or_create_agent_key_at(&private, &public).unwrap();
        fs::remove_file(&public).unwrap();

        let err = load_or_create_agent_key_at(&private, &public).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)), "got {err:?}");
        // The surviving private key must not have been rotated.
        assert!(private.exists());
        assert!(!public.exists());
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join(DEFAULT_PRIVATE_KEY_NAME);
        let public = dir.path().join(DEFAULT_PUBLIC_KEY_NAME);
        load_or_create_agent_key_at(&private, &public).unwrap();

        // Overwrite the public half with a key from a different pair.
        let other = SigningKeyPair::generate();
        let other_pem = other
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        fs::write(&public, other_pem).unwrap();

        let err = load_or_create_agent_key_at(&private, &public).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)), "got {err:?}");
    }

    #[test]
    fn raw_der_key_files_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("agent.der");
        let public = dir.path().join("agent.pub.der");

        let keypair = SigningKeyPair::generate();
        let private_der = keypair.signing_key().to_pkcs8_der().unwrap();
        let public_der = keypair.verifying_key().to_public_key_der().unwrap();
        fs::write(&private, private_der.as_bytes()).unwrap();
        fs::write(&public, public_der.as_bytes()).unwrap();

        let loaded = load_or_create_agent_key_at(&private, &public).unwrap();
        assert_eq!(loaded.agent_id, keypair.agent_id());
    }

    #[test]
    fn public_path_derivation_rules() {
        let cases = [
            ("agent_ed25519_private.pem", "agent_ed25519_public.pem"),
            ("custom_private_key.pem", "custom_public_key.pem"),
            ("agent.pem", "agent.pub.pem"),
            ("agent.der", "agent.pub.der"),
            ("agentkey", "agentkey.pub"),
        ];
        for (private, public) in cases {
            let derived = derive_public_path(Path::new(private));
            assert_eq!(derived, PathBuf::from(public), "for {private}");
        }
    }

    #[test]
    fn env_override_directory_uses_default_names() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        env::set_var(AGENT_KEY_ENV_PATH, dir.path());

        let (private, public) = agent_key_paths().unwrap();
        env::remove_var(AGENT_KEY_ENV_PATH);

        assert_eq!(private, dir.path().join(DEFAULT_PRIVATE_KEY_NAME));
        assert_eq!(public, dir.path().join(DEFAULT_PUBLIC_KEY_NAME));
    }

    #[test]
    fn env_override_file_derives_public_sibling() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("my_private.pem");
        env::set_var(AGENT_KEY_ENV_PATH, &private);

        let (resolved_private, resolved_public) = agent_key_paths().unwrap();
        env::remove_var(AGENT_KEY_ENV_PATH);

        assert_eq!(resolved_private, private);
        assert_eq!(resolved_public, dir.path().join("my_public.pem"));
    }
}
