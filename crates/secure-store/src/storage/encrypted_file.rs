//! Encrypted file storage backend
//!
//! Stores one envelope per key at `<dir>/<key>.enc`:
//!
//! ```json
//! { "v": 1,
//!   "crypto": { "alg": "aes-256-gcm", "kdf": "scrypt", "N": 16384, "r": 8, "p": 1, "saltLen": 16 },
//!   "data": "base64(salt || iv || authTag || ciphertext)" }
//! ```
//!
//! Writes go to a temp file in the same directory, are fsynced, then renamed
//! over the final path. Readers see the old file or the new one, never a mix.
//! Anything that deviates from the envelope above is corrupt.

use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{
    decrypt, derive_key, encrypt, generate_salt, machine_secret, DerivedKey, EncryptedData,
    KdfParams, AUTH_TAG_LEN, IV_LEN, SALT_LEN,
};
use crate::error::{ErrorCode, SecureStoreError};
use crate::validation::{is_valid_key_name, validate_key_name};

/// Envelope format version
pub const ENVELOPE_VERSION: u64 = 1;

/// Fallback file extension
pub const FILE_EXTENSION: &str = "enc";

const ALGORITHM: &str = "aes-256-gcm";
const KDF: &str = "scrypt";

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    v: u64,
    crypto: CryptoHeader,
    data: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CryptoHeader {
    alg: String,
    kdf: String,
    #[serde(rename = "N")]
    n: u32,
    r: u32,
    p: u32,
    #[serde(rename = "saltLen")]
    salt_len: usize,
}

impl CryptoHeader {
    fn current() -> Self {
        let params = KdfParams::default();
        Self {
            alg: ALGORITHM.to_string(),
            kdf: KDF.to_string(),
            n: params.n,
            r: params.r,
            p: params.p,
            salt_len: SALT_LEN,
        }
    }
}

/// Encrypted file storage backend
#[derive(Debug, Clone)]
pub struct EncryptedFileStorage {
    /// Directory holding the `.enc` files
    dir: PathBuf,
    /// Service name mixed into key derivation
    service_name: String,
}

impl EncryptedFileStorage {
    /// Create a backend rooted at `dir`; nothing is touched until the first write
    pub fn new(dir: impl Into<PathBuf>, service_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            service_name: service_name.into(),
        }
    }

    /// Get the storage directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the envelope for `key`; the name must be valid
    pub fn entry_path(&self, key: &str) -> crate::Result<PathBuf> {
        validate_key_name(key)?;
        Ok(self.path_for(key))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{FILE_EXTENSION}"))
    }

    /// Encrypt `value` and atomically replace the envelope for `key`
    pub async fn write(&self, key: &str, value: &str) -> crate::Result<()> {
        let path = self.entry_path(key)?;

        self.ensure_dir().await.map_err(write_failure)?;
        let contents = self.seal(value).await?;
        let temp_path = self.stage(key, contents.as_bytes()).await?;
        self.commit(&temp_path, &path).await?;

        debug!(service = %self.service_name, "Wrote fallback envelope");
        Ok(())
    }

    /// Decrypt the envelope for `key`; `Ok(None)` when no file exists
    pub async fn read(&self, key: &str) -> crate::Result<Option<String>> {
        let path = self.entry_path(key)?;

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SecureStoreError::from(e).into()),
        };

        let (salt, encrypted) = parse_envelope(&raw).map_err(|reason| corrupt(&path, &reason))?;
        let file_key = self.derive(salt).await?;

        let plaintext = Zeroizing::new(
            decrypt(&encrypted, &file_key)
                .map_err(|_| corrupt(&path, "authentication tag verification failed"))?,
        );
        let value = std::str::from_utf8(&plaintext)
            .map_err(|_| corrupt(&path, "decrypted value is not valid UTF-8"))?
            .to_string();

        Ok(Some(value))
    }

    /// Delete the envelope for `key`; `Ok(false)` when there was none
    pub async fn remove(&self, key: &str) -> crate::Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SecureStoreError::from(e).into()),
        }
    }

    /// Whether an envelope file exists for `key`
    pub async fn exists(&self, key: &str) -> crate::Result<bool> {
        match tokio::fs::metadata(self.entry_path(key)?).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SecureStoreError::from(e).into()),
        }
    }

    /// Key names with an envelope on disk, sorted
    pub async fn list(&self) -> crate::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SecureStoreError::from(e).into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(SecureStoreError::from)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!("Skipping non UTF-8 file name in fallback dir");
                continue;
            };
            let Some(key) = name.strip_suffix(".enc") else {
                continue;
            };
            if !is_valid_key_name(key) {
                debug!(file = %name, "Skipping fallback file with malformed key name");
                continue;
            }
            keys.push(key.to_string());
        }

        keys.sort();
        Ok(keys)
    }

    async fn ensure_dir(&self) -> Result<(), SecureStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        #[cfg(unix)]
        set_mode(&self.dir, DIR_MODE).await?;
        Ok(())
    }

    /// Encrypt `value` into a serialized envelope
    async fn seal(&self, value: &str) -> Result<String, SecureStoreError> {
        let salt = generate_salt();
        let file_key = self.derive(salt).await?;
        let encrypted = encrypt(value.as_bytes(), &file_key)?;

        let mut payload = Vec::with_capacity(SALT_LEN + IV_LEN + AUTH_TAG_LEN + value.len());
        payload.extend_from_slice(&salt);
        encrypted.write_to(&mut payload);

        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            crypto: CryptoHeader::current(),
            data: STANDARD.encode(&payload),
        };

        serde_json::to_string_pretty(&envelope)
            .map_err(|e| SecureStoreError::unavailable(format!("Failed to encode envelope: {e}")))
    }

    /// scrypt is CPU-bound, so it runs on the blocking pool
    async fn derive(&self, salt: [u8; SALT_LEN]) -> Result<DerivedKey, SecureStoreError> {
        let secret = machine_secret(&self.service_name);
        tokio::task::spawn_blocking(move || derive_key(&secret, &salt, KdfParams::default()))
            .await
            .map_err(|e| SecureStoreError::unavailable(format!("Key derivation task failed: {e}")))?
    }

    /// Write `contents` to a fresh temp file next to the final path and fsync it
    pub(crate) async fn stage(
        &self,
        key: &str,
        contents: &[u8],
    ) -> Result<PathBuf, SecureStoreError> {
        let temp_path = self.dir.join(format!(
            ".{key}.{FILE_EXTENSION}.{}.tmp",
            uuid::Uuid::new_v4().simple()
        ));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let mut file = options.open(&temp_path).await.map_err(write_failure)?;

        let written = async {
            file.write_all(contents).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            discard(&temp_path).await;
            return Err(write_failure(e));
        }
        Ok(temp_path)
    }

    /// Rename a staged temp file over `final_path`
    pub(crate) async fn commit(
        &self,
        temp_path: &Path,
        final_path: &Path,
    ) -> Result<(), SecureStoreError> {
        if let Err(e) = tokio::fs::rename(temp_path, final_path).await {
            discard(temp_path).await;
            return Err(write_failure(e));
        }

        #[cfg(unix)]
        set_mode(final_path, FILE_MODE)
            .await
            .map_err(write_failure)?;

        sync_dir(&self.dir).await;
        Ok(())
    }
}

/// Validate and split an envelope into salt and ciphertext parts
fn parse_envelope(raw: &[u8]) -> Result<([u8; SALT_LEN], EncryptedData), String> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|_| "file is not a JSON envelope".to_string())?;

    match value.get("v") {
        Some(v) if v.as_u64() == Some(ENVELOPE_VERSION) => {}
        Some(v) => return Err(format!("unsupported envelope version {v}")),
        None => return Err("missing envelope version".to_string()),
    }

    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| format!("invalid envelope structure: {e}"))?;

    if envelope.crypto != CryptoHeader::current() {
        return Err("unsupported crypto parameters".to_string());
    }

    let payload = STANDARD
        .decode(envelope.data.as_bytes())
        .map_err(|_| "data is not valid base64".to_string())?;

    if payload.len() < SALT_LEN + IV_LEN + AUTH_TAG_LEN {
        return Err("data is truncated".to_string());
    }

    let (salt, rest) = payload.split_at(SALT_LEN);
    let salt: [u8; SALT_LEN] = salt
        .try_into()
        .map_err(|_| "data is truncated".to_string())?;
    let encrypted = EncryptedData::from_bytes(rest).ok_or_else(|| "data is truncated".to_string())?;

    Ok((salt, encrypted))
}

/// A vanished file or directory mid-write is a failed write, not absence
fn write_failure(err: impl Into<SecureStoreError>) -> SecureStoreError {
    let err = err.into();
    if err.code == ErrorCode::NotFound {
        return SecureStoreError::unavailable(err.message);
    }
    err
}

fn corrupt(path: &Path, reason: &str) -> SecureStoreError {
    SecureStoreError::corrupt(format!(
        "Fallback file {} is corrupt: {reason}",
        path.display()
    ))
}

async fn discard(temp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp_path).await {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(error = %e, "Failed to remove temp file {:?}", temp_path);
        }
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

/// Persist the rename itself; best effort
#[cfg(unix)]
async fn sync_dir(dir: &Path) {
    if let Ok(handle) = tokio::fs::File::open(dir).await {
        let _ = handle.sync_all().await;
    }
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) {}
