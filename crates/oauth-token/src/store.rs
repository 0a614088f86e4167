//! Token file persistence
//!
//! A `TokenStore` is a pure transform between a `Token` and the bytes of
//! one file: serialize, optionally encrypt, write, or the reverse on the
//! way back in. It never retains a token between calls and does
//! exactly one file read or write per call. Writes go through a temp file
//! + rename in the target directory and the file is chmod 0600 on unix,
//! since it holds live credentials.

use std::path::{Path, PathBuf};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tracing::debug;

use crate::error::{LoadError, SaveError};
use crate::token::Token;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const CIPHER_BLOCK_LEN: usize = 16;

/// AES-128-CBC parameters derived from the client credentials.
///
/// Key = first 16 bytes of `client_secret`, IV = first 16 bytes of
/// `client_id`. Deterministic and unsalted, which keeps stored files
/// byte-compatible across runs and installations sharing the credentials.
struct CipherParams {
    key: [u8; CIPHER_BLOCK_LEN],
    iv: [u8; CIPHER_BLOCK_LEN],
}

impl CipherParams {
    fn derive(client_id: &str, client_secret: &str) -> common::Result<Self> {
        if client_secret.len() < CIPHER_BLOCK_LEN {
            return Err(common::Error::Config(format!(
                "client_secret must be at least {CIPHER_BLOCK_LEN} bytes to key token encryption"
            )));
        }
        if client_id.len() < CIPHER_BLOCK_LEN {
            return Err(common::Error::Config(format!(
                "client_id must be at least {CIPHER_BLOCK_LEN} bytes to derive the encryption IV"
            )));
        }
        let mut key = [0u8; CIPHER_BLOCK_LEN];
        let mut iv = [0u8; CIPHER_BLOCK_LEN];
        key.copy_from_slice(&client_secret.as_bytes()[..CIPHER_BLOCK_LEN]);
        iv.copy_from_slice(&client_id.as_bytes()[..CIPHER_BLOCK_LEN]);
        Ok(Self { key, iv })
    }

    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, LoadError> {
        if ciphertext.is_empty() || ciphertext.len() % CIPHER_BLOCK_LEN != 0 {
            return Err(LoadError::Decrypt);
        }
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| LoadError::Decrypt)
    }
}

/// Serializer/deserializer for one token file.
pub struct TokenStore {
    path: PathBuf,
    cipher: Option<CipherParams>,
}

impl TokenStore {
    /// Store writing the plaintext JSON record.
    pub fn plaintext(path: PathBuf) -> Self {
        Self { path, cipher: None }
    }

    /// Store encrypting the record with AES-128-CBC under key material
    /// taken from the client credentials.
    ///
    /// This scheme carries no integrity tag and no per-save randomness:
    /// anyone holding the client credentials can decrypt the file. Keep
    /// the credentials in a secure place; the encryption only raises the
    /// bar against casual reads of the token file itself.
    ///
    /// Fails with a configuration error when either credential is shorter
    /// than 16 bytes.
    pub fn encrypted(
        path: PathBuf,
        client_id: &str,
        client_secret: &str,
    ) -> common::Result<Self> {
        let cipher = CipherParams::derive(client_id, client_secret)?;
        Ok(Self {
            path,
            cipher: Some(cipher),
        })
    }

    /// Path of the token file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `token`, encrypt if configured, and write the file.
    pub async fn save(&self, token: &Token) -> Result<(), SaveError> {
        let mut bytes = serde_json::to_vec(token)?;
        if let Some(cipher) = &self.cipher {
            bytes = cipher.encrypt(&bytes);
        }
        write_atomic(&self.path, &bytes).await?;
        debug!(path = %self.path.display(), "persisted token");
        Ok(())
    }

    /// Read the file, decrypt if configured, and deserialize a `Token`.
    ///
    /// Fails with `LoadError` on a missing file, malformed ciphertext, or
    /// a malformed record; the caller decides the fallback.
    pub async fn load(&self) -> Result<Token, LoadError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let plaintext = match &self.cipher {
            Some(cipher) => cipher.decrypt(&bytes)?,
            None => bytes,
        };
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Write bytes to a file atomically via temp file + rename, 0600 on unix.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SaveError> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "token path has no parent directory",
        )
    })?;
    let tmp_path = dir.join(format!(".token.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_ID: &str = "client-id-0123456789abcdef";
    const CLIENT_SECRET: &str = "client-secret-0123456789abcdef";

    fn test_token() -> Token {
        Token::new(
            "at_abc".into(),
            3600,
            Some("rt_def".into()),
            1_700_000_000,
        )
    }

    #[tokio::test]
    async fn plaintext_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::plaintext(dir.path().join("token.json"));

        store.save(&test_token()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, test_token());
    }

    #[tokio::test]
    async fn plaintext_file_is_the_json_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::plaintext(dir.path().join("token.json"));
        store.save(&test_token()).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let record: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(record["access_token"], "at_abc");
        assert_eq!(record["valid_to"], 1_700_003_600i64);
        assert_eq!(record["refresh_token"], "rt_def");
        assert_eq!(record["token_type"], "bearer");
    }

    #[tokio::test]
    async fn encrypted_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            TokenStore::encrypted(dir.path().join("token"), CLIENT_ID, CLIENT_SECRET).unwrap();

        store.save(&test_token()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, test_token());
    }

    #[tokio::test]
    async fn ciphertext_is_not_the_plain_record() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            TokenStore::encrypted(dir.path().join("token"), CLIENT_ID, CLIENT_SECRET).unwrap();
        store.save(&test_token()).await.unwrap();

        let bytes = tokio::fs::read(store.path()).await.unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());
        assert!(!bytes.windows(6).any(|w| w == b"at_abc"));
        // CBC output is block-aligned
        assert_eq!(bytes.len() % 16, 0);
    }

    #[tokio::test]
    async fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::plaintext(dir.path().join("absent.json"));
        assert!(matches!(store.load().await, Err(LoadError::Io(_))));
    }

    #[tokio::test]
    async fn load_garbled_ciphertext_is_decrypt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        tokio::fs::write(&path, b"definitely not a cipher block").await.unwrap();

        let store = TokenStore::encrypted(path, CLIENT_ID, CLIENT_SECRET).unwrap();
        assert!(matches!(store.load().await, Err(LoadError::Decrypt)));
    }

    #[tokio::test]
    async fn load_truncated_ciphertext_is_decrypt_error() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            TokenStore::encrypted(dir.path().join("token"), CLIENT_ID, CLIENT_SECRET).unwrap();
        store.save(&test_token()).await.unwrap();

        let mut bytes = tokio::fs::read(store.path()).await.unwrap();
        bytes.truncate(bytes.len() - 16);
        // A truncated block sequence unpads to garbage with overwhelming
        // probability; chop to a non-multiple to make the failure certain.
        bytes.truncate(bytes.len() - 1);
        tokio::fs::write(store.path(), &bytes).await.unwrap();

        assert!(matches!(store.load().await, Err(LoadError::Decrypt)));
    }

    #[tokio::test]
    async fn load_malformed_record_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, b"{\"access_token\":42}").await.unwrap();

        let store = TokenStore::plaintext(path);
        assert!(matches!(store.load().await, Err(LoadError::Parse(_))));
    }

    #[test]
    fn short_client_secret_is_rejected() {
        let result = TokenStore::encrypted("t".into(), CLIENT_ID, "short");
        assert!(matches!(result, Err(common::Error::Config(_))));
    }

    #[test]
    fn short_client_id_is_rejected() {
        let result = TokenStore::encrypted("t".into(), "short", CLIENT_SECRET);
        assert!(matches!(result, Err(common::Error::Config(_))));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::plaintext(dir.path().join("token.json"));
        store.save(&test_token()).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().into_string().unwrap());
        }
        assert_eq!(names, vec!["token.json"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn token_file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::plaintext(dir.path().join("token.json"));
        store.save(&test_token()).await.unwrap();

        let metadata = tokio::fs::metadata(store.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn save_overwrites_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::plaintext(dir.path().join("token.json"));
        store.save(&test_token()).await.unwrap();

        let mut updated = test_token();
        updated.update("at_new".into(), 60, None, 1_700_010_000);
        store.save(&updated).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.access_token, "at_new");
        assert_eq!(loaded.refresh_token, None);
    }
}
