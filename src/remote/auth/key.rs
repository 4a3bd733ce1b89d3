//! Private key file SSH authentication.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::remote::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Public key authentication with a key loaded from disk.
///
/// The key is read and parsed when the strategy is built, so a bad identity
/// file is known before any connection is made. Only passphrase-less keys
/// are supported.
pub struct KeyAuth {
    key: Arc<keys::PrivateKey>,
}

impl KeyAuth {
    /// Read and parse the private key at `path`.
    pub fn load(path: &Path) -> Result<Self, keys::Error> {
        let key = keys::load_secret_key(path, None)?;
        debug!(path = %path.display(), algorithm = %key.algorithm(), "loaded private key");
        Ok(Self { key: Arc::new(key) })
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error> {
        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!(?hash_alg, "using RSA hash algorithm for key auth");

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::clone(&self.key), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "publickey"
    }
}
