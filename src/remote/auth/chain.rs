//! Ordered authentication method list for one host.

use async_trait::async_trait;
use russh::client;
use tracing::{debug, warn};

use crate::remote::error::RemoteError;
use crate::remote::session::SshClientHandler;
use crate::remote::types::ConnectionParams;

use super::traits::AuthStrategy;
use super::{EmptyInteractiveAuth, KeyAuth, PasswordAuth};

/// Authentication chain that tries multiple strategies in order.
///
/// Strategies are tried in the order they were added. The first accepted
/// method stops the chain.
///
/// # Example
///
/// ```ignore
/// let chain = AuthChain::for_target(&params, Some("secret"))?;
/// let accepted = chain.authenticate(&mut handle, &params.user).await?;
/// ```
pub struct AuthChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    /// Create a new empty authentication chain.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Add a loaded private key to the chain.
    pub fn with_key(mut self, key: KeyAuth) -> Self {
        self.strategies.push(Box::new(key));
        self
    }

    /// Add password authentication to the chain.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.strategies.push(Box::new(PasswordAuth::new(password)));
        self
    }

    /// Add the empty-answer keyboard-interactive fallback to the chain.
    pub fn with_interactive_fallback(mut self) -> Self {
        self.strategies.push(Box::new(EmptyInteractiveAuth::new()));
        self
    }

    /// Methods for a target host: key (if loadable), password (if non-empty),
    /// then the keyboard-interactive fallback.
    ///
    /// An identity file that cannot be read or parsed is logged and skipped.
    pub fn for_target(params: &ConnectionParams, password: Option<&str>) -> Result<Self, RemoteError> {
        let mut chain = Self::new();

        if let Some(path) = params.identity_path() {
            match KeyAuth::load(&path) {
                Ok(key) => chain = chain.with_key(key),
                Err(e) => warn!(
                    host = %params.alias,
                    path = %path.display(),
                    error = %e,
                    "skipping unusable identity file"
                ),
            }
        }

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            chain = chain.with_password(password);
        }

        chain = chain.with_interactive_fallback();

        if chain.is_empty() {
            return Err(RemoteError::auth(&params.alias, "no authentication methods available"));
        }

        debug!(host = %params.alias, methods = ?chain.method_names(), "built authentication chain");
        Ok(chain)
    }

    /// Methods for a relay host: public key only. A missing or unloadable
    /// identity file is an error.
    pub fn for_relay(params: &ConnectionParams) -> Result<Self, RemoteError> {
        let path = params
            .identity_path()
            .ok_or_else(|| RemoteError::auth(&params.alias, "relay host has no IdentityFile"))?;

        let key = KeyAuth::load(&path).map_err(|e| {
            RemoteError::auth(
                &params.alias,
                format!("failed to load relay key {}: {e}", path.display()),
            )
        })?;

        Ok(Self::new().with_key(key))
    }

    /// Check if the chain has any authentication strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Method names in the order they will be tried.
    pub fn method_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for AuthChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    /// `Ok(false)` when every method was rejected. Transport errors abort the chain.
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error> {
        for strategy in &self.strategies {
            debug!(method = strategy.name(), user = %username, "trying authentication method");

            if strategy.authenticate(handle, username).await? {
                debug!(method = strategy.name(), "authentication accepted");
                return Ok(true);
            }

            debug!(method = strategy.name(), "authentication rejected");
        }

        Ok(false)
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
