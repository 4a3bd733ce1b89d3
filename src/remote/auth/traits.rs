//! Authentication strategy trait definition.
//!
//! Each SSH authentication method is a strategy; [`super::AuthChain`] tries
//! them in order against one handshake.

use async_trait::async_trait;
use russh::client;

use crate::remote::session::SshClientHandler;

/// Trait for SSH authentication strategies.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - The server rejected this method
    /// * `Err(e)` - The transport failed during the attempt
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error>;

    /// Method name as used on the wire, for logging.
    fn name(&self) -> &'static str;
}
