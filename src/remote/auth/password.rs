//! Password-based SSH authentication.

use async_trait::async_trait;
use russh::client;

use crate::remote::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Password authentication strategy.
pub struct PasswordAuth {
    password: String,
}

impl PasswordAuth {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error> {
        let result = handle
            .authenticate_password(username, &self.password)
            .await?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
