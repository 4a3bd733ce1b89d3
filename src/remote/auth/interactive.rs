//! Keyboard-interactive fallback that answers every prompt with an empty string.
//!
//! Some hosts accept keyboard-interactive with blank answers (for example when
//! PAM is configured to allow it). The fallback is always appended last.

use async_trait::async_trait;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use tracing::debug;

use crate::remote::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Upper bound on prompt rounds before the method is treated as rejected.
pub(crate) const MAX_PROMPT_ROUNDS: usize = 8;

/// Keyboard-interactive strategy replying with N empty strings to N prompts.
pub struct EmptyInteractiveAuth {
    max_rounds: usize,
}

impl EmptyInteractiveAuth {
    pub fn new() -> Self {
        Self {
            max_rounds: MAX_PROMPT_ROUNDS,
        }
    }
}

impl Default for EmptyInteractiveAuth {
    fn default() -> Self {
        Self::new()
    }
}

/// Answers for one round of prompts.
fn blank_answers(prompt_count: usize) -> Vec<String> {
    vec![String::new(); prompt_count]
}

#[async_trait]
impl AuthStrategy for EmptyInteractiveAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, russh::Error> {
        let mut response = handle
            .authenticate_keyboard_interactive_start(username, None)
            .await?;

        for round in 0..self.max_rounds {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(true),
                KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
                KeyboardInteractiveAuthResponse::InfoRequest {
                    name,
                    instructions,
                    prompts,
                } => {
                    debug!(
                        round,
                        name = %name,
                        instructions = %instructions,
                        prompt_count = prompts.len(),
                        "answering keyboard-interactive prompts with empty strings"
                    );
                    response = handle
                        .authenticate_keyboard_interactive_respond(blank_answers(prompts.len()))
                        .await?;
                }
            }
        }

        match response {
            KeyboardInteractiveAuthResponse::Success => Ok(true),
            _ => {
                debug!(max_rounds = self.max_rounds, "keyboard-interactive prompt limit reached");
                Ok(false)
            }
        }
    }

    fn name(&self) -> &'static str {
        "keyboard-interactive"
    }
}
