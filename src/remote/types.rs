//! Plain data passed between the resolver, connector and executor.

use std::path::PathBuf;

/// `IdentityFile` value that some ssh config tooling reports when none is set.
pub(crate) const UNSET_IDENTITY_FILE: &str = "~/.ssh/identity";

/// Connection parameters resolved for one host alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Alias these parameters were resolved from
    pub alias: String,
    pub hostname: String,
    pub user: String,
    pub port: u16,
    /// Raw `IdentityFile` value, unexpanded
    pub identity_file: Option<String>,
    /// `ProxyJump` alias, resolved separately when connecting
    pub relay: Option<String>,
}

impl ConnectionParams {
    /// `host:port` for logging and error messages.
    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }

    /// Expanded identity file path, or `None` when unset or the placeholder.
    pub fn identity_path(&self) -> Option<PathBuf> {
        let raw = self.identity_file.as_deref()?;
        if raw.is_empty() || raw == UNSET_IDENTITY_FILE {
            return None;
        }
        Some(expand_home(raw))
    }
}

/// Expand a leading `~/` to the user's home directory.
pub(crate) fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Combined stdout and stderr of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
}

impl CommandOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Output with surrounding whitespace removed.
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Non-empty lines of output.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty())
    }
}
