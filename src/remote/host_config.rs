//! SSH config parsing and host alias resolution.
//!
//! Reads an OpenSSH-style client config and resolves a host alias into
//! [`ConnectionParams`]. Only the keywords the connector needs are
//! interpreted: `HostName`, `User`, `Port`, `IdentityFile` and `ProxyJump`.
//!
//! ## Matching
//!
//! - `Host` lines open a block with whitespace-separated patterns. `*` and `?`
//!   are wildcards, a leading `!` negates. A block applies when at least one
//!   positive pattern matches and no negated pattern does.
//! - Options before the first `Host` line apply to every alias.
//! - The first value obtained for a keyword wins, scanning blocks in file order.
//! - `Match` blocks are not evaluated and `Include` is ignored.
//!
//! ## Relays
//!
//! `ProxyJump` is passed through as an alias and resolved by the same
//! operation when the connector needs it. Only one hop is supported.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::RemoteError;
use super::types::ConnectionParams;

/// Default SSH port when the config has no `Port` for the alias
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<String>,
    /// `Match` blocks are kept so their options are not applied to the
    /// preceding `Host`, but they never match.
    evaluable: bool,
    /// Keyword (lowercased) and value, in file order
    options: Vec<(String, String)>,
}

impl HostBlock {
    fn global() -> Self {
        Self {
            patterns: vec!["*".to_string()],
            evaluable: true,
            options: Vec::new(),
        }
    }

    fn matches(&self, alias: &str) -> bool {
        if !self.evaluable {
            return false;
        }
        let mut matched = false;
        for pattern in &self.patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                if glob_match(negated, alias) {
                    return false;
                }
            } else if glob_match(pattern, alias) {
                matched = true;
            }
        }
        matched
    }
}

/// Parsed SSH client configuration.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    blocks: Vec<HostBlock>,
}

impl SshConfig {
    /// Parse config text. Unknown keywords are kept but never interpreted.
    pub fn parse(content: &str) -> Self {
        let mut blocks = vec![HostBlock::global()];

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((keyword, value)) = split_keyword(line) else {
                debug!(line = index + 1, "ignoring ssh config line without a value");
                continue;
            };
            let keyword = keyword.to_ascii_lowercase();

            match keyword.as_str() {
                "host" => blocks.push(HostBlock {
                    patterns: value.split_whitespace().map(String::from).collect(),
                    evaluable: true,
                    options: Vec::new(),
                }),
                "match" => {
                    debug!(line = index + 1, criteria = %value, "ssh config Match blocks are not evaluated");
                    blocks.push(HostBlock {
                        patterns: Vec::new(),
                        evaluable: false,
                        options: Vec::new(),
                    });
                }
                "include" => {
                    debug!(line = index + 1, include = %value, "ssh config Include is not followed");
                }
                _ => {
                    if let Some(block) = blocks.last_mut() {
                        block.options.push((keyword, unquote(value).to_string()));
                    }
                }
            }
        }

        Self { blocks }
    }

    /// Load and parse a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "loaded ssh config");
                Ok(Self::parse(&content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "ssh config not found, using empty config");
                Ok(Self::default())
            }
            Err(source) => Err(RemoteError::ConfigFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// First value configured for `keyword` that applies to `alias`.
    pub fn get(&self, alias: &str, keyword: &str) -> Option<&str> {
        let keyword = keyword.to_ascii_lowercase();
        self.blocks
            .iter()
            .filter(|block| block.matches(alias))
            .flat_map(|block| block.options.iter())
            .find(|(key, _)| *key == keyword)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Resolve `alias` into connection parameters.
    ///
    /// Fails with [`RemoteError::Config`] when `HostName` or `User` is
    /// missing, the port is invalid, or `ProxyJump` names more than one hop.
    pub fn resolve(&self, alias: &str) -> Result<ConnectionParams, RemoteError> {
        let hostname = self
            .get(alias, "HostName")
            .map(|h| expand_hostname(h, alias))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RemoteError::config(alias, "no hostname found in SSH config"))?;

        let user = self
            .get(alias, "User")
            .ok_or_else(|| RemoteError::config(alias, "no user found in SSH config"))?
            .to_string();

        let port = match self.get(alias, "Port") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| RemoteError::config(alias, format!("invalid port '{raw}'")))?,
            None => DEFAULT_SSH_PORT,
        };

        let relay = match self.get(alias, "ProxyJump") {
            None => None,
            Some(jump) if jump.eq_ignore_ascii_case("none") => None,
            Some(jump) if jump.contains(',') => {
                return Err(RemoteError::config(
                    alias,
                    format!("ProxyJump '{jump}' has more than one hop, only a single relay is supported"),
                ));
            }
            Some(jump) => Some(jump.to_string()),
        };

        Ok(ConnectionParams {
            alias: alias.to_string(),
            hostname,
            user,
            port,
            identity_file: self.get(alias, "IdentityFile").map(String::from),
            relay,
        })
    }

    /// Resolve a relay alias. Its own `ProxyJump`, if any, is dropped.
    pub fn resolve_relay(&self, relay_alias: &str) -> Result<ConnectionParams, RemoteError> {
        let mut params = self.resolve(relay_alias)?;
        if let Some(next_hop) = params.relay.take() {
            warn!(
                relay = %relay_alias,
                next_hop = %next_hop,
                "ignoring ProxyJump on relay host, only one hop is supported"
            );
        }
        Ok(params)
    }
}

/// Default config location, `~/.ssh/config`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("config"))
}

fn split_keyword(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = &line[..end];
    let rest = line[end..].trim_start();
    let value = rest.strip_prefix('=').unwrap_or(rest).trim();
    if keyword.is_empty() || value.is_empty() {
        return None;
    }
    Some((keyword, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Expand `%h` (the alias) and `%%` in a `HostName` value.
fn expand_hostname(value: &str, alias: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('h') => out.push_str(alias),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// Glob match supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
