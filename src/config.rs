//! Host and server configuration: loading, validation, and the data model
//! consumed by [`crate::manager::Manager`].
//!
//! Security model:
//! - only hosts declared in the config file are reachable;
//! - `identity_file` takes precedence over `password` when both are set;
//! - host key verification uses the system known-hosts database by default
//!   (`auto_accept_host_key` is opt-in per host).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

fn default_port() -> u16 {
    22
}

fn default_command_timeout() -> u64 {
    30
}

fn default_transfer_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// Immutable per-host configuration consumed by a [`crate::connection::Connection`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostSpec {
    /// Unique identifier; also the host-allowlist key.
    pub name: String,
    pub hostname: String,
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auto_accept_host_key: bool,
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout: u64,
    /// `None` = all commands allowed. `Some(list)` must be non-empty.
    #[serde(default)]
    pub allowed_commands: Option<Vec<String>>,
}

impl HostSpec {
    /// Validates and normalizes (expands `identity_file`) a freshly parsed spec.
    fn finish(mut self) -> Result<Self, GatewayError> {
        if self.identity_file.is_none() && self.password.is_none() {
            return Err(GatewayError::Config(format!(
                "host '{}': must specify either 'identity_file' or 'password'",
                self.name
            )));
        }

        if let Some(identity_file) = &self.identity_file {
            let expanded = expand_home(identity_file);
            if !expanded.is_file() {
                log::warn!(
                    "identity file not found: {} (host: {})",
                    expanded.display(),
                    self.name
                );
            }
            self.identity_file = Some(expanded.to_string_lossy().into_owned());
        }

        if !(1..=65535).contains(&self.port) {
            return Err(GatewayError::Config(format!(
                "host '{}': invalid port {}",
                self.name, self.port
            )));
        }
        if self.command_timeout < 1 {
            return Err(GatewayError::Config(format!(
                "host '{}': command_timeout must be >= 1",
                self.name
            )));
        }
        if self.transfer_timeout < 1 {
            return Err(GatewayError::Config(format!(
                "host '{}': transfer_timeout must be >= 1",
                self.name
            )));
        }
        if let Some(allowed) = &self.allowed_commands {
            if allowed.is_empty() {
                return Err(GatewayError::Config(format!(
                    "host '{}': allowed_commands is empty (blocks all commands). \
                     Omit it to allow all commands, or list specific commands.",
                    self.name
                )));
            }
            for (j, cmd) in allowed.iter().enumerate() {
                if cmd.is_empty() {
                    return Err(GatewayError::Config(format!(
                        "host '{}': allowed_commands[{j}] must be a non-empty string",
                        self.name
                    )));
                }
            }
        }

        Ok(self)
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ServerConfig {
    pub hosts: HashMap<String, HostSpec>,
    /// Not read by the core; passed through for the embedding binary's own
    /// subscriber setup.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Not read by the core; an external audit sink may use this path.
    #[serde(default)]
    pub audit_log_file: Option<String>,
}

impl ServerConfig {
    /// Looks up a host by name, producing a `HostNotAllowed`-shaped message.
    pub fn get_host(&self, name: &str) -> Result<&HostSpec, GatewayError> {
        self.hosts.get(name).ok_or_else(|| {
            let mut available: Vec<&str> = self.hosts.keys().map(String::as_str).collect();
            available.sort_unstable();
            GatewayError::HostNotAllowed {
                name: name.to_string(),
                available: if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                },
            }
        })
    }
}

/// Raw JSON shape of the config file: `hosts` is a list of objects, each
/// needing a unique `name`, rather than a map — this matches how operators
/// hand-author the file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    hosts: Vec<serde_json::Value>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    audit_log_file: Option<String>,
}

/// Loads and validates server configuration from a JSON file.
pub fn load_config(config_path: impl AsRef<Path>) -> Result<ServerConfig, GatewayError> {
    let path = expand_home(config_path.as_ref().to_string_lossy().as_ref());
    let path = std::fs::canonicalize(&path)
        .map_err(|_| GatewayError::Config(format!("config file not found: {}", path.display())))?;

    check_file_permissions(&path);

    let text = std::fs::read_to_string(&path)
        .map_err(|e| GatewayError::Config(format!("cannot read config file {}: {e}", path.display())))?;
    let raw: RawConfig = serde_json::from_str(&text)
        .map_err(|e| GatewayError::Config(format!("invalid JSON in config file: {e}")))?;

    let mut hosts = HashMap::new();
    for (i, entry) in raw.hosts.into_iter().enumerate() {
        let ctx = format!("hosts[{i}]");
        let spec: HostSpec = serde_json::from_value(entry)
            .map_err(|e| GatewayError::Config(format!("{ctx}: {e}")))?;
        if spec.name.is_empty() {
            return Err(GatewayError::Config(format!("{ctx}: missing or invalid 'name'")));
        }
        if hosts.contains_key(&spec.name) {
            return Err(GatewayError::Config(format!(
                "{ctx}: duplicate host name '{}'",
                spec.name
            )));
        }
        let spec = spec.finish()?;
        hosts.insert(spec.name.clone(), spec);
    }

    log::info!("loaded {} host(s) from {}", hosts.len(), path.display());

    Ok(ServerConfig {
        hosts,
        log_level: raw.log_level,
        audit_log_file: raw.audit_log_file,
    })
}

/// Expands a leading `~` the way a shell would, using the current user's home.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Warns (does not fail) if the config file is group- or world-readable.
/// Unix only — other platforms don't share this permission model.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    let mode = metadata.permissions().mode();
    if mode & 0o077 != 0 {
        log::warn!(
            "config file {} is readable by group/others. This is a security risk if it \
             contains passwords. Run: chmod 600 {}",
            path.display(),
            path.display()
        );
    }
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_valid_config() {
        let f = write_config(
            r#"{"hosts": [{"name": "h1", "hostname": "example.com", "username": "u", "password": "p"}]}"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.hosts.len(), 1);
        let h = cfg.get_host("h1").unwrap();
        assert_eq!(h.port, 22);
        assert_eq!(h.command_timeout, 30);
    }

    #[test]
    fn rejects_duplicate_host_names() {
        let f = write_config(
            r#"{"hosts": [
                {"name": "h1", "hostname": "a", "username": "u", "password": "p"},
                {"name": "h1", "hostname": "b", "username": "u", "password": "p"}
            ]}"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_empty_allowed_commands() {
        let f = write_config(
            r#"{"hosts": [{"name": "h1", "hostname": "a", "username": "u", "password": "p", "allowed_commands": []}]}"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_host_with_neither_password_nor_identity_file() {
        let f = write_config(r#"{"hosts": [{"name": "h1", "hostname": "a", "username": "u"}]}"#);
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn get_host_lists_available_names_when_missing() {
        let cfg = ServerConfig::default();
        match cfg.get_host("nope") {
            Err(GatewayError::HostNotAllowed { available, .. }) => assert_eq!(available, "(none)"),
            _ => panic!("expected HostNotAllowed"),
        }
    }
}
