//! Command allowlist enforcement.
//!
//! Evaluated on every `execute` before the connection lock is acquired —
//! it reads only immutable host config, so no locking is required.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GatewayError;

/// Shell metacharacters that can chain, substitute, redirect, or escape out
/// of the `/bin/sh -c "..."` wrapper the remote side uses for exec.
///
/// Deliberately excludes `!` (interactive-only in common shells) and `{ }`
/// (brace expansion does not execute). This set is a contract with the
/// remote shell, not a style choice — do not extend or shrink it.
static SHELL_META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[;&|`$()<>\n"']"#).unwrap());

/// Pure predicate deciding whether a command may run on a host.
pub struct CommandGuard;

impl CommandGuard {
    /// Checks `command` against `allowed_commands`.
    ///
    /// `None` means no allowlist is configured for the host — any non-empty
    /// command is admitted. `Some(list)` enforces both the metacharacter
    /// filter and base-command membership.
    pub fn check(command: &str, allowed_commands: Option<&[String]>) -> Result<(), GatewayError> {
        let Some(allowed) = allowed_commands else {
            return Ok(());
        };

        if SHELL_META_RE.is_match(command) {
            return Err(GatewayError::PermissionDenied(format!(
                "command contains shell metacharacters (rejected for a host with an \
                 allowlist). Send each command separately without pipes or chaining: {command:?}"
            )));
        }

        let base = Self::base_command(command);
        if !allowed.iter().any(|c| c == base) {
            return Err(GatewayError::PermissionDenied(format!(
                "command '{base}' not in allowlist. Allowed: {}",
                allowed.join(", ")
            )));
        }

        Ok(())
    }

    /// The first whitespace-delimited token of `command`, or `""` if blank.
    pub fn base_command(command: &str) -> &str {
        command.trim().split_whitespace().next().unwrap_or("")
    }
}
