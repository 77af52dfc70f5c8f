//! Decision logic: who may send, and to whom.

use lettre::Address;

use crate::config::SecretWord;

/// Allow only when `candidate` is present and byte-for-byte equal to the
/// configured secret. Equal-length inputs are compared in constant time.
pub fn authorize(candidate: Option<&str>, configured: &SecretWord) -> bool {
    match candidate {
        Some(c) if !c.is_empty() => {
            orion::util::secure_cmp(c.as_bytes(), configured.expose().as_bytes()).is_ok()
        }
        _ => false,
    }
}

/// Effective recipient of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: Address,
    /// Whether the caller-supplied address replaced the default.
    pub overridden: bool,
}

/// Pick the caller's address when policy allows it and one was supplied,
/// otherwise the configured default. Never fails.
pub fn resolve_recipient(allow_override: bool, input: Option<Address>, default: &Address) -> Recipient {
    match input {
        Some(address) if allow_override => Recipient { address, overridden: true },
        _ => Recipient {
            address: default.clone(),
            overridden: false,
        },
    }
}

/// Sanitized value, or `default` when absent or empty.
pub fn resolve_text(sanitized: Option<String>, default: &str) -> String {
    sanitized.filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}
