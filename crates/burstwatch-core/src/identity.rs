use std::borrow::Cow;

use sha2::{Digest, Sha256};

use crate::event::IdentitySeed;

const SEPARATOR: &str = "|";
const PLACEHOLDER: &str = "-";

impl IdentitySeed {
    /// Derive the burst key: `ip|device|browser|path|fp_hash|click_id`.
    ///
    /// Missing or empty components become `-` (the path becomes `/`), so an
    /// absent component and a literal `-` share a key. `|` and `\` inside a
    /// component are backslash-escaped; otherwise two events share a key iff
    /// every component matches exactly. This groups likely duplicates; it is
    /// not a durable visitor identity.
    pub fn key(&self) -> String {
        [
            or_placeholder(&self.ip, PLACEHOLDER),
            or_placeholder(&self.device, PLACEHOLDER),
            or_placeholder(&self.browser, PLACEHOLDER),
            or_placeholder(&self.path, "/"),
            or_placeholder(self.fp_hash.as_deref().unwrap_or_default(), PLACEHOLDER),
            or_placeholder(self.click_id.as_deref().unwrap_or_default(), PLACEHOLDER),
        ]
        .map(escape)
        .join(SEPARATOR)
    }
}

fn escape(component: &str) -> Cow<'_, str> {
    if component.contains(['|', '\\']) {
        Cow::Owned(component.replace('\\', "\\\\").replace('|', "\\|"))
    } else {
        Cow::Borrowed(component)
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() {
        placeholder
    } else {
        value
    }
}

/// Short, log-safe stand-in for a burst key.
///
/// Keys embed the client IP, so log lines carry
/// `sha256(key)[0..8]` as 16 hex chars instead.
pub fn key_digest(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(&hash[..8])
}
