//! Command Authorization Filter
//!
//! Normalizes the raw chat command and checks it against the administrator's
//! allow-list. The check runs on the normalized string, after the plugin
//! name is stripped and before prepend-args are applied, so the allow-list is
//! evaluated against the same text the administrator reads in configuration.

/// The plugin name token stripped off the front of incoming commands.
pub const PLUGIN_NAME: &str = "aws";

/// Strip one leading plugin-name prefix (case-insensitive) and trim
/// surrounding whitespace.
pub fn normalize(raw: &str) -> String {
    let command = raw.trim();
    match command.get(..PLUGIN_NAME.len()) {
        Some(head) if head.eq_ignore_ascii_case(PLUGIN_NAME) => {
            command[PLUGIN_NAME.len()..].trim().to_string()
        }
        _ => command.to_string(),
    }
}

/// Whether a normalized command passes the allow-list.
///
/// An empty allow-list permits every command (opt-in restriction model).
/// Otherwise the trimmed command must start with at least one trimmed
/// entry, compared case-sensitively byte for byte. This is a raw prefix
/// match, not a word match: entry `ec2 desc` admits `ec2 describe`, and
/// entry `s3` admits `s3api`. Deliberately simple and auditable; see the
/// tests pinning both properties.
pub fn is_allowed(command: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let command = command.trim();
    allowlist
        .iter()
        .any(|entry| command.starts_with(entry.trim()))
}
