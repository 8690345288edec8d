//! Kaspa address helpers. Syntax checks only, no checksum decoding.

use crate::config::AddressRules;

/// Why an address failed the syntax check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressIssue {
    Empty,
    MissingPrefix,
    BadLength,
}

/// Check `address` (already trimmed) against the prefix and length rules.
pub fn check_address(rules: &AddressRules, address: &str) -> Result<(), AddressIssue> {
    if address.is_empty() {
        return Err(AddressIssue::Empty);
    }
    if !address.starts_with(&rules.prefix) {
        return Err(AddressIssue::MissingPrefix);
    }
    let len = address.chars().count();
    if len < rules.min_len || len > rules.max_len {
        return Err(AddressIssue::BadLength);
    }
    Ok(())
}

pub fn is_valid_address(rules: &AddressRules, address: &str) -> bool {
    check_address(rules, address).is_ok()
}

/// Truncate the middle of an address for compact display:
/// `kaspa:qzqp7l...tf6m`.
pub fn format_address(address: &str, start_chars: usize, end_chars: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= start_chars + end_chars {
        return address.to_string();
    }
    let start: String = chars[..start_chars].iter().collect();
    let end: String = chars[chars.len() - end_chars..].iter().collect();
    format!("{start}...{end}")
}

/// Display form used by the connect button.
pub fn short_address(address: &str) -> String {
    format_address(address, 12, 4)
}
