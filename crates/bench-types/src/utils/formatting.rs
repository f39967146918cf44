//! String formatting utilities for hashes and addresses in log output.

/// Truncates a hex string for display purposes.
///
/// Shows only the first 10 characters (`0x` plus 8 digits) followed by ".."
/// for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.get(..10) {
		Some(prefix) if id.len() > 10 => format!("{}..", prefix),
		_ => id.to_string(),
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}
