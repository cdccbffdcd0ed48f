//! ANSI color codes for terminal output.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";

/// `code` when `enabled`, otherwise nothing.
pub fn paint(code: &'static str, enabled: bool) -> &'static str {
    if enabled { code } else { "" }
}
