//! Key/value extraction helpers for tool output parsing
//!
//! udevadm, smartctl, and nvme-cli all emit line-oriented text with a
//! `KEY<sep>VALUE` shape but disagree on the separator. These helpers parse
//! that shape uniformly: keys are tried in priority order, the key must be a
//! whole token at the start of a line, and values are whitespace-trimmed.

/// Separator between key and value on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `Key: Value` (smartctl, nvme-cli)
    Colon,
    /// `KEY=VALUE` (udevadm properties)
    Equals,
}

impl Separator {
    fn as_char(self) -> char {
        match self {
            Separator::Colon => ':',
            Separator::Equals => '=',
        }
    }
}

/// Look up the first key from `keys` that starts a line of `output`, and
/// return its trimmed value.
///
/// The key must be followed by whitespace or the separator, so `fr` will not
/// match an `frmw` line and `ID_SERIAL` will not match `ID_SERIAL_SHORT`.
pub fn value_for_keys(output: &str, keys: &[&str], sep: Separator) -> Option<String> {
    for key in keys {
        for line in output.lines() {
            if let Some(value) = value_on_line(line, key, sep) {
                return Some(value);
            }
        }
    }
    None
}

fn value_on_line(line: &str, key: &str, sep: Separator) -> Option<String> {
    let line = line.trim_start();
    let rest = line.strip_prefix(key)?;
    // Whole-token match: the key must end at whitespace or the separator.
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c == sep.as_char() || c.is_whitespace() => {}
        _ => return None,
    }
    let (_, value) = rest.split_once(sep.as_char())?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Find the value in square brackets on the first line containing one of
/// `keys`, without the brackets. smartctl prints human-readable capacities
/// this way: `User Capacity: 500,107,862,016 bytes [500 GB]`.
pub fn bracketed_for_keys(output: &str, keys: &[&str]) -> Option<String> {
    for key in keys {
        for line in output.lines() {
            if !line.contains(key) {
                continue;
            }
            let start = line.find('[')?;
            let end = line[start..].find(']')? + start;
            if end > start + 1 {
                return Some(line[start + 1..end].to_string());
            }
        }
    }
    None
}

/// First whitespace-delimited word of `input`, if any.
pub fn first_word(input: &str) -> Option<&str> {
    input.split_whitespace().next()
}

/// First line of `output` that contains `needle`.
pub fn line_containing<'a>(output: &'a str, needle: &str) -> Option<&'a str> {
    output.lines().find(|line| line.contains(needle))
}
