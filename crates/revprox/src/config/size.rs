//! Human-readable byte sizes (`512`, `64KB`, `100MB`, `2 GB`).

use super::ConfigError;

const UNITS: &[(&str, u64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("B", 1),
];

/// Parse a size with an optional `B`/`KB`/`MB`/`GB`/`TB` suffix. Multiples
/// are binary and the suffix is case-insensitive.
pub fn parse_size(raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| {
            upper
                .strip_suffix(suffix)
                .map(|digits| (digits.trim_end(), *multiplier))
        })
        .unwrap_or((upper.as_str(), 1));

    let value: u64 = digits
        .parse()
        .map_err(|_| ConfigError::invalid("size", raw, "expected an integer with an optional B/KB/MB/GB/TB suffix"))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::invalid("size", raw, "value overflows 64 bits"))
}
