use anyhow::{bail, Result};

/// Normalizes a phone number to bare country-coded digits.
///
/// Providers and CRM imports disagree on formatting (`+55 11 91234-5678`,
/// `0055...`, `5511912345678`); inbound matching requires one canonical
/// shape. The canonical form is digits only, international prefix stripped.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("phone number cannot be empty");
    }

    let digits = trimmed
        .chars()
        .filter(|ch| ch.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        bail!("phone number '{}' contains no digits", trimmed);
    }

    // "00" is the ITU international call prefix; "+" was dropped by the
    // digit filter above, so only the double-zero form needs stripping.
    let normalized = digits.strip_prefix("00").unwrap_or(&digits);
    if normalized.len() < 8 {
        bail!("phone number '{}' is too short after normalization", trimmed);
    }
    Ok(normalized.to_string())
}
