use crate::error::{ProviderError, ProviderResult};

/// Area code plus subscriber number.
pub const MIN_PHONE_DIGITS: usize = 10;

pub fn strip_non_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strips every non-digit (including JID suffixes) and rejects anything
/// shorter than [`MIN_PHONE_DIGITS`].
pub fn normalize_phone_number(value: &str) -> ProviderResult<String> {
    let digits = strip_non_digits(value);
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(ProviderError::InvalidPhoneNumber {
            input: value.to_string(),
            digits: digits.len(),
        });
    }
    Ok(digits)
}

/// Recipient format for the Cloud API: drops `@c.us` / `@s.whatsapp.net`
/// suffixes before keeping the digits.
pub fn format_cloud_recipient(value: &str) -> String {
    let trimmed = value
        .trim()
        .trim_end_matches("@c.us")
        .trim_end_matches("@s.whatsapp.net");
    strip_non_digits(trimmed)
}

/// `551199@s.whatsapp.net` -> `551199`
pub fn jid_user(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}
