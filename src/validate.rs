use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::{AppError, AppResult};

pub fn required_text(raw: &str, field: &str, max_chars: usize) -> AppResult<String> {
    let value = raw.trim();
    if value.is_empty() || value.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "{field} must be 1 to {max_chars} characters"
        )));
    }
    Ok(value.to_string())
}

/// Blank strings collapse to `None`.
pub fn optional_text(raw: Option<&str>, field: &str, max_chars: usize) -> AppResult<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.chars().count() > max_chars => Err(AppError::validation(format!(
            "{field} must be at most {max_chars} characters"
        ))),
        Some(value) => Ok(Some(value.to_string())),
    }
}

pub fn in_range(value: i64, field: &str, min: i64, max: i64) -> AppResult<i64> {
    if value < min || value > max {
        return Err(AppError::validation(format!(
            "{field} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Query-string switch. A missing or empty value, `false` and `0` are off;
/// `true`, `1` and `on` are on.
pub fn query_flag<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("" | "false" | "0" | "off") => Ok(false),
        Some("true" | "1" | "on") => Ok(true),
        Some(other) => Err(D::Error::custom(format!("expected true or false, got {other:?}"))),
    }
}
