//! Argument validation for domain commands.
//!
//! Every check returns [`GomerError::InvalidParameter`] naming the argument, so
//! a bad call fails before a correlation number is drawn or a frame is sent.

use crate::error::{GomerError, GomerResult};
use std::fmt::Display;
use std::ops::RangeInclusive;

/// Validates that `value` lies within `range`.
///
/// # Arguments
///
/// * `name` - Argument name used in the error message.
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
pub fn in_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> GomerResult<T>
where
    T: PartialOrd + Display + Copy,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(GomerError::InvalidParameter(format!(
            "{} must be in {}..={}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

/// Validates that `value` is not zero.
pub fn non_zero(name: &str, value: i64) -> GomerResult<i64> {
    if value != 0 {
        Ok(value)
    } else {
        Err(GomerError::InvalidParameter(format!(
            "{} must not be 0",
            name
        )))
    }
}

/// Validates that `value` is non-empty and shorter than `limit` characters.
pub fn text_shorter_than<'a>(name: &str, value: &'a str, limit: usize) -> GomerResult<&'a str> {
    if value.is_empty() {
        return Err(GomerError::InvalidParameter(format!(
            "{} cannot be empty",
            name
        )));
    }
    let length = value.chars().count();
    if length >= limit {
        return Err(GomerError::InvalidParameter(format!(
            "{} must be shorter than {} characters, got {}",
            name, limit, length
        )));
    }
    Ok(value)
}

/// Validates that `value` is one of `allowed`.
pub fn one_of<'a>(name: &str, value: &'a str, allowed: &[&str]) -> GomerResult<&'a str> {
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(GomerError::InvalidParameter(format!(
            "{} '{}' is not one of: {}",
            name,
            value,
            allowed.join(", ")
        )))
    }
}
