//! Octal number fields.
//!
//! Header numbers are stored as zero-padded ASCII octal digits.  A field
//! may be terminated early by NUL or space and may carry leading spaces;
//! everything else must be an octal digit.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("value {value} needs more than {width} octal digits")]
    TooWide { value: u64, width: usize },
    #[error("empty numeric field")]
    Empty,
    #[error("invalid octal digit {byte:#04x} in '{text}'")]
    InvalidDigit { byte: u8, text: String },
    #[error("octal value '{0}' overflows u64")]
    Overflow(String),
}

/// Render `value` as exactly `width` octal digits, zero padded.
pub fn format_octal(value: u64, width: usize) -> Result<String, NumericError> {
    let digits = format!("{value:0width$o}");
    if digits.len() > width {
        return Err(NumericError::TooWide { value, width });
    }
    Ok(digits)
}

/// Parse an octal field.
pub fn parse_octal(field: &[u8]) -> Result<u64, NumericError> {
    let start = field.iter().position(|&b| b != b' ').unwrap_or(field.len());
    let body  = &field[start..];
    let end   = body.iter().position(|&b| b == 0 || b == b' ').unwrap_or(body.len());
    let digits = &body[..end];

    if digits.is_empty() {
        return Err(NumericError::Empty);
    }
    if let Some(&byte) = digits.iter().find(|b| !(b'0'..=b'7').contains(*b)) {
        return Err(NumericError::InvalidDigit {
            byte,
            text: String::from_utf8_lossy(digits).into_owned(),
        });
    }

    // All bytes are ASCII digits at this point.
    let text = String::from_utf8_lossy(digits);
    u64::from_str_radix(&text, 8).map_err(|_| NumericError::Overflow(text.into_owned()))
}
