//! Signed integer literals in base 2, 8, 10 and 16.

use super::NumberError;

/// Parses one integer literal off the front of `source`, advancing the
/// view past everything consumed (sign, base prefix, digits).
///
/// An optional `-` may precede the literal. `0x`/`0X` selects base 16,
/// `0b`/`0B` base 2, a leading `0` followed by more digits base 8 (the
/// `0` stays part of the literal), anything else base 10.
///
/// # Errors
///
/// Fails on empty input, a lone sign, a digit invalid for the selected
/// base (named in the error together with the base), and values that do
/// not fit an `i32`.
pub fn parse_number(source: &mut &str) -> Result<i32, NumberError> {
    if source.is_empty() {
        return Err(NumberError::Empty);
    }

    let negative = source.starts_with('-');
    if negative {
        *source = &source[1..];
        if source.is_empty() {
            return Err(NumberError::LoneSign);
        }
    }

    let bytes = source.as_bytes();
    let base = if bytes[0] == b'0' && bytes.len() > 1 {
        match bytes[1] {
            b'x' | b'X' => {
                *source = &source[2..];
                16
            }
            b'b' | b'B' => {
                *source = &source[2..];
                2
            }
            _ => 8,
        }
    } else {
        10
    };

    parse_integral(source, base, negative)
}

fn parse_integral(source: &mut &str, base: u32, negative: bool) -> Result<i32, NumberError> {
    // Scan the longest run of hex digits; each must be valid for `base`.
    let mut len = 0;
    for (i, c) in source.char_indices() {
        if !c.is_ascii_hexdigit() {
            break;
        }
        if !c.is_digit(base) {
            let literal = source[..i + 1].to_owned();
            *source = &source[i..];
            return Err(NumberError::InvalidDigit {
                literal,
                digit: c,
                base,
            });
        }
        len = i + 1;
    }

    if len == 0 {
        return Err(NumberError::Empty);
    }

    let digits = &source[..len];
    let value = i64::from_str_radix(digits, base).map_err(|_| NumberError::Overflow {
        literal: digits.to_owned(),
    })?;

    let in_range = if negative {
        value <= -(i32::MIN as i64)
    } else {
        value <= i32::MAX as i64
    };
    if !in_range {
        return Err(NumberError::Overflow {
            literal: digits.to_owned(),
        });
    }

    *source = &source[len..];
    Ok(if negative {
        (-value) as i32
    } else {
        value as i32
    })
}
