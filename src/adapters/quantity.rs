//! Kubernetes resource quantity validation
//!
//! Accepts `<signed number><suffix>` where the suffix is a binary SI unit
//! (Ki..Ei), a decimal SI unit (n, u, m, k, M..E) or a decimal exponent
//! (`e3`, `E-2`).

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::{Error, Result};

const SUFFIXES: &[&str] = &[
    "", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P", "E",
];

/// Parse a quantity string, rejecting anything the API server would refuse
pub fn parse(raw: &str) -> Result<Quantity> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::config("quantity must not be empty"));
    }

    let (number, suffix) = split_number(value);

    if !is_signed_number(number) {
        return Err(invalid(raw));
    }

    if SUFFIXES.contains(&suffix) || is_exponent(suffix) {
        Ok(Quantity(value.to_string()))
    } else {
        Err(invalid(raw))
    }
}

/// Parse a quantity that must be strictly positive (sizes, requests)
pub fn parse_positive(field: &str, raw: &str) -> Result<Quantity> {
    let quantity = parse(raw).map_err(|e| Error::config(format!("{}: {}", field, message(&e))))?;
    let (number, _) = split_number(&quantity.0);
    let number = number.trim_start_matches('+');
    if number.starts_with('-') || !number.chars().any(|c| c.is_ascii_digit() && c != '0') {
        return Err(Error::config(format!(
            "{}: quantity '{}' must be greater than zero",
            field, raw
        )));
    }
    Ok(quantity)
}

/// Mantissa and unit suffix of a trimmed quantity
fn split_number(value: &str) -> (&str, &str) {
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(value.len());
    value.split_at(split)
}

fn is_signed_number(number: &str) -> bool {
    let unsigned = number
        .strip_prefix('+')
        .or_else(|| number.strip_prefix('-'))
        .unwrap_or(number);

    let mut dots = 0;
    let mut digits = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

fn is_exponent(suffix: &str) -> bool {
    let Some(exponent) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    else {
        return false;
    };
    let digits = exponent
        .strip_prefix('+')
        .or_else(|| exponent.strip_prefix('-'))
        .unwrap_or(exponent);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn invalid(raw: &str) -> Error {
    Error::config(format!(
        "quantity '{}' must match the regular expression '^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$'",
        raw
    ))
}

fn message(err: &Error) -> String {
    match err {
        Error::ConfigInvalid(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_forms() {
        for raw in ["6G", "1Gi", "500m", "0.5", "1e3", "2E-2", "+10Ki", "100"] {
            assert!(parse(raw).is_ok(), "{} should parse", raw);
        }
    }

    #[test]
    fn rejects_malformed_forms() {
        for raw in ["", "G", "6GB", "1.2.3", "1-2Gi", "ten", "1e", "."] {
            assert!(parse(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(parse(" 1Gi ").unwrap().0, "1Gi");
    }

    #[test]
    fn positive_rejects_zero_and_negative() {
        assert!(parse_positive("storage-size", "0Gi").is_err());
        assert!(parse_positive("storage-size", "-1Gi").is_err());
        assert!(parse_positive("storage-size", "0e3").is_err());
        assert!(parse_positive("storage-size", "0.0E2").is_err());
        assert!(parse_positive("storage-size", "1e0").is_ok());
        let err = parse_positive("storage-size", "6 G").unwrap_err();
        assert!(err.to_string().contains("storage-size"));
        assert_eq!(parse_positive("storage-size", "6G").unwrap().0, "6G");
    }
}
