use std::cmp::Ordering;

use crate::utils::error::Error;

// Kubernetes quantity suffixes with their decimal multipliers. Binary
// suffixes first so that "Gi" is matched before "G" when scanning an input.
const SUFFIXES: &[(&str, f64)] = &[
    ("Ei", 1152921504606846976.0),
    ("Pi", 1125899906842624.0),
    ("Ti", 1099511627776.0),
    ("Gi", 1073741824.0),
    ("Mi", 1048576.0),
    ("Ki", 1024.0),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
    ("", 1.0),
];

/// Splits a quantity string like `"500m"` or `"4Gi"` into its numeric value
/// and unit suffix. Negative values and anything that is not plain decimal
/// notation are rejected as malformed.
pub fn parse_quantity(quantity: &str) -> Result<(f64, &'static str), Error> {
    for (suffix, _) in SUFFIXES {
        if !quantity.ends_with(suffix) {
            continue;
        }

        let number = &quantity[..quantity.len() - suffix.len()];
        if !is_plain_decimal(number) {
            break;
        }

        match number.parse::<f64>() {
            Ok(value) if value.is_finite() => return Ok((value, suffix)),
            _ => break,
        }
    }

    Err(Error::ResourceParse {
        quantity: quantity.to_string(),
    })
}

fn is_plain_decimal(number: &str) -> bool {
    !number.is_empty()
        && number.chars().any(|c| c.is_ascii_digit())
        && number.chars().filter(|c| *c == '.').count() <= 1
        && number.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Divides a quantity by `divisor` and re-serializes it with its original
/// suffix. Used to derive the guaranteed resource floor (request) from the
/// user-declared ceiling (limit).
///
/// The result keeps at most three fractional digits, which is within the
/// platform's quantity rounding tolerance. A positive input never collapses
/// to zero: values below the formatting granularity clamp to the smallest
/// representable step.
pub fn split_quantity(quantity: &str, divisor: i64) -> Result<String, Error> {
    if divisor <= 0 {
        return Err(Error::InvalidDivisor { divisor });
    }

    let (value, suffix) = parse_quantity(quantity)?;
    let share = value / divisor as f64;

    let mut millis = (share * 1000.0).round() as i64;
    if millis == 0 && value > 0.0 {
        millis = 1;
    }

    if millis % 1000 == 0 {
        Ok(format!("{}{}", millis / 1000, suffix))
    } else {
        let number = format!("{:.3}", millis as f64 / 1000.0);
        let number = number.trim_end_matches('0').trim_end_matches('.');
        Ok(format!("{}{}", number, suffix))
    }
}

/// Compares two quantities after normalizing their suffixes, so `"20480Mi"`
/// and `"20Gi"` compare equal. Needed for the grow-only volume resize check.
pub fn compare_quantities(left: &str, right: &str) -> Result<Ordering, Error> {
    let (left_value, left_suffix) = parse_quantity(left)?;
    let (right_value, right_suffix) = parse_quantity(right)?;

    let left_scaled = left_value * multiplier(left_suffix);
    let right_scaled = right_value * multiplier(right_suffix);

    Ok(left_scaled.total_cmp(&right_scaled))
}

fn multiplier(suffix: &str) -> f64 {
    SUFFIXES
        .iter()
        .find(|(candidate, _)| *candidate == suffix)
        .map(|(_, factor)| *factor)
        .unwrap_or(1.0)
}
