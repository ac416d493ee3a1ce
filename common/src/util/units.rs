use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("empty length expression")]
    Empty,
    #[error("cannot read a number from '{0}'")]
    BadNumber(String),
    #[error("unknown unit '{unit}' in '{expr}'")]
    UnknownUnit { unit: String, expr: String },
}

/// Metres per unit.
pub fn unit_scale(unit: &str) -> Option<f64> {
    let scale = match unit {
        "nm" => 1e-9,
        "um" | "µm" | "micron" | "microns" => 1e-6,
        "mm" => 1e-3,
        "cm" => 1e-2,
        "m" => 1.0,
        "mil" | "mils" => 25.4e-6,
        "in" | "inch" => 25.4e-3,
        _ => return None,
    };
    Some(scale)
}

/// Resolves a length such as `"0.3 mm"`, `"200um"` or `"1.5"` to a float in
/// `design_units`. Bare numbers are already in design units.
pub fn parse_length(expr: &str, design_units: &str) -> Result<f64, UnitError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(UnitError::Empty);
    }
    let split = expr
        .char_indices()
        .find(|&(i, c)| !is_number_char(expr, i, c))
        .map(|(i, _)| i)
        .unwrap_or(expr.len());
    let (num, unit) = expr.split_at(split);
    let value: f64 = num
        .trim()
        .parse()
        .map_err(|_| UnitError::BadNumber(expr.to_string()))?;
    let unit = unit.trim();
    if unit.is_empty() {
        return Ok(value);
    }
    let from = unit_scale(unit).ok_or_else(|| UnitError::UnknownUnit {
        unit: unit.to_string(),
        expr: expr.to_string(),
    })?;
    let to = unit_scale(design_units).ok_or_else(|| UnitError::UnknownUnit {
        unit: design_units.to_string(),
        expr: expr.to_string(),
    })?;
    Ok(value * from / to)
}

fn is_number_char(expr: &str, i: usize, c: char) -> bool {
    match c {
        '0'..='9' | '.' | ' ' => true,
        '+' | '-' => i == 0 || matches!(expr[..i].chars().last(), Some('e' | 'E')),
        // exponent marker only when a digit or sign follows
        'e' | 'E' => expr[i + 1..]
            .chars()
            .next()
            .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0.3 mm", 0.3)]
    #[case("200um", 0.2)]
    #[case("1.5", 1.5)]
    #[case("-2e5 nm", -0.2)]
    #[case("1 cm", 10.0)]
    fn parses_into_mm(#[case] expr: &str, #[case] expected: f64) {
        let v = parse_length(expr, "mm").unwrap();
        assert!((v - expected).abs() < 1e-12, "{expr} -> {v}");
    }

    #[test]
    fn rejects_unknown_units() {
        assert!(matches!(
            parse_length("3 furlongs", "mm"),
            Err(UnitError::UnknownUnit { .. })
        ));
        assert_eq!(parse_length("  ", "mm"), Err(UnitError::Empty));
        assert!(matches!(
            parse_length("mm", "mm"),
            Err(UnitError::BadNumber(_))
        ));
    }
}
