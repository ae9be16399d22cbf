use num_bigint::BigUint;

use crate::error::Error;

/// Fractional digits shown for balances in the payment UI.
pub const DISPLAY_DECIMALS: usize = 6;

/// Whole-unit decimal string for a raw amount, without trailing zeros.
pub fn format_units(amount: &BigUint, decimals: u8) -> String {
    let unit = BigUint::from(10u8).pow(u32::from(decimals));
    let (whole, rem) = (amount / &unit, amount % &unit);
    if rem.bits() == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", rem.to_string(), width = decimals as usize);
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Format a raw amount with exactly `places` fractional digits, rounding half up.
pub fn format_fixed(amount: &BigUint, decimals: u8, places: usize) -> String {
    let unit = BigUint::from(10u8).pow(u32::from(decimals));
    let scale = BigUint::from(10u8).pow(places as u32);
    let half = &unit / BigUint::from(2u8);
    let scaled = if decimals == 0 {
        amount * &scale
    } else {
        (amount * &scale + half) / &unit
    };

    let digits = scaled.to_string();
    if places == 0 {
        return digits;
    }
    let padded = if digits.len() <= places {
        format!("{}{}", "0".repeat(places + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (integer_part, fraction) = padded.split_at(padded.len() - places);
    format!("{integer_part}.{fraction}")
}

/// Parse a human decimal string (e.g. `"1.5"`) into base units.
pub fn parse_units(amount: &str, decimals: u8) -> Result<BigUint, Error> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(Error::InvalidAmount("empty amount".to_string()));
    }

    let (integer_part, fraction) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if integer_part.is_empty() && fraction.is_empty() {
        return Err(Error::InvalidAmount(amount.to_string()));
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(integer_part) || !all_digits(fraction) {
        return Err(Error::InvalidAmount(amount.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(Error::InvalidAmount(format!(
            "{amount} has more than {decimals} decimal places"
        )));
    }

    let mut digits = String::with_capacity(integer_part.len() + decimals as usize);
    digits.push_str(integer_part);
    digits.push_str(fraction);
    digits.extend(std::iter::repeat_n('0', decimals as usize - fraction.len()));
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(BigUint::from(0u8));
    }

    BigUint::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| Error::InvalidAmount(amount.to_string()))
}

/// Parse a positive amount; zero is rejected.
pub fn parse_positive_units(amount: &str, decimals: u8) -> Result<BigUint, Error> {
    let value = parse_units(amount, decimals)?;
    if value == BigUint::from(0u8) {
        return Err(Error::InvalidAmount(format!("{amount} must be greater than zero")));
    }
    Ok(value)
}

/// Check that `amount` is a positive decimal string, whatever the token's decimals.
pub fn validate_amount(amount: &str) -> Result<(), Error> {
    parse_positive_units(amount, u8::MAX).map(|_| ())
}

/// Parse a JSON-RPC hex quantity (`"0x1bc16d674ec80000"`). `"0x"` reads as zero.
pub fn parse_hex_quantity(value: &str) -> Result<BigUint, Error> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| Error::UpstreamUnavailable(format!("not a hex quantity: {value}")))?;
    if digits.is_empty() {
        return Ok(BigUint::from(0u8));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| Error::UpstreamUnavailable(format!("not a hex quantity: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(&BigUint::from(1_000_000u64), 6), "1");
        assert_eq!(format_units(&BigUint::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(&BigUint::from(123u64), 6), "0.000123");
        assert_eq!(format_units(&BigUint::from(0u64), 18), "0");
        assert_eq!(format_units(&BigUint::from(42u64), 0), "42");

        let wei = BigUint::parse_bytes(b"1000000000000000001", 10).unwrap();
        assert_eq!(format_units(&wei, 18), "1.000000000000000001");
    }

    #[test]
    fn test_format_fixed_rounds_to_six_places() {
        // 1.2345675 ETH
        let wei = BigUint::from(1_234_567_500_000_000_000u64);
        assert_eq!(format_fixed(&wei, 18, DISPLAY_DECIMALS), "1.234568");

        let usdc = BigUint::from(42u64);
        assert_eq!(format_fixed(&usdc, 6, DISPLAY_DECIMALS), "0.000042");

        assert_eq!(format_fixed(&BigUint::from(0u8), 18, 6), "0.000000");
        assert_eq!(format_fixed(&BigUint::from(7u8), 0, 2), "7.00");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(
            parse_units("1.5", 18).unwrap(),
            BigUint::from(1_500_000_000_000_000_000u64)
        );
        assert_eq!(parse_units("100", 6).unwrap(), BigUint::from(100_000_000u64));
        assert_eq!(parse_units(".25", 2).unwrap(), BigUint::from(25u8));
        assert_eq!(parse_units("0.000", 6).unwrap(), BigUint::from(0u8));
    }

    #[test]
    fn test_parse_units_rejects_malformed() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units(".", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1e18", 18).is_err());
        assert!(parse_units("0.1234567", 6).is_err());
    }

    #[test]
    fn test_parse_positive_units_rejects_zero() {
        assert!(matches!(
            parse_positive_units("0.0", 18),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("0.000000000000000000001").is_ok());
        assert!(validate_amount("12").is_ok());
        assert!(validate_amount("0").is_err());
        assert!(validate_amount("abc").is_err());
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(
            parse_hex_quantity("0x1bc16d674ec80000").unwrap(),
            BigUint::from(2_000_000_000_000_000_000u64)
        );
        assert_eq!(parse_hex_quantity("0x0").unwrap(), BigUint::from(0u8));
        assert_eq!(parse_hex_quantity("0x").unwrap(), BigUint::from(0u8));
        assert!(parse_hex_quantity("1234").is_err());
    }
}
