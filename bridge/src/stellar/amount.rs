use anyhow::{bail, Context, Result};

/// 1 TFT = 10^7 stroops; horizon renders amounts with 7 fractional digits.
pub const STELLAR_PRECISION: i64 = 10_000_000;
pub const STELLAR_PRECISION_DIGITS: usize = 7;

/// Parse a horizon decimal amount string into stroops.
pub fn parse(amount: &str) -> Result<i64> {
    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    if frac.len() > STELLAR_PRECISION_DIGITS {
        bail!("amount {amount} has more than {STELLAR_PRECISION_DIGITS} fractional digits");
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .with_context(|| format!("invalid amount {amount}"))?
    };
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<7}")
            .parse()
            .with_context(|| format!("invalid amount {amount}"))?
    };
    if whole < 0 || frac < 0 {
        bail!("amount {amount} is negative");
    }

    whole
        .checked_mul(STELLAR_PRECISION)
        .and_then(|w| w.checked_add(frac))
        .with_context(|| format!("amount {amount} overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse("2").unwrap(), 20_000_000);
        assert_eq!(parse("2.0000000").unwrap(), 20_000_000);
        assert_eq!(parse("0.0000001").unwrap(), 1);
        assert_eq!(parse("0.1").unwrap(), 1_000_000);
        assert_eq!(parse(".5").unwrap(), 5_000_000);
        assert_eq!(parse("922337203685.4775807").unwrap(), i64::MAX);
    }

    #[test]
    fn rejects_bad_amounts() {
        assert!(parse("").is_err());
        assert!(parse("1.23456789").is_err());
        assert!(parse("abc").is_err());
        assert!(parse("-1").is_err());
        assert!(parse("1.2.3").is_err());
    }

    #[test]
    fn parses_padded_fractions_consistently() {
        assert_eq!(parse("0.05").unwrap(), parse("0.0500000").unwrap());
        assert_eq!(parse("12").unwrap(), parse("12.0000000").unwrap());
    }
}
