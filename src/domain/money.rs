use std::fmt;

/// Money is held as whole currency units. There is no fractional currency:
/// every amount and balance in the ledger is an integer.
pub type Amount = i64;

/// Apply a signed delta to a balance, refusing to wrap around.
pub fn checked_apply(balance: Amount, delta: Amount) -> Option<Amount> {
    balance.checked_add(delta)
}

/// Format an amount with thousands separators.
/// Example: 1234567 -> "1,234,567", -20 -> "-20"
pub fn format_amount(amount: Amount) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Parse a user-supplied amount. Only plain positive integers are accepted;
/// underscores and commas are allowed as digit separators.
/// Example: "50" -> 50, "1_000" -> 1000, "1,000" -> 1000
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != ',')
        .collect();

    if cleaned.is_empty() {
        return Err(ParseAmountError::Empty);
    }
    if cleaned.contains('.') {
        return Err(ParseAmountError::Fractional);
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseAmountError::InvalidFormat);
    }

    let amount: Amount = cleaned
        .parse()
        .map_err(|_| ParseAmountError::TooLarge)?;
    if amount == 0 {
        return Err(ParseAmountError::NotPositive);
    }
    Ok(amount)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    Empty,
    InvalidFormat,
    Fractional,
    NotPositive,
    TooLarge,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::Empty => write!(f, "amount is empty"),
            ParseAmountError::InvalidFormat => write!(f, "amount must be a whole number"),
            ParseAmountError::Fractional => write!(f, "fractional amounts are not supported"),
            ParseAmountError::NotPositive => write!(f, "amount must be positive"),
            ParseAmountError::TooLarge => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseAmountError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(50), "50");
        assert_eq!(format_amount(1000), "1,000");
        assert_eq!(format_amount(1234567), "1,234,567");
        assert_eq!(format_amount(-20), "-20");
        assert_eq!(format_amount(-100000), "-100,000");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50"), Ok(50));
        assert_eq!(parse_amount(" 70 "), Ok(70));
        assert_eq!(parse_amount("1_000"), Ok(1000));
        assert_eq!(parse_amount("1,000,000"), Ok(1_000_000));
    }

    #[test]
    fn test_parse_amount_rejects_non_positive() {
        assert_eq!(parse_amount("0"), Err(ParseAmountError::NotPositive));
        // A leading minus is not a digit
        assert_eq!(parse_amount("-5"), Err(ParseAmountError::InvalidFormat));
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert_eq!(parse_amount(""), Err(ParseAmountError::Empty));
        assert_eq!(parse_amount("12.50"), Err(ParseAmountError::Fractional));
        assert_eq!(parse_amount("abc"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(
            parse_amount("99999999999999999999"),
            Err(ParseAmountError::TooLarge)
        );
    }

    #[test]
    fn test_checked_apply_detects_overflow() {
        assert_eq!(checked_apply(10, -30), Some(-20));
        assert_eq!(checked_apply(Amount::MAX, 1), None);
    }
}
