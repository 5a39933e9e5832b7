use chrono::NaiveDate;
use regex::Regex;

use crate::classify::TransactionType;

/// Re-inserts a decimal comma before the last two digits when OCR dropped it.
pub fn patch_decimal_separator(price: &str) -> String {
    if price.contains(',') {
        return price.to_string();
    }

    let digits = price
        .char_indices()
        .filter(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    match digits.len() {
        0 | 1 => price.to_string(),
        n => {
            let at = digits[n - 2];
            format!("{},{}", &price[..at], &price[at..])
        }
    }
}

/// Parses `Mo. 21.07.`, `21.07` or `21.07.2025`. Dates without a year get
/// `year`.
pub fn parse_booking_date(text: &str, year: i32) -> Option<NaiveDate> {
    let weekday = Regex::new(r"\s*\b(Mo|Di|Mi|Do|Fr|Sa|So)\b\.?\s*").ok()?;
    let german_date = Regex::new(r"^(\d{1,2})\.(\d{1,2})\.?(\d{4})?$").ok()?;

    let cleaned = weekday.replace_all(text.trim(), "");
    let captures = german_date.captures(cleaned.trim())?;

    let day = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    let year = match captures.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => year,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Signed amount from OCR price text. Thousands dots are dropped, the comma
/// is the decimal separator and expenses are negative.
pub fn parse_amount(text: &str, sign: TransactionType) -> Option<f64> {
    let numeric = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .collect::<String>()
        .replacen(',', ".", 1)
        .replace(',', "");
    let value = numeric.parse::<f64>().ok()?.abs();

    Some(match sign {
        TransactionType::Expense => -value,
        TransactionType::Income => value,
    })
}
