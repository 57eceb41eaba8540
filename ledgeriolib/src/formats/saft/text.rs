//! Нестрогий разбор чисел и дат из выгрузок.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::model::PeriodBound;

/// Нормализация суммы: убрать пробелы (и неразрывные тоже), `,` как
/// десятичный разделитель, `.`/`,` как разделители тысяч.
/// Для пустого текста `None`.
fn normalize_amount(raw: &str) -> Option<String> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let comma = cleaned.rfind(',');
    let dot = cleaned.rfind('.');
    cleaned = match (comma, dot) {
        // десятичный разделитель идёт последним
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };
    Some(cleaned)
}

/// Разбор суммы; пустой текст даёт ноль.
pub fn parse_amount(raw: &str) -> Result<Decimal, String> {
    match normalize_amount(raw) {
        None => Ok(Decimal::ZERO),
        Some(text) => Decimal::from_str_exact(&text)
            .or_else(|_| Decimal::from_str(&text))
            .map_err(|e| format!("invalid amount {raw:?}: {e}")),
    }
}

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d.%m.%Y", "%d-%m-%Y", "%d/%m/%Y", "%Y.%m.%d", "%Y%m%d",
];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Граница периода: дата или номер периода (`3`, `P3`).
pub fn parse_period(raw: &str) -> Option<PeriodBound> {
    let text = raw.trim();
    if let Some(date) = parse_date(text) {
        return Some(PeriodBound::Date(date));
    }
    let digits = text.strip_prefix(&['P', 'p'][..]).unwrap_or(text);
    digits.parse::<u32>().ok().map(PeriodBound::Period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("1000.00", dec!(1000.00))]
    #[case(" 1 000,50 ", dec!(1000.50))]
    #[case("1.234.567,89", dec!(1234567.89))]
    #[case("1,234,567.89", dec!(1234567.89))]
    #[case("1.000.000", dec!(1000000))]
    #[case("-42,5", dec!(-42.5))]
    #[case("", dec!(0))]
    fn amounts_are_normalized(#[case] raw: &str, #[case] expected: Decimal) {
        assert_eq!(parse_amount(raw).unwrap(), expected);
    }

    #[test]
    fn garbage_amount_is_rejected() {
        let err = parse_amount("12abc").unwrap_err();
        assert!(err.contains("12abc"));
    }

    #[rstest]
    #[case("2023-01-31")]
    #[case("31.01.2023")]
    #[case("31/01/2023")]
    #[case("20230131")]
    #[case("2023-01-31T10:15:00")]
    fn dates_in_known_formats(#[case] raw: &str) {
        assert_eq!(parse_date(raw), NaiveDate::from_ymd_opt(2023, 1, 31));
    }

    #[test]
    fn periods_accept_numbers_and_dates() {
        assert_eq!(parse_period("3"), Some(PeriodBound::Period(3)));
        assert_eq!(parse_period("P12"), Some(PeriodBound::Period(12)));
        assert_eq!(
            parse_period("2023-12-31"),
            NaiveDate::from_ymd_opt(2023, 12, 31).map(PeriodBound::Date)
        );
        assert_eq!(parse_period("sometime"), None);
    }
}
