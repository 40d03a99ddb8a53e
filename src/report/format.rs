use chrono::{NaiveDate, NaiveDateTime};

use crate::models::Record;

pub const CURRENCY_SUFFIX: &str = "BYN";
pub const EMPTY_CELL: &str = "-";

/// Two decimals plus the currency suffix. Non-finite input renders as zero.
pub fn format_currency(amount: f64) -> String {
    let amount = if amount.is_finite() { amount } else { 0.0 };
    let rendered = format!("{amount:.2}");
    // negative amounts that round to zero
    if rendered == "-0.00" {
        return format!("0.00 {CURRENCY_SUFFIX}");
    }
    format!("{rendered} {CURRENCY_SUFFIX}")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format("%d.%m.%Y %H:%M").to_string()
}

/// Integral quantities print without a fractional part.
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

pub fn text_cell(record: &Record, field: &str) -> String {
    record
        .text(field)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| EMPTY_CELL.to_string())
}

/// Parsed dates render as `DD.MM.YYYY`; anything unparseable is shown as stored.
pub fn date_cell(record: &Record, field: &str) -> String {
    match record.date(field) {
        Some(date) => format_date(date),
        None => text_cell(record, field),
    }
}

pub fn currency_cell(record: &Record, field: &str) -> String {
    match record.number(field) {
        Some(value) => format_currency(value),
        None => EMPTY_CELL.to_string(),
    }
}

pub fn quantity_cell(record: &Record, quantity_field: &str, unit_field: &str) -> String {
    match record.number(quantity_field) {
        Some(value) => match record.text(unit_field).filter(|unit| !unit.trim().is_empty()) {
            Some(unit) => format!("{} {}", format_quantity(value), unit.trim()),
            None => format_quantity(value),
        },
        None => EMPTY_CELL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn currency_always_has_two_decimals_and_suffix() {
        assert_eq!(format_currency(0.0), "0.00 BYN");
        assert_eq!(format_currency(1234.5), "1234.50 BYN");
        assert_eq!(format_currency(-12.3), "-12.30 BYN");
        assert_eq!(format_currency(-0.0), "0.00 BYN");
        assert_eq!(format_currency(-0.001), "0.00 BYN");
        assert_eq!(format_currency(f64::NAN), "0.00 BYN");
        assert_eq!(format_currency(1e12), "1000000000000.00 BYN");
    }

    #[test]
    fn dates_render_day_first() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(format_date(date), "05.01.2024");
    }

    #[test]
    fn cells_fall_back_to_placeholder() {
        let record: Record = serde_json::from_value(json!({
            "Date": "2024-02-10",
            "Odd": "когда-нибудь",
            "Quantity": 12,
            "Unit": "шт",
            "Price": "3,5",
            "Blank": "  ",
        }))
        .unwrap();
        assert_eq!(date_cell(&record, "Date"), "10.02.2024");
        assert_eq!(date_cell(&record, "Odd"), "когда-нибудь");
        assert_eq!(date_cell(&record, "Missing"), EMPTY_CELL);
        assert_eq!(quantity_cell(&record, "Quantity", "Unit"), "12 шт");
        assert_eq!(currency_cell(&record, "Price"), "3.50 BYN");
        assert_eq!(text_cell(&record, "Blank"), EMPTY_CELL);
    }
}
