//! Record filtering by date range and multi-select field values.
//!
//! Filtering never fails: a record without a usable date passes every date
//! range, while a record without a value fails any non-empty selection.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::Record;

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Range covering every representable date.
    pub fn unbounded() -> Self {
        Self {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub range: DateRange,
    /// Field holding the record's date. `None` disables the date check.
    pub date_field: Option<String>,
    /// Field name -> accepted values. An empty set accepts everything.
    pub selections: BTreeMap<String, BTreeSet<String>>,
}

impl FilterCriteria {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    pub fn on_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    pub fn select<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selections
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    fn date_matches(&self, record: &Record) -> bool {
        let Some(field) = self.date_field.as_deref() else {
            return true;
        };
        match record.date(field) {
            Some(date) => self.range.contains(date),
            None => true,
        }
    }

    fn selections_match(&self, record: &Record) -> bool {
        self.selections.iter().all(|(field, accepted)| {
            if accepted.is_empty() {
                return true;
            }
            match record.text(field) {
                Some(value) => accepted.contains(value.trim()),
                None => false,
            }
        })
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.date_matches(record) && self.selections_match(record)
    }
}

/// Records satisfying every criterion, in source order.
pub fn filter(records: &[Record], criteria: &FilterCriteria) -> Vec<Record> {
    records
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn expenses() -> Vec<Record> {
        vec![
            record(json!({"Expense_ID": 1, "Date": "2024-01-05", "Amount": 100,
                          "Category": "Топливо"})),
            record(json!({"Expense_ID": 2, "Date": "2024-02-10", "Amount": 200,
                          "Category": "Ремонт"})),
            record(json!({"Expense_ID": 3, "Date": "2024-03-01", "Amount": 300,
                          "Category": "Топливо"})),
        ]
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().filter_map(|r| r.id("Expense_ID")).collect()
    }

    #[test]
    fn date_range_is_inclusive() {
        let criteria = FilterCriteria::new(DateRange::new(ymd(2024, 1, 1), ymd(2024, 2, 28)))
            .on_date_field("Date");
        assert_eq!(ids(&filter(&expenses(), &criteria)), vec![1, 2]);

        let edges = FilterCriteria::new(DateRange::new(ymd(2024, 1, 5), ymd(2024, 3, 1)))
            .on_date_field("Date");
        assert_eq!(ids(&filter(&expenses(), &edges)), vec![1, 2, 3]);
    }

    #[test]
    fn missing_date_passes_but_null_category_fails() {
        let rows = vec![
            record(json!({"Expense_ID": 1, "Category": "Топливо"})),
            record(json!({"Expense_ID": 2, "Date": "2024-01-10", "Category": null})),
            record(json!({"Expense_ID": 3, "Date": "not a date", "Category": "Топливо"})),
        ];
        let by_date = FilterCriteria::new(DateRange::new(ymd(2030, 1, 1), ymd(2030, 12, 31)))
            .on_date_field("Date");
        assert_eq!(ids(&filter(&rows, &by_date)), vec![1, 3]);

        let by_category = FilterCriteria::default().select("Category", ["Топливо"]);
        assert_eq!(ids(&filter(&rows, &by_category)), vec![1, 3]);
    }

    #[test]
    fn empty_selection_does_not_restrict() {
        let criteria = FilterCriteria::default().select("Category", Vec::<String>::new());
        assert_eq!(ids(&filter(&expenses(), &criteria)), vec![1, 2, 3]);
    }

    #[test]
    fn empty_criteria_is_identity() {
        let rows = expenses();
        let criteria = FilterCriteria::new(DateRange::unbounded()).on_date_field("Date");
        assert_eq!(filter(&rows, &criteria), rows);
    }

    #[test]
    fn selections_combine_with_and() {
        let criteria = FilterCriteria::new(DateRange::new(ymd(2024, 1, 1), ymd(2024, 1, 31)))
            .on_date_field("Date")
            .select("Category", ["Топливо", "Ремонт"]);
        assert_eq!(ids(&filter(&expenses(), &criteria)), vec![1]);
    }

    #[test]
    fn numeric_fields_match_their_text_form() {
        let rows = vec![
            record(json!({"Expense_ID": 1, "Employee_ID": 7})),
            record(json!({"Expense_ID": 2, "Employee_ID": 8})),
        ];
        let criteria = FilterCriteria::default().select("Employee_ID", ["7"]);
        assert_eq!(ids(&filter(&rows, &criteria)), vec![1]);
    }

    #[test]
    fn filtering_is_idempotent_and_leaves_input_alone() {
        let rows = expenses();
        let snapshot = rows.clone();
        let criteria = FilterCriteria::new(DateRange::new(ymd(2024, 1, 1), ymd(2024, 2, 28)))
            .on_date_field("Date")
            .select("Category", ["Топливо", "Ремонт"]);
        let once = filter(&rows, &criteria);
        let twice = filter(&once, &criteria);
        assert_eq!(once, twice);
        assert_eq!(filter(&rows, &criteria), once);
        assert_eq!(rows, snapshot);
    }

    #[test]
    fn widening_never_drops_matches() {
        let rows = expenses();
        let narrow = FilterCriteria::new(DateRange::new(ymd(2024, 1, 1), ymd(2024, 1, 31)))
            .on_date_field("Date")
            .select("Category", ["Топливо"]);
        let wide = FilterCriteria::new(DateRange::new(ymd(2023, 12, 1), ymd(2024, 3, 31)))
            .on_date_field("Date")
            .select("Category", ["Топливо", "Ремонт"]);

        let narrow_ids = ids(&filter(&rows, &narrow));
        let wide_ids = ids(&filter(&rows, &wide));
        assert!(narrow_ids.iter().all(|id| wide_ids.contains(id)));
        assert!(wide_ids.len() > narrow_ids.len());
    }
}
