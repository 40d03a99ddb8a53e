use std::collections::HashMap;

use serde::Serialize;

use crate::models::Record;

/// Label for records whose group key is empty.
pub const UNSPECIFIED: &str = "Не указано";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryGroup {
    pub key: String,
    pub count: usize,
    pub sum: f64,
    /// Positions of the member records in the summarized slice.
    #[serde(skip)]
    pub members: Vec<usize>,
}

/// Groups in first-encounter order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Summary {
    groups: Vec<SummaryGroup>,
}

impl Summary {
    pub fn groups(&self) -> &[SummaryGroup] {
        &self.groups
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&SummaryGroup> {
        self.groups.iter().find(|group| group.key == key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.groups.iter().map(|group| group.count).sum()
    }

    pub fn total_sum(&self) -> f64 {
        self.groups.iter().map(|group| group.sum).sum()
    }
}

/// Counts records per key.
pub fn summarize<K>(records: &[Record], key: K) -> Summary
where
    K: Fn(&Record) -> String,
{
    summarize_with(records, key, |_| None)
}

/// Counts records per key and sums `value` over each group.
pub fn summarize_with<K, V>(records: &[Record], key: K, value: V) -> Summary
where
    K: Fn(&Record) -> String,
    V: Fn(&Record) -> Option<f64>,
{
    let mut groups: Vec<SummaryGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let raw = key(record);
        let label = match raw.trim() {
            "" => UNSPECIFIED.to_string(),
            trimmed => trimmed.to_string(),
        };
        let slot = *positions.entry(label.clone()).or_insert_with(|| {
            groups.push(SummaryGroup {
                key: label,
                count: 0,
                sum: 0.0,
                members: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.count += 1;
        group.sum += value(record).filter(|amount| amount.is_finite()).unwrap_or(0.0);
        group.members.push(index);
    }

    Summary { groups }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn month_of(record: &Record) -> String {
        record
            .date("Date")
            .map(|date| date.format("%Y-%m").to_string())
            .unwrap_or_default()
    }

    #[test]
    fn monthly_expense_totals() {
        let rows = vec![
            record(json!({"Date": "2024-01-05", "Amount": 100})),
            record(json!({"Date": "2024-02-10", "Amount": 200})),
        ];
        let summary = summarize_with(&rows, month_of, |r| r.number("Amount"));

        assert_eq!(summary.len(), 2);
        let january = summary.get("2024-01").unwrap();
        assert_eq!((january.count, january.sum), (1, 100.0));
        let february = summary.get("2024-02").unwrap();
        assert_eq!((february.count, february.sum), (1, 200.0));
    }

    #[test]
    fn groups_follow_first_encounter_order() {
        let rows = vec![
            record(json!({"Type": "Насос"})),
            record(json!({"Type": "Генератор"})),
            record(json!({"Type": "Насос"})),
            record(json!({"Type": "Бур"})),
        ];
        let summary = summarize(&rows, |r| r.text("Type").unwrap_or_default());
        let keys = summary.groups().iter().map(|g| g.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["Насос", "Генератор", "Бур"]);
        assert_eq!(summary.get("Насос").unwrap().count, 2);
    }

    #[test]
    fn empty_keys_fall_under_unspecified() {
        let rows = vec![
            record(json!({"Status": null})),
            record(json!({"Status": "  "})),
            record(json!({})),
        ];
        let summary = summarize(&rows, |r| r.text("Status").unwrap_or_default());
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.get(UNSPECIFIED).unwrap().count, 3);
    }

    #[test]
    fn missing_or_non_finite_values_add_zero() {
        let rows = vec![
            record(json!({"Category": "A", "Amount": 10.5})),
            record(json!({"Category": "A", "Amount": "abc"})),
            record(json!({"Category": "A"})),
        ];
        let summary = summarize_with(
            &rows,
            |r| r.text("Category").unwrap_or_default(),
            |r| r.number("Amount").or(Some(f64::INFINITY)),
        );
        let group = summary.get("A").unwrap();
        assert_eq!(group.count, 3);
        assert_eq!(group.sum, 10.5);
    }

    #[test]
    fn groups_partition_the_input() {
        let rows = (0..25)
            .map(|i| {
                let bucket = ["x", "y", "", "z"][i % 4];
                record(json!({"Id": i, "Bucket": bucket}))
            })
            .collect::<Vec<_>>();
        let summary = summarize(&rows, |r| r.text("Bucket").unwrap_or_default());

        let mut seen = summary
            .groups()
            .iter()
            .flat_map(|group| group.members.iter().copied())
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..rows.len()).collect::<Vec<_>>());
        assert_eq!(summary.total_count(), rows.len());
    }
}
