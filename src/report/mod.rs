//! Report pipeline: validate, fetch, resolve, filter, summarize, render.

pub mod catalog;
pub mod filter;
pub mod format;
pub mod render;
pub mod resolve;
pub mod summary;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::fetch::{fetch_all, EntityStore, FetchError};
use crate::models::{Record, ResourceKind};
use crate::report::catalog::{ReportKind, ReportSpec};
use crate::report::filter::{filter, DateRange, FilterCriteria};
use crate::report::format::{format_currency, format_date, format_timestamp};
use crate::report::render::{render, ReportSections, TableData};
use crate::report::resolve::ResourceIndices;
use crate::report::summary::{summarize, summarize_with};

const TOTAL_LABEL: &str = "Итого";
const COUNT_HEADER: &str = "Количество";
const DETAIL_CAPTION: &str = "Детализация";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Выберите сводку или детализацию")]
    NothingSelected,
    #[error("Дата начала {start} позже даты окончания {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("Неизвестный столбец: {0}")]
    UnknownColumn(String),
    #[error("Неизвестный фильтр: {0}")]
    UnknownFilter(String),
    #[error("Не удалось получить данные: {0}")]
    Fetch(#[from] FetchError),
    #[error("Нет данных для отчета")]
    NoData,
    #[error("Не удалось сформировать документ: {0}")]
    Render(String),
}

impl ReportError {
    pub fn status(&self) -> Status {
        match self {
            ReportError::NothingSelected
            | ReportError::InvalidRange { .. }
            | ReportError::UnknownColumn(_)
            | ReportError::UnknownFilter(_) => Status::UnprocessableEntity,
            ReportError::Fetch(_) => Status::BadGateway,
            ReportError::NoData => Status::NotFound,
            ReportError::Render(_) => Status::InternalServerError,
        }
    }
}

/// User-chosen parameters of one report.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Filter id -> selected values.
    pub filters: BTreeMap<String, Vec<String>>,
    /// Column ids in display order. Empty selects every column.
    pub columns: Vec<String>,
    pub include_summary: bool,
    pub include_details: bool,
}

impl ReportRequest {
    /// Rejects requests that cannot produce a report. Runs before any fetch.
    pub fn validate(&self, spec: &ReportSpec) -> Result<(), ReportError> {
        if !self.include_summary && !self.include_details {
            return Err(ReportError::NothingSelected);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ReportError::InvalidRange { start, end });
            }
        }
        if let Some(unknown) = self.columns.iter().find(|id| spec.column(id).is_none()) {
            return Err(ReportError::UnknownColumn(unknown.clone()));
        }
        if let Some(unknown) = self.filters.keys().find(|id| spec.filter(id).is_none()) {
            return Err(ReportError::UnknownFilter(unknown.clone()));
        }
        Ok(())
    }

    fn range(&self) -> DateRange {
        DateRange::new(
            self.start_date.unwrap_or(NaiveDate::MIN),
            self.end_date.unwrap_or(NaiveDate::MAX),
        )
    }

    fn criteria(&self, spec: &ReportSpec) -> FilterCriteria {
        let mut criteria = FilterCriteria::new(self.range());
        if let Some(field) = spec.date_field {
            criteria = criteria.on_date_field(field);
        }
        for (id, values) in &self.filters {
            if let Some(select) = spec.filter(id) {
                criteria = criteria.select(select.field, values.iter().map(|value| value.trim()));
            }
        }
        criteria
    }

    fn period_label(&self) -> String {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => {
                format!("Период: {} - {}", format_date(start), format_date(end))
            }
            (Some(start), None) => format!("Период: с {}", format_date(start)),
            (None, Some(end)) => format!("Период: по {}", format_date(end)),
            (None, None) => "Период: все записи".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Values offered by one multi-select filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterChoices {
    pub id: &'static str,
    pub label: &'static str,
    pub options: Vec<FilterOption>,
}

/// A rendered document ready for download.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

fn compare_by_date(spec: &ReportSpec, left: &Record, right: &Record) -> Ordering {
    let Some(date_field) = spec.date_field else {
        return Ordering::Equal;
    };
    // Undated records sort last.
    let by_date = match (left.date(date_field), right.date(date_field)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then_with(|| match spec.time_field {
        Some(time_field) => compare_times(left.text(time_field), right.text(time_field)),
        None => Ordering::Equal,
    })
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .ok()
}

/// Parsed times compare as times and sort ahead of unparseable text.
fn compare_times(left: Option<String>, right: Option<String>) -> Ordering {
    let parsed = |text: &Option<String>| text.as_deref().and_then(parse_time);
    match (parsed(&left), parsed(&right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(&right),
    }
}

fn summary_tables(spec: &ReportSpec, rows: &[Record], indices: &ResourceIndices) -> Vec<TableData> {
    spec.groupings
        .iter()
        .map(|grouping| {
            let key = |record: &Record| (grouping.key)(record, indices);
            let summary = match &grouping.sum {
                Some(sum) => summarize_with(rows, key, |record| (sum.value)(record)),
                None => summarize(rows, key),
            };

            let mut header = vec![grouping.header.to_string(), COUNT_HEADER.to_string()];
            if let Some(sum) = &grouping.sum {
                header.push(sum.header.to_string());
            }
            let row = |label: &str, count: usize, total: f64| {
                let mut cells = vec![label.to_string(), count.to_string()];
                if grouping.sum.is_some() {
                    cells.push(format_currency(total));
                }
                cells
            };

            let mut table_rows = summary
                .groups()
                .iter()
                .map(|group| row(&group.key, group.count, group.sum))
                .collect::<Vec<_>>();
            table_rows.push(row(TOTAL_LABEL, summary.total_count(), summary.total_sum()));

            TableData {
                caption: grouping.title.to_string(),
                header,
                rows: table_rows,
            }
        })
        .collect()
}

fn detail_table(
    spec: &ReportSpec,
    columns: &[String],
    rows: &[Record],
    indices: &ResourceIndices,
) -> TableData {
    let selected = if columns.is_empty() {
        spec.columns.iter().collect::<Vec<_>>()
    } else {
        columns.iter().filter_map(|id| spec.column(id)).collect()
    };
    TableData {
        caption: DETAIL_CAPTION.to_string(),
        header: selected.iter().map(|column| column.header.to_string()).collect(),
        rows: rows
            .iter()
            .map(|record| {
                selected
                    .iter()
                    .map(|column| (column.format)(record, indices))
                    .collect()
            })
            .collect(),
    }
}

/// One fetched snapshot of every collection a report reads.
pub struct ReportData {
    kind: ReportKind,
    collections: HashMap<ResourceKind, Vec<Record>>,
    indices: ResourceIndices,
}

impl ReportData {
    pub async fn fetch<S: EntityStore>(store: &S, kind: ReportKind) -> Result<Self, ReportError> {
        let collections = fetch_all(store, &kind.spec().required_collections()).await?;
        let indices = ResourceIndices::build(&collections);
        Ok(Self {
            kind,
            collections,
            indices,
        })
    }

    fn source(&self) -> &[Record] {
        self.collections
            .get(&self.kind.spec().source)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Lays out the report for an already validated `request`.
    pub fn sections(&self, request: &ReportRequest, now: NaiveDateTime) -> ReportSections {
        let spec = self.kind.spec();
        let source = self.source();

        let mut rows = filter(source, &request.criteria(spec));
        if spec.sort_by_date {
            rows.sort_by(|left, right| compare_by_date(spec, left, right));
        }
        debug!(
            "{} report: {} of {} records selected",
            self.kind,
            rows.len(),
            source.len()
        );

        let (summaries, detail) = if rows.is_empty() {
            (Vec::new(), None)
        } else {
            let summaries = if request.include_summary {
                summary_tables(spec, &rows, &self.indices)
            } else {
                Vec::new()
            };
            let detail = request
                .include_details
                .then(|| detail_table(spec, &request.columns, &rows, &self.indices));
            (summaries, detail)
        };

        ReportSections {
            title: spec.title.to_string(),
            period: request.period_label(),
            summaries,
            detail,
            footer: format!("Сформировано: {}", format_timestamp(now)),
            record_count: rows.len(),
        }
    }

    /// Distinct values present for each filter, sorted by label and marked
    /// when `request` already selects them.
    pub fn choices(&self, request: &ReportRequest) -> Vec<FilterChoices> {
        let source = self.source();
        self.kind
            .spec()
            .filters
            .iter()
            .map(|select| {
                let chosen = request.filters.get(select.id);
                let mut seen = BTreeSet::new();
                let mut options = source
                    .iter()
                    .filter_map(|record| record.text(select.field))
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty() && seen.insert(value.clone()))
                    .map(|value| FilterOption {
                        label: match select.lookup {
                            Some(lookup) => self.indices.name(lookup, value.parse().ok()),
                            None => value.clone(),
                        },
                        selected: chosen.is_some_and(|values| values.contains(&value)),
                        value,
                    })
                    .collect::<Vec<_>>();
                options.sort_by(|left, right| left.label.cmp(&right.label));
                FilterChoices {
                    id: select.id,
                    label: select.label,
                    options,
                }
            })
            .collect()
    }
}

/// Validates, fetches and lays out the report without rendering it.
async fn assemble<S: EntityStore>(
    store: &S,
    kind: ReportKind,
    request: &ReportRequest,
    now: NaiveDateTime,
) -> Result<ReportSections, ReportError> {
    request.validate(kind.spec())?;
    let data = ReportData::fetch(store, kind).await?;
    Ok(data.sections(request, now))
}

/// Report sections as JSON-ready data. An empty selection yields `record_count == 0`.
pub async fn preview<S: EntityStore>(
    store: &S,
    kind: ReportKind,
    request: &ReportRequest,
    now: NaiveDateTime,
) -> Result<ReportSections, ReportError> {
    assemble(store, kind, request, now).await
}

/// Renders the report to a `.docx` document. An empty selection is [`ReportError::NoData`].
pub async fn generate<S: EntityStore>(
    store: &S,
    kind: ReportKind,
    request: &ReportRequest,
    now: NaiveDateTime,
) -> Result<GeneratedReport, ReportError> {
    let sections = assemble(store, kind, request, now).await?;
    if sections.record_count == 0 {
        return Err(ReportError::NoData);
    }
    let bytes = render(&sections)?;
    let filename = format!("{}_{}.docx", sections.title, now.format("%Y-%m-%d"));
    info!("generated {filename} ({} records, {} bytes)", sections.record_count, bytes.len());
    Ok(GeneratedReport { filename, bytes })
}
