//! Per-resource report definitions.
//!
//! Each [`ReportKind`] owns a static [`ReportSpec`]: the collection it reports
//! on, the lookups needed to resolve foreign keys, its column catalog, the
//! multi-select filters it offers and the summary groupings it prints.

use std::fmt;

use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

use crate::models::{Record, ResourceKind};
use crate::report::format::{
    currency_cell, date_cell, format_currency, quantity_cell, text_cell, EMPTY_CELL,
};
use crate::report::resolve::{resolve_name, resource_type_label, ResourceIndices};

pub type CellFormatter = fn(&Record, &ResourceIndices) -> String;
pub type GroupKey = fn(&Record, &ResourceIndices) -> String;
pub type GroupValue = fn(&Record) -> Option<f64>;

pub struct ColumnSpec {
    pub id: &'static str,
    pub header: &'static str,
    pub format: CellFormatter,
}

/// Summed measure of a grouping, rendered as currency.
pub struct SumSpec {
    pub header: &'static str,
    pub value: GroupValue,
}

pub struct GroupingSpec {
    pub id: &'static str,
    pub title: &'static str,
    pub header: &'static str,
    pub key: GroupKey,
    pub sum: Option<SumSpec>,
}

pub struct SelectFilterSpec {
    pub id: &'static str,
    pub field: &'static str,
    pub label: &'static str,
    /// Collection naming the ids stored in `field`.
    pub lookup: Option<ResourceKind>,
}

pub struct ReportSpec {
    pub kind: ReportKind,
    pub title: &'static str,
    pub source: ResourceKind,
    pub lookups: &'static [ResourceKind],
    pub date_field: Option<&'static str>,
    pub time_field: Option<&'static str>,
    /// Sort the filtered rows ascending by date and time.
    pub sort_by_date: bool,
    pub columns: &'static [ColumnSpec],
    pub filters: &'static [SelectFilterSpec],
    pub groupings: &'static [GroupingSpec],
}

impl ReportSpec {
    pub fn column(&self, id: &str) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn filter(&self, id: &str) -> Option<&'static SelectFilterSpec> {
        self.filters.iter().find(|filter| filter.id == id)
    }

    /// Source collection first, then lookups, without duplicates.
    pub fn required_collections(&self) -> Vec<ResourceKind> {
        let mut kinds = vec![self.source];
        for kind in self.lookups {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Equipment,
    Expenses,
    Materials,
    Spares,
    Schedule,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::Equipment,
        ReportKind::Expenses,
        ReportKind::Materials,
        ReportKind::Spares,
        ReportKind::Schedule,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ReportKind::Equipment => "equipment",
            ReportKind::Expenses => "expenses",
            ReportKind::Materials => "materials",
            ReportKind::Spares => "spares",
            ReportKind::Schedule => "schedule",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    pub fn spec(self) -> &'static ReportSpec {
        match self {
            ReportKind::Equipment => &EQUIPMENT,
            ReportKind::Expenses => &EXPENSES,
            ReportKind::Materials => &MATERIALS,
            ReportKind::Spares => &SPARES,
            ReportKind::Schedule => &SCHEDULE,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl<'a> FromParam<'a> for ReportKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        ReportKind::from_slug(param).ok_or(param)
    }
}

fn stock_value(record: &Record) -> Option<f64> {
    Some(record.number("Quantity")? * record.number("Price")?)
}

fn month_key(record: &Record, _: &ResourceIndices) -> String {
    record
        .date("Date")
        .map(|date| date.format("%Y-%m").to_string())
        .unwrap_or_default()
}

fn location_name(record: &Record, indices: &ResourceIndices) -> String {
    indices.name(ResourceKind::StorageLocations, record.id("Location_ID"))
}

fn employee_name(record: &Record, indices: &ResourceIndices) -> String {
    indices.name(ResourceKind::Employees, record.id("Employee_ID"))
}

fn field_key(record: &Record, field: &str) -> String {
    record.text(field).unwrap_or_default()
}

static EQUIPMENT: ReportSpec = ReportSpec {
    kind: ReportKind::Equipment,
    title: "Отчет по оборудованию",
    source: ResourceKind::Equipment,
    lookups: &[ResourceKind::Employees, ResourceKind::StorageLocations],
    date_field: Some("Commission_Date"),
    time_field: None,
    sort_by_date: false,
    columns: &[
        ColumnSpec {
            id: "name",
            header: "Наименование",
            format: |r, _| text_cell(r, "Name"),
        },
        ColumnSpec {
            id: "type",
            header: "Тип",
            format: |r, _| text_cell(r, "Type"),
        },
        ColumnSpec {
            id: "status",
            header: "Статус",
            format: |r, _| text_cell(r, "Status"),
        },
        ColumnSpec {
            id: "serialNumber",
            header: "Серийный номер",
            format: |r, _| text_cell(r, "Serial_Number"),
        },
        ColumnSpec {
            id: "commissionDate",
            header: "Дата ввода в эксплуатацию",
            format: |r, _| date_cell(r, "Commission_Date"),
        },
        ColumnSpec {
            id: "responsible",
            header: "Ответственный",
            format: employee_name,
        },
        ColumnSpec {
            id: "location",
            header: "Место хранения",
            format: location_name,
        },
    ],
    filters: &[
        SelectFilterSpec {
            id: "types",
            field: "Type",
            label: "Тип",
            lookup: None,
        },
        SelectFilterSpec {
            id: "statuses",
            field: "Status",
            label: "Статус",
            lookup: None,
        },
        SelectFilterSpec {
            id: "locations",
            field: "Location_ID",
            label: "Место хранения",
            lookup: Some(ResourceKind::StorageLocations),
        },
    ],
    groupings: &[
        GroupingSpec {
            id: "byType",
            title: "Оборудование по типам",
            header: "Тип",
            key: |r, _| field_key(r, "Type"),
            sum: None,
        },
        GroupingSpec {
            id: "byStatus",
            title: "Оборудование по статусам",
            header: "Статус",
            key: |r, _| field_key(r, "Status"),
            sum: None,
        },
    ],
};

static EXPENSES: ReportSpec = ReportSpec {
    kind: ReportKind::Expenses,
    title: "Отчет по расходам",
    source: ResourceKind::Expenses,
    lookups: &[
        ResourceKind::Employees,
        ResourceKind::Equipment,
        ResourceKind::Transportation,
        ResourceKind::Tools,
        ResourceKind::Spares,
        ResourceKind::Materials,
    ],
    date_field: Some("Date"),
    time_field: None,
    sort_by_date: true,
    columns: &[
        ColumnSpec {
            id: "date",
            header: "Дата",
            format: |r, _| date_cell(r, "Date"),
        },
        ColumnSpec {
            id: "category",
            header: "Категория",
            format: |r, _| text_cell(r, "Category"),
        },
        ColumnSpec {
            id: "resourceType",
            header: "Тип ресурса",
            format: |r, _| {
                r.text("Resource_Type")
                    .map(|raw| resource_type_label(&raw))
                    .filter(|label| !label.is_empty())
                    .unwrap_or_else(|| text_cell(r, "Resource_Type"))
            },
        },
        ColumnSpec {
            id: "resource",
            header: "Ресурс",
            format: |r, indices| {
                resolve_name(
                    &r.text("Resource_Type").unwrap_or_default(),
                    r.id("Resource_ID"),
                    indices,
                )
            },
        },
        ColumnSpec {
            id: "amount",
            header: "Сумма",
            format: |r, _| currency_cell(r, "Amount"),
        },
        ColumnSpec {
            id: "description",
            header: "Описание",
            format: |r, _| text_cell(r, "Description"),
        },
    ],
    filters: &[
        SelectFilterSpec {
            id: "categories",
            field: "Category",
            label: "Категория",
            lookup: None,
        },
        SelectFilterSpec {
            id: "resourceTypes",
            field: "Resource_Type",
            label: "Тип ресурса",
            lookup: None,
        },
    ],
    groupings: &[
        GroupingSpec {
            id: "byCategory",
            title: "Расходы по категориям",
            header: "Категория",
            key: |r, _| field_key(r, "Category"),
            sum: Some(SumSpec {
                header: "Сумма",
                value: |r| r.number("Amount"),
            }),
        },
        GroupingSpec {
            id: "byResourceType",
            title: "Расходы по типам ресурсов",
            header: "Тип ресурса",
            key: |r, _| {
                r.text("Resource_Type")
                    .map(|raw| resource_type_label(&raw))
                    .unwrap_or_default()
            },
            sum: Some(SumSpec {
                header: "Сумма",
                value: |r| r.number("Amount"),
            }),
        },
        GroupingSpec {
            id: "byMonth",
            title: "Расходы по месяцам",
            header: "Месяц",
            key: month_key,
            sum: Some(SumSpec {
                header: "Сумма",
                value: |r| r.number("Amount"),
            }),
        },
    ],
};

static MATERIALS: ReportSpec = ReportSpec {
    kind: ReportKind::Materials,
    title: "Отчет по материалам",
    source: ResourceKind::Materials,
    lookups: &[ResourceKind::StorageLocations],
    date_field: Some("Replenishment_Date"),
    time_field: None,
    sort_by_date: false,
    columns: &[
        ColumnSpec {
            id: "name",
            header: "Наименование",
            format: |r, _| text_cell(r, "Name"),
        },
        ColumnSpec {
            id: "category",
            header: "Категория",
            format: |r, _| text_cell(r, "Category"),
        },
        ColumnSpec {
            id: "quantity",
            header: "Количество",
            format: |r, _| quantity_cell(r, "Quantity", "Unit"),
        },
        ColumnSpec {
            id: "price",
            header: "Цена",
            format: |r, _| currency_cell(r, "Price"),
        },
        ColumnSpec {
            id: "total",
            header: "Стоимость",
            format: |r, _| {
                stock_value(r)
                    .map(format_currency)
                    .unwrap_or_else(|| EMPTY_CELL.to_string())
            },
        },
        ColumnSpec {
            id: "replenishmentDate",
            header: "Дата пополнения",
            format: |r, _| date_cell(r, "Replenishment_Date"),
        },
        ColumnSpec {
            id: "location",
            header: "Место хранения",
            format: location_name,
        },
    ],
    filters: &[
        SelectFilterSpec {
            id: "categories",
            field: "Category",
            label: "Категория",
            lookup: None,
        },
        SelectFilterSpec {
            id: "locations",
            field: "Location_ID",
            label: "Место хранения",
            lookup: Some(ResourceKind::StorageLocations),
        },
    ],
    groupings: &[
        GroupingSpec {
            id: "byCategory",
            title: "Материалы по категориям",
            header: "Категория",
            key: |r, _| field_key(r, "Category"),
            sum: Some(SumSpec {
                header: "Стоимость",
                value: stock_value,
            }),
        },
        GroupingSpec {
            id: "byLocation",
            title: "Материалы по местам хранения",
            header: "Место хранения",
            key: location_name,
            sum: Some(SumSpec {
                header: "Стоимость",
                value: stock_value,
            }),
        },
    ],
};

static SPARES: ReportSpec = ReportSpec {
    kind: ReportKind::Spares,
    title: "Отчет по запчастям",
    source: ResourceKind::Spares,
    lookups: &[ResourceKind::StorageLocations],
    date_field: Some("Replenishment_Date"),
    time_field: None,
    sort_by_date: false,
    columns: &[
        ColumnSpec {
            id: "name",
            header: "Наименование",
            format: |r, _| text_cell(r, "Name"),
        },
        ColumnSpec {
            id: "type",
            header: "Тип",
            format: |r, _| text_cell(r, "Type"),
        },
        ColumnSpec {
            id: "quantity",
            header: "Количество",
            format: |r, _| quantity_cell(r, "Quantity", "Unit"),
        },
        ColumnSpec {
            id: "price",
            header: "Цена",
            format: |r, _| currency_cell(r, "Price"),
        },
        ColumnSpec {
            id: "total",
            header: "Стоимость",
            format: |r, _| {
                stock_value(r)
                    .map(format_currency)
                    .unwrap_or_else(|| EMPTY_CELL.to_string())
            },
        },
        ColumnSpec {
            id: "replenishmentDate",
            header: "Дата пополнения",
            format: |r, _| date_cell(r, "Replenishment_Date"),
        },
        ColumnSpec {
            id: "location",
            header: "Место хранения",
            format: location_name,
        },
    ],
    filters: &[
        SelectFilterSpec {
            id: "types",
            field: "Type",
            label: "Тип",
            lookup: None,
        },
        SelectFilterSpec {
            id: "locations",
            field: "Location_ID",
            label: "Место хранения",
            lookup: Some(ResourceKind::StorageLocations),
        },
    ],
    groupings: &[
        GroupingSpec {
            id: "byType",
            title: "Запчасти по типам",
            header: "Тип",
            key: |r, _| field_key(r, "Type"),
            sum: Some(SumSpec {
                header: "Стоимость",
                value: stock_value,
            }),
        },
        GroupingSpec {
            id: "byLocation",
            title: "Запчасти по местам хранения",
            header: "Место хранения",
            key: location_name,
            sum: Some(SumSpec {
                header: "Стоимость",
                value: stock_value,
            }),
        },
    ],
};

static SCHEDULE: ReportSpec = ReportSpec {
    kind: ReportKind::Schedule,
    title: "Отчет по графику работ",
    source: ResourceKind::Schedule,
    lookups: &[
        ResourceKind::Employees,
        ResourceKind::Transportation,
        ResourceKind::Processes,
    ],
    date_field: Some("Start_Date"),
    time_field: Some("Start_Time"),
    sort_by_date: true,
    columns: &[
        ColumnSpec {
            id: "task",
            header: "Задача",
            format: |r, _| text_cell(r, "Task_Name"),
        },
        ColumnSpec {
            id: "process",
            header: "Процесс",
            format: |r, indices| indices.name(ResourceKind::Processes, r.id("Process_ID")),
        },
        ColumnSpec {
            id: "employee",
            header: "Исполнитель",
            format: employee_name,
        },
        ColumnSpec {
            id: "vehicle",
            header: "Транспорт",
            format: |r, indices| indices.name(ResourceKind::Transportation, r.id("Transport_ID")),
        },
        ColumnSpec {
            id: "startDate",
            header: "Дата начала",
            format: |r, _| date_cell(r, "Start_Date"),
        },
        ColumnSpec {
            id: "startTime",
            header: "Время начала",
            format: |r, _| text_cell(r, "Start_Time"),
        },
        ColumnSpec {
            id: "endDate",
            header: "Дата окончания",
            format: |r, _| date_cell(r, "End_Date"),
        },
        ColumnSpec {
            id: "status",
            header: "Статус",
            format: |r, _| text_cell(r, "Status"),
        },
        ColumnSpec {
            id: "priority",
            header: "Приоритет",
            format: |r, _| text_cell(r, "Priority"),
        },
        ColumnSpec {
            id: "description",
            header: "Описание",
            format: |r, _| text_cell(r, "Description"),
        },
    ],
    filters: &[
        SelectFilterSpec {
            id: "statuses",
            field: "Status",
            label: "Статус",
            lookup: None,
        },
        SelectFilterSpec {
            id: "priorities",
            field: "Priority",
            label: "Приоритет",
            lookup: None,
        },
        SelectFilterSpec {
            id: "employees",
            field: "Employee_ID",
            label: "Исполнитель",
            lookup: Some(ResourceKind::Employees),
        },
        SelectFilterSpec {
            id: "processes",
            field: "Process_ID",
            label: "Процесс",
            lookup: Some(ResourceKind::Processes),
        },
    ],
    groupings: &[
        GroupingSpec {
            id: "byStatus",
            title: "Задачи по статусам",
            header: "Статус",
            key: |r, _| field_key(r, "Status"),
            sum: None,
        },
        GroupingSpec {
            id: "byPriority",
            title: "Задачи по приоритетам",
            header: "Приоритет",
            key: |r, _| field_key(r, "Priority"),
            sum: None,
        },
        GroupingSpec {
            id: "byEmployee",
            title: "Задачи по исполнителям",
            header: "Исполнитель",
            key: employee_name,
            sum: None,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn catalog_ids_are_unique_per_kind() {
        for kind in ReportKind::ALL {
            let spec = kind.spec();
            assert_eq!(spec.kind, kind);
            let columns = spec.columns.iter().map(|c| c.id).collect::<HashSet<_>>();
            assert_eq!(columns.len(), spec.columns.len(), "{kind} columns");
            let filters = spec.filters.iter().map(|f| f.id).collect::<HashSet<_>>();
            assert_eq!(filters.len(), spec.filters.len(), "{kind} filters");
            assert!(!spec.groupings.is_empty());
        }
    }

    #[test]
    fn filters_and_dates_refer_to_source_columns() {
        for kind in ReportKind::ALL {
            let spec = kind.spec();
            let source = spec.source;
            let known = |field: &str| {
                source.columns().contains(&field) || source.derived_columns().contains(&field)
            };
            for filter in spec.filters {
                assert!(known(filter.field), "{kind}: {}", filter.field);
                if let Some(lookup) = filter.lookup {
                    assert!(spec.lookups.contains(&lookup), "{kind}: {}", filter.id);
                }
            }
            if let Some(field) = spec.date_field {
                assert!(known(field), "{kind}: {field}");
            }
        }
    }

    #[test]
    fn required_collections_start_with_source() {
        let kinds = ReportKind::Schedule.spec().required_collections();
        assert_eq!(kinds[0], ResourceKind::Schedule);
        assert_eq!(kinds.len(), 4);
    }

    #[test]
    fn expense_resource_column_resolves_names() {
        let mut collections = HashMap::new();
        collections.insert(
            ResourceKind::Tools,
            vec![
                serde_json::from_value(serde_json::json!({"Tool_ID": 4, "Name": "Перфоратор"}))
                    .unwrap(),
            ],
        );
        let indices = ResourceIndices::build(&collections);
        let record: Record = serde_json::from_value(serde_json::json!({
            "Resource_Type": "Tool",
            "Resource_ID": 4,
            "Amount": 15
        }))
        .unwrap();

        let spec = ReportKind::Expenses.spec();
        let resource = spec.column("resource").unwrap();
        assert_eq!((resource.format)(&record, &indices), "Перфоратор");
        let kind = spec.column("resourceType").unwrap();
        assert_eq!((kind.format)(&record, &indices), "Инструмент");
        let amount = spec.column("amount").unwrap();
        assert_eq!((amount.format)(&record, &indices), "15.00 BYN");
    }
}
