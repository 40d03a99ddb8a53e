use std::fmt;

use chrono::NaiveDate;
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of a resource collection, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Text form of a scalar field. Null, absent and non-scalar values yield `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        match self.0.get(field)? {
            Value::Number(value) => value.as_f64(),
            Value::String(value) => value.trim().replace(',', ".").parse().ok(),
            _ => None,
        }
    }

    pub fn id(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(value) => value.as_i64(),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.text(field).as_deref().and_then(parse_date)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Parses `YYYY-MM-DD` (optionally followed by a time part) or `DD.MM.YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(prefix) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%d.%m.%Y") {
            return Some(date);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Employees,
    Equipment,
    Transportation,
    Tools,
    Spares,
    Materials,
    Expenses,
    ExpenseCategories,
    Processes,
    Schedule,
    StorageLocations,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Employees,
        ResourceKind::Equipment,
        ResourceKind::Transportation,
        ResourceKind::Tools,
        ResourceKind::Spares,
        ResourceKind::Materials,
        ResourceKind::Expenses,
        ResourceKind::ExpenseCategories,
        ResourceKind::Processes,
        ResourceKind::Schedule,
        ResourceKind::StorageLocations,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ResourceKind::Employees => "employees",
            ResourceKind::Equipment => "equipment",
            ResourceKind::Transportation => "transportation",
            ResourceKind::Tools => "tools",
            ResourceKind::Spares => "spares",
            ResourceKind::Materials => "materials",
            ResourceKind::Expenses => "expenses",
            ResourceKind::ExpenseCategories => "categories",
            ResourceKind::Processes => "processes",
            ResourceKind::Schedule => "schedule",
            ResourceKind::StorageLocations => "locations",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    /// Path of the collection on the entity REST API.
    pub fn api_path(self) -> &'static str {
        match self {
            ResourceKind::Employees => "/api/employees",
            ResourceKind::Equipment => "/api/equipment",
            ResourceKind::Transportation => "/api/transportation",
            ResourceKind::Tools => "/api/tools",
            ResourceKind::Spares => "/api/spares",
            ResourceKind::Materials => "/api/materials",
            ResourceKind::Expenses => "/api/expenses",
            ResourceKind::ExpenseCategories => "/api/expenses/categories/all",
            ResourceKind::Processes => "/api/processes",
            ResourceKind::Schedule => "/api/schedule",
            ResourceKind::StorageLocations => "/api/locations",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            ResourceKind::Employees => "Employees",
            ResourceKind::Equipment => "Equipment",
            ResourceKind::Transportation => "Transportation",
            ResourceKind::Tools => "Tools",
            ResourceKind::Spares => "Spares",
            ResourceKind::Materials => "Materials",
            ResourceKind::Expenses => "Expenses",
            ResourceKind::ExpenseCategories => "ExpenseCategories",
            ResourceKind::Processes => "Processes",
            ResourceKind::Schedule => "Schedule",
            ResourceKind::StorageLocations => "StorageLocations",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ResourceKind::Employees => "Employee_ID",
            ResourceKind::Equipment => "Equipment_ID",
            ResourceKind::Transportation => "Transport_ID",
            ResourceKind::Tools => "Tool_ID",
            ResourceKind::Spares => "Spare_ID",
            ResourceKind::Materials => "Material_ID",
            ResourceKind::Expenses => "Expense_ID",
            ResourceKind::ExpenseCategories => "Category_ID",
            ResourceKind::Processes => "Process_ID",
            ResourceKind::Schedule => "Task_ID",
            ResourceKind::StorageLocations => "Location_ID",
        }
    }

    /// Writable columns, primary key excluded.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Employees => &["Full_Name", "Position", "Phone", "Email", "Hire_Date"],
            ResourceKind::Equipment => &[
                "Name",
                "Type",
                "Status",
                "Serial_Number",
                "Commission_Date",
                "Employee_ID",
                "Location_ID",
            ],
            ResourceKind::Transportation => &[
                "Brand",
                "Model",
                "License_Plate",
                "Type",
                "Status",
                "Year",
                "Employee_ID",
            ],
            ResourceKind::Tools => &[
                "Name",
                "Category",
                "Status",
                "Quantity",
                "Employee_ID",
                "Location_ID",
            ],
            ResourceKind::Spares => &[
                "Name",
                "Type",
                "Quantity",
                "Unit",
                "Price",
                "Replenishment_Date",
                "Location_ID",
            ],
            ResourceKind::Materials => &[
                "Name",
                "Category",
                "Quantity",
                "Unit",
                "Price",
                "Replenishment_Date",
                "Location_ID",
            ],
            ResourceKind::Expenses => &[
                "Category_ID",
                "Resource_Type",
                "Resource_ID",
                "Amount",
                "Date",
                "Description",
            ],
            ResourceKind::ExpenseCategories => &["Name", "Description"],
            ResourceKind::Processes => &["Name", "Description"],
            ResourceKind::Schedule => &[
                "Task_Name",
                "Description",
                "Process_ID",
                "Employee_ID",
                "Transport_ID",
                "Start_Date",
                "Start_Time",
                "End_Date",
                "Status",
                "Priority",
            ],
            ResourceKind::StorageLocations => &["Name", "Address", "Latitude", "Longitude"],
        }
    }

    /// Columns joined in on read that cannot be written back.
    pub fn derived_columns(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Expenses => &["Category"],
            _ => &[],
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ResourceKind::Employees => "Сотрудники",
            ResourceKind::Equipment => "Оборудование",
            ResourceKind::Transportation => "Транспорт",
            ResourceKind::Tools => "Инструменты",
            ResourceKind::Spares => "Запчасти",
            ResourceKind::Materials => "Материалы",
            ResourceKind::Expenses => "Расходы",
            ResourceKind::ExpenseCategories => "Категории расходов",
            ResourceKind::Processes => "Процессы",
            ResourceKind::Schedule => "График работ",
            ResourceKind::StorageLocations => "Места хранения",
        }
    }

    /// Maps the `Resource_Type` values used by expenses to a collection.
    pub fn from_resource_type(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "employee" | "employees" => Some(ResourceKind::Employees),
            "equipment" => Some(ResourceKind::Equipment),
            "transportation" | "transport" | "vehicle" | "vehicles" => {
                Some(ResourceKind::Transportation)
            }
            "tool" | "tools" => Some(ResourceKind::Tools),
            "spare" | "spares" => Some(ResourceKind::Spares),
            "material" | "materials" => Some(ResourceKind::Materials),
            "process" | "processes" => Some(ResourceKind::Processes),
            "category" | "categories" => Some(ResourceKind::ExpenseCategories),
            "location" | "locations" => Some(ResourceKind::StorageLocations),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl<'a> FromParam<'a> for ResourceKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        ResourceKind::from_slug(param).ok_or(param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ResourceCount {
    pub slug: &'static str,
    pub title: &'static str,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scalar_accessors_read_numbers_and_text() {
        let row = record(json!({
            "Amount": 12.5,
            "Quantity": "3",
            "Employee_ID": 7,
            "Note": null,
        }));
        assert_eq!(row.number("Amount"), Some(12.5));
        assert_eq!(row.number("Quantity"), Some(3.0));
        assert_eq!(row.id("Employee_ID"), Some(7));
        assert_eq!(row.text("Employee_ID").as_deref(), Some("7"));
        assert_eq!(row.text("Note"), None);
        assert_eq!(row.text("Missing"), None);
    }

    #[test]
    fn parses_iso_and_dotted_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("2024-03-01T08:30:00"), expected);
        assert_eq!(parse_date("01.03.2024"), expected);
        assert_eq!(parse_date("March 1st"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn slugs_round_trip_for_every_kind() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(ResourceKind::from_slug("users"), None);
    }

    #[test]
    fn resource_types_accept_aliases() {
        assert_eq!(
            ResourceKind::from_resource_type("Vehicle"),
            Some(ResourceKind::Transportation)
        );
        assert_eq!(
            ResourceKind::from_resource_type("employee"),
            Some(ResourceKind::Employees)
        );
        assert_eq!(ResourceKind::from_resource_type("Budget"), None);
    }
}
