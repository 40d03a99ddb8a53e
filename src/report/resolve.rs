use std::collections::HashMap;

use crate::models::{Record, ResourceKind};

pub const UNASSIGNED: &str = "Не назначено";

/// Display names of fetched collections, keyed by primary key. Built once per report.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndices {
    names: HashMap<ResourceKind, HashMap<i64, String>>,
}

fn display_name(kind: ResourceKind, record: &Record) -> Option<String> {
    let name = match kind {
        ResourceKind::Employees => record.text("Full_Name"),
        ResourceKind::Transportation => {
            let title = [record.text("Brand"), record.text("Model")]
                .into_iter()
                .flatten()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            match record.text("License_Plate").filter(|plate| !plate.trim().is_empty()) {
                Some(plate) if title.is_empty() => Some(plate),
                Some(plate) => Some(format!("{title} ({})", plate.trim())),
                None => Some(title),
            }
        }
        ResourceKind::Schedule => record.text("Task_Name"),
        ResourceKind::Expenses => record.text("Description"),
        _ => record.text("Name"),
    };
    name.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ResourceIndices {
    pub fn build(collections: &HashMap<ResourceKind, Vec<Record>>) -> Self {
        let mut names = HashMap::new();
        for (kind, records) in collections {
            let index = records
                .iter()
                .filter_map(|record| {
                    let id = record.id(kind.key())?;
                    Some((id, display_name(*kind, record)?))
                })
                .collect::<HashMap<_, _>>();
            names.insert(*kind, index);
        }
        Self { names }
    }

    pub fn lookup(&self, kind: ResourceKind, id: i64) -> Option<&str> {
        self.names.get(&kind)?.get(&id).map(String::as_str)
    }

    /// Name of the record `id` in `kind`, tolerating absent and dangling ids.
    pub fn name(&self, kind: ResourceKind, id: Option<i64>) -> String {
        match id {
            None => UNASSIGNED.to_string(),
            Some(id) => self
                .lookup(kind, id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("ID: {id}")),
        }
    }
}

/// Resolves a `(Resource_Type, Resource_ID)` pair to a display name.
pub fn resolve_name(
    resource_type: &str,
    resource_id: Option<i64>,
    indices: &ResourceIndices,
) -> String {
    match (ResourceKind::from_resource_type(resource_type), resource_id) {
        (_, None) => UNASSIGNED.to_string(),
        (Some(kind), id) => indices.name(kind, id),
        (None, Some(id)) => format!("ID: {id}"),
    }
}

/// Russian label for a `Resource_Type` value, falling back to the raw value.
pub fn resource_type_label(resource_type: &str) -> String {
    match ResourceKind::from_resource_type(resource_type) {
        Some(ResourceKind::Employees) => "Сотрудник".to_string(),
        Some(ResourceKind::Equipment) => "Оборудование".to_string(),
        Some(ResourceKind::Transportation) => "Транспорт".to_string(),
        Some(ResourceKind::Tools) => "Инструмент".to_string(),
        Some(ResourceKind::Spares) => "Запчасть".to_string(),
        Some(ResourceKind::Materials) => "Материал".to_string(),
        Some(kind) => kind.title().to_string(),
        None => resource_type.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn indices() -> ResourceIndices {
        let mut collections = HashMap::new();
        collections.insert(
            ResourceKind::Employees,
            vec![
                record(json!({"Employee_ID": 1, "Full_Name": "Иванов Иван"})),
                record(json!({"Employee_ID": 2, "Full_Name": "  "})),
            ],
        );
        collections.insert(
            ResourceKind::Transportation,
            vec![record(json!({
                "Transport_ID": 5,
                "Brand": "МАЗ",
                "Model": "5440",
                "License_Plate": "AB 1234-7"
            }))],
        );
        ResourceIndices::build(&collections)
    }

    #[test]
    fn resolves_known_resources() {
        let indices = indices();
        assert_eq!(resolve_name("Employee", Some(1), &indices), "Иванов Иван");
        assert_eq!(resolve_name("Vehicle", Some(5), &indices), "МАЗ 5440 (AB 1234-7)");
    }

    #[test]
    fn dangling_id_renders_raw_id() {
        assert_eq!(resolve_name("Employee", Some(999), &indices()), "ID: 999");
        assert_eq!(resolve_name("Employee", Some(2), &indices()), "ID: 2");
        assert_eq!(resolve_name("Budget", Some(3), &indices()), "ID: 3");
    }

    #[test]
    fn missing_id_is_unassigned() {
        assert_eq!(resolve_name("Employee", None, &indices()), UNASSIGNED);
        assert_eq!(indices().name(ResourceKind::Tools, None), UNASSIGNED);
    }

    #[test]
    fn labels_for_resource_types() {
        assert_eq!(resource_type_label("Transportation"), "Транспорт");
        assert_eq!(resource_type_label("Прочее"), "Прочее");
    }
}
