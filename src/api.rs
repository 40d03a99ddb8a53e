use chrono::NaiveDate;
use log::info;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, routes, FromForm, Route, State};

use crate::auth::AdminUser;
use crate::db::{self, DateWindow, DbPool};
use crate::error::ApiError;
use crate::models::{parse_date, Record, ResourceKind};

/// `startDate` / `endDate` bounds accepted by dated collections.
#[derive(FromForm)]
pub struct WindowQuery {
    #[field(name = "startDate")]
    start_date: Option<String>,
    #[field(name = "endDate")]
    end_date: Option<String>,
}

pub(crate) fn parse_bound(raw: Option<&str>, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_date(value)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("Некорректная дата в параметре {name}"))),
    }
}

impl WindowQuery {
    fn window(&self) -> Result<DateWindow, ApiError> {
        let window = DateWindow {
            start: parse_bound(self.start_date.as_deref(), "startDate")?,
            end: parse_bound(self.end_date.as_deref(), "endDate")?,
        };
        if let (Some(start), Some(end)) = (window.start, window.end) {
            if start > end {
                return Err(ApiError::BadRequest(
                    "Дата начала позже даты окончания".to_string(),
                ));
            }
        }
        Ok(window)
    }
}

/// Rejects fields that are not columns of the collection. Read-only ones are ignored on write.
fn check_fields(kind: ResourceKind, fields: &Record) -> Result<(), ApiError> {
    for (name, _) in fields.fields() {
        let name_str = name.as_str();
        if name_str != kind.key()
            && !kind.columns().contains(&name_str)
            && !kind.derived_columns().contains(&name_str)
        {
            return Err(ApiError::BadRequest(format!(
                "Неизвестное поле {name} для {}",
                kind.slug()
            )));
        }
    }
    Ok(())
}

#[get("/<kind>?<query..>", rank = 5)]
fn list(
    pool: &State<DbPool>,
    kind: ResourceKind,
    query: WindowQuery,
) -> Result<Json<Vec<Record>>, ApiError> {
    let window = query.window()?;
    let conn = pool.get()?;
    Ok(Json(db::list_records(&conn, kind, &window)?))
}

#[get("/expenses/categories/all")]
fn expense_categories(pool: &State<DbPool>) -> Result<Json<Vec<Record>>, ApiError> {
    let conn = pool.get()?;
    Ok(Json(db::list_records(
        &conn,
        ResourceKind::ExpenseCategories,
        &DateWindow::default(),
    )?))
}

#[get("/<kind>/<id>", rank = 5)]
fn show(pool: &State<DbPool>, kind: ResourceKind, id: i64) -> Result<Json<Record>, ApiError> {
    let conn = pool.get()?;
    db::get_record(&conn, kind, id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[post("/<kind>", data = "<fields>", rank = 5)]
fn create(
    admin: AdminUser,
    pool: &State<DbPool>,
    kind: ResourceKind,
    fields: Json<Record>,
) -> Result<(Status, Json<Record>), ApiError> {
    check_fields(kind, &fields)?;
    let conn = pool.get()?;
    let id = db::insert_record(&conn, kind, &fields)?;
    info!("{} created {kind} #{id}", admin.0.username);
    let stored = db::get_record(&conn, kind, id)?.ok_or(ApiError::NotFound)?;
    Ok((Status::Created, Json(stored)))
}

#[put("/<kind>/<id>", data = "<fields>", rank = 5)]
fn update(
    admin: AdminUser,
    pool: &State<DbPool>,
    kind: ResourceKind,
    id: i64,
    fields: Json<Record>,
) -> Result<Json<Record>, ApiError> {
    check_fields(kind, &fields)?;
    let conn = pool.get()?;
    if !db::update_record(&conn, kind, id, &fields)? {
        return Err(ApiError::NotFound);
    }
    info!("{} updated {kind} #{id}", admin.0.username);
    db::get_record(&conn, kind, id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[delete("/<kind>/<id>", rank = 5)]
fn remove(
    admin: AdminUser,
    pool: &State<DbPool>,
    kind: ResourceKind,
    id: i64,
) -> Result<Status, ApiError> {
    let conn = pool.get()?;
    if !db::delete_record(&conn, kind, id)? {
        return Err(ApiError::NotFound);
    }
    info!("{} deleted {kind} #{id}", admin.0.username);
    Ok(Status::NoContent)
}

pub fn routes() -> Vec<Route> {
    routes![list, expense_categories, show, create, update, remove]
}
