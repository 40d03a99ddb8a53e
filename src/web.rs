use std::collections::BTreeMap;
use std::io::Cursor;

use chrono::Local;
use log::info;
use rocket::http::uri::Origin;
use rocket::http::ContentType;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::{get, post, routes, FromForm, Route, State};
use rocket_dyn_templates::Template;
use serde::Serialize;

use crate::api::parse_bound;
use crate::auth::CurrentUser;
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::fetch::ResourceStore;
use crate::models::{ResourceCount, ResourceKind};
use crate::report::catalog::ReportKind;
use crate::report::render::ReportSections;
use crate::report::{self, GeneratedReport, ReportData, ReportRequest};

/// Query-string form of [`ReportRequest`]. Filters arrive as repeated `filter=<id>:<value>`.
#[derive(FromForm)]
pub struct ReportQuery {
    #[field(name = "startDate")]
    start_date: Option<String>,
    #[field(name = "endDate")]
    end_date: Option<String>,
    columns: Vec<String>,
    filter: Vec<String>,
    #[field(name = "includeSummary")]
    include_summary: Option<bool>,
    #[field(name = "includeDetails")]
    include_details: Option<bool>,
}

impl ReportQuery {
    /// Missing flags default to on.
    fn into_request(self) -> Result<ReportRequest, ApiError> {
        let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for raw in &self.filter {
            let (id, value) = raw
                .split_once(':')
                .ok_or_else(|| ApiError::BadRequest(format!("Некорректный фильтр: {raw}")))?;
            filters.entry(id.to_string()).or_default().push(value.to_string());
        }
        Ok(ReportRequest {
            start_date: parse_bound(self.start_date.as_deref(), "startDate")?,
            end_date: parse_bound(self.end_date.as_deref(), "endDate")?,
            filters,
            columns: self
                .columns
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
            include_summary: self.include_summary.unwrap_or(true),
            include_details: self.include_details.unwrap_or(true),
        })
    }
}

const DOCX_SUBTYPE: &str = "vnd.openxmlformats-officedocument.wordprocessingml.document";

/// `Content-Disposition` value with an ASCII fallback and the UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

pub struct DocxDownload(GeneratedReport);

impl<'r> Responder<'r, 'static> for DocxDownload {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let GeneratedReport { filename, bytes } = self.0;
        Response::build()
            .header(ContentType::new("application", DOCX_SUBTYPE))
            .raw_header("Content-Disposition", content_disposition(&filename))
            .sized_body(bytes.len(), Cursor::new(bytes))
            .ok()
    }
}

#[derive(Serialize)]
struct ColumnView {
    id: &'static str,
    header: &'static str,
    checked: bool,
}

#[derive(Serialize)]
struct ReportLink {
    slug: &'static str,
    title: &'static str,
}

fn report_links() -> Vec<ReportLink> {
    ReportKind::ALL
        .into_iter()
        .map(|kind| ReportLink {
            slug: kind.slug(),
            title: kind.spec().title,
        })
        .collect()
}

#[get("/")]
fn dashboard(pool: &State<DbPool>, user: Option<CurrentUser>) -> Result<Template, ApiError> {
    let conn = pool.get()?;
    let counts = ResourceKind::ALL
        .into_iter()
        .map(|kind| {
            Ok::<_, ApiError>(ResourceCount {
                slug: kind.slug(),
                title: kind.title(),
                count: db::count_records(&conn, kind)?,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let context = serde_json::json!({
        "username": user.map(|CurrentUser(user)| user.username),
        "counts": counts,
        "reports": report_links(),
    });
    Ok(Template::render("dashboard", &context))
}

/// Report form with the current selection previewed underneath.
#[get("/<kind>?<query..>")]
async fn report_page(
    store: &State<ResourceStore>,
    uri: &Origin<'_>,
    kind: ReportKind,
    query: ReportQuery,
) -> Result<Template, ApiError> {
    let request = query.into_request()?;
    let spec = kind.spec();
    let invalid = request.validate(spec).err();

    let data = ReportData::fetch(store.inner(), kind).await?;
    let choices = data.choices(&request);
    let (preview, error) = match invalid {
        Some(err) => (None, Some(err.to_string())),
        None => (Some(data.sections(&request, Local::now().naive_local())), None),
    };

    let columns = spec
        .columns
        .iter()
        .map(|column| ColumnView {
            id: column.id,
            header: column.header,
            checked: request.columns.is_empty() || request.columns.iter().any(|id| id == column.id),
        })
        .collect::<Vec<_>>();
    let download_url = match uri.query() {
        Some(query) => format!("/reports/{kind}/download?{}", query.as_str()),
        None => format!("/reports/{kind}/download"),
    };

    let context = serde_json::json!({
        "kind": kind.slug(),
        "title": spec.title,
        "reports": report_links(),
        "start_date": request.start_date.map(|date| date.to_string()),
        "end_date": request.end_date.map(|date| date.to_string()),
        "include_summary": request.include_summary,
        "include_details": request.include_details,
        "columns": columns,
        "filters": choices,
        "preview": preview,
        "error": error,
        "download_url": download_url,
    });
    Ok(Template::render("report", &context))
}

#[get("/<kind>/download?<query..>")]
async fn download(
    store: &State<ResourceStore>,
    kind: ReportKind,
    query: ReportQuery,
) -> Result<DocxDownload, ApiError> {
    let request = query.into_request()?;
    let now = Local::now().naive_local();
    let report = report::generate(store.inner(), kind, &request, now).await?;
    info!("serving {} ({} bytes)", report.filename, report.bytes.len());
    Ok(DocxDownload(report))
}

#[post("/<kind>", data = "<request>")]
async fn generate(
    store: &State<ResourceStore>,
    kind: ReportKind,
    request: Json<ReportRequest>,
) -> Result<DocxDownload, ApiError> {
    let now = Local::now().naive_local();
    let report = report::generate(store.inner(), kind, &request, now).await?;
    info!("serving {} ({} bytes)", report.filename, report.bytes.len());
    Ok(DocxDownload(report))
}

#[post("/<kind>/preview", data = "<request>")]
async fn preview(
    store: &State<ResourceStore>,
    kind: ReportKind,
    request: Json<ReportRequest>,
) -> Result<Json<ReportSections>, ApiError> {
    let now = Local::now().naive_local();
    let sections = report::preview(store.inner(), kind, &request, now).await?;
    Ok(Json(sections))
}

pub fn routes() -> Vec<Route> {
    routes![dashboard]
}

pub fn report_routes() -> Vec<Route> {
    routes![report_page, download, generate, preview]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_carries_both_names() {
        let header = content_disposition("Отчет по расходам_2024-03-15.docx");
        assert!(header.starts_with("attachment; filename=\""));
        assert!(header.contains("_2024-03-15.docx\""));
        assert!(header.contains(
            "filename*=UTF-8''%D0%9E%D1%82%D1%87%D0%B5%D1%82%20%D0%BF%D0%BE%20"
        ));
        let fallback = header.split('"').nth(1).unwrap();
        assert!(fallback.is_ascii());
    }

    #[test]
    fn query_filters_split_on_first_colon() {
        let query = ReportQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: None,
            columns: vec!["date".to_string(), " ".to_string()],
            filter: vec![
                "categories:Топливо".to_string(),
                "categories:Ремонт".to_string(),
                "resourceTypes:Vehicle".to_string(),
            ],
            include_summary: None,
            include_details: Some(false),
        };
        let request = query.into_request().unwrap();
        assert_eq!(request.filters["categories"], vec!["Топливо", "Ремонт"]);
        assert_eq!(request.filters["resourceTypes"], vec!["Vehicle"]);
        assert_eq!(request.columns, vec!["date"]);
        assert!(request.include_summary);
        assert!(!request.include_details);
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let query = ReportQuery {
            start_date: None,
            end_date: None,
            columns: Vec::new(),
            filter: vec!["categories".to_string()],
            include_summary: None,
            include_details: None,
        };
        assert!(matches!(query.into_request(), Err(ApiError::BadRequest(_))));
    }
}
