mod api;
mod auth;
mod calendar;
mod config;
mod db;
mod error;
mod fetch;
mod models;
mod report;
mod web;

use log::{error, info};
use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::serde::json::{json, Value};
use rocket::{catch, catchers, launch, Build, Request, Rocket};
use rocket_dyn_templates::Template;

use config::AppConfig;
use fetch::{HttpStore, ResourceStore, SqliteStore};

#[catch(default)]
fn json_catcher(status: Status, _: &Request<'_>) -> Value {
    let message = match status.code {
        401 => "Требуется вход в систему",
        403 => "Недостаточно прав",
        404 => "Не найдено",
        422 => "Некорректный запрос",
        _ => status.reason().unwrap_or("Ошибка"),
    };
    json!({ "error": message })
}

fn build_rocket(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(AdHoc::try_on_ignite("Storage", |rocket| async move {
            let config = match rocket.figment().extract::<AppConfig>() {
                Ok(config) => config,
                Err(err) => {
                    error!("invalid configuration: {err}");
                    return Err(rocket);
                }
            };
            let pool = match db::init_db(&config.database_path) {
                Ok(pool) => pool,
                Err(err) => {
                    error!("cannot open {}: {err}", config.database_path.display());
                    return Err(rocket);
                }
            };
            let store = match config.entity_api_url.as_deref() {
                Some(url) => {
                    info!("reports read from {url}");
                    ResourceStore::Remote(HttpStore::new(url))
                }
                None => ResourceStore::Local(SqliteStore::new(pool.clone())),
            };
            Ok(rocket.manage(pool).manage(store).manage(config))
        }))
        .attach(Template::fairing())
        .mount("/", web::routes())
        .mount("/api", api::routes())
        .mount("/api", calendar::routes())
        .mount("/api/auth", auth::auth_routes())
        .mount("/api/users", auth::user_routes())
        .mount("/reports", web::report_routes())
        .register("/", catchers![json_catcher])
}

#[launch]
fn rocket() -> _ {
    build_rocket(rocket::Config::figment())
}
