use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Local;
use log::{info, warn};
use password_hash::SaltString;
use rand_core::OsRng;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::{delete, get, post, routes, Route, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::{Role, User, UserRecord};

pub const SESSION_COOKIE: &str = "session";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct NewUser {
    username: String,
    password: String,
    role: Role,
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| ApiError::Internal("не удалось сохранить пароль".to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn validate_new_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::BadRequest("Введите логин".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(
            "Пароль должен быть не короче 6 символов".to_string(),
        ));
    }
    Ok(())
}

fn start_session(
    pool: &DbPool,
    config: &AppConfig,
    cookies: &CookieJar<'_>,
    user_id: i64,
) -> Result<(), ApiError> {
    let conn = pool.get()?;
    let token = Uuid::new_v4().to_string();
    let created_at = Local::now().to_rfc3339();
    db::create_session(&conn, user_id, &token, &created_at)?;
    db::prune_sessions(&conn, user_id, config.max_sessions)?;

    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookies.add(cookie);
    Ok(())
}

/// Any signed-in user.
pub struct CurrentUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(pool) = req.rocket().state::<DbPool>() else {
            return Outcome::Error((
                Status::InternalServerError,
                ApiError::Internal("database is not configured".to_string()),
            ));
        };
        let Some(token) = req.cookies().get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Outcome::Error((Status::Unauthorized, ApiError::Unauthorized));
        };
        let lookup = pool
            .get()
            .map_err(ApiError::from)
            .and_then(|conn| db::user_by_session(&conn, &token).map_err(ApiError::from));
        match lookup {
            Ok(Some(user)) => Outcome::Success(CurrentUser(user)),
            Ok(None) => Outcome::Error((Status::Unauthorized, ApiError::Unauthorized)),
            Err(err) => Outcome::Error((Status::InternalServerError, err)),
        }
    }
}

/// A signed-in user holding the admin role.
pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let CurrentUser(user) = try_outcome!(req.guard::<CurrentUser>().await);
        if user.role == Role::Admin {
            Outcome::Success(AdminUser(user))
        } else {
            warn!("user {} attempted an admin action", user.username);
            Outcome::Error((Status::Forbidden, ApiError::Forbidden))
        }
    }
}

/// Creates the first administrator. Only available while no users exist.
#[post("/setup", data = "<form>")]
fn setup(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    form: Json<Credentials>,
) -> Result<Json<User>, ApiError> {
    let conn = pool.get()?;
    if db::has_users(&conn)? {
        return Err(ApiError::Conflict("Администратор уже создан".to_string()));
    }
    let form = form.into_inner();
    let username = form.username.trim();
    validate_new_credentials(username, &form.password)?;

    let password_hash = hash_password(&form.password)?;
    let created_at = Local::now().to_rfc3339();
    let user_id = db::insert_user(&conn, username, &password_hash, Role::Admin, &created_at)?;
    drop(conn);
    start_session(pool, config, cookies, user_id)?;
    info!("initial administrator {username} created");

    Ok(Json(User {
        id: user_id,
        username: username.to_string(),
        role: Role::Admin,
    }))
}

#[post("/login", data = "<form>")]
fn login(
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    form: Json<Credentials>,
) -> Result<Json<User>, ApiError> {
    let form = form.into_inner();
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Err(ApiError::BadRequest("Введите логин и пароль".to_string()));
    }

    let conn = pool.get()?;
    let Some((user_id, hash)) = db::user_credentials(&conn, username)? else {
        return Err(ApiError::Unauthorized);
    };
    if !verify_password(&hash, &form.password) {
        warn!("failed login for {username}");
        return Err(ApiError::Unauthorized);
    }
    let user = db::user_by_id(&conn, user_id)?.ok_or(ApiError::Unauthorized)?;
    drop(conn);
    start_session(pool, config, cookies, user_id)?;
    Ok(Json(user))
}

#[post("/logout")]
fn logout(pool: &State<DbPool>, cookies: &CookieJar<'_>) -> Status {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        if let Ok(conn) = pool.get() {
            let _ = db::delete_session(&conn, cookie.value());
        }
    }
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Status::NoContent
}

#[derive(Serialize)]
struct Profile {
    #[serde(flatten)]
    user: User,
    active_sessions: i64,
}

#[get("/me")]
fn me(user: CurrentUser, pool: &State<DbPool>) -> Result<Json<Profile>, ApiError> {
    let conn = pool.get()?;
    let active_sessions = db::session_count(&conn, user.0.id)?;
    Ok(Json(Profile {
        user: user.0,
        active_sessions,
    }))
}

#[get("/")]
fn list_users(_admin: AdminUser, pool: &State<DbPool>) -> Result<Json<Vec<UserRecord>>, ApiError> {
    let conn = pool.get()?;
    Ok(Json(db::list_users(&conn)?))
}

#[post("/", data = "<form>")]
fn create_user(
    admin: AdminUser,
    pool: &State<DbPool>,
    form: Json<NewUser>,
) -> Result<(Status, Json<User>), ApiError> {
    let form = form.into_inner();
    let username = form.username.trim();
    validate_new_credentials(username, &form.password)?;

    let conn = pool.get()?;
    if db::user_credentials(&conn, username)?.is_some() {
        return Err(ApiError::Conflict("Такой логин уже существует".to_string()));
    }
    let password_hash = hash_password(&form.password)?;
    let created_at = Local::now().to_rfc3339();
    let id = db::insert_user(&conn, username, &password_hash, form.role, &created_at)?;
    info!("{} created user {username} ({})", admin.0.username, form.role.as_str());

    Ok((
        Status::Created,
        Json(User {
            id,
            username: username.to_string(),
            role: form.role,
        }),
    ))
}

#[delete("/<id>")]
fn delete_user(admin: AdminUser, pool: &State<DbPool>, id: i64) -> Result<Status, ApiError> {
    if admin.0.id == id {
        return Err(ApiError::Conflict(
            "Нельзя удалить собственную учетную запись".to_string(),
        ));
    }
    let conn = pool.get()?;
    if db::delete_user(&conn, id)? {
        Ok(Status::NoContent)
    } else {
        Err(ApiError::NotFound)
    }
}

pub fn auth_routes() -> Vec<Route> {
    routes![setup, login, logout, me]
}

pub fn user_routes() -> Vec<Route> {
    routes![list_users, create_user, delete_user]
}
