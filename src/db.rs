use std::path::Path;

use chrono::NaiveDate;
use log::info;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Result, Row};
use serde_json::Value;

use crate::models::{Record, ResourceKind, Role, User, UserRecord};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("unsupported value for field {0}")]
    UnsupportedValue(String),
    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Inclusive date bounds applied server-side to dated collections.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub fn init_db(path: &Path) -> std::result::Result<DbPool, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::new(manager)?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    info!("database ready at {}", path.display());
    Ok(pool)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS Employees (
            Employee_ID INTEGER PRIMARY KEY,
            Full_Name TEXT NOT NULL DEFAULT '',
            Position TEXT,
            Phone TEXT,
            Email TEXT,
            Hire_Date TEXT
        );

        CREATE TABLE IF NOT EXISTS StorageLocations (
            Location_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Address TEXT,
            Latitude REAL,
            Longitude REAL
        );

        CREATE TABLE IF NOT EXISTS Equipment (
            Equipment_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Type TEXT,
            Status TEXT,
            Serial_Number TEXT,
            Commission_Date TEXT,
            Employee_ID INTEGER,
            Location_ID INTEGER
        );

        CREATE TABLE IF NOT EXISTS Transportation (
            Transport_ID INTEGER PRIMARY KEY,
            Brand TEXT,
            Model TEXT,
            License_Plate TEXT,
            Type TEXT,
            Status TEXT,
            Year INTEGER,
            Employee_ID INTEGER
        );

        CREATE TABLE IF NOT EXISTS Tools (
            Tool_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Category TEXT,
            Status TEXT,
            Quantity REAL,
            Employee_ID INTEGER,
            Location_ID INTEGER
        );

        CREATE TABLE IF NOT EXISTS Spares (
            Spare_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Type TEXT,
            Quantity REAL,
            Unit TEXT,
            Price REAL,
            Replenishment_Date TEXT,
            Location_ID INTEGER
        );

        CREATE TABLE IF NOT EXISTS Materials (
            Material_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Category TEXT,
            Quantity REAL,
            Unit TEXT,
            Price REAL,
            Replenishment_Date TEXT,
            Location_ID INTEGER
        );

        CREATE TABLE IF NOT EXISTS ExpenseCategories (
            Category_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Description TEXT
        );

        CREATE TABLE IF NOT EXISTS Expenses (
            Expense_ID INTEGER PRIMARY KEY,
            Category_ID INTEGER,
            Resource_Type TEXT,
            Resource_ID INTEGER,
            Amount REAL NOT NULL DEFAULT 0,
            Date TEXT,
            Description TEXT
        );

        CREATE TABLE IF NOT EXISTS Processes (
            Process_ID INTEGER PRIMARY KEY,
            Name TEXT NOT NULL DEFAULT '',
            Description TEXT
        );

        CREATE TABLE IF NOT EXISTS Schedule (
            Task_ID INTEGER PRIMARY KEY,
            Task_Name TEXT NOT NULL DEFAULT '',
            Description TEXT,
            Process_ID INTEGER,
            Employee_ID INTEGER,
            Transport_ID INTEGER,
            Start_Date TEXT,
            Start_Time TEXT,
            End_Date TEXT,
            Status TEXT,
            Priority TEXT
        );

        CREATE TABLE IF NOT EXISTS Users (
            User_ID INTEGER PRIMARY KEY,
            Username TEXT NOT NULL UNIQUE,
            Password_Hash TEXT NOT NULL,
            Created_At TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Sessions (
            Session_ID INTEGER PRIMARY KEY,
            User_ID INTEGER NOT NULL,
            Token TEXT NOT NULL UNIQUE,
            Created_At TEXT NOT NULL,
            FOREIGN KEY(User_ID) REFERENCES Users(User_ID) ON DELETE CASCADE
        );
        ",
    )?;
    ensure_column(conn, "Users", "Role", "TEXT NOT NULL DEFAULT 'user'")?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, column_type: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(());
        }
    }
    conn.execute(
        &format!("ALTER TABLE {table} ADD COLUMN {column} {column_type}"),
        [],
    )?;
    Ok(())
}

fn select_clause(kind: ResourceKind) -> String {
    match kind {
        ResourceKind::Expenses => "
            SELECT t.*, c.Name AS Category
            FROM Expenses t
            LEFT JOIN ExpenseCategories c ON t.Category_ID = c.Category_ID
            "
        .to_string(),
        _ => format!("SELECT t.* FROM {} t", kind.table()),
    }
}

/// Column a `DateWindow` applies to, for the collections that support one.
pub fn window_column(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Expenses => Some("Date"),
        ResourceKind::Schedule => Some("Start_Date"),
        _ => None,
    }
}

fn row_to_record(row: &Row<'_>, names: &[String]) -> Result<Record> {
    let mut record = Record::new();
    for (index, name) in names.iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null | ValueRef::Blob(_) => Value::Null,
            ValueRef::Integer(value) => Value::from(value),
            ValueRef::Real(value) => serde_json::Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(value) => Value::String(String::from_utf8_lossy(value).into_owned()),
        };
        record.insert(name.clone(), value);
    }
    Ok(record)
}

fn query_records(conn: &Connection, sql: &str, args: &[SqlValue]) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
        row_to_record(row, &names)
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_records(
    conn: &Connection,
    kind: ResourceKind,
    window: &DateWindow,
) -> Result<Vec<Record>> {
    let mut sql = select_clause(kind);
    let mut args = Vec::new();
    if let Some(column) = window_column(kind) {
        let mut conditions = Vec::new();
        if let Some(start) = window.start {
            args.push(SqlValue::Text(start.format("%Y-%m-%d").to_string()));
            conditions.push(format!("t.{column} >= ?{}", args.len()));
        }
        if let Some(end) = window.end {
            args.push(SqlValue::Text(end.format("%Y-%m-%d").to_string()));
            conditions.push(format!("substr(t.{column}, 1, 10) <= ?{}", args.len()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
    }
    sql.push_str(&format!(" ORDER BY t.{}", kind.key()));
    query_records(conn, &sql, &args)
}

pub fn get_record(conn: &Connection, kind: ResourceKind, id: i64) -> Result<Option<Record>> {
    let sql = format!("{} WHERE t.{} = ?1", select_clause(kind), kind.key());
    Ok(query_records(conn, &sql, &[SqlValue::Integer(id)])?
        .into_iter()
        .next())
}

fn json_to_sql(field: &str, value: &Value) -> std::result::Result<SqlValue, StoreError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Ok(SqlValue::Integer(integer)),
            None => number
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| StoreError::UnsupportedValue(field.to_string())),
        },
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Array(_) | Value::Object(_) => Err(StoreError::UnsupportedValue(field.to_string())),
    }
}

/// Known writable columns present in `fields`, in catalog order.
fn writable_values(
    kind: ResourceKind,
    fields: &Record,
) -> std::result::Result<Vec<(&'static str, SqlValue)>, StoreError> {
    let mut out = Vec::new();
    for column in kind.columns() {
        if let Some(value) = fields.get(column) {
            out.push((*column, json_to_sql(column, value)?));
        }
    }
    Ok(out)
}

pub fn insert_record(
    conn: &Connection,
    kind: ResourceKind,
    fields: &Record,
) -> std::result::Result<i64, StoreError> {
    let values = writable_values(kind, fields)?;
    if values.is_empty() {
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", kind.table()), [])?;
        return Ok(conn.last_insert_rowid());
    }
    let columns = values.iter().map(|(column, _)| *column).collect::<Vec<_>>();
    let placeholders = (1..=values.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>();
    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({})",
            kind.table(),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params_from_iter(values.iter().map(|(_, value)| value)),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns `false` when no row has the given id.
pub fn update_record(
    conn: &Connection,
    kind: ResourceKind,
    id: i64,
    fields: &Record,
) -> std::result::Result<bool, StoreError> {
    let values = writable_values(kind, fields)?;
    if values.is_empty() {
        return Ok(get_record(conn, kind, id)?.is_some());
    }
    let assignments = values
        .iter()
        .enumerate()
        .map(|(index, (column, _))| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>();
    let mut args = values.into_iter().map(|(_, value)| value).collect::<Vec<_>>();
    args.push(SqlValue::Integer(id));
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            kind.table(),
            assignments.join(", "),
            kind.key(),
            args.len()
        ),
        params_from_iter(args.iter()),
    )?;
    Ok(changed > 0)
}

pub fn delete_record(conn: &Connection, kind: ResourceKind, id: i64) -> Result<bool> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", kind.table(), kind.key()),
        params![id],
    )?;
    Ok(changed > 0)
}

pub fn count_records(conn: &Connection, kind: ResourceKind) -> Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| {
        row.get(0)
    })
}

pub fn has_users(conn: &Connection) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM Users)",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

pub fn insert_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    role: Role,
    created_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO Users (Username, Password_Hash, Role, Created_At) VALUES (?1, ?2, ?3, ?4)",
        params![username, password_hash, role.as_str(), created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn user_credentials(conn: &Connection, username: &str) -> Result<Option<(i64, String)>> {
    let mut stmt = conn.prepare(
        "
        SELECT User_ID, Password_Hash
        FROM Users
        WHERE Username = ?1
        ",
    )?;
    let mut rows = stmt.query(params![username])?;
    if let Some(row) = rows.next()? {
        Ok(Some((row.get(0)?, row.get(1)?)))
    } else {
        Ok(None)
    }
}

fn role_column(row: &Row<'_>, index: usize) -> Result<Role> {
    let raw: String = row.get(index)?;
    Ok(Role::parse(&raw).unwrap_or(Role::User))
}

pub fn list_users(conn: &Connection) -> Result<Vec<UserRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT User_ID, Username, Role, Created_At
        FROM Users
        ORDER BY Username
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(UserRecord {
            id: row.get(0)?,
            username: row.get(1)?,
            role: role_column(row, 2)?,
            created_at: row.get(3)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "
        SELECT User_ID, Username, Role
        FROM Users
        WHERE User_ID = ?1
        ",
    )?;
    let mut rows = stmt.query(params![user_id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(User {
            id: row.get(0)?,
            username: row.get(1)?,
            role: role_column(row, 2)?,
        }))
    } else {
        Ok(None)
    }
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM Users WHERE User_ID = ?1", params![user_id])?;
    Ok(changed > 0)
}

pub fn create_session(
    conn: &Connection,
    user_id: i64,
    token: &str,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO Sessions (User_ID, Token, Created_At) VALUES (?1, ?2, ?3)",
        params![user_id, token, created_at],
    )?;
    Ok(())
}

pub fn user_by_session(conn: &Connection, token: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "
        SELECT u.User_ID, u.Username, u.Role
        FROM Sessions s
        JOIN Users u ON s.User_ID = u.User_ID
        WHERE s.Token = ?1
        ",
    )?;
    let mut rows = stmt.query(params![token])?;
    if let Some(row) = rows.next()? {
        Ok(Some(User {
            id: row.get(0)?,
            username: row.get(1)?,
            role: role_column(row, 2)?,
        }))
    } else {
        Ok(None)
    }
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM Sessions WHERE Token = ?1", params![token])?;
    Ok(())
}

pub fn prune_sessions(conn: &Connection, user_id: i64, keep: i64) -> Result<()> {
    conn.execute(
        "
        DELETE FROM Sessions
        WHERE User_ID = ?1
          AND Session_ID NOT IN (
            SELECT Session_ID
            FROM Sessions
            WHERE User_ID = ?1
            ORDER BY Created_At DESC, Session_ID DESC
            LIMIT ?2
          )
        ",
        params![user_id, keep],
    )?;
    Ok(())
}

pub fn session_count(conn: &Connection, user_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM Sessions WHERE User_ID = ?1",
        params![user_id],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_pool() -> (DbPool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(&dir.path().join("test.sqlite")).unwrap();
        (pool, dir)
    }

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn migrations_are_idempotent() {
        let (pool, _dir) = temp_pool();
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        assert!(!has_users(&conn).unwrap());
    }

    #[test]
    fn record_crud_round_trip() {
        let (pool, _dir) = temp_pool();
        let conn = pool.get().unwrap();
        let id = insert_record(
            &conn,
            ResourceKind::Equipment,
            &record(json!({"Name": "Экскаватор", "Type": "Техника", "Employee_ID": 3})),
        )
        .unwrap();

        let stored = get_record(&conn, ResourceKind::Equipment, id).unwrap().unwrap();
        assert_eq!(stored.id("Equipment_ID"), Some(id));
        assert_eq!(stored.text("Name").as_deref(), Some("Экскаватор"));
        assert_eq!(stored.get("Status"), Some(&Value::Null));

        let updated = update_record(
            &conn,
            ResourceKind::Equipment,
            id,
            &record(json!({"Status": "В ремонте"})),
        )
        .unwrap();
        assert!(updated);
        let stored = get_record(&conn, ResourceKind::Equipment, id).unwrap().unwrap();
        assert_eq!(stored.text("Status").as_deref(), Some("В ремонте"));
        assert_eq!(stored.text("Type").as_deref(), Some("Техника"));

        assert!(delete_record(&conn, ResourceKind::Equipment, id).unwrap());
        assert!(!delete_record(&conn, ResourceKind::Equipment, id).unwrap());
        assert_eq!(count_records(&conn, ResourceKind::Equipment).unwrap(), 0);
    }

    #[test]
    fn update_of_missing_row_reports_false() {
        let (pool, _dir) = temp_pool();
        let conn = pool.get().unwrap();
        let updated = update_record(
            &conn,
            ResourceKind::Tools,
            42,
            &record(json!({"Name": "Лопата"})),
        )
        .unwrap();
        assert!(!updated);
    }

    #[test]
    fn nested_values_are_rejected() {
        let (pool, _dir) = temp_pool();
        let conn = pool.get().unwrap();
        let err = insert_record(
            &conn,
            ResourceKind::Tools,
            &record(json!({"Name": ["a", "b"]})),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedValue(field) if field == "Name"));
    }

    #[test]
    fn expenses_carry_category_name_and_honor_window() {
        let (pool, _dir) = temp_pool();
        let conn = pool.get().unwrap();
        let category = insert_record(
            &conn,
            ResourceKind::ExpenseCategories,
            &record(json!({"Name": "Топливо"})),
        )
        .unwrap();
        for (date, amount) in [("2024-01-05", 100), ("2024-02-10", 200), ("2024-03-01", 300)] {
            insert_record(
                &conn,
                ResourceKind::Expenses,
                &record(json!({"Category_ID": category, "Amount": amount, "Date": date})),
            )
            .unwrap();
        }

        let window = DateWindow {
            start: NaiveDate::from_ymd_opt(2024, 1, 1),
            end: NaiveDate::from_ymd_opt(2024, 2, 28),
        };
        let rows = list_records(&conn, ResourceKind::Expenses, &window).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.text("Category").as_deref() == Some("Топливо")));

        let all = list_records(&conn, ResourceKind::Expenses, &DateWindow::default()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn sessions_are_pruned_to_limit() {
        let (pool, _dir) = temp_pool();
        let conn = pool.get().unwrap();
        let user_id =
            insert_user(&conn, "admin", "hash", Role::Admin, "2024-01-01T00:00:00").unwrap();
        for index in 0..4 {
            let token = format!("token-{index}");
            let created_at = format!("2024-01-0{}", index + 1);
            create_session(&conn, user_id, &token, &created_at).unwrap();
        }
        prune_sessions(&conn, user_id, 2).unwrap();
        assert_eq!(session_count(&conn, user_id).unwrap(), 2);
        assert!(user_by_session(&conn, "token-0").unwrap().is_none());
        let user = user_by_session(&conn, "token-3").unwrap().unwrap();
        assert_eq!(user.role, Role::Admin);
    }
}
