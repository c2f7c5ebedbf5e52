use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::Storage;
use crate::domain::*;
use crate::error::{AppError, Result};

const USER_COLUMNS: &[&str] = &[
    "id", "email", "name", "role", "lbp_number", "qualifications", "company", "phone",
    "created_at", "updated_at",
];

const REPORT_COLUMNS: &[&str] = &[
    "id", "report_number", "inspector_id", "status", "property_address", "property_city",
    "property_region", "property_type", "building_age", "client_name", "client_email",
    "client_phone", "inspection_date", "inspection_type", "weather_conditions",
    "access_method", "limitations", "scope_of_works", "executive_summary", "conclusions",
    "recommendations", "declaration_signed", "signature_ref", "signed_at", "submitted_at",
    "approved_at", "finalised_at", "created_at", "updated_at",
];

const ELEMENT_COLUMNS: &[&str] = &[
    "id", "report_id", "element_type", "location", "material", "manufacturer",
    "pitch_degrees", "area_m2", "age_years", "condition", "comments", "created_at",
    "updated_at",
];

const DEFECT_COLUMNS: &[&str] = &[
    "id", "report_id", "roof_element_id", "defect_number", "title", "location",
    "description", "classification", "severity", "observation", "analysis", "opinion",
    "code_clause", "recommendation", "created_at", "updated_at",
];

const PHOTO_COLUMNS: &[&str] = &[
    "id", "report_id", "defect_id", "roof_element_id", "filename", "mime_type", "size_bytes",
    "storage_ref", "caption", "sort_order", "taken_at", "latitude", "longitude", "created_at",
];

const COMPLIANCE_COLUMNS: &[&str] = &[
    "id", "report_id", "items", "overall_notes", "assessed_at", "updated_at",
];

const COMPLAINT_COLUMNS: &[&str] = &[
    "id", "complainant_id", "report_id", "lbp_number", "lbp_name", "licence_class",
    "site_address", "work_description", "grounds", "conduct_description", "desired_outcome",
    "evidence_photo_ids", "status", "board_reference", "submitted_at", "created_at",
    "updated_at",
];

/// Relational storage on SQLite. Every table is keyed by a UUID `id`
/// stored as text; timestamps are fixed-width RFC 3339 so they sort and
/// compare lexically.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file and run migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened SQLite database at {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/001_init.sql"))?;
        debug!("Database migrations applied");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("database connection lock poisoned".to_string()))
    }
}

// ---------------------------------------------------------------------------
// SQL builders

fn column_list(columns: &[&str]) -> String {
    columns.join(", ")
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        column_list(columns),
        placeholders.join(", ")
    )
}

/// Insert that overwrites every column except `id` on conflict.
fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "{} ON CONFLICT(id) DO UPDATE SET {}",
        insert_sql(table, columns),
        assignments.join(", ")
    )
}

/// Update keyed on the first column, which must be `id`.
fn update_sql(table: &str, columns: &[&str]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, c)| format!("{c} = ?{}", i + 1))
        .collect();
    format!("UPDATE {table} SET {} WHERE id = ?1", assignments.join(", "))
}

fn select_sql(table: &str, columns: &[&str], tail: &str) -> String {
    format!("SELECT {} FROM {table} {tail}", column_list(columns))
}

fn map_constraint(err: rusqlite::Error, what: String) -> AppError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            AppError::Conflict(what)
        }
        _ => AppError::Database(err),
    }
}

// ---------------------------------------------------------------------------
// Value conversion

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_val(dt: &DateTime<Utc>) -> Value {
    Value::Text(ts(dt))
}

fn opt_ts_val(dt: &Option<DateTime<Utc>>) -> Value {
    dt.as_ref().map(ts).into()
}

fn uuid_val(id: &Uuid) -> Value {
    Value::Text(id.to_string())
}

fn opt_uuid_val(id: &Option<Uuid>) -> Value {
    id.map(|i| i.to_string()).into()
}

fn text_val(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text_val(s: &Option<String>) -> Value {
    s.clone().into()
}

fn conversion_error<E>(err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}

fn get_uuid(row: &Row<'_>, col: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(col)?;
    Uuid::parse_str(&raw).map_err(conversion_error)
}

fn get_opt_uuid(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|r| Uuid::parse_str(&r).map_err(conversion_error))
        .transpose()
}

fn get_ts(row: &Row<'_>, col: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(col)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(conversion_error)
}

fn get_opt_ts(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|r| {
        DateTime::parse_from_rfc3339(&r)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(conversion_error)
    })
    .transpose()
}

fn get_opt_date(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|r| NaiveDate::parse_from_str(&r, "%Y-%m-%d").map_err(conversion_error))
        .transpose()
}

fn get_enum<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = AppError>,
{
    let raw: String = row.get(col)?;
    raw.parse().map_err(conversion_error)
}

fn get_opt_enum<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = AppError>,
{
    let raw: Option<String> = row.get(col)?;
    raw.map(|r| r.parse().map_err(conversion_error)).transpose()
}

fn get_json<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(conversion_error)
}

// ---------------------------------------------------------------------------
// Row mapping

fn user_values(u: &User) -> Vec<Value> {
    vec![
        uuid_val(&u.id),
        text_val(&u.email),
        text_val(&u.name),
        text_val(u.role.as_str()),
        opt_text_val(&u.lbp_number),
        opt_text_val(&u.qualifications),
        opt_text_val(&u.company),
        opt_text_val(&u.phone),
        ts_val(&u.created_at),
        ts_val(&u.updated_at),
    ]
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: get_uuid(row, "id")?,
        email: row.get("email")?,
        name: row.get("name")?,
        role: get_enum(row, "role")?,
        lbp_number: row.get("lbp_number")?,
        qualifications: row.get("qualifications")?,
        company: row.get("company")?,
        phone: row.get("phone")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn report_values(r: &Report) -> Vec<Value> {
    vec![
        uuid_val(&r.id),
        text_val(&r.report_number),
        uuid_val(&r.inspector_id),
        text_val(r.status.as_str()),
        text_val(&r.property_address),
        opt_text_val(&r.property_city),
        opt_text_val(&r.property_region),
        r.property_type.map(|t| t.as_str().to_string()).into(),
        r.building_age.into(),
        text_val(&r.client_name),
        opt_text_val(&r.client_email),
        opt_text_val(&r.client_phone),
        r.inspection_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .into(),
        r.inspection_type.map(|t| t.as_str().to_string()).into(),
        opt_text_val(&r.weather_conditions),
        opt_text_val(&r.access_method),
        opt_text_val(&r.limitations),
        opt_text_val(&r.scope_of_works),
        opt_text_val(&r.executive_summary),
        opt_text_val(&r.conclusions),
        opt_text_val(&r.recommendations),
        r.declaration_signed.into(),
        opt_text_val(&r.signature_ref),
        opt_ts_val(&r.signed_at),
        opt_ts_val(&r.submitted_at),
        opt_ts_val(&r.approved_at),
        opt_ts_val(&r.finalised_at),
        ts_val(&r.created_at),
        ts_val(&r.updated_at),
    ]
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: get_uuid(row, "id")?,
        report_number: row.get("report_number")?,
        inspector_id: get_uuid(row, "inspector_id")?,
        status: get_enum(row, "status")?,
        property_address: row.get("property_address")?,
        property_city: row.get("property_city")?,
        property_region: row.get("property_region")?,
        property_type: get_opt_enum(row, "property_type")?,
        building_age: row.get("building_age")?,
        client_name: row.get("client_name")?,
        client_email: row.get("client_email")?,
        client_phone: row.get("client_phone")?,
        inspection_date: get_opt_date(row, "inspection_date")?,
        inspection_type: get_opt_enum(row, "inspection_type")?,
        weather_conditions: row.get("weather_conditions")?,
        access_method: row.get("access_method")?,
        limitations: row.get("limitations")?,
        scope_of_works: row.get("scope_of_works")?,
        executive_summary: row.get("executive_summary")?,
        conclusions: row.get("conclusions")?,
        recommendations: row.get("recommendations")?,
        declaration_signed: row.get("declaration_signed")?,
        signature_ref: row.get("signature_ref")?,
        signed_at: get_opt_ts(row, "signed_at")?,
        submitted_at: get_opt_ts(row, "submitted_at")?,
        approved_at: get_opt_ts(row, "approved_at")?,
        finalised_at: get_opt_ts(row, "finalised_at")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn element_values(e: &RoofElement) -> Vec<Value> {
    vec![
        uuid_val(&e.id),
        uuid_val(&e.report_id),
        text_val(e.element_type.as_str()),
        text_val(&e.location),
        opt_text_val(&e.material),
        opt_text_val(&e.manufacturer),
        e.pitch_degrees.into(),
        e.area_m2.into(),
        e.age_years.into(),
        text_val(e.condition.as_str()),
        opt_text_val(&e.comments),
        ts_val(&e.created_at),
        ts_val(&e.updated_at),
    ]
}

fn element_from_row(row: &Row<'_>) -> rusqlite::Result<RoofElement> {
    Ok(RoofElement {
        id: get_uuid(row, "id")?,
        report_id: get_uuid(row, "report_id")?,
        element_type: get_enum(row, "element_type")?,
        location: row.get("location")?,
        material: row.get("material")?,
        manufacturer: row.get("manufacturer")?,
        pitch_degrees: row.get("pitch_degrees")?,
        area_m2: row.get("area_m2")?,
        age_years: row.get("age_years")?,
        condition: get_enum(row, "condition")?,
        comments: row.get("comments")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn defect_values(d: &Defect) -> Vec<Value> {
    vec![
        uuid_val(&d.id),
        uuid_val(&d.report_id),
        opt_uuid_val(&d.roof_element_id),
        d.defect_number.into(),
        text_val(&d.title),
        text_val(&d.location),
        text_val(&d.description),
        text_val(d.classification.as_str()),
        text_val(d.severity.as_str()),
        opt_text_val(&d.observation),
        opt_text_val(&d.analysis),
        opt_text_val(&d.opinion),
        opt_text_val(&d.code_clause),
        opt_text_val(&d.recommendation),
        ts_val(&d.created_at),
        ts_val(&d.updated_at),
    ]
}

fn defect_from_row(row: &Row<'_>) -> rusqlite::Result<Defect> {
    Ok(Defect {
        id: get_uuid(row, "id")?,
        report_id: get_uuid(row, "report_id")?,
        roof_element_id: get_opt_uuid(row, "roof_element_id")?,
        defect_number: row.get("defect_number")?,
        title: row.get("title")?,
        location: row.get("location")?,
        description: row.get("description")?,
        classification: get_enum(row, "classification")?,
        severity: get_enum(row, "severity")?,
        observation: row.get("observation")?,
        analysis: row.get("analysis")?,
        opinion: row.get("opinion")?,
        code_clause: row.get("code_clause")?,
        recommendation: row.get("recommendation")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn photo_values(p: &Photo) -> Vec<Value> {
    vec![
        uuid_val(&p.id),
        uuid_val(&p.report_id),
        opt_uuid_val(&p.defect_id),
        opt_uuid_val(&p.roof_element_id),
        text_val(&p.filename),
        text_val(&p.mime_type),
        p.size_bytes.into(),
        text_val(&p.storage_ref),
        opt_text_val(&p.caption),
        p.sort_order.into(),
        opt_ts_val(&p.taken_at),
        p.latitude.into(),
        p.longitude.into(),
        ts_val(&p.created_at),
    ]
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: get_uuid(row, "id")?,
        report_id: get_uuid(row, "report_id")?,
        defect_id: get_opt_uuid(row, "defect_id")?,
        roof_element_id: get_opt_uuid(row, "roof_element_id")?,
        filename: row.get("filename")?,
        mime_type: row.get("mime_type")?,
        size_bytes: row.get("size_bytes")?,
        storage_ref: row.get("storage_ref")?,
        caption: row.get("caption")?,
        sort_order: row.get("sort_order")?,
        taken_at: get_opt_ts(row, "taken_at")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        created_at: get_ts(row, "created_at")?,
    })
}

fn compliance_values(c: &ComplianceAssessment) -> Result<Vec<Value>> {
    Ok(vec![
        uuid_val(&c.id),
        uuid_val(&c.report_id),
        Value::Text(serde_json::to_string(&c.items)?),
        opt_text_val(&c.overall_notes),
        ts_val(&c.assessed_at),
        ts_val(&c.updated_at),
    ])
}

fn compliance_from_row(row: &Row<'_>) -> rusqlite::Result<ComplianceAssessment> {
    Ok(ComplianceAssessment {
        id: get_uuid(row, "id")?,
        report_id: get_uuid(row, "report_id")?,
        items: get_json(row, "items")?,
        overall_notes: row.get("overall_notes")?,
        assessed_at: get_ts(row, "assessed_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn complaint_values(c: &LbpComplaint) -> Result<Vec<Value>> {
    Ok(vec![
        uuid_val(&c.id),
        uuid_val(&c.complainant_id),
        opt_uuid_val(&c.report_id),
        text_val(&c.lbp_number),
        text_val(&c.lbp_name),
        c.licence_class.map(|l| l.as_str().to_string()).into(),
        text_val(&c.site_address),
        opt_text_val(&c.work_description),
        Value::Text(serde_json::to_string(&c.grounds)?),
        text_val(&c.conduct_description),
        opt_text_val(&c.desired_outcome),
        Value::Text(serde_json::to_string(&c.evidence_photo_ids)?),
        text_val(c.status.as_str()),
        opt_text_val(&c.board_reference),
        opt_ts_val(&c.submitted_at),
        ts_val(&c.created_at),
        ts_val(&c.updated_at),
    ])
}

fn complaint_from_row(row: &Row<'_>) -> rusqlite::Result<LbpComplaint> {
    Ok(LbpComplaint {
        id: get_uuid(row, "id")?,
        complainant_id: get_uuid(row, "complainant_id")?,
        report_id: get_opt_uuid(row, "report_id")?,
        lbp_number: row.get("lbp_number")?,
        lbp_name: row.get("lbp_name")?,
        licence_class: get_opt_enum(row, "licence_class")?,
        site_address: row.get("site_address")?,
        work_description: row.get("work_description")?,
        grounds: get_json(row, "grounds")?,
        conduct_description: row.get("conduct_description")?,
        desired_outcome: row.get("desired_outcome")?,
        evidence_photo_ids: get_json(row, "evidence_photo_ids")?,
        status: get_enum(row, "status")?,
        board_reference: row.get("board_reference")?,
        submitted_at: get_opt_ts(row, "submitted_at")?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

// ---------------------------------------------------------------------------
// Query helpers shared by the trait impl

fn query_one<T, F>(conn: &Connection, sql: &str, id: &Uuid, map: F) -> Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    Ok(conn
        .query_row(sql, params![id.to_string()], map)
        .optional()?)
}

fn query_many<T, F>(conn: &Connection, sql: &str, values: Vec<Value>, map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values), map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
}

fn execute_update(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    values: Vec<Value>,
    entity: &'static str,
    id: &Uuid,
) -> Result<()> {
    let changed = conn
        .execute(&update_sql(table, columns), params_from_iter(values))
        .map_err(|e| map_constraint(e, format!("{entity} {id} violates a constraint")))?;
    if changed == 0 {
        return Err(AppError::not_found(entity, id));
    }
    Ok(())
}

fn execute_delete(conn: &Connection, table: &str, entity: &'static str, id: &Uuid) -> Result<()> {
    let changed = conn.execute(
        &format!("DELETE FROM {table} WHERE id = ?1"),
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(AppError::not_found(entity, id));
    }
    Ok(())
}

fn ids_for_report(conn: &Connection, table: &str, report_id: &Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {table} WHERE report_id = ?1"))?;
    let rows = stmt.query_map(params![report_id.to_string()], |row| get_uuid(row, "id"))?;
    Ok(rows.collect::<rusqlite::Result<Vec<Uuid>>>()?)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(&insert_sql("users", USER_COLUMNS), params_from_iter(user_values(user)))
            .map_err(|e| {
                map_constraint(e, format!("a user with e-mail {} already exists", user.email))
            })?;
        debug!("Created user {} with id {}", user.email, user.id);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("users", USER_COLUMNS, "WHERE id = ?1"),
            &id,
            user_from_row,
        )
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &select_sql("users", USER_COLUMNS, "WHERE email = ?1 COLLATE NOCASE"),
                params![email],
                user_from_row,
            )
            .optional()?)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        execute_update(&conn, "users", USER_COLUMNS, user_values(user), "user", &user.id)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        query_many(
            &conn,
            &select_sql("users", USER_COLUMNS, "ORDER BY name"),
            Vec::new(),
            user_from_row,
        )
    }

    async fn count_users(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    async fn create_report(&self, report: &Report) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &insert_sql("reports", REPORT_COLUMNS),
            params_from_iter(report_values(report)),
        )
        .map_err(|e| {
            map_constraint(
                e,
                format!("report number {} is already taken", report.report_number),
            )
        })?;
        debug!("Created report {} with id {}", report.report_number, report.id);
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("reports", REPORT_COLUMNS, "WHERE id = ?1"),
            &id,
            report_from_row,
        )
    }

    async fn update_report(&self, report: &Report) -> Result<()> {
        let conn = self.conn()?;
        execute_update(
            &conn,
            "reports",
            REPORT_COLUMNS,
            report_values(report),
            "report",
            &report.id,
        )
    }

    async fn delete_report(&self, id: Uuid) -> Result<()> {
        // Children go through ON DELETE CASCADE / SET NULL
        let conn = self.conn()?;
        execute_delete(&conn, "reports", "report", &id)
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(inspector) = filter.inspector_id {
            values.push(uuid_val(&inspector));
            clauses.push(format!("inspector_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(text_val(status.as_str()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(q) = filter.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            values.push(Value::Text(format!("%{}%", q.to_lowercase())));
            let n = values.len();
            clauses.push(format!(
                "(lower(report_number) LIKE ?{n} OR lower(property_address) LIKE ?{n} OR lower(client_name) LIKE ?{n})"
            ));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.offset.unwrap_or(0) as i64;
        let tail = format!("{where_clause} ORDER BY updated_at DESC LIMIT {limit} OFFSET {offset}");

        let conn = self.conn()?;
        query_many(
            &conn,
            &select_sql("reports", REPORT_COLUMNS, &tail),
            values,
            report_from_row,
        )
    }

    async fn count_reports_by_status(
        &self,
        inspector_id: Option<Uuid>,
    ) -> Result<Vec<(ReportStatus, usize)>> {
        let conn = self.conn()?;
        let (sql, values) = match inspector_id {
            Some(id) => (
                "SELECT status, COUNT(*) AS n FROM reports WHERE inspector_id = ?1 GROUP BY status",
                vec![uuid_val(&id)],
            ),
            None => ("SELECT status, COUNT(*) AS n FROM reports GROUP BY status", Vec::new()),
        };
        let counted: Vec<(ReportStatus, i64)> = query_many(&conn, sql, values, |row| {
            Ok((get_enum(row, "status")?, row.get("n")?))
        })?;
        Ok(ReportStatus::ALL
            .iter()
            .map(|status| {
                let n = counted
                    .iter()
                    .find(|(s, _)| s == status)
                    .map_or(0, |(_, n)| *n as usize);
                (*status, n)
            })
            .collect())
    }

    async fn next_report_sequence(&self, year: i32) -> Result<u32> {
        let conn = self.conn()?;
        let pattern = format!("{}-{}-%", crate::constants::REPORT_NUMBER_PREFIX, year);
        let numbers: Vec<String> = query_many(
            &conn,
            "SELECT report_number FROM reports WHERE report_number LIKE ?1",
            vec![Value::Text(pattern)],
            |row| row.get(0),
        )?;
        let max = numbers
            .iter()
            .filter_map(|n| super::report_sequence(n, year))
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn reports_updated_since(
        &self,
        inspector_id: Option<Uuid>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Report>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = inspector_id {
            values.push(uuid_val(&id));
            clauses.push(format!("inspector_id = ?{}", values.len()));
        }
        if let Some(since) = since {
            values.push(ts_val(&since));
            clauses.push(format!("updated_at > ?{}", values.len()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let conn = self.conn()?;
        query_many(
            &conn,
            &select_sql(
                "reports",
                REPORT_COLUMNS,
                &format!("{where_clause} ORDER BY updated_at ASC"),
            ),
            values,
            report_from_row,
        )
    }

    async fn create_roof_element(&self, element: &RoofElement) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &insert_sql("roof_elements", ELEMENT_COLUMNS),
            params_from_iter(element_values(element)),
        )
        .map_err(|e| map_constraint(e, format!("roof element {} violates a constraint", element.id)))?;
        Ok(())
    }

    async fn get_roof_element(&self, id: Uuid) -> Result<Option<RoofElement>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("roof_elements", ELEMENT_COLUMNS, "WHERE id = ?1"),
            &id,
            element_from_row,
        )
    }

    async fn update_roof_element(&self, element: &RoofElement) -> Result<()> {
        let conn = self.conn()?;
        execute_update(
            &conn,
            "roof_elements",
            ELEMENT_COLUMNS,
            element_values(element),
            "roof element",
            &element.id,
        )
    }

    async fn delete_roof_element(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        execute_delete(&conn, "roof_elements", "roof element", &id)
    }

    async fn list_roof_elements(&self, report_id: Uuid) -> Result<Vec<RoofElement>> {
        let conn = self.conn()?;
        query_many(
            &conn,
            &select_sql(
                "roof_elements",
                ELEMENT_COLUMNS,
                "WHERE report_id = ?1 ORDER BY created_at, id",
            ),
            vec![uuid_val(&report_id)],
            element_from_row,
        )
    }

    async fn create_defect(&self, defect: &Defect) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &insert_sql("defects", DEFECT_COLUMNS),
            params_from_iter(defect_values(defect)),
        )
        .map_err(|e| map_constraint(e, format!("defect {} violates a constraint", defect.id)))?;
        Ok(())
    }

    async fn get_defect(&self, id: Uuid) -> Result<Option<Defect>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("defects", DEFECT_COLUMNS, "WHERE id = ?1"),
            &id,
            defect_from_row,
        )
    }

    async fn update_defect(&self, defect: &Defect) -> Result<()> {
        let conn = self.conn()?;
        execute_update(
            &conn,
            "defects",
            DEFECT_COLUMNS,
            defect_values(defect),
            "defect",
            &defect.id,
        )
    }

    async fn delete_defect(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        execute_delete(&conn, "defects", "defect", &id)
    }

    async fn list_defects(&self, report_id: Uuid) -> Result<Vec<Defect>> {
        let conn = self.conn()?;
        query_many(
            &conn,
            &select_sql("defects", DEFECT_COLUMNS, "WHERE report_id = ?1 ORDER BY defect_number"),
            vec![uuid_val(&report_id)],
            defect_from_row,
        )
    }

    async fn next_defect_number(&self, report_id: Uuid) -> Result<i32> {
        let conn = self.conn()?;
        let max: Option<i32> = conn.query_row(
            "SELECT MAX(defect_number) FROM defects WHERE report_id = ?1",
            params![report_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) + 1)
    }

    async fn create_photo(&self, photo: &Photo) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &insert_sql("photos", PHOTO_COLUMNS),
            params_from_iter(photo_values(photo)),
        )
        .map_err(|e| map_constraint(e, format!("photo {} violates a constraint", photo.id)))?;
        Ok(())
    }

    async fn get_photo(&self, id: Uuid) -> Result<Option<Photo>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("photos", PHOTO_COLUMNS, "WHERE id = ?1"),
            &id,
            photo_from_row,
        )
    }

    async fn update_photo(&self, photo: &Photo) -> Result<()> {
        let conn = self.conn()?;
        execute_update(&conn, "photos", PHOTO_COLUMNS, photo_values(photo), "photo", &photo.id)
    }

    async fn delete_photo(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        execute_delete(&conn, "photos", "photo", &id)
    }

    async fn list_photos(&self, report_id: Uuid) -> Result<Vec<Photo>> {
        let conn = self.conn()?;
        query_many(
            &conn,
            &select_sql(
                "photos",
                PHOTO_COLUMNS,
                "WHERE report_id = ?1 ORDER BY sort_order, created_at",
            ),
            vec![uuid_val(&report_id)],
            photo_from_row,
        )
    }

    async fn get_compliance(&self, report_id: Uuid) -> Result<Option<ComplianceAssessment>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("compliance_assessments", COMPLIANCE_COLUMNS, "WHERE report_id = ?1"),
            &report_id,
            compliance_from_row,
        )
    }

    async fn put_compliance(&self, report: &Report, assessment: &ComplianceAssessment) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &upsert_sql("compliance_assessments", COMPLIANCE_COLUMNS),
            params_from_iter(compliance_values(assessment)?),
        )?;
        execute_update(
            &tx,
            "reports",
            REPORT_COLUMNS,
            report_values(report),
            "report",
            &report.id,
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn create_complaint(&self, complaint: &LbpComplaint) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &insert_sql("lbp_complaints", COMPLAINT_COLUMNS),
            params_from_iter(complaint_values(complaint)?),
        )
        .map_err(|e| map_constraint(e, format!("complaint {} violates a constraint", complaint.id)))?;
        Ok(())
    }

    async fn get_complaint(&self, id: Uuid) -> Result<Option<LbpComplaint>> {
        let conn = self.conn()?;
        query_one(
            &conn,
            &select_sql("lbp_complaints", COMPLAINT_COLUMNS, "WHERE id = ?1"),
            &id,
            complaint_from_row,
        )
    }

    async fn update_complaint(&self, complaint: &LbpComplaint) -> Result<()> {
        let conn = self.conn()?;
        execute_update(
            &conn,
            "lbp_complaints",
            COMPLAINT_COLUMNS,
            complaint_values(complaint)?,
            "complaint",
            &complaint.id,
        )
    }

    async fn list_complaints(&self, complainant_id: Option<Uuid>) -> Result<Vec<LbpComplaint>> {
        let conn = self.conn()?;
        let (tail, values) = match complainant_id {
            Some(id) => (
                "WHERE complainant_id = ?1 ORDER BY created_at DESC",
                vec![uuid_val(&id)],
            ),
            None => ("ORDER BY created_at DESC", Vec::new()),
        };
        query_many(
            &conn,
            &select_sql("lbp_complaints", COMPLAINT_COLUMNS, tail),
            values,
            complaint_from_row,
        )
    }

    async fn save_report_tree(
        &self,
        report: &Report,
        elements: &[RoofElement],
        defects: &[Defect],
        compliance: Option<&ComplianceAssessment>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            &upsert_sql("reports", REPORT_COLUMNS),
            params_from_iter(report_values(report)),
        )
        .map_err(|e| {
            map_constraint(
                e,
                format!("report number {} is already taken", report.report_number),
            )
        })?;

        // Upsert before pruning so photos keep their links to surviving children
        let element_sql = upsert_sql("roof_elements", ELEMENT_COLUMNS);
        for element in elements {
            tx.execute(&element_sql, params_from_iter(element_values(element)))?;
        }
        let defect_sql = upsert_sql("defects", DEFECT_COLUMNS);
        for defect in defects {
            tx.execute(&defect_sql, params_from_iter(defect_values(defect)))?;
        }

        for id in ids_for_report(&tx, "defects", &report.id)? {
            if !defects.iter().any(|d| d.id == id) {
                tx.execute("DELETE FROM defects WHERE id = ?1", params![id.to_string()])?;
            }
        }
        for id in ids_for_report(&tx, "roof_elements", &report.id)? {
            if !elements.iter().any(|e| e.id == id) {
                tx.execute("DELETE FROM roof_elements WHERE id = ?1", params![id.to_string()])?;
            }
        }

        if let Some(assessment) = compliance {
            tx.execute(
                &upsert_sql("compliance_assessments", COMPLIANCE_COLUMNS),
                params_from_iter(compliance_values(assessment)?),
            )?;
        }

        tx.commit()?;
        debug!(
            "Saved report tree {} ({} elements, {} defects)",
            report.id,
            elements.len(),
            defects.len()
        );
        Ok(())
    }

    async fn clear_all_data(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "DELETE FROM lbp_complaints;
             DELETE FROM photos;
             DELETE FROM defects;
             DELETE FROM roof_elements;
             DELETE FROM compliance_assessments;
             DELETE FROM reports;
             DELETE FROM users;",
        )?;
        info!("Cleared all data from database");
        Ok(())
    }
}
