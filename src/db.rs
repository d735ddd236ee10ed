// 🗄️ SQLite Platform - reference implementation of the store contract
//
// One `<db>.sqlite` file per tenant under the configured data dir.
// Model catalog lives in `ir_model` / `ir_model_fields`; external
// identifiers in `ir_model_data`; modules in `ir_module_module`.

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::installer;
use crate::schema::{
    quote_ident, FieldDef, FieldType, ModelDef, Schema, MODEL_ACCOUNT, MODEL_ACCOUNT_TEMPLATE,
    MODEL_CHART_TEMPLATE, MODEL_COMPANY, MODEL_COUNTRY, MODEL_MODULE,
};
use crate::store::{Condition, Domain, Platform, Record, RequestContext, Session, Values};
use crate::xmlid::XmlId;

pub const MAIN_COMPANY_XMLID: &str = "base.main_company";

// ============================================================================
// PLATFORM
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqlitePlatform {
    data_dir: PathBuf,
}

impl SqlitePlatform {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        SqlitePlatform {
            data_dir: data_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        SqlitePlatform::new(config.data_dir())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data_dir>/<db>.sqlite`, after validating the name
    pub fn database_path(&self, db_name: &str) -> StoreResult<PathBuf> {
        let valid = !db_name.is_empty()
            && !db_name.starts_with('.')
            && db_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StoreError::InvalidDatabaseName(db_name.to_string()));
        }
        Ok(self.data_dir.join(format!("{}.sqlite", db_name)))
    }

    /// Create a fresh tenant database with the base catalog installed
    pub fn create_database(&self, db_name: &str) -> StoreResult<Connection> {
        let path = self.database_path(db_name)?;
        let conn = Connection::open(&path)?;
        setup_database(&conn)?;
        info!(db = db_name, path = %path.display(), "created database");
        Ok(conn)
    }
}

impl Platform for SqlitePlatform {
    type Session = SqliteSession;

    fn open_session(&self, db_name: &str) -> StoreResult<SqliteSession> {
        let path = self.database_path(db_name)?;
        if !path.exists() {
            return Err(StoreError::DatabaseNotFound(db_name.to_string()));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        SqliteSession::begin(db_name, conn)
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct SqliteSession {
    db_name: String,
    conn: Connection,
    schema: Schema,
}

impl SqliteSession {
    /// Snapshot the catalog and open a transaction
    pub fn begin(db_name: &str, conn: Connection) -> StoreResult<Self> {
        let schema = load_schema(&conn)?;
        conn.execute_batch("BEGIN")?;
        debug!(db = db_name, models = schema.model_names().count(), "session opened");
        Ok(SqliteSession {
            db_name: db_name.to_string(),
            conn,
            schema,
        })
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create a record in a model known to this session
    pub fn create(&mut self, model: &str, values: &Values) -> StoreResult<Record> {
        let id = insert_record(&self.conn, &self.schema, model, values)?;
        Ok(Record::new(model, id))
    }

    /// Record-rule scoping: only non-superusers are restricted to their companies
    fn scoped_domain(&self, model: &str, domain: &Domain, ctx: &RequestContext) -> Domain {
        let mut scoped = domain.clone();
        if !ctx.is_superuser()
            && !ctx.allowed_company_ids.is_empty()
            && self.schema.has_field(model, "company_id")
        {
            scoped = scoped.within("company_id", ctx.allowed_company_ids.iter().copied());
        }
        scoped
    }
}

impl Session for SqliteSession {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn supports_main_company(&self) -> bool {
        true
    }

    fn main_company(&mut self) -> StoreResult<Option<Record>> {
        match lookup_xmlid(&self.conn, &self.schema, MAIN_COMPANY_XMLID) {
            Ok(record) if record.is_a(MODEL_COMPANY) => return Ok(Some(record)),
            Ok(record) => warn!(%record, "main company identifier points to another model"),
            Err(err) => debug!(error = %err, "no designated main company"),
        }
        let first = search_records(&self.conn, &self.schema, MODEL_COMPANY, &Domain::all(), Some(1))?;
        Ok(first.into_iter().next())
    }

    fn search(
        &mut self,
        model: &str,
        domain: &Domain,
        limit: Option<usize>,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<Record>> {
        let domain = self.scoped_domain(model, domain, ctx);
        search_records(&self.conn, &self.schema, model, &domain, limit)
    }

    fn search_count(&mut self, model: &str, domain: &Domain, ctx: &RequestContext) -> StoreResult<u64> {
        let domain = self.scoped_domain(model, domain, ctx);
        count_records(&self.conn, &self.schema, model, &domain)
    }

    fn read(&mut self, record: &Record, field: &str) -> StoreResult<Value> {
        read_field(&self.conn, &self.schema, record, field)
    }

    fn write(&mut self, record: &Record, values: &Values, ctx: &RequestContext) -> StoreResult<()> {
        if !ctx.is_superuser() {
            return Err(StoreError::AccessDenied("write"));
        }
        let mut values = values.clone();
        if self.schema.has_field(&record.model, "write_date") {
            values.insert("write_date".to_string(), json!(Utc::now().to_rfc3339()));
        }
        update_record(&self.conn, &self.schema, record, &values)
    }

    fn resolve_xmlid(&mut self, xmlid: &str) -> StoreResult<Record> {
        lookup_xmlid(&self.conn, &self.schema, xmlid)
    }

    fn immediate_install(&mut self, modules: &[Record], ctx: &RequestContext) -> StoreResult<()> {
        if !ctx.is_superuser() {
            return Err(StoreError::AccessDenied("immediate_install"));
        }
        installer::install_modules(&self.conn, modules)?;
        // The platform commits its own install; the snapshot stays as it was
        self.commit()
    }

    fn load_chart_template(&mut self, template: &Record, ctx: &RequestContext) -> StoreResult<usize> {
        if !ctx.is_superuser() {
            return Err(StoreError::AccessDenied("load_chart_template"));
        }
        instantiate_chart(&self.conn, &self.schema, template, ctx)
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT; BEGIN")?;
        debug!(db = %self.db_name, "committed");
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            debug!(db = %self.db_name, error = %err, "rollback on close failed");
        }
    }
}

// ============================================================================
// SETUP (base catalog)
// ============================================================================

fn base_models() -> Vec<ModelDef> {
    let mut country = ModelDef::new(MODEL_COUNTRY, "name");
    country.add_field(FieldDef::new("name", FieldType::Char));
    country.add_field(FieldDef::new("code", FieldType::Char));

    let mut company = ModelDef::new(MODEL_COMPANY, "sequence, name");
    company.add_field(FieldDef::new("name", FieldType::Char));
    company.add_field(FieldDef::new("sequence", FieldType::Integer));
    company.add_field(FieldDef::relational("country_id", FieldType::Many2one, MODEL_COUNTRY));
    company.add_field(FieldDef::new("write_date", FieldType::Char));

    let mut module = ModelDef::new(MODEL_MODULE, "name");
    module.add_field(FieldDef::new("name", FieldType::Char));
    module.add_field(FieldDef::new("state", FieldType::Char));
    module.add_field(FieldDef::new("manifest", FieldType::Char));
    module.add_field(FieldDef::new("installed_at", FieldType::Char));

    vec![country, company, module]
}

/// Create the catalog tables and the `base` module. Safe to call twice.
pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ir_model (
            name TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            default_order TEXT NOT NULL DEFAULT 'id'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ir_model_fields (
            model TEXT NOT NULL,
            name TEXT NOT NULL,
            ttype TEXT NOT NULL,
            relation TEXT,
            PRIMARY KEY (model, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ir_model_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            module TEXT NOT NULL,
            name TEXT NOT NULL,
            model TEXT NOT NULL,
            res_id INTEGER NOT NULL,
            UNIQUE (module, name)
        )",
        [],
    )?;

    let already: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ir_model WHERE name = ?1)",
        [MODEL_MODULE],
        |row| row.get(0),
    )?;
    if already {
        return Ok(());
    }

    for model in base_models() {
        create_table(conn, &model)?;
        register_model(conn, &model)?;
    }

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_module_name ON ir_module_module(name)",
        [],
    )?;

    conn.execute(
        "INSERT INTO ir_module_module (name, state, manifest, installed_at)
         VALUES ('base', 'installed', '{}', ?1)",
        [Utc::now().to_rfc3339()],
    )?;
    let base_id = conn.last_insert_rowid();
    upsert_xmlid(
        conn,
        &XmlId::parse("base.module_base")?,
        &Record::new(MODEL_MODULE, base_id),
    )?;

    Ok(())
}

/// Read the whole catalog into a `Schema`
pub fn load_schema(conn: &Connection) -> StoreResult<Schema> {
    let mut schema = Schema::new();

    let mut stmt = conn.prepare("SELECT name, default_order FROM ir_model ORDER BY name")?;
    let models = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (name, order) in models {
        schema.insert_model(ModelDef::new(&name, &order));
    }

    let mut stmt = conn.prepare("SELECT model, name, ttype, relation FROM ir_model_fields")?;
    let fields = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (model, name, ttype, relation) in fields {
        let ttype = FieldType::parse(&ttype).ok_or_else(|| StoreError::InvalidValue {
            model: model.clone(),
            field: name.clone(),
            reason: format!("unknown field type '{}'", ttype),
        })?;
        schema.model_mut(&model)?.add_field(FieldDef {
            name,
            ttype,
            relation,
        });
    }

    Ok(schema)
}

pub(crate) fn create_table(conn: &Connection, model: &ModelDef) -> StoreResult<()> {
    let mut columns = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for field in model.fields() {
        columns.push(format!("{} {}", quote_ident(&field.name), field.ttype.column_type()));
    }
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&model.table),
            columns.join(", ")
        ),
        [],
    )?;
    Ok(())
}

pub(crate) fn add_column(conn: &Connection, model: &ModelDef, field: &FieldDef) -> StoreResult<()> {
    conn.execute(
        &format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(&model.table),
            quote_ident(&field.name),
            field.ttype.column_type()
        ),
        [],
    )?;
    Ok(())
}

pub(crate) fn register_model(conn: &Connection, model: &ModelDef) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO ir_model (name, table_name, default_order) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET default_order = excluded.default_order",
        params![model.name, model.table, model.order],
    )?;
    for field in model.fields() {
        register_field(conn, &model.name, field)?;
    }
    Ok(())
}

pub(crate) fn register_field(conn: &Connection, model: &str, field: &FieldDef) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO ir_model_fields (model, name, ttype, relation) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(model, name) DO UPDATE SET ttype = excluded.ttype, relation = excluded.relation",
        params![model, field.name, field.ttype.as_str(), field.relation],
    )?;
    Ok(())
}

// ============================================================================
// EXTERNAL IDENTIFIERS
// ============================================================================

pub(crate) fn find_xmlid(conn: &Connection, xmlid: &XmlId) -> StoreResult<Option<(String, i64)>> {
    let row = conn
        .query_row(
            "SELECT model, res_id FROM ir_model_data WHERE module = ?1 AND name = ?2",
            params![xmlid.module, xmlid.name],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    Ok(row)
}

/// Strict lookup: malformed, unknown and stale identifiers are all errors
pub(crate) fn lookup_xmlid(conn: &Connection, schema: &Schema, raw: &str) -> StoreResult<Record> {
    let xmlid = XmlId::parse(raw)?;
    let (model, res_id) =
        find_xmlid(conn, &xmlid)?.ok_or_else(|| StoreError::XmlidNotFound(xmlid.to_string()))?;

    let Ok(model_def) = schema.model(&model) else {
        return Err(StoreError::StaleReference(xmlid.to_string()));
    };
    if !record_exists(conn, model_def, res_id)? {
        return Err(StoreError::StaleReference(xmlid.to_string()));
    }

    Ok(Record::new(&model, res_id))
}

pub(crate) fn upsert_xmlid(conn: &Connection, xmlid: &XmlId, record: &Record) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO ir_model_data (module, name, model, res_id) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(module, name) DO UPDATE SET model = excluded.model, res_id = excluded.res_id",
        params![xmlid.module, xmlid.name, record.model, record.id],
    )?;
    Ok(())
}

// ============================================================================
// RECORD SQL
// ============================================================================

fn field_def(model: &ModelDef, name: &str) -> StoreResult<FieldDef> {
    if name == "id" {
        return Ok(FieldDef::new("id", FieldType::Integer));
    }
    model.field(name).cloned()
}

fn invalid(model: &ModelDef, field: &FieldDef, reason: &str) -> StoreError {
    StoreError::InvalidValue {
        model: model.name.clone(),
        field: field.name.clone(),
        reason: reason.to_string(),
    }
}

/// JSON value -> bound SQL value, checked against the field type
fn to_sql(model: &ModelDef, field: &FieldDef, value: &Value) -> StoreResult<SqlValue> {
    let sql = match (field.ttype, value) {
        (_, Value::Null) => SqlValue::Null,
        (FieldType::Many2one, Value::Bool(false)) => SqlValue::Null,
        (FieldType::Integer | FieldType::Many2one, Value::Number(n)) => {
            SqlValue::Integer(n.as_i64().ok_or_else(|| invalid(model, field, "expected an integer"))?)
        }
        (FieldType::Float, Value::Number(n)) => {
            SqlValue::Real(n.as_f64().ok_or_else(|| invalid(model, field, "expected a number"))?)
        }
        (FieldType::Boolean, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (FieldType::Char, Value::String(s)) => SqlValue::Text(s.clone()),
        (FieldType::Many2many, Value::Array(items)) => {
            if !items.iter().all(|item| item.as_i64().is_some()) {
                return Err(invalid(model, field, "expected a list of record ids"));
            }
            SqlValue::Text(serde_json::to_string(items)?)
        }
        _ => {
            return Err(invalid(
                model,
                field,
                &format!("value {} does not fit a {} field", value, field.ttype.as_str()),
            ))
        }
    };
    Ok(sql)
}

/// Stored SQL value -> JSON value
fn from_sql(model: &ModelDef, field: &FieldDef, value: SqlValue) -> StoreResult<Value> {
    let json = match (field.ttype, value) {
        (_, SqlValue::Null) => Value::Null,
        (FieldType::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (FieldType::Many2many, SqlValue::Text(text)) => serde_json::from_str(&text)?,
        (FieldType::Float, SqlValue::Integer(i)) => json!(i as f64),
        (_, SqlValue::Integer(i)) => json!(i),
        (_, SqlValue::Real(f)) => json!(f),
        (_, SqlValue::Text(text)) => Value::String(text),
        (_, SqlValue::Blob(_)) => return Err(invalid(model, field, "binary values are not supported")),
    };
    Ok(json)
}

fn where_clause(model: &ModelDef, domain: &Domain) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    for condition in &domain.conditions {
        match condition {
            Condition::Eq(name, value) => {
                let field = field_def(model, name)?;
                let column = quote_ident(&field.name);
                if value.is_null() {
                    clauses.push(format!("{} IS NULL", column));
                } else if field.ttype == FieldType::Many2many {
                    let id = FieldDef::new(&field.name, FieldType::Integer);
                    clauses.push(format!(
                        "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value = ?)",
                        column
                    ));
                    binds.push(to_sql(model, &id, value)?);
                } else {
                    clauses.push(format!("{} = ?", column));
                    binds.push(to_sql(model, &field, value)?);
                }
            }
            Condition::In(name, values) => {
                let field = field_def(model, name)?;
                if values.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                let column = quote_ident(&field.name);
                if field.ttype == FieldType::Many2many {
                    let id = FieldDef::new(&field.name, FieldType::Integer);
                    clauses.push(format!(
                        "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value IN ({}))",
                        column, placeholders
                    ));
                    for value in values {
                        binds.push(to_sql(model, &id, value)?);
                    }
                } else {
                    clauses.push(format!("{} IN ({})", column, placeholders));
                    for value in values {
                        binds.push(to_sql(model, &field, value)?);
                    }
                }
            }
        }
    }

    if clauses.is_empty() {
        Ok(("1".to_string(), binds))
    } else {
        Ok((clauses.join(" AND "), binds))
    }
}

pub(crate) fn search_records(
    conn: &Connection,
    schema: &Schema,
    model: &str,
    domain: &Domain,
    limit: Option<usize>,
) -> StoreResult<Vec<Record>> {
    let model_def = schema.model(model)?;
    let (filter, binds) = where_clause(model_def, domain)?;
    let mut sql = format!(
        "SELECT \"id\" FROM {} WHERE {} ORDER BY {}",
        quote_ident(&model_def.table),
        filter,
        model_def.order_clause()?
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(binds.iter()), |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ids.into_iter().map(|id| Record::new(model, id)).collect())
}

pub(crate) fn count_records(
    conn: &Connection,
    schema: &Schema,
    model: &str,
    domain: &Domain,
) -> StoreResult<u64> {
    let model_def = schema.model(model)?;
    let (filter, binds) = where_clause(model_def, domain)?;
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(&model_def.table),
            filter
        ),
        params_from_iter(binds.iter()),
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn record_exists(conn: &Connection, model: &ModelDef, id: i64) -> StoreResult<bool> {
    let exists = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE \"id\" = ?1)",
            quote_ident(&model.table)
        ),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn read_field(
    conn: &Connection,
    schema: &Schema,
    record: &Record,
    field: &str,
) -> StoreResult<Value> {
    let model_def = schema.model(&record.model)?;
    let field_def = field_def(model_def, field)?;
    let raw: Option<SqlValue> = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE \"id\" = ?1",
                quote_ident(&field_def.name),
                quote_ident(&model_def.table)
            ),
            [record.id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| StoreError::MissingRecord(record.to_string()))?;
    from_sql(model_def, &field_def, raw)
}

fn bind_values(model: &ModelDef, values: &Values) -> StoreResult<(Vec<String>, Vec<SqlValue>)> {
    let mut columns = Vec::with_capacity(values.len());
    let mut binds = Vec::with_capacity(values.len());
    for (name, value) in values {
        let field = model.field(name)?;
        columns.push(quote_ident(&field.name));
        binds.push(to_sql(model, field, value)?);
    }
    Ok((columns, binds))
}

pub(crate) fn insert_record(
    conn: &Connection,
    schema: &Schema,
    model: &str,
    values: &Values,
) -> StoreResult<i64> {
    let model_def = schema.model(model)?;
    let (columns, binds) = bind_values(model_def, values)?;
    let table = quote_ident(&model_def.table);

    if columns.is_empty() {
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", table), [])?;
    } else {
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            ),
            params_from_iter(binds.iter()),
        )?;
    }
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_record(
    conn: &Connection,
    schema: &Schema,
    record: &Record,
    values: &Values,
) -> StoreResult<()> {
    let model_def = schema.model(&record.model)?;
    if values.is_empty() {
        return Ok(());
    }
    let (columns, mut binds) = bind_values(model_def, values)?;
    let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", c)).collect();
    binds.push(SqlValue::Integer(record.id));

    let updated = conn.execute(
        &format!(
            "UPDATE {} SET {} WHERE \"id\" = ?",
            quote_ident(&model_def.table),
            assignments.join(", ")
        ),
        params_from_iter(binds.iter()),
    )?;
    if updated == 0 {
        return Err(StoreError::MissingRecord(record.to_string()));
    }
    Ok(())
}

// ============================================================================
// CHART LOADING
// ============================================================================

const ACCOUNT_TEMPLATE_FIELDS: [&str; 3] = ["code", "name", "account_type"];

/// Copy a template's account lines into `account.account` for the current company
fn instantiate_chart(
    conn: &Connection,
    schema: &Schema,
    template: &Record,
    ctx: &RequestContext,
) -> StoreResult<usize> {
    let company_id = ctx.current_company().ok_or(StoreError::NoCurrentCompany)?;
    if !template.is_a(MODEL_CHART_TEMPLATE) {
        return Err(StoreError::InvalidValue {
            model: template.model.clone(),
            field: "id".to_string(),
            reason: format!("{} is not a chart template", template),
        });
    }
    let account = schema.model(MODEL_ACCOUNT)?;

    let lines = if schema.has_field(MODEL_ACCOUNT_TEMPLATE, "chart_template_id") {
        search_records(
            conn,
            schema,
            MODEL_ACCOUNT_TEMPLATE,
            &Domain::all().eq("chart_template_id", template.id),
            None,
        )?
    } else {
        Vec::new()
    };

    for line in &lines {
        let mut values = Values::new();
        for field in ACCOUNT_TEMPLATE_FIELDS {
            if account.has_field(field) && schema.has_field(MODEL_ACCOUNT_TEMPLATE, field) {
                values.insert(field.to_string(), read_field(conn, schema, line, field)?);
            }
        }
        if account.has_field("company_id") {
            values.insert("company_id".to_string(), json!(company_id));
        }
        insert_record(conn, schema, MODEL_ACCOUNT, &values)?;
    }

    if schema.has_field(MODEL_COMPANY, "chart_template_id") {
        let mut values = Values::new();
        values.insert("chart_template_id".to_string(), json!(template.id));
        update_record(conn, schema, &Record::new(MODEL_COMPANY, company_id), &values)?;
    }

    info!(%template, company_id, accounts = lines.len(), "chart template instantiated");
    Ok(lines.len())
}
