// 📦 Module Installer - applies module manifests to a SQLite tenant
//
// A manifest declares dependencies, new models, field extensions on
// existing models, and seed records with external identifiers.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::db::{
    add_column, create_table, find_xmlid, insert_record, load_schema, lookup_xmlid,
    register_field, register_model, update_record, upsert_xmlid,
};
use crate::entities::ModuleState;
use crate::error::{StoreError, StoreResult};
use crate::schema::{FieldDef, ModelDef, Schema, MODEL_MODULE};
use crate::store::{Record, Values};
use crate::xmlid::XmlId;

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    #[serde(default)]
    pub depends: Vec<String>,

    /// Models this module introduces (or extends, when already known)
    #[serde(default)]
    pub models: Vec<ModelSpec>,

    /// Fields added to models owned by other modules
    #[serde(default)]
    pub fields: Vec<FieldExtension>,

    #[serde(default)]
    pub records: Vec<RecordSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

fn default_order() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldExtension {
    pub model: String,
    #[serde(flatten)]
    pub field: FieldDef,
}

/// Seed record. Values may hold `{"ref": "<module>.<name>"}` (or arrays of
/// them) which are replaced by the referenced record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordSpec {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub values: Values,
}

impl ModuleManifest {
    pub fn from_json(raw: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone)]
struct ModuleRow {
    id: i64,
    name: String,
    state: ModuleState,
    manifest: ModuleManifest,
}

// ============================================================================
// REGISTRATION
// ============================================================================

/// Make a module available for installation. Re-registering refreshes the
/// manifest but keeps the current state.
pub fn register_module(conn: &Connection, name: &str, manifest: &ModuleManifest) -> StoreResult<Record> {
    validate_identifier(MODEL_MODULE, "name", name, false)?;
    conn.execute(
        "INSERT INTO ir_module_module (name, state, manifest) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET manifest = excluded.manifest",
        params![name, ModuleState::Uninstalled.as_str(), serde_json::to_string(manifest)?],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM ir_module_module WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;

    let record = Record::new(MODEL_MODULE, id);
    upsert_xmlid(conn, &XmlId::parse(&format!("base.module_{}", name))?, &record)?;
    Ok(record)
}

fn module_by_name(conn: &Connection, name: &str) -> StoreResult<Option<ModuleRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, state, manifest FROM ir_module_module WHERE name = ?1",
            [name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, state, manifest)) = row else {
        return Ok(None);
    };
    let state = ModuleState::parse(&state).ok_or_else(|| StoreError::InvalidValue {
        model: MODEL_MODULE.to_string(),
        field: "state".to_string(),
        reason: format!("unknown module state '{}'", state),
    })?;
    let manifest = match manifest.as_deref() {
        Some(raw) if !raw.trim().is_empty() => ModuleManifest::from_json(raw)?,
        _ => ModuleManifest::default(),
    };

    Ok(Some(ModuleRow {
        id,
        name,
        state,
        manifest,
    }))
}

fn module_name(conn: &Connection, record: &Record) -> StoreResult<String> {
    if !record.is_a(MODEL_MODULE) {
        return Err(StoreError::InvalidValue {
            model: record.model.clone(),
            field: "id".to_string(),
            reason: format!("{} is not a module", record),
        });
    }
    conn.query_row(
        "SELECT name FROM ir_module_module WHERE id = ?1",
        [record.id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::MissingRecord(record.to_string()))
}

// ============================================================================
// INSTALL
// ============================================================================

/// Install modules and their missing dependencies, dependencies first.
///
/// Runs in the caller's transaction: either every planned module is
/// installed or the error leaves the transaction to be rolled back.
pub fn install_modules(conn: &Connection, modules: &[Record]) -> StoreResult<Vec<String>> {
    let mut plan = Vec::new();
    let mut planned = HashSet::new();
    let mut visiting = HashSet::new();

    for record in modules {
        let name = module_name(conn, record)?;
        plan_install(conn, &name, &mut visiting, &mut planned, &mut plan)?;
    }

    let installed_at = Utc::now().to_rfc3339();
    for module in &plan {
        apply_manifest(conn, module)?;
        conn.execute(
            "UPDATE ir_module_module SET state = ?1, installed_at = ?2 WHERE id = ?3",
            params![ModuleState::Installed.as_str(), installed_at, module.id],
        )?;
        info!(module = %module.name, "module installed");
    }

    Ok(plan.into_iter().map(|m| m.name).collect())
}

fn plan_install(
    conn: &Connection,
    name: &str,
    visiting: &mut HashSet<String>,
    planned: &mut HashSet<String>,
    plan: &mut Vec<ModuleRow>,
) -> StoreResult<()> {
    if planned.contains(name) {
        return Ok(());
    }
    if !visiting.insert(name.to_string()) {
        return Err(StoreError::DependencyCycle(name.to_string()));
    }

    let module = module_by_name(conn, name)?.ok_or_else(|| StoreError::UnknownModule(name.to_string()))?;
    match module.state {
        ModuleState::Installed => {
            debug!(module = name, "already installed");
        }
        ModuleState::Uninstallable => {
            return Err(StoreError::ModuleUninstallable(name.to_string()));
        }
        _ => {
            for dependency in &module.manifest.depends {
                plan_install(conn, dependency, visiting, planned, plan)?;
            }
            plan.push(module);
        }
    }

    visiting.remove(name);
    planned.insert(name.to_string());
    Ok(())
}

fn apply_manifest(conn: &Connection, module: &ModuleRow) -> StoreResult<()> {
    let mut schema = load_schema(conn)?;

    for spec in &module.manifest.models {
        validate_identifier(&spec.name, "name", &spec.name, true)?;
        if schema.has_model(&spec.name) {
            extend_model(conn, &schema, &spec.name, &spec.fields)?;
            continue;
        }
        let mut model = ModelDef::new(&spec.name, &spec.order);
        for field in &spec.fields {
            validate_field(&spec.name, field)?;
            model.add_field(field.clone());
        }
        // Reject a bad default ordering before any table exists
        model.order_clause()?;
        create_table(conn, &model)?;
        register_model(conn, &model)?;
        debug!(module = %module.name, model = %model.name, "model created");
        schema.insert_model(model);
    }

    for extension in &module.manifest.fields {
        extend_model(conn, &schema, &extension.model, std::slice::from_ref(&extension.field))?;
    }

    // Records see every model and field created above
    let schema = load_schema(conn)?;
    for spec in &module.manifest.records {
        load_record(conn, &schema, &module.name, spec)?;
    }

    Ok(())
}

fn extend_model(conn: &Connection, schema: &Schema, model: &str, fields: &[FieldDef]) -> StoreResult<()> {
    let model_def = schema.model(model)?;
    for field in fields {
        validate_field(model, field)?;
        if model_def.has_field(&field.name) {
            continue;
        }
        add_column(conn, model_def, field)?;
        register_field(conn, model, field)?;
        debug!(model, field = %field.name, "field added");
    }
    Ok(())
}

fn load_record(conn: &Connection, schema: &Schema, module: &str, spec: &RecordSpec) -> StoreResult<()> {
    let xmlid = XmlId::qualify(module, &spec.id)?;
    let mut values = Values::new();
    for (field, value) in &spec.values {
        values.insert(field.clone(), resolve_refs(conn, schema, value)?);
    }

    let existing = find_xmlid(conn, &xmlid)?
        .filter(|(model, _)| model == &spec.model)
        .map(|(model, id)| Record::new(&model, id));

    if let Some(record) = existing {
        match update_record(conn, schema, &record, &values) {
            Ok(()) => return Ok(()),
            // Record behind the identifier was deleted: recreate it below
            Err(StoreError::MissingRecord(_)) => {}
            Err(err) => return Err(err),
        }
    }

    let id = insert_record(conn, schema, &spec.model, &values)?;
    upsert_xmlid(conn, &xmlid, &Record::new(&spec.model, id))
}

fn resolve_refs(conn: &Connection, schema: &Schema, value: &Value) -> StoreResult<Value> {
    match value {
        Value::Object(map) if map.len() == 1 => match map.get("ref") {
            Some(Value::String(target)) => Ok(json!(lookup_xmlid(conn, schema, target)?.id)),
            _ => Ok(value.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_refs(conn, schema, item))
            .collect::<StoreResult<Vec<_>>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_field(model: &str, field: &FieldDef) -> StoreResult<()> {
    validate_identifier(model, &field.name, &field.name, false)?;
    if field.name == "id" {
        return Err(StoreError::InvalidValue {
            model: model.to_string(),
            field: field.name.clone(),
            reason: "'id' is implicit".to_string(),
        });
    }
    if field.ttype.is_relational() != field.relation.is_some() {
        return Err(StoreError::InvalidValue {
            model: model.to_string(),
            field: field.name.clone(),
            reason: "relational fields need a relation, others must not have one".to_string(),
        });
    }
    Ok(())
}

/// Lowercase ascii, digits and `_` (plus `.` for model names)
fn validate_identifier(model: &str, field: &str, value: &str, allow_dot: bool) -> StoreResult<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || (allow_dot && c == '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidValue {
            model: model.to_string(),
            field: field.to_string(),
            reason: format!("'{}' is not a valid identifier", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::schema::{FieldType, MODEL_CHART_TEMPLATE};

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn manifest(raw: Value) -> ModuleManifest {
        serde_json::from_value(raw).unwrap()
    }

    fn state_of(conn: &Connection, name: &str) -> ModuleState {
        module_by_name(conn, name).unwrap().unwrap().state
    }

    #[test]
    fn test_manifest_parsing() {
        let parsed = manifest(json!({
            "depends": ["base"],
            "models": [{
                "name": "account.chart.template",
                "fields": [
                    {"name": "name", "type": "char"},
                    {"name": "country_id", "type": "many2one", "relation": "res.country"}
                ]
            }],
            "fields": [{"model": "res.company", "name": "chart_template_id",
                        "type": "many2one", "relation": "account.chart.template"}],
            "records": [{"id": "tmpl", "model": "account.chart.template", "values": {"name": "T"}}]
        }));

        assert_eq!(parsed.depends, vec!["base"]);
        assert_eq!(parsed.models[0].order, "id");
        assert_eq!(parsed.models[0].fields[1].ttype, FieldType::Many2one);
        assert_eq!(parsed.fields[0].field.name, "chart_template_id");
        assert_eq!(parsed.records[0].id, "tmpl");
    }

    #[test]
    fn test_install_creates_models_and_records() {
        let conn = memory_db();
        let record = register_module(
            &conn,
            "coa",
            &manifest(json!({
                "models": [{"name": "account.chart.template",
                            "fields": [{"name": "name", "type": "char"}]}],
                "records": [{"id": "configurable_chart_template",
                             "model": "account.chart.template",
                             "values": {"name": "Generic"}}]
            })),
        )
        .unwrap();

        let installed = install_modules(&conn, &[record]).unwrap();

        assert_eq!(installed, vec!["coa"]);
        assert_eq!(state_of(&conn, "coa"), ModuleState::Installed);
        let schema = load_schema(&conn).unwrap();
        let template = lookup_xmlid(&conn, &schema, "coa.configurable_chart_template").unwrap();
        assert!(template.is_a(MODEL_CHART_TEMPLATE));
    }

    #[test]
    fn test_dependencies_install_first() {
        let conn = memory_db();
        register_module(&conn, "account", &ModuleManifest::default()).unwrap();
        let fr = register_module(&conn, "l10n_fr", &manifest(json!({"depends": ["account"]}))).unwrap();

        let installed = install_modules(&conn, &[fr]).unwrap();

        assert_eq!(installed, vec!["account", "l10n_fr"]);
        assert_eq!(state_of(&conn, "account"), ModuleState::Installed);
    }

    #[test]
    fn test_already_installed_dependency_is_skipped() {
        let conn = memory_db();
        let fr = register_module(&conn, "l10n_fr", &manifest(json!({"depends": ["base"]}))).unwrap();

        assert_eq!(install_modules(&conn, &[fr]).unwrap(), vec!["l10n_fr"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let conn = memory_db();
        let fr = register_module(&conn, "l10n_fr", &manifest(json!({"depends": ["account"]}))).unwrap();

        assert!(matches!(
            install_modules(&conn, &[fr]),
            Err(StoreError::UnknownModule(name)) if name == "account"
        ));
    }

    #[test]
    fn test_dependency_cycle() {
        let conn = memory_db();
        register_module(&conn, "a", &manifest(json!({"depends": ["b"]}))).unwrap();
        let b = register_module(&conn, "b", &manifest(json!({"depends": ["a"]}))).unwrap();

        assert!(matches!(
            install_modules(&conn, &[b]),
            Err(StoreError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_uninstallable_module() {
        let conn = memory_db();
        let broken = register_module(&conn, "broken", &ModuleManifest::default()).unwrap();
        conn.execute(
            "UPDATE ir_module_module SET state = 'uninstallable' WHERE name = 'broken'",
            [],
        )
        .unwrap();

        assert!(matches!(
            install_modules(&conn, &[broken]),
            Err(StoreError::ModuleUninstallable(_))
        ));
    }

    #[test]
    fn test_field_extension_and_refs() {
        let conn = memory_db();
        let record = register_module(
            &conn,
            "l10n_be",
            &manifest(json!({
                "models": [{"name": "account.chart.template",
                            "fields": [{"name": "name", "type": "char"}]}],
                "fields": [{"model": "account.chart.template", "name": "country_ids",
                            "type": "many2many", "relation": "res.country"}],
                "records": [
                    {"id": "base.be", "model": "res.country", "values": {"name": "Belgium", "code": "BE"}},
                    {"id": "configurable_chart_template", "model": "account.chart.template",
                     "values": {"name": "Belgian PCMN", "country_ids": [{"ref": "base.be"}]}}
                ]
            })),
        )
        .unwrap();

        install_modules(&conn, &[record]).unwrap();

        let schema = load_schema(&conn).unwrap();
        assert!(schema.has_field(MODEL_CHART_TEMPLATE, "country_ids"));
        let be = lookup_xmlid(&conn, &schema, "base.be").unwrap();
        let countries: String = conn
            .query_row("SELECT country_ids FROM account_chart_template", [], |row| row.get(0))
            .unwrap();
        assert_eq!(countries, format!("[{}]", be.id));
    }

    #[test]
    fn test_relational_field_needs_relation() {
        let conn = memory_db();
        let record = register_module(
            &conn,
            "bad",
            &manifest(json!({
                "models": [{"name": "x.model",
                            "fields": [{"name": "partner_id", "type": "many2one"}]}]
            })),
        )
        .unwrap();

        assert!(matches!(
            install_modules(&conn, &[record]),
            Err(StoreError::InvalidValue { .. })
        ));
    }
}
