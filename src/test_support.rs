// 🧪 Test Fixtures - seeded SQLite tenants and a call-recording session

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::db::{insert_record, load_schema, upsert_xmlid, SqlitePlatform, MAIN_COMPANY_XMLID};
use crate::error::StoreResult;
use crate::installer::{install_modules, register_module, ModuleManifest};
use crate::schema::{Schema, MODEL_COMPANY, MODEL_COUNTRY};
use crate::store::{Domain, Record, RequestContext, Session, Values};
use crate::xmlid::XmlId;

pub const DB_NAME: &str = "shop";

pub fn values(raw: Value) -> Values {
    match raw {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn manifest(raw: Value) -> ModuleManifest {
    serde_json::from_value(raw).unwrap()
}

/// `legacy`: chart templates carry a single `country_id` instead of `country_ids`
pub fn account_manifest(legacy: bool) -> ModuleManifest {
    let country_field = if legacy {
        json!({"name": "country_id", "type": "many2one", "relation": "res.country"})
    } else {
        json!({"name": "country_ids", "type": "many2many", "relation": "res.country"})
    };
    manifest(json!({
        "depends": ["base"],
        "models": [
            {"name": "account.chart.template", "order": "name",
             "fields": [{"name": "name", "type": "char"}, country_field]},
            {"name": "account.account", "order": "code",
             "fields": [
                {"name": "code", "type": "char"},
                {"name": "name", "type": "char"},
                {"name": "account_type", "type": "char"},
                {"name": "company_id", "type": "many2one", "relation": "res.company"}
             ]},
            {"name": "account.account.template", "order": "code",
             "fields": [
                {"name": "code", "type": "char"},
                {"name": "name", "type": "char"},
                {"name": "account_type", "type": "char"},
                {"name": "chart_template_id", "type": "many2one", "relation": "account.chart.template"}
             ]}
        ],
        "fields": [
            {"model": "res.company", "name": "chart_template_id",
             "type": "many2one", "relation": "account.chart.template"}
        ]
    }))
}

fn l10n_fr_manifest(legacy: bool) -> ModuleManifest {
    let country = if legacy {
        json!({"country_id": {"ref": "base.fr"}})
    } else {
        json!({"country_ids": [{"ref": "base.fr"}]})
    };
    let mut template = values(json!({"name": "Plan Comptable Général"}));
    template.extend(values(country));

    manifest(json!({
        "depends": ["account"],
        "records": [
            {"id": "configurable_chart_template", "model": "account.chart.template", "values": template},
            {"id": "pcg_101000", "model": "account.account.template",
             "values": {"code": "101000", "name": "Capital", "account_type": "equity",
                        "chart_template_id": {"ref": "l10n_fr.configurable_chart_template"}}},
            {"id": "pcg_401000", "model": "account.account.template",
             "values": {"code": "401000", "name": "Fournisseurs", "account_type": "liability_payable",
                        "chart_template_id": {"ref": "l10n_fr.configurable_chart_template"}}},
            {"id": "pcg_411000", "model": "account.account.template",
             "values": {"code": "411000", "name": "Clients", "account_type": "asset_receivable",
                        "chart_template_id": {"ref": "l10n_fr.configurable_chart_template"}}}
        ]
    }))
}

fn generic_coa_manifest() -> ModuleManifest {
    manifest(json!({
        "depends": ["account"],
        "records": [
            {"id": "configurable_chart_template", "model": "account.chart.template",
             "values": {"name": "Generic Chart Template"}},
            {"id": "gen_110000", "model": "account.account.template",
             "values": {"code": "110000", "name": "Current Assets", "account_type": "asset_current",
                        "chart_template_id": {"ref": "l10n_generic_coa.configurable_chart_template"}}},
            {"id": "gen_400000", "model": "account.account.template",
             "values": {"code": "400000", "name": "Product Sales", "account_type": "income",
                        "chart_template_id": {"ref": "l10n_generic_coa.configurable_chart_template"}}}
        ]
    }))
}

fn seed_record(conn: &rusqlite::Connection, schema: &Schema, xmlid: &str, model: &str, raw: Value) {
    let id = insert_record(conn, schema, model, &values(raw)).unwrap();
    upsert_xmlid(conn, &XmlId::parse(xmlid).unwrap(), &Record::new(model, id)).unwrap();
}

fn build(legacy: bool, install: &[&str]) -> (TempDir, SqlitePlatform) {
    let dir = tempfile::tempdir().unwrap();
    let platform = SqlitePlatform::new(dir.path());
    let conn = platform.create_database(DB_NAME).unwrap();
    let schema = load_schema(&conn).unwrap();

    seed_record(&conn, &schema, "base.fr", MODEL_COUNTRY, json!({"name": "France", "code": "FR"}));
    seed_record(&conn, &schema, "base.be", MODEL_COUNTRY, json!({"name": "Belgium", "code": "BE"}));
    seed_record(&conn, &schema, "base.br", MODEL_COUNTRY, json!({"name": "Brazil", "code": "BR"}));
    seed_record(
        &conn,
        &schema,
        MAIN_COMPANY_XMLID,
        MODEL_COMPANY,
        json!({"name": "My Company", "sequence": 10}),
    );

    register_module(&conn, "account", &account_manifest(legacy)).unwrap();
    register_module(&conn, "l10n_fr", &l10n_fr_manifest(legacy)).unwrap();
    register_module(&conn, "l10n_generic_coa", &generic_coa_manifest()).unwrap();

    let to_install: Vec<Record> = install
        .iter()
        .map(|name| {
            let id: i64 = conn
                .query_row("SELECT id FROM ir_module_module WHERE name = ?1", [name], |row| row.get(0))
                .unwrap();
            Record::new("ir.module.module", id)
        })
        .collect();
    install_modules(&conn, &to_install).unwrap();

    (dir, platform)
}

/// Tenant `shop`: countries fr/be/br, one main company, modules `account`,
/// `l10n_fr`, `l10n_generic_coa` available; `install` ones installed.
pub fn seeded_platform(install: &[&str]) -> (TempDir, SqlitePlatform) {
    build(false, install)
}

pub fn seeded_platform_legacy(install: &[&str]) -> (TempDir, SqlitePlatform) {
    build(true, install)
}

pub fn country_id<S: Session + ?Sized>(session: &mut S, xmlid: &str) -> i64 {
    session.resolve_xmlid(xmlid).unwrap().id
}

// ============================================================================
// RECORDING SESSION
// ============================================================================

/// Delegates to a real session and logs every store call
pub struct Recording<S> {
    pub inner: S,
    pub calls: Vec<String>,
    main_company_accessor: bool,
}

impl<S: Session> Recording<S> {
    pub fn new(inner: S) -> Self {
        Recording {
            inner,
            calls: Vec::new(),
            main_company_accessor: true,
        }
    }

    /// Hide the platform's main-company accessor
    pub fn without_main_company(inner: S) -> Self {
        Recording {
            inner,
            calls: Vec::new(),
            main_company_accessor: false,
        }
    }
}

impl<S: Session> Session for Recording<S> {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn supports_main_company(&self) -> bool {
        self.main_company_accessor && self.inner.supports_main_company()
    }

    fn main_company(&mut self) -> StoreResult<Option<Record>> {
        self.calls.push("main_company".to_string());
        self.inner.main_company()
    }

    fn search(
        &mut self,
        model: &str,
        domain: &Domain,
        limit: Option<usize>,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<Record>> {
        self.calls.push(format!("search {} limit={:?}", model, limit));
        self.inner.search(model, domain, limit, ctx)
    }

    fn search_count(&mut self, model: &str, domain: &Domain, ctx: &RequestContext) -> StoreResult<u64> {
        self.calls.push(format!("search_count {}", model));
        self.inner.search_count(model, domain, ctx)
    }

    fn read(&mut self, record: &Record, field: &str) -> StoreResult<Value> {
        self.calls.push(format!("read {} {}", record.model, field));
        self.inner.read(record, field)
    }

    fn write(&mut self, record: &Record, values: &Values, ctx: &RequestContext) -> StoreResult<()> {
        self.calls.push(format!("write {}", record));
        self.inner.write(record, values, ctx)
    }

    fn resolve_xmlid(&mut self, xmlid: &str) -> StoreResult<Record> {
        self.calls.push(format!("resolve_xmlid {}", xmlid));
        self.inner.resolve_xmlid(xmlid)
    }

    fn immediate_install(&mut self, modules: &[Record], ctx: &RequestContext) -> StoreResult<()> {
        let ids: Vec<i64> = modules.iter().map(|m| m.id).collect();
        self.calls.push(format!("immediate_install {:?}", ids));
        self.inner.immediate_install(modules, ctx)
    }

    fn load_chart_template(&mut self, template: &Record, ctx: &RequestContext) -> StoreResult<usize> {
        self.calls.push(format!("load_chart_template {}", template));
        self.inner.load_chart_template(template, ctx)
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.calls.push("commit".to_string());
        self.inner.commit()
    }
}
