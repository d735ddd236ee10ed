// 🔌 Store Contract - the narrow surface the applier uses to talk to the platform
//
// The platform owns every record. The applier only ever holds `Record`
// handles (model + id), resolved fresh in each session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::StoreResult;
use crate::schema::Schema;

/// Identity used for privileged setup work
pub const SUPERUSER_ID: i64 = 1;

pub type Values = Map<String, Value>;

// ============================================================================
// RECORD HANDLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub model: String,
    pub id: i64,
}

impl Record {
    pub fn new(model: &str, id: i64) -> Self {
        Record {
            model: model.to_string(),
            id,
        }
    }

    pub fn is_a(&self, model: &str) -> bool {
        self.model == model
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model, self.id)
    }
}

// ============================================================================
// SEARCH DOMAIN
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// field = value
    Eq(String, Value),
    /// Scalar field: value in set. Many2many field: any overlap with set.
    In(String, Vec<Value>),
}

/// Conjunction of conditions; empty matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain {
    pub conditions: Vec<Condition>,
}

impl Domain {
    pub fn all() -> Self {
        Domain::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn within<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// Explicit per-request overlay threaded into every store call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub uid: i64,
    #[serde(default)]
    pub allowed_company_ids: Vec<i64>,
    #[serde(default)]
    pub force_company: Option<i64>,
}

impl RequestContext {
    pub fn superuser() -> Self {
        RequestContext {
            uid: SUPERUSER_ID,
            allowed_company_ids: Vec::new(),
            force_company: None,
        }
    }

    /// Same identity, restricted to a single company
    pub fn for_company(&self, company_id: i64) -> Self {
        RequestContext {
            uid: self.uid,
            allowed_company_ids: vec![company_id],
            force_company: Some(company_id),
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.uid == SUPERUSER_ID
    }

    /// Company that "current company" operations target
    pub fn current_company(&self) -> Option<i64> {
        self.force_company
            .or_else(|| self.allowed_company_ids.first().copied())
    }
}

// ============================================================================
// ENVIRONMENT SCOPE
// ============================================================================

/// Process-level scope some platforms require around all sessions.
///
/// Runs its exit hook when dropped, on every exit path.
pub struct EnvironmentScope {
    label: &'static str,
    on_exit: Option<Box<dyn FnOnce()>>,
}

impl EnvironmentScope {
    pub fn managed(label: &'static str, on_exit: impl FnOnce() + 'static) -> Self {
        EnvironmentScope {
            label,
            on_exit: Some(Box::new(on_exit)),
        }
    }

    pub fn noop() -> Self {
        EnvironmentScope {
            label: "noop",
            on_exit: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Drop for EnvironmentScope {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
    }
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

pub trait Platform {
    type Session: Session;

    /// Managed environment scope, if the platform has one
    fn managed_scope(&self) -> Option<EnvironmentScope> {
        None
    }

    /// Open the registry for `db_name` and a transactional session on it.
    fn open_session(&self, db_name: &str) -> StoreResult<Self::Session>;
}

/// One transactional cursor. Dropping it discards uncommitted work.
pub trait Session {
    /// Catalog snapshot taken when the session opened
    fn schema(&self) -> &Schema;

    fn supports_main_company(&self) -> bool {
        false
    }

    fn main_company(&mut self) -> StoreResult<Option<Record>> {
        Ok(None)
    }

    fn search(
        &mut self,
        model: &str,
        domain: &Domain,
        limit: Option<usize>,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<Record>>;

    fn search_count(&mut self, model: &str, domain: &Domain, ctx: &RequestContext) -> StoreResult<u64>;

    fn read(&mut self, record: &Record, field: &str) -> StoreResult<Value>;

    fn write(&mut self, record: &Record, values: &Values, ctx: &RequestContext) -> StoreResult<()>;

    /// Look up a record by external identifier. Raises on any failure.
    fn resolve_xmlid(&mut self, xmlid: &str) -> StoreResult<Record>;

    /// Install the given `ir.module.module` records right away.
    ///
    /// May change the store's structure; this session's schema is not refreshed.
    fn immediate_install(&mut self, modules: &[Record], ctx: &RequestContext) -> StoreResult<()>;

    /// Instantiate a chart template for the context's current company.
    /// Returns the number of accounts created.
    fn load_chart_template(&mut self, template: &Record, ctx: &RequestContext) -> StoreResult<usize>;

    fn commit(&mut self) -> StoreResult<()>;
}
