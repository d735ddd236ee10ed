// 🔖 External Identifiers - `<module>.<name>` keys for seed records

use std::fmt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{Record, Session};

/// Well-known fallback chart template
pub const GENERIC_CHART_TEMPLATE: &str = "l10n_generic_coa.configurable_chart_template";

/// Conventional template name a localization module publishes
pub const CONFIGURABLE_CHART_TEMPLATE: &str = "configurable_chart_template";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlId {
    pub module: String,
    pub name: String,
}

impl XmlId {
    /// Parse a fully qualified identifier. Exactly one dot, both parts non-empty.
    pub fn parse(raw: &str) -> StoreResult<XmlId> {
        let raw = raw.trim();
        match raw.split_once('.') {
            Some((module, name))
                if !module.is_empty() && !name.is_empty() && !name.contains('.') =>
            {
                Ok(XmlId {
                    module: module.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(StoreError::MalformedXmlid(raw.to_string())),
        }
    }

    /// Qualify a manifest-local name with its module; full names pass through
    pub fn qualify(module: &str, raw: &str) -> StoreResult<XmlId> {
        if raw.contains('.') {
            XmlId::parse(raw)
        } else {
            XmlId::parse(&format!("{}.{}", module, raw))
        }
    }

    pub fn chart_template_of(module: &str) -> String {
        format!("{}.{}", module, CONFIGURABLE_CHART_TEMPLATE)
    }
}

impl fmt::Display for XmlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Soft-fail lookup: any failure (missing, malformed, stale, store error)
/// means "not found". Callers decide whether absence is fatal.
pub fn resolve<S: Session + ?Sized>(session: &mut S, xmlid: &str) -> Option<Record> {
    match session.resolve_xmlid(xmlid) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(xmlid, error = %err, "external identifier did not resolve");
            None
        }
    }
}
