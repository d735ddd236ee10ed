// 📐 Schema Catalog - which models and fields the current store knows about
//
// Capability checks (`has_model`, `has_field`) are answered from a snapshot
// taken when a session opens. Installing modules changes the store, not the
// snapshot: new models only show up in sessions opened afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};

// ============================================================================
// WELL-KNOWN MODELS
// ============================================================================

pub const MODEL_COMPANY: &str = "res.company";
pub const MODEL_COUNTRY: &str = "res.country";
pub const MODEL_MODULE: &str = "ir.module.module";
pub const MODEL_ACCOUNT: &str = "account.account";
pub const MODEL_ACCOUNT_TEMPLATE: &str = "account.account.template";
pub const MODEL_CHART_TEMPLATE: &str = "account.chart.template";

// ============================================================================
// FIELD TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Char,
    Boolean,
    /// Reference to one record of `relation`
    Many2one,
    /// Set of record ids of `relation`, stored as a JSON array
    Many2many,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Char => "char",
            FieldType::Boolean => "boolean",
            FieldType::Many2one => "many2one",
            FieldType::Many2many => "many2many",
        }
    }

    pub fn parse(value: &str) -> Option<FieldType> {
        match value {
            "integer" => Some(FieldType::Integer),
            "float" => Some(FieldType::Float),
            "char" => Some(FieldType::Char),
            "boolean" => Some(FieldType::Boolean),
            "many2one" => Some(FieldType::Many2one),
            "many2many" => Some(FieldType::Many2many),
            _ => None,
        }
    }

    /// SQLite column type used when the field is materialized
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldType::Integer | FieldType::Boolean | FieldType::Many2one => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::Char | FieldType::Many2many => "TEXT",
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, FieldType::Many2one | FieldType::Many2many)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ttype: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl FieldDef {
    pub fn new(name: &str, ttype: FieldType) -> Self {
        FieldDef {
            name: name.to_string(),
            ttype,
            relation: None,
        }
    }

    pub fn relational(name: &str, ttype: FieldType, relation: &str) -> Self {
        FieldDef {
            name: name.to_string(),
            ttype,
            relation: Some(relation.to_string()),
        }
    }
}

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    /// Default ordering, e.g. "sequence, name"
    pub order: String,
    fields: BTreeMap<String, FieldDef>,
}

impl ModelDef {
    pub fn new(name: &str, order: &str) -> Self {
        ModelDef {
            name: name.to_string(),
            table: table_name(name),
            order: order.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn add_field(&mut self, field: FieldDef) {
        self.fields.insert(field.name.clone(), field);
    }

    /// `id` is implicit on every model
    pub fn has_field(&self, name: &str) -> bool {
        name == "id" || self.fields.contains_key(name)
    }

    pub fn field(&self, name: &str) -> StoreResult<&FieldDef> {
        self.fields.get(name).ok_or_else(|| StoreError::UnknownField {
            model: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// SQL `ORDER BY` body for the default ordering, with `id` as tie-breaker.
    ///
    /// Only declared fields are accepted, so the clause is safe to splice.
    pub fn order_clause(&self) -> StoreResult<String> {
        let mut terms = Vec::new();
        let mut has_id = false;

        for term in self.order.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let mut parts = term.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let direction = match parts.next().map(|d| d.to_ascii_lowercase()) {
                None => "ASC",
                Some(d) if d == "asc" => "ASC",
                Some(d) if d == "desc" => "DESC",
                Some(d) => {
                    return Err(StoreError::InvalidValue {
                        model: self.name.clone(),
                        field: name.to_string(),
                        reason: format!("unknown sort direction '{}'", d),
                    })
                }
            };
            if !self.has_field(name) {
                return Err(StoreError::UnknownField {
                    model: self.name.clone(),
                    field: name.to_string(),
                });
            }
            has_id |= name == "id";
            terms.push(format!("{} {}", quote_ident(name), direction));
        }

        if !has_id {
            terms.push("\"id\" ASC".to_string());
        }
        Ok(terms.join(", "))
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: BTreeMap<String, ModelDef>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn has_field(&self, model: &str, field: &str) -> bool {
        self.models
            .get(model)
            .map(|m| m.has_field(field))
            .unwrap_or(false)
    }

    pub fn model(&self, model: &str) -> StoreResult<&ModelDef> {
        self.models
            .get(model)
            .ok_or_else(|| StoreError::UnknownModel(model.to_string()))
    }

    pub fn model_mut(&mut self, model: &str) -> StoreResult<&mut ModelDef> {
        self.models
            .get_mut(model)
            .ok_or_else(|| StoreError::UnknownModel(model.to_string()))
    }

    pub fn insert_model(&mut self, model: ModelDef) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

/// `account.chart.template` -> `account_chart_template`
pub fn table_name(model: &str) -> String {
    model.replace('.', "_")
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
