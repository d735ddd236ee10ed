// ⚠️ Error Taxonomy
// Fatal applier errors plus the store errors surfaced unmodified from the platform

use thiserror::Error;

use crate::config::ConfigError;

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// STORE ERRORS (anything raised by the platform collaborator)
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database '{0}' does not exist")]
    DatabaseNotFound(String),

    #[error("Invalid database name '{0}'")]
    InvalidDatabaseName(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("Malformed external identifier '{0}' (expected <module>.<name>)")]
    MalformedXmlid(String),

    #[error("External identifier '{0}' not found")]
    XmlidNotFound(String),

    #[error("Record {0} does not exist")]
    MissingRecord(String),

    #[error("External identifier '{0}' points to a record that no longer exists")]
    StaleReference(String),

    #[error("Operation '{0}' requires superuser privileges")]
    AccessDenied(&'static str),

    #[error("No current company in request context")]
    NoCurrentCompany,

    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error("Module dependency cycle through '{0}'")]
    DependencyCycle(String),

    #[error("Module '{0}' is not installable")]
    ModuleUninstallable(String),

    #[error("Invalid module manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Invalid value for {model}.{field}: {reason}")]
    InvalidValue {
        model: String,
        field: String,
        reason: String,
    },
}

// ============================================================================
// APPLIER ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum L10nError {
    #[error("Usage: apply-l10n <config-path> <db-name> <country-identifier> <modules-csv>")]
    Usage,

    #[error("No company found in database.")]
    NoCompany,

    #[error("Country XMLID '{0}' not found.")]
    CountryNotFound(String),

    #[error(
        "No account.chart.template found. Ensure your l10n module \
         (e.g., 'account,l10n_fr') is installed before applying localization."
    )]
    ChartTemplateNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl L10nError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            L10nError::Usage => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_exit_code() {
        assert_eq!(L10nError::Usage.exit_code(), 2);
        assert_eq!(L10nError::NoCompany.exit_code(), 1);
        assert_eq!(L10nError::ChartTemplateNotFound.exit_code(), 1);
    }

    #[test]
    fn test_chart_template_message_guides_operator() {
        let message = L10nError::ChartTemplateNotFound.to_string();
        assert!(message.contains("account.chart.template"));
        assert!(message.contains("installed before applying localization"));
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: L10nError = StoreError::UnknownModule("l10n_xx".to_string()).into();
        assert_eq!(err.to_string(), "Unknown module 'l10n_xx'");
    }
}
