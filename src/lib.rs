// Localization Applier - Core Library
// Exposes the applier stages, the store contract and the SQLite platform

pub mod applier;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod installer;
pub mod logging;
pub mod schema;
pub mod store;
pub mod xmlid;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use applier::{
    apply_chart, apply_country_and_modules, apply_localization, ApplyReport, ChartOutcome,
    CountryStage, LocalizationRequest, write_report,
};
pub use config::{Config, ConfigError, Options};
pub use db::{SqlitePlatform, SqliteSession};
pub use entities::{ModuleState, TemplateSource};
pub use error::{L10nError, StoreError, StoreResult};
pub use installer::ModuleManifest;
pub use store::{Domain, EnvironmentScope, Platform, Record, RequestContext, Session, Values};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
