// 🌍 Localization Applier - session bootstrap, then two phases on two sessions
//
// Phase 1: set the company's country and install the requested modules.
// Phase 2: on a fresh session (installs may have changed the schema),
//          load a chart of accounts unless the company already has accounts.

use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::entities::{
    accounts_exist, modules_to_install, parse_module_list, require_company,
    resolve_chart_template, TemplateSource,
};
use crate::error::L10nError;
use crate::store::{EnvironmentScope, Platform, Record, RequestContext, Session, Values};
use crate::xmlid;

// ============================================================================
// REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizationRequest {
    pub db_name: String,
    /// e.g. `base.fr`
    pub country_xmlid: String,
    pub modules: Vec<String>,
}

impl LocalizationRequest {
    pub fn new(db_name: &str, country_xmlid: &str, modules_csv: &str) -> Result<Self, L10nError> {
        let country_xmlid = country_xmlid.trim();
        if country_xmlid.is_empty() {
            return Err(L10nError::Usage);
        }
        Ok(LocalizationRequest {
            db_name: db_name.to_string(),
            country_xmlid: country_xmlid.to_string(),
            modules: parse_module_list(modules_csv),
        })
    }

    /// Positional arguments after the program name. Extra arguments are ignored.
    pub fn from_args(args: &[String]) -> Result<(PathBuf, Self), L10nError> {
        match args {
            [config_path, db_name, country, modules_csv, ..] => Ok((
                PathBuf::from(config_path),
                LocalizationRequest::new(db_name, country, modules_csv)?,
            )),
            _ => Err(L10nError::Usage),
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// What phase 1 did, plus the company overlay phase 2 must reuse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryStage {
    pub company: Record,
    pub country: Record,
    pub installed_modules: Vec<String>,
    pub ctx: RequestContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartOutcome {
    /// Accounts already exist; nothing loaded
    AccountsPresent,
    Loaded {
        template: Record,
        source: TemplateSource,
        accounts: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub company: Record,
    pub country: Record,
    pub installed_modules: Vec<String>,
    pub chart: ChartOutcome,
}

// ============================================================================
// SESSION BOOTSTRAP
// ============================================================================

/// Enter the platform's managed scope, or a no-op scope when it has none
pub fn enter_environment<P: Platform>(platform: &P) -> EnvironmentScope {
    match platform.managed_scope() {
        Some(scope) => {
            debug!(scope = scope.label(), "entered managed environment");
            scope
        }
        None => {
            debug!("platform has no managed environment, using a no-op scope");
            EnvironmentScope::noop()
        }
    }
}

pub fn open_session<P: Platform>(platform: &P, db_name: &str) -> Result<P::Session, L10nError> {
    let session = platform.open_session(db_name)?;
    debug!(db = db_name, "session opened as superuser");
    Ok(session)
}

// ============================================================================
// PHASE 1 - COUNTRY & MODULES
// ============================================================================

pub fn apply_country_and_modules<S: Session + ?Sized>(
    session: &mut S,
    request: &LocalizationRequest,
) -> Result<CountryStage, L10nError> {
    let base = RequestContext::superuser();

    let company = require_company(session, &base)?;
    let ctx = base.for_company(company.id);

    let country = xmlid::resolve(session, &request.country_xmlid)
        .ok_or_else(|| L10nError::CountryNotFound(request.country_xmlid.clone()))?;

    let mut update = Values::new();
    update.insert("country_id".to_string(), json!(country.id));
    session.write(&company, &update, &base)?;
    // Persist the country before any install can disturb the session
    session.commit()?;
    info!(%company, %country, "company country set");

    let pending = modules_to_install(session, &request.modules, &base)?;
    let installed_modules: Vec<String> = pending.iter().map(|m| m.name.clone()).collect();
    if !pending.is_empty() {
        session.commit()?;
        let records: Vec<Record> = pending.into_iter().map(|m| m.record).collect();
        info!(modules = ?installed_modules, "installing modules");
        session.immediate_install(&records, &base)?;
    }

    Ok(CountryStage {
        company,
        country,
        installed_modules,
        ctx,
    })
}

// ============================================================================
// PHASE 2 - CHART OF ACCOUNTS
// ============================================================================

/// START -> SHORT_CIRCUIT_CHECK -> {DONE | RESOLVE_TEMPLATE -> LOAD -> DONE}
pub fn apply_chart<S: Session + ?Sized>(
    session: &mut S,
    modules: &[String],
    ctx: &RequestContext,
) -> Result<ChartOutcome, L10nError> {
    let company = require_company(session, ctx)?;

    if accounts_exist(session, &company, ctx)? {
        info!(%company, "accounts already present, chart load skipped");
        session.commit()?;
        return Ok(ChartOutcome::AccountsPresent);
    }

    let resolved = resolve_chart_template(session, &company, modules, ctx)?;
    let accounts = session.load_chart_template(&resolved.template, ctx)?;
    session.commit()?;

    Ok(ChartOutcome::Loaded {
        template: resolved.template,
        source: resolved.source,
        accounts,
    })
}

// ============================================================================
// END TO END
// ============================================================================

pub fn apply_localization<P: Platform>(
    platform: &P,
    request: &LocalizationRequest,
) -> Result<ApplyReport, L10nError> {
    let _scope = enter_environment(platform);

    // Phase 1 session is closed before phase 2 opens
    let stage = {
        let mut session = open_session(platform, &request.db_name)?;
        apply_country_and_modules(&mut session, request)?
    };

    let mut session = open_session(platform, &request.db_name)?;
    let chart = apply_chart(&mut session, &request.modules, &stage.ctx)?;

    Ok(ApplyReport {
        company: stage.company,
        country: stage.country,
        installed_modules: stage.installed_modules,
        chart,
    })
}

// ============================================================================
// STATUS LINES
// ============================================================================

pub const SKIP_NOTICE: &str = "Accounts already present for this company; skipping chart load.";
pub const DONE_LINE: &str = "Localization applied ✓";

/// Human-readable summary of a successful run
pub fn write_report<W: Write>(out: &mut W, request: &LocalizationRequest, report: &ApplyReport) -> io::Result<()> {
    writeln!(out, "\n🏢 Company {}", report.company)?;
    writeln!(out, "✓ Country set to {}", request.country_xmlid)?;

    if report.installed_modules.is_empty() {
        writeln!(out, "✓ Requested modules already installed")?;
    } else {
        writeln!(out, "✓ Installed modules: {}", report.installed_modules.join(", "))?;
    }

    match &report.chart {
        ChartOutcome::AccountsPresent => writeln!(out, "{}", SKIP_NOTICE)?,
        ChartOutcome::Loaded {
            template,
            source,
            accounts,
        } => {
            writeln!(out, "✓ Chart template {} ({})", template, source)?;
            writeln!(out, "✓ Created {} accounts", accounts)?;
        }
    }

    writeln!(out, "\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
    writeln!(out, "{}", DONE_LINE)
}
