// 🧩 Extension Modules - lifecycle state and install filtering

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::schema::MODEL_MODULE;
use crate::store::{Domain, Record, RequestContext, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    Uninstalled,
    Installed,
    ToInstall,
    ToUpgrade,
    ToRemove,
    Uninstallable,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::Installed => "installed",
            ModuleState::ToInstall => "to install",
            ModuleState::ToUpgrade => "to upgrade",
            ModuleState::ToRemove => "to remove",
            ModuleState::Uninstallable => "uninstallable",
        }
    }

    pub fn parse(value: &str) -> Option<ModuleState> {
        match value {
            "uninstalled" => Some(ModuleState::Uninstalled),
            "installed" => Some(ModuleState::Installed),
            "to install" => Some(ModuleState::ToInstall),
            "to upgrade" => Some(ModuleState::ToUpgrade),
            "to remove" => Some(ModuleState::ToRemove),
            "uninstallable" => Some(ModuleState::Uninstallable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub record: Record,
    pub name: String,
    /// `None` when the store holds a state this crate does not know
    pub state: Option<ModuleState>,
}

/// "account, l10n_fr,," -> ["account", "l10n_fr"]; order kept
pub fn parse_module_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Requested modules whose state is not `installed`.
///
/// Names the store does not know are skipped with a warning.
pub fn modules_to_install<S: Session + ?Sized>(
    session: &mut S,
    names: &[String],
    ctx: &RequestContext,
) -> StoreResult<Vec<ModuleInfo>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let records = session.search(
        MODEL_MODULE,
        &Domain::all().within("name", names.iter().map(String::as_str)),
        None,
        ctx,
    )?;

    let mut found = Vec::with_capacity(records.len());
    for record in records {
        let name = session
            .read(&record, "name")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let state = session
            .read(&record, "state")?
            .as_str()
            .and_then(ModuleState::parse);
        found.push(ModuleInfo { record, name, state });
    }

    for name in names {
        if !found.iter().any(|m| &m.name == name) {
            warn!(module = %name, "module not available in this database");
        }
    }

    let (installed, pending): (Vec<_>, Vec<_>) = found
        .into_iter()
        .partition(|m| m.state == Some(ModuleState::Installed));
    for module in &installed {
        debug!(module = %module.name, "already installed");
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Platform;
    use crate::test_support::seeded_platform;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_module_list() {
        assert_eq!(parse_module_list("account,l10n_fr"), names(&["account", "l10n_fr"]));
        assert_eq!(parse_module_list(" account , ,l10n_fr,"), names(&["account", "l10n_fr"]));
        assert!(parse_module_list("").is_empty());
        assert!(parse_module_list(" , ").is_empty());
    }

    #[test]
    fn test_module_state_names() {
        assert_eq!(ModuleState::parse("to install"), Some(ModuleState::ToInstall));
        assert_eq!(ModuleState::Installed.as_str(), "installed");
        assert_eq!(ModuleState::parse("installing"), None);
    }

    #[test]
    fn test_only_uninstalled_modules_are_returned() {
        let (_dir, platform) = seeded_platform(&["account"]);
        let mut session = platform.open_session("shop").unwrap();

        let pending = modules_to_install(
            &mut session,
            &names(&["account", "l10n_fr"]),
            &RequestContext::superuser(),
        )
        .unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "l10n_fr");
        assert_eq!(pending[0].state, Some(ModuleState::Uninstalled));
    }

    #[test]
    fn test_unknown_module_names_are_skipped() {
        let (_dir, platform) = seeded_platform(&[]);
        let mut session = platform.open_session("shop").unwrap();

        let pending = modules_to_install(
            &mut session,
            &names(&["l10n_zz"]),
            &RequestContext::superuser(),
        )
        .unwrap();

        assert!(pending.is_empty());
    }

    #[test]
    fn test_empty_request_does_not_touch_store() {
        let (_dir, platform) = seeded_platform(&[]);
        let mut session = crate::test_support::Recording::new(platform.open_session("shop").unwrap());

        let pending = modules_to_install(&mut session, &[], &RequestContext::superuser()).unwrap();

        assert!(pending.is_empty());
        assert!(session.calls.is_empty());
    }
}
