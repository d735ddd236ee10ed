// Entity Helpers - one module per platform entity the applier touches
//
// Each helper works through the `Session` contract only:
// - company: which company to localize
// - module: which requested modules still need installing
// - account: whether a chart was already loaded
// - chart_template: which template to load

pub mod account;
pub mod chart_template;
pub mod company;
pub mod module;

pub use account::accounts_exist;
pub use chart_template::{resolve_chart_template, ResolvedTemplate, TemplateSource};
pub use company::{require_company, select_company};
pub use module::{modules_to_install, parse_module_list, ModuleInfo, ModuleState};
