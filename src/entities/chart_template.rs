// 📒 Chart Template Resolution - ordered fallback chain, first match wins
//
// a. search by the company's country (legacy `country_id` or `country_ids`)
// b. `<module>.configurable_chart_template` for each requested module
// c. the generic template, then any template at all

use std::fmt;
use tracing::{debug, info};

use crate::error::{L10nError, StoreResult};
use crate::schema::{Schema, MODEL_CHART_TEMPLATE, MODEL_COMPANY};
use crate::store::{Domain, Record, RequestContext, Session};
use crate::xmlid::{self, XmlId, GENERIC_CHART_TEMPLATE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    CountrySearch,
    ModuleConvention(String),
    GenericIdentifier,
    AnyTemplate,
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::CountrySearch => write!(f, "country search"),
            TemplateSource::ModuleConvention(module) => write!(f, "module {}", module),
            TemplateSource::GenericIdentifier => write!(f, "generic template"),
            TemplateSource::AnyTemplate => write!(f, "first available template"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub template: Record,
    pub source: TemplateSource,
}

/// Template filter for a country, shaped by whichever country field the
/// template model has. Without a country (or field) nothing is filtered.
pub fn country_domain(schema: &Schema, country_id: Option<i64>) -> Domain {
    let Some(country_id) = country_id else {
        return Domain::all();
    };
    if schema.has_field(MODEL_CHART_TEMPLATE, "country_id") {
        Domain::all().eq("country_id", country_id)
    } else if schema.has_field(MODEL_CHART_TEMPLATE, "country_ids") {
        Domain::all().within("country_ids", [country_id])
    } else {
        Domain::all()
    }
}

fn company_country<S: Session + ?Sized>(session: &mut S, company: &Record) -> StoreResult<Option<i64>> {
    if !session.schema().has_field(MODEL_COMPANY, "country_id") {
        return Ok(None);
    }
    Ok(session.read(company, "country_id")?.as_i64())
}

fn accept(record: Option<Record>) -> Option<Record> {
    record.filter(|r| r.is_a(MODEL_CHART_TEMPLATE))
}

pub fn resolve_chart_template<S: Session + ?Sized>(
    session: &mut S,
    company: &Record,
    modules: &[String],
    ctx: &RequestContext,
) -> Result<ResolvedTemplate, L10nError> {
    if !session.schema().has_model(MODEL_CHART_TEMPLATE) {
        debug!("chart template model unknown to this database");
        return Err(L10nError::ChartTemplateNotFound);
    }

    let country = company_country(session, company)?;
    let domain = country_domain(session.schema(), country);
    if let Some(template) = session
        .search(MODEL_CHART_TEMPLATE, &domain, Some(1), ctx)?
        .into_iter()
        .next()
    {
        return Ok(found(template, TemplateSource::CountrySearch));
    }

    for module in modules {
        let candidate = XmlId::chart_template_of(module);
        if let Some(template) = accept(xmlid::resolve(session, &candidate)) {
            return Ok(found(template, TemplateSource::ModuleConvention(module.clone())));
        }
    }

    if let Some(template) = accept(xmlid::resolve(session, GENERIC_CHART_TEMPLATE)) {
        return Ok(found(template, TemplateSource::GenericIdentifier));
    }
    if let Some(template) = session
        .search(MODEL_CHART_TEMPLATE, &Domain::all(), Some(1), ctx)?
        .into_iter()
        .next()
    {
        return Ok(found(template, TemplateSource::AnyTemplate));
    }

    Err(L10nError::ChartTemplateNotFound)
}

fn found(template: Record, source: TemplateSource) -> ResolvedTemplate {
    info!(%template, %source, "chart template resolved");
    ResolvedTemplate { template, source }
}
