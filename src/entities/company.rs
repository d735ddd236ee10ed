// 🏢 Company Selection - the main company if the platform designates one, else the first

use tracing::debug;

use crate::error::{L10nError, StoreResult};
use crate::schema::MODEL_COMPANY;
use crate::store::{Domain, Record, RequestContext, Session};

pub fn select_company<S: Session + ?Sized>(
    session: &mut S,
    ctx: &RequestContext,
) -> StoreResult<Option<Record>> {
    if session.supports_main_company() {
        return session.main_company();
    }
    debug!("no main company accessor, taking first company");
    let first = session.search(MODEL_COMPANY, &Domain::all(), Some(1), ctx)?;
    Ok(first.into_iter().next())
}

/// Like `select_company`, but a tenant without companies is fatal
pub fn require_company<S: Session + ?Sized>(
    session: &mut S,
    ctx: &RequestContext,
) -> Result<Record, L10nError> {
    select_company(session, ctx)?.ok_or(L10nError::NoCompany)
}
