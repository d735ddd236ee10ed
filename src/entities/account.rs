// 💳 Accounts - presence for the company means a chart was already loaded

use crate::error::StoreResult;
use crate::schema::MODEL_ACCOUNT;
use crate::store::{Domain, Record, RequestContext, Session};

/// False when the account model is not even known to this session.
/// Counts per company when accounts carry a company, otherwise globally.
pub fn accounts_exist<S: Session + ?Sized>(
    session: &mut S,
    company: &Record,
    ctx: &RequestContext,
) -> StoreResult<bool> {
    if !session.schema().has_model(MODEL_ACCOUNT) {
        return Ok(false);
    }
    let domain = if session.schema().has_field(MODEL_ACCOUNT, "company_id") {
        Domain::all().eq("company_id", company.id)
    } else {
        Domain::all()
    };
    Ok(session.search_count(MODEL_ACCOUNT, &domain, ctx)? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Platform;
    use crate::test_support::{seeded_platform, values};
    use serde_json::json;

    #[test]
    fn test_no_account_model_means_no_accounts() {
        let (_dir, platform) = seeded_platform(&[]);
        let mut session = platform.open_session("shop").unwrap();
        let company = session.main_company().unwrap().unwrap();

        assert!(!accounts_exist(&mut session, &company, &RequestContext::superuser()).unwrap());
    }

    #[test]
    fn test_accounts_counted_per_company() {
        let (_dir, platform) = seeded_platform(&["account"]);
        let mut session = platform.open_session("shop").unwrap();
        let ctx = RequestContext::superuser();
        let company = session.main_company().unwrap().unwrap();
        let other = session
            .create("res.company", &values(json!({"name": "Other", "sequence": 20})))
            .unwrap();

        session
            .create(
                MODEL_ACCOUNT,
                &values(json!({"code": "101000", "name": "Capital", "company_id": other.id})),
            )
            .unwrap();
        assert!(!accounts_exist(&mut session, &company, &ctx).unwrap());
        assert!(accounts_exist(&mut session, &other, &ctx).unwrap());
    }
}
