use super::decision::Evaluator;
use super::{EvaluationRequest, Verdict};
use crate::prelude::*;

pub(super) fn apply_delete_access(ev: &Evaluator, ident: &Identity, entry: &Entry) -> Verdict {
    let dn = entry.get_dn();
    let req = EvaluationRequest::new(ident, MicroOperations::REMOVE, dn).with_entry(entry);
    if ev.permits(&req) {
        security_access!(%dn, "delete allowed ✅");
        Verdict::Allowed
    } else {
        Verdict::Denied
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testkit::*;

    macro_rules! test_acp_delete {
        (
            $tk:expr,
            $ident:expr,
            $dn:expr,
            $expect:expr
        ) => {{
            let ac = $tk.access_controls(&AccessControlConfig::default());
            let acr = ac.read();
            let res = acr.delete_allow_operation($ident, &dn!($dn));
            debug!("result --> {:?}", res);
            debug!("expect --> {:?}", $expect);
            assert_eq!(res, $expect);
        }};
    }

    #[test]
    fn test_delete_this_entry() {
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        let other = tk.add_user("other", &[]);
        tk.add_subentry(
            "cn=self-delete,ou=system",
            None,
            &[
                aci_user_class(
                    "self-delete",
                    1,
                    r#""thisEntry""#,
                    &["entry"],
                    &["grantRemove"],
                ),
            ],
        );

        test_acp_delete!(tk, &billyd, "uid=billyd,ou=users,ou=system", Ok(()));
        test_acp_delete!(
            tk,
            &other,
            "uid=billyd,ou=users,ou=system",
            Err(OperationError::NoPermission)
        );
        // Removal is decided on the entry alone, not its attributes.
        test_acp_delete!(
            tk,
            &billyd,
            "uid=other,ou=users,ou=system",
            Err(OperationError::NoPermission)
        );
    }

    #[test]
    fn test_delete_missing_entry() {
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_subentry(
            "cn=browse,ou=system",
            None,
            &[aci_all_users("browse", 1, &["entry"], &["grantBrowse"])],
        );
        test_acp_delete!(
            tk,
            &billyd,
            "ou=missing,ou=users,ou=system",
            Err(OperationError::NoSuchObject {
                matched: "ou=users,ou=system".to_string()
            })
        );
    }
}
