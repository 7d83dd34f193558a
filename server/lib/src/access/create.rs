use super::decision::Evaluator;
use super::{EvaluationRequest, Verdict};
use crate::prelude::*;

/// An add needs `add` on the new entry, on every attribute type it holds and
/// on every value. Value counts are checked against `maxValueCount` as the
/// entry will be stored.
pub(super) fn apply_create_access(ev: &Evaluator, ident: &Identity, entry: &Entry) -> Verdict {
    let dn = entry.get_dn();
    let base = EvaluationRequest::new(ident, MicroOperations::ADD, dn).with_entry(entry);

    if !ev.permits(&base) {
        return Verdict::Denied;
    }

    for (attr, values) in entry.attrs() {
        let attr_req = base
            .clone()
            .with_attribute(attr)
            .with_resulting_value_count(values.len());
        if !ev.permits(&attr_req) {
            return Verdict::Denied;
        }
        for v in values {
            if !ev.permits(&attr_req.clone().with_value(v)) {
                return Verdict::Denied;
            }
        }
    }

    security_access!(%dn, "create allowed ✅");
    Verdict::Allowed
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testkit::*;

    macro_rules! test_acp_create {
        (
            $tk:expr,
            $ident:expr,
            $entry:expr,
            $expect:expr
        ) => {{
            let ac = $tk.access_controls(&AccessControlConfig::default());
            let acr = ac.read();
            let res = acr.create_allow_operation($ident, &$entry);
            debug!("result --> {:?}", res);
            debug!("expect --> {:?}", $expect);
            assert_eq!(res, $expect);
        }};
    }

    fn test_ou() -> Entry {
        entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou"),
            ("description", "one"),
            ("description", "two")
        )
    }

    #[test]
    fn test_create_attribute_and_value_checks() {
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_subentry(
            "cn=adders,ou=system",
            None,
            &[
                aci_all_users(
                    "add-some",
                    1,
                    &[
                        "entry",
                        r#"{ "attributeType": [ "objectClass", "ou" ] }"#,
                        r#"{ "allAttributeValues": [ "objectClass", "ou" ] }"#,
                    ],
                    &["grantAdd"],
                ),
                aci_all_users(
                    "no-secret-description",
                    2,
                    &[r#"{ "attributeValue": [ { "type": "description", "value": "secret" } ] }"#],
                    &["denyAdd"],
                ),
            ],
        );

        // description is not covered.
        test_acp_create!(tk, &billyd, test_ou(), Err(OperationError::NoPermission));

        test_acp_create!(
            tk,
            &billyd,
            entry_init!(
                "ou=testou,ou=system",
                ("objectClass", "organizationalUnit"),
                ("ou", "testou")
            ),
            Ok(())
        );

        tk.add_subentry(
            "cn=describers,ou=system",
            None,
            &[aci_all_users(
                "add-description",
                1,
                &[r#"{ "attributeType": [ "description" ] }"#],
                &["grantAdd"],
            )],
        );
        test_acp_create!(tk, &billyd, test_ou(), Ok(()));

        let mut secret = test_ou();
        secret.add_ava("description", "Secret");
        test_acp_create!(tk, &billyd, secret, Err(OperationError::NoPermission));
    }

    #[test]
    fn test_create_limits() {
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_subentry(
            "cn=limited,ou=system",
            None,
            &[aci_all_users(
                "limited",
                1,
                &[
                    "entry",
                    "allUserAttributeTypesAndValues",
                    r#"{ "maxValueCount": [ { "type": "description", "maxCount": 1 } ] }"#,
                    r#"{ "maxImmSub": 3 }"#,
                ],
                &["grantAdd"],
            )],
        );

        // Two descriptions break the value count.
        test_acp_create!(tk, &billyd, test_ou(), Err(OperationError::NoPermission));

        let one = entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou"),
            ("description", "one")
        );
        // ou=system holds ou=users, ou=groups and the subentry.
        test_acp_create!(tk, &billyd, one.clone(), Err(OperationError::NoPermission));

        tk.add_subentry(
            "cn=more,ou=system",
            None,
            &[aci_all_users(
                "more",
                1,
                &["entry", r#"{ "maxImmSub": 10 }"#],
                &["grantAdd"],
            )],
        );
        // The tightest limit among the grants applies.
        test_acp_create!(tk, &billyd, one, Err(OperationError::NoPermission));

        let under_users = entry_init!(
            "ou=nested,ou=users,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "nested")
        );
        test_acp_create!(tk, &billyd, under_users, Ok(()));
    }
}
