use super::decision::Evaluator;
use super::{EvaluationRequest, Verdict};
use crate::prelude::*;

/// A compare needs `read` on the entry and `compare` on both the attribute
/// type and the asserted value.
pub(super) fn apply_compare_access(
    ev: &Evaluator,
    ident: &Identity,
    entry: &Entry,
    attr: &str,
    value: &str,
) -> Verdict {
    let dn = entry.get_dn();
    let read = EvaluationRequest::new(ident, MicroOperations::READ, dn).with_entry(entry);
    let on_type = EvaluationRequest {
        operation: MicroOperations::COMPARE,
        ..read.clone()
    }
    .with_attribute(attr);
    let on_value = on_type.clone().with_value(value);

    if ev.permits(&read) && ev.permits(&on_type) && ev.permits(&on_value) {
        security_access!(%dn, %attr, "compare allowed ✅");
        Verdict::Allowed
    } else {
        Verdict::Denied
    }
}
