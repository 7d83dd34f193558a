use super::decision::Evaluator;
use super::{EvaluationRequest, Verdict};
use crate::prelude::*;

/// A change of RDN needs `rename` on the entry. A move below a new superior
/// needs `export` on the entry where it is, and `import` on the entry as it
/// will be, decided by the ACI of its new location.
pub(super) fn apply_rename_access(
    ev: &Evaluator,
    new_location: Option<(&Evaluator, &Entry)>,
    ident: &Identity,
    entry: &Entry,
    new_dn: &Dn,
) -> Verdict {
    let dn = entry.get_dn();
    let rdn_changed = dn.rdn() != new_dn.rdn();

    if rdn_changed || new_location.is_none() {
        let req = EvaluationRequest::new(ident, MicroOperations::RENAME, dn).with_entry(entry);
        if !ev.permits(&req) {
            return Verdict::Denied;
        }
    }

    if let Some((new_ev, moved)) = new_location {
        let export = EvaluationRequest::new(ident, MicroOperations::EXPORT, dn).with_entry(entry);
        if !ev.permits(&export) {
            return Verdict::Denied;
        }
        let import =
            EvaluationRequest::new(ident, MicroOperations::IMPORT, new_dn).with_entry(moved);
        if !new_ev.permits(&import) {
            return Verdict::Denied;
        }
    }

    security_access!(%dn, %new_dn, "rename allowed ✅");
    Verdict::Allowed
}
