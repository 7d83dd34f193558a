//! Modify access. A modify request needs `modify` on the entry, then each
//! change in the list is checked in order against the entry as the previous
//! changes have left it:
//!
//! - adding values needs `add` on each value, and on the attribute type when
//!   the entry does not yet hold it,
//! - removing values needs `remove` on each value, and on the attribute type
//!   when none are left,
//! - replacing is a removal of every existing value followed by an add of
//!   the new ones.
//!
//! Value counts given to `maxValueCount` are those after the change.

use super::decision::Evaluator;
use super::{EvaluationRequest, Verdict};
use crate::prelude::*;

struct ModifyCheck<'a, 'e> {
    ev: &'a Evaluator<'a>,
    ident: &'a Identity,
    original: &'e Entry,
}

impl<'a, 'e> ModifyCheck<'a, 'e> {
    fn request<'r>(&'r self, op: MicroOperations, attr: &'r str) -> EvaluationRequest<'r> {
        EvaluationRequest::new(self.ident, op, self.original.get_dn())
            .with_entry(self.original)
            .with_attribute(attr)
    }

    fn add_values(&self, attr: &str, values: &[String], had_type: bool, count: usize) -> bool {
        let req = self
            .request(MicroOperations::ADD, attr)
            .with_resulting_value_count(count);
        if !had_type && !self.ev.permits(&req) {
            return false;
        }
        values
            .iter()
            .all(|v| self.ev.permits(&req.clone().with_value(v)))
    }

    fn remove_values(&self, attr: &str, values: &[String], drops_type: bool) -> bool {
        let req = self.request(MicroOperations::REMOVE, attr);
        if !values
            .iter()
            .all(|v| self.ev.permits(&req.clone().with_value(v)))
        {
            return false;
        }
        !drops_type || self.ev.permits(&req)
    }

    fn check(&self, m: &Modify, working: &Entry) -> bool {
        let attr = m.attr();
        let existing: Vec<String> = working.get_ava(attr).map(|vs| vs.to_vec()).unwrap_or_default();
        let had_type = !existing.is_empty();

        let mut after = working.clone();
        m.apply_to(&mut after);
        let count = after.get_ava(attr).map(|vs| vs.len()).unwrap_or(0);

        match m {
            Modify::Add(_, values) => self.add_values(attr, values, had_type, count),
            Modify::Remove(_, values) => {
                let values = if values.is_empty() { &existing } else { values };
                self.remove_values(attr, values, had_type && count == 0)
            }
            Modify::Replace(_, values) => {
                self.remove_values(attr, &existing, had_type && count == 0)
                    && (values.is_empty() || self.add_values(attr, values, had_type, count))
            }
        }
    }
}

pub(super) fn apply_modify_access(
    ev: &Evaluator,
    ident: &Identity,
    entry: &Entry,
    modlist: &ModifyList,
) -> Verdict {
    let dn = entry.get_dn();
    let envelope = EvaluationRequest::new(ident, MicroOperations::MODIFY, dn).with_entry(entry);
    if !ev.permits(&envelope) {
        return Verdict::Denied;
    }

    let check = ModifyCheck {
        ev,
        ident,
        original: entry,
    };

    let mut working = entry.clone();
    for m in modlist.iter() {
        if !check.check(m, &working) {
            security_access!(%dn, attr = %m.attr(), "modification denied");
            return Verdict::Denied;
        }
        m.apply_to(&mut working);
    }

    security_access!(%dn, mods = modlist.len(), "modify allowed ✅");
    Verdict::Allowed
}
