use super::decision::Evaluator;
use super::{EvaluationRequest, Verdict};
use crate::prelude::*;

/// How much of one attribute a requester may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeVisibility {
    Hidden,
    Visible,
    /// Only the values at these indices, counted in the order the entry holds
    /// them.
    ValuesPartiallyVisible(BTreeSet<usize>),
}

/// The result of read filtering an entry for one requester. Attributes are keyed
/// by the lowercased name the entry holds them under. An attribute with no
/// mapping is hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityMask {
    pub entry_disclosed: bool,
    pub dn_disclosed: bool,
    pub attributes: BTreeMap<AttrString, AttributeVisibility>,
}

impl VisibilityMask {
    /// A mask that discloses the whole of `entry`.
    pub(super) fn everything(entry: &Entry) -> Self {
        VisibilityMask {
            entry_disclosed: true,
            dn_disclosed: true,
            attributes: entry
                .attr_names()
                .map(|k| (k.clone(), AttributeVisibility::Visible))
                .collect(),
        }
    }

    pub fn get(&self, attr: &str) -> &AttributeVisibility {
        self.attributes
            .get(attr.to_lowercase().as_str())
            .unwrap_or(&AttributeVisibility::Hidden)
    }
}

fn attribute_visibility(
    ev: &Evaluator,
    ident: &Identity,
    entry: &Entry,
    attr: &str,
    values: &[String],
) -> AttributeVisibility {
    let req = EvaluationRequest::new(ident, MicroOperations::READ, entry.get_dn())
        .with_entry(entry)
        .with_attribute(attr);

    if ev.decide(&req) == Verdict::Denied {
        return AttributeVisibility::Hidden;
    }

    if !ev.has_value_restrictions(&req) {
        return AttributeVisibility::Visible;
    }

    let visible: BTreeSet<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| ev.decide_value_read(&req.clone().with_value(v)) == Verdict::Allowed)
        .map(|(i, _)| i)
        .collect();

    if visible.len() == values.len() {
        AttributeVisibility::Visible
    } else if visible.is_empty() {
        AttributeVisibility::Hidden
    } else {
        AttributeVisibility::ValuesPartiallyVisible(visible)
    }
}

pub(super) fn apply_search_access(ev: &Evaluator, ident: &Identity, entry: &Entry) -> VisibilityMask {
    let dn = entry.get_dn();
    let browse = EvaluationRequest::new(ident, MicroOperations::BROWSE, dn).with_entry(entry);
    let return_dn = EvaluationRequest::new(ident, MicroOperations::RETURN_DN, dn).with_entry(entry);

    let entry_disclosed = ev.decide(&browse) == Verdict::Allowed;
    let dn_disclosed = ev.decide(&return_dn) == Verdict::Allowed;

    if !entry_disclosed || !dn_disclosed {
        security_access!(%dn, entry_disclosed, dn_disclosed, "entry is not disclosed");
        return VisibilityMask {
            entry_disclosed,
            dn_disclosed,
            attributes: BTreeMap::new(),
        };
    }

    let attributes = entry
        .attrs()
        .map(|(k, vs)| (k.clone(), attribute_visibility(ev, ident, entry, k, vs)))
        .collect();

    VisibilityMask {
        entry_disclosed,
        dn_disclosed,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeVisibility, VisibilityMask};
    use crate::prelude::*;

    #[test]
    fn test_visibility_mask_lookup() {
        let e = entry_init!("ou=testou,ou=system", ("ou", "testou"), ("cn", "a"));
        let everything = VisibilityMask::everything(&e);
        assert_eq!(everything.get("OU"), &AttributeVisibility::Visible);
        assert_eq!(everything.get("mail"), &AttributeVisibility::Hidden);
        assert_eq!(e.reduce_attributes(&everything).as_ref(), Some(&e));
        let dn_hidden = VisibilityMask {
            dn_disclosed: false,
            ..everything
        };
        assert!(e.reduce_attributes(&dn_hidden).is_none());
    }
}
