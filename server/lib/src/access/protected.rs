use crate::prelude::*;
use crate::schema::attribute_is_or_descends_from;
use std::str::FromStr;

/// What a single decision is about. Built once per decision and shared by
/// every protected item that is tested.
pub(super) struct TargetContext<'a> {
    pub schema: &'a dyn SchemaOracle,
    pub filter: &'a dyn FilterEvaluator,
    pub max_depth: usize,
    pub principal: &'a Dn,
    pub target_dn: &'a Dn,
    pub target_entry: Option<&'a Entry>,
    /// The attribute as the request named it.
    pub attribute: Option<&'a str>,
    /// The attribute resolved through schema. `None` when the request names no
    /// attribute, or names one schema does not know.
    pub attribute_id: Option<AttributeTypeId>,
    pub value: Option<&'a str>,
}

impl<'a> TargetContext<'a> {
    fn is_entry_level(&self) -> bool {
        self.attribute.is_none()
    }

    /// Is the requested attribute one of `names` or a sub-type of one of them.
    /// Names that do not resolve are skipped.
    fn attribute_in(&self, names: &mut dyn Iterator<Item = &AttrString>) -> bool {
        let Some(id) = self.attribute_id.as_ref() else {
            return false;
        };
        names.any(|name| match self.schema.resolve_attribute_type(name) {
            Some(listed) => {
                attribute_is_or_descends_from(self.schema, id, &listed, self.max_depth)
            }
            None => {
                aci_trace!(attr = %name, "protected item names an unknown attribute type");
                false
            }
        })
    }

    fn normalised_value(&self, raw: &str) -> Option<String> {
        let id = self.attribute_id.as_ref()?;
        self.schema.normalize_value(id, raw).ok()
    }

    fn is_user_attribute(&self) -> bool {
        self.attribute_id
            .as_ref()
            .map(|id| !self.schema.is_operational(id))
            .unwrap_or(false)
    }
}

/// Does a protected item cover the target of a decision?
pub(super) fn protected_item_applies(item: &ProtectedItem, t: &TargetContext) -> bool {
    match item {
        ProtectedItem::Entry => t.is_entry_level(),
        ProtectedItem::AllUserAttributeTypes => t.value.is_none() && t.is_user_attribute(),
        ProtectedItem::AllUserAttributeTypesAndValues => t.is_user_attribute(),
        ProtectedItem::AttributeType(names) => t.attribute_in(&mut names.iter()),
        ProtectedItem::AllAttributeValues(names) => t.attribute_in(&mut names.iter()),
        ProtectedItem::SelfValue(names) => {
            let Some(value) = t.value else {
                return false;
            };
            t.attribute_in(&mut names.iter())
                && Dn::from_str(value)
                    .map(|v| &v == t.principal && !v.is_root())
                    .unwrap_or(false)
        }
        ProtectedItem::AttributeValue(avas) => {
            let Some(value) = t.value.and_then(|v| t.normalised_value(v)) else {
                return false;
            };
            avas.iter().any(|ava| {
                t.attribute_in(&mut std::iter::once(&ava.attr))
                    && t.normalised_value(&ava.value).as_ref() == Some(&value)
            })
        }
        ProtectedItem::MaxValueCount(items) => t.attribute_in(&mut items.iter().map(|i| &i.attr)),
        ProtectedItem::MaxImmSub(_) => t.is_entry_level(),
        ProtectedItem::RestrictedBy(items) => {
            let (Some(value), Some(entry)) = (t.value, t.target_entry) else {
                return false;
            };
            items.iter().any(|rb| {
                t.attribute_in(&mut std::iter::once(&rb.attr))
                    && entry_holds_value(t, entry, &rb.values_in, value)
            })
        }
        // Decided by the target entry, so every value of the attribute shares
        // the verdict of its type.
        ProtectedItem::RangeOfValues(filter) => {
            !t.is_entry_level()
                && t.target_entry
                    .map(|e| t.filter.matches(filter, e))
                    .unwrap_or(false)
        }
        ProtectedItem::Classes(refinement) => {
            t.is_entry_level()
                && t.target_entry
                    .map(|e| refinement.matches(&e.object_classes()))
                    .unwrap_or(false)
        }
    }
}

/// Does `entry` hold `value` in the attribute named `values_in`? The value is
/// compared under the syntax of `values_in`.
fn entry_holds_value(t: &TargetContext, entry: &Entry, values_in: &AttrString, value: &str) -> bool {
    let Some(in_id) = t.schema.resolve_attribute_type(values_in) else {
        return false;
    };
    let Ok(wanted) = t.schema.normalize_value(&in_id, value) else {
        return false;
    };
    entry
        .attrs()
        .filter(|(name, _)| t.schema.resolve_attribute_type(name).as_ref() == Some(&in_id))
        .flat_map(|(_, vs)| vs.iter())
        .any(|v| t.schema.normalize_value(&in_id, v).ok().as_ref() == Some(&wanted))
}

/// Would `resulting_count` values of the target attribute break a
/// `maxValueCount` carried by this item?
pub(super) fn max_value_count_exceeded(
    item: &ProtectedItem,
    t: &TargetContext,
    resulting_count: usize,
) -> bool {
    match item {
        ProtectedItem::MaxValueCount(items) => items.iter().any(|mvc| {
            resulting_count > mvc.max_count && t.attribute_in(&mut std::iter::once(&mvc.attr))
        }),
        _ => false,
    }
}

/// Does this protected item restrict individual values of the target
/// attribute, so that reading the attribute needs a per-value decision?
pub(super) fn protected_item_is_value_scoped(item: &ProtectedItem, t: &TargetContext) -> bool {
    match item {
        ProtectedItem::AttributeValue(avas) => {
            t.attribute_in(&mut avas.iter().map(|a| &a.attr))
        }
        ProtectedItem::SelfValue(names) => t.attribute_in(&mut names.iter()),
        ProtectedItem::RestrictedBy(items) => t.attribute_in(&mut items.iter().map(|i| &i.attr)),
        ProtectedItem::Entry
        | ProtectedItem::AllUserAttributeTypes
        | ProtectedItem::AllUserAttributeTypesAndValues
        | ProtectedItem::AttributeType(_)
        | ProtectedItem::AllAttributeValues(_)
        | ProtectedItem::MaxValueCount(_)
        | ProtectedItem::MaxImmSub(_)
        | ProtectedItem::RangeOfValues(_)
        | ProtectedItem::Classes(_) => false,
    }
}
