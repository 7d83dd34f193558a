use crate::prelude::*;

/// Does `uc` select the requesting principal, for an operation on `target_dn`?
///
/// The anonymous principal (named by the root DN) is only ever selected by
/// `allUsers`.
pub(super) fn user_class_matches(
    uc: &UserClass,
    user: &IdentUser,
    target_dn: &Dn,
    store: &dyn EntryStore,
) -> bool {
    if user.dn.is_root() {
        return matches!(uc, UserClass::AllUsers);
    }

    match uc {
        UserClass::AllUsers => true,
        UserClass::ThisEntry => user.dn == *target_dn,
        UserClass::ParentOfEntry => user.dn.is_immediate_superior_of(target_dn),
        UserClass::Name(names) => names.contains(&user.dn),
        UserClass::UserGroup(groups) => !groups.is_disjoint(&user.groups),
        UserClass::Subtree(specs) => {
            // Refinements are evaluated against the principal's own entry.
            let object_classes = if specs.iter().any(|s| s.specification_filter.is_some()) {
                store.fetch_entry(&user.dn).map(|e| e.object_classes())
            } else {
                None
            };
            specs
                .iter()
                .any(|s| s.contains(&Dn::root(), &user.dn, object_classes.as_ref()))
        }
    }
}
