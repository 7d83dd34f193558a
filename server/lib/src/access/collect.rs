//! Gathering the ACI tuples that govern a target.
//!
//! Prescriptive ACI lives on the subentries of an access control administrative
//! area, and is cached per area as [`AdminAreaAci`]. Entry ACI and subentry ACI
//! are read from the directory on each collection since they belong to a single
//! entry.

use hashbrown::HashMap;
use std::str::FromStr;

use super::AccessControlsContext;
use crate::aci::AciParser;
use crate::prelude::*;

/// An ACI item loaded from the `prescriptiveACI` of a subentry, along with the
/// scope that subentry gives it.
#[derive(Debug, Clone)]
pub struct AciItemContext {
    pub identification_tag: String,
    pub precedence: u8,
    pub subentry_dn: Dn,
    pub subtree_specification: SubtreeSpecification,
    pub tuples: Arc<[AciTuple]>,
}

/// The prescriptive ACI of one administrative area.
#[derive(Debug, Clone)]
pub struct AdminAreaAci {
    pub admin_point: Dn,
    pub items: Vec<AciItemContext>,
}

pub type AdminAreaMap = HashMap<Dn, Arc<AdminAreaAci>>;

/// The tuples collected for one target. Groups are shared with the cache, so
/// building a set never copies a tuple.
#[derive(Debug, Clone, Default)]
pub(crate) struct TupleSet {
    groups: Vec<Arc<[AciTuple]>>,
}

impl TupleSet {
    pub fn push(&mut self, group: Arc<[AciTuple]>) {
        if !group.is_empty() {
            self.groups.push(group)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AciTuple> {
        self.groups.iter().flat_map(|g| g.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }
}

/// Parse and expand a set of stored ACI values. Values that fail to parse are
/// logged and contribute no tuples.
pub(crate) fn tuples_from_values(
    parser: &dyn AciParser,
    source: &Dn,
    attr: &str,
    values: &[String],
) -> Vec<AciTuple> {
    values
        .iter()
        .filter_map(|v| match parser.parse(v) {
            Ok(item) => Some(item.to_tuples()),
            Err(e) => {
                aci_error!(?e, dn = %source, %attr, "ignoring malformed aci item");
                None
            }
        })
        .flatten()
        .collect()
}

/// Read the scope of a subentry. A subentry with no subtree specification
/// covers the whole of its area.
fn subentry_scope(subentry: &Entry) -> Result<SubtreeSpecification, OperationError> {
    match subentry.get_ava(ATTR_SUBTREE_SPECIFICATION) {
        None | Some([]) => Ok(SubtreeSpecification::whole_subtree()),
        Some([spec]) => SubtreeSpecification::from_str(spec),
        Some([spec, ..]) => {
            aci_warn!(dn = %subentry.get_dn(), "multiple subtree specifications, using the first");
            SubtreeSpecification::from_str(spec)
        }
    }
}

/// Build the prescriptive ACI of the area rooted at `admin_point` from the
/// subentries the store holds for it.
#[instrument(level = "debug", name = "access::build_admin_area", skip(context))]
pub(crate) fn build_admin_area(context: &AccessControlsContext, admin_point: &Dn) -> AdminAreaAci {
    let mut items = Vec::new();

    for subentry in context.store.list_subentries(admin_point) {
        let Some(values) = subentry.get_ava(ATTR_PRESCRIPTIVE_ACI) else {
            continue;
        };

        let subtree_specification = match subentry_scope(&subentry) {
            Ok(s) => s,
            Err(e) => {
                aci_error!(?e, dn = %subentry.get_dn(), "subentry has an invalid subtree specification, ignoring its aci");
                continue;
            }
        };

        for v in values {
            match context.parser.parse(v) {
                Ok(item) => {
                    let tuples: Arc<[AciTuple]> = Arc::from(item.to_tuples());
                    aci_trace!(tag = %item.identification_tag, count = tuples.len(), dn = %subentry.get_dn(), "loaded prescriptive aci");
                    items.push(AciItemContext {
                        identification_tag: item.identification_tag,
                        precedence: item.precedence,
                        subentry_dn: subentry.get_dn().clone(),
                        subtree_specification: subtree_specification.clone(),
                        tuples,
                    });
                }
                Err(e) => {
                    aci_error!(?e, dn = %subentry.get_dn(), "ignoring malformed prescriptive aci item");
                }
            }
        }
    }

    AdminAreaAci {
        admin_point: admin_point.clone(),
        items,
    }
}

/// Collect every tuple that governs `target_dn`.
///
/// `target_entry` is the entry as it is, or as it will be for an add. When not
/// given it is fetched from the store.
pub(crate) fn collect_tuples(
    context: &AccessControlsContext,
    areas: &AdminAreaMap,
    target_dn: &Dn,
    target_entry: Option<&Entry>,
) -> TupleSet {
    let fetched;
    let target_entry = match target_entry {
        Some(e) => Some(e),
        None => {
            fetched = context.store.fetch_entry(target_dn);
            fetched.as_deref()
        }
    };

    let mut set = TupleSet::default();

    if let Some(entry) = target_entry {
        if let Some(values) = entry.get_ava(ATTR_ENTRY_ACI) {
            set.push(Arc::from(tuples_from_values(
                context.parser.as_ref(),
                target_dn,
                ATTR_ENTRY_ACI,
                values,
            )));
        }
    }

    // Subentries are governed by the subentry ACI of their administrative
    // point, not by the prescriptive ACI of the area.
    if target_entry.map(|e| e.is_subentry()).unwrap_or(false) {
        if let Some(admin_point) = target_dn.parent() {
            if let Some(ap_entry) = context.store.fetch_entry(&admin_point) {
                if let Some(values) = ap_entry.get_ava(ATTR_SUBENTRY_ACI) {
                    set.push(Arc::from(tuples_from_values(
                        context.parser.as_ref(),
                        &admin_point,
                        ATTR_SUBENTRY_ACI,
                        values,
                    )));
                }
            }
        }
        return set;
    }

    // An administrative point is also within the scope of its own subentry
    // ACI.
    if let Some(entry) = target_entry {
        if context.admin_points.is_access_control_area(target_dn) {
            if let Some(values) = entry.get_ava(ATTR_SUBENTRY_ACI) {
                set.push(Arc::from(tuples_from_values(
                    context.parser.as_ref(),
                    target_dn,
                    ATTR_SUBENTRY_ACI,
                    values,
                )));
            }
        }
    }

    let object_classes = target_entry.map(|e| e.object_classes());

    let mut cursor = Some(target_dn.clone());
    // Each step moves strictly upward, so this can not run longer than the
    // depth of the target.
    for _ in 0..=target_dn.len() {
        let Some(admin_point) = cursor
            .as_ref()
            .and_then(|c| context.admin_points.find_nearest_admin_point(c))
        else {
            break;
        };

        let built;
        let area = match areas.get(&admin_point) {
            Some(area) => area.as_ref(),
            None => {
                built = build_admin_area(context, &admin_point);
                &built
            }
        };

        for item in area.items.iter() {
            if item
                .subtree_specification
                .contains(&admin_point, target_dn, object_classes.as_ref())
            {
                set.push(item.tuples.clone());
            }
        }

        if context.admin_points.is_inner_area(&admin_point) {
            cursor = admin_point.parent();
        } else {
            break;
        }
    }

    perf_trace!(dn = %target_dn, tuples = set.len(), "collected aci tuples");
    set
}

#[cfg(test)]
mod tests {
    use super::{build_admin_area, collect_tuples, tuples_from_values, AdminAreaMap};
    use crate::aci::JsonAciParser;
    use crate::prelude::*;
    use crate::testkit::*;

    #[test]
    fn test_collect_malformed_aci_is_ignored() {
        sketching::test_init();
        let dn = dn!("ou=testou,ou=system");
        let values = vec![
            "{ this is not an aci".to_string(),
            aci_all_users("good", 10, &["entry"], &["grantRead"]),
        ];
        let tuples = tuples_from_values(&JsonAciParser, &dn, ATTR_ENTRY_ACI, &values);
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].identification_tag.as_ref(), "good");
    }

    #[test]
    fn test_collect_scopes() {
        sketching::test_init();
        let tk = TestKit::new();
        tk.add_entries(vec![
            entry_init!("ou=system", ("objectClass", "organizationalUnit")),
            entry_init!("ou=users,ou=system", ("objectClass", "organizationalUnit")),
            entry_init!("uid=billyd,ou=users,ou=system", ("objectClass", "person")),
            entry_init!("ou=groups,ou=system", ("objectClass", "organizationalUnit")),
        ]);
        tk.make_specific_area("ou=system");
        tk.add_subentry(
            "cn=users-only,ou=system",
            Some(r#"{ base "ou=users" }"#),
            &[aci_all_users("users", 10, &["entry"], &["grantRead"])],
        );
        tk.add_subentry(
            "cn=everywhere,ou=system",
            None,
            &[aci_all_users("all", 10, &["entry"], &["grantBrowse"])],
        );

        let ctx = tk.context();
        let areas = AdminAreaMap::new();

        let under_users = collect_tuples(
            &ctx,
            &areas,
            &dn!("uid=billyd,ou=users,ou=system"),
            None,
        );
        let tags: BTreeSet<_> = under_users
            .iter()
            .map(|t| t.identification_tag.to_string())
            .collect();
        assert_eq!(tags, btreeset!["users".to_string(), "all".to_string()]);

        let under_groups =
            collect_tuples(&ctx, &areas, &dn!("ou=groups,ou=system"), None);
        assert_eq!(under_groups.len(), 1);

        // The area is the same whether built on demand or taken from a cache.
        let area = build_admin_area(&ctx, &dn!("ou=system"));
        assert_eq!(area.items.len(), 2);
    }

    #[test]
    fn test_collect_inner_area_accumulates() {
        sketching::test_init();
        let tk = TestKit::new();
        tk.add_entries(vec![
            entry_init!("ou=system", ("objectClass", "organizationalUnit")),
            entry_init!("ou=users,ou=system", ("objectClass", "organizationalUnit")),
            entry_init!("uid=billyd,ou=users,ou=system", ("objectClass", "person")),
        ]);
        tk.make_specific_area("ou=system");
        tk.add_subentry(
            "cn=outer,ou=system",
            None,
            &[aci_all_users("outer", 1, &["entry"], &["grantBrowse"])],
        );
        tk.make_inner_area("ou=users,ou=system");
        tk.add_subentry(
            "cn=inner,ou=users,ou=system",
            None,
            &[aci_all_users("inner", 1, &["entry"], &["grantRead"])],
        );

        let ctx = tk.context();
        let set = collect_tuples(
            &ctx,
            &AdminAreaMap::new(),
            &dn!("uid=billyd,ou=users,ou=system"),
            None,
        );
        let tags: BTreeSet<_> = set.iter().map(|t| t.identification_tag.to_string()).collect();
        assert_eq!(tags, btreeset!["outer".to_string(), "inner".to_string()]);
    }

    #[test]
    fn test_collect_subentry_and_entry_aci() {
        sketching::test_init();
        let tk = TestKit::new();
        tk.add_entries(vec![entry_init!(
            "ou=system",
            ("objectClass", "organizationalUnit"),
            (
                "subentryACI",
                &aci_all_users("protect-subentries", 1, &["entry"], &["grantRead"])
            )
        )]);
        tk.make_specific_area("ou=system");
        tk.add_subentry(
            "cn=acs,ou=system",
            None,
            &[aci_all_users("prescriptive", 1, &["entry"], &["grantBrowse"])],
        );
        tk.add_entries(vec![entry_init!(
            "ou=local,ou=system",
            ("objectClass", "organizationalUnit"),
            (
                "entryACI",
                &aci_all_users("local", 1, &["entry"], &["grantCompare"])
            )
        )]);

        let ctx = tk.context();
        let areas = AdminAreaMap::new();

        let subentry = collect_tuples(&ctx, &areas, &dn!("cn=acs,ou=system"), None);
        let tags: BTreeSet<_> = subentry.iter().map(|t| t.identification_tag.to_string()).collect();
        assert_eq!(tags, btreeset!["protect-subentries".to_string()]);

        let admin_point = collect_tuples(&ctx, &areas, &dn!("ou=system"), None);
        let tags: BTreeSet<_> = admin_point
            .iter()
            .map(|t| t.identification_tag.to_string())
            .collect();
        assert_eq!(
            tags,
            btreeset!["protect-subentries".to_string(), "prescriptive".to_string()]
        );

        let local = collect_tuples(&ctx, &areas, &dn!("ou=local,ou=system"), None);
        let tags: BTreeSet<_> = local.iter().map(|t| t.identification_tag.to_string()).collect();
        assert_eq!(
            tags,
            btreeset!["local".to_string(), "prescriptive".to_string()]
        );
    }
}
