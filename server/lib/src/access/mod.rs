//! Access control decisions for LDAP operations, following X.501 Basic Access
//! Control.
//!
//! To decide on a request we first collect the ACI tuples that govern the
//! target: the prescriptive ACI of the administrative areas containing it, the
//! entry's own entry ACI, and for subentries the subentry ACI of their
//! administrative point. Tuples are then filtered by authentication level,
//! user class, protected item and micro-operation, and the survivors are
//! resolved by precedence. Anything not granted is denied.
//!
//! Write operations are checked as a whole through the `*_allow_operation`
//! methods, which map to the series of micro-operations the operation implies.
//! Read operations are filtered per entry, producing a [`VisibilityMask`] that
//! is applied with [`Entry::reduce_attributes`].
//!
//! Prescriptive ACI is cached per administrative area in a copy on write cell.
//! Readers work from a snapshot, and the server must call
//! [`AccessControlsWriteTransaction::notify_change`] as part of any write that
//! touches an administrative point or subentry.

use concread::cowcell::*;

use self::collect::{build_admin_area, collect_tuples};
use self::decision::Evaluator;
use self::search::apply_search_access;
use crate::aci::AciParser;
use crate::prelude::*;

mod collect;
mod compare;
mod create;
mod decision;
mod delete;
mod modify;
mod protected;
mod rename;
pub(crate) mod search;
mod subject;

pub use self::collect::{AciItemContext, AdminAreaAci, AdminAreaMap};
pub use self::search::{AttributeVisibility, VisibilityMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
}

impl Verdict {
    /// Surface a denial as an insufficient access rights error. The error
    /// carries no detail of why.
    pub fn into_result(self) -> Result<(), OperationError> {
        match self {
            Verdict::Allowed => Ok(()),
            Verdict::Denied => Err(OperationError::NoPermission),
        }
    }
}

/// One question for the decision engine: may `ident` perform `operation` on
/// this target?
#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    pub ident: &'a Identity,
    pub operation: MicroOperations,
    pub target_dn: &'a Dn,
    /// When absent, the entry is fetched from the store.
    pub target_entry: Option<&'a Entry>,
    pub attribute: Option<&'a str>,
    pub value: Option<&'a str>,
    /// For additions, the number of values the attribute would hold after the
    /// change. Used to enforce `maxValueCount`.
    pub resulting_value_count: Option<usize>,
}

impl<'a> EvaluationRequest<'a> {
    pub fn new(ident: &'a Identity, operation: MicroOperations, target_dn: &'a Dn) -> Self {
        EvaluationRequest {
            ident,
            operation,
            target_dn,
            target_entry: None,
            attribute: None,
            value: None,
            resulting_value_count: None,
        }
    }

    pub fn with_entry(mut self, entry: &'a Entry) -> Self {
        self.target_entry = Some(entry);
        self
    }

    pub fn with_attribute(mut self, attr: &'a str) -> Self {
        self.attribute = Some(attr);
        self
    }

    pub fn with_value(mut self, value: &'a str) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_resulting_value_count(mut self, count: usize) -> Self {
        self.resulting_value_count = Some(count);
        self
    }
}

/// The collaborators access control consults. All are shared and read only.
#[derive(Clone)]
pub struct AccessControlsContext {
    pub schema: Arc<dyn SchemaOracle>,
    pub store: Arc<dyn EntryStore>,
    pub admin_points: Arc<dyn AdminPointRegistry>,
    pub filter: Arc<dyn FilterEvaluator>,
    pub parser: Arc<dyn AciParser>,
}

/// The configuration derived policy the engine applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub enabled: bool,
    pub bypass: BTreeSet<Dn>,
    pub specificity_tiebreak: bool,
    pub max_superior_depth: usize,
}

impl TryFrom<&AccessControlConfig> for AccessPolicy {
    type Error = OperationError;

    fn try_from(config: &AccessControlConfig) -> Result<Self, Self::Error> {
        Ok(AccessPolicy {
            enabled: config.enabled,
            bypass: config.bypass_dn_set()?,
            specificity_tiebreak: config.specificity_tiebreak,
            max_superior_depth: config.max_superior_depth,
        })
    }
}

pub struct AccessControls {
    context: AccessControlsContext,
    policy: CowCell<AccessPolicy>,
    areas: CowCell<AdminAreaMap>,
}

pub struct AccessControlsReadTransaction<'a> {
    context: &'a AccessControlsContext,
    policy: CowCellReadTxn<AccessPolicy>,
    areas: CowCellReadTxn<AdminAreaMap>,
}

pub struct AccessControlsWriteTransaction<'a> {
    context: &'a AccessControlsContext,
    policy: CowCellWriteTxn<'a, AccessPolicy>,
    areas: CowCellWriteTxn<'a, AdminAreaMap>,
}

/// Run `f` with an evaluator for `target_dn`, or return `None` if `ident`
/// bypasses access control.
fn with_evaluator<T, R, F>(
    txn: &T,
    ident: &Identity,
    target_dn: &Dn,
    target_entry: Option<&Entry>,
    f: F,
) -> Option<R>
where
    T: AccessControlsTransaction + ?Sized,
    F: FnOnce(&Evaluator) -> R,
{
    let user = txn.subject(ident)?;
    let tuples = collect_tuples(txn.get_context(), txn.get_areas(), target_dn, target_entry);
    let ev = Evaluator {
        context: txn.get_context(),
        policy: txn.get_policy(),
        user,
        tuples: &tuples,
    };
    Some(f(&ev))
}

pub trait AccessControlsTransaction {
    fn get_context(&self) -> &AccessControlsContext;
    fn get_policy(&self) -> &AccessPolicy;
    fn get_areas(&self) -> &AdminAreaMap;

    /// The principal access control applies to, or `None` if this identity
    /// bypasses it.
    fn subject<'i>(&self, ident: &'i Identity) -> Option<&'i IdentUser> {
        let policy = self.get_policy();
        match &ident.origin {
            IdentType::Internal => {
                trace!("Internal operation, bypassing access check");
                None
            }
            IdentType::User(_) if !policy.enabled => {
                trace!("Access control is disabled, bypassing access check");
                None
            }
            IdentType::User(u) if policy.bypass.contains(&u.dn) => {
                security_info!(dn = %u.dn, "bypassing access control");
                None
            }
            IdentType::User(u) => Some(u),
        }
    }

    /// Decide a request. Compound requests are allowed only if every
    /// micro-operation they carry is allowed.
    #[instrument(level = "debug", name = "access::decide", skip_all)]
    fn decide(&self, req: &EvaluationRequest) -> Verdict {
        let fetched = match req.target_entry {
            Some(_) => None,
            None => self.get_context().store.fetch_entry(req.target_dn),
        };
        let req = EvaluationRequest {
            target_entry: req.target_entry.or(fetched.as_deref()),
            ..req.clone()
        };

        let verdict = with_evaluator(self, req.ident, req.target_dn, req.target_entry, |ev| {
            ev.decide(&req)
        })
        .unwrap_or(Verdict::Allowed);

        security_access!(
            ident = %req.ident,
            dn = %req.target_dn,
            op = %req.operation,
            attr = ?req.attribute,
            ?verdict,
            "access decision"
        );
        verdict
    }

    /// As [`decide`](Self::decide), returning `NoPermission` on denial.
    fn check_permission(&self, req: &EvaluationRequest) -> Result<(), OperationError> {
        self.decide(req).into_result()
    }

    /// Work out which parts of `entry` are visible to `ident`.
    #[instrument(level = "debug", name = "access::compute_visibility_mask", skip_all)]
    fn compute_visibility_mask(&self, ident: &Identity, entry: &Entry) -> VisibilityMask {
        with_evaluator(self, ident, entry.get_dn(), Some(entry), |ev| {
            apply_search_access(ev, ident, entry)
        })
        .unwrap_or_else(|| VisibilityMask::everything(entry))
    }

    /// Reduce a search result to what `ident` may see. `None` means the entry
    /// must be omitted as though it did not exist.
    fn filter_search_result(&self, ident: &Identity, entry: &Entry) -> Option<Entry> {
        let mask = self.compute_visibility_mask(ident, entry);
        entry.reduce_attributes(&mask)
    }

    #[instrument(level = "debug", name = "access::filter_search_results", skip_all)]
    fn filter_search_results(&self, ident: &Identity, entries: &[Arc<Entry>]) -> Vec<Entry> {
        let allowed: Vec<Entry> = entries
            .iter()
            .filter_map(|e| self.filter_search_result(ident, e))
            .collect();
        security_access!(
            ident = %ident,
            candidates = entries.len(),
            returned = allowed.len(),
            "search results filtered"
        );
        allowed
    }

    /// Fetch a single entry on behalf of `ident`, reduced to what they may see.
    ///
    /// An entry that does not exist and an entry that may not be disclosed give
    /// the same `NoSuchObject` error, naming the nearest superior `ident` may
    /// know about. Only when `discloseOnError` is granted on a hidden entry is
    /// its existence admitted with `NoPermission`.
    #[instrument(level = "debug", name = "access::lookup_entry", skip_all)]
    fn lookup_entry(&self, ident: &Identity, dn: &Dn) -> Result<Entry, OperationError> {
        let no_such_object = || OperationError::NoSuchObject {
            matched: self.compute_matched_name(ident, dn).to_string(),
        };

        let entry = self
            .get_context()
            .store
            .fetch_entry(dn)
            .ok_or_else(no_such_object)?;

        if let Some(reduced) = self.filter_search_result(ident, &entry) {
            return Ok(reduced);
        }

        let disclose =
            EvaluationRequest::new(ident, MicroOperations::DISCLOSE_ON_ERROR, dn).with_entry(&entry);
        match self.decide(&disclose) {
            Verdict::Allowed => Err(OperationError::NoPermission),
            Verdict::Denied => Err(no_such_object()),
        }
    }

    /// The nearest existing superior of `dn` that `ident` may browse, or has
    /// `discloseOnError` on. The root DN if there is none.
    fn compute_matched_name(&self, ident: &Identity, dn: &Dn) -> Dn {
        for candidate in dn.ancestors() {
            if candidate.is_root() {
                break;
            }
            let Some(entry) = self.get_context().store.fetch_entry(&candidate) else {
                continue;
            };
            let browse =
                EvaluationRequest::new(ident, MicroOperations::BROWSE, &candidate).with_entry(&entry);
            let disclose = EvaluationRequest {
                operation: MicroOperations::DISCLOSE_ON_ERROR,
                ..browse.clone()
            };
            if self.decide(&browse) == Verdict::Allowed
                || self.decide(&disclose) == Verdict::Allowed
            {
                return candidate;
            }
        }
        Dn::root()
    }

    /// May `ident` add `entry`?
    #[instrument(level = "debug", name = "access::create_allow_operation", skip_all)]
    fn create_allow_operation(&self, ident: &Identity, entry: &Entry) -> Result<(), OperationError> {
        with_evaluator(self, ident, entry.get_dn(), Some(entry), |ev| {
            create::apply_create_access(ev, ident, entry)
        })
        .unwrap_or(Verdict::Allowed)
        .into_result()
    }

    #[instrument(level = "debug", name = "access::delete_allow_operation", skip_all)]
    fn delete_allow_operation(&self, ident: &Identity, dn: &Dn) -> Result<(), OperationError> {
        let entry = self.fetch_target(ident, dn)?;
        with_evaluator(self, ident, dn, Some(&entry), |ev| {
            delete::apply_delete_access(ev, ident, &entry)
        })
        .unwrap_or(Verdict::Allowed)
        .into_result()
    }

    #[instrument(level = "debug", name = "access::modify_allow_operation", skip_all)]
    fn modify_allow_operation(
        &self,
        ident: &Identity,
        dn: &Dn,
        modlist: &ModifyList,
    ) -> Result<(), OperationError> {
        let entry = self.fetch_target(ident, dn)?;
        with_evaluator(self, ident, dn, Some(&entry), |ev| {
            modify::apply_modify_access(ev, ident, &entry, modlist)
        })
        .unwrap_or(Verdict::Allowed)
        .into_result()
    }

    /// May `ident` rename `dn` to `new_rdn`, and move it below `new_superior`
    /// when one is given?
    #[instrument(level = "debug", name = "access::rename_allow_operation", skip_all)]
    fn rename_allow_operation(
        &self,
        ident: &Identity,
        dn: &Dn,
        new_rdn: &Rdn,
        new_superior: Option<&Dn>,
    ) -> Result<(), OperationError> {
        let entry = self.fetch_target(ident, dn)?;
        let old_superior = dn.parent().unwrap_or_else(Dn::root);
        let new_superior = match new_superior {
            Some(sup) if !sup.is_root() && !self.get_context().store.entry_exists(sup) => {
                return Err(OperationError::NoSuchObject {
                    matched: self.compute_matched_name(ident, sup).to_string(),
                });
            }
            Some(sup) => sup.clone(),
            None => old_superior.clone(),
        };
        let new_dn = new_superior.child(new_rdn.clone());
        let moved = new_superior != old_superior;
        let moved_entry = entry.with_dn(new_dn.clone());

        let Some(user) = self.subject(ident) else {
            return Ok(());
        };

        let context = self.get_context();
        let policy = self.get_policy();
        let old_tuples = collect_tuples(context, self.get_areas(), dn, Some(&entry));
        let old_ev = Evaluator {
            context,
            policy,
            user,
            tuples: &old_tuples,
        };

        let new_tuples;
        let new_ev;
        let new_location = if moved {
            new_tuples = collect_tuples(context, self.get_areas(), &new_dn, Some(&moved_entry));
            new_ev = Evaluator {
                context,
                policy,
                user,
                tuples: &new_tuples,
            };
            Some((&new_ev, &moved_entry))
        } else {
            None
        };

        rename::apply_rename_access(&old_ev, new_location, ident, &entry, &new_dn).into_result()
    }

    #[instrument(level = "debug", name = "access::compare_allow_operation", skip_all)]
    fn compare_allow_operation(
        &self,
        ident: &Identity,
        dn: &Dn,
        attr: &str,
        value: &str,
    ) -> Result<(), OperationError> {
        let entry = self.fetch_target(ident, dn)?;
        with_evaluator(self, ident, dn, Some(&entry), |ev| {
            compare::apply_compare_access(ev, ident, &entry, attr, value)
        })
        .unwrap_or(Verdict::Allowed)
        .into_result()
    }

    /// Fetch the existing target of an operation, or report it missing in the
    /// same way a lookup would.
    fn fetch_target(&self, ident: &Identity, dn: &Dn) -> Result<Arc<Entry>, OperationError> {
        self.get_context().store.fetch_entry(dn).ok_or_else(|| {
            security_info!(%dn, "operation target does not exist");
            OperationError::NoSuchObject {
                matched: self.compute_matched_name(ident, dn).to_string(),
            }
        })
    }
}

impl<'a> AccessControlsTransaction for AccessControlsReadTransaction<'a> {
    fn get_context(&self) -> &AccessControlsContext {
        self.context
    }

    fn get_policy(&self) -> &AccessPolicy {
        &self.policy
    }

    fn get_areas(&self) -> &AdminAreaMap {
        &self.areas
    }
}

impl<'a> AccessControlsTransaction for AccessControlsWriteTransaction<'a> {
    fn get_context(&self) -> &AccessControlsContext {
        self.context
    }

    fn get_policy(&self) -> &AccessPolicy {
        &self.policy
    }

    fn get_areas(&self) -> &AdminAreaMap {
        &self.areas
    }
}

impl<'a> AccessControlsWriteTransaction<'a> {
    pub fn update_policy(&mut self, config: &AccessControlConfig) -> Result<(), OperationError> {
        let policy = AccessPolicy::try_from(config)?;
        admin_info!(
            enabled = policy.enabled,
            bypass = policy.bypass.len(),
            specificity_tiebreak = policy.specificity_tiebreak,
            "updating access control policy"
        );
        *self.policy.get_mut() = policy;
        Ok(())
    }

    /// Load, or reload, the prescriptive ACI of the area at `admin_point`. A
    /// point that no longer holds an access control role is dropped from the
    /// cache.
    #[instrument(level = "debug", name = "access::load_area", skip(self))]
    pub fn load_area(&mut self, admin_point: &Dn) -> Result<(), OperationError> {
        if !self.context.store.entry_exists(admin_point) {
            admin_error!(dn = %admin_point, "administrative point does not exist");
            return Err(OperationError::InvalidAciState(format!(
                "administrative point {} does not exist",
                admin_point
            )));
        }

        if !self.context.admin_points.is_access_control_area(admin_point) {
            self.remove_area(admin_point);
            return Ok(());
        }

        let area = build_admin_area(self.context, admin_point);
        admin_info!(dn = %admin_point, items = area.items.len(), "loaded access control area");
        self.areas
            .get_mut()
            .insert(admin_point.clone(), Arc::new(area));
        Ok(())
    }

    pub fn remove_area(&mut self, admin_point: &Dn) -> bool {
        let removed = self.areas.get_mut().remove(admin_point).is_some();
        if removed {
            admin_info!(dn = %admin_point, "removed access control area");
        }
        removed
    }

    /// Rebuild every cached area from the store.
    pub fn reload(&mut self) -> Result<(), OperationError> {
        let cached: Vec<Dn> = self.areas.keys().cloned().collect();
        for admin_point in cached {
            if self.context.store.entry_exists(&admin_point) {
                self.load_area(&admin_point)?;
            } else {
                self.remove_area(&admin_point);
            }
        }
        Ok(())
    }

    /// Record that the entry at `dn` was added, changed or removed. If it is
    /// an administrative point, or a subentry of one, that area is reloaded.
    pub fn notify_change(&mut self, dn: &Dn) -> Result<(), OperationError> {
        let candidates = std::iter::once(dn.clone()).chain(dn.parent());
        for candidate in candidates {
            let relevant = self.areas.contains_key(&candidate)
                || self.context.admin_points.is_access_control_area(&candidate);
            if !relevant {
                continue;
            }
            if self.context.store.entry_exists(&candidate) {
                self.load_area(&candidate)?;
            } else {
                self.remove_area(&candidate);
            }
        }
        Ok(())
    }

    pub fn commit(self) -> Result<(), OperationError> {
        let AccessControlsWriteTransaction {
            context: _,
            policy,
            areas,
        } = self;
        policy.commit();
        areas.commit();
        Ok(())
    }
}

impl AccessControls {
    pub fn new(
        config: &AccessControlConfig,
        context: AccessControlsContext,
    ) -> Result<Self, OperationError> {
        let policy = AccessPolicy::try_from(config)?;
        Ok(AccessControls {
            context,
            policy: CowCell::new(policy),
            areas: CowCell::new(AdminAreaMap::new()),
        })
    }

    pub fn read(&self) -> AccessControlsReadTransaction<'_> {
        AccessControlsReadTransaction {
            context: &self.context,
            policy: self.policy.read(),
            areas: self.areas.read(),
        }
    }

    pub fn write(&self) -> AccessControlsWriteTransaction<'_> {
        AccessControlsWriteTransaction {
            context: &self.context,
            policy: self.policy.write(),
            areas: self.areas.write(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessControlsTransaction, AttributeVisibility, EvaluationRequest, Verdict};
    use crate::prelude::*;
    use crate::testkit::*;

    macro_rules! test_acp_decide {
        (
            $tk:expr,
            $ident:expr,
            $op:expr,
            $dn:expr,
            $expect:expr
        ) => {{
            let ac = $tk.access_controls(&AccessControlConfig::default());
            let acr = ac.read();
            let dn = dn!($dn);
            let req = EvaluationRequest::new($ident, $op, &dn);
            let res = acr.decide(&req);
            debug!(?res, expect = ?$expect);
            assert_eq!(res, $expect);
        }};
    }

    macro_rules! test_acp_search_reduce {
        (
            $tk:expr,
            $ident:expr,
            $dns:expr,
            $expect:expr
        ) => {{
            let ac = $tk.access_controls(&AccessControlConfig::default());
            let acr = ac.read();
            let entries: Vec<Arc<Entry>> = $dns
                .iter()
                .map(|d| $tk.fetch(d))
                .collect();
            let reduced = acr.filter_search_results($ident, &entries);
            let expect: Vec<Entry> = $expect;
            debug!(?reduced, ?expect);
            assert_eq!(reduced, expect);
        }};
    }

    // Without any ACI an add is refused; a broad grant allows it.
    #[test]
    fn test_access_add_needs_grant() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        let new_ou = entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "top"),
            ("objectClass", "organizationalUnit"),
            ("ou", "testou")
        );

        let ac = tk.access_controls(&AccessControlConfig::default());
        assert_eq!(
            ac.read().create_allow_operation(&billyd, &new_ou),
            Err(OperationError::NoPermission)
        );

        tk.add_subentry(
            "cn=anybodyAdd,ou=system",
            None,
            &[aci_all_users(
                "anybodyAdd",
                14,
                &["entry", "allUserAttributeTypesAndValues"],
                &["grantAdd", "grantBrowse"],
            )],
        );
        let ac = tk.access_controls(&AccessControlConfig::default());
        assert_eq!(ac.read().create_allow_operation(&billyd, &new_ou), Ok(()));
    }

    #[test]
    fn test_access_user_group() {
        sketching::test_init();
        let tk = TestKit::new_system();
        tk.add_entries(vec![entry_init!(
            "cn=Administrators,ou=groups,ou=system",
            ("objectClass", "groupOfNames"),
            ("cn", "Administrators")
        )]);
        tk.add_subentry(
            "cn=administratorAdd,ou=system",
            None,
            &[aci_group(
                "administratorAdd",
                14,
                "cn=administrators,ou=groups,ou=system",
                &["entry", "allUserAttributeTypesAndValues"],
                &["grantAdd", "grantBrowse"],
            )],
        );
        let new_ou = entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou")
        );

        let outsider = tk.add_user("billyd", &[]);
        let ac = tk.access_controls(&AccessControlConfig::default());
        assert_eq!(
            ac.read().create_allow_operation(&outsider, &new_ou),
            Err(OperationError::NoPermission)
        );

        let member = tk.ident("billyd", &["cn=administrators,ou=groups,ou=system"]);
        assert_eq!(ac.read().create_allow_operation(&member, &new_ou), Ok(()));
    }

    // Ungranted attributes are dropped, never left empty.
    #[test]
    fn test_access_search_reduces_attributes() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou"),
            ("telephoneNumber", "867-5309")
        )]);
        tk.add_subentry(
            "cn=selectiveRead,ou=system",
            None,
            &[aci_all_users(
                "selectiveRead",
                14,
                &[
                    "entry",
                    r#"{ "allAttributeValues": [ "ou", "objectClass" ] }"#,
                ],
                &["grantRead", "grantReturnDN", "grantBrowse"],
            )],
        );

        test_acp_search_reduce!(
            tk,
            &billyd,
            ["ou=testou,ou=system"],
            vec![entry_init!(
                "ou=testou,ou=system",
                ("objectClass", "organizationalUnit"),
                ("ou", "testou")
            )]
        );
    }

    #[test]
    fn test_access_entry_aci_precedence() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_subentry(
            "cn=searchAll,ou=system",
            None,
            &[aci_all_users(
                "searchAll",
                15,
                &["entry", "allUserAttributeTypesAndValues"],
                &["grantRead", "grantReturnDN", "grantBrowse"],
            )],
        );
        let deny_at = |precedence: u8| {
            aci_all_users(
                "denyNode",
                precedence,
                &["entry", "allUserAttributeTypesAndValues"],
                &["denyRead", "denyReturnDN", "denyBrowse"],
            )
        };

        tk.add_entries(vec![entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou"),
            ("entryACI", &deny_at(14))
        )]);
        let shown = tk.fetch("ou=testou,ou=system");
        test_acp_search_reduce!(
            tk,
            &billyd,
            ["ou=testou,ou=system"],
            vec![entry_init!(
                "ou=testou,ou=system",
                ("objectClass", "organizationalUnit"),
                ("ou", "testou")
            )]
        );
        assert!(shown.attribute_pres(ATTR_ENTRY_ACI));

        tk.replace_entry(entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou"),
            ("entryACI", &deny_at(16))
        ));
        test_acp_search_reduce!(tk, &billyd, ["ou=testou,ou=system"], vec![]);
    }

    // maxValueCount caps values even where adding is granted.
    #[test]
    fn test_access_max_value_count() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou")
        )]);
        tk.add_subentry(
            "cn=limitedAdd,ou=system",
            None,
            &[aci_all_users(
                "limitedAdd",
                14,
                &[
                    "entry",
                    "allUserAttributeTypesAndValues",
                    r#"{ "maxValueCount": [ { "type": "description", "maxCount": 1 } ] }"#,
                ],
                &["grantAdd", "grantModify", "grantRemove", "grantBrowse", "grantRead"],
            )],
        );
        let ac = tk.access_controls(&AccessControlConfig::default());
        let dn = dn!("ou=testou,ou=system");

        assert_eq!(
            ac.read().modify_allow_operation(
                &billyd,
                &dn,
                &ModifyList::new_append("description", "one")
            ),
            Ok(())
        );
        assert_eq!(
            ac.read().modify_allow_operation(
                &billyd,
                &dn,
                &ModifyList::new_list(vec![m_replace("description", &["one", "two"])])
            ),
            Err(OperationError::NoPermission)
        );

        tk.replace_entry(entry_init!(
            "ou=testou,ou=system",
            ("objectClass", "organizationalUnit"),
            ("ou", "testou"),
            ("description", "one")
        ));
        let ac = tk.access_controls(&AccessControlConfig::default());
        assert_eq!(
            ac.read().modify_allow_operation(
                &billyd,
                &dn,
                &ModifyList::new_append("description", "two")
            ),
            Err(OperationError::NoPermission)
        );
    }

    #[test]
    fn test_access_deny_by_default() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![entry_init!("ou=testou,ou=system", ("ou", "testou"))]);
        for op in MicroOperations::all().iter() {
            test_acp_decide!(tk, &billyd, op, "ou=testou,ou=system", Verdict::Denied);
        }
    }

    #[test]
    fn test_access_bypass() {
        sketching::test_init();
        let tk = TestKit::new_system();
        tk.add_entries(vec![entry_init!("ou=testou,ou=system", ("ou", "testou"))]);
        let internal = Identity::from_internal();
        test_acp_decide!(
            tk,
            &internal,
            MicroOperations::REMOVE,
            "ou=testou,ou=system",
            Verdict::Allowed
        );
        let admin = Identity::from_user(
            dn!(DEFAULT_ADMIN_DN),
            BTreeSet::new(),
            AuthenticationLevel::Simple,
        );
        test_acp_decide!(
            tk,
            &admin,
            MicroOperations::REMOVE,
            "ou=testou,ou=system",
            Verdict::Allowed
        );

        let mut config = AccessControlConfig::default();
        config.enabled = false;
        let ac = tk.access_controls(&config);
        let billyd = tk.ident("billyd", &[]);
        let dn = dn!("ou=testou,ou=system");
        assert_eq!(ac.read().delete_allow_operation(&billyd, &dn), Ok(()));
    }

    #[test]
    fn test_access_group_membership_is_monotonic() {
        sketching::test_init();
        let tk = TestKit::new_system();
        tk.add_entries(vec![entry_init!(
            "ou=testou,ou=system",
            ("ou", "testou"),
            ("description", "a")
        )]);
        tk.add_subentry(
            "cn=mixed,ou=system",
            None,
            &[
                aci_all_users("everyone", 3, &["entry"], &["grantBrowse", "grantRead"]),
                aci_group(
                    "staff",
                    5,
                    "cn=staff,ou=groups,ou=system",
                    &["allUserAttributeTypesAndValues"],
                    &["grantRead"],
                ),
                aci_group(
                    "staff-deny",
                    1,
                    "cn=staff,ou=groups,ou=system",
                    &["entry"],
                    &["denyBrowse"],
                ),
            ],
        );
        let ac = tk.access_controls(&AccessControlConfig::default());
        let acr = ac.read();
        let dn = dn!("ou=testou,ou=system");
        let outsider = tk.ident("billyd", &[]);
        let member = tk.ident("billyd", &["cn=staff,ou=groups,ou=system"]);

        let requests = [
            (MicroOperations::BROWSE, None),
            (MicroOperations::READ, None),
            (MicroOperations::READ, Some("description")),
            (MicroOperations::REMOVE, None),
        ];
        for (op, attr) in requests {
            let before = EvaluationRequest::new(&outsider, op, &dn);
            let after = EvaluationRequest::new(&member, op, &dn);
            let (before, after) = match attr {
                Some(a) => (before.with_attribute(a), after.with_attribute(a)),
                None => (before, after),
            };
            if acr.decide(&before) == Verdict::Allowed {
                assert_eq!(acr.decide(&after), Verdict::Allowed);
            }
        }
    }

    #[test]
    fn test_access_search_value_visibility() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![entry_init!(
            "cn=staff,ou=groups,ou=system",
            ("objectClass", "groupOfNames"),
            ("cn", "staff"),
            ("member", "uid=billyd,ou=users,ou=system"),
            ("member", "uid=other,ou=users,ou=system")
        )]);
        tk.add_subentry(
            "cn=selfOnly,ou=system",
            None,
            &[
                aci_all_users(
                    "see-entries",
                    1,
                    &["entry", "allUserAttributeTypes"],
                    &["grantBrowse", "grantReturnDN", "grantRead"],
                ),
                aci_all_users(
                    "see-self",
                    1,
                    &[r#"{ "selfValue": [ "member" ] }"#],
                    &["grantRead"],
                ),
            ],
        );
        let ac = tk.access_controls(&AccessControlConfig::default());
        let acr = ac.read();
        let entry = tk.fetch("cn=staff,ou=groups,ou=system");

        let mask = acr.compute_visibility_mask(&billyd, &entry);
        assert!(mask.entry_disclosed && mask.dn_disclosed);
        assert_eq!(mask.get("cn"), &AttributeVisibility::Visible);
        assert_eq!(
            mask.get("member"),
            &AttributeVisibility::ValuesPartiallyVisible(btreeset![0])
        );

        let reduced = acr
            .filter_search_result(&billyd, &entry)
            .expect("entry must be visible");
        assert_eq!(
            reduced.get_ava("member"),
            Some(&["uid=billyd,ou=users,ou=system".to_string()][..])
        );
        // Idempotent.
        assert_eq!(reduced.reduce_attributes(&mask).as_ref(), Some(&reduced));
        assert!(reduced.attrs().all(|(_, vs)| !vs.is_empty()));
    }

    #[test]
    fn test_access_lookup_and_matched_name() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![
            entry_init!("ou=visible,ou=system", ("ou", "visible")),
            entry_init!("ou=hidden,ou=visible,ou=system", ("ou", "hidden")),
            entry_init!("ou=admitted,ou=visible,ou=system", ("ou", "admitted")),
        ]);
        tk.add_subentry(
            "cn=lookup,ou=system",
            None,
            &[aci_all_users(
                "browse-visible",
                1,
                &["entry", "allUserAttributeTypesAndValues"],
                &["grantBrowse", "grantReturnDN", "grantRead"],
            )],
        );
        tk.replace_entry(entry_init!(
            "ou=hidden,ou=visible,ou=system",
            ("ou", "hidden"),
            (
                "entryACI",
                &aci_all_users("hide-me", 9, &["entry"], &["denyBrowse"])
            )
        ));
        tk.replace_entry(entry_init!(
            "ou=admitted,ou=visible,ou=system",
            ("ou", "admitted"),
            (
                "entryACI",
                &aci_all_users(
                    "admit-me",
                    9,
                    &["entry"],
                    &["denyBrowse", "grantDiscloseOnError"]
                )
            )
        ));
        let ac = tk.access_controls(&AccessControlConfig::default());
        let acr = ac.read();

        let visible = acr
            .lookup_entry(&billyd, &dn!("ou=visible,ou=system"))
            .expect("visible entry");
        assert_eq!(visible.get_ava_single("ou"), Some("visible"));

        assert_eq!(
            acr.lookup_entry(&billyd, &dn!("ou=hidden,ou=visible,ou=system")),
            Err(OperationError::NoSuchObject {
                matched: "ou=visible,ou=system".to_string()
            })
        );
        assert_eq!(
            acr.lookup_entry(&billyd, &dn!("ou=missing,ou=hidden,ou=visible,ou=system")),
            Err(OperationError::NoSuchObject {
                matched: "ou=visible,ou=system".to_string()
            })
        );
        assert_eq!(
            acr.lookup_entry(&billyd, &dn!("ou=admitted,ou=visible,ou=system")),
            Err(OperationError::NoPermission)
        );

        let stranger = Identity::anonymous();
        assert_eq!(
            acr.compute_matched_name(&stranger, &dn!("ou=missing,ou=system")),
            dn!("ou=system")
        );
    }

    #[test]
    fn test_access_search_range_of_values() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![
            entry_init!(
                "cn=alice,ou=system",
                ("objectClass", "person"),
                ("cn", "alice"),
                ("sn", "smith")
            ),
            entry_init!(
                "ou=testou,ou=system",
                ("objectClass", "organizationalUnit"),
                ("ou", "testou")
            ),
        ]);
        tk.add_subentry(
            "cn=persons,ou=system",
            None,
            &[
                aci_all_users(
                    "see-entries",
                    1,
                    &["entry"],
                    &["grantBrowse", "grantReturnDN", "grantRead"],
                ),
                aci_all_users(
                    "read-persons",
                    1,
                    &[r#"{ "rangeOfValues": { "equality": [ "objectClass", "person" ] } }"#],
                    &["grantRead"],
                ),
            ],
        );
        let ac = tk.access_controls(&AccessControlConfig::default());
        let acr = ac.read();

        // The filter selects the entry, so all of its values are readable.
        let alice = tk.fetch("cn=alice,ou=system");
        let mask = acr.compute_visibility_mask(&billyd, &alice);
        assert_eq!(mask.get("cn"), &AttributeVisibility::Visible);
        assert_eq!(mask.get("sn"), &AttributeVisibility::Visible);
        assert_eq!(
            acr.filter_search_result(&billyd, &alice).as_ref(),
            Some(&*alice)
        );

        let testou = tk.fetch("ou=testou,ou=system");
        let mask = acr.compute_visibility_mask(&billyd, &testou);
        assert!(mask.entry_disclosed);
        assert_eq!(mask.get("ou"), &AttributeVisibility::Hidden);
    }

    #[test]
    fn test_access_value_denial_leaves_other_attributes() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![entry_init!(
            "cn=secret,ou=system",
            ("objectClass", "person"),
            ("cn", "secret"),
            ("cn", "public"),
            ("sn", "smith"),
            ("description", "hello")
        )]);
        tk.add_subentry(
            "cn=types,ou=system",
            None,
            &[aci_all_users(
                "see-types",
                1,
                &["entry", "allUserAttributeTypes"],
                &["grantBrowse", "grantReturnDN", "grantRead"],
            )],
        );
        let entry = tk.fetch("cn=secret,ou=system");
        let before = tk
            .access_controls(&AccessControlConfig::default())
            .read()
            .compute_visibility_mask(&billyd, &entry);
        assert_eq!(before.get("description"), &AttributeVisibility::Visible);

        tk.add_subentry(
            "cn=hide,ou=system",
            None,
            &[
                aci_all_users(
                    "hide-secret-entries",
                    5,
                    &[r#"{ "rangeOfValues": { "equality": [ "cn", "nobody" ] } }"#],
                    &["denyRead"],
                ),
                aci_all_users(
                    "hide-secret-value",
                    5,
                    &[r#"{ "attributeValue": [ { "type": "cn", "value": "secret" } ] }"#],
                    &["denyRead"],
                ),
            ],
        );
        let ac = tk.access_controls(&AccessControlConfig::default());
        let acr = ac.read();
        let after = acr.compute_visibility_mask(&billyd, &entry);

        assert_eq!(after.get("description"), &AttributeVisibility::Visible);
        assert_eq!(after.get("sn"), &AttributeVisibility::Visible);
        assert_eq!(
            after.get("cn"),
            &AttributeVisibility::ValuesPartiallyVisible(btreeset![1])
        );

        let reduced = acr
            .filter_search_result(&billyd, &entry)
            .expect("entry must be visible");
        assert_eq!(reduced.get_ava("cn"), Some(&["public".to_string()][..]));
        assert_eq!(reduced.get_ava("description"), Some(&["hello".to_string()][..]));
    }

    #[test]
    fn test_access_cache_lifecycle() {
        sketching::test_init();
        let tk = TestKit::new_system();
        let billyd = tk.add_user("billyd", &[]);
        tk.add_entries(vec![entry_init!("ou=testou,ou=system", ("ou", "testou"))]);
        let ac = tk.access_controls(&AccessControlConfig::default());
        let dn = dn!("ou=testou,ou=system");
        let system = dn!("ou=system");

        {
            let mut acw = ac.write();
            acw.load_area(&system).expect("load");
            assert_eq!(acw.get_areas().len(), 1);
            assert!(acw.load_area(&dn!("ou=nope,ou=system")).is_err());
            acw.commit().expect("commit");
        }

        let remove = EvaluationRequest::new(&billyd, MicroOperations::REMOVE, &dn);
        // A reader taken now keeps its snapshot across later writes.
        let before = ac.read();
        assert_eq!(before.decide(&remove), Verdict::Denied);

        tk.add_subentry(
            "cn=removers,ou=system",
            None,
            &[aci_all_users("removers", 1, &["entry"], &["grantRemove"])],
        );
        {
            let mut acw = ac.write();
            acw.notify_change(&dn!("cn=removers,ou=system"))
                .expect("notify");
            assert_eq!(acw.get_areas().values().map(|a| a.items.len()).sum::<usize>(), 1);
            acw.commit().expect("commit");
        }

        assert_eq!(before.decide(&remove), Verdict::Denied);
        assert_eq!(ac.read().decide(&remove), Verdict::Allowed);

        {
            let mut acw = ac.write();
            let mut cfg = AccessControlConfig::default();
            cfg.bypass_dns = vec!["uid=billyd,ou=users,ou=system".to_string()];
            acw.update_policy(&cfg).expect("policy");
            assert!(acw.remove_area(&system));
            acw.reload().expect("reload");
            acw.commit().expect("commit");
        }
        assert!(ac.read().get_areas().is_empty());
    }
}
