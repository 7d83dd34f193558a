//! The decision for a single micro-operation.
//!
//! Gates run in a fixed order, each assuming the previous ones have filtered
//! the tuple set:
//!
//! 1. tuples requiring a stronger authentication than the requester has are
//!    skipped,
//! 2. only tuples whose user classes select the requester, whose protected
//!    items cover the target and that carry the micro-operation remain,
//! 3. these are split into grants and denials,
//! 4. the highest precedence wins, and denial wins a tie (unless the
//!    specificity tie-break is enabled),
//! 5. with nothing left the answer is no,
//! 6. an allowed add is then checked against any `maxValueCount` and
//!    `maxImmSub` constraints carried by the grants.

use std::cmp::Ordering;

use super::collect::TupleSet;
use super::protected::{
    max_value_count_exceeded, protected_item_applies, protected_item_is_value_scoped,
    TargetContext,
};
use super::subject::user_class_matches;
use super::{AccessControlsContext, AccessPolicy, EvaluationRequest, Verdict};
use crate::prelude::*;

/// A tuple that survived the applicability filter, with the ranks the
/// specificity tie-break orders it by.
struct Applicable<'t> {
    tuple: &'t AciTuple,
    user_class_rank: u8,
    protected_item_rank: u8,
}

impl<'t> Applicable<'t> {
    fn specificity(&self) -> (u8, u8) {
        (self.user_class_rank, self.protected_item_rank)
    }
}

/// Everything needed to decide requests about one target, for one requester.
pub(super) struct Evaluator<'a> {
    pub context: &'a AccessControlsContext,
    pub policy: &'a AccessPolicy,
    pub user: &'a IdentUser,
    pub tuples: &'a TupleSet,
}

impl<'a> Evaluator<'a> {
    fn target<'r>(&'r self, req: &'r EvaluationRequest<'r>) -> TargetContext<'r> {
        TargetContext {
            schema: self.context.schema.as_ref(),
            filter: self.context.filter.as_ref(),
            max_depth: self.policy.max_superior_depth,
            principal: &self.user.dn,
            target_dn: req.target_dn,
            target_entry: req.target_entry,
            attribute: req.attribute,
            attribute_id: req
                .attribute
                .and_then(|a| self.context.schema.resolve_attribute_type(a)),
            value: req.value,
        }
    }

    /// Gate 1: authentication level.
    fn authenticated_tuples(&self) -> impl Iterator<Item = &'a AciTuple> + '_ {
        self.tuples.iter().filter(move |t| {
            let ok = t.authentication_level <= self.user.authentication_level;
            if !ok {
                aci_trace!(tuple = %t, have = %self.user.authentication_level, "skipping tuple, authentication level too low");
            }
            ok
        })
    }

    /// Gate 2: applicability.
    fn applicable<'r>(&'r self, op: MicroOperations, t: &'r TargetContext) -> Vec<Applicable<'a>> {
        self.authenticated_tuples()
            .filter(|tuple| tuple.micro_operations.contains(op))
            .filter_map(|tuple| {
                let user_class_rank = tuple
                    .user_classes
                    .iter()
                    .filter(|uc| {
                        user_class_matches(uc, self.user, t.target_dn, self.context.store.as_ref())
                    })
                    .map(|uc| uc.specificity())
                    .min()?;
                let protected_item_rank = tuple
                    .protected_items
                    .iter()
                    .filter(|pi| protected_item_applies(pi, t))
                    .map(|pi| pi.specificity())
                    .min()?;
                Some(Applicable {
                    tuple,
                    user_class_rank,
                    protected_item_rank,
                })
            })
            .collect()
    }

    /// Decide one micro-operation. `op` must be a single flag.
    fn decide_single(&self, op: MicroOperations, req: &EvaluationRequest) -> Verdict {
        let t = self.target(req);
        let applicable = self.applicable(op, &t);

        // Gate 3.
        let (grants, denials): (Vec<&Applicable>, Vec<&Applicable>) =
            applicable.iter().partition(|a| a.tuple.is_grant);

        let max_grant = grants.iter().map(|a| a.tuple.precedence).max();
        let max_deny = denials.iter().map(|a| a.tuple.precedence).max();

        // Gates 4 and 5.
        let verdict = match (max_grant, max_deny) {
            (None, None) => {
                aci_trace!(%op, dn = %req.target_dn, "no applicable tuples, denying by default");
                Verdict::Denied
            }
            (None, Some(_)) => Verdict::Denied,
            (Some(_), None) => Verdict::Allowed,
            (Some(g), Some(d)) => match g.cmp(&d) {
                Ordering::Greater => Verdict::Allowed,
                Ordering::Less => Verdict::Denied,
                Ordering::Equal if self.policy.specificity_tiebreak => {
                    let best = |set: &[&Applicable]| {
                        set.iter()
                            .filter(|a| a.tuple.precedence == g)
                            .map(|a| a.specificity())
                            .min()
                    };
                    match (best(grants.as_slice()), best(denials.as_slice())) {
                        (Some(gs), Some(ds)) if gs < ds => Verdict::Allowed,
                        _ => Verdict::Denied,
                    }
                }
                Ordering::Equal => Verdict::Denied,
            },
        };

        if verdict == Verdict::Denied || op != MicroOperations::ADD {
            return verdict;
        }

        // Gate 6. Constraints only ever take away.
        if let Some(count) = req.resulting_value_count {
            let exceeded = grants.iter().any(|a| {
                a.tuple
                    .protected_items
                    .iter()
                    .any(|pi| max_value_count_exceeded(pi, &t, count))
            });
            if exceeded {
                aci_trace!(dn = %req.target_dn, attr = ?req.attribute, count, "maxValueCount exceeded");
                return Verdict::Denied;
            }
        }

        if req.attribute.is_none() {
            let limit = grants
                .iter()
                .flat_map(|a| a.tuple.protected_items.iter())
                .filter_map(|pi| match pi {
                    ProtectedItem::MaxImmSub(n) => Some(*n),
                    _ => None,
                })
                .min();
            if let Some(limit) = limit {
                let existing = req
                    .target_dn
                    .parent()
                    .map(|p| self.context.store.count_immediate_subordinates(&p))
                    .unwrap_or(0);
                if existing >= limit {
                    aci_trace!(dn = %req.target_dn, existing, limit, "maxImmSub exceeded");
                    return Verdict::Denied;
                }
            }
        }

        Verdict::Allowed
    }

    /// Decide a request. Every micro-operation it names must be allowed.
    pub fn decide(&self, req: &EvaluationRequest) -> Verdict {
        if req.operation.is_empty() {
            return Verdict::Denied;
        }
        if self.tuples.is_empty() {
            aci_trace!(dn = %req.target_dn, "no aci governs the target, denying");
            return Verdict::Denied;
        }
        for op in req.operation.iter() {
            if self.decide_single(op, req) == Verdict::Denied {
                return Verdict::Denied;
            }
        }
        Verdict::Allowed
    }

    /// As [`decide`](Self::decide), recording a denial in the security log.
    pub fn permits(&self, req: &EvaluationRequest) -> bool {
        match self.decide(req) {
            Verdict::Allowed => true,
            Verdict::Denied => {
                security_access!(
                    dn = %req.target_dn,
                    op = %req.operation,
                    attr = ?req.attribute,
                    has_value = req.value.is_some(),
                    "denied ❌"
                );
                false
            }
        }
    }

    /// Read tuples selecting the requester that carry a protected item
    /// restricting individual values of the requested attribute.
    fn value_scoped_read_tuples<'r>(
        &'r self,
        t: &'r TargetContext<'r>,
    ) -> impl Iterator<Item = &'a AciTuple> + 'r {
        self.authenticated_tuples()
            .filter(|tuple| tuple.micro_operations.contains(MicroOperations::READ))
            .filter(move |tuple| {
                tuple.user_classes.iter().any(|uc| {
                    user_class_matches(uc, self.user, t.target_dn, self.context.store.as_ref())
                })
            })
            .filter(move |tuple| {
                tuple
                    .protected_items
                    .iter()
                    .any(|pi| protected_item_is_value_scoped(pi, t))
            })
    }

    /// Are there tuples that could read, or refuse to read, individual values
    /// of `attribute` rather than the attribute as a whole?
    pub fn has_value_restrictions(&self, req: &EvaluationRequest) -> bool {
        let t = self.target(req);
        let found = self.value_scoped_read_tuples(&t).next().is_some();
        found
    }

    /// Read of one value of an attribute whose type is readable. A value that
    /// no tuple reaches keeps the verdict of its type, unless values of the
    /// attribute are only readable through value scoped grants.
    pub fn decide_value_read(&self, req: &EvaluationRequest) -> Verdict {
        if self.decide(req) == Verdict::Allowed {
            return Verdict::Allowed;
        }

        let t = self.target(req);
        if !self.applicable(MicroOperations::READ, &t).is_empty() {
            return Verdict::Denied;
        }

        let type_req = EvaluationRequest {
            value: None,
            ..req.clone()
        };
        let type_t = self.target(&type_req);
        let value_grants = self
            .value_scoped_read_tuples(&type_t)
            .any(|tuple| tuple.is_grant);
        if value_grants {
            Verdict::Denied
        } else {
            aci_trace!(dn = %req.target_dn, attr = ?req.attribute, "no tuple reaches the value, keeping the type verdict");
            Verdict::Allowed
        }
    }
}
