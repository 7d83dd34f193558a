//! The LDAP access control decision engine. This implements X.501 Basic Access
//! Control: collecting ACI tuples that apply to a target, deciding whether a
//! requester may perform an operation and reducing entries to what the
//! requester is allowed to see.

#![recursion_limit = "512"]
#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::disallowed_types)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

#[macro_use]
extern crate tracing;

// This has to be before the other modules so the import order works
#[macro_use]
pub mod macros;

pub mod access;
pub mod aci;
pub mod be;
pub mod config;
pub mod dn;
pub mod entry;
pub mod filter;
pub mod identity;
pub mod modify;
pub mod schema;
pub mod subtree;
pub mod testkit;

/// A prelude of imports that should be imported by all other modules to
/// help make imports cleaner.
pub mod prelude {
    pub use ldap_aci_proto::aci::{AuthenticationLevel, GrantAndDenial, MicroOperation};
    pub use ldap_aci_proto::constants::*;
    pub use ldap_aci_proto::internal::OperationError;
    pub use ldap_aci_proto::AttrString;
    pub use sketching::{
        aci_error, aci_trace, aci_warn, admin_debug, admin_error, admin_info, admin_warn,
        filter_error, filter_trace, perf_trace, security_access, security_critical,
        security_debug, security_error, security_info, tagged_event, EventTag,
    };
    pub use std::collections::{BTreeMap, BTreeSet};
    pub use std::sync::Arc;

    pub use crate::access::{
        AccessControls, AccessControlsReadTransaction, AccessControlsTransaction,
        AccessControlsWriteTransaction, EvaluationRequest, Verdict,
    };
    pub use crate::aci::{AciItem, AciTuple, MicroOperations, ProtectedItem, UserClass};
    pub use crate::be::{AdminPointRegistry, EntryStore};
    pub use crate::config::AccessControlConfig;
    pub use crate::dn::{Dn, Rdn};
    pub use crate::entry::Entry;
    pub use crate::filter::{f_and, f_eq, f_not, f_or, f_pres, f_sub, Filter, FilterEvaluator};
    pub use crate::identity::{IdentType, IdentUser, Identity};
    pub use crate::modify::{m_add, m_purge, m_remove, m_replace, Modify, ModifyList};
    pub use crate::schema::{AttributeTypeId, SchemaOracle};
    pub use crate::subtree::{Refinement, SubtreeSpecification};
}
