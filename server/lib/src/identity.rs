//! Contains structures related to the Identity that initiated an operation.
//! This Identity is what will have access controls applied to it.

use crate::prelude::*;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
/// An authenticated, external principal.
pub struct IdentUser {
    pub dn: Dn,
    /// The normalised DNs of every group this principal is a member of,
    /// resolved by the caller.
    pub groups: BTreeSet<Dn>,
    pub authentication_level: AuthenticationLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The type of Identity that is related to this session.
pub enum IdentType {
    User(IdentUser),
    /// Operations the server performs on its own behalf. These are never
    /// subject to access control.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An identity that initiated an operation.
pub struct Identity {
    pub origin: IdentType,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.origin {
            IdentType::Internal => write!(f, "Internal"),
            IdentType::User(u) => write!(f, "User( {}, {} )", u.dn, u.authentication_level),
        }
    }
}

impl Identity {
    pub fn from_internal() -> Self {
        Identity {
            origin: IdentType::Internal,
        }
    }

    /// An unauthenticated (anonymous) principal, named by the root DN.
    pub fn anonymous() -> Self {
        Identity {
            origin: IdentType::User(IdentUser {
                dn: Dn::root(),
                groups: BTreeSet::new(),
                authentication_level: AuthenticationLevel::None,
            }),
        }
    }

    pub fn from_user(
        dn: Dn,
        groups: BTreeSet<Dn>,
        authentication_level: AuthenticationLevel,
    ) -> Self {
        Identity {
            origin: IdentType::User(IdentUser {
                dn,
                groups,
                authentication_level,
            }),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.origin, IdentType::Internal)
    }

    pub fn get_dn(&self) -> Option<&Dn> {
        match &self.origin {
            IdentType::Internal => None,
            IdentType::User(u) => Some(&u.dn),
        }
    }

    pub fn get_groups(&self) -> Option<&BTreeSet<Dn>> {
        match &self.origin {
            IdentType::Internal => None,
            IdentType::User(u) => Some(&u.groups),
        }
    }

    /// Internal identities are treated as strongly authenticated.
    pub fn authentication_level(&self) -> AuthenticationLevel {
        match &self.origin {
            IdentType::Internal => AuthenticationLevel::Strong,
            IdentType::User(u) => u.authentication_level,
        }
    }
}
