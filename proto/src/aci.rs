//! The enumerations of X.501 Basic Access Control that appear inside ACI items.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The minimum strength of authentication an ACI item requires of a requester.
/// Ordered so that `Strong > Simple > None`.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationLevel {
    #[default]
    None,
    Simple,
    Strong,
}

impl fmt::Display for AuthenticationLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthenticationLevel::None => write!(f, "none"),
            AuthenticationLevel::Simple => write!(f, "simple"),
            AuthenticationLevel::Strong => write!(f, "strong"),
        }
    }
}

impl FromStr for AuthenticationLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AuthenticationLevel::None),
            "simple" => Ok(AuthenticationLevel::Simple),
            "strong" => Ok(AuthenticationLevel::Strong),
            _ => Err("Must be one of none, simple, strong"),
        }
    }
}

/// A single operation that an ACI item may grant or deny.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MicroOperation {
    Add,
    Read,
    Browse,
    Modify,
    Remove,
    Rename,
    #[serde(rename = "returnDN")]
    ReturnDn,
    Compare,
    DiscloseOnError,
    Import,
    Export,
    FilterMatch,
    Invoke,
}

impl fmt::Display for MicroOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MicroOperation::Add => "add",
            MicroOperation::Read => "read",
            MicroOperation::Browse => "browse",
            MicroOperation::Modify => "modify",
            MicroOperation::Remove => "remove",
            MicroOperation::Rename => "rename",
            MicroOperation::ReturnDn => "returnDN",
            MicroOperation::Compare => "compare",
            MicroOperation::DiscloseOnError => "discloseOnError",
            MicroOperation::Import => "import",
            MicroOperation::Export => "export",
            MicroOperation::FilterMatch => "filterMatch",
            MicroOperation::Invoke => "invoke",
        };
        f.write_str(s)
    }
}

/// The grantsAndDenials bit string of an ACI item, one value per bit.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum GrantAndDenial {
    GrantAdd,
    DenyAdd,
    GrantDiscloseOnError,
    DenyDiscloseOnError,
    GrantRead,
    DenyRead,
    GrantRemove,
    DenyRemove,
    GrantBrowse,
    DenyBrowse,
    GrantExport,
    DenyExport,
    GrantImport,
    DenyImport,
    GrantModify,
    DenyModify,
    GrantRename,
    DenyRename,
    #[serde(rename = "grantReturnDN")]
    GrantReturnDn,
    #[serde(rename = "denyReturnDN")]
    DenyReturnDn,
    GrantCompare,
    DenyCompare,
    GrantFilterMatch,
    DenyFilterMatch,
    GrantInvoke,
    DenyInvoke,
}

impl GrantAndDenial {
    pub fn is_grant(self) -> bool {
        matches!(
            self,
            GrantAndDenial::GrantAdd
                | GrantAndDenial::GrantDiscloseOnError
                | GrantAndDenial::GrantRead
                | GrantAndDenial::GrantRemove
                | GrantAndDenial::GrantBrowse
                | GrantAndDenial::GrantExport
                | GrantAndDenial::GrantImport
                | GrantAndDenial::GrantModify
                | GrantAndDenial::GrantRename
                | GrantAndDenial::GrantReturnDn
                | GrantAndDenial::GrantCompare
                | GrantAndDenial::GrantFilterMatch
                | GrantAndDenial::GrantInvoke
        )
    }

    pub fn micro_operation(self) -> MicroOperation {
        match self {
            GrantAndDenial::GrantAdd | GrantAndDenial::DenyAdd => MicroOperation::Add,
            GrantAndDenial::GrantDiscloseOnError | GrantAndDenial::DenyDiscloseOnError => {
                MicroOperation::DiscloseOnError
            }
            GrantAndDenial::GrantRead | GrantAndDenial::DenyRead => MicroOperation::Read,
            GrantAndDenial::GrantRemove | GrantAndDenial::DenyRemove => MicroOperation::Remove,
            GrantAndDenial::GrantBrowse | GrantAndDenial::DenyBrowse => MicroOperation::Browse,
            GrantAndDenial::GrantExport | GrantAndDenial::DenyExport => MicroOperation::Export,
            GrantAndDenial::GrantImport | GrantAndDenial::DenyImport => MicroOperation::Import,
            GrantAndDenial::GrantModify | GrantAndDenial::DenyModify => MicroOperation::Modify,
            GrantAndDenial::GrantRename | GrantAndDenial::DenyRename => MicroOperation::Rename,
            GrantAndDenial::GrantReturnDn | GrantAndDenial::DenyReturnDn => {
                MicroOperation::ReturnDn
            }
            GrantAndDenial::GrantCompare | GrantAndDenial::DenyCompare => MicroOperation::Compare,
            GrantAndDenial::GrantFilterMatch | GrantAndDenial::DenyFilterMatch => {
                MicroOperation::FilterMatch
            }
            GrantAndDenial::GrantInvoke | GrantAndDenial::DenyInvoke => MicroOperation::Invoke,
        }
    }
}
