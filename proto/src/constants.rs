//! Attribute names and well known values used by access control.
//!
//! Attribute names are stored in their normalised (lowercase) form since that is
//! how they are keyed on entries.

/// Prescriptive ACI, held by access control subentries.
pub const ATTR_PRESCRIPTIVE_ACI: &str = "prescriptiveaci";
/// Entry ACI, held by the entry it protects.
pub const ATTR_ENTRY_ACI: &str = "entryaci";
/// Subentry ACI, held by an administrative point to protect its subentries.
pub const ATTR_SUBENTRY_ACI: &str = "subentryaci";
pub const ATTR_ADMINISTRATIVE_ROLE: &str = "administrativerole";
pub const ATTR_SUBTREE_SPECIFICATION: &str = "subtreespecification";
pub const ATTR_OBJECT_CLASS: &str = "objectclass";
pub const ATTR_CN: &str = "cn";

pub const CLASS_SUBENTRY: &str = "subentry";
pub const CLASS_ACCESS_CONTROL_SUBENTRY: &str = "accesscontrolsubentry";

/// Administrative role values, normalised.
pub const ROLE_AUTONOMOUS_AREA: &str = "autonomousarea";
pub const ROLE_ACCESS_CONTROL_SPECIFIC_AREA: &str = "accesscontrolspecificarea";
pub const ROLE_ACCESS_CONTROL_INNER_AREA: &str = "accesscontrolinnerarea";

/// OIDs of the administrative roles, accepted as synonyms of the names above.
pub const OID_AUTONOMOUS_AREA: &str = "2.5.23.1";
pub const OID_ACCESS_CONTROL_SPECIFIC_AREA: &str = "2.5.23.5";
pub const OID_ACCESS_CONTROL_INNER_AREA: &str = "2.5.23.6";

/// The directory administrator, which bypasses access control by default.
pub const DEFAULT_ADMIN_DN: &str = "uid=admin,ou=system";

/// ACI precedence when an item does not state one.
pub const DEFAULT_PRECEDENCE: u8 = 0;
