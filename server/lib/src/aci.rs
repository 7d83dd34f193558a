//! ACI items and their expansion into ACI tuples.
//!
//! An [`AciItem`] is the unit stored in `prescriptiveACI`, `entryACI` and
//! `subentryACI` values. Before evaluation each item is expanded into a set of
//! [`AciTuple`]s: one grant tuple and one deny tuple per permission, each
//! carrying the user classes, protected items and micro-operations that
//! permission names. Tuples are what the decision engine works with.
//!
//! The textual grammar of ACI items is a concern of the directory server's
//! schema layer. The engine consumes items through the [`AciParser`] trait, and
//! ships [`JsonAciParser`] which reads a JSON encoding of the same structure.

use crate::filter::Filter;
use crate::prelude::*;
use crate::subtree::{Refinement, SubtreeSpecification};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// A set of micro-operations. Requests carry one or more, and every bit a
    /// request carries must be allowed for the request to be allowed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct MicroOperations: u16 {
        const ADD = 1 << 0;
        const READ = 1 << 1;
        const BROWSE = 1 << 2;
        const MODIFY = 1 << 3;
        const REMOVE = 1 << 4;
        const RENAME = 1 << 5;
        const RETURN_DN = 1 << 6;
        const COMPARE = 1 << 7;
        const DISCLOSE_ON_ERROR = 1 << 8;
        const IMPORT = 1 << 9;
        const EXPORT = 1 << 10;
        const FILTER_MATCH = 1 << 11;
        const INVOKE = 1 << 12;
    }
}

impl From<MicroOperation> for MicroOperations {
    fn from(op: MicroOperation) -> Self {
        match op {
            MicroOperation::Add => MicroOperations::ADD,
            MicroOperation::Read => MicroOperations::READ,
            MicroOperation::Browse => MicroOperations::BROWSE,
            MicroOperation::Modify => MicroOperations::MODIFY,
            MicroOperation::Remove => MicroOperations::REMOVE,
            MicroOperation::Rename => MicroOperations::RENAME,
            MicroOperation::ReturnDn => MicroOperations::RETURN_DN,
            MicroOperation::Compare => MicroOperations::COMPARE,
            MicroOperation::DiscloseOnError => MicroOperations::DISCLOSE_ON_ERROR,
            MicroOperation::Import => MicroOperations::IMPORT,
            MicroOperation::Export => MicroOperations::EXPORT,
            MicroOperation::FilterMatch => MicroOperations::FILTER_MATCH,
            MicroOperation::Invoke => MicroOperations::INVOKE,
        }
    }
}

impl fmt::Display for MicroOperations {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(name)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UserClass {
    AllUsers,
    ThisEntry,
    ParentOfEntry,
    Name(BTreeSet<Dn>),
    UserGroup(BTreeSet<Dn>),
    Subtree(Vec<SubtreeSpecification>),
}

impl UserClass {
    /// Rank used by the specificity tie-break: lower is more specific.
    pub(crate) fn specificity(&self) -> u8 {
        match self {
            UserClass::Name(_) | UserClass::ThisEntry | UserClass::ParentOfEntry => 0,
            UserClass::UserGroup(_) | UserClass::Subtree(_) => 1,
            UserClass::AllUsers => 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttributeValueAssertion {
    #[serde(rename = "type")]
    pub attr: AttrString,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MaxValueCountItem {
    #[serde(rename = "type")]
    pub attr: AttrString,
    pub max_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RestrictedByItem {
    #[serde(rename = "type")]
    pub attr: AttrString,
    pub values_in: AttrString,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProtectedItem {
    Entry,
    AllUserAttributeTypes,
    AllUserAttributeTypesAndValues,
    AttributeType(BTreeSet<AttrString>),
    AllAttributeValues(BTreeSet<AttrString>),
    SelfValue(BTreeSet<AttrString>),
    AttributeValue(Vec<AttributeValueAssertion>),
    MaxValueCount(Vec<MaxValueCountItem>),
    MaxImmSub(usize),
    RestrictedBy(Vec<RestrictedByItem>),
    RangeOfValues(Filter),
    Classes(Refinement),
}

impl ProtectedItem {
    /// Rank used by the specificity tie-break: lower is more specific.
    pub(crate) fn specificity(&self) -> u8 {
        match self {
            ProtectedItem::AttributeValue(_)
            | ProtectedItem::SelfValue(_)
            | ProtectedItem::RestrictedBy(_) => 0,
            ProtectedItem::AttributeType(_)
            | ProtectedItem::AllAttributeValues(_)
            | ProtectedItem::RangeOfValues(_) => 1,
            ProtectedItem::Entry | ProtectedItem::Classes(_) => 2,
            ProtectedItem::AllUserAttributeTypes
            | ProtectedItem::AllUserAttributeTypesAndValues => 3,
            ProtectedItem::MaxValueCount(_) | ProtectedItem::MaxImmSub(_) => 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemPermission {
    #[serde(default)]
    pub precedence: Option<u8>,
    pub user_classes: Vec<UserClass>,
    pub grants_and_denials: BTreeSet<GrantAndDenial>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPermission {
    #[serde(default)]
    pub precedence: Option<u8>,
    pub protected_items: Vec<ProtectedItem>,
    pub grants_and_denials: BTreeSet<GrantAndDenial>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemFirst {
    pub protected_items: Vec<ProtectedItem>,
    pub item_permissions: Vec<ItemPermission>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserFirst {
    pub user_classes: Vec<UserClass>,
    pub user_permissions: Vec<UserPermission>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ItemOrUserFirst {
    ItemFirst(ItemFirst),
    UserFirst(UserFirst),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AciItem {
    pub identification_tag: String,
    #[serde(default)]
    pub precedence: u8,
    #[serde(default)]
    pub authentication_level: AuthenticationLevel,
    pub item_or_user_first: ItemOrUserFirst,
}

/// The atomic unit of access control evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AciTuple {
    pub identification_tag: Arc<str>,
    pub user_classes: Arc<[UserClass]>,
    pub authentication_level: AuthenticationLevel,
    pub protected_items: Arc<[ProtectedItem]>,
    pub micro_operations: MicroOperations,
    pub is_grant: bool,
    pub precedence: u8,
}

impl fmt::Display for AciTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} p={} auth={}",
            self.identification_tag,
            if self.is_grant { "grant" } else { "deny" },
            self.micro_operations,
            self.precedence,
            self.authentication_level
        )
    }
}

fn split_grants_and_denials(gad: &BTreeSet<GrantAndDenial>) -> (MicroOperations, MicroOperations) {
    gad.iter()
        .fold((MicroOperations::empty(), MicroOperations::empty()), |(g, d), gd| {
            let op = MicroOperations::from(gd.micro_operation());
            if gd.is_grant() {
                (g | op, d)
            } else {
                (g, d | op)
            }
        })
}

impl AciItem {
    /// Check the structural rules of an ACI item that serde can not express.
    pub fn validate(&self) -> Result<(), OperationError> {
        if self.identification_tag.trim().is_empty() {
            return Err(OperationError::MalformedAci(
                "empty identificationTag".to_string(),
            ));
        }
        let tag = &self.identification_tag;
        let malformed = |msg: &str| OperationError::MalformedAci(format!("{}: {}", tag, msg));

        let check_items = |items: &[ProtectedItem]| -> Result<(), OperationError> {
            if items.is_empty() {
                return Err(malformed("empty protectedItems"));
            }
            for item in items {
                match item {
                    ProtectedItem::AttributeType(s)
                    | ProtectedItem::AllAttributeValues(s)
                    | ProtectedItem::SelfValue(s)
                        if s.is_empty() =>
                    {
                        return Err(malformed("protected item with no attribute types"))
                    }
                    ProtectedItem::AttributeValue(v) if v.is_empty() => {
                        return Err(malformed("attributeValue with no assertions"))
                    }
                    ProtectedItem::MaxValueCount(v) if v.is_empty() => {
                        return Err(malformed("maxValueCount with no attribute types"))
                    }
                    ProtectedItem::RestrictedBy(v) if v.is_empty() => {
                        return Err(malformed("restrictedBy with no attribute types"))
                    }
                    _ => {}
                }
            }
            Ok(())
        };

        let check_classes = |classes: &[UserClass]| -> Result<(), OperationError> {
            if classes.is_empty() {
                return Err(malformed("empty userClasses"));
            }
            for uc in classes {
                match uc {
                    UserClass::Name(s) | UserClass::UserGroup(s) if s.is_empty() => {
                        return Err(malformed("user class with no names"))
                    }
                    UserClass::Subtree(s) if s.is_empty() => {
                        return Err(malformed("subtree user class with no specifications"))
                    }
                    _ => {}
                }
            }
            Ok(())
        };

        match &self.item_or_user_first {
            ItemOrUserFirst::ItemFirst(itf) => {
                check_items(&itf.protected_items)?;
                if itf.item_permissions.is_empty() {
                    return Err(malformed("empty itemPermissions"));
                }
                for p in itf.item_permissions.iter() {
                    check_classes(&p.user_classes)?;
                    if p.grants_and_denials.is_empty() {
                        return Err(malformed("empty grantsAndDenials"));
                    }
                }
            }
            ItemOrUserFirst::UserFirst(usf) => {
                check_classes(&usf.user_classes)?;
                if usf.user_permissions.is_empty() {
                    return Err(malformed("empty userPermissions"));
                }
                for p in usf.user_permissions.iter() {
                    check_items(&p.protected_items)?;
                    if p.grants_and_denials.is_empty() {
                        return Err(malformed("empty grantsAndDenials"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Expand this item into its tuples. A permission level precedence
    /// overrides the item precedence.
    pub fn to_tuples(&self) -> Vec<AciTuple> {
        let tag: Arc<str> = Arc::from(self.identification_tag.as_str());
        let mut tuples = Vec::new();

        let mut push = |user_classes: Arc<[UserClass]>,
                        protected_items: Arc<[ProtectedItem]>,
                        precedence: Option<u8>,
                        gad: &BTreeSet<GrantAndDenial>| {
            let precedence = precedence.unwrap_or(self.precedence);
            let (grants, denials) = split_grants_and_denials(gad);
            for (ops, is_grant) in [(grants, true), (denials, false)] {
                if ops.is_empty() {
                    continue;
                }
                tuples.push(AciTuple {
                    identification_tag: tag.clone(),
                    user_classes: user_classes.clone(),
                    authentication_level: self.authentication_level,
                    protected_items: protected_items.clone(),
                    micro_operations: ops,
                    is_grant,
                    precedence,
                });
            }
        };

        match &self.item_or_user_first {
            ItemOrUserFirst::ItemFirst(itf) => {
                let items: Arc<[ProtectedItem]> = Arc::from(itf.protected_items.as_slice());
                for p in itf.item_permissions.iter() {
                    push(
                        Arc::from(p.user_classes.as_slice()),
                        items.clone(),
                        p.precedence,
                        &p.grants_and_denials,
                    );
                }
            }
            ItemOrUserFirst::UserFirst(usf) => {
                let classes: Arc<[UserClass]> = Arc::from(usf.user_classes.as_slice());
                for p in usf.user_permissions.iter() {
                    push(
                        classes.clone(),
                        Arc::from(p.protected_items.as_slice()),
                        p.precedence,
                        &p.grants_and_denials,
                    );
                }
            }
        }

        tuples
    }
}

/// Turns a stored ACI value into an [`AciItem`].
pub trait AciParser: Send + Sync {
    fn parse(&self, value: &str) -> Result<AciItem, OperationError>;
}

/// Parses ACI items from their JSON encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonAciParser;

impl AciParser for JsonAciParser {
    fn parse(&self, value: &str) -> Result<AciItem, OperationError> {
        let item: AciItem = serde_json::from_str(value).map_err(|e| {
            OperationError::MalformedAci(format!("unable to parse aci item: {}", e))
        })?;
        item.validate()?;
        Ok(item)
    }
}
