//! [`Schema`] is the minimal attribute type registry the access control engine
//! needs: resolving names and OIDs to a canonical attribute type, walking the
//! superior (sub-type) chain, telling user attributes from operational ones and
//! normalising values for equality.
//!
//! The engine only ever consumes schema through the [`SchemaOracle`] trait, so a
//! directory server can plug its real schema subsystem in. [`Schema`] is the
//! in-memory implementation, which is transactional in the same way the rest of
//! the server's shared state is.
//!
//! [`Schema`]: struct.Schema.html
//! [`SchemaOracle`]: trait.SchemaOracle.html

use concread::cowcell::*;
use hashbrown::{HashMap, HashSet};
use std::str::FromStr;

use crate::dn::Dn;
use crate::prelude::*;

/// The canonical (lowercase primary name) identifier of an attribute type.
pub type AttributeTypeId = AttrString;

/// Upper bound on the superior chain we are prepared to walk. Schema with longer
/// chains than this is treated as misconfigured.
pub const MAX_SUPERIOR_DEPTH: usize = 32;

/// The equality behaviour of an attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxType {
    /// caseIgnoreMatch
    #[default]
    DirectoryString,
    /// caseExactMatch
    CaseExactString,
    /// distinguishedNameMatch
    DistinguishedName,
    /// integerMatch
    Integer,
    /// telephoneNumberMatch, ignoring spaces and hyphens.
    TelephoneNumber,
    /// objectIdentifierMatch
    Oid,
    /// octetStringMatch
    OctetString,
}

/// An attribute type definition.
#[derive(Debug, Clone, Default)]
pub struct SchemaAttribute {
    pub name: AttrString,
    pub oid: String,
    pub aliases: Vec<AttrString>,
    pub superior: Option<AttrString>,
    pub syntax: SyntaxType,
    /// Operational attributes are never covered by the "all user attribute"
    /// protected items.
    pub operational: bool,
}

impl SchemaAttribute {
    pub fn new(name: &str, oid: &str, syntax: SyntaxType) -> Self {
        SchemaAttribute {
            name: AttrString::from(name.to_lowercase()),
            oid: oid.to_string(),
            aliases: Vec::new(),
            superior: None,
            syntax,
            operational: false,
        }
    }

    pub fn with_superior(mut self, superior: &str) -> Self {
        self.superior = Some(AttrString::from(superior.to_lowercase()));
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(AttrString::from(alias.to_lowercase()));
        self
    }

    pub fn operational(mut self) -> Self {
        self.operational = true;
        self
    }

    fn normalise(&self, raw: &str) -> Result<String, OperationError> {
        match self.syntax {
            SyntaxType::DirectoryString => Ok(raw
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()),
            SyntaxType::CaseExactString => Ok(raw.split_whitespace().collect::<Vec<_>>().join(" ")),
            SyntaxType::DistinguishedName => Dn::from_str(raw)
                .map(|dn| dn.to_string())
                .map_err(|_| OperationError::InvalidValue(format!("{} is not a dn", self.name))),
            SyntaxType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|_| {
                    OperationError::InvalidValue(format!("{} is not an integer", self.name))
                }),
            SyntaxType::TelephoneNumber => Ok(raw
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect::<String>()
                .to_lowercase()),
            SyntaxType::Oid => Ok(raw.trim().to_lowercase()),
            SyntaxType::OctetString => Ok(raw.to_string()),
        }
    }
}

/// The read-only view of schema that access control evaluation depends on.
pub trait SchemaOracle: Send + Sync {
    /// Resolve a name or OID to the canonical attribute type.
    fn resolve_attribute_type(&self, name: &str) -> Option<AttributeTypeId>;

    /// The direct superior of an attribute type, if any.
    fn get_superior(&self, id: &AttributeTypeId) -> Option<AttributeTypeId>;

    /// Normalise a value of the attribute type for equality matching.
    fn normalize_value(&self, id: &AttributeTypeId, raw: &str) -> Result<String, OperationError>;

    fn is_operational(&self, id: &AttributeTypeId) -> bool;
}

/// True if `attr` is `ancestor` or a sub-type of it. The walk is bounded by
/// `max_depth` and by a visited set so that a cyclic superior chain terminates.
pub fn attribute_is_or_descends_from(
    schema: &dyn SchemaOracle,
    attr: &AttributeTypeId,
    ancestor: &AttributeTypeId,
    max_depth: usize,
) -> bool {
    let mut visited: HashSet<AttributeTypeId> = HashSet::new();
    let mut current = Some(attr.clone());
    let mut depth = 0;

    while let Some(cur) = current {
        if &cur == ancestor {
            return true;
        }
        if depth >= max_depth || !visited.insert(cur.clone()) {
            admin_warn!(
                attr = %attr,
                "attribute superior chain is cyclic or too deep, stopping walk"
            );
            return false;
        }
        depth += 1;
        current = schema.get_superior(&cur);
    }
    false
}

pub struct Schema {
    attributes: CowCell<HashMap<AttrString, SchemaAttribute>>,
    // name, alias or oid -> canonical name
    names: CowCell<HashMap<AttrString, AttrString>>,
}

/// A writable transaction of the working schema set.
pub struct SchemaWriteTransaction<'a> {
    attributes: CowCellWriteTxn<'a, HashMap<AttrString, SchemaAttribute>>,
    names: CowCellWriteTxn<'a, HashMap<AttrString, AttrString>>,
}

/// A readonly transaction of the working schema set.
pub struct SchemaReadTransaction {
    attributes: CowCellReadTxn<HashMap<AttrString, SchemaAttribute>>,
    names: CowCellReadTxn<HashMap<AttrString, AttrString>>,
}

pub trait SchemaTransaction {
    fn get_attributes(&self) -> &HashMap<AttrString, SchemaAttribute>;
    fn get_names(&self) -> &HashMap<AttrString, AttrString>;

    fn get_attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        let key = AttrString::from(name.trim().to_lowercase());
        self.get_names()
            .get(&key)
            .and_then(|canonical| self.get_attributes().get(canonical))
    }
}

impl SchemaTransaction for SchemaReadTransaction {
    fn get_attributes(&self) -> &HashMap<AttrString, SchemaAttribute> {
        &self.attributes
    }

    fn get_names(&self) -> &HashMap<AttrString, AttrString> {
        &self.names
    }
}

impl<'a> SchemaTransaction for SchemaWriteTransaction<'a> {
    fn get_attributes(&self) -> &HashMap<AttrString, SchemaAttribute> {
        &self.attributes
    }

    fn get_names(&self) -> &HashMap<AttrString, AttrString> {
        &self.names
    }
}

impl<'a> SchemaWriteTransaction<'a> {
    pub fn commit(self) -> Result<(), OperationError> {
        let SchemaWriteTransaction { attributes, names } = self;
        names.commit();
        attributes.commit();
        Ok(())
    }

    /// Add or replace an attribute type. Its name, aliases and OID must not
    /// collide with a different attribute type.
    pub fn update_attribute(&mut self, attr: SchemaAttribute) -> Result<(), OperationError> {
        let keys: Vec<AttrString> = std::iter::once(attr.name.clone())
            .chain(attr.aliases.iter().cloned())
            .chain(std::iter::once(AttrString::from(attr.oid.to_lowercase())))
            .collect();

        for key in keys.iter() {
            if let Some(existing) = self.names.get(key) {
                if existing != &attr.name {
                    admin_error!(name = %attr.name, conflict = %key, "attribute name already in use");
                    return Err(OperationError::InvalidValue(format!(
                        "attribute name {} already in use by {}",
                        key, existing
                    )));
                }
            }
        }

        let names = self.names.get_mut();
        for key in keys {
            names.insert(key, attr.name.clone());
        }
        self.attributes.get_mut().insert(attr.name.clone(), attr);
        Ok(())
    }

    fn generate_in_memory(&mut self) -> Result<(), OperationError> {
        use SyntaxType::*;
        let core = vec![
            SchemaAttribute::new("objectClass", "2.5.4.0", Oid),
            SchemaAttribute::new("name", "2.5.4.41", DirectoryString),
            SchemaAttribute::new("cn", "2.5.4.3", DirectoryString)
                .with_alias("commonName")
                .with_superior("name"),
            SchemaAttribute::new("sn", "2.5.4.4", DirectoryString)
                .with_alias("surname")
                .with_superior("name"),
            SchemaAttribute::new("givenName", "2.5.4.42", DirectoryString).with_superior("name"),
            SchemaAttribute::new("ou", "2.5.4.11", DirectoryString)
                .with_alias("organizationalUnitName")
                .with_superior("name"),
            SchemaAttribute::new("o", "2.5.4.10", DirectoryString)
                .with_alias("organizationName")
                .with_superior("name"),
            SchemaAttribute::new("uid", "0.9.2342.19200300.100.1.1", DirectoryString)
                .with_alias("userid"),
            SchemaAttribute::new("dc", "0.9.2342.19200300.100.1.25", DirectoryString)
                .with_alias("domainComponent"),
            SchemaAttribute::new("description", "2.5.4.13", DirectoryString),
            SchemaAttribute::new("telephoneNumber", "2.5.4.20", TelephoneNumber),
            SchemaAttribute::new("mail", "0.9.2342.19200300.100.1.3", DirectoryString),
            SchemaAttribute::new("userPassword", "2.5.4.35", OctetString),
            SchemaAttribute::new("distinguishedName", "2.5.4.49", DistinguishedName),
            SchemaAttribute::new("member", "2.5.4.31", DistinguishedName)
                .with_superior("distinguishedName"),
            SchemaAttribute::new("uniqueMember", "2.5.4.50", DistinguishedName),
            SchemaAttribute::new("seeAlso", "2.5.4.34", DistinguishedName)
                .with_superior("distinguishedName"),
            SchemaAttribute::new("roomNumber", "0.9.2342.19200300.100.1.6", DirectoryString),
            SchemaAttribute::new("employeeNumber", "2.16.840.1.113730.3.1.3", Integer),
            SchemaAttribute::new("administrativeRole", "2.5.18.5", Oid).operational(),
            SchemaAttribute::new("subtreeSpecification", "2.5.18.6", CaseExactString)
                .operational(),
            SchemaAttribute::new("prescriptiveACI", "2.5.24.4", CaseExactString).operational(),
            SchemaAttribute::new("entryACI", "2.5.24.5", CaseExactString).operational(),
            SchemaAttribute::new("subentryACI", "2.5.24.6", CaseExactString).operational(),
            SchemaAttribute::new("createTimestamp", "2.5.18.1", CaseExactString).operational(),
            SchemaAttribute::new("modifyTimestamp", "2.5.18.2", CaseExactString).operational(),
            SchemaAttribute::new("creatorsName", "2.5.18.3", DistinguishedName).operational(),
            SchemaAttribute::new("modifiersName", "2.5.18.4", DistinguishedName).operational(),
        ];

        for attr in core {
            self.update_attribute(attr)?;
        }
        Ok(())
    }
}

impl Schema {
    pub fn new() -> Result<Self, OperationError> {
        let s = Schema {
            attributes: CowCell::new(HashMap::with_capacity(64)),
            names: CowCell::new(HashMap::with_capacity(128)),
        };
        let mut sw = s.write();
        let r1 = sw.generate_in_memory();
        debug_assert!(r1.is_ok());
        r1?;
        let r2 = sw.commit().map(|_| s);
        debug_assert!(r2.is_ok());
        r2
    }

    pub fn read(&self) -> SchemaReadTransaction {
        SchemaReadTransaction {
            attributes: self.attributes.read(),
            names: self.names.read(),
        }
    }

    pub fn write(&self) -> SchemaWriteTransaction<'_> {
        SchemaWriteTransaction {
            attributes: self.attributes.write(),
            names: self.names.write(),
        }
    }
}

impl SchemaOracle for Schema {
    fn resolve_attribute_type(&self, name: &str) -> Option<AttributeTypeId> {
        self.read().get_attribute(name).map(|a| a.name.clone())
    }

    fn get_superior(&self, id: &AttributeTypeId) -> Option<AttributeTypeId> {
        self.read()
            .get_attribute(id)
            .and_then(|a| a.superior.clone())
    }

    fn normalize_value(&self, id: &AttributeTypeId, raw: &str) -> Result<String, OperationError> {
        self.read()
            .get_attribute(id)
            .ok_or_else(|| OperationError::SchemaResolution(id.to_string()))
            .and_then(|a| a.normalise(raw))
    }

    fn is_operational(&self, id: &AttributeTypeId) -> bool {
        self.read()
            .get_attribute(id)
            .map(|a| a.operational)
            .unwrap_or(false)
    }
}
