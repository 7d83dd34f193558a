//! Distinguished names, in the normalised form needed for access control.
//!
//! A [`Dn`] is stored leaf first, so `cn=a,ou=b` holds `[cn=a, ou=b]`. Both
//! attribute types and values are compared case-insensitively with surrounding
//! and repeated whitespace collapsed, which is the distinguishedNameMatch
//! behaviour for directoryString based naming attributes. Parsing is tolerant
//! but rejects RDNs without a type or an `=`.

use crate::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ava {
    pub attr: AttrString,
    pub value: String,
}

/// A relative distinguished name. Multi-valued RDNs are kept sorted so that
/// `cn=a+sn=b` and `sn=b+cn=a` are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    pub fn new(attr: &str, value: &str) -> Self {
        Rdn {
            avas: vec![Ava {
                attr: normalise_attr(attr),
                value: normalise_value(value),
            }],
        }
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for ava in self.avas.iter() {
            if !first {
                f.write_str("+")?;
            }
            first = false;
            write!(f, "{}={}", ava.attr, escape_value(&ava.value))?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The empty DN naming the root of the DIT.
    pub fn root() -> Self {
        Dn { rdns: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs in this name.
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Create a child of this name.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// True if `self` is `other` or one of its superiors.
    pub fn is_ancestor_or_self_of(&self, other: &Dn) -> bool {
        other.rdns.len() >= self.rdns.len()
            && other.rdns[other.rdns.len() - self.rdns.len()..] == self.rdns[..]
    }

    /// True if `self` is a strict superior of `other`.
    pub fn is_ancestor_of(&self, other: &Dn) -> bool {
        other.rdns.len() > self.rdns.len() && self.is_ancestor_or_self_of(other)
    }

    pub fn is_descendant_or_self_of(&self, ancestor: &Dn) -> bool {
        ancestor.is_ancestor_or_self_of(self)
    }

    /// True if `other` is named directly below `self`.
    pub fn is_immediate_superior_of(&self, other: &Dn) -> bool {
        other.rdns.len() == self.rdns.len() + 1 && self.is_ancestor_or_self_of(other)
    }

    /// Interpret `self` as relative to `base`, producing the absolute name.
    pub fn concat(&self, base: &Dn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + base.rdns.len());
        rdns.extend(self.rdns.iter().cloned());
        rdns.extend(base.rdns.iter().cloned());
        Dn { rdns }
    }

    /// The name of `self` relative to `ancestor`, if `ancestor` is a superior
    /// (or equal) of `self`.
    pub fn relative_to(&self, ancestor: &Dn) -> Option<Dn> {
        if ancestor.is_ancestor_or_self_of(self) {
            Some(Dn {
                rdns: self.rdns[..self.rdns.len() - ancestor.rdns.len()].to_vec(),
            })
        } else {
            None
        }
    }

    /// The superiors of this name, nearest first, ending with the root.
    pub fn ancestors(&self) -> impl Iterator<Item = Dn> + '_ {
        (1..=self.rdns.len()).map(move |i| Dn {
            rdns: self.rdns[i..].to_vec(),
        })
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for rdn in self.rdns.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dn({})", self)
    }
}

impl FromStr for Dn {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Dn::root());
        }

        let rdns = split_unescaped(trimmed, ',')
            .into_iter()
            .map(|rdn_str| parse_rdn(rdn_str, s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dn { rdns })
    }
}

impl TryFrom<String> for Dn {
    type Error = OperationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dn::from_str(&value)
    }
}

impl TryFrom<&str> for Dn {
    type Error = OperationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Dn::from_str(value)
    }
}

impl From<Dn> for String {
    fn from(value: Dn) -> Self {
        value.to_string()
    }
}

/// Normalise a string holding a DN. This is the `normalize` operation the
/// access control engine relies on.
pub fn normalize(dn: &str) -> Result<Dn, OperationError> {
    Dn::from_str(dn)
}

fn parse_rdn(rdn_str: &str, whole: &str) -> Result<Rdn, OperationError> {
    let mut avas = split_unescaped(rdn_str, '+')
        .into_iter()
        .map(|ava_str| {
            let (attr, value) = ava_str.split_once('=').ok_or_else(|| {
                OperationError::InvalidDn(format!("missing '=' in rdn of {}", whole))
            })?;
            let attr = attr.trim();
            if attr.is_empty() {
                return Err(OperationError::InvalidDn(format!(
                    "missing attribute type in rdn of {}",
                    whole
                )));
            }
            Ok(Ava {
                attr: normalise_attr(attr),
                value: normalise_value(&unescape_value(value)),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    avas.sort();
    Ok(Rdn { avas })
}

fn normalise_attr(attr: &str) -> AttrString {
    AttrString::from(attr.trim().to_lowercase())
}

fn normalise_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split on `sep` where it is not preceded by a backslash escape.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(h1) if h1.is_ascii_hexdigit() && chars.peek().is_some_and(|h| h.is_ascii_hexdigit()) => {
                let h2 = chars.next().unwrap_or('0');
                let byte = u8::from_str_radix(&format!("{}{}", h1, h2), 16).unwrap_or(b'?');
                out.push(char::from(byte));
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{normalize, Dn, Rdn};
    use std::str::FromStr;

    #[test]
    fn test_dn_normalisation() {
        let a = normalize("UID=BillyD, OU=Users,  ou=system").expect("dn");
        let b = normalize("uid=billyd,ou=users,ou=system").expect("dn");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "uid=billyd,ou=users,ou=system");
        assert_eq!(a.len(), 3);

        let multi_a = normalize("cn=a+sn=b,ou=system").expect("dn");
        let multi_b = normalize("sn=B+cn=A,ou=system").expect("dn");
        assert_eq!(multi_a, multi_b);

        assert!(normalize("").expect("root").is_root());
        assert!(normalize("ou=system,noequals").is_err());
        assert!(normalize("=value").is_err());
    }

    #[test]
    fn test_dn_escapes() {
        let dn = normalize(r"cn=Smith\, John,ou=system").expect("dn");
        assert_eq!(dn.len(), 2);
        assert_eq!(dn.rdn().map(|r| r.avas()[0].value.as_str()), Some("smith, john"));
        assert_eq!(dn.to_string(), r"cn=smith\, john,ou=system");
        let reparsed = Dn::from_str(&dn.to_string()).expect("dn");
        assert_eq!(dn, reparsed);

        let hex = normalize(r"cn=a\2cb,ou=system").expect("dn");
        assert_eq!(hex.rdn().map(|r| r.avas()[0].value.as_str()), Some("a,b"));
    }

    #[test]
    fn test_dn_ancestry() {
        let system = normalize("ou=system").expect("dn");
        let users = normalize("ou=users,ou=system").expect("dn");
        let billy = normalize("uid=billyd,ou=users,ou=system").expect("dn");

        assert!(system.is_ancestor_of(&billy));
        assert!(!billy.is_ancestor_of(&billy));
        assert!(billy.is_ancestor_or_self_of(&billy));
        assert!(users.is_immediate_superior_of(&billy));
        assert!(!system.is_immediate_superior_of(&billy));
        assert!(billy.is_descendant_or_self_of(&system));
        assert!(Dn::root().is_ancestor_of(&system));

        assert_eq!(billy.parent(), Some(users.clone()));
        assert_eq!(Dn::root().parent(), None);

        let rel = billy.relative_to(&system).expect("relative");
        assert_eq!(rel.to_string(), "uid=billyd,ou=users");
        assert_eq!(rel.concat(&system), billy);
        assert_eq!(users.child(Rdn::new("uid", "BillyD")), billy);

        let ancestors: Vec<String> = billy.ancestors().map(|d| d.to_string()).collect();
        assert_eq!(ancestors, vec!["ou=users,ou=system", "ou=system", ""]);
    }

    #[test]
    fn test_dn_serde() {
        let dn = normalize("uid=billyd,ou=system").expect("dn");
        let s = serde_json::to_string(&dn).expect("ser");
        assert_eq!(s, r#""uid=billyd,ou=system""#);
        let back: Dn = serde_json::from_str(r#""UID=BillyD,OU=System""#).expect("de");
        assert_eq!(back, dn);
        assert!(serde_json::from_str::<Dn>(r#""garbage""#).is_err());
    }
}
