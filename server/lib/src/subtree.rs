//! RFC 3672 subtree specifications.
//!
//! A subtree specification selects a collection of entries below an
//! administrative point. It is used both to scope prescriptive ACI from an
//! access control subentry and as the `subtree` user class of an ACI item.
//! The textual form stored in the `subtreeSpecification` attribute is the
//! RFC 3672 GSER notation, for example
//!
//! ```text
//! { base "ou=people", specificExclusions { chopAfter:"ou=contractors" },
//!   minimum 1, maximum 2, specificationFilter and:{ item:person, not:item:contractor } }
//! ```

use crate::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum SpecificExclusion {
    /// Exclude the named entry and all of its subordinates.
    ChopBefore(Dn),
    /// Exclude the subordinates of the named entry, but not the entry itself.
    ChopAfter(Dn),
}

/// An objectClass based refinement of a subtree specification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Refinement {
    Item(String),
    And(Vec<Refinement>),
    Or(Vec<Refinement>),
    Not(Box<Refinement>),
}

impl Refinement {
    /// Evaluate against the lowercased object classes of an entry.
    pub fn matches(&self, object_classes: &BTreeSet<String>) -> bool {
        match self {
            Refinement::Item(oc) => object_classes.contains(&oc.to_lowercase()),
            Refinement::And(rs) => rs.iter().all(|r| r.matches(object_classes)),
            Refinement::Or(rs) => rs.iter().any(|r| r.matches(object_classes)),
            Refinement::Not(r) => !r.matches(object_classes),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubtreeSpecification {
    /// Relative to the administrative point.
    #[serde(default)]
    pub base: Dn,
    /// Relative to `base`.
    #[serde(default)]
    pub specific_exclusions: Vec<SpecificExclusion>,
    #[serde(default)]
    pub minimum: usize,
    #[serde(default)]
    pub maximum: Option<usize>,
    #[serde(default)]
    pub specification_filter: Option<Refinement>,
}

impl SubtreeSpecification {
    /// The specification `{}`, covering the administrative point and everything
    /// below it.
    pub fn whole_subtree() -> Self {
        SubtreeSpecification::default()
    }

    /// Does this specification, anchored at `admin_point`, select `dn`?
    ///
    /// `object_classes` are the lowercased object classes of the entry, needed
    /// only when the specification carries a refinement. A refinement with no
    /// object classes available never matches.
    pub fn contains(
        &self,
        admin_point: &Dn,
        dn: &Dn,
        object_classes: Option<&BTreeSet<String>>,
    ) -> bool {
        let base = self.base.concat(admin_point);
        if !base.is_ancestor_or_self_of(dn) {
            return false;
        }

        let distance = dn.len() - base.len();
        if distance < self.minimum {
            return false;
        }
        if let Some(max) = self.maximum {
            if distance > max {
                return false;
            }
        }

        for ex in self.specific_exclusions.iter() {
            match ex {
                SpecificExclusion::ChopBefore(rel) => {
                    if rel.concat(&base).is_ancestor_or_self_of(dn) {
                        return false;
                    }
                }
                SpecificExclusion::ChopAfter(rel) => {
                    if rel.concat(&base).is_ancestor_of(dn) {
                        return false;
                    }
                }
            }
        }

        match (&self.specification_filter, object_classes) {
            (None, _) => true,
            (Some(r), Some(ocs)) => r.matches(ocs),
            (Some(_), None) => false,
        }
    }
}

impl FromStr for SubtreeSpecification {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut p = GserParser::new(s);
        let spec = p.subtree_specification()?;
        p.skip_ws();
        if !p.at_end() {
            return Err(p.err("trailing characters"));
        }
        Ok(spec)
    }
}

struct GserParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> GserParser<'a> {
    fn new(input: &'a str) -> Self {
        GserParser { input, pos: 0 }
    }

    fn err(&self, msg: &str) -> OperationError {
        OperationError::InvalidSubtreeSpecification(format!("{} at offset {}", msg, self.pos))
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, c: char) -> Result<(), OperationError> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.err(&format!("expected '{}'", c)))
        }
    }

    fn ident(&mut self) -> Result<&'a str, OperationError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.err("expected identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn number(&mut self) -> Result<usize, OperationError> {
        let id = self.ident()?;
        id.parse::<usize>()
            .map_err(|_| self.err(&format!("{} is not a non-negative integer", id)))
    }

    // GSER strings are double quoted with "" as the escape for a quote.
    fn string(&mut self) -> Result<String, OperationError> {
        self.eat('"')?;
        let mut out = String::new();
        loop {
            let mut chars = self.rest().chars();
            match chars.next() {
                None => return Err(self.err("unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    if self.rest().starts_with('"') {
                        out.push('"');
                        self.pos += 1;
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn dn(&mut self) -> Result<Dn, OperationError> {
        let s = self.string()?;
        Dn::from_str(&s).map_err(|e| self.err(&e.to_string()))
    }

    fn subtree_specification(&mut self) -> Result<SubtreeSpecification, OperationError> {
        let mut spec = SubtreeSpecification::default();
        let mut seen: BTreeSet<&'a str> = BTreeSet::new();
        self.eat('{')?;
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(spec);
        }
        loop {
            let field = self.ident()?;
            if !seen.insert(field) {
                return Err(self.err(&format!("duplicate component {}", field)));
            }
            match field {
                "base" => spec.base = self.dn()?,
                "specificExclusions" => spec.specific_exclusions = self.exclusions()?,
                "minimum" => spec.minimum = self.number()?,
                "maximum" => spec.maximum = Some(self.number()?),
                "specificationFilter" => spec.specification_filter = Some(self.refinement()?),
                other => return Err(self.err(&format!("unknown component {}", other))),
            }
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.err("expected ',' or '}'")),
            }
        }

        if let Some(max) = spec.maximum {
            if max < spec.minimum {
                return Err(self.err("maximum is less than minimum"));
            }
        }
        Ok(spec)
    }

    fn exclusions(&mut self) -> Result<Vec<SpecificExclusion>, OperationError> {
        let mut out = Vec::new();
        self.eat('{')?;
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            let kind = self.ident()?;
            self.eat(':')?;
            let dn = self.dn()?;
            match kind {
                "chopBefore" => out.push(SpecificExclusion::ChopBefore(dn)),
                "chopAfter" => out.push(SpecificExclusion::ChopAfter(dn)),
                other => return Err(self.err(&format!("unknown exclusion {}", other))),
            }
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(out);
                }
                _ => return Err(self.err("expected ',' or '}'")),
            }
        }
    }

    fn refinement(&mut self) -> Result<Refinement, OperationError> {
        let kind = self.ident()?;
        self.eat(':')?;
        match kind {
            "item" => Ok(Refinement::Item(self.ident()?.to_lowercase())),
            "not" => Ok(Refinement::Not(Box::new(self.refinement()?))),
            "and" | "or" => {
                let mut rs = Vec::new();
                self.eat('{')?;
                if self.peek() != Some('}') {
                    loop {
                        rs.push(self.refinement()?);
                        if self.peek() == Some(',') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.eat('}')?;
                if kind == "and" {
                    Ok(Refinement::And(rs))
                } else {
                    Ok(Refinement::Or(rs))
                }
            }
            other => Err(self.err(&format!("unknown refinement {}", other))),
        }
    }
}
