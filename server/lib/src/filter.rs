//! LDAP search filters, as used by the `rangeOfValues` protected item and by
//! subtree specification refinements.
//!
//! Evaluation follows the three valued logic of RFC 4511: a component that
//! names an attribute type unknown to schema is `Undefined`, and `Undefined`
//! never matches. Evaluation is total, a bad filter never produces an error
//! at decision time.

use crate::prelude::*;
use crate::schema::{attribute_is_or_descends_from, MAX_SUPERIOR_DEPTH};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    Equality(AttrString, String),
    Present(AttrString),
    Substring {
        attr: AttrString,
        #[serde(default)]
        initial: Option<String>,
        #[serde(default)]
        any: Vec<String>,
        #[serde(default, rename = "final")]
        fin: Option<String>,
    },
    GreaterOrEqual(AttrString, String),
    LessOrEqual(AttrString, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

pub fn f_eq(a: &str, v: &str) -> Filter {
    Filter::Equality(AttrString::from(a), v.to_string())
}

pub fn f_pres(a: &str) -> Filter {
    Filter::Present(AttrString::from(a))
}

/// A substring filter of the form `initial*any*...*final`.
pub fn f_sub(a: &str, initial: Option<&str>, any: &[&str], fin: Option<&str>) -> Filter {
    Filter::Substring {
        attr: AttrString::from(a),
        initial: initial.map(str::to_string),
        any: any.iter().map(|s| s.to_string()).collect(),
        fin: fin.map(str::to_string),
    }
}

pub fn f_and(vs: Vec<Filter>) -> Filter {
    Filter::And(vs)
}

pub fn f_or(vs: Vec<Filter>) -> Filter {
    Filter::Or(vs)
}

pub fn f_not(f: Filter) -> Filter {
    Filter::Not(Box::new(f))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Filter::Equality(a, v) => write!(f, "({}={})", a, escape(v)),
            Filter::Present(a) => write!(f, "({}=*)", a),
            Filter::Substring {
                attr,
                initial,
                any,
                fin,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(i) = initial {
                    f.write_str(&escape(i))?;
                }
                f.write_str("*")?;
                for a in any {
                    write!(f, "{}*", escape(a))?;
                }
                if let Some(fi) = fin {
                    f.write_str(&escape(fi))?;
                }
                f.write_str(")")
            }
            Filter::GreaterOrEqual(a, v) => write!(f, "({}>={})", a, escape(v)),
            Filter::LessOrEqual(a, v) => write!(f, "({}<={})", a, escape(v)),
            Filter::And(vs) => {
                f.write_str("(&")?;
                for v in vs {
                    write!(f, "{}", v)?;
                }
                f.write_str(")")
            }
            Filter::Or(vs) => {
                f.write_str("(|")?;
                for v in vs {
                    write!(f, "{}", v)?;
                }
                f.write_str(")")
            }
            Filter::Not(v) => write!(f, "(!{})", v),
        }
    }
}

fn escape(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            _ => out.push(c),
        }
    }
    out
}

/// Parses the RFC 4515 string representation of a filter. Extensible match
/// and approximate match are not supported.
impl FromStr for Filter {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.trim().chars().collect();
        let mut parser = FilterParser { chars, pos: 0 };
        let f = parser.filter()?;
        if parser.pos != parser.chars.len() {
            return Err(OperationError::InvalidFilter(format!(
                "trailing characters in {}",
                s
            )));
        }
        Ok(f)
    }
}

struct FilterParser {
    chars: Vec<char>,
    pos: usize,
}

impl FilterParser {
    fn err(&self, msg: &str) -> OperationError {
        OperationError::InvalidFilter(format!("{} at offset {}", msg, self.pos))
    }

    fn expect(&mut self, c: char) -> Result<(), OperationError> {
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(&format!("expected '{}'", c)))
        }
    }

    fn filter(&mut self) -> Result<Filter, OperationError> {
        self.expect('(')?;
        let f = match self.chars.get(self.pos) {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.err("unexpected end of filter")),
        };
        self.expect(')')?;
        Ok(f)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, OperationError> {
        let mut fs = Vec::new();
        while self.chars.get(self.pos) == Some(&'(') {
            fs.push(self.filter()?);
        }
        Ok(fs)
    }

    fn item(&mut self) -> Result<Filter, OperationError> {
        let start = self.pos;
        while let Some(c) = self.chars.get(self.pos) {
            if matches!(c, '=' | '<' | '>' | '~' | ')' | '(') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(self.err("missing attribute description"));
        }
        let attr = AttrString::from(attr.to_lowercase());

        let op = match self.chars.get(self.pos) {
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('<' | '>')) => {
                let c = *c;
                self.pos += 1;
                self.expect('=')?;
                c
            }
            _ => return Err(self.err("unsupported filter type")),
        };

        // Raw value pieces split on unescaped '*'.
        let mut pieces: Vec<String> = vec![String::new()];
        while let Some(c) = self.chars.get(self.pos).copied() {
            match c {
                ')' => break,
                '(' => return Err(self.err("unescaped '(' in value")),
                '*' => {
                    pieces.push(String::new());
                    self.pos += 1;
                }
                '\\' => {
                    let hex: String = self
                        .chars
                        .get(self.pos + 1..self.pos + 3)
                        .map(|h| h.iter().collect())
                        .ok_or_else(|| self.err("truncated escape"))?;
                    let b = u8::from_str_radix(&hex, 16).map_err(|_| self.err("bad escape"))?;
                    if let Some(last) = pieces.last_mut() {
                        last.push(b as char);
                    }
                    self.pos += 3;
                }
                _ => {
                    if let Some(last) = pieces.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
            }
        }

        match op {
            '<' | '>' if pieces.len() != 1 => Err(self.err("wildcard in ordering filter")),
            '<' => Ok(Filter::LessOrEqual(attr, pieces.remove(0))),
            '>' => Ok(Filter::GreaterOrEqual(attr, pieces.remove(0))),
            _ if pieces.len() == 1 => Ok(Filter::Equality(attr, pieces.remove(0))),
            _ if pieces.len() == 2 && pieces.iter().all(|p| p.is_empty()) => {
                Ok(Filter::Present(attr))
            }
            _ => {
                let fin = pieces.pop().filter(|p| !p.is_empty());
                let initial = Some(pieces.remove(0)).filter(|p| !p.is_empty());
                let any = pieces.into_iter().filter(|p| !p.is_empty()).collect();
                Ok(Filter::Substring {
                    attr,
                    initial,
                    any,
                    fin,
                })
            }
        }
    }
}

/// Decides whether an entry matches a filter.
pub trait FilterEvaluator: Send + Sync {
    fn matches(&self, filter: &Filter, entry: &Entry) -> bool;
}

/// The default, schema aware filter evaluator.
pub struct SchemaFilterEvaluator {
    schema: Arc<dyn SchemaOracle>,
}

impl SchemaFilterEvaluator {
    pub fn new(schema: Arc<dyn SchemaOracle>) -> Self {
        SchemaFilterEvaluator { schema }
    }

    /// The normalised values of every attribute on `entry` that is `attr` or a
    /// sub-type of it. `None` if `attr` is not known to schema.
    fn values_for(&self, attr: &str, entry: &Entry) -> Option<Vec<(AttributeTypeId, String)>> {
        let wanted = self.schema.resolve_attribute_type(attr)?;
        let mut out = Vec::new();
        for (name, vs) in entry.attrs() {
            let Some(have) = self.schema.resolve_attribute_type(name) else {
                continue;
            };
            if !attribute_is_or_descends_from(
                self.schema.as_ref(),
                &have,
                &wanted,
                MAX_SUPERIOR_DEPTH,
            ) {
                continue;
            }
            for v in vs {
                match self.schema.normalize_value(&have, v) {
                    Ok(nv) => out.push((have.clone(), nv)),
                    Err(e) => {
                        filter_trace!(?e, attr = %name, "value could not be normalised, skipping");
                    }
                }
            }
        }
        Some(out)
    }

    fn assertion(&self, attr: &str, value: &str) -> Option<(AttributeTypeId, String)> {
        let id = self.schema.resolve_attribute_type(attr)?;
        let nv = self.schema.normalize_value(&id, value).ok()?;
        Some((id, nv))
    }

    fn ordering_test(&self, attr: &str, value: &str, entry: &Entry, want: Ordering) -> Option<bool> {
        let (_, assert_v) = self.assertion(attr, value)?;
        let values = self.values_for(attr, entry)?;
        Some(values.iter().any(|(_, v)| {
            let ord = match (v.parse::<i64>(), assert_v.parse::<i64>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => v.as_str().cmp(assert_v.as_str()),
            };
            ord == want || ord == Ordering::Equal
        }))
    }

    /// `None` is the Undefined result.
    fn eval(&self, filter: &Filter, entry: &Entry) -> Option<bool> {
        match filter {
            Filter::Equality(a, v) => {
                let (_, assert_v) = self.assertion(a, v)?;
                let values = self.values_for(a, entry)?;
                Some(values.iter().any(|(_, ev)| ev == &assert_v))
            }
            Filter::Present(a) => {
                if a.eq_ignore_ascii_case(ATTR_OBJECT_CLASS) {
                    return Some(true);
                }
                let values = self.values_for(a, entry)?;
                Some(!values.is_empty())
            }
            Filter::Substring {
                attr,
                initial,
                any,
                fin,
            } => {
                let id = self.schema.resolve_attribute_type(attr)?;
                let norm = |s: &str| self.schema.normalize_value(&id, s).ok();
                let initial = match initial {
                    Some(i) => Some(norm(i)?),
                    None => None,
                };
                let fin = match fin {
                    Some(f) => Some(norm(f)?),
                    None => None,
                };
                let any = any.iter().map(|a| norm(a)).collect::<Option<Vec<_>>>()?;
                let values = self.values_for(attr, entry)?;
                Some(
                    values
                        .iter()
                        .any(|(_, v)| substring_match(v, initial.as_deref(), &any, fin.as_deref())),
                )
            }
            Filter::GreaterOrEqual(a, v) => self.ordering_test(a, v, entry, Ordering::Greater),
            Filter::LessOrEqual(a, v) => self.ordering_test(a, v, entry, Ordering::Less),
            Filter::And(fs) => {
                let mut result = Some(true);
                for f in fs {
                    match self.eval(f, entry) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Filter::Or(fs) => {
                let mut result = Some(false);
                for f in fs {
                    match self.eval(f, entry) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Filter::Not(f) => self.eval(f, entry).map(|r| !r),
        }
    }
}

fn substring_match(v: &str, initial: Option<&str>, any: &[String], fin: Option<&str>) -> bool {
    let mut rest = v;
    if let Some(i) = initial {
        match rest.strip_prefix(i) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for a in any {
        match rest.find(a.as_str()) {
            Some(idx) => rest = &rest[idx + a.len()..],
            None => return false,
        }
    }
    match fin {
        Some(f) => rest.ends_with(f),
        None => true,
    }
}

impl FilterEvaluator for SchemaFilterEvaluator {
    fn matches(&self, filter: &Filter, entry: &Entry) -> bool {
        let r = self.eval(filter, entry);
        filter_trace!(%filter, dn = %entry.get_dn(), result = ?r, "filter evaluated");
        r == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::SchemaFilterEvaluator;
    use crate::prelude::*;
    use crate::schema::Schema;
    use std::str::FromStr;

    fn evaluator() -> SchemaFilterEvaluator {
        let schema = Schema::new().expect("schema");
        SchemaFilterEvaluator::new(Arc::new(schema))
    }

    fn person() -> Entry {
        entry_init!(
            "uid=alice,ou=users,dc=example",
            ("objectClass", "top"),
            ("objectClass", "person"),
            ("uid", "alice"),
            ("cn", "Alice Smith"),
            ("employeeNumber", "42"),
            ("telephoneNumber", "+1 555-0100")
        )
    }

    #[test]
    fn test_filter_parse_display() {
        let f = Filter::from_str("(&(objectClass=person)(|(cn=al*ce)(!(uid=*))))").expect("parse");
        assert_eq!(
            f,
            f_and(vec![
                f_eq("objectclass", "person"),
                f_or(vec![
                    f_sub("cn", Some("al"), &[], Some("ce")),
                    f_not(f_pres("uid")),
                ]),
            ])
        );
        assert_eq!(
            f.to_string(),
            "(&(objectclass=person)(|(cn=al*ce)(!(uid=*))))"
        );
        assert_eq!(
            Filter::from_str("(cn=a\\2ab)").expect("parse"),
            f_eq("cn", "a*b")
        );

        assert!(Filter::from_str("(cn=a").is_err());
        assert!(Filter::from_str("cn=a").is_err());
        assert!(Filter::from_str("(=a)").is_err());
        assert!(Filter::from_str("(cn~=a)").is_err());
        assert!(Filter::from_str("(cn=a))").is_err());
    }

    #[test]
    fn test_filter_eval_basic() {
        sketching::test_init();
        let fe = evaluator();
        let e = person();

        assert!(fe.matches(&f_eq("objectClass", "PERSON"), &e));
        assert!(fe.matches(&f_eq("commonName", "alice   smith"), &e));
        // Sub-types match through their superior.
        assert!(fe.matches(&f_eq("name", "alice smith"), &e));
        assert!(fe.matches(&f_pres("telephonenumber"), &e));
        assert!(!fe.matches(&f_pres("mail"), &e));
        assert!(fe.matches(&f_eq("telephoneNumber", "+15550100"), &e));
        assert!(fe.matches(&f_sub("cn", Some("ali"), &["e s"], Some("th")), &e));
        assert!(!fe.matches(&f_sub("cn", Some("smith"), &[], None), &e));
    }

    #[test]
    fn test_filter_eval_ordering() {
        let fe = evaluator();
        let e = person();
        assert!(fe.matches(&Filter::from_str("(employeeNumber>=9)").expect("parse"), &e));
        assert!(!fe.matches(&Filter::from_str("(employeeNumber<=9)").expect("parse"), &e));
        assert!(fe.matches(&Filter::from_str("(employeeNumber<=42)").expect("parse"), &e));
    }

    #[test]
    fn test_filter_eval_undefined() {
        let fe = evaluator();
        let e = person();
        // Unknown attribute types are undefined, and so is their negation.
        assert!(!fe.matches(&f_eq("nonexistent", "x"), &e));
        assert!(!fe.matches(&f_not(f_eq("nonexistent", "x")), &e));
        assert!(fe.matches(&f_or(vec![f_eq("nonexistent", "x"), f_pres("uid")]), &e));
        assert!(!fe.matches(&f_and(vec![f_eq("nonexistent", "x"), f_pres("uid")]), &e));
        // An assertion value that fails syntax is undefined.
        assert!(!fe.matches(&f_eq("employeeNumber", "forty"), &e));
    }

    #[test]
    fn test_filter_serde() {
        let f = f_and(vec![f_eq("cn", "a"), f_sub("sn", None, &["b"], None)]);
        let s = serde_json::to_string(&f).expect("serialise");
        let back: Filter = serde_json::from_str(&s).expect("deserialise");
        assert_eq!(f, back);

        let j = r#"{"substring":{"attr":"cn","final":"z"}}"#;
        let f2: Filter = serde_json::from_str(j).expect("deserialise");
        assert_eq!(f2, f_sub("cn", None, &[], Some("z")));
    }
}
