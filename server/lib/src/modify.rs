//! Modification expressions. This is how an LDAP modify request is expressed
//! to the access control engine: an ordered series of changes to the values of
//! the target entry.

use std::slice;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modify {
    /// Add these values.
    Add(AttrString, Vec<String>),
    /// Remove these values, or the whole attribute when no values are given.
    Remove(AttrString, Vec<String>),
    /// Replace all values with these. An empty list removes the attribute.
    Replace(AttrString, Vec<String>),
}

pub fn m_add(attr: &str, vs: &[&str]) -> Modify {
    Modify::Add(
        AttrString::from(attr),
        vs.iter().map(|v| v.to_string()).collect(),
    )
}

pub fn m_remove(attr: &str, vs: &[&str]) -> Modify {
    Modify::Remove(
        AttrString::from(attr),
        vs.iter().map(|v| v.to_string()).collect(),
    )
}

pub fn m_purge(attr: &str) -> Modify {
    Modify::Remove(AttrString::from(attr), Vec::with_capacity(0))
}

pub fn m_replace(attr: &str, vs: &[&str]) -> Modify {
    Modify::Replace(
        AttrString::from(attr),
        vs.iter().map(|v| v.to_string()).collect(),
    )
}

impl Modify {
    pub fn attr(&self) -> &str {
        match self {
            Modify::Add(a, _) | Modify::Remove(a, _) | Modify::Replace(a, _) => a.as_str(),
        }
    }

    /// Apply this change to an entry.
    pub fn apply_to(&self, entry: &mut Entry) {
        match self {
            Modify::Add(a, vs) => {
                for v in vs {
                    entry.add_ava(a, v);
                }
            }
            Modify::Remove(a, vs) if vs.is_empty() => entry.purge_ava(a),
            Modify::Remove(a, vs) => {
                for v in vs {
                    entry.remove_ava(a, v);
                }
            }
            Modify::Replace(a, vs) => {
                entry.purge_ava(a);
                for v in vs {
                    entry.add_ava(a, v);
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModifyList {
    // The order of this list matters. Each change must be done in order.
    mods: Vec<Modify>,
}

impl<'a> IntoIterator for &'a ModifyList {
    type IntoIter = slice::Iter<'a, Modify>;
    type Item = &'a Modify;

    fn into_iter(self) -> Self::IntoIter {
        self.mods.iter()
    }
}

impl ModifyList {
    pub fn new() -> Self {
        ModifyList {
            mods: Vec::with_capacity(0),
        }
    }

    pub fn new_list(mods: Vec<Modify>) -> Self {
        ModifyList { mods }
    }

    pub fn new_append(attr: &str, v: &str) -> Self {
        Self::new_list(vec![m_add(attr, &[v])])
    }

    pub fn new_purge_and_set(attr: &str, v: &str) -> Self {
        Self::new_list(vec![m_replace(attr, &[v])])
    }

    pub fn push_mod(&mut self, modify: Modify) {
        self.mods.push(modify)
    }

    pub fn iter(&self) -> slice::Iter<'_, Modify> {
        self.mods.iter()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// The entry that results from applying every change in order.
    pub fn apply_to(&self, entry: &Entry) -> Entry {
        let mut working = entry.clone();
        for m in self.mods.iter() {
            m.apply_to(&mut working);
        }
        working
    }
}
