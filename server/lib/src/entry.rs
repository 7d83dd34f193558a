//! Entries are the directory objects access control is evaluated against.
//!
//! The engine never mutates an entry held by the store. Entries it returns from
//! search filtering are new, reduced copies made by
//! [`Entry::reduce_attributes`].
//!
//! Attribute names are held lowercased exactly as the store supplied them, and
//! values are held in their raw form. Anything that needs to compare values uses
//! the schema to normalise them first.

use crate::access::search::{AttributeVisibility, VisibilityMask};
use crate::prelude::*;

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attrs: BTreeMap<AttrString, Vec<String>>,
    // Set on reduced entries: the index each kept value had in the entry the
    // visibility mask was computed against.
    value_index: BTreeMap<AttrString, Vec<usize>>,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entry")
            .field("dn", &self.dn.to_string())
            .field("attrs", &self.attrs)
            .finish()
    }
}

fn attr_key(attr: &str) -> AttrString {
    AttrString::from(attr.trim().to_lowercase())
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Entry {
            dn,
            attrs: BTreeMap::new(),
            value_index: BTreeMap::new(),
        }
    }

    pub fn get_dn(&self) -> &Dn {
        &self.dn
    }

    /// A copy of this entry under a new name, as it would appear after a
    /// rename or move.
    pub fn with_dn(&self, dn: Dn) -> Entry {
        Entry {
            dn,
            attrs: self.attrs.clone(),
            value_index: self.value_index.clone(),
        }
    }

    /// Add a value to an attribute. Duplicate values are ignored.
    pub fn add_ava(&mut self, attr: &str, value: &str) {
        let key = attr_key(attr);
        self.value_index.remove(&key);
        let vs = self.attrs.entry(key).or_default();
        if !vs.iter().any(|v| v == value) {
            vs.push(value.to_string());
        }
    }

    /// Replace all values of an attribute. An empty set removes it.
    pub fn set_ava(&mut self, attr: &str, values: Vec<String>) {
        let key = attr_key(attr);
        self.value_index.remove(&key);
        if values.is_empty() {
            self.attrs.remove(&key);
        } else {
            self.attrs.insert(key, values);
        }
    }

    /// Remove one value of an attribute, removing the attribute if it was the
    /// last.
    pub fn remove_ava(&mut self, attr: &str, value: &str) {
        let key = attr_key(attr);
        self.value_index.remove(&key);
        let now_empty = match self.attrs.get_mut(&key) {
            Some(vs) => {
                vs.retain(|v| v != value);
                vs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.attrs.remove(&key);
        }
    }

    pub fn purge_ava(&mut self, attr: &str) {
        let key = attr_key(attr);
        self.value_index.remove(&key);
        self.attrs.remove(&key);
    }

    pub fn get_ava(&self, attr: &str) -> Option<&[String]> {
        self.attrs.get(&attr_key(attr)).map(|vs| vs.as_slice())
    }

    pub fn get_ava_single(&self, attr: &str) -> Option<&str> {
        self.get_ava(attr)
            .and_then(|vs| vs.first())
            .map(|s| s.as_str())
    }

    pub fn attribute_pres(&self, attr: &str) -> bool {
        self.attrs.contains_key(&attr_key(attr))
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&AttrString, &Vec<String>)> {
        self.attrs.iter()
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &AttrString> {
        self.attrs.keys()
    }

    /// The lowercased object classes of this entry.
    pub fn object_classes(&self) -> BTreeSet<String> {
        self.get_ava(ATTR_OBJECT_CLASS)
            .map(|vs| vs.iter().map(|v| v.trim().to_lowercase()).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_ava(ATTR_OBJECT_CLASS)
            .map(|vs| vs.iter().any(|v| v.trim().eq_ignore_ascii_case(class)))
            .unwrap_or(false)
    }

    pub fn is_subentry(&self) -> bool {
        self.has_class(CLASS_SUBENTRY)
    }

    /// The number of values held, across all attributes.
    pub fn value_count(&self) -> usize {
        self.attrs.values().map(|vs| vs.len()).sum()
    }

    /// Reduce this entry to the attributes and values a visibility mask allows.
    /// Returns `None` when the entry itself may not be disclosed. Attributes that
    /// would be left with no values are dropped.
    ///
    /// Value indices in the mask refer to the entry the mask was computed for.
    /// A reduced entry remembers those indices, so reducing it again with the
    /// same mask is a no-op.
    pub fn reduce_attributes(&self, mask: &VisibilityMask) -> Option<Entry> {
        if !mask.entry_disclosed || !mask.dn_disclosed {
            return None;
        }

        let mut attrs = BTreeMap::new();
        let mut value_index = BTreeMap::new();

        for (k, vs) in self.attrs.iter() {
            let origin: Vec<usize> = match self.value_index.get(k) {
                Some(origin) => origin.clone(),
                None => (0..vs.len()).collect(),
            };

            let keep: Vec<(usize, String)> = match mask.attributes.get(k) {
                Some(AttributeVisibility::Visible) => origin
                    .into_iter()
                    .zip(vs.iter().cloned())
                    .collect(),
                Some(AttributeVisibility::ValuesPartiallyVisible(idx)) => origin
                    .into_iter()
                    .zip(vs.iter().cloned())
                    .filter(|(i, _)| idx.contains(i))
                    .collect(),
                Some(AttributeVisibility::Hidden) | None => continue,
            };

            if keep.is_empty() {
                continue;
            }

            let (idx, values): (Vec<usize>, Vec<String>) = keep.into_iter().unzip();
            if self.value_index.contains_key(k) || idx.len() != vs.len() {
                value_index.insert(k.clone(), idx);
            }
            attrs.insert(k.clone(), values);
        }

        Some(Entry {
            dn: self.dn.clone(),
            attrs,
            value_index,
        })
    }
}
