//! The storage facing collaborators of the access control engine.
//!
//! The engine never owns entries. It reads them through [`EntryStore`] and
//! learns the administrative model through [`AdminPointRegistry`]. A directory
//! server implements both over its real backend.
//!
//! [`MemoryBackend`] implements both traits over an in-memory, transactional
//! map. It backs the tests and is a reasonable choice for embedding the engine
//! where the DIT is small.

use concread::cowcell::*;

use crate::prelude::*;

pub trait EntryStore: Send + Sync {
    fn fetch_entry(&self, dn: &Dn) -> Option<Arc<Entry>>;

    fn entry_exists(&self, dn: &Dn) -> bool {
        self.fetch_entry(dn).is_some()
    }

    fn count_immediate_subordinates(&self, dn: &Dn) -> usize;

    /// Every subentry held immediately below an administrative point.
    fn list_subentries(&self, admin_point: &Dn) -> Vec<Arc<Entry>>;
}

pub trait AdminPointRegistry: Send + Sync {
    /// The nearest administrative point at or above `dn` that carries an
    /// access control role.
    fn find_nearest_admin_point(&self, dn: &Dn) -> Option<Dn>;

    fn is_access_control_area(&self, admin_point: &Dn) -> bool;

    /// An inner area adds to, rather than replaces, the ACI of the area that
    /// encloses it.
    fn is_inner_area(&self, admin_point: &Dn) -> bool;
}

fn role_is(value: &str, name: &str, oid: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case(name) || v == oid
}

/// The access control related administrative roles an entry holds.
pub fn admin_roles(entry: &Entry) -> (bool, bool) {
    let roles = entry.get_ava(ATTR_ADMINISTRATIVE_ROLE).unwrap_or(&[]);
    let specific = roles.iter().any(|r| {
        role_is(
            r,
            ROLE_ACCESS_CONTROL_SPECIFIC_AREA,
            OID_ACCESS_CONTROL_SPECIFIC_AREA,
        ) || role_is(r, ROLE_AUTONOMOUS_AREA, OID_AUTONOMOUS_AREA)
    });
    let inner = roles.iter().any(|r| {
        role_is(
            r,
            ROLE_ACCESS_CONTROL_INNER_AREA,
            OID_ACCESS_CONTROL_INNER_AREA,
        )
    });
    (specific, inner)
}

type EntryMap = BTreeMap<Dn, Arc<Entry>>;

pub struct MemoryBackend {
    entries: CowCell<EntryMap>,
}

pub struct MemoryBackendReadTransaction {
    entries: CowCellReadTxn<EntryMap>,
}

pub struct MemoryBackendWriteTransaction<'a> {
    entries: CowCellWriteTxn<'a, EntryMap>,
}

pub trait MemoryBackendTransaction {
    fn get_entries(&self) -> &EntryMap;

    fn get(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.get_entries().get(dn).cloned()
    }

    /// Immediate children of `dn`.
    fn children(&self, dn: &Dn) -> Vec<Arc<Entry>> {
        // Children are not contiguous in key order, so this is a scan.
        self.get_entries()
            .iter()
            .filter(|(k, _)| dn.is_immediate_superior_of(k))
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl MemoryBackendTransaction for MemoryBackendReadTransaction {
    fn get_entries(&self) -> &EntryMap {
        &self.entries
    }
}

impl<'a> MemoryBackendTransaction for MemoryBackendWriteTransaction<'a> {
    fn get_entries(&self) -> &EntryMap {
        &self.entries
    }
}

impl<'a> MemoryBackendWriteTransaction<'a> {
    /// Add an entry. Its superior must already exist unless it is a suffix
    /// (one RDN long).
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), OperationError> {
        let dn = entry.get_dn().clone();
        if self.entries.contains_key(&dn) {
            admin_error!(%dn, "entry already exists");
            return Err(OperationError::InvalidRequestState);
        }
        if let Some(parent) = dn.parent() {
            if !parent.is_root() && !self.entries.contains_key(&parent) {
                admin_error!(%dn, "superior does not exist");
                return Err(OperationError::NoSuchObject {
                    matched: String::new(),
                });
            }
        }
        self.entries.get_mut().insert(dn, Arc::new(entry));
        Ok(())
    }

    /// Replace an existing entry.
    pub fn update_entry(&mut self, entry: Entry) -> Result<(), OperationError> {
        let dn = entry.get_dn().clone();
        if !self.entries.contains_key(&dn) {
            return Err(OperationError::NoSuchObject {
                matched: String::new(),
            });
        }
        self.entries.get_mut().insert(dn, Arc::new(entry));
        Ok(())
    }

    /// Remove a leaf entry.
    pub fn remove_entry(&mut self, dn: &Dn) -> Result<Arc<Entry>, OperationError> {
        if self.entries.keys().any(|k| dn.is_ancestor_of(k)) {
            admin_error!(%dn, "refusing to remove non-leaf entry");
            return Err(OperationError::InvalidRequestState);
        }
        self.entries
            .get_mut()
            .remove(dn)
            .ok_or(OperationError::NoSuchObject {
                matched: String::new(),
            })
    }

    pub fn commit(self) -> Result<(), OperationError> {
        self.entries.commit();
        Ok(())
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            entries: CowCell::new(BTreeMap::new()),
        }
    }

    pub fn read(&self) -> MemoryBackendReadTransaction {
        MemoryBackendReadTransaction {
            entries: self.entries.read(),
        }
    }

    pub fn write(&self) -> MemoryBackendWriteTransaction<'_> {
        MemoryBackendWriteTransaction {
            entries: self.entries.write(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryStore for MemoryBackend {
    fn fetch_entry(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.read().get(dn)
    }

    fn count_immediate_subordinates(&self, dn: &Dn) -> usize {
        self.read().children(dn).len()
    }

    fn list_subentries(&self, admin_point: &Dn) -> Vec<Arc<Entry>> {
        self.read()
            .children(admin_point)
            .into_iter()
            .filter(|e| e.is_subentry())
            .collect()
    }
}

impl AdminPointRegistry for MemoryBackend {
    fn find_nearest_admin_point(&self, dn: &Dn) -> Option<Dn> {
        let txn = self.read();
        std::iter::once(dn.clone())
            .chain(dn.ancestors())
            .find(|candidate| {
                txn.get(candidate)
                    .map(|e| {
                        let (specific, inner) = admin_roles(&e);
                        specific || inner
                    })
                    .unwrap_or(false)
            })
    }

    fn is_access_control_area(&self, admin_point: &Dn) -> bool {
        self.read()
            .get(admin_point)
            .map(|e| {
                let (specific, inner) = admin_roles(&e);
                specific || inner
            })
            .unwrap_or(false)
    }

    fn is_inner_area(&self, admin_point: &Dn) -> bool {
        self.read()
            .get(admin_point)
            .map(|e| {
                let (specific, inner) = admin_roles(&e);
                inner && !specific
            })
            .unwrap_or(false)
    }
}
