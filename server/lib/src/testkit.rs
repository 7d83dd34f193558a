//! Fixtures for tests of the access control engine: an in memory directory with
//! its schema, and helpers to write ACI items without spelling out their JSON.

use serde_json::{json, Value};

use crate::access::{AccessControlsContext, AccessPolicy};
use crate::aci::JsonAciParser;
use crate::be::MemoryBackend;
use crate::filter::SchemaFilterEvaluator;
use crate::prelude::*;
use crate::schema::Schema;

pub struct TestKit {
    pub schema: Arc<Schema>,
    pub be: Arc<MemoryBackend>,
}

impl TestKit {
    /// An empty directory.
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        sketching::test_init();
        TestKit {
            schema: Arc::new(Schema::new().expect("Failed to init schema")),
            be: Arc::new(MemoryBackend::new()),
        }
    }

    /// A directory holding `ou=system` as an access control specific area,
    /// with `ou=users` and `ou=groups` below it.
    pub fn new_system() -> Self {
        let tk = TestKit::new();
        tk.add_entries(vec![
            entry_init!(
                "ou=system",
                ("objectClass", "top"),
                ("objectClass", "organizationalUnit"),
                ("ou", "system"),
                ("administrativeRole", "accessControlSpecificArea")
            ),
            entry_init!(
                "ou=users,ou=system",
                ("objectClass", "organizationalUnit"),
                ("ou", "users")
            ),
            entry_init!(
                "ou=groups,ou=system",
                ("objectClass", "organizationalUnit"),
                ("ou", "groups")
            ),
        ]);
        tk
    }

    #[allow(clippy::expect_used)]
    pub fn add_entries(&self, entries: Vec<Entry>) {
        let mut wr = self.be.write();
        for e in entries {
            wr.add_entry(e).expect("Failed to add test entry");
        }
        wr.commit().expect("Failed to commit test entries");
    }

    #[allow(clippy::expect_used)]
    pub fn replace_entry(&self, entry: Entry) {
        let mut wr = self.be.write();
        wr.update_entry(entry).expect("Failed to update test entry");
        wr.commit().expect("Failed to commit test entry");
    }

    #[allow(clippy::expect_used)]
    pub fn fetch(&self, dn: &str) -> Arc<Entry> {
        self.be.fetch_entry(&dn!(dn)).expect("No such test entry")
    }

    fn add_role(&self, dn: &str, role: &str) {
        let mut e = Entry::clone(&self.fetch(dn));
        e.add_ava("administrativeRole", role);
        self.replace_entry(e);
    }

    pub fn make_specific_area(&self, dn: &str) {
        self.add_role(dn, "accessControlSpecificArea")
    }

    pub fn make_inner_area(&self, dn: &str) {
        self.add_role(dn, "accessControlInnerArea")
    }

    /// Add an access control subentry. Without a subtree specification it
    /// covers the whole area.
    pub fn add_subentry(&self, dn: &str, subtree_specification: Option<&str>, acis: &[String]) {
        let mut e = entry_init!(
            dn,
            ("objectClass", "top"),
            ("objectClass", "subentry"),
            ("objectClass", "accessControlSubentry")
        );
        if let Some(spec) = subtree_specification {
            e.add_ava("subtreeSpecification", spec);
        }
        for aci in acis {
            e.add_ava("prescriptiveACI", aci);
        }
        self.add_entries(vec![e]);
    }

    /// An identity for `uid=<uid>,ou=users,ou=system`, bound with a simple
    /// bind.
    pub fn ident(&self, uid: &str, groups: &[&str]) -> Identity {
        Identity::from_user(
            dn!(&format!("uid={},ou=users,ou=system", uid)),
            groups.iter().map(|g| dn!(g)).collect(),
            AuthenticationLevel::Simple,
        )
    }

    /// As [`ident`](Self::ident), also adding the user's entry.
    pub fn add_user(&self, uid: &str, groups: &[&str]) -> Identity {
        self.add_entries(vec![entry_init!(
            &format!("uid={},ou=users,ou=system", uid),
            ("objectClass", "person"),
            ("uid", uid),
            ("cn", uid),
            ("sn", uid)
        )]);
        self.ident(uid, groups)
    }

    pub fn context(&self) -> AccessControlsContext {
        AccessControlsContext {
            schema: self.schema.clone(),
            store: self.be.clone(),
            admin_points: self.be.clone(),
            filter: Arc::new(SchemaFilterEvaluator::new(self.schema.clone())),
            parser: Arc::new(JsonAciParser),
        }
    }

    #[allow(clippy::expect_used)]
    pub fn access_controls(&self, config: &AccessControlConfig) -> AccessControls {
        AccessControls::new(config, self.context()).expect("Failed to init access controls")
    }
}

impl Default for TestKit {
    fn default() -> Self {
        TestKit::new()
    }
}

#[allow(clippy::expect_used)]
pub fn tk_policy() -> AccessPolicy {
    AccessPolicy::try_from(&AccessControlConfig::default()).expect("Invalid default policy")
}

/// Protected items are given by name, or as a JSON object for those that take
/// arguments.
#[allow(clippy::expect_used)]
fn protected_items(items: &[&str]) -> Value {
    items
        .iter()
        .map(|i| {
            if i.trim_start().starts_with('{') {
                serde_json::from_str(i).expect("Invalid protected item json")
            } else {
                Value::String(i.to_string())
            }
        })
        .collect()
}

fn aci_user_first(
    tag: &str,
    precedence: u8,
    level: &str,
    user_class: Value,
    items: &[&str],
    gads: &[&str],
) -> String {
    json!({
        "identificationTag": tag,
        "precedence": precedence,
        "authenticationLevel": level,
        "itemOrUserFirst": { "userFirst": {
            "userClasses": [ user_class ],
            "userPermissions": [ {
                "protectedItems": protected_items(items),
                "grantsAndDenials": gads,
            } ],
        } },
    })
    .to_string()
}

pub fn aci_all_users(tag: &str, precedence: u8, items: &[&str], gads: &[&str]) -> String {
    aci_user_first(tag, precedence, "none", json!("allUsers"), items, gads)
}

pub fn aci_name(tag: &str, precedence: u8, dn: &str, items: &[&str], gads: &[&str]) -> String {
    aci_user_first(tag, precedence, "none", json!({ "name": [dn] }), items, gads)
}

pub fn aci_group(
    tag: &str,
    precedence: u8,
    group: &str,
    items: &[&str],
    gads: &[&str],
) -> String {
    aci_user_first(
        tag,
        precedence,
        "none",
        json!({ "userGroup": [group] }),
        items,
        gads,
    )
}

/// An item for any user class, given as its JSON encoding.
#[allow(clippy::expect_used)]
pub fn aci_user_class(
    tag: &str,
    precedence: u8,
    user_class: &str,
    items: &[&str],
    gads: &[&str],
) -> String {
    let uc = serde_json::from_str(user_class).expect("Invalid user class json");
    aci_user_first(tag, precedence, "none", uc, items, gads)
}

/// An `allUsers` item that requires `level` authentication.
pub fn aci_with_level(
    tag: &str,
    precedence: u8,
    level: &str,
    items: &[&str],
    gads: &[&str],
) -> String {
    aci_user_first(tag, precedence, level, json!("allUsers"), items, gads)
}
