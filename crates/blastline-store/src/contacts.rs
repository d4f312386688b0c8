//! Contact source rows. Imported by the platform's list tooling; the
//! engine only ever reads them.

use blastline_core::error::{BlastlineError, Result};
use blastline_core::types::Contact;
use rusqlite::params;

use crate::Store;

impl Store {
    /// Seed a contact row into a source list.
    pub fn insert_contact(&self, source_id: &str, contact: &Contact) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO contacts (source_id, phone, fields, verified) VALUES (?1, ?2, ?3, ?4)",
            params![
                source_id,
                contact.phone,
                serde_json::to_string(&contact.fields).unwrap_or_else(|_| "{}".into()),
                contact.verified as i32,
            ],
        )
        .map_err(|e| BlastlineError::Storage(format!("Insert contact: {e}")))?;
        Ok(())
    }

    /// All contacts of a source list, in insertion order.
    pub fn contacts_for_source(&self, source_id: &str) -> Result<Vec<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT phone, fields, verified FROM contacts WHERE source_id = ?1 ORDER BY id")
            .map_err(|e| BlastlineError::Storage(format!("Contacts query: {e}")))?;
        let rows = stmt
            .query_map(params![source_id], |row| {
                let fields_str: String = row.get(1)?;
                Ok(Contact {
                    phone: row.get(0)?,
                    fields: serde_json::from_str(&fields_str).unwrap_or_default(),
                    verified: row.get::<_, i32>(2)? != 0,
                })
            })
            .map_err(|e| BlastlineError::Storage(format!("Contacts query: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_insert_and_list() {
        let store = Store::open_in_memory().unwrap();
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "Asha".to_string());
        store
            .insert_contact(
                "list-1",
                &Contact { phone: "98765 43210".into(), fields, verified: true },
            )
            .unwrap();
        store
            .insert_contact(
                "list-1",
                &Contact { phone: "+14155552671".into(), fields: HashMap::new(), verified: false },
            )
            .unwrap();

        let contacts = store.contacts_for_source("list-1").unwrap();
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].fields.get("name").map(String::as_str), Some("Asha"));
        assert!(store.contacts_for_source("list-2").unwrap().is_empty());
    }
}
