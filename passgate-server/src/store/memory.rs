//! In-memory storage backend
//!
//! Used when no database is configured and throughout the test suite. Data
//! does not survive a restart. Uniqueness of usernames and credential ids is
//! enforced through atomic map-entry insertion, mirroring the database
//! constraints of the PostgreSQL backend.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{DeviceType, NewLoginAudit, NewPasskey, PasskeyRecord, StorageError, User};

/// One appended audit row
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Uuid,
    pub credential_id: Option<String>,
    pub client_addr: String,
    pub user_agent: String,
    pub logged_in_at: DateTime<Utc>,
}

/// In-memory credential store
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    /// username -> user id index; owns username uniqueness
    usernames: DashMap<String, Uuid>,
    /// canonical credential id -> record; owns credential id uniqueness
    passkeys: DashMap<String, PasskeyRecord>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_user_by_username(&self, username: &str) -> Option<User> {
        let user_id = *self.usernames.get(username)?;
        self.users.get(&user_id).map(|u| u.clone())
    }

    pub fn find_user_by_id(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn find_or_create_user(&self, username: &str) -> User {
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(entry) => self
                .users
                .get(entry.get())
                .map(|u| u.clone())
                .unwrap_or_else(|| new_user(*entry.get(), username, None)),
            Entry::Vacant(entry) => {
                let user = new_user(Uuid::new_v4(), username, None);
                self.users.insert(user.id, user.clone());
                entry.insert(user.id);
                user
            }
        }
    }

    pub fn create_user_with_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, StorageError> {
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!(
                "username '{username}' is already taken"
            ))),
            Entry::Vacant(entry) => {
                let user = new_user(Uuid::new_v4(), username, Some(password_hash.to_string()));
                self.users.insert(user.id, user.clone());
                entry.insert(user.id);
                Ok(user)
            }
        }
    }

    pub fn passkeys_for_user(&self, user_id: Uuid) -> Vec<PasskeyRecord> {
        let mut records: Vec<PasskeyRecord> = self
            .passkeys
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn find_passkey_for_user(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Option<PasskeyRecord> {
        self.passkeys
            .get(credential_id)
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
    }

    pub fn insert_passkey(&self, passkey: NewPasskey) -> Result<(), StorageError> {
        match self.passkeys.entry(passkey.credential_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!(
                "credential id '{}' is already registered",
                passkey.credential_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(PasskeyRecord {
                    credential_id: passkey.credential_id,
                    user_id: passkey.user_id,
                    public_key: passkey.public_key,
                    counter: passkey.counter,
                    transports: passkey.transports,
                    backup_eligible: false,
                    backup_state: false,
                    device_type: DeviceType::SingleDevice,
                    created_at: Utc::now(),
                    last_used_at: None,
                });
                Ok(())
            }
        }
    }

    pub fn update_passkey_after_auth(
        &self,
        credential_id: &str,
        public_key: serde_json::Value,
        counter: i64,
        backup_state: bool,
    ) -> bool {
        match self.passkeys.get_mut(credential_id) {
            Some(mut entry) => {
                let record = entry.value_mut();
                record.public_key = public_key;
                record.counter = counter;
                record.backup_state = backup_state;
                // A backed-up credential is necessarily backup-eligible
                record.backup_eligible |= backup_state;
                if record.backup_eligible {
                    record.device_type = DeviceType::MultiDevice;
                }
                record.last_used_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn passkey_count(&self) -> usize {
        self.passkeys.len()
    }

    pub fn record_login(&self, entry: NewLoginAudit) {
        let mut audit = self.audit.lock().expect("audit log lock poisoned");
        audit.push(AuditEntry {
            user_id: entry.user_id,
            credential_id: entry.credential_id,
            client_addr: entry.client_addr,
            user_agent: entry.user_agent,
            logged_in_at: Utc::now(),
        });
    }

    #[cfg(test)]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().expect("audit log lock poisoned").clone()
    }
}

fn new_user(id: Uuid, username: &str, password_hash: Option<String>) -> User {
    User {
        id,
        username: username.to_string(),
        password_hash,
        created_at: Utc::now(),
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("users", &self.users.len())
            .field("passkeys", &self.passkeys.len())
            .finish()
    }
}
