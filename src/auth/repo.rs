use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::auth::repo_types::{SessionUser, UserRecord, UsersDocument};
use crate::storage::KeyValueStore;

pub const USERS_KEY: &str = "nutrivision_users";
pub const SESSION_KEY: &str = "user";

/// Persisted user records, one document for all users.
pub struct UserDirectory {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl UserDirectory {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> anyhow::Result<UsersDocument> {
        match self.kv.get(USERS_KEY).await.context("read users")? {
            Some(raw) => serde_json::from_str(&raw).context("parse users document"),
            None => Ok(UsersDocument::default()),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.load().await?.find_by_email(email).cloned())
    }

    pub async fn find_by_id(&self, uid: Uuid) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.load().await?.users.get(&uid).cloned())
    }

    /// Read-modify-write of the users document under the directory lock.
    pub async fn update<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut UsersDocument) -> anyhow::Result<T>,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let out = f(&mut doc)?;
        let raw = serde_json::to_string(&doc).context("serialize users document")?;
        self.kv.set(USERS_KEY, &raw).await.context("write users")?;
        Ok(out)
    }
}

/// The signed-in user's blob, read by the gateway for profile identity.
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// `None` when nobody is signed in or the blob cannot be read.
    pub async fn current(&self) -> Option<SessionUser> {
        let raw = match self.kv.get(SESSION_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "session read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "session blob is corrupt; ignoring");
                None
            }
        }
    }

    pub async fn save(&self, session: &SessionUser) -> anyhow::Result<()> {
        let raw = serde_json::to_string(session).context("serialize session")?;
        self.kv.set(SESSION_KEY, &raw).await.context("write session")
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.kv.remove(SESSION_KEY).await.context("remove session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::ProfileData;
    use crate::meals::repo_types::Role;
    use crate::storage::MemoryStore;

    fn record(email: &str) -> UserRecord {
        UserRecord {
            uid: Uuid::new_v4(),
            email: email.into(),
            name: "Test".into(),
            role: Role::User,
            password_hash: "hash".into(),
            created_at: 0,
            last_login: 0,
            profile: ProfileData::default(),
        }
    }

    #[tokio::test]
    async fn directory_inserts_and_finds() {
        let dir = UserDirectory::new(Arc::new(MemoryStore::new()));
        let rec = record("a@b.co");
        let uid = rec.uid;
        dir.update(|doc| {
            doc.users.insert(rec.uid, rec);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(dir.find_by_email("a@b.co").await.unwrap().unwrap().uid, uid);
        assert!(dir.find_by_id(uid).await.unwrap().is_some());
        assert!(dir.find_by_email("nobody@b.co").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_update_writes_nothing() {
        let kv = Arc::new(MemoryStore::new());
        let dir = UserDirectory::new(kv.clone());
        let res: anyhow::Result<()> = dir
            .update(|doc| {
                doc.users.insert(Uuid::new_v4(), record("x@y.io"));
                anyhow::bail!("nope")
            })
            .await;
        assert!(res.is_err());
        assert!(kv.get(USERS_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_roundtrip_and_corrupt_blob() {
        let kv = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(kv.clone());
        assert!(sessions.current().await.is_none());

        let s = SessionUser {
            name: Some("Ana".into()),
            ..SessionUser::default()
        };
        sessions.save(&s).await.unwrap();
        assert_eq!(sessions.current().await, Some(s));

        kv.set(SESSION_KEY, "not json").await.unwrap();
        assert!(sessions.current().await.is_none());

        sessions.clear().await.unwrap();
        assert!(kv.get(SESSION_KEY).await.unwrap().is_none());
    }
}
