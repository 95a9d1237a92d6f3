use crate::store::{Store, USER_KEY};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// The single logged-in user record. One instance per session; created on
/// mock login, mutated on profile edits and event joins, removed on logout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub college_id: String,
    pub joined_events: Vec<String>,
    pub echo_count: u32,
}

impl User {
    /// The fixed demo account. There is no real authentication; "logging in"
    /// materializes this record.
    fn demo() -> Self {
        Self {
            id: "u123".into(),
            name: "Kate Malone".into(),
            email: "kate.malone@campus.edu".into(),
            photo_url:
                "https://images.unsplash.com/photo-1494790108377-be9c29b29330?auto=format&fit=crop&q=80&w=200"
                    .into(),
            college_id: "tech_univ_01".into(),
            joined_events: Vec::new(),
            echo_count: 3,
        }
    }
}

/// Owns the session user and keeps the persisted copy in sync. Every
/// mutation goes through here; pages never write the user themselves.
pub struct SessionStore {
    store: Store,
    current: Mutex<Option<User>>,
}

impl SessionStore {
    /// Load the persisted user, if any. A corrupt stored value is treated as
    /// logged out rather than an error.
    pub async fn load(store: Store) -> Result<Self> {
        let current = store.get::<User>(USER_KEY).await?;
        Ok(Self {
            store,
            current: Mutex::new(current),
        })
    }

    pub fn current(&self) -> Option<User> {
        self.current.lock().unwrap().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    /// Mock login: materialize the demo user and persist it. Logging in over
    /// an existing session resets it.
    pub async fn login(&self) -> Result<User> {
        let user = User::demo();
        self.persist(user.clone()).await?;
        Ok(user)
    }

    pub async fn logout(&self) -> Result<()> {
        *self.current.lock().unwrap() = None;
        self.store.remove(USER_KEY).await
    }

    /// Replace the session user wholesale and persist.
    pub async fn update(&self, user: User) -> Result<User> {
        self.persist(user.clone()).await?;
        Ok(user)
    }

    /// Rename the current user (the only profile edit the app supports).
    /// No-op when logged out.
    pub async fn rename(&self, name: &str) -> Result<Option<User>> {
        let updated = {
            let guard = self.current.lock().unwrap();
            guard.clone().map(|mut u| {
                u.name = name.to_string();
                u
            })
        };
        match updated {
            Some(user) => Ok(Some(self.update(user).await?)),
            None => Ok(None),
        }
    }

    /// Append `event_id` to the user's joined-events list. Repeat
    /// registration appends again; the list is not deduplicated.
    pub async fn join_event(&self, event_id: &str) -> Result<Option<User>> {
        let updated = {
            let guard = self.current.lock().unwrap();
            guard.clone().map(|mut u| {
                u.joined_events.push(event_id.to_string());
                u
            })
        };
        match updated {
            Some(user) => Ok(Some(self.update(user).await?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, user: User) -> Result<()> {
        self.store.set(USER_KEY, &user).await?;
        *self.current.lock().unwrap() = Some(user);
        Ok(())
    }
}
