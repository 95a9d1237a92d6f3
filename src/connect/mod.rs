use crate::store::{Store, CONNECT_PROFILES_KEY};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

pub mod geocode;

/// The connect handshake resolves after this simulated delay.
pub const CONNECT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    Student,
    Alumni,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A directory entry on the Connect map. Two sources: the fixed seed list
/// (never persisted) and user-added entries (persisted under
/// `cf_connect_profiles`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectProfile {
    pub id: String,
    pub name: String,
    pub kind: ProfileKind,
    pub stream: String,
    pub year: String,
    pub interests: Vec<String>,
    pub location: GeoPoint,
    pub avatar: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_role: Option<String>,
}

/// Form input for a user-added profile. `location` must come from a chosen
/// geocode suggestion; without one the save is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub college: String,
    #[serde(default)]
    pub kind: Option<ProfileKind>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub location: Option<GeoPoint>,
}

pub fn seed_profiles() -> Vec<ConnectProfile> {
    vec![
        ConnectProfile {
            id: "p1".into(),
            name: "Troy Blaze".into(),
            kind: ProfileKind::Alumni,
            stream: "Comp Sci".into(),
            year: "Class of 2021".into(),
            interests: vec![
                "Product Design".into(),
                "Basketball".into(),
                "Hiking".into(),
            ],
            location: GeoPoint {
                lat: 12.9352,
                lon: 77.6101,
            },
            avatar: "https://images.unsplash.com/photo-1500648767791-00dcc994a43e?auto=format&fit=crop&q=80&w=200".into(),
            color: "purple".into(),
            current_role: Some("UX Lead @ Google".into()),
        },
        ConnectProfile {
            id: "p2".into(),
            name: "Luna Sparks".into(),
            kind: ProfileKind::Student,
            stream: "Design".into(),
            year: "Sophomore".into(),
            interests: vec![
                "Illustration".into(),
                "Vegan Cooking".into(),
                "Yoga".into(),
            ],
            location: GeoPoint {
                lat: 12.9698,
                lon: 77.5986,
            },
            avatar: "https://images.unsplash.com/photo-1494790108377-be9c29b29330?auto=format&fit=crop&q=80&w=200".into(),
            color: "blue".into(),
            current_role: None,
        },
        ConnectProfile {
            id: "p3".into(),
            name: "Milo Drift".into(),
            kind: ProfileKind::Alumni,
            stream: "Business".into(),
            year: "Class of 2019".into(),
            interests: vec![
                "Venture Capital".into(),
                "Tennis".into(),
                "Travel".into(),
            ],
            location: GeoPoint {
                lat: 12.9141,
                lon: 77.6340,
            },
            avatar: "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?auto=format&fit=crop&q=80&w=200".into(),
            color: "rose".into(),
            current_role: Some("Fintech Founder".into()),
        },
    ]
}

/// The map directory: immutable seed set plus the persisted user-added set,
/// merged at read time. Storage never contains seed ids, so re-seeding can
/// never duplicate entries.
pub struct Directory {
    store: Store,
    seeds: Vec<ConnectProfile>,
    user_added: Mutex<Vec<ConnectProfile>>,
    /// Profile ids the current session has connected with. Never persisted;
    /// the set lives for the lifetime of the daemon.
    connected: Mutex<HashSet<String>>,
}

impl Directory {
    /// Load persisted user-added profiles. A corrupt stored list reads as
    /// empty; any seed ids that leaked into storage are dropped on load.
    pub async fn load(store: Store) -> Result<Self> {
        let seeds = seed_profiles();
        let seed_ids: HashSet<&str> = seeds.iter().map(|p| p.id.as_str()).collect();

        let mut user_added: Vec<ConnectProfile> = store
            .get(CONNECT_PROFILES_KEY)
            .await?
            .unwrap_or_default();
        user_added.retain(|p| !seed_ids.contains(p.id.as_str()));

        Ok(Self {
            store,
            seeds,
            user_added: Mutex::new(user_added),
            connected: Mutex::new(HashSet::new()),
        })
    }

    /// Seed entries followed by user-added entries, in insertion order.
    pub fn all(&self) -> Vec<ConnectProfile> {
        let mut combined = self.seeds.clone();
        combined.extend(self.user_added.lock().unwrap().iter().cloned());
        combined
    }

    /// Case-insensitive substring match against name, stream/college, and
    /// every interest. Stable: matches keep their original relative order.
    pub fn filter(&self, query: &str) -> Vec<ConnectProfile> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.all();
        }
        self.all()
            .into_iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.stream.to_lowercase().contains(&needle)
                    || p.interests
                        .iter()
                        .any(|i| i.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Validate and persist a user-added profile. Returns `None` (a no-op)
    /// when the name or college is blank or no location was chosen.
    pub async fn save(&self, new: NewProfile) -> Result<Option<ConnectProfile>> {
        let name = new.name.trim();
        let college = new.college.trim();
        let Some(location) = new.location else {
            return Ok(None);
        };
        if name.is_empty() || college.is_empty() {
            return Ok(None);
        }

        let profile = ConnectProfile {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind: new.kind.unwrap_or(ProfileKind::Student),
            stream: college.to_string(),
            year: new.year.unwrap_or_default(),
            interests: new.interests,
            location,
            avatar: String::new(),
            color: "slate".into(),
            current_role: None,
        };

        let snapshot = {
            let mut user_added = self.user_added.lock().unwrap();
            user_added.push(profile.clone());
            user_added.clone()
        };
        self.persist(snapshot).await?;

        Ok(Some(profile))
    }

    /// Run the connect handshake against `profile_id`: after the simulated
    /// delay the id joins this session's connected set. Idempotent; returns
    /// whether the id was newly added, or `None` for an unknown profile.
    pub async fn connect(&self, profile_id: &str) -> Option<bool> {
        if !self.all().iter().any(|p| p.id == profile_id) {
            return None;
        }
        tokio::time::sleep(CONNECT_DELAY).await;
        Some(self.connected.lock().unwrap().insert(profile_id.to_string()))
    }

    pub fn connected_ids(&self) -> HashSet<String> {
        self.connected.lock().unwrap().clone()
    }

    async fn persist(&self, mut profiles: Vec<ConnectProfile>) -> Result<()> {
        // Seed ids must never reach storage.
        let seed_ids: HashSet<&str> = self.seeds.iter().map(|p| p.id.as_str()).collect();
        profiles.retain(|p| !seed_ids.contains(p.id.as_str()));
        self.store.set(CONNECT_PROFILES_KEY, &profiles).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_directory() -> (tempfile::TempDir, Directory) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).await.unwrap();
        store.init().await.unwrap();
        let directory = Directory::load(store).await.unwrap();
        (dir, directory)
    }

    fn new_profile(name: &str, college: &str, location: Option<GeoPoint>) -> NewProfile {
        NewProfile {
            name: name.into(),
            college: college.into(),
            location,
            ..Default::default()
        }
    }

    fn somewhere() -> GeoPoint {
        GeoPoint {
            lat: 12.97,
            lon: 77.59,
        }
    }

    #[tokio::test]
    async fn merged_list_is_seeds_then_added_in_order() {
        let (_dir, directory) = open_directory().await;
        directory
            .save(new_profile("Ada", "Math Dept", Some(somewhere())))
            .await
            .unwrap()
            .unwrap();
        directory
            .save(new_profile("Brin", "Physics Dept", Some(somewhere())))
            .await
            .unwrap()
            .unwrap();

        let names: Vec<String> = directory.all().into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec!["Troy Blaze", "Luna Sparks", "Milo Drift", "Ada", "Brin"]
        );
    }

    #[tokio::test]
    async fn filter_matches_name_stream_and_interests_case_insensitively() {
        let (_dir, directory) = open_directory().await;

        let by_name = directory.filter("LUNA");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Luna Sparks");

        let by_stream = directory.filter("comp sci");
        assert_eq!(by_stream.len(), 1);
        assert_eq!(by_stream[0].name, "Troy Blaze");

        let by_interest = directory.filter("tennis");
        assert_eq!(by_interest.len(), 1);
        assert_eq!(by_interest[0].name, "Milo Drift");
    }

    #[tokio::test]
    async fn filter_is_stable_and_blank_query_returns_everything() {
        let (_dir, directory) = open_directory().await;

        // "i" hits several profiles; order must match the merged list.
        let matched: Vec<String> = directory.filter("i").into_iter().map(|p| p.name).collect();
        let all: Vec<String> = directory
            .all()
            .into_iter()
            .filter(|p| matched.contains(&p.name))
            .map(|p| p.name)
            .collect();
        assert_eq!(matched, all);

        assert_eq!(directory.filter("   ").len(), directory.all().len());
    }

    #[tokio::test]
    async fn save_rejects_blank_fields_and_missing_location() {
        let (_dir, directory) = open_directory().await;

        assert!(directory
            .save(new_profile("  ", "Tech Univ", Some(somewhere())))
            .await
            .unwrap()
            .is_none());
        assert!(directory
            .save(new_profile("Ada", "   ", Some(somewhere())))
            .await
            .unwrap()
            .is_none());
        assert!(directory
            .save(new_profile("Ada", "Tech Univ", None))
            .await
            .unwrap()
            .is_none());

        assert_eq!(directory.all().len(), 3); // seeds only
    }

    #[tokio::test]
    async fn storage_never_contains_seed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).await.unwrap();
        store.init().await.unwrap();

        // Simulate an old build that physically merged seeds into storage.
        let mut leaked = seed_profiles();
        leaked.truncate(1);
        store.set(CONNECT_PROFILES_KEY, &leaked).await.unwrap();

        let directory = Directory::load(store.clone()).await.unwrap();
        assert_eq!(directory.all().len(), 3); // not duplicated

        directory
            .save(new_profile("Ada", "Math Dept", Some(somewhere())))
            .await
            .unwrap()
            .unwrap();

        let persisted: Vec<ConnectProfile> =
            store.get(CONNECT_PROFILES_KEY).await.unwrap().unwrap();
        assert!(persisted.iter().all(|p| p.id != "p1"));
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn user_added_profiles_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).await.unwrap();
        store.init().await.unwrap();

        let directory = Directory::load(store.clone()).await.unwrap();
        directory
            .save(new_profile("Ada", "Math Dept", Some(somewhere())))
            .await
            .unwrap()
            .unwrap();

        let reloaded = Directory::load(store).await.unwrap();
        assert_eq!(reloaded.all().len(), 4);
        assert_eq!(reloaded.all()[3].name, "Ada");
    }

    #[tokio::test]
    async fn connect_lands_after_the_delay_and_is_idempotent() {
        let (_dir, directory) = open_directory().await;
        // Pause only after the store setup; the handshake itself never
        // touches the database.
        tokio::time::pause();

        let begun = tokio::time::Instant::now();
        assert_eq!(directory.connect("p1").await, Some(true));
        assert!(begun.elapsed() >= CONNECT_DELAY);
        assert!(directory.connected_ids().contains("p1"));

        assert_eq!(directory.connect("p1").await, Some(false));
        assert_eq!(directory.connected_ids().len(), 1);
    }

    #[tokio::test]
    async fn connect_rejects_unknown_profiles() {
        let (_dir, directory) = open_directory().await;
        assert_eq!(directory.connect("nope").await, None);
        assert!(directory.connected_ids().is_empty());
    }

    #[tokio::test]
    async fn user_added_profiles_can_be_connected() {
        let (_dir, directory) = open_directory().await;
        let added = directory
            .save(new_profile("Ada", "Math Dept", Some(somewhere())))
            .await
            .unwrap()
            .unwrap();
        tokio::time::pause();

        assert_eq!(directory.connect(&added.id).await, Some(true));
        assert!(directory.connected_ids().contains(&added.id));
    }

    #[tokio::test]
    async fn corrupt_profile_list_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("test.db")).await.unwrap();
        store.init().await.unwrap();
        store
            .put_raw(CONNECT_PROFILES_KEY, "[{\"id\": truncated")
            .await
            .unwrap();

        let directory = Directory::load(store).await.unwrap();
        assert_eq!(directory.all().len(), 3);
    }
}
