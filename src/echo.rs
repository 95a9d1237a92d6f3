use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EchoStatus {
    Pending,
    Investigating,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoComment {
    pub id: String,
    pub text: String,
    pub user: String,
    pub time: String,
}

/// An anonymous community report. `comments` mirrors `comments_list.len()`
/// and the two are updated in lockstep; they must never diverge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub status: EchoStatus,
    pub likes: i64,
    pub comments: usize,
    pub flags: u32,
    pub created_at: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub comments_list: Vec<EchoComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn seed_posts() -> Vec<EchoPost> {
    vec![
        EchoPost {
            id: "r1".into(),
            title: "Library AC Issue".into(),
            content: "The second floor study zone is boiling hot. It's impossible to focus on finals with this heat. Can we get maintenance to look at it?".into(),
            status: EchoStatus::Investigating,
            likes: 245,
            comments: 2,
            flags: 0,
            created_at: "2h ago".into(),
            author_id: "u000".into(),
            image_url: Some("https://images.unsplash.com/photo-1541339907198-e08756ebafe3?auto=format&fit=crop&q=80&w=800".into()),
            comments_list: vec![
                EchoComment {
                    id: "c1".into(),
                    text: "I was there today, it was unbearable!".into(),
                    user: "Anon Student".into(),
                    time: "1h ago".into(),
                },
                EchoComment {
                    id: "c2".into(),
                    text: "Hope they fix it soon, I have an exam tomorrow.".into(),
                    user: "StudyBee".into(),
                    time: "30m ago".into(),
                },
            ],
        },
        EchoPost {
            id: "r2".into(),
            title: "Cafeteria Vegan Options".into(),
            content: "We need more than just a salad bar for vegan options. Please consider adding a dedicated plant-based station for lunches.".into(),
            status: EchoStatus::Resolved,
            likes: 890,
            comments: 1,
            flags: 1,
            created_at: "5h ago".into(),
            author_id: "u111".into(),
            image_url: None,
            comments_list: vec![EchoComment {
                id: "c3".into(),
                text: "Agreed! More variety please.".into(),
                user: "VeggieVibes".into(),
                time: "2h ago".into(),
            }],
        },
        EchoPost {
            id: "r3".into(),
            title: "North Dorm Safety".into(),
            content: "Street lights are out again. Walking back from late labs feels dangerous. Safety should be the priority of our administration.".into(),
            status: EchoStatus::Pending,
            likes: 1204,
            comments: 0,
            flags: 0,
            created_at: "1d ago".into(),
            author_id: "u222".into(),
            image_url: None,
            comments_list: Vec::new(),
        },
    ]
}

struct FeedState {
    posts: Vec<EchoPost>,
    /// Post ids the current session has liked. Toggling flips membership
    /// here and the like counter in the same update.
    liked: HashSet<String>,
}

/// In-memory community feed. No server sync in the original; the feed lives
/// for the lifetime of the daemon.
pub struct EchoFeed {
    state: Mutex<FeedState>,
}

impl EchoFeed {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FeedState {
                posts: seed_posts(),
                liked: HashSet::new(),
            }),
        }
    }

    pub fn posts(&self) -> Vec<EchoPost> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn liked_ids(&self) -> HashSet<String> {
        self.state.lock().unwrap().liked.clone()
    }

    /// Flip the liked state of `post_id` for this session, adjusting the
    /// like counter by exactly one in the same update. Returns the new
    /// liked state, or `None` for an unknown post.
    pub fn toggle_like(&self, post_id: &str) -> Option<bool> {
        let mut state = self.state.lock().unwrap();
        let FeedState { posts, liked } = &mut *state;
        let post = posts.iter_mut().find(|p| p.id == post_id)?;

        let now_liked = if liked.remove(post_id) {
            post.likes -= 1;
            false
        } else {
            liked.insert(post_id.to_string());
            post.likes += 1;
            true
        };
        Some(now_liked)
    }

    /// Prepend a comment and bump the counter in lockstep. Blank text is
    /// rejected; unknown posts return `None`.
    pub fn add_comment(&self, post_id: &str, text: &str) -> Option<EchoComment> {
        if text.trim().is_empty() {
            return None;
        }

        let mut state = self.state.lock().unwrap();
        let post = state.posts.iter_mut().find(|p| p.id == post_id)?;

        let comment = EchoComment {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            user: "You (Anonymous)".into(),
            time: "Just now".into(),
        };
        post.comments_list.insert(0, comment.clone());
        post.comments += 1;
        Some(comment)
    }

    /// Prepend a new post with zeroed counters. Blank title or content is
    /// rejected.
    pub fn create_post(&self, new: NewPost, author_id: &str) -> Option<EchoPost> {
        if new.title.trim().is_empty() || new.content.trim().is_empty() {
            return None;
        }

        let post = EchoPost {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            content: new.content,
            status: EchoStatus::Pending,
            likes: 0,
            comments: 0,
            flags: 0,
            created_at: "Just now".into(),
            author_id: author_id.to_string(),
            image_url: new.image_url,
            comments_list: Vec::new(),
        };

        self.state.lock().unwrap().posts.insert(0, post.clone());
        Some(post)
    }
}

impl Default for EchoFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(feed: &EchoFeed, id: &str) -> EchoPost {
        feed.posts().into_iter().find(|p| p.id == id).unwrap()
    }

    #[test]
    fn like_count_tracks_net_toggles() {
        let feed = EchoFeed::new();
        let initial = post(&feed, "r1").likes;

        assert_eq!(feed.toggle_like("r1"), Some(true));
        assert_eq!(post(&feed, "r1").likes, initial + 1);
        assert!(feed.liked_ids().contains("r1"));

        assert_eq!(feed.toggle_like("r1"), Some(false));
        assert_eq!(post(&feed, "r1").likes, initial);
        assert!(!feed.liked_ids().contains("r1"));

        // An odd number of toggles leaves exactly one net like.
        for _ in 0..5 {
            feed.toggle_like("r1");
        }
        assert_eq!(post(&feed, "r1").likes, initial + 1);
        assert!(feed.liked_ids().contains("r1"));
    }

    #[test]
    fn toggle_like_on_unknown_post_is_a_noop() {
        let feed = EchoFeed::new();
        assert_eq!(feed.toggle_like("missing"), None);
        assert!(feed.liked_ids().is_empty());
    }

    #[test]
    fn comments_prepend_and_counter_matches_list_length() {
        let feed = EchoFeed::new();

        let comment = feed.add_comment("r1", "Same here.").unwrap();
        let p = post(&feed, "r1");
        assert_eq!(p.comments, p.comments_list.len());
        assert_eq!(p.comments_list[0].id, comment.id);

        feed.add_comment("r3", "First!").unwrap();
        let p = post(&feed, "r3");
        assert_eq!(p.comments, 1);
        assert_eq!(p.comments_list.len(), 1);
        assert_eq!(p.comments_list[0].text, "First!");
    }

    #[test]
    fn blank_comment_is_rejected() {
        let feed = EchoFeed::new();
        assert!(feed.add_comment("r1", "   ").is_none());

        let p = post(&feed, "r1");
        assert_eq!(p.comments, 2);
        assert_eq!(p.comments_list.len(), 2);
    }

    #[test]
    fn create_post_prepends_with_zeroed_counters() {
        let feed = EchoFeed::new();
        let created = feed
            .create_post(
                NewPost {
                    title: "Parking Chaos".into(),
                    content: "Lot B is full by 8 AM every day.".into(),
                    image_url: None,
                },
                "u123",
            )
            .unwrap();

        let posts = feed.posts();
        assert_eq!(posts[0].id, created.id);
        assert_eq!(posts[0].likes, 0);
        assert_eq!(posts[0].comments, 0);
        assert_eq!(posts[0].flags, 0);
        assert!(posts[0].comments_list.is_empty());
        assert_eq!(posts[0].status, EchoStatus::Pending);
    }

    #[test]
    fn create_post_rejects_blank_fields() {
        let feed = EchoFeed::new();
        let before = feed.posts().len();

        assert!(feed
            .create_post(
                NewPost {
                    title: " ".into(),
                    content: "body".into(),
                    image_url: None
                },
                "u123"
            )
            .is_none());
        assert!(feed
            .create_post(
                NewPost {
                    title: "title".into(),
                    content: "".into(),
                    image_url: None
                },
                "u123"
            )
            .is_none());
        assert_eq!(feed.posts().len(), before);
    }
}
