//! Forum access: the records the classifier reads and the client that fetches them.

mod piazza;

pub use piazza::{PiazzaClient, DEFAULT_API_URL};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForumError {
    #[error("forum request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login rejected: {0}")]
    Login(String),
    #[error("{method} returned an error: {message}")]
    Api { method: String, message: String },
    #[error("{method} returned no result")]
    EmptyResult { method: String },
    #[error("failed to decode {method} result: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of the course feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
    pub nr: i64,
    /// Last modification time as sent by the forum.
    pub modified: String,
    /// Unanswered-question counter. Only questions carry it.
    #[serde(default)]
    pub no_answer: Option<i64>,
    pub no_answer_followup: i64,
}

impl RawPost {
    #[must_use]
    pub fn is_question(&self) -> bool {
        self.kind == "question"
    }
}

/// Full record of a single post, including its followup thread.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPostDetail {
    /// Creation time. More reliable than anything in the feed summary.
    pub created: String,
    #[serde(default)]
    pub children: Vec<RawChild>,
}

/// A reply attached to a post.
///
/// Answers, followups and followup replies share this shape, so every field
/// is optional. `no_answer` being absent means the child is not something
/// that can be left unanswered; `Some(0)` means it was answered.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChild {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub no_answer: Option<i64>,
}

impl RawChild {
    #[must_use]
    pub fn is_unanswered(&self) -> bool {
        self.no_answer.is_some_and(|n| n != 0)
    }
}

/// Read access to one course on the forum.
#[async_trait]
pub trait ForumClient: Send + Sync {
    /// Identifier of the course this client reads.
    fn course_id(&self) -> &str;

    /// Fetch every post in the course feed.
    async fn get_feed(&self) -> Result<Vec<RawPost>, ForumError>;

    /// Fetch the full record of one post.
    async fn get_post(&self, post_id: &str) -> Result<RawPostDetail, ForumError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_post_without_no_answer() {
        let post: RawPost = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "type": "note",
            "subject": "Welcome",
            "nr": 1,
            "modified": "2024-01-01T00:00:00Z",
            "no_answer_followup": 0
        }))
        .unwrap();

        assert!(!post.is_question());
        assert_eq!(post.no_answer, None);
    }

    #[test]
    fn test_child_answered_states() {
        let missing = RawChild::default();
        let answered = RawChild {
            no_answer: Some(0),
            ..RawChild::default()
        };
        let open = RawChild {
            no_answer: Some(1),
            ..RawChild::default()
        };

        assert!(!missing.is_unanswered());
        assert!(!answered.is_unanswered());
        assert!(open.is_unanswered());
    }

    #[test]
    fn test_detail_ignores_unknown_fields() {
        let detail: RawPostDetail = serde_json::from_value(serde_json::json!({
            "created": "2024-01-01T00:00:00Z",
            "history": [{"subject": "old"}],
            "children": [
                {"id": "c1", "type": "i_answer", "created": "2024-01-01T01:00:00Z"},
                {"id": "c2", "type": "followup", "subject": "hm?", "no_answer": 1,
                 "created": "2024-01-01T02:00:00Z", "updated": "2024-01-01T03:00:00Z"}
            ]
        }))
        .unwrap();

        assert_eq!(detail.children.len(), 2);
        assert!(!detail.children[0].is_unanswered());
        assert!(detail.children[1].is_unanswered());
    }
}
