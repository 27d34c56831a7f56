//! Detection of unanswered questions and followups in a course feed.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::forum::{ForumClient, ForumError, RawPost, RawPostDetail};
use crate::throttle::DetailThrottle;

const PERMALINK_BASE: &str = "https://piazza.com/class";

/// Formats accepted for timestamps without an explicit offset. These are read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Error)]
pub enum PendingError {
    #[error(transparent)]
    Forum(#[from] ForumError),
    #[error("unparseable {field} timestamp on {id}: {value:?}")]
    Timestamp {
        id: String,
        field: &'static str,
        value: String,
    },
    #[error("{id} is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Question,
    Followup,
}

impl PendingKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            PendingKind::Question => "question",
            PendingKind::Followup => "followup",
        }
    }
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An unanswered item old enough to report. Lives for one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub kind: PendingKind,
    pub id: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Number of the thread the item lives in.
    pub post_number: i64,
    pub course_id: String,
}

impl PendingItem {
    #[must_use]
    pub fn permalink(&self) -> String {
        format!(
            "{PERMALINK_BASE}/{}/post/{}",
            self.course_id, self.post_number
        )
    }
}

/// Walk the feed and collect every pending question and followup.
///
/// A question is pending when its unanswered counter is nonzero and it was
/// created more than `min_age` before `now`. Followups are found by scanning
/// the children of any post whose unanswered-followup counter is positive.
/// Both checks can fire for the same post, and each fetches the post detail
/// on its own. Every detail fetch waits on `throttle` first.
///
/// # Errors
///
/// Fails on the first forum error, unparseable timestamp, or missing field.
pub async fn classify(
    client: &dyn ForumClient,
    throttle: &dyn DetailThrottle,
    feed: &[RawPost],
    min_age: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<PendingItem>, PendingError> {
    let course_id = client.course_id();
    let mut pending = Vec::new();

    for post in feed {
        if post.is_question() {
            let no_answer = post.no_answer.ok_or_else(|| PendingError::MissingField {
                id: post.id.clone(),
                field: "no_answer",
            })?;

            if no_answer != 0 {
                let detail = fetch_detail(client, throttle, &post.id).await?;
                let created_at = parse_timestamp(&post.id, "created", &detail.created)?;
                let modified_at = parse_timestamp(&post.id, "modified", &post.modified)?;

                if older_than(created_at, min_age, now) {
                    pending.push(PendingItem {
                        kind: PendingKind::Question,
                        id: post.id.clone(),
                        subject: post.subject.clone(),
                        created_at,
                        modified_at,
                        post_number: post.nr,
                        course_id: course_id.to_string(),
                    });
                }
            }
        }

        if post.no_answer_followup > 0 {
            let detail = fetch_detail(client, throttle, &post.id).await?;
            collect_followups(post, &detail, course_id, min_age, now, &mut pending)?;
        }
    }

    Ok(pending)
}

async fn fetch_detail(
    client: &dyn ForumClient,
    throttle: &dyn DetailThrottle,
    post_id: &str,
) -> Result<RawPostDetail, PendingError> {
    throttle.wait().await;
    debug!(post_id = %post_id, "Fetching post detail");
    Ok(client.get_post(post_id).await?)
}

fn collect_followups(
    post: &RawPost,
    detail: &RawPostDetail,
    course_id: &str,
    min_age: Duration,
    now: DateTime<Utc>,
    pending: &mut Vec<PendingItem>,
) -> Result<(), PendingError> {
    for child in detail.children.iter().filter(|c| c.is_unanswered()) {
        let id = child.id.clone().ok_or_else(|| PendingError::MissingField {
            id: format!("child of {}", post.id),
            field: "id",
        })?;
        let required = |value: &Option<String>, field: &'static str| {
            value.clone().ok_or_else(|| PendingError::MissingField {
                id: id.clone(),
                field,
            })
        };

        let created = required(&child.created, "created")?;
        let updated = required(&child.updated, "updated")?;
        let created_at = parse_timestamp(&id, "created", &created)?;
        let modified_at = parse_timestamp(&id, "updated", &updated)?;

        if older_than(created_at, min_age, now) {
            pending.push(PendingItem {
                kind: PendingKind::Followup,
                subject: required(&child.subject, "subject")?,
                id,
                created_at,
                modified_at,
                post_number: post.nr,
                course_id: course_id.to_string(),
            });
        }
    }
    Ok(())
}

/// Whether `min_age` had passed since `created_at` at `now`. Out-of-range sums never have.
fn older_than(created_at: DateTime<Utc>, min_age: Duration, now: DateTime<Utc>) -> bool {
    created_at
        .checked_add_signed(min_age)
        .is_some_and(|reportable_at| reportable_at < now)
}

/// Parse a forum timestamp. RFC 3339 is preferred; offset-less values are read as UTC.
///
/// # Errors
///
/// Returns [`PendingError::Timestamp`] when no known format matches.
pub fn parse_timestamp(
    id: &str,
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, PendingError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PendingError::Timestamp {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
}
