use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::forum::ForumClient;
use crate::notify::Notifier;
use crate::pending::classify;
use crate::summary::build_summary;
use crate::throttle::DetailThrottle;

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_posts: usize,
    pub pending: usize,
    pub delivered: bool,
}

/// Check the course forever, sleeping `check_interval` between cycles.
///
/// A failed cycle is logged and the next one starts after the usual interval.
pub async fn poll_loop(
    forum: &dyn ForumClient,
    throttle: &dyn DetailThrottle,
    notifier: &dyn Notifier,
    config: &Config,
) {
    loop {
        match poll_once(forum, throttle, notifier, config).await {
            Ok(report) => {
                debug!(
                    feed_posts = report.feed_posts,
                    pending = report.pending,
                    delivered = report.delivered,
                    "Poll cycle finished"
                );
            }
            Err(e) => {
                error!("Poll error: {e:#}");
            }
        }

        sleep(config.check_interval).await;
    }
}

/// Run one cycle: fetch the feed, find pending items and send a summary if there are any.
///
/// # Errors
///
/// Returns an error if the forum cannot be read, a record is malformed, or
/// the webhook rejects the message. Nothing is sent in the first two cases.
pub async fn poll_once(
    forum: &dyn ForumClient,
    throttle: &dyn DetailThrottle,
    notifier: &dyn Notifier,
    config: &Config,
) -> Result<CycleReport> {
    info!(course_id = %forum.course_id(), "Checking for pending posts");

    let feed = forum
        .get_feed()
        .await
        .context("Failed to fetch course feed")?;
    let checked_at = Utc::now();

    let pending = classify(forum, throttle, &feed, config.min_age, checked_at)
        .await
        .context("Failed to classify course feed")?;

    let pending_count = pending.len();
    info!(pending = pending_count, "Pending posts found");

    let Some(message) = build_summary(
        pending,
        Utc::now(),
        config.max_age,
        &config.notify_message,
        &config.limits,
    ) else {
        return Ok(CycleReport {
            feed_posts: feed.len(),
            pending: 0,
            delivered: false,
        });
    };

    notifier
        .deliver(&message)
        .await
        .context("Failed to deliver summary")?;
    info!(pending = pending_count, "Summary delivered");

    Ok(CycleReport {
        feed_posts: feed.len(),
        pending: pending_count,
        delivered: true,
    })
}
