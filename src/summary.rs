//! Rendering of pending items into a single webhook message.
//!
//! The message lists items newest first, stops before a soft character budget
//! is exceeded and notes how many items were left out. A hard budget is then
//! applied to the whole message so it always fits the webhook's size limit.
//! All lengths are counted in characters, not bytes.

use chrono::{DateTime, Duration, Utc};

use crate::age::format_duration;
use crate::pending::PendingItem;

/// Marker for elided subjects and truncated messages.
const ELLIPSIS: &str = "...";

/// Length limits applied while building a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    /// Item lines are only added while the message stays within this many characters.
    pub list_char_budget: usize,
    /// The finished message is cut to this many characters, plus `...` if anything was cut.
    pub hard_char_budget: usize,
    /// Subjects longer than this are elided.
    pub subject_width: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            list_char_budget: 1950,
            hard_char_budget: 2000 - ELLIPSIS.len(),
            subject_width: 80,
        }
    }
}

/// Build the notification text for `pending`, or `None` if there is nothing to report.
///
/// `attention_message` is put on its own first line when any item was
/// modified less than `max_age` before `now`.
#[must_use]
pub fn build_summary(
    mut pending: Vec<PendingItem>,
    now: DateTime<Utc>,
    max_age: Duration,
    attention_message: &str,
    limits: &SummaryLimits,
) -> Option<String> {
    if pending.is_empty() {
        return None;
    }

    // Stable, so equal timestamps keep feed order.
    pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut msg = String::new();
    if pending.iter().any(|p| recently_modified(p, max_age, now)) {
        msg.push_str(attention_message);
        msg.push('\n');
    }
    let mut msg_len = char_len(&msg);

    let mut listed = 0;
    for item in &pending {
        let line = format!("- {}\n", describe(item, now, limits.subject_width));
        let line_len = char_len(&line);
        if msg_len + line_len > limits.list_char_budget {
            break;
        }
        msg.push_str(&line);
        msg_len += line_len;
        listed += 1;
    }

    if listed != pending.len() {
        msg.push_str(&format!("*({} more...)*", pending.len() - listed));
    }

    Some(truncate(&msg, limits.hard_char_budget))
}

/// Whether `item` changed less than `max_age` before `now`. A window too large to
/// represent covers everything.
fn recently_modified(item: &PendingItem, max_age: Duration, now: DateTime<Utc>) -> bool {
    item.modified_at
        .checked_add_signed(max_age)
        .map_or(true, |urgent_until| urgent_until > now)
}

/// One summary line without the leading bullet.
#[must_use]
pub fn describe(item: &PendingItem, now: DateTime<Utc>, subject_width: usize) -> String {
    let created = format_duration(now - item.created_at);
    let modified = format_duration(now - item.modified_at);
    let age = if created == modified {
        format!("(created {created} ago)")
    } else {
        format!("(created {created} ago, updated {modified} ago)")
    };

    format!(
        "Unanswered {}: [{}](<{}>) {age}",
        item.kind,
        elide(&item.subject, width_or_min(subject_width)),
        item.permalink()
    )
}

/// Shorten `text` to at most `width` characters on word boundaries.
///
/// Runs of whitespace collapse to a single space first. If the text still
/// does not fit, as many leading words as leave room for `...` are kept and
/// `...` follows the last one directly. A hyphen between letters is also a
/// break point, so `abc-defghijklmnop` at width 10 becomes `abc-...`. A first
/// piece that alone is too long leaves just `...`.
#[must_use]
pub fn elide(text: &str, width: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let collapsed = words.join(" ");
    if char_len(&collapsed) <= width {
        return collapsed;
    }

    let room = width.saturating_sub(ELLIPSIS.len());
    let mut kept = String::new();
    let mut kept_len = 0;
    'words: for word in words {
        for (i, piece) in hyphen_pieces(word).into_iter().enumerate() {
            let sep = usize::from(i == 0 && !kept.is_empty());
            let piece_len = char_len(piece);
            if kept_len + sep + piece_len > room {
                break 'words;
            }
            if sep == 1 {
                kept.push(' ');
            }
            kept.push_str(piece);
            kept_len += sep + piece_len;
        }
    }
    kept.push_str(ELLIPSIS);
    kept
}

/// Split `word` after every hyphen that follows two letters and precedes a letter.
fn hyphen_pieces(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut pieces = Vec::new();
    let mut start = 0;
    for i in 2..chars.len().saturating_sub(1) {
        let (at, c) = chars[i];
        if c == '-'
            && chars[i - 1].1.is_alphabetic()
            && chars[i - 2].1.is_alphabetic()
            && chars[i + 1].1.is_alphabetic()
        {
            let end = at + c.len_utf8();
            pieces.push(&word[start..end]);
            start = end;
        }
    }
    pieces.push(&word[start..]);
    pieces
}

fn width_or_min(width: usize) -> usize {
    width.max(ELLIPSIS.len())
}

/// Cut `msg` to `max` characters, appending `...` only if something was removed.
fn truncate(msg: &str, max: usize) -> String {
    match msg.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &msg[..cut]),
        None => msg.to_string(),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
