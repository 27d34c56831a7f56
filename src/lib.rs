//! Piazza pending-post notifier library.
//!
//! Polls one Piazza course for questions and followups that have gone
//! unanswered for too long and posts a summary of them to a chat webhook.

pub mod age;
pub mod config;
pub mod forum;
pub mod notify;
pub mod pending;
pub mod poller;
pub mod prompt;
pub mod summary;
pub mod throttle;

pub use poller::{poll_loop, poll_once, CycleReport};
