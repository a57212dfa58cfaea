//! Session configuration loaded from environment variables.
//!
//! Every setting has a default matching the behavior of the mobile client,
//! so a session can start with zero configuration.

use std::time::Duration;

use chatline_shared::constants::{
    CHATROOM_RETRY_DELAY_MS, CONVERSATION_FETCH_LIMIT, LINK_PREVIEW_DEBOUNCE_MS,
};
use chatline_shared::time::DateBucketer;

use crate::retry::RetryPolicy;

/// What to do with an optimistic reaction when the backend refuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionFailurePolicy {
    /// Leave the local reaction in place.
    #[default]
    Keep,
    /// Restore the conversation as it was before the reaction.
    Rollback,
}

/// What to do when posting a conversation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendFailurePolicy {
    /// Flag the pending entry as failed and wait for `retry_send`.
    #[default]
    MarkFailed,
    /// Re-post with exponential backoff, then flag as failed.
    Retry { max_attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Conversations per page.
    /// Env: `CHATLINE_PAGE_SIZE`
    /// Default: `10`
    pub page_size: usize,

    /// Delay before re-requesting a chatroom that is not available yet.
    /// Env: `CHATLINE_CHATROOM_RETRY_MS`
    /// Default: `800`
    pub chatroom_retry_delay: Duration,

    /// Give up (and exit the screen) after this many missing-chatroom retries.
    /// Env: `CHATLINE_CHATROOM_MAX_RETRIES`
    /// Default: unbounded.
    pub chatroom_max_retries: Option<u32>,

    /// Quiet period before a detected link is decoded.
    /// Env: `CHATLINE_LINK_DEBOUNCE_MS`
    /// Default: `500`
    pub link_debounce: Duration,

    /// Fixed UTC offset used for date buckets.
    /// Env: `CHATLINE_UTC_OFFSET_MINUTES`
    /// Default: `0`
    pub utc_offset_minutes: i32,

    /// Env: `CHATLINE_REACTION_ROLLBACK` (true/false)
    /// Default: keep.
    pub reaction_failure: ReactionFailurePolicy,

    /// Env: `CHATLINE_SEND_RETRIES` (0 = mark failed immediately)
    /// Default: `0`
    pub send_failure: SendFailurePolicy,

    pub send_retry: RetryPolicy,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: CONVERSATION_FETCH_LIMIT,
            chatroom_retry_delay: Duration::from_millis(CHATROOM_RETRY_DELAY_MS),
            chatroom_max_retries: None,
            link_debounce: Duration::from_millis(LINK_PREVIEW_DEBOUNCE_MS),
            utc_offset_minutes: 0,
            reaction_failure: ReactionFailurePolicy::Keep,
            send_failure: SendFailurePolicy::MarkFailed,
            send_retry: RetryPolicy::default(),
        }
    }
}

impl TimelineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("CHATLINE_PAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid CHATLINE_PAGE_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("CHATLINE_CHATROOM_RETRY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.chatroom_retry_delay = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid CHATLINE_CHATROOM_RETRY_MS, using default")
                }
            }
        }

        if let Some(val) = lookup("CHATLINE_CHATROOM_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => config.chatroom_max_retries = Some(n),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid CHATLINE_CHATROOM_MAX_RETRIES, retrying forever"
                ),
            }
        }

        if let Some(val) = lookup("CHATLINE_LINK_DEBOUNCE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.link_debounce = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid CHATLINE_LINK_DEBOUNCE_MS, using default")
                }
            }
        }

        if let Some(val) = lookup("CHATLINE_UTC_OFFSET_MINUTES") {
            match val.parse::<i32>() {
                Ok(minutes) if minutes.abs() < 24 * 60 => config.utc_offset_minutes = minutes,
                _ => tracing::warn!(value = %val, "Invalid CHATLINE_UTC_OFFSET_MINUTES, using UTC"),
            }
        }

        if let Some(val) = lookup("CHATLINE_REACTION_ROLLBACK") {
            config.reaction_failure = if val != "false" && val != "0" {
                ReactionFailurePolicy::Rollback
            } else {
                ReactionFailurePolicy::Keep
            };
        }

        if let Some(val) = lookup("CHATLINE_SEND_RETRIES") {
            match val.parse::<u32>() {
                Ok(0) => config.send_failure = SendFailurePolicy::MarkFailed,
                Ok(max_attempts) => config.send_failure = SendFailurePolicy::Retry { max_attempts },
                Err(_) => tracing::warn!(value = %val, "Invalid CHATLINE_SEND_RETRIES, using default"),
            }
        }

        config
    }

    pub fn bucketer(&self) -> DateBucketer {
        DateBucketer::new(self.utc_offset_minutes)
    }
}
