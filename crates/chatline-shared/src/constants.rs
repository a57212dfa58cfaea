/// Conversations requested per page (bottom, top, above, below)
pub const CONVERSATION_FETCH_LIMIT: usize = 10;

/// Delay before re-requesting a chatroom that is not available yet
pub const CHATROOM_RETRY_DELAY_MS: u64 = 800;

/// Quiet period before a detected link is decoded into a preview
pub const LINK_PREVIEW_DEBOUNCE_MS: u64 = 500;

/// Date bucket display format (`5 Mar 2024`)
pub const BUCKET_DATE_FORMAT: &str = "%-d %b %Y";

/// Format used to parse a bucket key back into a date
pub const BUCKET_PARSE_FORMAT: &str = "%d %b %Y";

/// Time-of-day format used when rendering messages as text
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M";

/// Raw epochs below this value are seconds, anything above is milliseconds
pub const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Marker the composer inserts for GIF messages; stripped from copied text
pub const GIF_MESSAGE_MARKER: &str = "* This is a gif message. Please update your app *";

/// Base delay for send retries
pub const SEND_RETRY_BASE_DELAY_MS: u64 = 500;

/// Upper bound for send retry delays
pub const SEND_RETRY_MAX_DELAY_MS: u64 = 30_000;
