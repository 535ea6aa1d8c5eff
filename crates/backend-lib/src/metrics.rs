// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const MATCH_CREATED: &str = "match.created";
pub const MATCH_CONTENDED: &str = "match.contended";
pub const MATCH_NO_CANDIDATE: &str = "match.no_candidate";
pub const MATCH_DISSOLVED: &str = "match.dissolved";
pub const SESSION_REPAIRED: &str = "chat.session_repaired";
pub const CHAT_SAVED: &str = "chat.saved";
pub const CHAT_DELETED: &str = "chat.deleted";
pub const CHAT_DISCARDED: &str = "chat.discarded";
pub const MESSAGE_SENT: &str = "chat.message_sent";
pub const QUEUE_EVICTED: &str = "queue.evicted";
pub const EVENTS_LAGGED: &str = "dispatch.events_lagged";
pub const IDENTITY_ISSUED: &str = "identity.issued";
