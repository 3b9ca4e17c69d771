//! Message module - Chat turns and the ordered message log

mod message_log;
mod types;

pub use message_log::{LogAction, LogChange, LogError, MessageLog};
pub use types::{Message, MessageId, Role};
