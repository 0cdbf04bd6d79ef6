use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Longest comment body accepted, in bytes
pub const MAX_TEXT_LEN: usize = 8 * 1024;

mod anchor;
pub use anchor::{Anchor, AnchorId, Privacy};

mod comment;
pub use comment::{Comment, CommentId, Visibility};

mod error;
pub use error::{Error, ValidationError};

mod event;
pub use event::{BusEvent, EventData, OpId};

mod path;
pub use path::NodePath;

mod store;
pub use store::{CommentStore, Cursor, Page};

mod user;
pub use user::UserId;

/// Checks a comment body before it is sent anywhere
pub fn validate_text(text: &str, max_len: usize) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if text.contains('\0') {
        return Err(ValidationError::NullByteInText {
            text: text.to_string(),
        });
    }
    if text.len() > max_len {
        return Err(ValidationError::TextTooLong {
            len: text.len(),
            max: max_len,
        });
    }
    Ok(())
}
