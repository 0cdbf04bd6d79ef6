use uuid::Uuid;

use crate::{NodePath, Time, UserId, ValidationError, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    Regular,
    Anonymous,
    Deleted,
}

// Regular and Anonymous are fixed at creation, and both can only ever move
// to Deleted. Nothing in the public API goes the other way.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "visibility", rename_all = "kebab-case")]
enum Body {
    Regular { author: UserId, text: String },
    Anonymous { text: String },
    Deleted,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,

    /// Address of the parent node
    pub path: NodePath,

    pub date: Time,

    like_count: u64,
    viewer_has_liked: bool,

    /// Number of non-deleted direct children
    reply_count: u64,

    #[serde(flatten)]
    body: Body,
}

impl Comment {
    /// Builds a comment as seen by consumers. `author` is dropped unless
    /// `visibility` is `Regular`, and `text` is dropped for tombstones.
    pub fn new(
        id: CommentId,
        path: NodePath,
        date: Time,
        author: UserId,
        text: String,
        visibility: Visibility,
    ) -> Comment {
        let body = match visibility {
            Visibility::Regular => Body::Regular { author, text },
            Visibility::Anonymous => Body::Anonymous { text },
            Visibility::Deleted => Body::Deleted,
        };
        Comment {
            id,
            path,
            date,
            like_count: 0,
            viewer_has_liked: false,
            reply_count: 0,
            body,
        }
    }

    pub fn with_likes(mut self, like_count: u64, viewer_has_liked: bool) -> Comment {
        // a viewer who liked is always counted
        self.like_count = match viewer_has_liked {
            true => like_count.max(1),
            false => like_count,
        };
        self.viewer_has_liked = viewer_has_liked;
        self
    }

    pub fn with_reply_count(mut self, reply_count: u64) -> Comment {
        self.reply_count = reply_count;
        self
    }

    pub fn address(&self) -> NodePath {
        self.path.child(self.id)
    }

    pub fn visibility(&self) -> Visibility {
        match self.body {
            Body::Regular { .. } => Visibility::Regular,
            Body::Anonymous { .. } => Visibility::Anonymous,
            Body::Deleted => Visibility::Deleted,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.body, Body::Deleted)
    }

    /// `None` for anonymous and deleted comments
    pub fn author(&self) -> Option<UserId> {
        match &self.body {
            Body::Regular { author, .. } => Some(*author),
            Body::Anonymous { .. } | Body::Deleted => None,
        }
    }

    /// `None` for deleted comments
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Regular { text, .. } | Body::Anonymous { text } => Some(text),
            Body::Deleted => None,
        }
    }

    pub fn like_count(&self) -> u64 {
        self.like_count
    }

    pub fn viewer_has_liked(&self) -> bool {
        self.viewer_has_liked
    }

    pub fn reply_count(&self) -> u64 {
        self.reply_count
    }

    /// Replaces the text, returning the previous one
    pub fn set_text(&mut self, new_text: String) -> Result<String, ValidationError> {
        match &mut self.body {
            Body::Regular { text, .. } | Body::Anonymous { text } => {
                Ok(std::mem::replace(text, new_text))
            }
            Body::Deleted => Err(ValidationError::Tombstoned { id: self.id }),
        }
    }

    /// Moves the viewer's like flag to `liked`, adjusting the count along.
    /// Returns whether anything changed.
    pub fn set_liked(&mut self, liked: bool) -> bool {
        if self.viewer_has_liked == liked {
            return false;
        }
        self.viewer_has_liked = liked;
        self.like_count = match liked {
            true => self.like_count + 1,
            false => self.like_count.saturating_sub(1),
        };
        true
    }

    pub fn increment_replies(&mut self) {
        self.reply_count += 1;
    }

    pub fn decrement_replies(&mut self) {
        self.reply_count = self.reply_count.saturating_sub(1);
    }

    /// Turns this comment into a tombstone. Returns `false` if it already was one.
    pub fn tombstone(&mut self) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.body = Body::Deleted;
        true
    }
}
