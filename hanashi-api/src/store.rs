use async_trait::async_trait;

use crate::{Comment, CommentId, Error, NodePath, UserId};

/// Opaque position in a list of replies, defined by the store
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Cursor(pub String);

/// One page of replies, newest first
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page {
    pub replies: Vec<Comment>,

    /// `None` once the last page was returned
    pub next_cursor: Option<Cursor>,
}

/// The remote system of record.
///
/// All paths are node addresses: `parent` designates the node under which
/// `id` lives, `address` the node itself. Comments returned are already
/// rendered for the authenticated viewer (like flag, identity masking).
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn fetch_root(&self, address: &NodePath) -> Result<Comment, Error>;

    /// `cursor == None` asks for the first page
    async fn fetch_replies(
        &self,
        address: &NodePath,
        cursor: Option<&Cursor>,
    ) -> Result<Page, Error>;

    /// The store assigns id and date, and applies the anchor's masking rule
    async fn add_reply(&self, parent: &NodePath, text: &str, author: UserId)
        -> Result<Comment, Error>;

    async fn edit_reply(&self, parent: &NodePath, id: CommentId, text: &str)
        -> Result<(), Error>;

    /// Returns `false` if the comment already was a tombstone
    async fn delete_reply(&self, parent: &NodePath, id: CommentId) -> Result<bool, Error>;

    /// Succeeds without change if the like state already is `liked`
    async fn toggle_like(&self, parent: &NodePath, id: CommentId, liked: bool)
        -> Result<(), Error>;
}
