use crate::{
    api::{
        BusEvent, Comment, CommentId, CommentStore, Cursor, Error, EventData, NodePath, OpId,
        Page, UserId,
    },
    ViewKey,
};

/// Store work started by a view, detached from it while it runs.
///
/// Produced by the `begin_*` functions once the optimistic change is applied;
/// `run` performs the store calls and yields the `Completion` to hand back.
#[derive(Debug)]
pub struct Pending {
    pub(crate) view: ViewKey,
    pub(crate) op: OpId,
    pub(crate) kind: PendingKind,
}

#[derive(Debug)]
pub(crate) enum PendingKind {
    Open {
        address: NodePath,
    },
    LoadMore {
        address: NodePath,
        cursor: Cursor,
    },
    AddReply {
        parent: NodePath,
        local_id: CommentId,
        text: String,
        author: UserId,
    },
    Edit {
        parent: NodePath,
        id: CommentId,
        text: String,
        previous: String,
    },
    Delete {
        parent: NodePath,
        id: CommentId,
        snapshot: Comment,
        was_child: bool,
    },
    Like {
        parent: NodePath,
        id: CommentId,
        liked: bool,
    },
}

#[derive(Debug)]
pub struct Completion {
    pub(crate) view: ViewKey,
    pub(crate) op: OpId,
    pub(crate) outcome: Outcome,
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Opened {
        result: Result<(Comment, Page), Error>,
    },
    MoreLoaded {
        cursor: Cursor,
        result: Result<Page, Error>,
    },
    ReplyAdded {
        parent: NodePath,
        local_id: CommentId,
        result: Result<Comment, Error>,
    },
    Edited {
        parent: NodePath,
        id: CommentId,
        text: String,
        previous: String,
        result: Result<(), Error>,
    },
    Deleted {
        parent: NodePath,
        id: CommentId,
        snapshot: Comment,
        was_child: bool,
        result: Result<bool, Error>,
    },
    Liked {
        parent: NodePath,
        id: CommentId,
        liked: bool,
        result: Result<(), Error>,
    },
}

impl Pending {
    pub fn view(&self) -> ViewKey {
        self.view
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    pub async fn run<S>(self, store: &S) -> Completion
    where
        S: CommentStore + ?Sized,
    {
        let outcome = match self.kind {
            PendingKind::Open { address } => Outcome::Opened {
                result: open(store, &address).await,
            },
            PendingKind::LoadMore { address, cursor } => {
                let result = store.fetch_replies(&address, Some(&cursor)).await;
                Outcome::MoreLoaded { cursor, result }
            }
            PendingKind::AddReply {
                parent,
                local_id,
                text,
                author,
            } => {
                let result = store.add_reply(&parent, &text, author).await;
                Outcome::ReplyAdded {
                    parent,
                    local_id,
                    result,
                }
            }
            PendingKind::Edit {
                parent,
                id,
                text,
                previous,
            } => {
                let result = store.edit_reply(&parent, id, &text).await;
                Outcome::Edited {
                    parent,
                    id,
                    text,
                    previous,
                    result,
                }
            }
            PendingKind::Delete {
                parent,
                id,
                snapshot,
                was_child,
            } => {
                let result = store.delete_reply(&parent, id).await;
                Outcome::Deleted {
                    parent,
                    id,
                    snapshot,
                    was_child,
                    result,
                }
            }
            PendingKind::Like { parent, id, liked } => {
                let result = store.toggle_like(&parent, id, liked).await;
                Outcome::Liked {
                    parent,
                    id,
                    liked,
                    result,
                }
            }
        };
        Completion {
            view: self.view,
            op: self.op,
            outcome,
        }
    }
}

async fn open<S>(store: &S, address: &NodePath) -> Result<(Comment, Page), Error>
where
    S: CommentStore + ?Sized,
{
    let root = store.fetch_root(address).await?;
    let page = store.fetch_replies(address, None).await?;
    Ok((root, page))
}

impl Completion {
    pub fn view(&self) -> ViewKey {
        self.view
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Opened { result } => result.as_ref().err(),
            Outcome::MoreLoaded { result, .. } => result.as_ref().err(),
            Outcome::ReplyAdded { result, .. } => result.as_ref().err(),
            Outcome::Edited { result, .. } => result.as_ref().err(),
            Outcome::Deleted { result, .. } => result.as_ref().err(),
            Outcome::Liked { result, .. } => result.as_ref().err(),
        }
    }

    /// The bus event announcing this mutation, if the store confirmed it
    pub fn confirmed_event(&self) -> Option<BusEvent> {
        let (path, data) = match &self.outcome {
            Outcome::Opened { .. } | Outcome::MoreLoaded { .. } => return None,
            Outcome::ReplyAdded {
                parent,
                result: Ok(comment),
                ..
            } => (
                parent,
                EventData::Add {
                    comment: comment.clone(),
                },
            ),
            Outcome::Edited {
                parent,
                id,
                text,
                result: Ok(()),
                ..
            } => (
                parent,
                EventData::Edit {
                    comment_id: *id,
                    text: text.clone(),
                },
            ),
            // only announce deletions that actually happened now
            Outcome::Deleted {
                parent,
                id,
                result: Ok(true),
                ..
            } => (parent, EventData::Remove { comment_id: *id }),
            Outcome::Liked {
                parent,
                id,
                liked,
                result: Ok(()),
            } => (
                parent,
                EventData::Like {
                    comment_id: *id,
                    liked: *liked,
                },
            ),
            _ => return None,
        };
        Some(BusEvent::new(self.op, path.clone(), data))
    }
}
