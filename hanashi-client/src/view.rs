use std::collections::HashSet;

use chrono::Utc;

use crate::{
    api::{
        self, Anchor, Comment, CommentId, CommentStore, Cursor, Error, NodePath, OpId, UserId,
        Uuid, ValidationError,
    },
    pending::{Outcome, Pending, PendingKind},
    Completion, EventBus, Subscription,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ViewKey(pub Uuid);

impl ViewKey {
    pub fn new() -> ViewKey {
        ViewKey(Uuid::new_v4())
    }
}

impl Default for ViewKey {
    fn default() -> ViewKey {
        ViewKey::new()
    }
}

/// In-memory state of one open thread: a root comment and its direct replies.
///
/// Mutations are applied optimistically by the `begin_*` functions, confirmed
/// or rolled back by `complete`, and announced on the bus once the store
/// accepted them. Events from other views are applied by `sync_events`.
#[derive(Debug)]
pub struct ThreadView {
    pub(crate) key: ViewKey,
    pub(crate) address: NodePath,
    anchor: Anchor,
    max_text_len: usize,

    pub(crate) root: Option<Comment>,

    /// Newest first
    pub(crate) replies: Vec<Comment>,
    next_cursor: Option<Cursor>,

    root_loaded: bool,
    replies_loaded: bool,
    loading: bool,
    loading_more: bool,
    network_failure: bool,
    pub(crate) closed: bool,
    error: Option<Error>,

    /// Locally synthesized replies the store has not acknowledged yet
    local_replies: HashSet<CommentId>,

    /// Mutations this view published and has not seen come back yet
    pub(crate) own_ops: HashSet<OpId>,

    pub(crate) subscription: Subscription,
    bus: EventBus,
}

impl ThreadView {
    /// Creates an unloaded view on `address` and subscribes it to `bus`
    pub fn new(address: NodePath, anchor: Anchor, bus: EventBus) -> Result<ThreadView, Error> {
        if address.is_anchor() {
            return Err(ValidationError::AnchorPath.into());
        }
        if address.anchor != anchor.id {
            return Err(Error::not_found(address));
        }
        Ok(ThreadView {
            key: ViewKey::new(),
            subscription: bus.subscribe(address.clone()),
            address,
            anchor,
            max_text_len: api::MAX_TEXT_LEN,
            root: None,
            replies: Vec::new(),
            next_cursor: None,
            root_loaded: false,
            replies_loaded: false,
            loading: false,
            loading_more: false,
            network_failure: false,
            closed: false,
            error: None,
            local_replies: HashSet::new(),
            own_ops: HashSet::new(),
            bus,
        })
    }

    pub fn with_max_text_len(mut self, max_text_len: usize) -> ThreadView {
        self.max_text_len = max_text_len;
        self
    }

    pub fn key(&self) -> ViewKey {
        self.key
    }

    pub fn address(&self) -> &NodePath {
        &self.address
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn root(&self) -> Option<&Comment> {
        self.root.as_ref()
    }

    pub fn replies(&self) -> &[Comment] {
        &self.replies
    }

    pub fn reply(&self, id: &CommentId) -> Option<&Comment> {
        self.replies.iter().find(|c| c.id == *id)
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn is_root_loaded(&self) -> bool {
        self.root_loaded
    }

    pub fn is_replies_loaded(&self) -> bool {
        self.replies_loaded
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    /// Set when loading failed for a retryable reason; see `begin_retry`
    pub fn network_failure(&self) -> bool {
        self.network_failure
    }

    /// Set once the root no longer resolves. A closed view ignores everything.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Last failure, to be shown to the viewer until dismissed
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn dismiss_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Whether `id` is a local reply not yet acknowledged by the store
    pub fn is_pending(&self, id: &CommentId) -> bool {
        self.local_replies.contains(id)
    }

    fn fail(&mut self, e: Error) -> Error {
        tracing::warn!(address = %self.address, error = %e, "thread operation failed");
        if e.closes_view() {
            self.closed = true;
        }
        self.error = Some(e.clone());
        e
    }

    fn pending(&self, kind: PendingKind) -> Pending {
        Pending {
            view: self.key,
            op: OpId::new(),
            kind,
        }
    }

    fn target_mut(&mut self, id: &CommentId) -> Result<&mut Comment, ValidationError> {
        if self.local_replies.contains(id) {
            return Err(ValidationError::StillPending { id: *id });
        }
        if let Some(root) = self.root.as_mut().filter(|r| r.id == *id) {
            return Ok(root);
        }
        self.replies
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or(ValidationError::UnknownComment { id: *id })
    }

    pub(crate) fn comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        match self.root.as_mut() {
            Some(root) if root.id == *id => Some(root),
            _ => self.replies.iter_mut().find(|c| c.id == *id),
        }
    }

    /// Starts (re)loading the root and first page of replies. `None` if a
    /// load, or a next page, is already running.
    pub fn begin_open(&mut self) -> Option<Pending> {
        if self.loading || self.loading_more || self.closed {
            return None;
        }
        self.sync_events();
        tracing::debug!(address = %self.address, "opening thread");
        self.root_loaded = false;
        self.replies_loaded = false;
        self.network_failure = false;
        self.loading = true;
        Some(self.pending(PendingKind::Open {
            address: self.address.clone(),
        }))
    }

    /// Manual retry after a network failure
    pub fn begin_retry(&mut self) -> Option<Pending> {
        self.error = None;
        self.begin_open()
    }

    /// `None` when there is nothing more to load or a load is running
    pub fn begin_load_more(&mut self) -> Option<Pending> {
        if self.closed || self.loading || self.loading_more || !self.replies_loaded {
            return None;
        }
        let cursor = self.next_cursor.clone()?;
        self.sync_events();
        self.loading_more = true;
        Some(self.pending(PendingKind::LoadMore {
            address: self.address.clone(),
            cursor,
        }))
    }

    pub fn begin_add_reply(&mut self, text: String, author: UserId) -> Result<Pending, Error> {
        self.sync_events();
        if let Err(e) = api::validate_text(&text, self.max_text_len) {
            return Err(self.fail(e.into()));
        }
        let root = match self.root.as_mut() {
            None => return Err(self.fail(ValidationError::NotLoaded.into())),
            Some(root) if root.is_deleted() => {
                let id = root.id;
                return Err(self.fail(ValidationError::Tombstoned { id }.into()));
            }
            Some(root) => root,
        };
        let local = Comment::new(
            CommentId(Uuid::new_v4()),
            self.address.clone(),
            Utc::now(),
            author,
            text.clone(),
            self.anchor.visibility_for(&author),
        );
        tracing::debug!(address = %self.address, local_id = ?local.id, "adding reply");
        root.increment_replies();
        let local_id = local.id;
        self.replies.insert(0, local);
        self.local_replies.insert(local_id);
        Ok(self.pending(PendingKind::AddReply {
            parent: self.address.clone(),
            local_id,
            text,
            author,
        }))
    }

    pub fn begin_toggle_like(&mut self, id: CommentId) -> Result<Pending, Error> {
        self.sync_events();
        let c = match self.target_mut(&id) {
            Ok(c) if c.is_deleted() => Err(ValidationError::Tombstoned { id }),
            res => res,
        };
        let (parent, liked) = match c {
            Ok(c) => {
                let liked = !c.viewer_has_liked();
                c.set_liked(liked);
                (c.path.clone(), liked)
            }
            Err(e) => return Err(self.fail(e.into())),
        };
        tracing::debug!(?id, liked, "toggling like");
        Ok(self.pending(PendingKind::Like { parent, id, liked }))
    }

    pub fn begin_edit(&mut self, id: CommentId, text: String) -> Result<Pending, Error> {
        self.sync_events();
        if let Err(e) = api::validate_text(&text, self.max_text_len) {
            return Err(self.fail(e.into()));
        }
        let res = self
            .target_mut(&id)
            .and_then(|c| Ok((c.path.clone(), c.set_text(text.clone())?)));
        let (parent, previous) = match res {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.into())),
        };
        tracing::debug!(?id, "editing comment");
        Ok(self.pending(PendingKind::Edit {
            parent,
            id,
            text,
            previous,
        }))
    }

    /// Tombstones `id` right away. `Ok(None)` if it already was deleted, in
    /// which case the store is not called.
    pub fn begin_delete(&mut self, id: CommentId) -> Result<Option<Pending>, Error> {
        self.sync_events();
        let c = match self.target_mut(&id) {
            Ok(c) => c,
            Err(e) => return Err(self.fail(e.into())),
        };
        let snapshot = c.clone();
        if !c.tombstone() {
            return Ok(None);
        }
        let parent = c.path.clone();
        let was_child = parent == self.address;
        if was_child {
            if let Some(root) = self.root.as_mut() {
                root.decrement_replies();
            }
        }
        tracing::debug!(?id, was_child, "deleting comment");
        Ok(Some(self.pending(PendingKind::Delete {
            parent,
            id,
            snapshot,
            was_child,
        })))
    }

    /// Applies the result of a store call started by this view, and publishes
    /// it if it was a confirmed mutation. Errors returned here were already
    /// recorded as the view's current error.
    pub fn complete(&mut self, completion: Completion) -> Result<(), Error> {
        if completion.view != self.key {
            tracing::warn!(
                view = ?self.key,
                other = ?completion.view,
                "ignoring completion meant for another view"
            );
            return Ok(());
        }
        if self.closed {
            // the store did the work, siblings still need to hear about it
            if let Some(e) = completion.confirmed_event() {
                self.bus.publish(e);
            }
            return Ok(());
        }
        self.sync_events();
        let event = completion.confirmed_event();
        match completion.outcome {
            Outcome::Opened { result } => {
                self.loading = false;
                match result {
                    Ok((root, page)) => self.apply_opened(root, page),
                    Err(e) => {
                        self.network_failure = e.is_retryable();
                        return Err(self.fail(e));
                    }
                }
            }
            Outcome::MoreLoaded { cursor, result } => {
                self.loading_more = false;
                match result {
                    Ok(page) if self.next_cursor.as_ref() == Some(&cursor) => {
                        for c in page.replies {
                            if !self.replies.iter().any(|r| r.id == c.id) {
                                self.replies.push(c);
                            }
                        }
                        self.next_cursor = page.next_cursor;
                    }
                    Ok(_) => tracing::debug!("dropping page from a superseded cursor"),
                    Err(e) => return Err(self.fail(e)),
                }
            }
            Outcome::ReplyAdded {
                local_id, result, ..
            } => {
                self.local_replies.remove(&local_id);
                match result {
                    Ok(comment) => match self.replies.iter().position(|c| c.id == local_id) {
                        Some(idx) => {
                            self.replies.remove(idx);
                            // the store just made it the newest reply
                            let reply = match self.replies.iter().position(|c| c.id == comment.id) {
                                // a reload after the write already listed and counted it
                                Some(listed) => {
                                    if let Some(root) = self.root.as_mut() {
                                        root.decrement_replies();
                                    }
                                    self.replies.remove(listed)
                                }
                                None => comment,
                            };
                            self.replies.insert(0, reply);
                        }
                        None => {
                            tracing::debug!(?local_id, "local reply vanished before confirmation");
                        }
                    },
                    Err(e) => {
                        let before = self.replies.len();
                        self.replies.retain(|c| c.id != local_id);
                        if self.replies.len() != before {
                            if let Some(root) = self.root.as_mut() {
                                root.decrement_replies();
                            }
                        }
                        return Err(self.fail(e));
                    }
                }
            }
            Outcome::Edited {
                id,
                text,
                previous,
                result,
                ..
            } => {
                let c = self.comment_mut(&id);
                match result {
                    // ours is now the latest write
                    Ok(()) => {
                        if let Some(Err(e)) = c.map(|c| c.set_text(text)) {
                            tracing::debug!(?id, error = %e, "not reapplying edit");
                        }
                    }
                    Err(e) => {
                        // roll back unless something newer replaced our text
                        let c = c.filter(|c| c.text() == Some(text.as_str()));
                        if let Some(Err(e)) = c.map(|c| c.set_text(previous)) {
                            tracing::debug!(?id, error = %e, "not rolling back edit");
                        }
                        return Err(self.fail(e));
                    }
                }
            }
            Outcome::Deleted {
                id,
                snapshot,
                was_child,
                result,
                ..
            } => match result {
                Ok(now_deleted) => {
                    // a reload since then may show the comment alive again
                    let uncounted = match self.comment_mut(&id) {
                        Some(c) => c.tombstone(),
                        // dropped by a reload that still counted it
                        None => now_deleted,
                    };
                    if uncounted && was_child {
                        if let Some(root) = self.root.as_mut() {
                            root.decrement_replies();
                        }
                    }
                }
                Err(e) if e.write_did_not_happen() => {
                    // only undo our own tombstone, not a reloaded state
                    if let Some(c) = self.comment_mut(&id).filter(|c| c.is_deleted()) {
                        let restored = snapshot
                            .with_likes(c.like_count(), c.viewer_has_liked())
                            .with_reply_count(c.reply_count());
                        *c = restored;
                        if was_child {
                            if let Some(root) = self.root.as_mut() {
                                root.increment_replies();
                            }
                        }
                    }
                    return Err(self.fail(e));
                }
                Err(e) => return Err(self.fail(e)),
            },
            Outcome::Liked {
                id, liked, result, ..
            } => {
                let c = self.comment_mut(&id);
                match result {
                    Ok(()) => {
                        if let Some(c) = c {
                            c.set_liked(liked);
                        }
                    }
                    Err(e) => {
                        if let Some(c) = c.filter(|c| c.viewer_has_liked() == liked) {
                            c.set_liked(!liked);
                        }
                        return Err(self.fail(e));
                    }
                }
            }
        }
        if let Some(e) = event {
            self.own_ops.insert(e.op);
            self.bus.publish(e);
        }
        Ok(())
    }

    fn apply_opened(&mut self, mut root: Comment, page: api::Page) {
        // keep replies that are still on their way to the store, which did
        // not count them yet
        let mut replies = self
            .replies
            .drain(..)
            .filter(|c| self.local_replies.contains(&c.id))
            .collect::<Vec<_>>();
        for _ in &replies {
            root.increment_replies();
        }
        for c in page.replies {
            if !replies.iter().any(|r| r.id == c.id) {
                replies.push(c);
            }
        }
        self.replies = replies;
        self.root = Some(root);
        self.next_cursor = page.next_cursor;
        self.root_loaded = true;
        self.replies_loaded = true;
        self.network_failure = false;
    }

    /// Loads the root and first page of replies
    pub async fn open<S>(&mut self, store: &S) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        match self.begin_open() {
            None => Ok(()),
            Some(p) => self.complete(p.run(store).await),
        }
    }

    pub async fn retry<S>(&mut self, store: &S) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        match self.begin_retry() {
            None => Ok(()),
            Some(p) => self.complete(p.run(store).await),
        }
    }

    pub async fn load_more<S>(&mut self, store: &S) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        match self.begin_load_more() {
            None => Ok(()),
            Some(p) => self.complete(p.run(store).await),
        }
    }

    pub async fn add_reply<S>(&mut self, store: &S, text: String, author: UserId) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        let p = self.begin_add_reply(text, author)?;
        self.complete(p.run(store).await)
    }

    pub async fn toggle_like<S>(&mut self, store: &S, id: CommentId) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        let p = self.begin_toggle_like(id)?;
        self.complete(p.run(store).await)
    }

    pub async fn edit<S>(&mut self, store: &S, id: CommentId, text: String) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        let p = self.begin_edit(id, text)?;
        self.complete(p.run(store).await)
    }

    pub async fn delete<S>(&mut self, store: &S, id: CommentId) -> Result<(), Error>
    where
        S: CommentStore + ?Sized,
    {
        match self.begin_delete(id)? {
            None => Ok(()),
            Some(p) => self.complete(p.run(store).await),
        }
    }
}
