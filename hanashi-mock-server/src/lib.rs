use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use hanashi_api::{
    validate_text, Anchor, AnchorId, Comment, CommentId, CommentStore, Cursor, Error, NodePath,
    Page, Time, UserId, Uuid, ValidationError, Visibility, MAX_TEXT_LEN,
};
use parking_lot::Mutex;

const DEFAULT_PAGE_SIZE: usize = 20;

/// In-memory comment store shared by any number of sessions
#[derive(Clone, Debug)]
pub struct MockServer(Arc<Mutex<Db>>);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Call {
    FetchRoot,
    FetchReplies,
    AddReply,
    EditReply,
    DeleteReply,
    ToggleLike,
}

#[derive(Debug)]
struct Fault {
    call: Call,
    error: Error,

    /// Perform the write before failing, like a response lost on the way back
    after_write: bool,
}

#[derive(Debug)]
struct Db {
    page_size: usize,
    last_date: Time,
    anchors: HashMap<AnchorId, Anchor>,
    comments: HashMap<NodePath, StoredComment>,

    /// Children of each node, oldest first
    children: HashMap<NodePath, Vec<CommentId>>,
    faults: VecDeque<Fault>,
    calls: Vec<Call>,
}

#[derive(Debug)]
struct StoredComment {
    id: CommentId,
    path: NodePath,
    date: Time,

    // author is kept even for anonymous and deleted comments, for moderation
    author: UserId,
    text: String,
    anonymous: bool,
    deleted: bool,
    likers: HashSet<UserId>,
}

impl Db {
    fn next_date(&mut self) -> Time {
        let now = Utc::now();
        self.last_date = match now > self.last_date {
            true => now,
            false => self.last_date + Duration::microseconds(1),
        };
        self.last_date
    }

    fn record(&mut self, call: Call) -> Result<Option<Fault>, Error> {
        self.calls.push(call);
        let idx = match self.faults.iter().position(|f| f.call == call) {
            None => return Ok(None),
            Some(idx) => idx,
        };
        let fault = self.faults.remove(idx).expect("index was just found");
        tracing::debug!(?call, error = %fault.error, "injecting fault");
        match fault.after_write {
            false => Err(fault.error),
            true => Ok(Some(fault)),
        }
    }

    fn node_exists(&self, address: &NodePath) -> bool {
        match address.is_anchor() {
            true => self.anchors.contains_key(&address.anchor),
            false => self.comments.contains_key(address),
        }
    }

    fn render(&self, c: &StoredComment, viewer: &UserId) -> Comment {
        let address = c.path.child(c.id);
        let reply_count = self
            .children
            .get(&address)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        self.comments
                            .get(&address.child(**id))
                            .map(|c| !c.deleted)
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0);
        let visibility = match (c.deleted, c.anonymous) {
            (true, _) => Visibility::Deleted,
            (false, true) => Visibility::Anonymous,
            (false, false) => Visibility::Regular,
        };
        Comment::new(
            c.id,
            c.path.clone(),
            c.date,
            c.author,
            c.text.clone(),
            visibility,
        )
        .with_likes(c.likers.len() as u64, c.likers.contains(viewer))
        .with_reply_count(reply_count as u64)
    }

    fn insert(&mut self, parent: &NodePath, text: &str, author: UserId) -> Result<Comment, Error> {
        validate_text(text, MAX_TEXT_LEN)?;
        if !self.node_exists(parent) {
            return Err(Error::not_found(parent.clone()));
        }
        if let Some(p) = self.comments.get(parent) {
            if p.deleted {
                return Err(ValidationError::Tombstoned { id: p.id }.into());
            }
        }
        let anchor = self
            .anchors
            .get(&parent.anchor)
            .ok_or_else(|| Error::not_found(NodePath::anchor(parent.anchor)))?;
        let anonymous = anchor.visibility_for(&author) == Visibility::Anonymous;
        let stored = StoredComment {
            id: CommentId(Uuid::new_v4()),
            path: parent.clone(),
            date: self.next_date(),
            author,
            text: text.to_string(),
            anonymous,
            deleted: false,
            likers: HashSet::new(),
        };
        let res = self.render(&stored, &author);
        self.children
            .entry(parent.clone())
            .or_insert_with(Vec::new)
            .push(stored.id);
        self.comments.insert(parent.child(stored.id), stored);
        Ok(res)
    }

    fn live_comment_mut(
        &mut self,
        parent: &NodePath,
        id: CommentId,
    ) -> Result<&mut StoredComment, Error> {
        let address = parent.child(id);
        let c = self
            .comments
            .get_mut(&address)
            .ok_or_else(|| Error::not_found(address))?;
        if c.deleted {
            return Err(ValidationError::Tombstoned { id }.into());
        }
        Ok(c)
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> MockServer {
        MockServer(Arc::new(Mutex::new(Db {
            page_size: page_size.max(1),
            last_date: Utc::now(),
            anchors: HashMap::new(),
            comments: HashMap::new(),
            children: HashMap::new(),
            faults: VecDeque::new(),
            calls: Vec::new(),
        })))
    }

    /// A store handle authenticated as `viewer`
    pub fn session(&self, viewer: UserId) -> MockSession {
        MockSession {
            server: self.clone(),
            viewer,
        }
    }

    pub fn admin_create_anchor(&self, anchor: Anchor) -> Result<(), Error> {
        let mut db = self.0.lock();
        if db.anchors.contains_key(&anchor.id) {
            return Err(Error::rejected(format!("anchor {:?} already exists", anchor.id)));
        }
        db.anchors.insert(anchor.id, anchor);
        Ok(())
    }

    /// Seeds a comment without going through any session or fault
    pub fn admin_add_comment(
        &self,
        parent: &NodePath,
        author: UserId,
        text: &str,
    ) -> anyhow::Result<Comment> {
        self.0
            .lock()
            .insert(parent, text, author)
            .with_context(|| format!("seeding comment under {parent}"))
    }

    /// Author of a comment regardless of masking, as a moderator would see it
    pub fn admin_author_of(&self, address: &NodePath) -> anyhow::Result<UserId> {
        self.0
            .lock()
            .comments
            .get(address)
            .map(|c| c.author)
            .ok_or_else(|| anyhow!("no comment at {address}"))
    }

    /// The next `call` fails with `error` without touching the data
    pub fn fail_next(&self, call: Call, error: Error) {
        self.0.lock().faults.push_back(Fault {
            call,
            error,
            after_write: false,
        });
    }

    /// The next `call` is performed, but reports `error` to the caller
    pub fn fail_next_after_write(&self, call: Call, error: Error) {
        self.0.lock().faults.push_back(Fault {
            call,
            error,
            after_write: true,
        });
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().calls.clone()
    }

    pub fn num_calls(&self, call: Call) -> usize {
        self.0.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.0.lock().calls.clear();
    }

    pub fn num_comments(&self) -> usize {
        self.0.lock().comments.len()
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

#[derive(Clone, Debug)]
pub struct MockSession {
    server: MockServer,
    viewer: UserId,
}

impl MockSession {
    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }
}

fn parse_cursor(cursor: Option<&Cursor>) -> Result<usize, Error> {
    match cursor {
        None => Ok(0),
        Some(Cursor(c)) => c
            .strip_prefix("offset:")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::rejected(format!("malformed cursor {c:?}"))),
    }
}

#[async_trait]
impl CommentStore for MockSession {
    async fn fetch_root(&self, address: &NodePath) -> Result<Comment, Error> {
        let mut db = self.server.0.lock();
        db.record(Call::FetchRoot)?;
        let c = db
            .comments
            .get(address)
            .ok_or_else(|| Error::not_found(address.clone()))?;
        Ok(db.render(c, &self.viewer))
    }

    async fn fetch_replies(
        &self,
        address: &NodePath,
        cursor: Option<&Cursor>,
    ) -> Result<Page, Error> {
        let mut db = self.server.0.lock();
        db.record(Call::FetchReplies)?;
        if !db.node_exists(address) {
            return Err(Error::not_found(address.clone()));
        }
        let offset = parse_cursor(cursor)?;
        let ids = db.children.get(address).cloned().unwrap_or_default();
        let replies = ids
            .iter()
            .rev()
            .skip(offset)
            .take(db.page_size)
            .filter_map(|id| db.comments.get(&address.child(*id)))
            .map(|c| db.render(c, &self.viewer))
            .collect::<Vec<_>>();
        let next = offset + replies.len();
        let next_cursor = (next < ids.len()).then(|| Cursor(format!("offset:{next}")));
        Ok(Page {
            replies,
            next_cursor,
        })
    }

    async fn add_reply(
        &self,
        parent: &NodePath,
        text: &str,
        author: UserId,
    ) -> Result<Comment, Error> {
        let mut db = self.server.0.lock();
        let fault = db.record(Call::AddReply)?;
        let c = db.insert(parent, text, author)?;
        tracing::debug!(id = ?c.id, %parent, "added reply");
        match fault {
            Some(f) => Err(f.error),
            None => Ok(c),
        }
    }

    async fn edit_reply(&self, parent: &NodePath, id: CommentId, text: &str) -> Result<(), Error> {
        let mut db = self.server.0.lock();
        let fault = db.record(Call::EditReply)?;
        validate_text(text, MAX_TEXT_LEN)?;
        db.live_comment_mut(parent, id)?.text = text.to_string();
        match fault {
            Some(f) => Err(f.error),
            None => Ok(()),
        }
    }

    async fn delete_reply(&self, parent: &NodePath, id: CommentId) -> Result<bool, Error> {
        let mut db = self.server.0.lock();
        let fault = db.record(Call::DeleteReply)?;
        let address = parent.child(id);
        let c = db
            .comments
            .get_mut(&address)
            .ok_or_else(|| Error::not_found(address.clone()))?;
        let now_deleted = !c.deleted;
        c.deleted = true;
        tracing::debug!(%address, now_deleted, "deleted reply");
        match fault {
            Some(f) => Err(f.error),
            None => Ok(now_deleted),
        }
    }

    async fn toggle_like(&self, parent: &NodePath, id: CommentId, liked: bool) -> Result<(), Error> {
        let mut db = self.server.0.lock();
        let fault = db.record(Call::ToggleLike)?;
        let viewer = self.viewer;
        let address = parent.child(id);
        let c = db
            .comments
            .get_mut(&address)
            .ok_or_else(|| Error::not_found(address.clone()))?;
        // already in the requested state, which holds even for tombstones
        if c.likers.contains(&viewer) != liked {
            if c.deleted {
                return Err(ValidationError::Tombstoned { id }.into());
            }
            match liked {
                true => c.likers.insert(viewer),
                false => c.likers.remove(&viewer),
            };
        }
        match fault {
            Some(f) => Err(f.error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use hanashi_api::Privacy;

    use super::*;

    fn setup(privacy: Privacy) -> (MockServer, Anchor) {
        let server = MockServer::with_page_size(2);
        let anchor = Anchor {
            id: AnchorId(Uuid::new_v4()),
            author: UserId::new_random(),
            privacy,
        };
        server
            .admin_create_anchor(anchor.clone())
            .expect("creating anchor");
        (server, anchor)
    }

    #[tokio::test]
    async fn paginates_newest_first() {
        let (server, anchor) = setup(Privacy::Public);
        let user = UserId::new_random();
        let top = NodePath::anchor(anchor.id);
        let root = server.admin_add_comment(&top, user, "root").unwrap();
        let mut texts = Vec::new();
        for i in 0..5 {
            texts.push(format!("reply {i}"));
            server
                .admin_add_comment(&root.address(), user, &texts[i])
                .unwrap();
        }

        let session = server.session(user);
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = session
                .fetch_replies(&root.address(), cursor.as_ref())
                .await
                .unwrap();
            assert!(page.replies.len() <= 2);
            seen.extend(page.replies.iter().map(|c| c.text().unwrap().to_string()));
            match page.next_cursor {
                None => break,
                Some(c) => cursor = Some(c),
            }
        }
        texts.reverse();
        assert_eq!(seen, texts);
        assert_eq!(session.fetch_root(&root.address()).await.unwrap().reply_count(), 5);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_keeps_the_tombstone_listed() {
        let (server, anchor) = setup(Privacy::Public);
        let user = UserId::new_random();
        let session = server.session(user);
        let top = NodePath::anchor(anchor.id);
        let root = session.add_reply(&top, "root", user).await.unwrap();
        let reply = session.add_reply(&root.address(), "reply", user).await.unwrap();

        assert!(session.delete_reply(&root.address(), reply.id).await.unwrap());
        assert!(!session.delete_reply(&root.address(), reply.id).await.unwrap());

        let page = session.fetch_replies(&root.address(), None).await.unwrap();
        assert_eq!(page.replies.len(), 1);
        assert_eq!(page.replies[0].visibility(), Visibility::Deleted);
        assert_eq!(session.fetch_root(&root.address()).await.unwrap().reply_count(), 0);
        assert_eq!(server.admin_author_of(&reply.address()).unwrap(), user);
    }

    #[tokio::test]
    async fn likes_are_idempotent_per_viewer() {
        let (server, anchor) = setup(Privacy::Public);
        let (alice, bob) = (UserId::new_random(), UserId::new_random());
        let top = NodePath::anchor(anchor.id);
        let c = server.admin_add_comment(&top, alice, "hi").unwrap();

        let a = server.session(alice);
        a.toggle_like(&top, c.id, true).await.unwrap();
        a.toggle_like(&top, c.id, true).await.unwrap();
        server.session(bob).toggle_like(&top, c.id, true).await.unwrap();

        let seen_by_alice = a.fetch_root(&c.address()).await.unwrap();
        assert_eq!(seen_by_alice.like_count(), 2);
        assert!(seen_by_alice.viewer_has_liked());

        a.toggle_like(&top, c.id, false).await.unwrap();
        let seen_by_bob = server.session(bob).fetch_root(&c.address()).await.unwrap();
        assert_eq!(seen_by_bob.like_count(), 1);
        assert!(seen_by_bob.viewer_has_liked());
    }

    #[tokio::test]
    async fn likes_on_tombstones_only_succeed_when_already_there() {
        let (server, anchor) = setup(Privacy::Public);
        let user = UserId::new_random();
        let session = server.session(user);
        let top = NodePath::anchor(anchor.id);
        let liked = session.add_reply(&top, "liked", user).await.unwrap();
        let plain = session.add_reply(&top, "plain", user).await.unwrap();
        session.toggle_like(&top, liked.id, true).await.unwrap();
        for c in [&liked, &plain] {
            assert!(session.delete_reply(&top, c.id).await.unwrap());
        }

        session.toggle_like(&top, liked.id, true).await.unwrap();
        session.toggle_like(&top, plain.id, false).await.unwrap();
        assert_eq!(
            session.toggle_like(&top, plain.id, true).await,
            Err(ValidationError::Tombstoned { id: plain.id }.into())
        );
        let tombstone = session.fetch_root(&liked.address()).await.unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.like_count(), 1);
    }

    #[tokio::test]
    async fn masks_the_anonymous_anchor_author() {
        let (server, anchor) = setup(Privacy::Anonymous);
        let top = NodePath::anchor(anchor.id);
        let session = server.session(UserId::new_random());
        let by_author = session.add_reply(&top, "mine", anchor.author).await.unwrap();
        assert_eq!(by_author.visibility(), Visibility::Anonymous);
        assert_eq!(by_author.author(), None);
        let fetched = session.fetch_root(&by_author.address()).await.unwrap();
        assert_eq!(fetched.author(), None);
        assert_eq!(server.admin_author_of(&by_author.address()).unwrap(), anchor.author);
    }

    #[tokio::test]
    async fn faults_are_consumed_in_order() {
        let (server, anchor) = setup(Privacy::Public);
        let user = UserId::new_random();
        let session = server.session(user);
        let top = NodePath::anchor(anchor.id);
        server.fail_next(Call::AddReply, Error::transient("timeout"));
        assert_eq!(
            session.add_reply(&top, "lost", user).await,
            Err(Error::transient("timeout"))
        );
        assert_eq!(server.num_comments(), 0);

        server.fail_next_after_write(Call::AddReply, Error::transient("timeout"));
        assert!(session.add_reply(&top, "kept", user).await.is_err());
        assert_eq!(server.num_comments(), 1);
        assert_eq!(server.num_calls(Call::AddReply), 2);
    }

    #[tokio::test]
    async fn rejects_invalid_writes() {
        let (server, anchor) = setup(Privacy::Public);
        let user = UserId::new_random();
        let session = server.session(user);
        let top = NodePath::anchor(anchor.id);
        assert_eq!(
            session.add_reply(&top, "  ", user).await,
            Err(ValidationError::EmptyText.into())
        );
        let missing = top.child(CommentId(Uuid::new_v4()));
        assert_eq!(
            session.fetch_root(&missing).await,
            Err(Error::not_found(missing.clone()))
        );
        assert!(matches!(
            session.fetch_replies(&top, Some(&Cursor(String::from("garbage")))).await,
            Err(Error::Rejected { .. })
        ));
    }
}
