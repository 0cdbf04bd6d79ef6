use std::{collections::HashMap, sync::Arc};

use crate::{
    api::{self, Anchor, Comment, CommentId, CommentStore, Error, NodePath, UserId, ValidationError},
    Completion, EventBus, Pending, ThreadView, ViewKey,
};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Who is looking at and writing to the threads
    pub viewer: UserId,
    pub anchor: Anchor,
    pub max_text_len: usize,
}

impl ClientConfig {
    pub fn new(viewer: UserId, anchor: Anchor) -> ClientConfig {
        ClientConfig {
            viewer,
            anchor,
            max_text_len: api::MAX_TEXT_LEN,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    AddReply { text: String },
    Edit { id: CommentId, text: String },
    Delete { id: CommentId },
    ToggleLike { id: CommentId },
    LoadMore,
    Retry,
}

/// Stack of thread views drilling down into the comment tree of one anchor.
///
/// All views share one bus, so a mutation confirmed in any of them reaches
/// every other view displaying the same branch.
pub struct Navigator<S: ?Sized> {
    config: ClientConfig,
    bus: EventBus,
    store: Arc<S>,
    views: HashMap<ViewKey, ThreadView>,

    /// Opening order, the last one is on screen
    stack: Vec<ViewKey>,
}

impl<S> Navigator<S>
where
    S: CommentStore + ?Sized,
{
    pub fn new(config: ClientConfig, store: Arc<S>) -> Navigator<S> {
        Navigator::with_bus(config, store, EventBus::new())
    }

    /// Builds a navigator publishing on an existing bus, eg. to share it
    /// with another part of the application
    pub fn with_bus(config: ClientConfig, store: Arc<S>, bus: EventBus) -> Navigator<S> {
        Navigator {
            config,
            bus,
            store,
            views: HashMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Keys of the open views, bottom of the stack first
    pub fn stack(&self) -> &[ViewKey] {
        &self.stack
    }

    pub fn top(&self) -> Option<&ThreadView> {
        self.stack.last().and_then(|k| self.views.get(k))
    }

    pub fn view(&self, key: ViewKey) -> Option<&ThreadView> {
        self.views.get(&key)
    }

    pub fn view_mut(&mut self, key: ViewKey) -> Option<&mut ThreadView> {
        self.views.get_mut(&key)
    }

    /// Topmost open view showing `address`
    pub fn find(&self, address: &NodePath) -> Option<&ThreadView> {
        self.stack
            .iter()
            .rev()
            .filter_map(|k| self.views.get(k))
            .find(|v| v.address() == address)
    }

    /// Drills down into the replies of `comment`
    pub async fn open(&mut self, comment: &Comment) -> Result<ViewKey, Error> {
        self.open_address(comment.address()).await
    }

    /// Pushes a new view on `address` and loads it.
    ///
    /// A network failure still leaves the view open, waiting for a retry. If
    /// the root does not exist the view is dropped and the error returned.
    pub async fn open_address(&mut self, address: NodePath) -> Result<ViewKey, Error> {
        let mut view = ThreadView::new(address, self.config.anchor.clone(), self.bus.clone())?
            .with_max_text_len(self.config.max_text_len);
        let key = view.key();
        let pending = view.begin_open();
        tracing::debug!(
            view = ?key,
            address = %view.address(),
            depth = self.stack.len() + 1,
            "pushing thread view"
        );
        self.views.insert(key, view);
        self.stack.push(key);
        if let Some(p) = pending {
            let store = self.store.clone();
            match self.complete(p.run(&*store).await) {
                Err(e) if e.closes_view() => return Err(e),
                _ => (),
            }
        }
        Ok(key)
    }

    pub fn close(&mut self, key: ViewKey) -> Option<ThreadView> {
        self.stack.retain(|k| *k != key);
        let view = self.views.remove(&key);
        if view.is_some() {
            tracing::debug!(view = ?key, "closed thread view");
        }
        view
    }

    /// Closes the view on screen
    pub fn pop(&mut self) -> Option<ThreadView> {
        let key = *self.stack.last()?;
        self.close(key)
    }

    /// Starts `action` on view `key`, applying its optimistic part.
    /// `Ok(None)` when there is no store call to make.
    pub fn begin(&mut self, key: ViewKey, action: Action) -> Result<Option<Pending>, Error> {
        let viewer = self.config.viewer;
        let view = self
            .views
            .get_mut(&key)
            .ok_or(ValidationError::UnknownView)?;
        match action {
            Action::AddReply { text } => view.begin_add_reply(text, viewer).map(Some),
            Action::Edit { id, text } => view.begin_edit(id, text).map(Some),
            Action::Delete { id } => view.begin_delete(id),
            Action::ToggleLike { id } => view.begin_toggle_like(id).map(Some),
            Action::LoadMore => Ok(view.begin_load_more()),
            Action::Retry => Ok(view.begin_retry()),
        }
    }

    /// Hands a finished store call back to its view, then lets every view
    /// catch up with the bus. If that view was closed meanwhile only the
    /// announcement of the mutation remains.
    pub fn complete(&mut self, completion: Completion) -> Result<(), Error> {
        let key = completion.view();
        let res = match self.views.get_mut(&key) {
            Some(view) => {
                let res = view.complete(completion);
                if view.is_closed() {
                    self.close(key);
                }
                res
            }
            None => {
                tracing::debug!(view = ?key, "completion for a closed view");
                if let Some(e) = completion.confirmed_event() {
                    self.bus.publish(e);
                }
                Ok(())
            }
        };
        self.sync_all();
        res
    }

    /// Runs `action` to completion on view `key`
    pub async fn perform(&mut self, key: ViewKey, action: Action) -> Result<(), Error> {
        match self.begin(key, action)? {
            None => Ok(()),
            Some(p) => {
                let store = self.store.clone();
                self.complete(p.run(&*store).await)
            }
        }
    }

    /// Applies pending bus events to every open view
    pub fn sync_all(&mut self) -> usize {
        self.views.values_mut().map(|v| v.sync_events()).sum()
    }
}
