use crate::{
    api::{BusEvent, Comment, CommentId, EventData},
    ThreadView,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reconciled {
    /// The event changed this view
    Applied,

    /// The event was published by this view, which already applied it
    Echo,

    /// The event does not concern anything this view shows
    Ignored,
}

impl ThreadView {
    /// Drains the subscription and applies every pending event, returning how
    /// many of them changed the view
    pub fn sync_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(e) = self.subscription.try_next() {
            if self.reconcile(&e) == Reconciled::Applied {
                applied += 1;
            }
        }
        applied
    }

    /// Applies a mutation confirmed elsewhere to the view's local state
    pub fn reconcile(&mut self, event: &BusEvent) -> Reconciled {
        if self.closed {
            return Reconciled::Ignored;
        }
        if self.own_ops.remove(&event.op) {
            return Reconciled::Echo;
        }
        let res = if event.path == self.address {
            self.reconcile_reply(&event.data)
        } else if event.target() == self.address {
            self.reconcile_root(&event.data)
        } else if event.path.parent().as_ref() == Some(&self.address) {
            // something happened below one of our replies
            match event.path.last() {
                Some(reply) => self.reconcile_grandchild(*reply, &event.data),
                None => Reconciled::Ignored,
            }
        } else {
            Reconciled::Ignored
        };
        tracing::trace!(
            address = %self.address,
            kind = event.kind(),
            path = %event.path,
            result = ?res,
            "reconciled bus event"
        );
        res
    }

    fn reconcile_reply(&mut self, data: &EventData) -> Reconciled {
        let root = match self.root.as_mut() {
            // nothing shown yet, the upcoming load will see the change
            None => return Reconciled::Ignored,
            Some(root) => root,
        };
        match data {
            EventData::Add { comment } => {
                if self.replies.iter().any(|c| c.id == comment.id) {
                    return Reconciled::Ignored;
                }
                root.increment_replies();
                self.replies.insert(0, comment.clone());
                Reconciled::Applied
            }
            EventData::Remove { comment_id } => {
                let reply = self.replies.iter_mut().find(|c| c.id == *comment_id);
                if let Some(false) = reply.map(|c| c.tombstone()) {
                    return Reconciled::Ignored;
                }
                // also counts replies that are not loaded yet
                root.decrement_replies();
                Reconciled::Applied
            }
            EventData::Edit { comment_id, text } => {
                edit(self.replies.iter_mut().find(|c| c.id == *comment_id), text)
            }
            EventData::Like { comment_id, liked } => {
                like(self.replies.iter_mut().find(|c| c.id == *comment_id), *liked)
            }
            EventData::Unknown => Reconciled::Ignored,
        }
    }

    fn reconcile_root(&mut self, data: &EventData) -> Reconciled {
        match data {
            EventData::Remove { .. } => match self.root.as_mut().map(|r| r.tombstone()) {
                Some(true) => Reconciled::Applied,
                _ => Reconciled::Ignored,
            },
            EventData::Edit { text, .. } => edit(self.root.as_mut(), text),
            EventData::Like { liked, .. } => like(self.root.as_mut(), *liked),
            EventData::Add { .. } | EventData::Unknown => Reconciled::Ignored,
        }
    }

    fn reconcile_grandchild(&mut self, reply: CommentId, data: &EventData) -> Reconciled {
        let c = match self.replies.iter_mut().find(|c| c.id == reply) {
            None => return Reconciled::Ignored,
            Some(c) => c,
        };
        match data {
            EventData::Add { .. } => c.increment_replies(),
            EventData::Remove { .. } => c.decrement_replies(),
            _ => return Reconciled::Ignored,
        }
        Reconciled::Applied
    }
}

fn edit(c: Option<&mut Comment>, text: &str) -> Reconciled {
    match c {
        Some(c) if c.text() != Some(text) => match c.set_text(text.to_string()) {
            Ok(_) => Reconciled::Applied,
            Err(_) => Reconciled::Ignored,
        },
        _ => Reconciled::Ignored,
    }
}

fn like(c: Option<&mut Comment>, liked: bool) -> Reconciled {
    match c.map(|c| c.set_liked(liked)) {
        Some(true) => Reconciled::Applied,
        _ => Reconciled::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{NodePath, OpId, Privacy, Uuid, Visibility},
        view::tests::fixture,
    };

    fn event(path: &NodePath, data: EventData) -> BusEvent {
        BusEvent::new(OpId::new(), path.clone(), data)
    }

    #[tokio::test]
    async fn sibling_views_converge() {
        let f = fixture(20, Privacy::Public);
        let replies = f.seed_replies(1);
        let mut a = f.open(f.root.address()).await;
        let mut b = f.open(f.root.address()).await;

        a.add_reply(&f.session, String::from("from a"), f.user)
            .await
            .unwrap();
        a.toggle_like(&f.session, replies[0].id).await.unwrap();
        a.edit(&f.session, replies[0].id, String::from("edited"))
            .await
            .unwrap();
        assert_eq!(b.sync_events(), 3);
        assert_eq!(a.sync_events(), 0);

        assert_eq!(a.root(), b.root());
        assert_eq!(a.replies(), b.replies());
        assert_eq!(b.root().unwrap().reply_count(), 2);
        assert!(a.own_ops.is_empty());
    }

    #[tokio::test]
    async fn own_events_are_not_applied_twice() {
        let f = fixture(20, Privacy::Public);
        let mut v = f.open(f.root.address()).await;
        v.add_reply(&f.session, String::from("once"), f.user)
            .await
            .unwrap();
        let e = v.subscription.try_next().unwrap();
        assert_eq!(v.reconcile(&e), Reconciled::Echo);
        assert_eq!(v.root().unwrap().reply_count(), 1);
        assert_eq!(v.replies().len(), 1);

        // a second delivery of the same event is deduplicated by id
        assert_eq!(v.reconcile(&e), Reconciled::Ignored);
        assert_eq!(v.root().unwrap().reply_count(), 1);
    }

    #[tokio::test]
    async fn deletion_elsewhere_decrements_parent() {
        let f = fixture(1, Privacy::Public);
        let replies = f.seed_replies(3);
        let mut a = f.open(f.root.address()).await;
        let mut b = f.open(f.root.address()).await;
        let mut child = f.open(replies[2].address()).await;
        assert_eq!(a.replies().len(), 1);

        // not loaded in b, only the counter moves
        a.load_more(&f.session).await.unwrap();
        a.delete(&f.session, replies[1].id).await.unwrap();
        assert_eq!(b.sync_events(), 1);
        assert_eq!(b.root().unwrap().reply_count(), 2);
        assert!(b.reply(&replies[1].id).is_none());

        // loaded in b, tombstoned there too
        a.delete(&f.session, replies[2].id).await.unwrap();
        b.sync_events();
        assert_eq!(
            b.reply(&replies[2].id).unwrap().visibility(),
            Visibility::Deleted
        );
        assert_eq!(b.root().unwrap().reply_count(), 1);

        // the view rooted at that reply shows the tombstone as its root
        assert_eq!(child.sync_events(), 1);
        assert!(child.root().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn replies_below_a_reply_bump_its_counter() {
        let f = fixture(20, Privacy::Public);
        let replies = f.seed_replies(1);
        let mut top = f.open(f.root.address()).await;
        let mut sub = f.open(replies[0].address()).await;
        sub.add_reply(&f.session, String::from("deeper"), f.user)
            .await
            .unwrap();
        assert_eq!(top.sync_events(), 1);
        assert_eq!(top.reply(&replies[0].id).unwrap().reply_count(), 1);
        assert_eq!(top.root().unwrap().reply_count(), 1);

        let deeper = sub.replies()[0].id;
        sub.delete(&f.session, deeper).await.unwrap();
        assert_eq!(top.sync_events(), 1);
        assert_eq!(top.reply(&replies[0].id).unwrap().reply_count(), 0);
    }

    #[tokio::test]
    async fn unrelated_and_unknown_events_are_ignored() {
        let f = fixture(20, Privacy::Public);
        let mut v = f.open(f.root.address()).await;
        let before = (v.root().cloned(), v.replies().to_vec());

        let elsewhere = NodePath::anchor(f.anchor.id).child(CommentId(Uuid::new_v4()));
        let e = event(
            &elsewhere,
            EventData::Remove {
                comment_id: CommentId(Uuid::new_v4()),
            },
        );
        assert_eq!(v.reconcile(&e), Reconciled::Ignored);
        let e = event(&f.root.address(), EventData::Unknown);
        assert_eq!(v.reconcile(&e), Reconciled::Ignored);
        assert_eq!((v.root().cloned(), v.replies().to_vec()), before);
    }

    #[tokio::test]
    async fn repeated_remove_only_counts_once() {
        let f = fixture(20, Privacy::Public);
        let replies = f.seed_replies(2);
        let mut v = f.open(f.root.address()).await;
        let e = event(
            &f.root.address(),
            EventData::Remove {
                comment_id: replies[0].id,
            },
        );
        assert_eq!(v.reconcile(&e), Reconciled::Applied);
        assert_eq!(v.reconcile(&e), Reconciled::Ignored);
        assert_eq!(v.root().unwrap().reply_count(), 1);
    }
}
