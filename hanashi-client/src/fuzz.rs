#![cfg(test)]

use std::{cmp, ops::RangeTo, panic::AssertUnwindSafe, sync::Arc};

use bolero::generator::{gen_with, TypeGenerator};
use hanashi_mock_server::{Call, MockServer, MockSession};

use crate::{
    api::{Anchor, AnchorId, CommentId, CommentStore, Error, NodePath, Privacy, UserId, Uuid},
    Action, ClientConfig, Navigator, Pending, ViewKey,
};

macro_rules! do_tokio_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt::try_init();
            }
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

/// Small enough for seeded threads to span several pages
const PAGE_SIZE: usize = 3;

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end);
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1))
}

#[derive(Clone, Debug, TypeGenerator)]
enum FuzzOp {
    Add {
        on_b: bool,
        fail: bool,
    },
    Edit {
        on_b: bool,
        reply: usize,
        #[generator(gen_with::<String>().len(0..16usize))]
        text: String,
    },
    Like {
        on_b: bool,
        reply: usize,
    },
    Delete {
        on_b: bool,
        reply: usize,
    },
    /// Reloads a view, maybe while some of its writes are still in flight
    Retry {
        on_b: bool,
    },
    LoadMore {
        on_b: bool,
    },
    /// Finishes one of the store calls still in flight
    Finish {
        pending: usize,
    },
    Sync,
}

/// Two views on the same thread, each mutating it with store calls that
/// resolve in arbitrary order
struct Fuzzer {
    server: MockServer,
    session: MockSession,
    nav: Navigator<MockSession>,
    root: NodePath,
    a: ViewKey,
    b: ViewKey,
    in_flight: Vec<Pending>,
}

impl Fuzzer {
    async fn new(seeded: u8) -> Fuzzer {
        let server = MockServer::with_page_size(PAGE_SIZE);
        let anchor = Anchor {
            id: AnchorId(Uuid::new_v4()),
            author: UserId::new_random(),
            privacy: Privacy::Public,
        };
        server
            .admin_create_anchor(anchor.clone())
            .expect("creating anchor");
        let viewer = UserId::new_random();
        let root = server
            .admin_add_comment(&NodePath::anchor(anchor.id), viewer, "root")
            .expect("seeding root")
            .address();
        for i in 0..seeded % 8 {
            server
                .admin_add_comment(&root, viewer, &format!("seeded {i}"))
                .expect("seeding reply");
        }
        let session = server.session(viewer);
        let mut nav = Navigator::new(
            ClientConfig::new(viewer, anchor),
            Arc::new(session.clone()),
        );
        let a = nav.open_address(root.clone()).await.expect("opening a");
        let b = nav.open_address(root.clone()).await.expect("opening b");
        Fuzzer {
            server,
            session,
            nav,
            root,
            a,
            b,
            in_flight: Vec::new(),
        }
    }

    fn pick_reply(&self, view: ViewKey, reply: usize) -> Option<CommentId> {
        let replies = self.nav.view(view)?.replies();
        resize_int(reply, ..replies.len()).map(|i| replies[i].id)
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        let (a, b) = (self.a, self.b);
        let view = move |on_b: bool| match on_b {
            true => b,
            false => a,
        };
        let (key, action) = match op {
            FuzzOp::Add { on_b, fail } => {
                if fail {
                    self.server
                        .fail_next(Call::AddReply, Error::rejected("fuzzed failure"));
                }
                let text = String::from("fuzzed reply");
                (view(on_b), Action::AddReply { text })
            }
            FuzzOp::Edit { on_b, reply, text } => match self.pick_reply(view(on_b), reply) {
                Some(id) => (view(on_b), Action::Edit { id, text }),
                None => return,
            },
            FuzzOp::Like { on_b, reply } => match self.pick_reply(view(on_b), reply) {
                Some(id) => (view(on_b), Action::ToggleLike { id }),
                None => return,
            },
            FuzzOp::Delete { on_b, reply } => match self.pick_reply(view(on_b), reply) {
                Some(id) => (view(on_b), Action::Delete { id }),
                None => return,
            },
            FuzzOp::Retry { on_b } => (view(on_b), Action::Retry),
            FuzzOp::LoadMore { on_b } => (view(on_b), Action::LoadMore),
            FuzzOp::Finish { pending } => {
                if let Some(i) = resize_int(pending, ..self.in_flight.len()) {
                    self.finish(i).await;
                }
                return;
            }
            FuzzOp::Sync => {
                self.nav.sync_all();
                return;
            }
        };
        // refusals are expected, eg. a pending or tombstoned target
        if let Ok(Some(p)) = self.nav.begin(key, action) {
            self.in_flight.push(p);
        }
    }

    async fn load_everything(&mut self, key: ViewKey) {
        while self.nav.view(key).map_or(false, |v| v.has_more()) {
            self.nav
                .perform(key, Action::LoadMore)
                .await
                .expect("loading more replies");
        }
    }

    async fn finish(&mut self, i: usize) {
        let p = self.in_flight.remove(i);
        let completion = p.run(&self.session).await;
        let _ = self.nav.complete(completion);
    }

    async fn settle_and_check(mut self) {
        while !self.in_flight.is_empty() {
            self.finish(0).await;
        }
        self.nav.sync_all();
        self.load_everything(self.a).await;
        self.load_everything(self.b).await;

        let fresh = self
            .nav
            .open_address(self.root.clone())
            .await
            .expect("opening fresh view");
        self.load_everything(fresh).await;
        let a = self.nav.view(self.a).expect("a is still open");
        let b = self.nav.view(self.b).expect("b is still open");
        let c = self.nav.view(fresh).expect("fresh view is open");
        assert_eq!(a.root(), c.root(), "view a diverged from the store");
        assert_eq!(a.replies(), c.replies(), "view a diverged from the store");
        assert_eq!(b.root(), c.root(), "view b diverged from the store");
        assert_eq!(b.replies(), c.replies(), "view b diverged from the store");

        let live = c.replies().iter().filter(|r| !r.is_deleted()).count();
        assert_eq!(c.root().map(|r| r.reply_count()), Some(live as u64));
        let popped = self.nav.pop().expect("popping fresh view");
        assert_eq!(popped.key(), fresh);
        assert!(self.nav.view(fresh).is_none());
    }
}

do_tokio_test!(
    two_views_converge,
    gen_with::<(u8, Vec<FuzzOp>)>(),
    |(seeded, ops): (u8, Vec<FuzzOp>)| async move {
        let mut fuzzer = Fuzzer::new(seeded).await;
        for op in ops {
            fuzzer.execute_fuzz_op(op).await;
        }
        fuzzer.settle_and_check().await;
    }
);

do_tokio_test!(
    like_toggled_twice_is_a_no_op,
    gen_with::<(u8, usize)>(),
    |(seeded, reply): (u8, usize)| async move {
        let mut f = Fuzzer::new(seeded % 7 + 1).await;
        let id = f.pick_reply(f.a, reply).expect("at least one reply");
        let before = f.nav.view(f.a).and_then(|v| v.reply(&id)).cloned();
        for _ in 0..2 {
            f.nav
                .perform(f.a, Action::ToggleLike { id })
                .await
                .expect("toggling like");
        }
        assert_eq!(f.nav.view(f.a).and_then(|v| v.reply(&id)).cloned(), before);
        f.nav.sync_all();
        assert_eq!(f.nav.view(f.b).and_then(|v| v.reply(&id)).cloned(), before);
    }
);

do_tokio_test!(
    deletions_count_each_child_once,
    gen_with::<(u8, Vec<usize>)>(),
    |(seeded, deletions): (u8, Vec<usize>)| async move {
        let mut f = Fuzzer::new(seeded).await;
        let initial = f
            .nav
            .view(f.a)
            .and_then(|v| v.root())
            .map(|r| r.reply_count())
            .expect("root is loaded");
        let mut deleted = std::collections::HashSet::new();
        for d in deletions {
            let id = match f.pick_reply(f.a, d) {
                None => break,
                Some(id) => id,
            };
            f.nav
                .perform(f.a, Action::Delete { id })
                .await
                .expect("deleting reply");
            deleted.insert(id);
        }
        f.nav.sync_all();
        for v in [f.a, f.b] {
            let v = f.nav.view(v).expect("view is open");
            assert_eq!(
                v.root().map(|r| r.reply_count()),
                Some(initial - deleted.len() as u64)
            );
        }
        let root = f.session.fetch_root(&f.root).await.expect("fetching root");
        assert_eq!(root.reply_count(), initial - deleted.len() as u64);
        // tombstones stay listed
        f.load_everything(f.a).await;
        let a = f.nav.view(f.a).expect("view is open");
        assert_eq!(a.replies().len() as u64, initial);
    }
);
