use anyhow::Context;
use hanashi_api::{Anchor, AnchorId, Comment, CommentStore, NodePath, Privacy, UserId, Uuid};
use hanashi_mock_server::MockServer;
use rand::{rngs::StdRng, Rng, SeedableRng};

const COMMENT_MIN_WORDS: usize = 3;
const COMMENT_MAX_WORDS: usize = 40;

const LIKE_PROBABILITY: f64 = 0.3;
const DELETE_PROBABILITY: f64 = 0.1;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Seed of the random generator, for reproducible data
    #[structopt(long, default_value = "0")]
    seed: u64,

    #[structopt(long, default_value = "5")]
    users: usize,

    /// Top-level comments on the anchor
    #[structopt(long, default_value = "10")]
    roots: usize,

    /// Maximum nesting of replies below a top-level comment
    #[structopt(long, default_value = "3")]
    depth: usize,

    /// Maximum replies per comment
    #[structopt(long, default_value = "4")]
    fanout: usize,

    /// Make the anchor anonymous, masking its author's comments
    #[structopt(long)]
    anonymous: bool,
}

fn gen_text(rng: &mut StdRng) -> String {
    let words = rng.gen_range(COMMENT_MIN_WORDS..=COMMENT_MAX_WORDS);
    lipsum::lipsum_words_with_rng(&mut *rng, words)
}

struct Tree<'a> {
    server: &'a MockServer,
    users: &'a [UserId],
    fanout: usize,
}

impl Tree<'_> {
    /// Comments are written depth first; addresses are pushed in creation order
    fn gen(
        &self,
        rng: &mut StdRng,
        parent: &NodePath,
        count: usize,
        depth: usize,
        out: &mut Vec<NodePath>,
    ) -> anyhow::Result<()> {
        for _ in 0..count {
            let author = self.users[rng.gen_range(0..self.users.len())];
            let text = gen_text(rng);
            let c = self.server.admin_add_comment(parent, author, &text)?;
            out.push(c.address());
            if depth > 0 {
                let fanout = rng.gen_range(0..=self.fanout);
                self.gen(rng, &c.address(), fanout, depth - 1, out)?;
            }
        }
        Ok(())
    }
}

async fn all_replies<S: CommentStore>(
    store: &S,
    address: &NodePath,
) -> anyhow::Result<Vec<Comment>> {
    let mut res = Vec::new();
    let mut cursor = None;
    loop {
        let page = store
            .fetch_replies(address, cursor.as_ref())
            .await
            .with_context(|| format!("listing replies of {address}"))?;
        res.extend(page.replies);
        match page.next_cursor {
            None => return Ok(res),
            Some(c) => cursor = Some(c),
        }
    }
}

/// Flattens the tree below `top`, parents before their replies
async fn dump<S: CommentStore>(store: &S, top: &NodePath) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut res = Vec::new();
    let mut todo = vec![top.clone()];
    while let Some(address) = todo.pop() {
        for c in all_replies(store, &address).await? {
            todo.push(c.address());
            let mut v = serde_json::to_value(&c).context("serializing comment")?;
            v["address"] = serde_json::Value::String(c.address().to_string());
            res.push(v);
        }
    }
    Ok(res)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();
    anyhow::ensure!(opt.users > 0, "at least one user is needed");
    let mut rng = StdRng::seed_from_u64(opt.seed);

    let users = (0..opt.users)
        .map(|_| UserId(Uuid::from_u128(rng.gen())))
        .collect::<Vec<_>>();
    let anchor = Anchor {
        id: AnchorId(Uuid::from_u128(rng.gen())),
        author: users[0],
        privacy: match opt.anonymous {
            true => Privacy::Anonymous,
            false => Privacy::Public,
        },
    };
    let server = MockServer::new();
    server
        .admin_create_anchor(anchor.clone())
        .context("creating anchor")?;

    let top = NodePath::anchor(anchor.id);
    let mut addresses = Vec::new();
    let tree = Tree {
        server: &server,
        users: &users,
        fanout: opt.fanout,
    };
    tree.gen(&mut rng, &top, opt.roots, opt.depth, &mut addresses)?;

    // Every user likes some comments, then some get deleted
    for u in &users {
        let session = server.session(*u);
        for a in &addresses {
            if rng.gen_bool(LIKE_PROBABILITY) {
                let parent = a.parent().context("comment address without parent")?;
                let id = *a.last().context("comment address without id")?;
                session.toggle_like(&parent, id, true).await?;
            }
        }
    }
    let moderator = server.session(anchor.author);
    for a in &addresses {
        if rng.gen_bool(DELETE_PROBABILITY) {
            let parent = a.parent().context("comment address without parent")?;
            let id = *a.last().context("comment address without id")?;
            moderator.delete_reply(&parent, id).await?;
        }
    }

    // Dump as seen by the anchor author
    let comments = dump(&moderator, &top).await?;
    let out = serde_json::json!({
        "anchor": anchor,
        "users": users,
        "comments": comments,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
