use anyhow::Context;
use hanashi_client::{
    api::{Anchor, AnchorId, NodePath, Privacy, UserId, Uuid},
    Action, ClientConfig, EventBus, Navigator, ThreadView,
};
use hanashi_mock_server::MockServer;
use std::sync::Arc;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Replies fetched per page
    #[structopt(long, default_value = "20")]
    page_size: usize,

    /// Create the anchor with anonymous authorship
    #[structopt(long)]
    anonymous: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Drill down a freshly written thread, one view per level
    Drill {
        /// Number of nested levels to open
        #[structopt(long, default_value = "3")]
        depth: usize,

        /// Replies written at each level
        #[structopt(long, default_value = "2")]
        replies: usize,
    },

    /// Mutate a thread through one view and show a second one following
    Mirror {
        /// Replies seeded before opening the views
        #[structopt(long, default_value = "5")]
        seeded: usize,
    },

    /// Dump every bus event published while running a short session
    Events,
}

fn snapshot(view: &ThreadView) -> serde_json::Value {
    serde_json::json!({
        "address": view.address().to_string(),
        "root": view.root(),
        "replies": view.replies(),
        "has_more": view.has_more(),
    })
}

fn print(value: &serde_json::Value) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{s}");
    Ok(())
}

struct Session {
    server: MockServer,
    nav: Navigator<hanashi_mock_server::MockSession>,
    root: NodePath,
}

fn session(opt: &Opt, bus: EventBus) -> anyhow::Result<Session> {
    let server = MockServer::with_page_size(opt.page_size);
    let anchor = Anchor {
        id: AnchorId(Uuid::new_v4()),
        author: UserId::new_random(),
        privacy: match opt.anonymous {
            true => Privacy::Anonymous,
            false => Privacy::Public,
        },
    };
    server
        .admin_create_anchor(anchor.clone())
        .context("creating anchor")?;
    let root = server
        .admin_add_comment(&NodePath::anchor(anchor.id), anchor.author, "What do you think?")?
        .address();
    // the anchor author is browsing, to show masking at work
    let store = Arc::new(server.session(anchor.author));
    let nav = Navigator::with_bus(ClientConfig::new(anchor.author, anchor), store, bus);
    Ok(Session { server, nav, root })
}

async fn drill(mut s: Session, depth: usize, replies: usize) -> anyhow::Result<()> {
    let mut address = s.root.clone();
    for level in 0..depth {
        let key = s
            .nav
            .open_address(address.clone())
            .await
            .with_context(|| format!("opening level {level}"))?;
        for i in 0..replies {
            let text = format!("reply {i} at level {level}");
            s.nav
                .perform(key, Action::AddReply { text })
                .await
                .with_context(|| format!("replying at level {level}"))?;
        }
        let top = s.nav.top().context("navigator has no view")?;
        match top.replies().first() {
            Some(c) => address = c.address(),
            None => break,
        }
    }
    s.nav.sync_all();
    for key in s.nav.stack() {
        if let Some(v) = s.nav.view(*key) {
            print(&snapshot(v))?;
        }
    }
    tracing::info!(comments = s.server.num_comments(), "drill done");
    Ok(())
}

async fn mirror(mut s: Session, seeded: usize) -> anyhow::Result<()> {
    let viewer = s.nav.config().viewer;
    for i in 0..seeded {
        s.server
            .admin_add_comment(&s.root, viewer, &format!("seeded {i}"))?;
    }
    let a = s.nav.open_address(s.root.clone()).await?;
    let b = s.nav.open_address(s.root.clone()).await?;
    let first = s
        .nav
        .view(a)
        .and_then(|v| v.replies().first())
        .map(|c| c.id)
        .context("thread has no replies, seed some")?;

    s.nav
        .perform(a, Action::AddReply { text: String::from("a new reply") })
        .await?;
    s.nav.perform(a, Action::ToggleLike { id: first }).await?;
    s.nav
        .perform(a, Action::Edit { id: first, text: String::from("edited through a") })
        .await?;
    // completions already brought b up to date
    let applied = s.nav.sync_all();
    tracing::info!(applied, "late bus events");
    let view_a = s.nav.view(a).context("view a vanished")?;
    let view_b = s.nav.view(b).context("view b vanished")?;
    print(&serde_json::json!({
        "a": snapshot(view_a),
        "b": snapshot(view_b),
        "converged": view_a.replies() == view_b.replies() && view_a.root() == view_b.root(),
    }))?;
    Ok(())
}

async fn events(opt: &Opt) -> anyhow::Result<()> {
    let bus = EventBus::new();
    let mut s = session(opt, bus.clone())?;
    // the anchor path is an ancestor of everything, so this sees all events
    let mut spy = bus.subscribe(NodePath::anchor(s.root.anchor));
    let key = s.nav.open_address(s.root.clone()).await?;
    s.nav
        .perform(key, Action::AddReply { text: String::from("first") })
        .await?;
    let id = s
        .nav
        .view(key)
        .and_then(|v| v.replies().first())
        .map(|c| c.id)
        .context("reply did not show up")?;
    s.nav.perform(key, Action::ToggleLike { id }).await?;
    s.nav.perform(key, Action::Delete { id }).await?;
    s.nav.perform(key, Action::Delete { id }).await?;
    while let Some(e) = spy.try_next() {
        print(&serde_json::to_value(&*e).context("serializing bus event")?)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    match opt.cmd {
        Command::Drill { depth, replies } => {
            drill(session(&opt, EventBus::new())?, depth, replies).await
        }
        Command::Mirror { seeded } => mirror(session(&opt, EventBus::new())?, seeded).await,
        Command::Events => events(&opt).await,
    }
}
