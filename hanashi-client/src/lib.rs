mod bus;
pub use bus::{EventBus, Subscription};

mod navigator;
pub use navigator::{Action, ClientConfig, Navigator};

mod pending;
pub use pending::{Completion, Pending};

mod reconcile;
pub use reconcile::Reconciled;

mod view;
pub use view::{ThreadView, ViewKey};

mod fuzz;

pub mod api {
    pub use hanashi_api::*;
}
