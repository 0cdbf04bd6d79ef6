use uuid::Uuid;

use crate::{UserId, Visibility, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    pub fn stub() -> AnchorId {
        AnchorId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privacy {
    Public,
    Anonymous,
}

/// The content item a whole comment tree hangs from
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Anchor {
    pub id: AnchorId,
    pub author: UserId,
    pub privacy: Privacy,
}

impl Anchor {
    pub fn stub() -> Anchor {
        Anchor {
            id: AnchorId::stub(),
            author: UserId::stub(),
            privacy: Privacy::Public,
        }
    }

    /// Visibility a new comment by `author` gets on this anchor.
    ///
    /// When the anchor was posted anonymously, its author must stay anonymous
    /// in the discussion too, whoever is looking at it.
    pub fn visibility_for(&self, author: &UserId) -> Visibility {
        match self.privacy {
            Privacy::Anonymous if self.author == *author => Visibility::Anonymous,
            _ => Visibility::Regular,
        }
    }
}
