use uuid::Uuid;

use crate::{Comment, CommentId, NodePath};

/// Identifies one mutation from the moment it is attempted until its
/// confirmation comes back on the bus
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize,
)]
pub struct OpId(pub Uuid);

impl OpId {
    pub fn new() -> OpId {
        OpId(Uuid::new_v4())
    }
}

impl Default for OpId {
    fn default() -> OpId {
        OpId::new()
    }
}

/// A confirmed mutation of the comment tree.
///
/// `path` is the address of the parent of the mutated comment.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BusEvent {
    pub op: OpId,
    pub path: NodePath,

    #[serde(flatten)]
    pub data: EventData,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventData {
    Add {
        comment: Comment,
    },
    Remove {
        comment_id: CommentId,
    },
    Edit {
        comment_id: CommentId,
        text: String,
    },
    Like {
        comment_id: CommentId,
        liked: bool,
    },

    /// Kinds introduced by newer producers
    #[serde(other)]
    Unknown,
}

impl BusEvent {
    pub fn new(op: OpId, path: NodePath, data: EventData) -> BusEvent {
        BusEvent { op, path, data }
    }

    pub fn comment_id(&self) -> Option<CommentId> {
        match &self.data {
            EventData::Add { comment } => Some(comment.id),
            EventData::Remove { comment_id }
            | EventData::Edit { comment_id, .. }
            | EventData::Like { comment_id, .. } => Some(*comment_id),
            EventData::Unknown => None,
        }
    }

    /// Address of the mutated comment, or of its parent for unknown kinds
    pub fn target(&self) -> NodePath {
        match self.comment_id() {
            Some(id) => self.path.child(id),
            None => self.path.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.data {
            EventData::Add { .. } => "add",
            EventData::Remove { .. } => "remove",
            EventData::Edit { .. } => "edit",
            EventData::Like { .. } => "like",
            EventData::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnchorId;

    #[test]
    fn target_of_known_kinds() {
        let path = NodePath::anchor(AnchorId::stub());
        let id = CommentId(Uuid::new_v4());
        let e = BusEvent::new(OpId::new(), path.clone(), EventData::Remove { comment_id: id });
        assert_eq!(e.target(), path.child(id));
        assert_eq!(e.kind(), "remove");
    }

    #[test]
    fn wire_format() {
        let path = NodePath::anchor(AnchorId::stub());
        let id = CommentId(Uuid::new_v4());
        let e = BusEvent::new(
            OpId::new(),
            path,
            EventData::Like {
                comment_id: id,
                liked: true,
            },
        );
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "like");
        assert_eq!(json["liked"], true);
        assert_eq!(serde_json::from_value::<BusEvent>(json).unwrap(), e);
    }

    #[test]
    fn unknown_kind_is_not_fatal() {
        let json = serde_json::json!({
            "op": Uuid::new_v4(),
            "path": { "anchor": Uuid::new_v4(), "ids": [] },
            "kind": "pin",
            "comment_id": Uuid::new_v4(),
            "pinned": true,
        });
        let e: BusEvent = serde_json::from_value(json).unwrap();
        assert_eq!(e.data, EventData::Unknown);
        assert_eq!(e.comment_id(), None);
        assert_eq!(e.target(), e.path);
    }
}
