use std::fmt;

use crate::{AnchorId, CommentId};

/// Address of a node in a comment tree.
///
/// `ids` lists comment ids from the first-level comment down. An empty
/// `ids` designates the anchor itself, whose children are the top-level
/// comments.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NodePath {
    pub anchor: AnchorId,
    pub ids: Vec<CommentId>,
}

impl NodePath {
    pub fn anchor(anchor: AnchorId) -> NodePath {
        NodePath {
            anchor,
            ids: Vec::new(),
        }
    }

    pub fn is_anchor(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.ids.len()
    }

    pub fn last(&self) -> Option<&CommentId> {
        self.ids.last()
    }

    pub fn child(&self, id: CommentId) -> NodePath {
        let mut ids = Vec::with_capacity(self.ids.len() + 1);
        ids.extend_from_slice(&self.ids);
        ids.push(id);
        NodePath {
            anchor: self.anchor,
            ids,
        }
    }

    /// Returns `None` for the anchor path
    pub fn parent(&self) -> Option<NodePath> {
        let (_, init) = self.ids.split_last()?;
        Some(NodePath {
            anchor: self.anchor,
            ids: init.to_vec(),
        })
    }

    pub fn is_prefix_of(&self, other: &NodePath) -> bool {
        self.anchor == other.anchor && other.ids.starts_with(&self.ids)
    }

    /// Whether one of the two paths lies on the other's branch
    pub fn is_related_to(&self, other: &NodePath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.anchor.0)?;
        for id in &self.ids {
            write!(f, "/{}", id.0)?;
        }
        Ok(())
    }
}
