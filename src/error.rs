use thiserror::Error;

use crate::model::{EdgeId, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    #[error("cannot connect node '{0}' to itself")]
    SelfLoopRejected(NodeId),

    #[error("an edge from '{from}' to '{to}' with the same anchors already exists")]
    DuplicateEdgeRejected { from: NodeId, to: NodeId },

    #[error("edge endpoint '{0}' does not exist")]
    UnknownEndpoint(NodeId),

    #[error("node '{0}' not found")]
    UnknownNode(NodeId),

    #[error("edge '{0}' not found")]
    UnknownEdge(EdgeId),

    #[error("node id '{0}' is already in use")]
    DuplicateNodeId(NodeId),

    #[error("entities must carry a non-empty id")]
    EmptyId,

    #[error("malformed canvas document: {0}")]
    MalformedDocument(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
}

impl CanvasError {
    /// Rejections caused by the user's own connect gesture.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CanvasError::SelfLoopRejected(_)
                | CanvasError::DuplicateEdgeRejected { .. }
                | CanvasError::UnknownEndpoint(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode canvas document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}
