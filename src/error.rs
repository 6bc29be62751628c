use std::path::PathBuf;

use thiserror::Error;

use crate::PropertyType;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddChildError {
    #[error("Attempted to add too many nodes")]
    TooManyNodes,
}

pub type AddChildResult = Result<(), AddChildError>;

/// A single attribute could not be converted to its property type.
/// Never fatal: the loader logs it and leaves the property at its default.
#[derive(Debug, Error)]
#[error("cannot convert {value:?} to {ty:?} for property {key}")]
pub struct PropertyError {
    pub key: String,
    pub ty: PropertyType,
    pub value: String,
}

/// Fatal errors raised while compiling a tree description.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("failed to read tree file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed tree document at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error(
        "invalid root element <{0}>, expected <root BTCPP_format=\"4\" main_tree_to_execute=\"TreeName\">"
    )]
    InvalidRoot(String),
    #[error("no BehaviorTree found, available elements: {}", .available.join(", "))]
    MissingTree { available: Vec<String> },
    #[error("BehaviorTree '{0}' must contain a root node")]
    EmptyTree(String),
    #[error("unknown node type '{name}', available types: {}", .available.join(", "))]
    UnknownNode { name: String, available: Vec<String> },
    #[error("node '{node}' ({ty}) requires exactly {expected} child element(s), found {found}")]
    ChildCount {
        node: String,
        ty: String,
        expected: usize,
        found: usize,
    },
    #[error("{0} to {1}")]
    AddChildError(AddChildError, String),
    #[error("SubTree element requires an ID attribute")]
    MissingSubtreeId,
    #[error("SubTree '{id}' not found, available trees: {}", .available.join(", "))]
    SubtreeNotFound { id: String, available: Vec<String> },
    #[error("detected recursive SubTree reference: {path}")]
    SubtreeCycle { path: String },
}
