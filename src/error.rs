//! Error types for the logic-tree engine
//!
//! ## Table of Contents
//! - **LogicTreeError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, LogicTreeError>`
//! - **NodeContext**: Attach node/file/line context to a failing result

use thiserror::Error;

use crate::node::Node;

/// Result type alias for logic-tree operations
pub type Result<T> = std::result::Result<T, LogicTreeError>;

/// Main error type for logic-tree operations
#[derive(Error, Debug)]
pub enum LogicTreeError {
    /// Structural error in a logic-tree file, located at a line
    #[error("filename '{filename}', line {}: {message}", fmt_line(.lineno))]
    Logic {
        /// File being parsed
        filename: String,
        /// Line of the offending element, if known
        lineno: Option<usize>,
        /// What went wrong
        message: String,
    },

    /// Identifier space exhausted (TWO24 packing, BASE183 alphabet)
    #[error("{0}")]
    Scale(String),

    /// Duplicated identifier (branchSetID, uncertainty type)
    #[error("duplicated ID: {0}")]
    DuplicatedId(String),

    /// Inconsistent value
    #[error("{0}")]
    Value(String),

    /// Unreadable or malformed input file
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// Invalid GSIM logic tree
    #[error("invalid gsim logic tree: {0}")]
    InvalidGsimLogicTree(String),

    /// Error raised while processing a node, decorated with its position
    #[error("node {tag}: {message}, line {} of {filename}", fmt_line(.lineno))]
    Context {
        /// Tag of the node being processed
        tag: String,
        /// Display of the wrapped error
        message: String,
        /// Line of the node, if known
        lineno: Option<usize>,
        /// File the node comes from
        filename: String,
        /// The wrapped error
        #[source]
        source: Box<LogicTreeError>,
    },

    /// XML reading failure
    #[error("xml error: {0}")]
    Xml(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Binary container failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn fmt_line(lineno: &Option<usize>) -> String {
    match lineno {
        Some(n) => n.to_string(),
        None => "?".to_string(),
    }
}

impl LogicTreeError {
    /// Create a structural error located at `node` of `filename`
    pub fn logic(node: &Node, filename: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Logic {
            filename: filename.into(),
            lineno: node.lineno,
            message: msg.into(),
        }
    }

    /// Create a scale/packing error
    pub fn scale(msg: impl Into<String>) -> Self {
        Self::Scale(msg.into())
    }

    /// Create a duplicated-id error
    pub fn duplicated(msg: impl Into<String>) -> Self {
        Self::DuplicatedId(msg.into())
    }

    /// Create a value error
    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }

    /// Create an invalid-file error
    pub fn invalid_file(msg: impl Into<String>) -> Self {
        Self::InvalidFile(msg.into())
    }

    /// Create an invalid gsim logic tree error
    pub fn invalid_gsim_lt(msg: impl Into<String>) -> Self {
        Self::InvalidGsimLogicTree(msg.into())
    }

    /// Create an XML error
    pub fn xml(msg: impl Into<String>) -> Self {
        Self::Xml(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// The innermost error, looking through any number of node contexts
    pub fn root(&self) -> &LogicTreeError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<toml::de::Error> for LogicTreeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<quick_xml::Error> for LogicTreeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

/// Decorates the error of a failing result with the node and file it was
/// raised for, keeping the original error as the source.
pub trait NodeContext<T> {
    /// Wrap the error as `node <tag>: <msg>, line <n> of <filename>`
    fn node_context(self, filename: &str, node: &Node) -> Result<T>;
}

impl<T> NodeContext<T> for Result<T> {
    fn node_context(self, filename: &str, node: &Node) -> Result<T> {
        self.map_err(|err| LogicTreeError::Context {
            tag: node.tag.clone(),
            message: err.to_string(),
            lineno: node.lineno,
            filename: filename.to_string(),
            source: Box::new(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_error_display() {
        let node = Node::new("logicTreeBranchSet").with_lineno(12);
        let err = LogicTreeError::logic(&node, "lt.xml", "branchset weights sum up to 0.9, not 1");
        assert_eq!(
            err.to_string(),
            "filename 'lt.xml', line 12: branchset weights sum up to 0.9, not 1"
        );
    }

    #[test]
    fn test_logic_error_without_line() {
        let node = Node::new("logicTree");
        let err = LogicTreeError::logic(&node, "lt.xml", "boom");
        assert_eq!(err.to_string(), "filename 'lt.xml', line ?: boom");
    }

    #[test]
    fn test_context_keeps_root() {
        let node = Node::new("uncertaintyWeight").with_lineno(7);
        let res: Result<()> = Err(LogicTreeError::value("could not convert 'x' to float"));
        let err = res.node_context("gmpe.xml", &node).unwrap_err();
        assert_eq!(
            err.to_string(),
            "node uncertaintyWeight: could not convert 'x' to float, line 7 of gmpe.xml"
        );
        assert!(matches!(err.root(), LogicTreeError::Value(_)));
    }
}
