//! # Quake Logic Tree: Node
//!
//! Table of Contents:
//! 1. Node - Generic document element (tag, attributes, text, children, line)
//! 2. Builders and accessors
//! 3. XML output

use std::fmt::Write as _;

use indexmap::IndexMap;
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::error::{LogicTreeError, Result};

// ─────────────────────────────────────────────
// 1. Node
// ─────────────────────────────────────────────

/// A document element as produced by the NRML reader.
///
/// Tags are stored without their namespace prefix, so `gml:posList`
/// becomes `posList`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Local tag name
    pub tag: String,
    /// Attributes in document order
    pub attrib: IndexMap<String, String>,
    /// Text content, if any
    pub text: Option<String>,
    /// Child elements in document order
    pub nodes: Vec<Node>,
    /// 1-based line where the element starts
    pub lineno: Option<usize>,
}

// ─────────────────────────────────────────────
// 2. Builders and accessors
// ─────────────────────────────────────────────

impl Node {
    /// Create an empty node with the given tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Add an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrib.insert(key.into(), value.into());
        self
    }

    /// Set the text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append several children
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Set the line number
    pub fn with_lineno(mut self, lineno: usize) -> Self {
        self.lineno = Some(lineno);
        self
    }

    /// Optional attribute lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrib.get(key).map(String::as_str)
    }

    /// Required attribute lookup
    pub fn attr(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            LogicTreeError::xml(format!(
                "missing attribute {key} in <{}> at line {}",
                self.tag,
                self.lineno.map_or_else(|| "?".to_string(), |n| n.to_string())
            ))
        })
    }

    /// First child with the given tag
    pub fn child(&self, tag: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.tag == tag)
    }

    /// Required child with the given tag
    pub fn require(&self, tag: &str) -> Result<&Node> {
        self.child(tag).ok_or_else(|| {
            LogicTreeError::xml(format!("<{}> has no <{tag}> child", self.tag))
        })
    }

    /// All children with the given tag
    pub fn children<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.tag == tag)
    }

    /// Trimmed text, empty when missing
    pub fn text_trim(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or("")
    }

    /// Number of children
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the node has no children
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first iterator over this node and all its descendants
    pub fn walk(&self) -> Vec<&Node> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            out.extend(node.nodes.iter());
            i += 1;
        }
        out
    }

    // ─────────────────────────────────────────────
    // 3. XML output
    // ─────────────────────────────────────────────

    /// Serialize the node as indented XML
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        let _ = write!(out, "{indent}<{}", self.tag);
        for (key, value) in &self.attrib {
            let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
        }
        match (&self.text, self.nodes.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                let _ = writeln!(out, ">{}</{}>", escape(text.as_str()), self.tag);
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    let _ = writeln!(out, "{indent}    {}", escape(text.as_str()));
                }
                for node in &self.nodes {
                    node.write_xml(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}</{}>", self.tag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let node = Node::new("logicTreeBranch")
            .with_attr("branchID", "b1")
            .with_node(Node::new("uncertaintyModel").with_text("  sm.xml "))
            .with_node(Node::new("uncertaintyWeight").with_text("1.0"));
        assert_eq!(node.get("branchID"), Some("b1"));
        assert!(node.attr("missing").is_err());
        assert_eq!(node.require("uncertaintyModel").unwrap().text_trim(), "sm.xml");
        assert_eq!(node.children("uncertaintyWeight").count(), 1);
        assert_eq!(node.walk().len(), 3);
    }

    #[test]
    fn test_to_xml_escapes() {
        let node = Node::new("logicTree")
            .with_attr("logicTreeID", "a&b")
            .with_node(Node::new("uncertaintyModel").with_text("<x>"));
        let xml = node.to_xml();
        assert!(xml.contains("logicTreeID=\"a&amp;b\""));
        assert!(xml.contains("<uncertaintyModel>&lt;x&gt;</uncertaintyModel>"));
    }
}
