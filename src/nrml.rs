//! NRML reading for logic trees and source models
//!
//! ## Table of Contents
//! - **FileLoader**: Trait for reading logic-tree and source-model files
//! - **FsLoader**: Reads from the filesystem
//! - **MemoryLoader**: In-memory files (trivial trees, tests)
//! - **parse_xml / read_logic_tree**: XML text to [`Node`] tree with line numbers
//! - **get_trt_by_src**: source id -> tectonic region type of a source model
//! - **validate_source_id**: identifier checks

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use tracing::debug;

use crate::error::{LogicTreeError, Result};
use crate::node::Node;

/// Namespace marking the NRML 0.5 source model format
pub const NRML05: &str = "http://openquake.org/xmlns/nrml/0.5";

/// Maximum length of a source identifier
pub const MAX_ID_LENGTH: usize = 60;

lazy_static! {
    static ref TRT_REGEX: Regex = Regex::new(r#"tectonicRegion="([^"]+?)""#).unwrap();
    static ref ID_REGEX: Regex = Regex::new(r#"Source\s+id="([^"]+?)""#).unwrap();
    static ref SOURCE_ID: Regex = Regex::new(r"^[\w\.\-_]+$").unwrap();
}

/// Trait for the file access a logic tree needs
pub trait FileLoader: Send + Sync {
    /// Read a whole file as text
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Check whether a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Loader name for logging
    fn name(&self) -> &str;
}

/// Filesystem loader
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl FileLoader for FsLoader {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| {
            LogicTreeError::invalid_file(format!("{}: {e}", path.display()))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn name(&self) -> &str {
        "fs"
    }
}

/// In-memory loader keyed by path
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: RwLock<HashMap<PathBuf, String>>,
}

impl MemoryLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file, builder style
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Register a file
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    /// Wrap in an `Arc<dyn FileLoader>`
    pub fn shared(self) -> Arc<dyn FileLoader> {
        Arc::new(self)
    }
}

impl FileLoader for MemoryLoader {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LogicTreeError::invalid_file(format!("{}: no such file", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Strip the namespace prefix of a qualified name
fn local(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn start_node(e: &BytesStart<'_>, lineno: usize) -> Result<Node> {
    let mut attrib = IndexMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| LogicTreeError::xml(err.to_string()))?;
        let key = local(attr.key.as_ref());
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|err| LogicTreeError::xml(err.to_string()))?;
        attrib.insert(key, value.into_owned());
    }
    Ok(Node {
        tag: local(e.name().as_ref()),
        attrib,
        text: None,
        nodes: Vec::new(),
        lineno: Some(lineno),
    })
}

/// Parse XML text into a [`Node`] tree; the returned node is the document
/// root element.
pub fn parse_xml(xml: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let bytes = xml.as_bytes();
    let mut line = 1usize;
    let mut seen = 0usize;
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;
    loop {
        let event = reader.read_event()?;
        let upto = (reader.buffer_position() as usize).min(bytes.len());
        line += bytes[seen..upto].iter().filter(|&&b| b == b'\n').count();
        seen = upto;
        match event {
            Event::Start(e) => stack.push(start_node(&e, line)?),
            Event::Empty(e) => {
                let node = start_node(&e, line)?;
                match stack.last_mut() {
                    Some(parent) => parent.nodes.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|err| LogicTreeError::xml(err.to_string()))?;
                if let Some(node) = stack.last_mut() {
                    node.text.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                if let Some(node) = stack.last_mut() {
                    node.text.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| LogicTreeError::xml(format!("unbalanced end tag at line {line}")))?;
                match stack.last_mut() {
                    Some(parent) => parent.nodes.push(node),
                    None => root = Some(node),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(LogicTreeError::xml("unexpected end of document"));
    }
    root.ok_or_else(|| LogicTreeError::xml("empty document"))
}

/// Read a logic-tree file and return its `logicTree` element
pub fn read_logic_tree(loader: &dyn FileLoader, fname: &Path) -> Result<Node> {
    let xml = loader.read_to_string(fname)?;
    let root = parse_xml(&xml)?;
    let lt = if root.tag == "logicTree" {
        Some(root)
    } else {
        root.nodes.into_iter().find(|n| n.tag == "logicTree")
    };
    lt.ok_or_else(|| {
        LogicTreeError::invalid_file(format!("{} is not a valid logic tree file", fname.display()))
    })
}

/// Check a source identifier: ASCII only, at most [`MAX_ID_LENGTH`] chars,
/// made of word characters, dots and dashes.
pub fn validate_source_id(value: &str) -> Result<&str> {
    if !value.is_ascii() {
        return Err(LogicTreeError::value(format!(
            "Invalid ID '{value}': the only accepted chars are a-zA-Z0-9_-"
        )));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(LogicTreeError::value(format!(
            "The ID '{value}' is longer than {MAX_ID_LENGTH} character"
        )));
    }
    if SOURCE_ID.is_match(value) {
        Ok(value)
    } else {
        Err(LogicTreeError::value(format!(
            "Invalid ID '{value}': the only accepted chars are a-zA-Z0-9_-"
        )))
    }
}

fn keep(src_id: &str, prefix: &str) -> bool {
    prefix.is_empty() || src_id.starts_with(prefix)
}

/// Scan a source model and return `{source_id: tectonic_region_type}`
/// without building any source object.
///
/// NRML 0.5 files go through a regex lane: the text is split on the
/// `tectonicRegion` attributes of the source groups and every `...Source
/// id="..."` that follows belongs to the preceding region. Other files are
/// parsed as XML. Ids are cut at the first `:` and, when `prefix` is not
/// empty, only ids starting with it are kept.
pub fn get_trt_by_src(xml: &str, prefix: &str) -> Result<IndexMap<String, String>> {
    let mut trt_by_src = IndexMap::new();
    if xml.contains(NRML05) {
        let xml = xml.replace('\'', "\"");
        let caps: Vec<_> = TRT_REGEX.captures_iter(&xml).collect();
        for (i, cap) in caps.iter().enumerate() {
            let (whole, trt) = match (cap.get(0), cap.get(1)) {
                (Some(w), Some(t)) => (w, t.as_str()),
                _ => continue,
            };
            let end = caps
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map_or(xml.len(), |m| m.start());
            for id in ID_REGEX.captures_iter(&xml[whole.end()..end]) {
                let Some(src_id) = id.get(1) else { continue };
                let src_id = src_id.as_str().split(':').next().unwrap_or_default();
                if keep(src_id, prefix) {
                    trt_by_src.insert(src_id.to_string(), trt.to_string());
                }
            }
        }
    } else {
        let root = parse_xml(xml)?;
        let smodel = if root.tag == "sourceModel" {
            &root
        } else {
            root.nodes
                .first()
                .ok_or_else(|| LogicTreeError::invalid_file("missing sourceModel"))?
        };
        for src in &smodel.nodes {
            if src.tag == "sourceGroup" {
                let trt = src.attr("tectonicRegion")?;
                for s in &src.nodes {
                    if let Some(id) = s.get("id") {
                        let src_id = id.split(':').next().unwrap_or_default();
                        if keep(src_id, prefix) {
                            trt_by_src.insert(src_id.to_string(), trt.to_string());
                        }
                    }
                }
            } else {
                let src_id = src.attr("id")?.split(':').next().unwrap_or_default();
                if keep(src_id, prefix) {
                    trt_by_src.insert(src_id.to_string(), src.attr("tectonicRegion")?.to_string());
                }
            }
        }
    }
    debug!(sources = trt_by_src.len(), "Scanned source model");
    Ok(trt_by_src)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SM05: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.5" xmlns:gml="http://www.opengis.net/gml">
  <sourceModel name="sm">
    <sourceGroup tectonicRegion="Active Shallow Crust">
      <pointSource id="A:1" name="a"/>
      <areaSource id='B' name="b"/>
    </sourceGroup>
    <sourceGroup tectonicRegion="Stable Continental Crust">
      <simpleFaultSource id="C" name="c"/>
    </sourceGroup>
  </sourceModel>
</nrml>
"#;

    const SM04: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.4">
  <sourceModel name="sm">
    <pointSource id="P1" name="a" tectonicRegion="Active Shallow Crust"/>
    <pointSource id="P2" name="b" tectonicRegion="Subduction Interface"/>
  </sourceModel>
</nrml>
"#;

    #[test]
    fn test_parse_xml_lines() {
        let root = parse_xml(SM04).unwrap();
        assert_eq!(root.tag, "nrml");
        let sm = &root.nodes[0];
        assert_eq!(sm.tag, "sourceModel");
        assert_eq!(sm.lineno, Some(3));
        assert_eq!(sm.nodes[1].get("id"), Some("P2"));
        assert_eq!(sm.nodes[1].lineno, Some(5));
    }

    #[test]
    fn test_trt_by_src_fast_lane() {
        let dic = get_trt_by_src(SM05, "").unwrap();
        assert_eq!(dic.len(), 3);
        assert_eq!(dic["A"], "Active Shallow Crust");
        assert_eq!(dic["B"], "Active Shallow Crust");
        assert_eq!(dic["C"], "Stable Continental Crust");
    }

    #[test]
    fn test_trt_by_src_prefix() {
        let dic = get_trt_by_src(SM05, "C").unwrap();
        assert_eq!(dic.keys().collect::<Vec<_>>(), vec!["C"]);
    }

    #[test]
    fn test_trt_by_src_xml_fallback() {
        let dic = get_trt_by_src(SM04, "").unwrap();
        assert_eq!(dic["P1"], "Active Shallow Crust");
        assert_eq!(dic["P2"], "Subduction Interface");
    }

    #[test]
    fn test_validate_source_id() {
        assert!(validate_source_id("src_1.a-b").is_ok());
        assert!(validate_source_id("bad id").is_err());
        assert!(validate_source_id("àb").is_err());
        assert!(validate_source_id(&"x".repeat(61)).is_err());
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_file("a/sm.xml", SM04);
        assert!(loader.exists(Path::new("a/sm.xml")));
        assert!(loader.read_to_string(Path::new("b.xml")).is_err());
    }

    #[test]
    fn test_fs_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sm.xml");
        std::fs::write(&path, SM05).unwrap();
        assert!(FsLoader.exists(&path));
        let text = FsLoader.read_to_string(&path).unwrap();
        assert_eq!(get_trt_by_src(&text, "").unwrap().len(), 3);
        let err = FsLoader.read_to_string(&dir.path().join("missing.xml")).unwrap_err();
        assert!(matches!(err, LogicTreeError::InvalidFile(_)));
    }
}
