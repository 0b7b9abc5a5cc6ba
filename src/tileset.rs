//! Tileset hierarchy.
//!
//! The tileset document is a JSON tree; it is flattened into an arena of
//! [`TileNode`]s addressed by [`TileId`]. Nodes are stored in depth-first
//! pre-order, so the root is always the first node.

use crate::bounds::BoundingVolume;
use crate::error::FormatError;
use log::{debug, error};
use serde::Deserialize;
use std::fmt;

/// Index of a node in a [`Tileset`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId(pub usize);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node of the tileset hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct TileNode {
    /// Locator of the `pnts` payload; `None` for group nodes
    pub content: Option<String>,
    /// `None` when the document has no bounding volume. An explicit empty
    /// `"boundingVolume": {}` is also stored as `None`, so selection prunes
    /// the node and its subtree instead of placing it at the origin.
    pub bounding_volume: Option<BoundingVolume>,
    pub geometric_error: f64,
    pub children: Vec<TileId>,
    pub parent: Option<TileId>,
    /// 0 for the root
    pub depth: usize,
}

impl TileNode {
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Deserialize)]
struct TilesetDocument {
    #[serde(default)]
    asset: Option<AssetInfo>,
    #[serde(rename = "geometricError", default)]
    geometric_error: Option<f64>,
    #[serde(default)]
    root: Option<RawTile>,
}

#[derive(Deserialize)]
struct AssetInfo {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
struct RawTile {
    #[serde(rename = "boundingVolume", default)]
    bounding_volume: Option<BoundingVolume>,
    #[serde(rename = "geometricError", default)]
    geometric_error: f64,
    #[serde(default)]
    content: Option<RawContent>,
    #[serde(default)]
    children: Vec<RawTile>,
}

#[derive(Deserialize)]
struct RawContent {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Parsed tileset hierarchy.
#[derive(Clone, Debug, Default)]
pub struct Tileset {
    nodes: Vec<TileNode>,
    version: Option<String>,
    geometric_error: Option<f64>,
    base_path: String,
}

impl Tileset {
    /// Parses a tileset document.
    ///
    /// A document without `root` is accepted and yields an empty tileset.
    pub fn parse(json: &str) -> Result<Self, FormatError> {
        let doc: TilesetDocument = serde_json::from_str(json)?;
        let mut tileset = Tileset {
            nodes: Vec::new(),
            version: doc.asset.and_then(|a| a.version),
            geometric_error: doc.geometric_error,
            base_path: String::new(),
        };
        match doc.root {
            Some(root) => {
                tileset.push_node(root, None, 0);
                debug!("tileset loaded, {} tiles", tileset.nodes.len());
            }
            None => error!("no root tile found in tileset"),
        }
        Ok(tileset)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FormatError> {
        Self::parse(std::str::from_utf8(bytes)?)
    }

    /// Sets the prefix used by [`content_path`](Self::content_path).
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    fn push_node(&mut self, raw: RawTile, parent: Option<TileId>, depth: usize) -> TileId {
        let id = TileId(self.nodes.len());
        let content = raw.content.and_then(|c| c.uri.or(c.url));
        self.nodes.push(TileNode {
            content,
            bounding_volume: raw.bounding_volume.filter(|bv| !bv.is_empty()),
            geometric_error: raw.geometric_error,
            children: Vec::with_capacity(raw.children.len()),
            parent,
            depth,
        });
        for child in raw.children {
            let child_id = self.push_node(child, Some(id), depth + 1);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    pub fn root(&self) -> Option<TileId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(TileId(0))
        }
    }

    pub fn node(&self, id: TileId) -> Option<&TileNode> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: TileId) -> &[TileId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: TileId) -> Option<TileId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `asset.version` of the document
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Top-level `geometricError` of the document
    pub fn geometric_error(&self) -> Option<f64> {
        self.geometric_error
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Number of levels below and including the root.
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth + 1).max().unwrap_or(0)
    }

    /// All node ids, parent before children, children in declaration order.
    pub fn flatten(&self) -> Vec<TileId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<TileId> = self.root().into_iter().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &TileNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (TileId(i), n))
    }

    /// Content locator of `id` resolved against the base path.
    pub fn content_path(&self, id: TileId) -> Option<String> {
        let uri = self.node(id)?.content.as_deref()?;
        if self.base_path.is_empty() {
            Some(uri.to_string())
        } else {
            Some(format!("{}/{}", self.base_path.trim_end_matches('/'), uri))
        }
    }
}
