use serde::{Serialize, Deserialize};

/// One anchor-tag occurrence observed on the listing page.
///
/// The derived `Ord` (field declaration order) is the natural ordering the
/// catalog builder sorts by before its reverse winner scan; changing the
/// field order changes which label wins for keys with conflicting repeated
/// anchors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    /// Relative key, empty only for the synthetic root.
    pub href: String,
    /// Hyphen-joined category path (slashes replaced with hyphens).
    pub base: String,
    /// Trailing numeric path segment, -1 when absent. Doubles as the opaque
    /// token sent back when requesting a sample CSV.
    pub nonce: i64,
    /// Human-readable name scraped from the anchor text.
    pub label: String,
    /// Text adjacent to the anchor, may embed an item count as "(N items)".
    pub caption: String,
    /// Fully qualified URL.
    pub url: String,
}

impl Match {
    pub fn new(href: &str, base: &str, nonce: i64, label: &str, caption: &str, url: &str) -> Self {
        Match {
            href: href.to_string(),
            base: base.to_string(),
            nonce,
            label: label.to_string(),
            caption: caption.to_string(),
            url: url.to_string(),
        }
    }
}

/// A leaf node: one downloadable category listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Category slug, used to derive the on-disk CSV cache file name.
    pub base: String,
    pub nonce: i64,
    pub href: String,
    pub url: String,
}

impl Table {
    pub fn new(name: &str, base: &str, nonce: i64, href: &str, url: &str) -> Self {
        Table {
            name: name.to_string(),
            base: base.to_string(),
            nonce,
            href: href.to_string(),
            url: url.to_string(),
        }
    }
}

/// A named grouping node owning its children. No two children share a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub name: String,
    pub nonce: i64,
    pub url: String,
    pub children: Vec<Node>,
}

impl Directory {
    pub fn new(name: &str, nonce: i64, url: &str) -> Self {
        Directory {
            name: name.to_string(),
            nonce,
            url: url.to_string(),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) {
        debug_assert!(
            self.children.iter().all(|child| child.name() != node.name()),
            "duplicate child name {:?} under directory {:?}",
            node.name(),
            self.name,
        );
        self.children.push(node);
    }

    /// Immediate child tables, in insertion order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.children.iter().filter_map(|child| match child {
            Node::Table(table) => Some(table),
            Node::Directory(_) => None,
        })
    }

    /// Immediate child directories, in insertion order.
    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.children.iter().filter_map(|child| match child {
            Node::Directory(directory) => Some(directory),
            Node::Table(_) => None,
        })
    }
}

/// Tree node: either a grouping directory or a leaf table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Directory(Directory),
    Table(Table),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(directory) => &directory.name,
            Node::Table(table) => &table.name,
        }
    }
}

/// Root container holding the top-level directories for one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub directories: Vec<Directory>,
}

impl Catalog {
    pub fn new(name: &str) -> Self {
        Catalog {
            name: name.to_string(),
            directories: Vec::new(),
        }
    }

    /// Every directory in the tree, top-down.
    pub fn all_directories(&self) -> Vec<&Directory> {
        let mut out = Vec::new();
        for directory in &self.directories {
            collect_directories(directory, &mut out);
        }
        out
    }

    /// Every table in the tree, top-down.
    pub fn all_tables(&self) -> Vec<&Table> {
        let mut out = Vec::new();
        for directory in &self.directories {
            collect_tables(directory, &mut out);
        }
        out
    }
}

fn collect_directories<'a>(directory: &'a Directory, out: &mut Vec<&'a Directory>) {
    out.push(directory);
    for child in &directory.children {
        match child {
            Node::Directory(sub) => collect_directories(sub, out),
            Node::Table(_) => {}
        }
    }
}

fn collect_tables<'a>(directory: &'a Directory, out: &mut Vec<&'a Table>) {
    for child in &directory.children {
        match child {
            Node::Directory(sub) => collect_tables(sub, out),
            Node::Table(table) => out.push(table),
        }
    }
}
