use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use serde::Serialize;
use tracing::debug;

use crate::models::{Catalog, Directory, Node, Table};

#[derive(Serialize)]
struct Snapshot<'a> {
    timestamp: String,
    catalog: &'a Catalog,
}

/// Write the whole catalog as a timestamped, pretty-printed JSON snapshot.
pub fn save_snapshot(catalog: &Catalog, filename: &Path) -> Result<()> {
    let snapshot = Snapshot {
        timestamp: chrono::Utc::now().to_rfc3339(),
        catalog,
    };
    let json = serde_json::to_string_pretty(&snapshot)?;
    let mut file = File::create(filename)
        .with_context(|| format!("creating '{}'", filename.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Write one markup fragment per node under `root`, mirroring the tree:
/// a sub-directory per Directory with `_directory.xml` inside, and one
/// `<name>.xml` per Table.
pub fn save_markup(catalog: &Catalog, root: &Path) -> Result<()> {
    for directory in &catalog.directories {
        write_directory(directory, root)?;
    }
    Ok(())
}

fn write_directory(directory: &Directory, parent: &Path) -> Result<()> {
    let dir_path = parent.join(encode(&directory.name));
    fs::create_dir_all(&dir_path)
        .with_context(|| format!("creating '{}'", dir_path.display()))?;
    fs::write(dir_path.join("_directory.xml"), directory_markup(directory)?)?;
    for child in &directory.children {
        match child {
            Node::Directory(sub) => write_directory(sub, &dir_path)?,
            Node::Table(table) => {
                let file_path = dir_path.join(format!("{}.xml", encode(&table.name)));
                fs::write(&file_path, table_markup(table)?)
                    .with_context(|| format!("writing '{}'", file_path.display()))?;
            }
        }
    }
    Ok(())
}

/// XML fragment for one table: name and url attributes plus the nested
/// parameter block. Parameters stay empty here; they are filled in later
/// from the downloaded CSV samples.
pub fn table_markup(table: &Table) -> Result<String> {
    node_markup("Table", &table.name, &table.url)
}

/// XML fragment for one directory, same shape as a table's.
pub fn directory_markup(directory: &Directory) -> Result<String> {
    node_markup("Directory", &directory.name, &directory.url)
}

fn node_markup(tag: &str, name: &str, url: &str) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut start = BytesStart::new(tag);
    start.push_attribute(("name", name));
    start.push_attribute(("url", url));
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Empty(BytesStart::new("Parameters")))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Delete stale content from the output root before re-population. Any
/// `README.md` survives, as does the root itself; sub-directories are
/// removed once emptied.
pub fn clear_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        fs::create_dir_all(root)
            .with_context(|| format!("creating '{}'", root.display()))?;
        return Ok(());
    }
    clear_dir(root)?;
    Ok(())
}

// Returns true when the directory still holds kept files.
fn clear_dir(dir: &Path) -> Result<bool> {
    let mut kept = false;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if clear_dir(&path)? {
                kept = true;
            } else {
                fs::remove_dir(&path)?;
            }
        } else if path.file_name().is_some_and(|name| name == "README.md") {
            kept = true;
        } else {
            debug!("removing stale '{}'", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(kept)
}

fn encode(name: &str) -> String {
    name.replace('/', "-")
}
