use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};
use crate::models::{Catalog, Directory, Match, Node, Table};
use crate::parser::URL_PREFIX;

static ITEM_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+) items\)").unwrap());

/// Build the first-pass catalog tree from the key -> matches table.
///
/// Keys are consumed in lexicographic order, which is essential: sorted
/// "base/nonce" keys put a parent category immediately before its children
/// and keep siblings adjacent, so one linear pass with a current-directory
/// pointer reconstructs the hierarchy without any parent lookup:
///
/// ```text
/// audio-products/10                     <- directory (no item count)
/// audio-products/accessories/159       <- tables of that directory
/// audio-products/microphones/158
/// battery-products/6                    <- next directory
/// ...
/// ```
pub fn build(name: &str, hrefs_table: &BTreeMap<String, Vec<Match>>) -> Result<Catalog> {
    let mut catalog = Catalog::new(name);
    let mut current: Option<Directory> = None;

    for (key, matches) in hrefs_table {
        for m in matches {
            if !m.href.is_empty() && m.href != *key {
                return Err(CatalogError::KeyMismatch {
                    href: m.href.clone(),
                    key: key.clone(),
                });
            }
        }

        // One key carries several matches (summary line, sidebar, "See All"
        // links). The winning label is the first non-empty one not starting
        // with "See", visiting the matches sorted and in reverse; the item
        // count comes from the first parseable caption in that same scan,
        // whichever match supplies it. The reverse order works around a
        // scraping artifact in the source page; do not change it without
        // checking against a real captured page.
        let mut sorted: Vec<&Match> = matches.iter().collect();
        sorted.sort();

        let mut winner: Option<&Match> = None;
        let mut items: i64 = -1;
        for m in sorted.into_iter().rev() {
            if items < 0 {
                if let Some(count) = item_count(&m.caption) {
                    items = count;
                }
            }
            if winner.is_none() && !m.label.is_empty() && !m.label.starts_with("See") {
                winner = Some(m);
            }
        }

        let Some(winner) = winner else {
            // The implicit root is the only key expected to land here.
            debug!("key '{key}': no usable label, skipped");
            continue;
        };

        if items < 0 {
            debug!("directory '{}' ({key})", winner.label);
            if let Some(done) = current.take() {
                catalog.directories.push(done);
            }
            current = Some(Directory::new(&winner.label, winner.nonce, &winner.url));
        } else {
            debug!("table '{}' ({key}, {items} items)", winner.label);
            let table = Table::new(
                &winner.label,
                &winner.base,
                winner.nonce,
                &winner.href,
                &winner.url,
            );
            match current.as_mut() {
                Some(directory) => directory.push(Node::Table(table)),
                None => {
                    return Err(CatalogError::TableBeforeDirectory {
                        name: winner.label.clone(),
                    });
                }
            }
        }
    }

    if let Some(done) = current.take() {
        catalog.directories.push(done);
    }
    Ok(catalog)
}

fn item_count(caption: &str) -> Option<i64> {
    ITEM_COUNT_RE
        .captures(caption)
        .and_then(|captures| captures[1].parse().ok())
}

/// Cross-check that every key in the href table became exactly one node.
///
/// Purely diagnostic: the catalog is never mutated. When the counts
/// disagree, a working copy of the key set is reconciled against table and
/// directory URL suffixes so the log names exactly what got lost where.
pub fn verify(catalog: &Catalog, hrefs_table: &BTreeMap<String, Vec<Match>>) -> Result<()> {
    let directories = catalog.all_directories();
    let tables = catalog.all_tables();
    if directories.len() + tables.len() == hrefs_table.len() {
        return Ok(());
    }

    let mut leftover: BTreeSet<&str> = hrefs_table.keys().map(String::as_str).collect();
    let mut errors = 0usize;
    for table in &tables {
        let key = table.url.strip_prefix(URL_PREFIX).unwrap_or(&table.url);
        if !leftover.remove(key) {
            errors += 1;
            warn!("table key '{key}' not present in the href table");
        }
    }
    for directory in &directories {
        let key = directory
            .url
            .strip_prefix(URL_PREFIX)
            .unwrap_or(&directory.url);
        if !leftover.remove(key) {
            errors += 1;
            warn!("directory key '{key}' not present in the href table");
        }
    }
    for key in &leftover {
        warn!("href key '{key}' has no catalog node");
    }
    errors += leftover.len();

    if errors > 0 {
        Err(CatalogError::ReconciliationMismatch { errors })
    } else {
        Ok(())
    }
}

/// Regroup tables whose names share a " - " prefix into sub-directories.
///
/// A directory listing names like
///
/// ```text
/// Fiber Optic Connectors
/// Fiber Optic Connectors - Accessories
/// Fiber Optic Connectors - Contacts
/// Terminal Blocks - Barrier Blocks
/// ```
///
/// ends up with a "Fiber Optic Connectors" sub-directory holding the first
/// three, while the lone "Terminal Blocks" entry stays put. Grouping is one
/// level deep: the set of directories is gathered before the pass, and
/// synthetic sub-directories are never themselves regrouped.
pub fn reorganize(catalog: &mut Catalog) {
    for directory in &mut catalog.directories {
        reorganize_directory(directory);
    }
}

fn reorganize_directory(directory: &mut Directory) {
    let mut tables: Vec<Table> = directory.tables().cloned().collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));

    // Accumulate tables by the trimmed prefix before the first " - ".
    let mut groups: BTreeMap<String, Vec<Table>> = BTreeMap::new();
    for table in &tables {
        if let Some(index) = table.name.find(" - ") {
            let group_name = table.name[..index].trim().to_string();
            groups.entry(group_name).or_default().push(table.clone());
        }
    }

    // Table/directory name collision: a flat table whose full name equals a
    // group key exists both as its own listing and as the umbrella for more
    // specific sub-tables. It joins the group as its catch-all entry.
    for table in &tables {
        if let Some(members) = groups.get_mut(&table.name) {
            members.push(table.clone());
        }
    }

    // A single-member group is not worth promoting; its table stays where
    // it is.
    groups.retain(|_, members| members.len() >= 2);
    if groups.is_empty() {
        return;
    }

    let detached: BTreeSet<&str> = groups
        .values()
        .flatten()
        .map(|table| table.name.as_str())
        .collect();
    debug!(
        "directory '{}': {} tables regrouped into {} sub-directories",
        directory.name,
        detached.len(),
        groups.len(),
    );
    directory.children.retain(|child| match child {
        Node::Table(table) => !detached.contains(table.name.as_str()),
        Node::Directory(_) => true,
    });

    // Re-create each grouped table under its new sub-directory. The
    // sub-directory inherits the parent's nonce and url as placeholders;
    // the tables keep everything but their href, which is cleared.
    let parent_nonce = directory.nonce;
    let parent_url = directory.url.clone();
    for (group_name, mut members) in groups {
        members.sort_by(|a, b| a.name.cmp(&b.name));
        let mut sub = Directory::new(&group_name, parent_nonce, &parent_url);
        for table in members {
            sub.push(Node::Table(Table::new(
                &table.name,
                &table.base,
                table.nonce,
                "",
                &table.url,
            )));
        }
        directory.push(Node::Directory(sub));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(href: &str, base: &str, nonce: i64, label: &str, caption: &str) -> Match {
        Match::new(
            href,
            base,
            nonce,
            label,
            caption,
            &format!("{URL_PREFIX}{href}"),
        )
    }

    fn hrefs(entries: Vec<Match>) -> BTreeMap<String, Vec<Match>> {
        let mut table: BTreeMap<String, Vec<Match>> = BTreeMap::new();
        for entry in entries {
            table.entry(entry.href.clone()).or_default().push(entry);
        }
        table
    }

    fn dir_with_tables(names: &[&str]) -> Directory {
        let mut directory = Directory::new("Connector Products", 20, "u");
        for (i, name) in names.iter().enumerate() {
            directory.push(Node::Table(Table::new(
                name,
                &format!("base-{i}"),
                i as i64,
                &format!("href-{i}"),
                &format!("url-{i}"),
            )));
        }
        directory
    }

    #[test]
    fn directory_then_tables_in_sorted_key_order() {
        let table = hrefs(vec![
            m("audio-products/10", "audio-products", 10, "Audio Products", ""),
            m(
                "audio-products/accessories/159",
                "audio-products-accessories",
                159,
                "Accessories",
                "(295 items)",
            ),
        ]);

        let catalog = build("Digi-Key", &table).unwrap();
        assert_eq!(catalog.directories.len(), 1);
        let directory = &catalog.directories[0];
        assert_eq!(directory.name, "Audio Products");
        assert_eq!(directory.nonce, 10);
        let tables: Vec<_> = directory.tables().collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "Accessories");
        assert_eq!(tables[0].base, "audio-products-accessories");
    }

    #[test]
    fn counted_table_attaches_under_current_directory() {
        // The item count is descriptive metadata; the table still attaches
        // by position under whichever directory is current.
        let table = hrefs(vec![
            m("a/1", "a", 1, "Alpha", ""),
            m("a/2", "a", 2, "Alpha - Beta", "(5 items)"),
        ]);

        let catalog = build("Digi-Key", &table).unwrap();
        assert_eq!(catalog.directories.len(), 1);
        assert_eq!(catalog.directories[0].name, "Alpha");
        let tables: Vec<_> = catalog.directories[0].tables().collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "Alpha - Beta");
    }

    #[test]
    fn see_labels_lose_to_later_matches_in_the_reverse_scan() {
        let table = hrefs(vec![
            m("audio-products/10", "audio-products", 10, "Audio Products", ""),
            m("audio-products/10", "audio-products", 10, "See All", ""),
        ]);

        let catalog = build("Digi-Key", &table).unwrap();
        assert_eq!(catalog.directories[0].name, "Audio Products");
    }

    #[test]
    fn reverse_scan_prefers_the_lexicographically_larger_label() {
        // Sorted ascending, "613 New Products" precedes "Audio Products";
        // the reverse traversal therefore sees "Audio Products" first.
        let table = hrefs(vec![
            m("audio-products/10", "audio-products", 10, "613 New Products", ""),
            m("audio-products/10", "audio-products", 10, "Audio Products", ""),
        ]);

        let catalog = build("Digi-Key", &table).unwrap();
        assert_eq!(catalog.directories[0].name, "Audio Products");
    }

    #[test]
    fn item_count_is_independent_of_the_winning_label() {
        let table = hrefs(vec![
            m("d/1", "d", 1, "Parts", ""),
            m("d/1/sub/2", "d-1-sub", 2, "Apple", "(7 items)"),
            m("d/1/sub/2", "d-1-sub", 2, "Zebra", ""),
        ]);

        // "Zebra" wins the label scan, but the count still comes from the
        // "Apple" match's caption, so the key produces a table.
        let catalog = build("Digi-Key", &table).unwrap();
        let tables: Vec<_> = catalog.directories[0].tables().collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "Zebra");
    }

    #[test]
    fn table_before_any_directory_is_fatal() {
        let table = hrefs(vec![m("a/sub/2", "a-sub", 2, "Orphan", "(5 items)")]);
        let err = build("Digi-Key", &table).unwrap_err();
        assert!(matches!(err, CatalogError::TableBeforeDirectory { .. }));
    }

    #[test]
    fn match_href_disagreeing_with_its_key_is_fatal() {
        let mut table = hrefs(vec![m("a/1", "a", 1, "Alpha", "")]);
        table.get_mut("a/1").unwrap()[0].href = "b/2".to_string();
        let err = build("Digi-Key", &table).unwrap_err();
        assert!(matches!(err, CatalogError::KeyMismatch { .. }));
    }

    #[test]
    fn verify_accepts_a_complete_catalog() {
        let table = hrefs(vec![
            m("a/1", "a", 1, "Alpha", ""),
            m("a/x/2", "a-x", 2, "Beta", "(5 items)"),
        ]);
        let catalog = build("Digi-Key", &table).unwrap();
        assert!(verify(&catalog, &table).is_ok());
    }

    #[test]
    fn verify_reports_unmatched_keys_as_fatal() {
        let table = hrefs(vec![
            m("a/1", "a", 1, "Alpha", ""),
            m("a/x/2", "a-x", 2, "Beta", "(5 items)"),
        ]);
        let catalog = build("Digi-Key", &table).unwrap();

        let mut extra = table.clone();
        extra.insert("z/9".to_string(), vec![m("z/9", "z", 9, "See All", "")]);
        match verify(&catalog, &extra) {
            Err(CatalogError::ReconciliationMismatch { errors }) => assert_eq!(errors, 1),
            other => panic!("expected reconciliation mismatch, got {other:?}"),
        }
    }

    #[test]
    fn shared_prefix_pair_moves_into_a_sub_directory() {
        let mut directory = dir_with_tables(&[
            "Connectors - Accessories",
            "Connectors - Housings",
            "Adapters",
        ]);
        reorganize_directory(&mut directory);

        assert!(directory.tables().all(|t| !t.name.starts_with("Connectors")));
        let subs: Vec<_> = directory.directories().collect();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "Connectors");
        assert_eq!(subs[0].nonce, directory.nonce);
        assert_eq!(subs[0].url, directory.url);

        let names: Vec<_> = subs[0].tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Connectors - Accessories", "Connectors - Housings"]);
        assert!(subs[0].tables().all(|t| t.href.is_empty()));
    }

    #[test]
    fn singleton_group_is_left_untouched() {
        let mut directory = dir_with_tables(&["Connectors - Accessories", "Adapters"]);
        let before = directory.clone();
        reorganize_directory(&mut directory);
        assert_eq!(directory, before);
    }

    #[test]
    fn name_collision_table_joins_its_group() {
        let mut directory = dir_with_tables(&[
            "Fiber Optic Connectors",
            "Fiber Optic Connectors - Accessories",
            "Fiber Optic Connectors - Contacts",
        ]);
        reorganize_directory(&mut directory);

        assert_eq!(directory.tables().count(), 0);
        let subs: Vec<_> = directory.directories().collect();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "Fiber Optic Connectors");
        let names: Vec<_> = subs[0].tables().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Fiber Optic Connectors",
                "Fiber Optic Connectors - Accessories",
                "Fiber Optic Connectors - Contacts",
            ]
        );
    }

    #[test]
    fn directory_without_hyphenated_names_is_a_no_op() {
        let mut directory = dir_with_tables(&["Adapters", "Buzzers", "Speakers"]);
        let before = directory.clone();
        reorganize_directory(&mut directory);
        assert_eq!(directory, before);
    }

    #[test]
    fn reorganize_covers_every_top_level_directory() {
        let table = hrefs(vec![
            m("audio/1", "audio", 1, "Audio", ""),
            m("audio/a/10", "audio-a", 10, "Cables - Long", "(4 items)"),
            m("audio/b/11", "audio-b", 11, "Cables - Short", "(6 items)"),
            m("power/2", "power", 2, "Power", ""),
            m("power/a/20", "power-a", 20, "Supplies", "(9 items)"),
        ]);
        let mut catalog = build("Digi-Key", &table).unwrap();
        verify(&catalog, &table).unwrap();
        reorganize(&mut catalog);

        let audio = &catalog.directories[0];
        assert_eq!(audio.directories().count(), 1);
        assert_eq!(audio.tables().count(), 0);

        let power = &catalog.directories[1];
        assert_eq!(power.directories().count(), 0);
        assert_eq!(power.tables().count(), 1);
    }
}
