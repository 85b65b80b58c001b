use thiserror::Error;

/// Fatal conditions raised while turning the listing page into a catalog.
///
/// Every variant means the source page no longer matches the structure this
/// crate assumes; none of them is recoverable.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("anchor href '{href}' has a non-numeric trailing segment")]
    MalformedHref { href: String },

    #[error("match href '{href}' disagrees with its key '{key}'")]
    KeyMismatch { href: String, key: String },

    #[error("table '{name}' appeared before any directory was created")]
    TableBeforeDirectory { name: String },

    #[error("{errors} entries could not be reconciled between the href table and the catalog")]
    ReconciliationMismatch { errors: usize },
}

pub type Result<T> = std::result::Result<T, CatalogError>;
