//! Library catalog seam.
//!
//! The catalog is an external service: it knows patrons by card UID and
//! books by the tag key written on each copy. [`BookOperations`] consumes
//! it through [`CatalogService`].
//!
//! Tag keys are compared with [`keys_match`]. Besides an exact match it
//! accepts either key being a suffix of the other, because copies were
//! tagged over the years with readers that reported different lengths of
//! the same identifier. The suffix rule can also pair a short stored key
//! with an unrelated longer tag.
//!
//! [`BookOperations`]: crate::operations::BookOperations

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Result type alias for catalog calls.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Copy status meaning "on the shelf".
pub const STATUS_IN_STOCK: &str = "0";

/// One physical copy of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    /// Tag key stored for the copy.
    pub tag: String,

    /// Circulation status; empty or `"0"` means in stock.
    pub status: String,
}

impl CopyRecord {
    pub fn new(tag: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            status: status.into(),
        }
    }

    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        let status = self.status.trim();
        status.is_empty() || status == STATUS_IN_STOCK
    }
}

/// A bibliographic record and its copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Catalog record number.
    pub id: u32,

    /// Short human-readable description.
    pub brief: String,

    pub copies: Vec<CopyRecord>,
}

impl BookRecord {
    /// The copy whose stored tag matches `key`.
    #[must_use]
    pub fn copy_for(&self, key: &str) -> Option<&CopyRecord> {
        self.copies.iter().find(|copy| keys_match(&copy.tag, key))
    }
}

/// The library catalog.
///
/// Methods return `Send` futures so calls can run on spawned tasks.
/// Implementations may simply write `async fn`.
pub trait CatalogService: Send + Sync + 'static {
    /// Whether `uid` belongs to a registered patron.
    fn validate_card(&self, uid: &str) -> impl Future<Output = CatalogResult<bool>> + Send;

    /// Look up the record carrying tag `key`.
    fn find_book_by_tag(
        &self,
        key: &str,
    ) -> impl Future<Output = CatalogResult<Option<BookRecord>>> + Send;

    /// Issue the copy tagged `key` to the current patron. Returns the
    /// record description.
    fn issue(&self, key: &str) -> impl Future<Output = CatalogResult<String>> + Send;

    /// Take the copy tagged `key` back. Returns the record description.
    fn return_book(&self, key: &str) -> impl Future<Output = CatalogResult<String>> + Send;
}

/// Reduce a tag key to the form stored in the catalog.
///
/// Trims, strips spaces, `-` and `:`, drops a `0x` prefix and uppercases.
/// Returns `None` if nothing is left.
///
/// ```
/// use libterm_gate::catalog::normalize_catalog_key;
///
/// assert_eq!(normalize_catalog_key(" 0x04-ab:12 ").as_deref(), Some("04AB12"));
/// assert_eq!(normalize_catalog_key("  "), None);
/// ```
#[must_use]
pub fn normalize_catalog_key(raw: &str) -> Option<String> {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | ':'))
        .collect();
    let body = match stripped.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("0x") => &stripped[2..],
        _ => stripped.as_str(),
    };
    (!body.is_empty()).then(|| body.to_ascii_uppercase())
}

/// Whether a stored tag key and a scanned key name the same copy.
///
/// Exact match after normalization, or either key ends with the other.
#[must_use]
pub fn keys_match(stored: &str, scanned: &str) -> bool {
    let (Some(stored), Some(scanned)) = (normalize_catalog_key(stored), normalize_catalog_key(scanned))
    else {
        return false;
    };
    stored == scanned || stored.ends_with(&scanned) || scanned.ends_with(&stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("04AB12CD", Some("04AB12CD"))]
    #[case("0x04ab12cd", Some("04AB12CD"))]
    #[case("0X04AB", Some("04AB"))]
    #[case(" 04 AB-12:CD ", Some("04AB12CD"))]
    #[case("0x", None)]
    #[case("", None)]
    fn test_normalize_catalog_key(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_catalog_key(raw).as_deref(), expected);
    }

    #[rstest]
    #[case("E2801160600002085A4C1C33", "e2801160600002085a4c1c33", true)]
    #[case("5A4C1C33", "E2801160600002085A4C1C33", true)]
    #[case("E2801160600002085A4C1C33", "5A4C1C33", true)]
    #[case("05-1234", "051234", true)]
    #[case("5A4C1C34", "E2801160600002085A4C1C33", false)]
    #[case("", "E2801160600002085A4C1C33", false)]
    fn test_keys_match(#[case] stored: &str, #[case] scanned: &str, #[case] expected: bool) {
        assert_eq!(keys_match(stored, scanned), expected);
    }

    #[rstest]
    #[case("", true)]
    #[case("0", true)]
    #[case(" 0 ", true)]
    #[case("1", false)]
    #[case("5", false)]
    fn test_copy_in_stock(#[case] status: &str, #[case] expected: bool) {
        assert_eq!(CopyRecord::new("AA", status).is_in_stock(), expected);
    }

    #[test]
    fn test_copy_for_picks_matching_copy() {
        let record = BookRecord {
            id: 42,
            brief: "Dostoevsky. Idiot".into(),
            copies: vec![
                CopyRecord::new("E2801160600002085A4C1C01", "1"),
                CopyRecord::new("5A4C1C33", "0"),
            ],
        };

        let copy = record.copy_for("E2801160600002085A4C1C33").unwrap();
        assert_eq!(copy.tag, "5A4C1C33");
        assert!(record.copy_for("FFFFFFFF").is_none());
    }
}
