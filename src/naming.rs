//! Deterministic constraint naming
//!
//! Index and foreign key identifiers are derived from the raw table name and
//! the ordered column list, never stored. Re-deriving after a rename yields a
//! name that embeds the new table identifier.
//!
//! ```text
//! {table}_{col1}_{col2}_idx        plain index
//! {table}_{col1}_{col2}_unq_idx    unique index
//! {table}_{col1}_{col2}_fk         foreign key, and the index it backs
//! ```

use sha2::{Digest, Sha256};

/// PostgreSQL's NAMEDATALEN - 1
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 63;

const MIN_IDENTIFIER_LENGTH: usize = 24;
const DIGEST_LENGTH: usize = 8;

const UNIQUE_MARKER: &str = "_unq";
const INDEX_SUFFIX: &str = "_idx";
const FOREIGN_KEY_SUFFIX: &str = "_fk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingScheme {
    max_length: usize,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDENTIFIER_LENGTH)
    }
}

impl NamingScheme {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(MIN_IDENTIFIER_LENGTH),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn index_name<S: AsRef<str>>(&self, table: &str, columns: &[S], unique: bool, fk_backed: bool) -> String {
        let mut suffix = String::new();
        if unique {
            suffix.push_str(UNIQUE_MARKER);
        }
        suffix.push_str(if fk_backed { FOREIGN_KEY_SUFFIX } else { INDEX_SUFFIX });

        self.trim(Self::body(table, columns), &suffix)
    }

    pub fn foreign_key_name<S: AsRef<str>>(&self, table: &str, columns: &[S]) -> String {
        self.trim(Self::body(table, columns), FOREIGN_KEY_SUFFIX)
    }

    /// Index created as a side effect of adding a foreign key
    pub fn is_fk_backed(index_name: &str) -> bool {
        index_name.ends_with(FOREIGN_KEY_SUFFIX)
    }

    fn body<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
        let mut body = table.to_string();
        for column in columns {
            body.push('_');
            body.push_str(column.as_ref());
        }
        body
    }

    /// Over-long names keep their kind suffix and swap the tail of the body
    /// for a digest of the full name. Lengths are in bytes, as PostgreSQL
    /// counts them.
    fn trim(&self, body: String, suffix: &str) -> String {
        if body.len() + suffix.len() <= self.max_length {
            return body + suffix;
        }

        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hasher.update(suffix.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let keep = self.max_length - suffix.len() - DIGEST_LENGTH - 1;
        let cut = body
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|end| *end <= keep)
            .last()
            .unwrap_or(0);

        format!("{}_{}{}", body[..cut].trim_end_matches('_'), &digest[..DIGEST_LENGTH], suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_names() {
        let naming = NamingScheme::default();

        assert_eq!(naming.index_name("categories", &["slug"], false, false), "categories_slug_idx");
        assert_eq!(
            naming.index_name("categories", &["groupId", "slug"], true, false),
            "categories_groupId_slug_unq_idx"
        );
        assert_eq!(naming.index_name("entries", &["categoryId"], false, true), "entries_categoryId_fk");
    }

    #[test]
    fn test_fk_backed_index_shares_foreign_key_name() {
        let naming = NamingScheme::default();
        assert_eq!(
            naming.index_name("entries", &["categoryId"], false, true),
            naming.foreign_key_name("entries", &["categoryId"])
        );
    }

    #[test]
    fn test_names_embed_current_table() {
        let naming = NamingScheme::default();
        let before = naming.foreign_key_name("categories", &["parentId"]);
        let after = naming.foreign_key_name("sections", &["parentId"]);

        assert_ne!(before, after);
        assert_eq!(before, naming.foreign_key_name("categories", &["parentId"]));
    }

    #[test]
    fn test_name_classification() {
        assert!(NamingScheme::is_fk_backed("entries_categoryId_fk"));
        assert!(!NamingScheme::is_fk_backed("entries_categoryId_idx"));
    }

    #[test]
    fn test_long_names_are_trimmed_with_digest() {
        let naming = NamingScheme::default();
        let columns = ["someExtremelyLongColumnName", "anotherExtremelyLongColumnName"];

        let unique = naming.index_name("matrixcontent_articlebody", &columns, true, false);
        let plain = naming.index_name("matrixcontent_articlebody", &columns, false, false);
        let other = naming.index_name("matrixcontent_articlebody", &["someExtremelyLongColumnName", "x"], true, false);

        assert!(unique.len() <= DEFAULT_MAX_IDENTIFIER_LENGTH);
        assert!(unique.ends_with("_unq_idx"));
        assert!(plain.ends_with("_idx") && !plain.ends_with("_unq_idx"));
        assert_ne!(unique, other);
        assert_eq!(unique, naming.index_name("matrixcontent_articlebody", &columns, true, false));

        let fk = naming.foreign_key_name("matrixcontent_articlebody", &columns);
        assert!(fk.len() <= DEFAULT_MAX_IDENTIFIER_LENGTH);
        assert!(NamingScheme::is_fk_backed(&fk));
    }

    #[test]
    fn test_multibyte_names_are_trimmed_by_bytes() {
        let naming = NamingScheme::default();
        let table = "ü".repeat(30);

        // 35 characters but 66 bytes
        let fk = naming.foreign_key_name(&table, &["ö"]);
        assert!(fk.len() <= DEFAULT_MAX_IDENTIFIER_LENGTH);
        assert!(fk.starts_with(&"ü".repeat(25)));
        assert!(NamingScheme::is_fk_backed(&fk));

        let index = naming.index_name(&table, &["ö"], true, false);
        assert!(index.len() <= DEFAULT_MAX_IDENTIFIER_LENGTH);
        assert!(index.ends_with("_unq_idx"));
        assert_ne!(fk, naming.foreign_key_name(&table, &["ä"]));
    }

    #[test]
    fn test_max_length_has_a_floor() {
        assert_eq!(NamingScheme::new(3).max_length(), MIN_IDENTIFIER_LENGTH);
    }
}
