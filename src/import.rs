//! Book rows for bulk CSV import.

use serde::Deserialize;

/// Raw book row as read from CSV.
///
/// Quantity is kept as text so a malformed number rejects only its row
/// instead of aborting the whole import.
#[derive(Debug, Deserialize)]
pub struct BookImportRecord {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub quantity: Option<String>,
}

impl BookImportRecord {
    /// Parses the raw CSV row into a typed one.
    ///
    /// Returns `None` if a field is empty or the quantity is not an integer.
    /// Range checks are left to `add_book`.
    pub fn parse(&self) -> Option<NewBook> {
        let isbn = self.isbn.trim();
        let title = self.title.trim();
        let author = self.author.trim();
        if isbn.is_empty() || title.is_empty() || author.is_empty() {
            return None;
        }

        let quantity = self.quantity.as_ref()?.trim().parse::<i64>().ok()?;
        Some(NewBook {
            isbn: isbn.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            quantity,
        })
    }
}

/// A parsed book row ready to be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub quantity: i64,
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub restocked: usize,
    pub skipped: usize,
}
