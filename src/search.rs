//! Plain-text search over decrypted entries.

use chrono::NaiveDate;

use crate::journal::DiaryEntry;

/// Long date form matched by searches, e.g. "Monday, January 15, 2024".
pub fn long_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Case-insensitive match on the entry's content or its long date.
pub fn matches(entry: &DiaryEntry, query: &str) -> bool {
    let query = query.to_lowercase();
    if query.is_empty() {
        return false;
    }
    entry.content.to_lowercase().contains(&query)
        || long_date(entry.date).to_lowercase().contains(&query)
}

/// Keeps matching entries in their original order. An empty query keeps
/// nothing.
pub fn filter_entries(entries: Vec<DiaryEntry>, query: &str) -> Vec<DiaryEntry> {
    entries.into_iter().filter(|e| matches(e, query)).collect()
}
