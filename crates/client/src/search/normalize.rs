//! Text normalization shared by catalog fields and queries.

use std::sync::LazyLock;

use regex::Regex;

static APOSTROPHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"['`´‘’ʻ]+").expect("valid apostrophe pattern"));

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[[:punct:]\s]+").expect("valid separator pattern"));

/// Transliterate to ASCII, drop apostrophes, collapse punctuation and
/// whitespace runs into single spaces, trim and lowercase.
pub fn normalize(value: &str) -> String {
    let ascii = deunicode::deunicode(value);
    let ascii = APOSTROPHES.replace_all(&ascii, "");
    let spaced = SEPARATORS.replace_all(&ascii, " ");
    spaced.trim().to_lowercase()
}
