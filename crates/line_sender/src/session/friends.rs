//! Friend-count scraping from a UI hierarchy dump
//!
//! Best effort: patterns are tried in priority order and the first match
//! wins. Layout changes in the app can break all of them, in which case the
//! caller gets `None` rather than a guessed count.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FRIEND_COUNT_PATTERNS: [Regex; 3] = [
        // Thai UI: "เพื่อน 128" or "เพื่อน (128)"
        Regex::new(r"เพื่อน\s*\(?\s*(\d[\d,]*)\s*\)?").expect("valid regex"),
        // English UI: "Friends 128" or "Friends (128)"
        Regex::new(r"(?i)\bfriends\s*\(?\s*(\d[\d,]*)\s*\)?").expect("valid regex"),
        // Any row label ending in a number, e.g. text="Amigos 128"
        Regex::new(r#"text="[^"\d]*?\s\(?(\d[\d,]*)\)?""#).expect("valid regex"),
    ];
}

/// Extract the friend count from a UI dump.
pub fn parse_friend_count(dump: &str) -> Option<usize> {
    FRIEND_COUNT_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(dump)
            .and_then(|caps| caps[1].replace(',', "").parse().ok())
    })
}
