//! Keyword extraction for similar-task lookup.

use std::collections::HashSet;

/// Words too common to say anything about a task.
const STOPWORDS: &[&str] = &[
    "a", "about", "add", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but",
    "by", "can", "could", "did", "do", "does", "for", "from", "get", "had", "has", "have", "how",
    "in", "into", "is", "it", "its", "make", "may", "more", "must", "new", "not", "now", "of", "on",
    "or", "our", "out", "please", "should", "so", "some", "than", "that", "the", "their", "them",
    "then", "there", "these", "this", "those", "to", "too", "use", "using", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "why", "will", "with", "would", "you",
    "your",
];

/// Minimum token length kept as a keyword.
pub const MIN_KEYWORD_LEN: usize = 3;

/// Split free text into lowercase alphanumeric keywords.
///
/// Tokens shorter than [`MIN_KEYWORD_LEN`] and stopwords are dropped;
/// duplicates are removed keeping first occurrence order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
