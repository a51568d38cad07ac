//! Cheap keyword extraction for lesson indexing.
//!
//! No embeddings or stemming: lowercase, strip a stopword list, keep unique
//! tokens longer than two characters. Good enough for the token-overlap
//! relevance signal this crate uses in place of a vector index.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
        "to", "of", "in", "on", "at", "for", "with", "by", "from", "as", "that", "this", "it",
        "its", "into", "not", "if", "then", "than", "so", "do", "does", "did", "has", "have",
        "had", "will", "would", "should", "could", "can", "may", "might", "must", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Extract a deduplicated, stopword-filtered keyword list from free text.
#[must_use]
pub fn extract(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let word = raw.to_lowercase();
        if word.len() <= 2 || STOPWORDS.contains(word.as_str()) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let kws = extract("the quick fox is at the door");
        assert!(!kws.contains(&"the".to_string()));
        assert!(!kws.contains(&"at".to_string()));
        assert!(kws.contains(&"quick".to_string()));
        assert!(kws.contains(&"door".to_string()));
    }

    #[test]
    fn deduplicates_repeated_words() {
        let kws = extract("index index bounds bounds");
        assert_eq!(kws.iter().filter(|w| *w == "index").count(), 1);
    }
}
