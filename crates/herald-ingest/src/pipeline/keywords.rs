//! Keyword filter.
//!
//! Matching is a case-insensitive substring test. Content with no
//! alphanumeric character is never matchable, so empty or punctuation-only
//! events can't produce a false positive.

/// Result of running the keyword filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordMatch {
    /// No keyword filter configured.
    Unfiltered,
    /// At least one keyword matched. Keywords are listed in configuration order.
    Matched(Vec<String>),
    /// Filter configured but nothing matched.
    NoMatch,
}

impl KeywordMatch {
    /// True unless the filter rejected the content.
    pub fn passes(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }

    /// Matched keywords, empty when unfiltered.
    pub fn into_keywords(self) -> Vec<String> {
        match self {
            Self::Matched(keywords) => keywords,
            Self::Unfiltered | Self::NoMatch => Vec::new(),
        }
    }
}

/// True if `content` has something a keyword could match.
pub fn is_matchable(content: &str) -> bool {
    content.chars().any(char::is_alphanumeric)
}

/// Run `keywords` against `content`. Blank keywords are ignored.
pub fn match_keywords(keywords: &[&str], content: &str) -> KeywordMatch {
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return KeywordMatch::Unfiltered;
    }
    if !is_matchable(content) {
        return KeywordMatch::NoMatch;
    }

    let haystack = content.to_lowercase();
    let matched: Vec<String> = keywords
        .into_iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .map(str::to_string)
        .collect();

    if matched.is_empty() {
        KeywordMatch::NoMatch
    } else {
        KeywordMatch::Matched(matched)
    }
}
