//! Routing keys and topic-exchange binding patterns.
//!
//! Keys and patterns are dot-segmented words. In a pattern, `*` matches
//! exactly one word and `#` matches zero or more words.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest routing key or pattern a broker accepts, in bytes.
pub const MAX_ROUTING_KEY_LEN: usize = 255;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Word(String),
    /// `*`
    One,
    /// `#`
    Any,
}

/// A routing-key pattern attached to a queue binding (e.g., `orders.*`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BindingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl BindingPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let mut segments: Vec<Segment> = Vec::new();
        for word in words(&raw) {
            let segment = match word {
                "*" => Segment::One,
                "#" => Segment::Any,
                w => Segment::Word(w.to_string()),
            };
            // `#.#` selects exactly what `#` does.
            if segment == Segment::Any && segments.last() == Some(&Segment::Any) {
                continue;
            }
            segments.push(segment);
        }
        Self { raw, segments }
    }

    /// Pattern matching every routing key.
    pub fn all() -> Self {
        Self::new("#")
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a routing key is selected by this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        matches_words(&self.segments, &words(routing_key))
    }
}

fn words(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').collect()
    }
}

/// `reached[j]` is true when the segments seen so far match the first `j`
/// words of the key. One pass per segment, so O(pattern x key).
fn matches_words(pattern: &[Segment], key: &[&str]) -> bool {
    let mut reached = vec![false; key.len() + 1];
    reached[0] = true;

    for segment in pattern {
        let mut next = vec![false; key.len() + 1];
        match segment {
            Segment::Any => {
                let mut seen = false;
                for (j, slot) in next.iter_mut().enumerate() {
                    seen |= reached[j];
                    *slot = seen;
                }
            }
            Segment::One => {
                for j in 1..=key.len() {
                    next[j] = reached[j - 1];
                }
            }
            Segment::Word(word) => {
                for j in 1..=key.len() {
                    next[j] = reached[j - 1] && key[j - 1] == word.as_str();
                }
            }
        }
        if !next.iter().any(|&r| r) {
            return false;
        }
        reached = next;
    }

    reached[key.len()]
}

impl From<&str> for BindingPattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

impl From<String> for BindingPattern {
    fn from(pattern: String) -> Self {
        Self::new(pattern)
    }
}

impl From<BindingPattern> for String {
    fn from(pattern: BindingPattern) -> Self {
        pattern.raw
    }
}

impl fmt::Display for BindingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check that a routing key can be published.
pub fn validate_routing_key(routing_key: &str) -> Result<(), String> {
    if routing_key.len() > MAX_ROUTING_KEY_LEN {
        return Err(format!(
            "routing key is {} bytes, limit is {}",
            routing_key.len(),
            MAX_ROUTING_KEY_LEN
        ));
    }
    Ok(())
}
