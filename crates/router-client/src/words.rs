//! Helpers for building query/attribute words and parsing reply words back
//! into a per-row attribute map.

use std::collections::HashMap;

pub fn attr_word(key: &str, value: &str) -> String {
    format!("={key}={value}")
}

pub fn query_word(key: &str, value: &str) -> String {
    format!("?{key}={value}")
}

/// A single reply sentence's attribute words (`=key=value`) flattened into
/// a map; non-attribute words (`!re`, `!done`, `!trap`, `.tag=...`) are
/// skipped by the caller before this is invoked.
pub fn attrs_from_words(words: &[String]) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for word in words {
        if let Some(rest) = word.strip_prefix('=') {
            if let Some((k, v)) = rest.split_once('=') {
                attrs.insert(k.to_string(), v.to_string());
            }
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attribute_words_only() {
        let words = vec![
            "!re".to_string(),
            "=name=alice".to_string(),
            "=address=10.0.0.5".to_string(),
        ];
        let attrs = attrs_from_words(&words);
        assert_eq!(attrs.get("name").map(String::as_str), Some("alice"));
        assert_eq!(attrs.get("address").map(String::as_str), Some("10.0.0.5"));
        assert_eq!(attrs.len(), 2);
    }
}
