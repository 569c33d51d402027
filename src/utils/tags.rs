use std::sync::OnceLock;

use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\w+)").expect("tag pattern is a valid regex"))
}

/// `#word` tokens in `message`, without the `#`, in first-seen order.
pub fn extract_tags(message: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for capture in tag_pattern().captures_iter(message) {
        let name = &capture[1];
        if !tags.iter().any(|existing| existing == name) {
            tags.push(name.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_word_tokens() {
        assert_eq!(extract_tags("did work #focus"), vec!["focus"]);
        assert_eq!(
            extract_tags("#rust_lang and #Rust, then #focus."),
            vec!["rust_lang", "Rust", "focus"]
        );
    }

    #[test]
    fn ignores_bare_hashes_and_duplicates() {
        assert!(extract_tags("no tags # here").is_empty());
        assert_eq!(extract_tags("#a #a #b"), vec!["a", "b"]);
    }

    #[test]
    fn word_characters_include_unicode() {
        assert_eq!(extract_tags("#공부 #étude-notes"), vec!["공부", "étude"]);
    }
}
