//! Local relevance filter
//!
//! Decides whether a post is worth an external classification call: the text
//! must mention a topic keyword and the post must carry a chart or image.

use crate::types::Post;

#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    /// Lowercased topic keywords
    keywords: Vec<String>,
}

impl RelevanceFilter {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn mentions_keyword(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.keywords.iter().any(|k| text_lower.contains(k.as_str()))
    }

    pub fn is_relevant(&self, post: &Post) -> bool {
        self.mentions_keyword(&post.text) && !post.media_urls().is_empty()
    }
}
