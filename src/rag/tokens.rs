//! Token counting for prompt budgeting.

use crate::llm::Message;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::warn;

/// Counts tokens with `cl100k_base` (GPT-4/3.5 standard).
///
/// Falls back to a four-characters-per-token estimate if the encoder cannot
/// be loaded.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Option<Arc<CoreBPE>>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoder", &self.bpe.as_ref().map_or("estimate", |_| "cl100k_base"))
            .finish()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        let bpe = match cl100k_base() {
            Ok(bpe) => Some(Arc::new(bpe)),
            Err(e) => {
                warn!(error = %e, "cl100k_base unavailable, estimating token counts");
                None
            }
        };
        Self { bpe }
    }

    pub fn count(&self, content: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(content).len(),
            None => content.chars().count().div_ceil(4),
        }
    }

    /// Tokens for a chat request, including per-message framing overhead.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        // <|start|>{role}\n{content}<|end|>\n per message, plus reply priming
        messages.iter().map(|m| 3 + self.count(&m.content)).sum::<usize>() + 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_grow_with_text() {
        let counter = TokenCounter::new();
        let short = counter.count("Rosetta Stone");
        let long = counter.count("The Rosetta Stone is a granodiorite stele found in 1799.");
        assert!(short > 0);
        assert!(long > short);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_message_overhead() {
        let counter = TokenCounter::new();
        let messages = [Message::system(""), Message::user("")];
        assert_eq!(counter.count_messages(&messages), 9);
    }
}
