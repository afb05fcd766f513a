//! Token counting for outlet settlement.
//!
//! Counts use the `cl100k_base` byte-pair encoding regardless of the model that served the
//! request, so the same conversation always costs the same number of tokens. Special-token
//! markers in user content are counted as ordinary text.

use tiktoken_rs::CoreBPE;

/// Shared, immutable BPE tokenizer. Build once at startup and keep in the application state.
pub struct Tokenizer {
    bpe: CoreBPE,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").field("encoding", &"cl100k_base").finish()
    }
}

/// Token counts derived from a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Tokenizer {
    pub fn cl100k() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    /// Split a conversation into input and output tokens.
    ///
    /// The last message is the model's reply (output); everything before it is the prompt
    /// (input). An empty conversation counts as zero of both.
    pub fn count_conversation<S: AsRef<str>>(&self, messages: &[S]) -> TokenUsage {
        let Some((last, history)) = messages.split_last() else {
            return TokenUsage::default();
        };

        TokenUsage {
            input_tokens: history.iter().map(|m| self.count_tokens(m.as_ref())).sum(),
            output_tokens: self.count_tokens(last.as_ref()),
        }
    }
}
