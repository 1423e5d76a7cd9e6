use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, cl100k_base};

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Local token estimate with the `gpt-3.5-turbo` encoding.
///
/// Falls back to one token per four characters if the BPE tables cannot be
/// loaded.
pub fn estimate_tokens(text: &str) -> i64 {
    if text.is_empty() {
        return 0;
    }
    match CL100K.get_or_init(|| cl100k_base().ok()) {
        Some(bpe) => bpe.encode_ordinary(text).len() as i64,
        None => text.chars().count().div_ceil(4) as i64,
    }
}
