mod fastembed_provider;

pub use fastembed_provider::FastEmbedder;

use crate::error::EmbeddingError;

/// Maximum input length accepted by `embed`, in characters
///
/// Longer inputs must be re-chunked by the caller; silently truncating
/// would embed something other than the stored passage text.
pub const MAX_INPUT_CHARS: usize = 8192;

/// Trait for embedding generation
///
/// All vectors produced by one provider instance share a fixed
/// dimensionality and model identity; the vector index rejects anything
/// else at insert time.
pub trait Embedder: Send + Sync {
    /// Generate embeddings for a batch of texts, in input order
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(vec![text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Unavailable("provider returned no vector".to_string()))
    }

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Stable identifier of the embedding model, stored in index tags
    fn model_id(&self) -> &str;
}

/// Reject inputs that exceed the model's length limit
pub(crate) fn check_input_length(text: &str) -> Result<(), EmbeddingError> {
    let length = text.chars().count();
    if length > MAX_INPUT_CHARS {
        return Err(EmbeddingError::InputTooLong { length });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_input_length() {
        assert!(check_input_length("short text").is_ok());

        let long = "x".repeat(MAX_INPUT_CHARS + 1);
        let err = check_input_length(&long).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::InputTooLong { length } if length == MAX_INPUT_CHARS + 1
        ));
    }
}
