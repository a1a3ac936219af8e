use rig::embeddings::Embedding;

/// Helper functions for converting between Embedding and Vec<f32>
pub trait EmbeddingConversion {
    fn to_vec(&self) -> Vec<f32>;
    fn from_vec(document: &str, vec: Vec<f32>) -> Self;
}

impl EmbeddingConversion for Embedding {
    fn to_vec(&self) -> Vec<f32> {
        self.vec.iter().map(|f| *f as f32).collect()
    }

    fn from_vec(document: &str, vec: Vec<f32>) -> Self {
        Self {
            vec: vec.into_iter().map(|f| f as f64).collect(),
            document: document.to_string(),
        }
    }
}
