//! Feature extraction.
use anyhow::Result;

/// Maps a raw observation to a fixed-size feature vector.
///
/// Image tensors are passed as their row-major flattening. The length of the
/// returned vector must be the same for every observation of an environment.
pub trait FeatureExtractor<O> {
    /// Extracts features from `obs`.
    fn extract(&mut self, obs: &O) -> Result<Vec<f32>>;
}

/// Passes through observations that already are feature vectors.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityExtractor;

impl FeatureExtractor<Vec<f32>> for IdentityExtractor {
    fn extract(&mut self, obs: &Vec<f32>) -> Result<Vec<f32>> {
        Ok(obs.clone())
    }
}
