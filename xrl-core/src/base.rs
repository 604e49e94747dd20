//! Core interfaces.
mod agent;
mod env;
mod feature;
mod policy;
mod replay_buffer;
mod step;
pub use agent::{Agent, EpisodeEnd};
pub use env::Env;
pub use feature::{FeatureExtractor, IdentityExtractor};
pub use policy::Policy;
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
pub use step::Step;
