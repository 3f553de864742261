pub mod candidates;
pub mod prompt;
pub mod providers;
pub mod recommendations;
pub mod validator;

pub use recommendations::{EngineSettings, Recommendation, RecommendationEngine};
