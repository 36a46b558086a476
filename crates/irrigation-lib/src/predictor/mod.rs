//! Feature construction and single-sample serving

mod features;
mod inference;
mod output;

pub use features::{FeatureBuilder, HUMIDITY_HIGH_ABOVE, HUMIDITY_LOW_BELOW, PH_IDEAL_MAX, PH_IDEAL_MIN};
pub use inference::{InferenceStats, PredictionSession};
pub use output::{OutputConfig, OutputFormatter, DEFAULT_LOW_CONFIDENCE_THRESHOLD};
