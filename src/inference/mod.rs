//! Inference
//!
//! The deployable output of a training run: the fitted preprocessor and the
//! selected model, applied in that order to raw feature rows.

mod bundle;

pub use bundle::{InferenceBundle, MODEL_SECTION, MODEL_VERSION, PREDICTION_COLUMN};
