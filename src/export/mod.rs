//! Artifact persistence
//!
//! Binary artifacts (numeric arrays, the fitted preprocessor, the inference
//! bundle) are stored as a list of independently versioned [`Section`]s inside
//! one file. Every write goes through [`atomic_write`], so a reader never sees
//! a half-written artifact.

mod serializer;

pub use serializer::{
    atomic_write, load_array, load_object, load_sections, save_array, save_object, save_sections,
    Section, ARRAY_SECTION_VERSION,
};
