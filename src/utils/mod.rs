//! Utility functions and types

pub mod data_loader;

pub use data_loader::{frame_to_array, is_numeric_dtype, numeric_column, DataLoader, DataSaver};
