//! Artifact container and atomic file output.

mod dataset;
mod write;

pub use dataset::{AttrValue, Dataset, Values, Variable};
