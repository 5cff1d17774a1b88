pub mod classifier;
pub mod indicators;
