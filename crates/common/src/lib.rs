// redline-common: shared types and utilities for the Redline workspace

pub mod lines;
pub mod types;
