#![warn(missing_docs)]
//! HelixBench Stats - Threshold Estimation
//!
//! This crate provides the statistical machinery for adaptive sweeps:
//! - Logistic (sigmoid) curve fitting over a swept parameter
//! - Threshold derivation at a target success probability
//! - Log-uniform sweep point generation

mod logistic;
mod spacing;

pub use logistic::{fit_sigmoid, sigmoid, FitFailure, FitState, DEFAULT_TARGET_P};
pub use spacing::log_spaced;
