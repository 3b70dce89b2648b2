//! Inference service for a pretrained tabular classifier: the model
//! artifact is loaded once at startup, then every invocation maps a JSON
//! table to per-class probabilities.

pub mod frame;
pub mod handler;
pub mod http;
pub mod inference;
