//! Data types shared by the decoder, pipeline, and batch layer.

pub mod config;
pub mod event;
pub mod message;
pub mod outcome;
