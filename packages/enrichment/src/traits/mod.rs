//! Core trait abstractions for the enrichment pipeline.
//!
//! These traits define the capabilities the record handler calls. Concrete
//! providers live in [`crate::providers`]; mocks in [`crate::testing`].

pub mod stages;
pub mod storage;
