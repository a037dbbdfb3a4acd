//! Core domain models for fragmint.
//!
//! This module contains the fundamental data structures used throughout the
//! retrieval pipeline: sources and fragments. These are pure domain models
//! with no I/O dependencies.

pub mod fragment;
pub mod source;

pub use fragment::{Boundary, CodeKind, Fragment, stitch_fragments, stitch_overlap};
pub use source::{Source, SourceType, stable_id};
