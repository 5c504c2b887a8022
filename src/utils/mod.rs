//! Shared utilities for roamctl

pub mod sleep;

pub use sleep::*;
