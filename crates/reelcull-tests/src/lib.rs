//! Integration test crate for ReelCull.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives the review stack end to end: sessions over the engine
//! pool, the preview service, and colour handling along both paths.

#[cfg(test)]
mod session;

#[cfg(test)]
mod preview;

#[cfg(test)]
mod grading;
