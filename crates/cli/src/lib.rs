//! Library surface for the `solcov` binary, split out so integration tests
//! can drive the `cover` task directly (with a fixture artifacts directory
//! and a `RecordedProvider`-style stub) instead of only round-tripping its
//! argument types.

pub mod artifacts;
pub mod cli;
pub mod cover;
