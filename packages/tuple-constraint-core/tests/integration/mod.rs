//! Integration test suite.
//!
//! 1. Definition decoding and collocation
//! 2. Foreign key resolution and checks
//! 3. Recovery and catalog changes
//! 4. Configuration loading

pub mod decode_tests;
pub mod fkey_tests;
pub mod helpers;
pub mod recovery_tests;
