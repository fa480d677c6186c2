//! Test fixtures: throwaway ledgers on temporary directories with a
//! low-difficulty block builder.

pub mod test_utils;

pub use test_utils::*;
