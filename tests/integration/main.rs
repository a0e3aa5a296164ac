//! Integration tests for the braid library and binary.
//!
//! These tests validate end-to-end workflows that span multiple modules:
//! multi-rank counting runs, full graph builds, and the command-line
//! surface of the shipped binary.

mod helpers;
mod test_build_command;
mod test_cluster_pipeline;
mod test_count_command;
mod test_random_consistency;
