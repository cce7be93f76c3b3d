//! Scenario-based tests for matrixci

mod helpers;

mod fail_fast;
mod failure_handling;
mod secrets;
mod success_matrix;
mod timeouts;
