//! CLI integration tests.
//!
//! Sandboxes are bootstrapped with a fake POSIX-shell interpreter, so these
//! only run on unix.

#![cfg(unix)]

mod common;

mod build_tests;
mod lock_tests;
mod targets_tests;
