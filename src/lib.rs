//! Shared plumbing of the `daqboard-rs` command-line tools.

pub mod cli;
