//! Batch driver for `fds2ascii`, the FDS slice-to-ASCII converter.
//!
//! fds2ascii only takes its input as answers to interactive prompts. This
//! crate builds those answers for every requested time point and variable
//! group and feeds them to the tool one session at a time. It then checks
//! that each time-averaged CSV actually appeared.

pub mod cli;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod storage;
mod text_summary;

#[cfg(test)]
mod test_support;
