//! Infrastructure layer

pub mod compose_runner;
pub mod docker;
pub mod git;
pub mod ports;
