pub mod constants;
pub mod dialect;
pub mod error;
pub mod extract;
pub mod report;
pub mod stacktrace;
pub mod state;
