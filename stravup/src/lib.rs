mod app;
pub mod cli;
pub mod logging;

pub use app::{build_request, describe, App};
