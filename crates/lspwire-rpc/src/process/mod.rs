//! Language server child processes as session connections

pub mod connector;

pub use connector::{ChildProcess, ProcessConnector};
