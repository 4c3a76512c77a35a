//! Deployment collaborators: the HTTP model client and the test runner

pub mod model;
pub mod runner;

pub use model::HttpModelInvoker;
pub use runner::CommandTestRunner;
