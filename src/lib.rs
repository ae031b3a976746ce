pub mod audit;
pub mod config;
pub mod errors;
pub mod event;
pub mod logging;
pub mod orchestrator;
pub mod recovery;
pub mod review;
pub mod server;
pub mod session;
pub mod stream;
pub mod tracker;
pub mod triad_config;
pub mod worker;
