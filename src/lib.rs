
pub mod constants;
pub mod overflow;
pub mod extract;
pub mod clock_offset;
pub mod reconcile;
pub mod synthetic;
pub mod pipeline;
pub mod stats;
pub mod intake;
pub mod coordinator;
pub mod output;
pub mod config;
