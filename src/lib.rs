#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod confirm;
pub mod error;
pub mod gate;
pub mod policy;
pub mod resilience;
pub mod risk;
pub mod snapshot;

pub use config::Config;
pub use error::{Result, WardenError};
pub use gate::{FileGate, GateDecision};
