#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::ignored_unit_patterns
)]

pub mod backoff;
pub mod config;
pub mod daemon;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod poll;
pub mod sink;
pub mod state;
pub mod stream;
pub mod transport;
