pub mod checksum;
pub mod cli;
pub mod config;
pub mod dependencies;
pub mod fetch;
pub mod flock;
pub mod graph;
pub mod model;
pub mod scan;
pub mod scm;
pub mod vendor;
pub mod workspace;

mod api;

pub use api::{Pinpack, PinpackBuilder};
