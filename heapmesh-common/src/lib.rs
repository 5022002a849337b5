#[macro_use]
extern crate log;

pub mod arena;
pub mod config;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod router;
