#[macro_use]
extern crate log;

pub mod client;
pub mod context;
pub mod lifecycle;
pub mod machine;
pub mod routes;
pub mod server;
