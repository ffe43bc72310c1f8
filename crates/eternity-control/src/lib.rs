//! Controller transport and the effectful side of the cluster commands:
//! staged downloads, migrations, save archiving, benchmarks and RCON.

pub mod archive;
pub mod benchmark;
pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod http;
pub mod instance;
pub mod memory;
pub mod migrate;
pub mod rcon;

pub use archive::*;
pub use benchmark::*;
pub use config::*;
pub use controller::*;
pub use download::*;
pub use error::*;
pub use http::*;
pub use instance::*;
pub use memory::*;
pub use migrate::*;
pub use rcon::*;
