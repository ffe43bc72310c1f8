//! Domain model and pure planning logic for the eternity cluster commands.
//!
//! Nothing in this crate talks to the controller or the filesystem; callers
//! fetch instance/host/save listings first and hand them in as plain slices.

pub mod benchmark;
pub mod hosts;
pub mod ids;
pub mod migration;
pub mod model;
pub mod saves;

pub use benchmark::*;
pub use hosts::*;
pub use ids::*;
pub use migration::*;
pub use model::*;
pub use saves::*;
