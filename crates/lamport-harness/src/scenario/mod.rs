//! Scenario tests with a mandatory oracle.
//!
//! A scenario names a mesh, a protocol and a scheduler seed. It only
//! becomes runnable once an oracle is attached, so every scenario verifies
//! something about the run it produced.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use world::World;

/// Verification run against the final [`World`] of a scenario.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
