//! Arena simulation modules

pub mod acceleration;
pub mod combat;
pub mod geometry;
pub mod registry;
pub mod snapshot;
pub mod sweeper;

pub use acceleration::Geometry;
pub use combat::CombatResolver;
pub use registry::{PlayerState, StateRegistry};
pub use sweeper::CleanupSweeper;
