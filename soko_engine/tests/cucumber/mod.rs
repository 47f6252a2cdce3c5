pub mod setups;
pub mod soko_world;
pub mod steps;

pub use soko_world::SokoWorld;
