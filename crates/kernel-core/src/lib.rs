//! CPU-only simulation kernel. Everything in this crate is a deterministic
//! function of its inputs and the seeds threaded through [`rng::SeedRng`];
//! there is no I/O, no wall clock, and no ambient entropy.

pub mod clock;
pub mod combat;
pub mod dice;
pub mod events;
pub mod patch;
pub mod rng;
pub mod spatial;
pub mod worldgen;
