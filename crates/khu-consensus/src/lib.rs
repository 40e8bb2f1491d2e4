//! # khu-consensus
//! The KHU block pipeline, DOMC commit-reveal governance, and quorum
//! state-commitment finality.

pub mod commitment;
pub mod domc;
pub mod engine;

pub use engine::{KhuEngine, Params};
