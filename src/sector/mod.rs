//! Peer/sector index construction.
//!
//! Peers are ranked by training-window return correlation with the target;
//! the sector index is their equal-weighted return over the full timeline.

pub mod builder;

pub use builder::{Peer, SectorIndex, SectorIndexBuilder};
