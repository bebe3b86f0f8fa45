//! Allocation kernel (pure).
//!
//! This crate contains the business rules for inventory commitment
//! reallocation, implemented purely as deterministic domain logic (no IO, no
//! clocks, no storage). Given a snapshot of demand lines for one
//! (item, location) pair and the supply windows derived from open purchase
//! orders, it decides which lines give up committed quantity and which lines
//! gain it.

pub mod action;
pub mod demand;
pub mod redistribute;
pub mod window;

pub use action::{ActionKind, CommitmentAction};
pub use demand::{DemandLine, FillLevel};
pub use redistribute::{Donation, RedistributionOutcome, redistribute};
pub use window::SupplyWindow;
