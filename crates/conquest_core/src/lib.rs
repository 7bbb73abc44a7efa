//! # Conquest Core
//!
//! Deterministic simulation core for the territorial conquest game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (dice seeds travel inside actions)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Host-relay multiplayer (identical simulation across peers)
//! - Headless batch runs
//! - Scripted baseline opponents
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`stronghold`] - Garrisons, tiers, and unit production
//! - [`detachment`] - Marching and waiting unit groups
//! - [`combat`] - Dice-driven engagements
//! - [`coordinator`] - Slots, queues, and promotion at contested ground
//! - [`simulation`] - Core simulation loop
//! - [`map`] - Seeded match layout generation
//! - [`snapshot`] - Match-start state transfer
//! - [`policy`] - Scripted faction control
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod combat;
pub mod coordinator;
pub mod detachment;
pub mod error;
pub mod faction;
pub mod map;
pub mod math;
pub mod policy;
pub mod rng;
pub mod simulation;
pub mod snapshot;
pub mod stronghold;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::combat::{Engagement, Resolution, RoundOutcome};
    pub use crate::coordinator::{ArrivalOutcome, EngagementCoordinator, PromotionEvent};
    pub use crate::detachment::{Detachment, DetachmentId, DetachmentStore, Phase};
    pub use crate::error::{GameError, Result};
    pub use crate::faction::{FactionId, Owner};
    pub use crate::map::LayoutConfig;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::policy::{ConquestPolicy, PolicyGate, PolicyProfile};
    pub use crate::rng::SimRng;
    pub use crate::simulation::{ConquestSim, TickEvents, WorldView};
    pub use crate::snapshot::MatchSnapshot;
    pub use crate::stronghold::{Stronghold, Tier};
}
