#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::as_conversions,
    clippy::float_arithmetic,
    clippy::must_use_candidate
)]
#![warn(clippy::todo, clippy::dbg_macro)]
//! Two-phase commit: a coordinator drives a cohort through a voting phase and a
//! completion phase so that a transaction commits everywhere or nowhere.

pub mod types {
    mod host;
    pub use self::host::*;

    mod id;
    pub use self::id::*;

    mod outcome;
    pub use self::outcome::*;

    mod phase;
    pub use self::phase::*;
}

pub mod agent;
pub mod cohort;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod lock;
pub mod resource;
pub mod transaction;
pub mod transport;
