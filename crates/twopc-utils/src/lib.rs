#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::as_conversions,
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::must_use_candidate,
    clippy::missing_inline_in_public_items
)]
#![warn(clippy::todo, clippy::dbg_macro)]

pub mod atomic_flag;
pub mod codec;
pub mod config;
pub mod lock;
pub mod tracing;
