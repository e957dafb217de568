#![warn(missing_docs)]
//! Core abstractions of Border environments.
//!
//! Environment crates such as `border-carla-env` implement [`Env`] on top of
//! the types defined here. An environment emits a [`Step`] object at every
//! interaction step, together with a [`Record`](record::Record) carrying
//! diagnostic values. [`DefaultEvaluator`] runs a [`Policy`] on an
//! environment for a number of episodes.
pub mod error;
pub mod record;

mod base;
pub use base::{Act, Env, Info, Obs, Policy, Step};

mod evaluator;
pub use evaluator::{DefaultEvaluator, Evaluator};
