//! Core functionalities.
mod env;
mod policy;
mod step;
pub use env::Env;
pub use policy::Policy;
use std::fmt::Debug;
pub use step::{Info, Step};

/// Observation of an environment.
///
/// Vectorized environments are not supported, so an observation object always
/// holds a single observation.
pub trait Obs: Clone + Debug {
    /// Returns a dummy observation.
    ///
    /// It is placed in [`Step::init_obs`] when the episode does not end at that step
    /// and is never read in that case.
    fn dummy() -> Self;
}

/// Action of an environment.
pub trait Act: Clone + Debug {
    /// Returns the number of scalar components of the action.
    fn len(&self) -> usize;
}
