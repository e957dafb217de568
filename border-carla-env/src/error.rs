//! Errors in the CARLA environment.
use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`CarlaEnv`](crate::CarlaEnv) and its components.
///
/// Configuration errors are detected before any command reaches the simulator.
/// All other variants are fatal to the current episode: the environment has to
/// be reset before it can be stepped again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CarlaEnvError {
    /// The action could not be interpreted as `[accel, steer]`.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// The route identifier does not fit into the one-hot task vector.
    #[error("Route {route} is out of range, the task vector has {n_routes} entries")]
    RouteOutOfRange {
        /// Requested route.
        route: usize,
        /// Width of the task vector.
        n_routes: usize,
    },

    /// A configuration value is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The simulator did not deliver the tick within the deadline.
    #[error("Simulator did not deliver a tick within {timeout:?}")]
    SimulatorTimeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The connection to the simulator was lost.
    #[error("Simulator disconnected")]
    SimulatorDisconnected,

    /// The point cloud buffer does not consist of whole points.
    #[error("Malformed sensor data: {len} bytes is not a multiple of the point stride {stride}")]
    MalformedSensorData {
        /// Length of the buffer in bytes.
        len: usize,
        /// Size of a point in bytes.
        stride: usize,
    },

    /// A feature component has an unexpected width.
    #[error("Width mismatch in {component}: expected {expected}, got {actual}")]
    AssemblyWidthMismatch {
        /// Name of the component.
        component: &'static str,
        /// Declared width.
        expected: usize,
        /// Produced width.
        actual: usize,
    },

    /// The environment was stepped before the first reset.
    #[error("Environment has not been reset")]
    NotReset,

    /// The episode was aborted by a fatal error and has not been reset.
    #[error("Episode aborted by a previous error ({0}), reset the environment")]
    EpisodeFaulted(String),
}
