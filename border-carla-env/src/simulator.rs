//! Interface to the driving simulator.
//!
//! The environment never talks to the simulator process directly. Everything it
//! needs is behind [`SimulatorClient`]: sending a control command, waiting for the
//! synchronized sensor data of a tick, and reading the vehicle state and the
//! event histories recorded by the collision and lane invasion sensors.
//!
//! [`ChannelSimulator`] is an implementation fed by a bridge thread over
//! [`crossbeam_channel`] channels.
mod channel;
use crate::{CarlaEnvError, LidarConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

pub use channel::{ChannelSimulator, ChannelSimulatorConfig, SimulatorCommand, WorldFrame};

/// A 3-dimensional vector in the simulator's world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn norm(&self) -> f32 {
        self.distance(&Self::default())
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// A point in the world frame, in meters.
pub type Location = Vector3;

/// Orientation in degrees, as reported by the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    pub fn to_array(&self) -> [f32; 3] {
        [self.pitch, self.yaw, self.roll]
    }

    /// Unit vector pointing to the front of an object with this orientation.
    pub fn forward_vector(&self) -> Vector3 {
        let (pitch, yaw) = (self.pitch.to_radians(), self.yaw.to_radians());
        Vector3::new(pitch.cos() * yaw.cos(), pitch.cos() * yaw.sin(), pitch.sin())
    }
}

/// Kinematic state of the ego vehicle at a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleKinematics {
    pub acceleration: Vector3,
    pub velocity: Vector3,
    pub angular_velocity: Vector3,
    pub location: Location,
    pub rotation: Rotation,
    pub forward_vector: Vector3,
}

/// Low-level command applied to the ego vehicle.
///
/// `throttle` and `brake` are in `[0, 1]`, `steer` in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleControl {
    pub throttle: f32,
    pub steer: f32,
    pub brake: f32,
}

impl VehicleControl {
    /// Full stop: no throttle, no steering, no brake.
    pub const STOP: Self = Self {
        throttle: 0.0,
        steer: 0.0,
        brake: 0.0,
    };

    /// `[throttle - brake, steer]`, the action that would produce this control.
    pub fn to_action(&self) -> [f32; 2] {
        [self.throttle - self.brake, self.steer]
    }
}

/// A collision of the ego vehicle with another actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    /// Simulator frame in which the collision happened.
    pub frame: u64,
    /// Type id of the other actor, e.g., `vehicle.tesla.model3`.
    pub other_actor: String,
    /// Norm of the normal impulse.
    pub intensity: f32,
}

/// Snapshot of the collisions recorded since the event sensors were created.
pub type CollisionHistory = Vec<CollisionEvent>;

/// Type of a lane marking crossed by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LaneMarkingType {
    Unmarked,
    Other,
    Broken,
    Solid,
    SolidSolid,
    SolidBroken,
    BrokenSolid,
    BrokenBroken,
    BottsDots,
    Grass,
    Curb,
}

impl LaneMarkingType {
    /// Crossing a solid marking is not allowed.
    pub fn is_solid(&self) -> bool {
        matches!(self, Self::Solid | Self::SolidSolid)
    }
}

/// Lane markings crossed since the event sensors were created, with the number of crossings.
pub type LaneInvasionSnapshot = BTreeMap<LaneMarkingType, usize>;

/// Sensor data delivered for a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorBuffer {
    /// Simulator frame number.
    pub frame: u64,
    /// Raw lidar measurement, little-endian `f32` quadruples `(x, y, z, intensity)`.
    pub lidar: Vec<u8>,
}

/// Handle of a sensor attached to the ego vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorHandle {
    pub id: u64,
}

/// Creates sensors from typed configurations.
pub trait SensorFactory {
    /// Attaches a ray-cast lidar to the ego vehicle.
    fn create_lidar(&mut self, config: &LidarConfig) -> Result<SensorHandle>;
}

/// Connection to a simulator running in synchronous mode.
///
/// One client drives one ego vehicle. The environment owns the client, so
/// concurrent environments never share simulator state.
pub trait SimulatorClient: SensorFactory {
    /// Configuration of the connection.
    type Config: Clone;

    /// Connects to the simulator.
    fn connect(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Sends the control command applied at the next tick.
    fn apply_control(&mut self, control: &VehicleControl) -> Result<()>;

    /// Advances the world by one tick and blocks until its sensor data arrives.
    ///
    /// Fails with [`CarlaEnvError::SimulatorTimeout`] if nothing arrives within `timeout`.
    fn await_tick(&mut self, timeout: Duration) -> Result<SensorBuffer, CarlaEnvError>;

    /// Kinematic state of the ego vehicle after the last tick.
    fn vehicle_kinematics(&self) -> Result<VehicleKinematics>;

    /// Goal location of the current route.
    fn target_location(&self) -> Result<Location>;

    /// Collisions since the last call of [`SimulatorClient::reset_event_sensors`].
    fn collision_history(&self) -> Result<CollisionHistory>;

    /// Lane markings crossed since the last call of [`SimulatorClient::reset_event_sensors`].
    ///
    /// `None` if no invasion sensor data has been received yet.
    fn lane_invasion_snapshot(&self) -> Result<Option<LaneInvasionSnapshot>>;

    /// Control command the autopilot would apply in the current state.
    ///
    /// Must not change the simulator state.
    fn expert_control(&self) -> Result<VehicleControl>;

    /// Destroys and re-creates the collision and lane invasion sensors, clearing their histories.
    fn reset_event_sensors(&mut self) -> Result<()>;
}
