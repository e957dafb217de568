//! Simulator client fed over channels.
use super::{
    CollisionEvent, CollisionHistory, LaneInvasionSnapshot, LaneMarkingType, Location,
    SensorBuffer, SensorFactory, SensorHandle, SimulatorClient, VehicleControl,
    VehicleKinematics,
};
use crate::{CarlaEnvError, LidarConfig};
use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, trace};
use std::time::{Duration, Instant};

/// Commands sent from the environment to the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorCommand {
    /// Attach a lidar with the given configuration.
    SpawnLidar(SensorHandle, LidarConfig),
    /// Control applied at the next tick.
    ApplyControl(VehicleControl),
    /// Advance the world by one tick. The bridge answers with a [`WorldFrame`]
    /// carrying the same sequence number.
    Tick(u64),
    /// Re-create the collision and lane invasion sensors.
    ResetEventSensors,
}

/// Everything the bridge reports for a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldFrame {
    /// Sequence number of the [`SimulatorCommand::Tick`] this frame answers.
    pub tick: u64,
    pub frame: u64,
    /// Raw lidar measurement, see [`SensorBuffer::lidar`].
    pub lidar: Vec<u8>,
    pub kinematics: VehicleKinematics,
    /// Collisions that happened during this tick.
    pub collisions: Vec<CollisionEvent>,
    /// Lane markings crossed during this tick.
    pub lane_invasions: Vec<LaneMarkingType>,
    pub expert_control: VehicleControl,
}

/// Configuration of [`ChannelSimulator`].
#[derive(Debug, Clone)]
pub struct ChannelSimulatorConfig {
    /// World frames produced by the bridge, one per [`SimulatorCommand::Tick`].
    /// Frames answering an earlier tick than the one awaited are dropped.
    pub frames: Receiver<WorldFrame>,
    /// Commands consumed by the bridge.
    pub commands: Sender<SimulatorCommand>,
    /// Goal location of the route.
    pub target_location: Location,
}

/// A [`SimulatorClient`] whose world runs behind a bridge thread.
///
/// The bridge owns the actual connection to the simulator. It receives
/// [`SimulatorCommand`]s and answers every [`SimulatorCommand::Tick`] with a
/// [`WorldFrame`]. Collision and lane invasion events are accumulated here, the
/// same way the simulator-side event sensors do, until
/// [`SimulatorClient::reset_event_sensors`] is called.
///
/// A frame arriving after its tick timed out is discarded by the next
/// [`SimulatorClient::await_tick`], so it never shifts later observations.
pub struct ChannelSimulator {
    frames: Receiver<WorldFrame>,
    commands: Sender<SimulatorCommand>,
    target_location: Location,
    last_frame: Option<WorldFrame>,
    collision_history: CollisionHistory,
    lane_invasion: Option<LaneInvasionSnapshot>,
    n_sensors: u64,
    n_ticks: u64,
}

impl ChannelSimulator {
    fn send(&self, command: SimulatorCommand) -> Result<(), CarlaEnvError> {
        trace!("ChannelSimulator::send({:?})", command);
        self.commands
            .send(command)
            .map_err(|_| CarlaEnvError::SimulatorDisconnected)
    }

    fn last_frame(&self) -> Result<&WorldFrame> {
        self.last_frame
            .as_ref()
            .ok_or_else(|| anyhow!("No world frame has been received yet"))
    }

    fn record_events(&mut self, frame: &WorldFrame) {
        self.collision_history
            .extend(frame.collisions.iter().cloned());
        if !frame.lane_invasions.is_empty() {
            let snapshot = self.lane_invasion.get_or_insert_with(Default::default);
            for marking in frame.lane_invasions.iter() {
                *snapshot.entry(*marking).or_insert(0) += 1;
            }
        }
    }
}

impl SensorFactory for ChannelSimulator {
    fn create_lidar(&mut self, config: &LidarConfig) -> Result<SensorHandle> {
        let handle = SensorHandle { id: self.n_sensors };
        self.n_sensors += 1;
        self.send(SimulatorCommand::SpawnLidar(handle, config.clone()))?;
        Ok(handle)
    }
}

impl SimulatorClient for ChannelSimulator {
    type Config = ChannelSimulatorConfig;

    fn connect(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            frames: config.frames.clone(),
            commands: config.commands.clone(),
            target_location: config.target_location,
            last_frame: None,
            collision_history: vec![],
            lane_invasion: None,
            n_sensors: 0,
            n_ticks: 0,
        })
    }

    fn apply_control(&mut self, control: &VehicleControl) -> Result<()> {
        Ok(self.send(SimulatorCommand::ApplyControl(*control))?)
    }

    fn await_tick(&mut self, timeout: Duration) -> Result<SensorBuffer, CarlaEnvError> {
        self.n_ticks += 1;
        let tick = self.n_ticks;
        self.send(SimulatorCommand::Tick(tick))?;

        let deadline = Instant::now() + timeout;
        let frame = loop {
            match self.frames.recv_deadline(deadline) {
                Ok(frame) if frame.tick < tick => {
                    debug!(
                        "Dropped stale frame {} of tick {}, awaiting tick {}",
                        frame.frame, frame.tick, tick
                    );
                }
                Ok(frame) => break frame,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CarlaEnvError::SimulatorTimeout { timeout })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CarlaEnvError::SimulatorDisconnected)
                }
            }
        };
        debug!(
            "Received frame {} with {} bytes of lidar data",
            frame.frame,
            frame.lidar.len()
        );

        self.record_events(&frame);
        let buffer = SensorBuffer {
            frame: frame.frame,
            lidar: frame.lidar.clone(),
        };
        self.last_frame = Some(frame);
        Ok(buffer)
    }

    fn vehicle_kinematics(&self) -> Result<VehicleKinematics> {
        Ok(self.last_frame()?.kinematics)
    }

    fn target_location(&self) -> Result<Location> {
        Ok(self.target_location)
    }

    fn collision_history(&self) -> Result<CollisionHistory> {
        Ok(self.collision_history.clone())
    }

    fn lane_invasion_snapshot(&self) -> Result<Option<LaneInvasionSnapshot>> {
        Ok(self.lane_invasion.clone())
    }

    fn expert_control(&self) -> Result<VehicleControl> {
        Ok(self.last_frame()?.expert_control)
    }

    fn reset_event_sensors(&mut self) -> Result<()> {
        self.send(SimulatorCommand::ResetEventSensors)?;
        self.collision_history.clear();
        self.lane_invasion = None;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_channel::unbounded;

    fn client() -> (
        ChannelSimulator,
        Sender<WorldFrame>,
        Receiver<SimulatorCommand>,
    ) {
        let (frame_s, frame_r) = unbounded();
        let (cmd_s, cmd_r) = unbounded();
        let config = ChannelSimulatorConfig {
            frames: frame_r,
            commands: cmd_s,
            target_location: Location::new(100.0, 0.0, 0.0),
        };
        (ChannelSimulator::connect(&config, 0).unwrap(), frame_s, cmd_r)
    }

    #[test]
    fn test_timeout_when_bridge_is_silent() {
        let (mut sim, _frame_s, cmd_r) = client();
        let timeout = Duration::from_millis(10);

        assert_eq!(
            sim.await_tick(timeout),
            Err(CarlaEnvError::SimulatorTimeout { timeout })
        );
        assert_eq!(cmd_r.try_recv(), Ok(SimulatorCommand::Tick(1)));
    }

    #[test]
    fn test_disconnected_bridge() {
        let (mut sim, frame_s, _cmd_r) = client();
        drop(frame_s);

        assert_eq!(
            sim.await_tick(Duration::from_millis(10)),
            Err(CarlaEnvError::SimulatorDisconnected)
        );
    }

    #[test]
    fn test_events_accumulate_until_sensor_reset() -> Result<()> {
        let (mut sim, frame_s, _cmd_r) = client();
        assert_eq!(sim.lane_invasion_snapshot()?, None);

        frame_s.send(WorldFrame {
            tick: 1,
            frame: 1,
            lane_invasions: vec![LaneMarkingType::Broken, LaneMarkingType::Solid],
            ..Default::default()
        })?;
        frame_s.send(WorldFrame {
            tick: 2,
            frame: 2,
            collisions: vec![CollisionEvent {
                frame: 2,
                other_actor: "static.prop".to_string(),
                intensity: 120.0,
            }],
            lane_invasions: vec![LaneMarkingType::Solid],
            ..Default::default()
        })?;
        sim.await_tick(Duration::from_millis(100))?;
        sim.await_tick(Duration::from_millis(100))?;

        let snapshot = sim.lane_invasion_snapshot()?.unwrap();
        assert_eq!(snapshot[&LaneMarkingType::Solid], 2);
        assert_eq!(snapshot[&LaneMarkingType::Broken], 1);
        assert_eq!(sim.collision_history()?.len(), 1);

        sim.reset_event_sensors()?;
        assert!(sim.collision_history()?.is_empty());
        assert_eq!(sim.lane_invasion_snapshot()?, None);
        Ok(())
    }

    #[test]
    fn test_sensor_handles_are_unique() -> Result<()> {
        let (mut sim, _frame_s, cmd_r) = client();
        let config = LidarConfig::default();
        let h1 = sim.create_lidar(&config)?;
        let h2 = sim.create_lidar(&config)?;

        assert_ne!(h1, h2);
        assert_eq!(cmd_r.try_recv(), Ok(SimulatorCommand::SpawnLidar(h1, config)));
        Ok(())
    }

    #[test]
    fn test_late_frame_of_timed_out_tick_is_dropped() -> Result<()> {
        let (mut sim, frame_s, _cmd_r) = client();
        let timeout = Duration::from_millis(10);
        assert_eq!(
            sim.await_tick(timeout),
            Err(CarlaEnvError::SimulatorTimeout { timeout })
        );

        // Tick 1 is answered after its deadline, together with tick 2.
        for (tick, collided) in [(1, true), (2, false)] {
            let collisions = if collided {
                vec![CollisionEvent {
                    frame: tick,
                    other_actor: "static.prop".to_string(),
                    intensity: 10.0,
                }]
            } else {
                vec![]
            };
            frame_s.send(WorldFrame {
                tick,
                frame: 100 + tick,
                collisions,
                ..Default::default()
            })?;
        }

        let buffer = sim.await_tick(Duration::from_millis(100))?;
        assert_eq!(buffer.frame, 102);
        assert!(sim.collision_history()?.is_empty());
        assert!(frame_s.is_empty());
        Ok(())
    }
}
