//! The driving environment.
use crate::{
    lidar::{self, AngularHistogram, PointCloud},
    reward::{DoneFlags, EpisodeOutcomeEvaluator, GoalReward, RewardDecision},
    simulator::{SensorBuffer, SensorHandle, SimulatorClient, VehicleControl},
    CarlaAct, CarlaEnvConfig, CarlaEnvError, CarlaObs, EnvSettings, ObservationAssembler,
    SensorFeatures,
};
use anyhow::Result;
use border_core::{
    record::{Record, RecordValue},
    Env, Info, Step,
};
use log::{debug, info, trace, warn};
use std::{collections::BTreeMap, time::Duration};

/// Reported for `traffic_lights_color`, traffic lights are not observed.
pub const TRAFFIC_LIGHTS_UNLABELED: &str = "UNLABELED";

/// Phase of the step pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    /// Waiting for the next action.
    Idle,
    /// The control was sent, waiting for the sensor data of the tick.
    AwaitingTick,
    /// Computing the observation and the reward.
    Scoring,
    /// The episode has ended. Only [`Env::reset`] starts a new one.
    Done,
}

/// Diagnostic information of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct CarlaInfo {
    pub reward_components: BTreeMap<String, f32>,
    pub done: DoneFlags,
    pub control_repeat: usize,
    pub weather: String,
    pub settings_map: String,
    pub settings_multiagent: bool,
    pub traffic_lights_color: String,
    pub reward: f32,
    /// Action of the autopilot, `[throttle - brake, steer]`.
    pub expert_action: [f32; 2],
}

impl Info for CarlaInfo {}

impl CarlaInfo {
    /// Flattens the information into a [`Record`].
    ///
    /// Reward components and termination flags get the prefixes `reward_` and `done_`.
    pub fn to_record(&self) -> Record {
        let mut record = Record::empty();
        for (k, v) in self.reward_components.iter() {
            record.insert(format!("reward_{}", k), RecordValue::Scalar(*v));
        }
        for (k, v) in self.done.iter() {
            record.insert(format!("done_{}", k), RecordValue::Bool(v));
        }
        record.insert(
            "control_repeat",
            RecordValue::Integer(self.control_repeat as i64),
        );
        record.insert("weather", RecordValue::String(self.weather.clone()));
        record.insert("settings_map", RecordValue::String(self.settings_map.clone()));
        record.insert(
            "settings_multiagent",
            RecordValue::Bool(self.settings_multiagent),
        );
        record.insert(
            "traffic_lights_color",
            RecordValue::String(self.traffic_lights_color.clone()),
        );
        record.insert("reward", RecordValue::Scalar(self.reward));
        record.insert(
            "expert_action",
            RecordValue::Array1(self.expert_action.to_vec()),
        );
        record
    }
}

/// A vehicle driving to the goal of a route in a simulated world.
///
/// Each step applies the action, advances the simulator in synchronous mode and
/// turns the lidar measurement and the vehicle state into a [`CarlaObs`].
/// The episode ends when the vehicle collides or crosses a solid lane marking,
/// reaches the goal, or after `max_episode_steps` steps.
///
/// Errors during a step are fatal to the episode. The environment stays in
/// [`EpisodeState::Done`] and refuses to step until it is reset.
pub struct CarlaEnv<S: SimulatorClient> {
    client: S,
    lidar_sensor: SensorHandle,
    histogram: AngularHistogram,
    evaluator: EpisodeOutcomeEvaluator<Box<dyn GoalReward>>,
    assembler: ObservationAssembler,
    route: usize,
    max_episode_steps: usize,
    tick_timeout: Duration,
    settings: EnvSettings,
    state: EpisodeState,
    count_steps: usize,
    started: bool,
    fault: Option<String>,

    // is_terminated and is_truncated of the step that ended the episode
    last_done: (bool, bool),
}

impl<S: SimulatorClient> CarlaEnv<S> {
    /// Constructs the environment on a connected client.
    ///
    /// The configuration is validated before the lidar is attached.
    pub fn new(config: &CarlaEnvConfig<S::Config>, mut client: S) -> Result<Self> {
        config.validate()?;
        let assembler = ObservationAssembler::new(&config.layout, config.lidar.n_bins)?;
        assembler.check_route(config.route)?;

        let lidar_sensor = client.create_lidar(&config.lidar)?;
        info!(
            "Attached lidar {:?}, {} bins, range {}",
            lidar_sensor, config.lidar.n_bins, config.lidar.range
        );

        let base: Box<dyn GoalReward> =
            Box::new(crate::DistanceShapedReward::new(&config.reward));

        Ok(Self {
            client,
            lidar_sensor,
            histogram: AngularHistogram::new(&config.lidar),
            evaluator: EpisodeOutcomeEvaluator::with_base(config.reward.dist_threshold, base),
            assembler,
            route: config.route,
            max_episode_steps: config.max_episode_steps,
            tick_timeout: config.tick_timeout,
            settings: config.settings.clone(),
            state: EpisodeState::Done,
            count_steps: 0,
            started: false,
            fault: None,
            last_done: (false, false),
        })
    }

    /// Replaces the base reward.
    pub fn with_goal_reward(
        mut self,
        dist_threshold: f32,
        base: impl GoalReward + 'static,
    ) -> Self {
        let base: Box<dyn GoalReward> = Box::new(base);
        self.evaluator = EpisodeOutcomeEvaluator::with_base(dist_threshold, base);
        self
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    /// Number of steps in the current episode.
    pub fn count_steps(&self) -> usize {
        self.count_steps
    }

    pub fn route(&self) -> usize {
        self.route
    }

    pub fn lidar_sensor(&self) -> SensorHandle {
        self.lidar_sensor
    }

    pub fn client(&self) -> &S {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut S {
        &mut self.client
    }

    /// Applies the control for `frame_skip` ticks and returns the sensor data of the last one.
    fn advance(&mut self, control: &VehicleControl) -> Result<SensorBuffer> {
        self.state = EpisodeState::AwaitingTick;
        let mut buffer = None;
        for _ in 0..self.settings.frame_skip {
            self.client.apply_control(control)?;
            buffer = Some(self.client.await_tick(self.tick_timeout)?);
        }
        self.state = EpisodeState::Scoring;
        buffer.ok_or_else(|| CarlaEnvError::InvalidConfig("frame_skip is zero".to_string()).into())
    }

    /// Computes the observation and the reward after a tick.
    fn observe(
        &self,
        control: &VehicleControl,
        buffer: &SensorBuffer,
    ) -> Result<(CarlaObs, RewardDecision)> {
        let cloud = PointCloud::from_bytes(&buffer.lidar)?;
        let ranges = self.histogram.compute(&lidar::project(&cloud));

        let kinematics = self.client.vehicle_kinematics()?;
        let target = self.client.target_location()?;
        let collisions = self.client.collision_history()?;
        let lane_invasion = self.client.lane_invasion_snapshot()?;
        let decision = self.evaluator.evaluate(
            &kinematics,
            &target,
            &collisions,
            lane_invasion.as_ref(),
        );

        let features = SensorFeatures {
            lidar: &ranges,
            control,
            kinematics: &kinematics,
            target_location: &target,
        };
        let obs = self.assembler.assemble(&features, self.route)?;
        debug!(
            "Frame {}: {} lidar points, reward {}, done {:?}",
            buffer.frame,
            cloud.len(),
            decision.total_reward,
            decision.done
        );

        Ok((obs, decision))
    }

    fn try_step(&mut self, act: &CarlaAct) -> Result<(Step<Self>, Record)> {
        let ended = self.state == EpisodeState::Done;
        if ended {
            debug!("Stepping an episode that has already ended");
        }

        // Read before the tick, the autopilot acts on the current state.
        let expert_action = self.client.expert_control()?.to_action();

        if act.is_clamped() {
            warn!("Action {:?} is out of range and clamped", act.values());
        }
        let control = act.to_control();
        let buffer = self.advance(&control)?;
        let (obs, decision) = self.observe(&control, &buffer)?;

        self.count_steps += 1;
        let horizon_done = self.count_steps >= self.max_episode_steps;
        if horizon_done && !ended {
            info!(
                "Episode success: reached the episode horizon ({})",
                self.max_episode_steps
            );
        }

        let mut is_terminated = decision.done.any();
        let mut is_truncated = horizon_done && !is_terminated;
        if ended {
            is_terminated |= self.last_done.0;
            is_truncated |= self.last_done.1;
        }
        let done = is_terminated || is_truncated;
        if done {
            self.last_done = (is_terminated, is_truncated);
        }
        self.state = if done {
            EpisodeState::Done
        } else {
            EpisodeState::Idle
        };

        let info = CarlaInfo {
            reward_components: decision.reward_components,
            done: decision.done,
            control_repeat: self.settings.frame_skip,
            weather: self.settings.weather.clone(),
            settings_map: self.settings.map.clone(),
            settings_multiagent: self.settings.multiagent,
            traffic_lights_color: TRAFFIC_LIGHTS_UNLABELED.to_string(),
            reward: decision.total_reward,
            expert_action,
        };
        let mut record = info.to_record();
        if done {
            record.insert(
                "episode_length",
                RecordValue::Integer(self.count_steps as i64),
            );
        }

        let step = Step::new(
            obs,
            *act,
            decision.total_reward,
            is_terminated,
            is_truncated,
            info,
        );
        Ok((step, record))
    }

    fn abort(&mut self, e: &anyhow::Error) {
        warn!("Episode aborted: {}", e);
        self.state = EpisodeState::Done;
        self.fault = Some(e.to_string());
    }
}

impl<S: SimulatorClient> Env for CarlaEnv<S> {
    type Config = CarlaEnvConfig<S::Config>;
    type Obs = CarlaObs;
    type Act = CarlaAct;
    type Info = CarlaInfo;

    /// Connects to the simulator and attaches the lidar.
    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        config.validate()?;
        let client = S::connect(&config.client, seed)?;
        Self::new(config, client)
    }

    /// Runs a step of the simulation.
    ///
    /// After the episode has ended, further steps still advance the simulator and keep
    /// reporting the episode as done.
    fn step(&mut self, act: &CarlaAct) -> Result<(Step<Self>, Record)> {
        trace!("CarlaEnv::step()");
        if !self.started {
            return Err(CarlaEnvError::NotReset.into());
        }
        if let Some(fault) = self.fault.as_ref() {
            return Err(CarlaEnvError::EpisodeFaulted(fault.clone()).into());
        }

        self.try_step(act).map_err(|e| {
            self.abort(&e);
            e
        })
    }

    /// Starts a new episode.
    ///
    /// The collision and lane invasion sensors are re-created and the world advances
    /// one tick with the vehicle stopped. This tick is not counted as a step.
    fn reset(&mut self) -> Result<CarlaObs> {
        trace!("CarlaEnv::reset()");
        self.started = true;
        self.count_steps = 0;
        self.fault = None;
        self.last_done = (false, false);

        let result = self.client.reset_event_sensors().and_then(|_| {
            let control = VehicleControl::STOP;
            let buffer = self.advance(&control)?;
            self.observe(&control, &buffer)
        });

        match result {
            Ok((obs, _)) => {
                self.state = EpisodeState::Idle;
                Ok(obs)
            }
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }
}
