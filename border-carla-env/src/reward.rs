//! Reward and termination.
//!
//! The base reward comes from a [`GoalReward`], shaped by the distance to the goal of
//! the route. [`EpisodeOutcomeEvaluator`] adds the two terminations of the driving task:
//! leaving the lane or colliding, and arriving close enough to the goal.
use crate::simulator::{CollisionEvent, LaneInvasionSnapshot, Location, VehicleKinematics};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, iter};

/// Configuration of the reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// The episode terminates when the vehicle is closer than this to the goal.
    pub dist_threshold: f32,

    /// Weight of the distance to the goal, which is penalized.
    pub distance_weight: f32,

    /// Weight of the speed of the vehicle.
    pub speed_weight: f32,

    /// The episode terminates when the vehicle is farther than this from the goal.
    pub max_goal_distance: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            dist_threshold: 15.0,
            distance_weight: 0.01,
            speed_weight: 0.1,
            max_goal_distance: 500.0,
        }
    }
}

/// Reward and terminations of a goal-reaching task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseOutcome {
    pub total_reward: f32,
    pub reward_components: BTreeMap<String, f32>,
    pub done_components: BTreeMap<String, bool>,
}

/// A reward for reaching a goal location.
pub trait GoalReward {
    fn evaluate(&self, kinematics: &VehicleKinematics, target: &Location) -> BaseOutcome;
}

impl<G: GoalReward + ?Sized> GoalReward for Box<G> {
    fn evaluate(&self, kinematics: &VehicleKinematics, target: &Location) -> BaseOutcome {
        (**self).evaluate(kinematics, target)
    }
}

/// Penalizes the distance to the goal and rewards speed.
///
/// Components are `goal_distance = -distance_weight * distance` and
/// `speed = speed_weight * |v|`; the episode ends with `out_of_range` when the
/// vehicle is farther than `max_goal_distance` from the goal.
#[derive(Debug, Clone)]
pub struct DistanceShapedReward {
    distance_weight: f32,
    speed_weight: f32,
    max_goal_distance: f32,
}

impl DistanceShapedReward {
    pub fn new(config: &RewardConfig) -> Self {
        Self {
            distance_weight: config.distance_weight,
            speed_weight: config.speed_weight,
            max_goal_distance: config.max_goal_distance,
        }
    }
}

impl GoalReward for DistanceShapedReward {
    fn evaluate(&self, kinematics: &VehicleKinematics, target: &Location) -> BaseOutcome {
        let distance = kinematics.location.distance(target);
        let reward_components = BTreeMap::from([
            ("goal_distance".to_string(), -self.distance_weight * distance),
            ("speed".to_string(), self.speed_weight * kinematics.velocity.norm()),
        ]);
        let done_components =
            BTreeMap::from([("out_of_range".to_string(), distance > self.max_goal_distance)]);

        BaseOutcome {
            total_reward: reward_components.values().sum(),
            reward_components,
            done_components,
        }
    }
}

/// Termination flags of a step.
///
/// The flags of the driving task are named fields. Flags of the base reward are kept
/// in a map; one sharing a name with a driving-task flag is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoneFlags {
    /// Collided with something or crossed a solid lane marking.
    pub lane_collision_done: bool,

    /// Reached the goal.
    pub dist_done: bool,

    /// Flags of the base reward.
    pub base: BTreeMap<String, bool>,
}

impl DoneFlags {
    pub const LANE_COLLISION_DONE: &'static str = "lane_collision_done";
    pub const DIST_DONE: &'static str = "dist_done";

    pub fn new(
        lane_collision_done: bool,
        dist_done: bool,
        mut base: BTreeMap<String, bool>,
    ) -> Self {
        for key in [Self::LANE_COLLISION_DONE, Self::DIST_DONE] {
            if let Some(v) = base.remove(key) {
                warn!("Base termination flag {} = {} is shadowed", key, v);
            }
        }

        Self {
            lane_collision_done,
            dist_done,
            base,
        }
    }

    /// Returns `true` if any flag is set.
    pub fn any(&self) -> bool {
        self.lane_collision_done || self.dist_done || self.base.values().any(|&v| v)
    }

    /// Iterates over all flags by name, driving-task flags first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        iter::once((Self::LANE_COLLISION_DONE, self.lane_collision_done))
            .chain(iter::once((Self::DIST_DONE, self.dist_done)))
            .chain(self.base.iter().map(|(k, &v)| (k.as_str(), v)))
    }
}

/// Reward and terminations of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardDecision {
    pub total_reward: f32,
    pub reward_components: BTreeMap<String, f32>,
    pub done: DoneFlags,
}

/// Computes the reward and the termination flags of a step.
pub struct EpisodeOutcomeEvaluator<G = DistanceShapedReward> {
    dist_threshold: f32,
    base: G,
}

impl EpisodeOutcomeEvaluator<DistanceShapedReward> {
    pub fn new(config: &RewardConfig) -> Self {
        Self::with_base(config.dist_threshold, DistanceShapedReward::new(config))
    }
}

impl<G: GoalReward> EpisodeOutcomeEvaluator<G> {
    pub fn with_base(dist_threshold: f32, base: G) -> Self {
        Self {
            dist_threshold,
            base,
        }
    }

    /// Evaluates the state of the vehicle after a tick.
    ///
    /// `lane_invasion` is `None` when the lane invasion sensor has not reported anything,
    /// which is the same as an empty snapshot.
    pub fn evaluate(
        &self,
        kinematics: &VehicleKinematics,
        target: &Location,
        collision_history: &[CollisionEvent],
        lane_invasion: Option<&LaneInvasionSnapshot>,
    ) -> RewardDecision {
        let crossed_solid = lane_invasion
            .map(|snapshot| snapshot.keys().any(|m| m.is_solid()))
            .unwrap_or(false);
        let lane_done = !collision_history.is_empty() || crossed_solid;
        let dist_done = kinematics.location.distance(target) < self.dist_threshold;

        let base = self.base.evaluate(kinematics, target);

        RewardDecision {
            total_reward: base.total_reward,
            reward_components: base.reward_components,
            done: DoneFlags::new(lane_done, dist_done, base.done_components),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::simulator::{LaneMarkingType, Vector3};

    fn at(x: f32) -> VehicleKinematics {
        VehicleKinematics {
            location: Vector3::new(x, 0.0, 0.0),
            ..Default::default()
        }
    }

    fn collision() -> CollisionEvent {
        CollisionEvent {
            frame: 3,
            other_actor: "vehicle.audi.a2".to_string(),
            intensity: 50.0,
        }
    }

    fn evaluator() -> EpisodeOutcomeEvaluator {
        EpisodeOutcomeEvaluator::new(&RewardConfig::default())
    }

    #[test]
    fn test_dist_done_is_strict() {
        let target = Location::new(0.0, 0.0, 0.0);
        let e = evaluator();

        assert!(e.evaluate(&at(14.99), &target, &[], None).done.dist_done);
        assert!(!e.evaluate(&at(15.0), &target, &[], None).done.dist_done);
        assert!(!e.evaluate(&at(40.0), &target, &[], None).done.dist_done);
    }

    #[test]
    fn test_lane_collision_done() {
        let target = Location::new(100.0, 0.0, 0.0);
        let e = evaluator();
        let lane_done = |collisions: &[CollisionEvent], markings: Option<&[LaneMarkingType]>| {
            let snapshot: Option<LaneInvasionSnapshot> =
                markings.map(|ms| ms.iter().map(|&m| (m, 1)).collect());
            e.evaluate(&at(0.0), &target, collisions, snapshot.as_ref())
                .done
                .lane_collision_done
        };

        assert!(!lane_done(&[], None));
        assert!(!lane_done(&[], Some(&[][..])));
        assert!(!lane_done(&[], Some(&[LaneMarkingType::Broken, LaneMarkingType::Curb][..])));
        assert!(lane_done(&[], Some(&[LaneMarkingType::Solid][..])));
        assert!(lane_done(&[], Some(&[LaneMarkingType::SolidSolid][..])));
        assert!(!lane_done(&[], Some(&[LaneMarkingType::SolidBroken][..])));
        assert!(lane_done(&[collision()], None));
        assert!(lane_done(&[collision()], Some(&[][..])));
    }

    #[test]
    fn test_missing_snapshot_equals_empty_snapshot() {
        let target = Location::new(100.0, 0.0, 0.0);
        let e = evaluator();
        let empty = LaneInvasionSnapshot::new();

        assert_eq!(
            e.evaluate(&at(3.0), &target, &[], None),
            e.evaluate(&at(3.0), &target, &[], Some(&empty))
        );
    }

    #[test]
    fn test_base_reward_passes_through() {
        let target = Location::new(100.0, 0.0, 0.0);
        let mut kinematics = at(0.0);
        kinematics.velocity = Vector3::new(3.0, 4.0, 0.0);
        let decision = evaluator().evaluate(&kinematics, &target, &[collision()], None);

        assert!((decision.reward_components["goal_distance"] + 1.0).abs() < 1e-6);
        assert!((decision.reward_components["speed"] - 0.5).abs() < 1e-6);
        assert!((decision.total_reward + 0.5).abs() < 1e-6);
        assert!(decision.done.any());
    }

    struct ConflictingBase;

    impl GoalReward for ConflictingBase {
        fn evaluate(&self, _: &VehicleKinematics, _: &Location) -> BaseOutcome {
            BaseOutcome {
                total_reward: 1.0,
                reward_components: BTreeMap::from([("progress".to_string(), 1.0)]),
                done_components: BTreeMap::from([
                    ("dist_done".to_string(), true),
                    ("timeout".to_string(), false),
                ]),
            }
        }
    }

    #[test]
    fn test_driving_flags_take_precedence() {
        let e = EpisodeOutcomeEvaluator::with_base(15.0, ConflictingBase);
        let decision = e.evaluate(&at(50.0), &Location::default(), &[], None);

        assert!(!decision.done.dist_done);
        assert!(!decision.done.any());
        let flags: Vec<_> = decision.done.iter().collect();
        assert_eq!(
            flags,
            vec![
                ("lane_collision_done", false),
                ("dist_done", false),
                ("timeout", false)
            ]
        );
    }
}
