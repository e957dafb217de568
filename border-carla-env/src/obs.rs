//! Observation of [`CarlaEnv`](crate::CarlaEnv).
use crate::{
    simulator::{Location, VehicleControl, VehicleKinematics},
    CarlaEnvError,
};
use border_core::Obs;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Number of values in the observation besides the lidar histogram.
///
/// Control (3), acceleration, velocity, angular velocity, location, rotation,
/// forward vector and target location (3 each).
pub const N_STATE_FEATURES: usize = 24;

/// Widths of the observation components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsLayout {
    /// Width of [`CarlaObs::obs`].
    pub obs_dim: usize,

    /// Width of [`CarlaObs::task`], i.e., the number of routes.
    pub task_dim: usize,

    /// Width of [`CarlaObs::module_select`].
    pub module_select_dim: usize,
}

impl Default for ObsLayout {
    fn default() -> Self {
        Self {
            obs_dim: 105,
            task_dim: 12,
            module_select_dim: 36,
        }
    }
}

/// Observation of the driving task.
#[derive(Debug, Clone, PartialEq)]
pub struct CarlaObs {
    /// Lidar histogram followed by the state of the vehicle and the goal.
    pub obs: Array1<f32>,

    /// One-hot vector of the route.
    pub task: Array1<f32>,

    /// All ones. Kept for compatibility with modular policies, carries no information.
    pub module_select: Array1<f32>,
}

impl Obs for CarlaObs {
    fn dummy() -> Self {
        Self {
            obs: Array1::zeros(0),
            task: Array1::zeros(0),
            module_select: Array1::zeros(0),
        }
    }
}

/// Features of a tick, in the order they appear in [`CarlaObs::obs`].
#[derive(Debug, Clone)]
pub struct SensorFeatures<'a> {
    pub lidar: &'a [f32],
    pub control: &'a VehicleControl,
    pub kinematics: &'a VehicleKinematics,
    pub target_location: &'a Location,
}

impl<'a> SensorFeatures<'a> {
    /// Concatenates the features.
    pub fn flatten(&self) -> Vec<f32> {
        let k = self.kinematics;
        let c = self.control;
        let mut v = Vec::with_capacity(self.lidar.len() + N_STATE_FEATURES);
        v.extend_from_slice(self.lidar);
        v.extend_from_slice(&[c.throttle, c.steer, c.brake]);
        for part in [
            k.acceleration.to_array(),
            k.velocity.to_array(),
            k.angular_velocity.to_array(),
            k.location.to_array(),
            k.rotation.to_array(),
            k.forward_vector.to_array(),
            self.target_location.to_array(),
        ] {
            v.extend_from_slice(&part);
        }
        v
    }
}

/// Packs features into a [`CarlaObs`] of fixed shape.
#[derive(Debug, Clone)]
pub struct ObservationAssembler {
    layout: ObsLayout,
    n_bins: usize,
}

impl ObservationAssembler {
    /// Fails if the layout cannot hold `n_bins` histogram values plus the vehicle state.
    pub fn new(layout: &ObsLayout, n_bins: usize) -> Result<Self, CarlaEnvError> {
        if layout.obs_dim != n_bins + N_STATE_FEATURES {
            return Err(CarlaEnvError::InvalidConfig(format!(
                "obs_dim = {} does not match {} lidar bins + {} state features",
                layout.obs_dim, n_bins, N_STATE_FEATURES
            )));
        }
        Ok(Self {
            layout: layout.clone(),
            n_bins,
        })
    }

    pub fn layout(&self) -> &ObsLayout {
        &self.layout
    }

    /// Fails with [`CarlaEnvError::RouteOutOfRange`] unless `route` has a slot in the task vector.
    pub fn check_route(&self, route: usize) -> Result<(), CarlaEnvError> {
        if route >= self.layout.task_dim {
            return Err(CarlaEnvError::RouteOutOfRange {
                route,
                n_routes: self.layout.task_dim,
            });
        }
        Ok(())
    }

    pub fn assemble(
        &self,
        features: &SensorFeatures,
        route: usize,
    ) -> Result<CarlaObs, CarlaEnvError> {
        self.check_route(route)?;
        if features.lidar.len() != self.n_bins {
            return Err(CarlaEnvError::AssemblyWidthMismatch {
                component: "lidar",
                expected: self.n_bins,
                actual: features.lidar.len(),
            });
        }

        let obs = features.flatten();
        if obs.len() != self.layout.obs_dim {
            return Err(CarlaEnvError::AssemblyWidthMismatch {
                component: "obs",
                expected: self.layout.obs_dim,
                actual: obs.len(),
            });
        }

        let mut task = Array1::zeros(self.layout.task_dim);
        task[route] = 1.0;

        Ok(CarlaObs {
            obs: Array1::from(obs),
            task,
            module_select: Array1::ones(self.layout.module_select_dim),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::simulator::{Rotation, Vector3};

    fn kinematics() -> VehicleKinematics {
        VehicleKinematics {
            acceleration: Vector3::new(1.0, 2.0, 3.0),
            velocity: Vector3::new(4.0, 5.0, 6.0),
            angular_velocity: Vector3::new(7.0, 8.0, 9.0),
            location: Vector3::new(10.0, 11.0, 12.0),
            rotation: Rotation {
                pitch: 13.0,
                yaw: 14.0,
                roll: 15.0,
            },
            forward_vector: Vector3::new(16.0, 17.0, 18.0),
        }
    }

    #[test]
    fn test_feature_order() {
        let lidar = [50.0, 40.0];
        let control = VehicleControl {
            throttle: 0.5,
            steer: -0.1,
            brake: 0.0,
        };
        let target = Location::new(19.0, 20.0, 21.0);
        let kinematics = kinematics();
        let features = SensorFeatures {
            lidar: &lidar,
            control: &control,
            kinematics: &kinematics,
            target_location: &target,
        };

        let mut expected = vec![50.0, 40.0, 0.5, -0.1, 0.0];
        expected.extend((1..=21).map(|v| v as f32));
        assert_eq!(features.flatten(), expected);
    }

    #[test]
    fn test_default_layout_fits_81_bins() {
        let assembler = ObservationAssembler::new(&ObsLayout::default(), 81).unwrap();
        let lidar = vec![50.0; 81];
        let obs = assembler
            .assemble(
                &SensorFeatures {
                    lidar: &lidar,
                    control: &VehicleControl::STOP,
                    kinematics: &kinematics(),
                    target_location: &Location::default(),
                },
                11,
            )
            .unwrap();

        assert_eq!(obs.obs.len(), 105);
        assert_eq!(obs.task.len(), 12);
        assert_eq!(obs.task.sum(), 1.0);
        assert_eq!(obs.task[11], 1.0);
        assert_eq!(obs.module_select, Array1::<f32>::ones(36));
    }

    #[test]
    fn test_inconsistent_layout_is_rejected() {
        assert!(matches!(
            ObservationAssembler::new(&ObsLayout::default(), 36),
            Err(CarlaEnvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_route_out_of_range() {
        let assembler = ObservationAssembler::new(&ObsLayout::default(), 81).unwrap();
        assert_eq!(
            assembler.check_route(12),
            Err(CarlaEnvError::RouteOutOfRange {
                route: 12,
                n_routes: 12
            })
        );
    }

    #[test]
    fn test_lidar_width_mismatch() {
        let assembler = ObservationAssembler::new(&ObsLayout::default(), 81).unwrap();
        let lidar = vec![50.0; 80];
        let result = assembler.assemble(
            &SensorFeatures {
                lidar: &lidar,
                control: &VehicleControl::STOP,
                kinematics: &kinematics(),
                target_location: &Location::default(),
            },
            0,
        );

        assert_eq!(
            result,
            Err(CarlaEnvError::AssemblyWidthMismatch {
                component: "lidar",
                expected: 81,
                actual: 80
            })
        );
    }
}
