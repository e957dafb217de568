//! Action for [`CarlaEnv`](crate::CarlaEnv).
use crate::{simulator::VehicleControl, CarlaEnvError};
use border_core::Act;
use ndarray::ArrayD;
use std::convert::TryFrom;

/// Action of the driving task, `[accel, steer]` with both values in `[-1, 1]`.
///
/// A positive `accel` opens the throttle and a negative one brakes. The stop action
/// releases every pedal and centers the steering wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarlaAct {
    act: Option<[f32; 2]>,
}

impl CarlaAct {
    /// Constructs an action, rejecting non-finite values.
    pub fn new(accel: f32, steer: f32) -> Result<Self, CarlaEnvError> {
        if !accel.is_finite() || !steer.is_finite() {
            return Err(CarlaEnvError::InvalidAction(format!(
                "non-finite value in [{}, {}]",
                accel, steer
            )));
        }
        Ok(Self {
            act: Some([accel, steer]),
        })
    }

    /// The stop action.
    pub fn stop() -> Self {
        Self { act: None }
    }

    pub fn is_stop(&self) -> bool {
        self.act.is_none()
    }

    /// `[accel, steer]`, `None` for the stop action.
    pub fn values(&self) -> Option<[f32; 2]> {
        self.act
    }

    /// Maps the action to a vehicle control.
    ///
    /// Values are clamped into their ranges. Throttle and brake are never applied
    /// together.
    pub fn to_control(&self) -> VehicleControl {
        match self.act {
            None => VehicleControl::STOP,
            Some([accel, steer]) => VehicleControl {
                throttle: accel.clamp(0.0, 1.0),
                steer: steer.clamp(-1.0, 1.0),
                brake: (-accel).clamp(0.0, 1.0),
            },
        }
    }

    /// Returns `true` if [`CarlaAct::to_control`] clamps any value.
    pub fn is_clamped(&self) -> bool {
        match self.act {
            None => false,
            Some(a) => a.iter().any(|v| v.abs() > 1.0),
        }
    }
}

impl Act for CarlaAct {
    fn len(&self) -> usize {
        2
    }
}

impl TryFrom<&[f32]> for CarlaAct {
    type Error = CarlaEnvError;

    fn try_from(values: &[f32]) -> Result<Self, Self::Error> {
        match values {
            [accel, steer] => Self::new(*accel, *steer),
            _ => Err(CarlaEnvError::InvalidAction(format!(
                "expected 2 values, got {}",
                values.len()
            ))),
        }
    }
}

impl TryFrom<Vec<f32>> for CarlaAct {
    type Error = CarlaEnvError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::try_from(values.as_slice())
    }
}

impl TryFrom<ArrayD<f32>> for CarlaAct {
    type Error = CarlaEnvError;

    /// Accepts arrays of shape `[2]` or `[1, 2]`.
    fn try_from(a: ArrayD<f32>) -> Result<Self, Self::Error> {
        if a.shape() != [2] && a.shape() != [1, 2] {
            return Err(CarlaEnvError::InvalidAction(format!(
                "expected shape [2] or [1, 2], got {:?}",
                a.shape()
            )));
        }
        let values: Vec<f32> = a.iter().cloned().collect();
        Self::try_from(values)
    }
}

impl TryFrom<Option<[f32; 2]>> for CarlaAct {
    type Error = CarlaEnvError;

    /// `None` is the stop action.
    fn try_from(act: Option<[f32; 2]>) -> Result<Self, Self::Error> {
        match act {
            None => Ok(Self::stop()),
            Some([accel, steer]) => Self::new(accel, steer),
        }
    }
}
