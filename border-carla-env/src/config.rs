//! Configuration of [`CarlaEnv`](crate::CarlaEnv).
use crate::{CarlaEnvError, LidarConfig, ObsLayout, RewardConfig, N_STATE_FEATURES};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

/// Simulator settings reported in the step information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSettings {
    /// Number of simulator ticks per environment step.
    pub frame_skip: usize,

    /// Weather preset.
    pub weather: String,

    /// Name of the map.
    pub map: String,

    /// Whether other agents drive in the world.
    pub multiagent: bool,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            frame_skip: 1,
            weather: "ClearNoon".to_string(),
            map: "Town04".to_string(),
            multiagent: false,
        }
    }
}

/// Configuration of [`CarlaEnv`](crate::CarlaEnv).
///
/// `C` is the configuration of the [`SimulatorClient`](crate::SimulatorClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarlaEnvConfig<C> {
    /// Route of the episode, the index of the one-hot task vector.
    pub route: usize,

    /// Episodes are truncated after this number of steps.
    pub max_episode_steps: usize,

    /// Deadline for the sensor data of a tick.
    pub tick_timeout: Duration,

    pub layout: ObsLayout,

    pub lidar: LidarConfig,

    pub reward: RewardConfig,

    pub settings: EnvSettings,

    pub client: C,
}

impl<C: Default> Default for CarlaEnvConfig<C> {
    fn default() -> Self {
        Self {
            route: 0,
            max_episode_steps: 1000,
            tick_timeout: Duration::from_secs(10),
            layout: ObsLayout::default(),
            lidar: LidarConfig::default(),
            reward: RewardConfig::default(),
            settings: EnvSettings::default(),
            client: C::default(),
        }
    }
}

impl<C> CarlaEnvConfig<C> {
    /// Default configuration with the given simulator client configuration.
    pub fn with_client(client: C) -> Self {
        Self {
            route: 0,
            max_episode_steps: 1000,
            tick_timeout: Duration::from_secs(10),
            layout: ObsLayout::default(),
            lidar: LidarConfig::default(),
            reward: RewardConfig::default(),
            settings: EnvSettings::default(),
            client,
        }
    }

    /// Sets the route.
    pub fn route(mut self, v: usize) -> Self {
        self.route = v;
        self
    }

    /// Sets the maximum number of steps of an episode.
    pub fn max_episode_steps(mut self, v: usize) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Sets the deadline for the sensor data of a tick.
    pub fn tick_timeout(mut self, v: Duration) -> Self {
        self.tick_timeout = v;
        self
    }

    /// Sets the lidar configuration.
    ///
    /// The observation width is adjusted to the number of bins.
    pub fn lidar(mut self, v: LidarConfig) -> Self {
        self.layout.obs_dim = v.n_bins + N_STATE_FEATURES;
        self.lidar = v;
        self
    }

    /// Sets the reward configuration.
    pub fn reward(mut self, v: RewardConfig) -> Self {
        self.reward = v;
        self
    }

    /// Sets the simulator settings.
    pub fn settings(mut self, v: EnvSettings) -> Self {
        self.settings = v;
        self
    }

    /// Checks the values that do not depend on the simulator.
    pub fn validate(&self) -> Result<(), CarlaEnvError> {
        if self.route >= self.layout.task_dim {
            return Err(CarlaEnvError::RouteOutOfRange {
                route: self.route,
                n_routes: self.layout.task_dim,
            });
        }
        if self.lidar.n_bins == 0 {
            return Err(CarlaEnvError::InvalidConfig(
                "the lidar histogram needs at least one bin".to_string(),
            ));
        }
        if !(self.lidar.range > 0.0) {
            return Err(CarlaEnvError::InvalidConfig(format!(
                "lidar range must be positive, got {}",
                self.lidar.range
            )));
        }
        if self.settings.frame_skip == 0 {
            return Err(CarlaEnvError::InvalidConfig(
                "frame_skip must be positive".to_string(),
            ));
        }
        if self.max_episode_steps == 0 {
            return Err(CarlaEnvError::InvalidConfig(
                "max_episode_steps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl<C: Serialize + DeserializeOwned> CarlaEnvConfig<C> {
    /// Constructs [`CarlaEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CarlaEnvConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::BinSelection;
    use tempdir::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct HostConfig {
        host: String,
        port: u16,
    }

    #[test]
    fn test_serde_env_config() -> Result<()> {
        let config = CarlaEnvConfig::with_client(HostConfig {
            host: "localhost".to_string(),
            port: 2000,
        })
        .route(3)
        .max_episode_steps(300)
        .lidar(LidarConfig::default().n_bins(36).selection(BinSelection::Nearest));

        let dir = TempDir::new("carla_env_config")?;
        let path = dir.path().join("carla_env_config.yaml");
        config.save(&path)?;
        let config_ = CarlaEnvConfig::<HostConfig>::load(&path)?;

        assert_eq!(config, config_);
        assert_eq!(config_.layout.obs_dim, 60);
        Ok(())
    }

    #[test]
    fn test_validate() {
        let config = CarlaEnvConfig::<HostConfig>::default();
        assert_eq!(config.validate(), Ok(()));

        assert_eq!(
            config.clone().route(12).validate(),
            Err(CarlaEnvError::RouteOutOfRange {
                route: 12,
                n_routes: 12
            })
        );
        assert!(config.clone().max_episode_steps(0).validate().is_err());
        assert!(config.lidar(LidarConfig::default().range(0.0)).validate().is_err());
    }
}
