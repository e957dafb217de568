//! Default implementation of the [`Evaluator`] trait.
use super::Evaluator;
use crate::{
    record::{Record, RecordValue},
    Env, Policy,
};
use anyhow::Result;
use log::{debug, trace};

/// Runs a fixed number of episodes and reports the average return.
///
/// The returned [`Record`] has two entries, `"Episode return"` (the mean of
/// the undiscounted returns) and `"Episode length"` (the mean number of steps).
///
/// ```ignore
/// let mut evaluator = DefaultEvaluator::<MyEnv>::new(&config, 42, 10)?;
/// let record = evaluator.evaluate(&mut policy)?;
/// println!("Average return: {}", record.get_scalar("Episode return")?);
/// ```
pub struct DefaultEvaluator<E: Env> {
    /// The number of episodes to run during evaluation.
    n_episodes: usize,

    /// The environment instance used for evaluation.
    env: E,
}

impl<E: Env> Evaluator<E> for DefaultEvaluator<E> {
    /// Each episode starts with [`Env::reset_with_index`] and the episode index.
    /// An error from the environment aborts the evaluation.
    fn evaluate<P: Policy<E>>(&mut self, policy: &mut P) -> Result<Record> {
        debug!("Evaluation");
        let mut r_total = 0f32;
        let mut n_steps = 0usize;

        for ix in 0..self.n_episodes {
            trace!("Episode: {:?}", ix);
            let mut prev_obs = self.env.reset_with_index(ix)?;

            loop {
                let act = policy.sample(&prev_obs);
                let (step, _) = self.env.step(&act)?;
                r_total += step.reward[0];
                n_steps += 1;
                if step.is_done() {
                    break;
                }
                prev_obs = step.obs;
            }
        }

        let n = self.n_episodes.max(1) as f32;
        Ok(Record::from_slice(&[
            ("Episode return", RecordValue::Scalar(r_total / n)),
            ("Episode length", RecordValue::Scalar(n_steps as f32 / n)),
        ]))
    }
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a new [`DefaultEvaluator`].
    ///
    /// * `config` - Configuration for the environment
    /// * `seed` - Random seed for environment initialization
    /// * `n_episodes` - Number of episodes to run during evaluation
    pub fn new(config: &E::Config, seed: i64, n_episodes: usize) -> Result<Self> {
        Ok(Self {
            n_episodes,
            env: E::build(config, seed)?,
        })
    }

    /// Constructs a new [`DefaultEvaluator`] on an already built environment.
    pub fn from_env(env: E, n_episodes: usize) -> Self {
        Self { n_episodes, env }
    }

    /// Returns the environment, e.g., for inspection after evaluation.
    pub fn into_env(self) -> E {
        self.env
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Act, Info, Obs, Step};
    use test_log::test;

    #[derive(Clone, Debug)]
    struct CounterObs(usize);

    impl Obs for CounterObs {
        fn dummy() -> Self {
            Self(0)
        }
    }

    #[derive(Clone, Debug)]
    struct UnitAct;

    impl Act for UnitAct {
        fn len(&self) -> usize {
            1
        }
    }

    struct NoInfo;

    impl Info for NoInfo {}

    /// Gives reward 1 per step and ends episodes after `horizon` steps.
    struct CountingEnv {
        horizon: usize,
        count: usize,
    }

    impl Env for CountingEnv {
        type Config = usize;
        type Obs = CounterObs;
        type Act = UnitAct;
        type Info = NoInfo;

        fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
            Ok(Self {
                horizon: *config,
                count: 0,
            })
        }

        fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
            self.count += 1;
            let done = self.count >= self.horizon;
            let step = Step::new(CounterObs(self.count), a.clone(), 1.0, false, done, NoInfo);
            Ok((step, Record::empty()))
        }

        fn reset(&mut self) -> Result<Self::Obs> {
            self.count = 0;
            Ok(CounterObs(0))
        }
    }

    struct UnitPolicy;

    impl Policy<CountingEnv> for UnitPolicy {
        fn sample(&mut self, _obs: &CounterObs) -> UnitAct {
            UnitAct
        }
    }

    #[test]
    fn test_average_return() -> Result<()> {
        let mut evaluator = DefaultEvaluator::<CountingEnv>::new(&5, 0, 3)?;
        let record = evaluator.evaluate(&mut UnitPolicy)?;

        assert_eq!(record.get_scalar("Episode return")?, 5.0);
        assert_eq!(record.get_scalar("Episode length")?, 5.0);
        Ok(())
    }

    #[test]
    fn test_step_with_reset_fills_init_obs() -> Result<()> {
        let mut env = CountingEnv::build(&2, 0)?;
        env.reset()?;

        let (step, _) = env.step_with_reset(&UnitAct)?;
        assert!(!step.is_done());

        let (step, _) = env.step_with_reset(&UnitAct)?;
        assert!(step.is_done());
        assert_eq!(step.obs.0, 2);
        assert_eq!(step.init_obs.0, 0);
        assert_eq!(env.count, 0);
        Ok(())
    }
}
