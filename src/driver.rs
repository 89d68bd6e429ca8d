//! Driver behaviour: correlated parameter sampling and the speeding process.

use crate::config::{ConfigError, DriversConfig, ParamDistribution, SpeedingConfig};
use crate::math::sigmoid;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

/// Number of copula-correlated parameters.
const N_PARAMS: usize = 9;

/// Names of the correlated parameters, in sampling order.
const PARAM_NAMES: [&str; N_PARAMS] = [
    "reaction_time",
    "headway",
    "comfort_brake",
    "max_brake",
    "jerk_limit",
    "throttle_lag",
    "brake_lag",
    "aggression",
    "rule_adherence",
];

const IDX_AGGRESSION: usize = 7;
const IDX_RULE_ADHERENCE: usize = 8;

/// Hard cap on the sampled overspeed magnitude in km/h.
const MAX_OVERSPEED_KMH: f64 = 25.0;

/// A per-driver behavioural parameter set, sampled once at spawn.
#[derive(Clone, Copy, Debug)]
pub struct DriverParams {
    /// Perception-reaction time in s.
    pub reaction_time_s: f64,
    /// Desired time headway `T` in s.
    pub headway_t_s: f64,
    /// Comfortable braking deceleration in m/s^2 (positive).
    pub comfort_brake_mps2: f64,
    /// Maximum braking deceleration in m/s^2 (positive).
    pub max_brake_mps2: f64,
    /// Maximum rate of change of acceleration in m/s^3.
    pub jerk_limit_mps3: f64,
    /// Throttle actuation lag time constant in s.
    pub throttle_lag_s: f64,
    /// Brake actuation lag time constant in s.
    pub brake_lag_s: f64,
    /// Aggression as a z-score.
    pub aggression_z: f64,
    /// Rule adherence in `[0, 1]`.
    pub rule_adherence: f64,
    /// Desired free-flow speed in m/s.
    pub desired_speed_mps: f64,
}

/// The two-state speeding process. The overspeed magnitude only exists
/// while the driver is speeding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeedingState {
    Compliant,
    Speeding { magnitude_kmh: f64 },
}

/// The behavioural state of one driver.
#[derive(Clone, Debug)]
pub struct Driver {
    params: DriverParams,
    speeding: SpeedingState,
    /// Time since the last speeding transition, in s.
    time_in_state_s: f64,
}

impl Driver {
    pub(crate) fn new(params: DriverParams) -> Self {
        Self {
            params,
            speeding: SpeedingState::Compliant,
            time_in_state_s: 0.0,
        }
    }

    /// The driver's sampled parameters.
    pub fn params(&self) -> &DriverParams {
        &self.params
    }

    /// The current speeding state.
    pub fn speeding_state(&self) -> SpeedingState {
        self.speeding
    }

    /// Time since the last compliant/speeding transition, in s.
    pub fn time_in_state_s(&self) -> f64 {
        self.time_in_state_s
    }

    /// Advances the two-state Markov speeding process by `dt` seconds.
    ///
    /// The transition probability uses the exact exponential form
    /// `1 - exp(-rate * dt)`, which stays a probability at the large
    /// effective steps produced by high speed factors.
    pub fn update_speeding_state(&mut self, dt: f64, config: &SpeedingConfig, rng: &mut StdRng) {
        self.time_in_state_s += dt;
        let a = sigmoid(self.params.aggression_z);
        let ra = self.params.rule_adherence;
        let rate = match self.speeding {
            SpeedingState::Compliant => config.lambda_on * (0.25 + 0.75 * a) * (1.0 - 0.75 * ra),
            SpeedingState::Speeding { .. } => config.lambda_off * (0.25 + 0.75 * ra),
        };
        let p = 1.0 - (-rate * dt).exp();
        if rng.gen::<f64>() >= p {
            return;
        }
        self.speeding = match self.speeding {
            SpeedingState::Compliant => {
                let mean = 8.0 + 6.0 * a;
                let raw: f64 = Normal::new(mean, 4.0)
                    .map(|n| n.sample(rng))
                    .unwrap_or(mean);
                let magnitude_kmh = raw.clamp(0.0, MAX_OVERSPEED_KMH) * (1.0 - ra);
                SpeedingState::Speeding { magnitude_kmh }
            }
            SpeedingState::Speeding { .. } => SpeedingState::Compliant,
        };
        self.time_in_state_s = 0.0;
    }

    /// The speed limit this driver actually targets, in m/s.
    pub fn effective_speed_limit(&self, limit_mps: f64) -> f64 {
        match self.speeding {
            SpeedingState::Compliant => limit_mps,
            SpeedingState::Speeding { magnitude_kmh } => limit_mps + magnitude_kmh / 3.6,
        }
    }
}

/// Samples correlated [DriverParams], owned by the simulation.
///
/// Correlation structure is applied through the Cholesky factor of the
/// configured matrix. If the matrix is not positive definite the sampler
/// degrades to independent truncated-Gaussian draws per parameter.
pub(crate) struct DriverSampler {
    /// Marginals for the correlated parameters, in [PARAM_NAMES] order.
    marginals: [ParamDistribution; N_PARAMS],
    desired_speed: ParamDistribution,
    /// Lower-triangular Cholesky factor, or `None` to sample independently.
    chol: Option<[[f64; N_PARAMS]; N_PARAMS]>,
}

impl DriverSampler {
    pub fn new(config: &DriversConfig) -> Result<Self, ConfigError> {
        let mut marginals = [ParamDistribution::new(0.0, 1.0, 0.0, 1.0); N_PARAMS];
        for (i, name) in PARAM_NAMES.iter().enumerate() {
            let dist = config
                .distributions
                .get(*name)
                .copied()
                .unwrap_or_else(|| default_distribution(name));
            validate_distribution(name, &dist)?;
            marginals[i] = dist;
        }
        let desired_speed = config
            .distributions
            .get("desired_speed")
            .copied()
            .unwrap_or_else(|| default_distribution("desired_speed"));
        validate_distribution("desired_speed", &desired_speed)?;

        let matrix = build_correlation_matrix(config)?;
        let chol = cholesky(&matrix);
        if chol.is_none() {
            log::warn!(
                "driver correlation matrix is not positive definite; \
                 falling back to independent parameter sampling"
            );
        }
        Ok(Self {
            marginals,
            desired_speed,
            chol,
        })
    }

    /// Draws one fully populated, range-valid parameter set. Never fails.
    pub fn sample(&self, rng: &mut StdRng) -> DriverParams {
        let mut z = [0.0f64; N_PARAMS];
        for zi in z.iter_mut() {
            *zi = StandardNormal.sample(rng);
        }

        // Correlate the draws through the Cholesky factor, or keep them
        // independent when the factorization was degenerate.
        let zc = match &self.chol {
            Some(l) => {
                let mut out = [0.0f64; N_PARAMS];
                for i in 0..N_PARAMS {
                    let mut acc = 0.0;
                    for j in 0..=i {
                        acc += l[i][j] * z[j];
                    }
                    out[i] = acc;
                }
                out
            }
            None => z,
        };

        let mut values = [0.0f64; N_PARAMS];
        for i in 0..N_PARAMS {
            let d = &self.marginals[i];
            values[i] = match i {
                // Logistic marginal: never clamped, lands in (0, 1)
                IDX_RULE_ADHERENCE => sigmoid(d.mean + d.std * zc[i]),
                _ => d.range().clamp(d.mean + d.std * zc[i]),
            };
        }

        DriverParams {
            reaction_time_s: values[0],
            headway_t_s: values[1],
            comfort_brake_mps2: values[2],
            max_brake_mps2: values[3],
            jerk_limit_mps3: values[4],
            throttle_lag_s: values[5],
            brake_lag_s: values[6],
            aggression_z: values[IDX_AGGRESSION],
            rule_adherence: values[IDX_RULE_ADHERENCE],
            desired_speed_mps: sample_truncated(&self.desired_speed, rng),
        }
    }
}

/// Built-in marginal distributions, used when the config names none.
fn default_distribution(name: &str) -> ParamDistribution {
    match name {
        "reaction_time" => ParamDistribution::new(1.0, 0.3, 0.4, 2.5),
        "headway" => ParamDistribution::new(1.5, 0.4, 0.6, 3.0),
        "comfort_brake" => ParamDistribution::new(2.5, 0.5, 1.0, 4.5),
        "max_brake" => ParamDistribution::new(7.0, 1.0, 4.5, 9.5),
        "jerk_limit" => ParamDistribution::new(3.0, 0.8, 1.0, 6.0),
        "throttle_lag" => ParamDistribution::new(0.25, 0.08, 0.05, 0.6),
        "brake_lag" => ParamDistribution::new(0.15, 0.05, 0.03, 0.4),
        "aggression" => ParamDistribution::new(0.0, 1.0, -3.0, 3.0),
        "rule_adherence" => ParamDistribution::new(1.0, 1.2, 0.0, 1.0),
        "desired_speed" => ParamDistribution::new(27.0, 3.0, 15.0, 45.0),
        _ => unreachable!("unknown driver parameter {:?}", name),
    }
}

fn validate_distribution(name: &str, dist: &ParamDistribution) -> Result<(), ConfigError> {
    if !(dist.std.is_finite() && dist.std >= 0.0) {
        return Err(ConfigError::Distribution(format!(
            "{}: std must be non-negative, got {}",
            name, dist.std
        )));
    }
    if dist.min > dist.max {
        return Err(ConfigError::Distribution(format!(
            "{}: min {} exceeds max {}",
            name, dist.min, dist.max
        )));
    }
    Ok(())
}

/// Builds the full correlation matrix from the configured pairwise entries.
fn build_correlation_matrix(
    config: &DriversConfig,
) -> Result<[[f64; N_PARAMS]; N_PARAMS], ConfigError> {
    let index_of = |name: &str| -> Result<usize, ConfigError> {
        PARAM_NAMES
            .iter()
            .position(|p| *p == name)
            .ok_or_else(|| ConfigError::Correlation(format!("unknown parameter {:?}", name)))
    };

    let mut matrix = [[0.0; N_PARAMS]; N_PARAMS];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    for pair in &config.correlations {
        let i = index_of(&pair.a)?;
        let j = index_of(&pair.b)?;
        if i == j {
            return Err(ConfigError::Correlation(format!(
                "self-correlation on {:?}",
                pair.a
            )));
        }
        if !(-1.0..=1.0).contains(&pair.rho) {
            return Err(ConfigError::Correlation(format!(
                "rho for ({}, {}) must be in [-1, 1], got {}",
                pair.a, pair.b, pair.rho
            )));
        }
        matrix[i][j] = pair.rho;
        matrix[j][i] = pair.rho;
    }
    Ok(matrix)
}

/// Lower-triangular Cholesky factorization; `None` if not positive definite.
fn cholesky(m: &[[f64; N_PARAMS]; N_PARAMS]) -> Option<[[f64; N_PARAMS]; N_PARAMS]> {
    let mut l = [[0.0; N_PARAMS]; N_PARAMS];
    for i in 0..N_PARAMS {
        for j in 0..=i {
            let mut sum = m[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 1e-12 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// Rejection-sampled truncated Gaussian; clamps after a bounded number
/// of attempts so the draw always terminates.
fn sample_truncated(dist: &ParamDistribution, rng: &mut StdRng) -> f64 {
    let range = dist.range();
    let normal = match Normal::new(dist.mean, dist.std.max(1e-12)) {
        Ok(n) => n,
        Err(_) => return range.clamp(dist.mean),
    };
    for _ in 0..16 {
        let x = normal.sample(rng);
        if range.contains(x) {
            return x;
        }
    }
    range.clamp(normal.sample(rng))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CorrelationPair;
    use rand::SeedableRng;

    fn sampler(config: &DriversConfig) -> DriverSampler {
        DriverSampler::new(config).unwrap()
    }

    #[test]
    fn sampling_is_deterministic_per_seed() {
        let config = DriversConfig::default();
        let s = sampler(&config);
        let mut rng1 = StdRng::seed_from_u64(99);
        let mut rng2 = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let a = s.sample(&mut rng1);
            let b = s.sample(&mut rng2);
            assert_eq!(a.headway_t_s, b.headway_t_s);
            assert_eq!(a.desired_speed_mps, b.desired_speed_mps);
            assert_eq!(a.rule_adherence, b.rule_adherence);
        }
    }

    #[test]
    fn samples_are_range_valid() {
        let config = DriversConfig::default();
        let s = sampler(&config);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let p = s.sample(&mut rng);
            assert!((0.4..=2.5).contains(&p.reaction_time_s));
            assert!((0.6..=3.0).contains(&p.headway_t_s));
            assert!((1.0..=4.5).contains(&p.comfort_brake_mps2));
            assert!((0.0..=1.0).contains(&p.rule_adherence));
            assert!((15.0..=45.0).contains(&p.desired_speed_mps));
        }
    }

    #[test]
    fn aggression_headway_correlation_is_negative() {
        let config = DriversConfig::default();
        let s = sampler(&config);
        let mut rng = StdRng::seed_from_u64(4);
        let samples: Vec<_> = (0..4000).map(|_| s.sample(&mut rng)).collect();
        let mean_a = samples.iter().map(|p| p.aggression_z).sum::<f64>() / samples.len() as f64;
        let mean_h = samples.iter().map(|p| p.headway_t_s).sum::<f64>() / samples.len() as f64;
        let cov = samples
            .iter()
            .map(|p| (p.aggression_z - mean_a) * (p.headway_t_s - mean_h))
            .sum::<f64>()
            / samples.len() as f64;
        assert!(cov < -0.05, "expected negative covariance, got {}", cov);
    }

    #[test]
    fn degenerate_matrix_falls_back_gracefully() {
        // Three mutual strong negative correlations cannot be positive
        // definite, so the sampler must drop to independent draws.
        let mut config = DriversConfig::default();
        config.correlations = vec![
            CorrelationPair {
                a: "aggression".into(),
                b: "headway".into(),
                rho: -0.95,
            },
            CorrelationPair {
                a: "aggression".into(),
                b: "reaction_time".into(),
                rho: -0.95,
            },
            CorrelationPair {
                a: "headway".into(),
                b: "reaction_time".into(),
                rho: -0.95,
            },
        ];
        let s = sampler(&config);
        assert!(s.chol.is_none());
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let p = s.sample(&mut rng);
            assert!(p.headway_t_s.is_finite());
            assert!((0.0..=1.0).contains(&p.rule_adherence));
        }
    }

    #[test]
    fn unknown_correlation_name_is_rejected() {
        let mut config = DriversConfig::default();
        config.correlations.push(CorrelationPair {
            a: "bravado".into(),
            b: "headway".into(),
            rho: 0.2,
        });
        assert!(matches!(
            DriverSampler::new(&config),
            Err(ConfigError::Correlation(_))
        ));
    }

    #[test]
    fn speeding_transitions_and_magnitude_bounds() {
        let params = DriverParams {
            reaction_time_s: 1.0,
            headway_t_s: 1.5,
            comfort_brake_mps2: 2.5,
            max_brake_mps2: 7.0,
            jerk_limit_mps3: 3.0,
            throttle_lag_s: 0.25,
            brake_lag_s: 0.15,
            aggression_z: 2.0,
            rule_adherence: 0.2,
            desired_speed_mps: 30.0,
        };
        let mut driver = Driver::new(params);
        let config = SpeedingConfig {
            lambda_on: 50.0,
            lambda_off: 50.0,
        };
        let mut rng = StdRng::seed_from_u64(6);
        let mut entered = false;
        for _ in 0..1000 {
            driver.update_speeding_state(0.1, &config, &mut rng);
            if let SpeedingState::Speeding { magnitude_kmh } = driver.speeding_state() {
                entered = true;
                assert!((0.0..=MAX_OVERSPEED_KMH).contains(&magnitude_kmh));
                let limit = driver.effective_speed_limit(20.0);
                assert!(limit >= 20.0);
                assert!(limit <= 20.0 + MAX_OVERSPEED_KMH / 3.6);
            }
        }
        assert!(entered, "high rates should trigger at least one transition");
    }

    #[test]
    fn compliant_driver_keeps_the_limit() {
        let params = DriverParams {
            reaction_time_s: 1.0,
            headway_t_s: 1.5,
            comfort_brake_mps2: 2.5,
            max_brake_mps2: 7.0,
            jerk_limit_mps3: 3.0,
            throttle_lag_s: 0.25,
            brake_lag_s: 0.15,
            aggression_z: 0.0,
            rule_adherence: 1.0,
            desired_speed_mps: 30.0,
        };
        let driver = Driver::new(params);
        assert_eq!(driver.effective_speed_limit(25.0), 25.0);
    }
}
