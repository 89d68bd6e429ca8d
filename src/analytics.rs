//! Per-tick time-series aggregation.

use crate::config::DataManagerConfig;
use crate::driver::SpeedingState;
use crate::math::forward_gap;
use crate::{VehicleId, VehicleSet};

/// One aggregated sample of the vehicle population.
#[derive(Clone, Copy, Debug)]
pub struct TickSample {
    pub time_s: f64,
    pub mean_speed_mps: f64,
    pub min_speed_mps: f64,
    pub max_speed_mps: f64,
    /// Mean bumper-to-bumper gap between arc neighbours, in m.
    pub mean_gap_m: f64,
    /// Number of drivers currently in the speeding state.
    pub speeding_count: usize,
    /// Collisions recorded since the simulation started.
    pub cumulative_collisions: usize,
}

/// Collects [TickSample]s, dropping the oldest beyond a capacity cap.
#[derive(Clone, Debug)]
pub struct Analytics {
    enabled: bool,
    max_samples: usize,
    samples: Vec<TickSample>,
}

impl Analytics {
    pub(crate) fn new(config: &DataManagerConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_samples: config.max_samples.max(1),
            samples: Vec::new(),
        }
    }

    /// The recorded samples, oldest first.
    pub fn samples(&self) -> &[TickSample] {
        &self.samples
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<&TickSample> {
        self.samples.last()
    }

    /// Aggregates the current population state into one sample.
    pub(crate) fn record(
        &mut self,
        time_s: f64,
        order: &[VehicleId],
        vehicles: &VehicleSet,
        track_len: f64,
        cumulative_collisions: usize,
    ) {
        if !self.enabled || order.is_empty() {
            return;
        }
        let n = order.len();
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut speeding_count = 0;
        for id in order {
            let veh = &vehicles[*id];
            let v = veh.vel();
            sum += v;
            min = min.min(v);
            max = max.max(v);
            if matches!(veh.driver().speeding_state(), SpeedingState::Speeding { .. }) {
                speeding_count += 1;
            }
        }

        let mean_gap_m = if n > 1 {
            let mut gap_sum = 0.0;
            for rank in 0..n {
                let a = &vehicles[order[rank]];
                let b = &vehicles[order[(rank + 1) % n]];
                gap_sum += forward_gap(a.pos(), b.pos(), track_len) - a.half_len() - b.half_len();
            }
            gap_sum / n as f64
        } else {
            track_len - 2.0 * vehicles[order[0]].half_len()
        };

        if self.samples.len() == self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(TickSample {
            time_s,
            mean_speed_mps: sum / n as f64,
            min_speed_mps: min,
            max_speed_mps: max,
            mean_gap_m,
            speeding_count,
            cumulative_collisions,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DataManagerConfig;
    use crate::driver::{Driver, DriverParams};
    use crate::vehicle::{catalog_spec, Vehicle};
    use assert_approx_eq::assert_approx_eq;

    fn test_params() -> DriverParams {
        DriverParams {
            reaction_time_s: 1.0,
            headway_t_s: 1.5,
            comfort_brake_mps2: 2.5,
            max_brake_mps2: 7.0,
            jerk_limit_mps3: 3.0,
            throttle_lag_s: 0.25,
            brake_lag_s: 0.15,
            aggression_z: 0.0,
            rule_adherence: 0.9,
            desired_speed_mps: 30.0,
        }
    }

    #[test]
    fn records_population_statistics() {
        let mut vehicles = VehicleSet::default();
        let spec = catalog_spec("sedan").unwrap();
        let order: Vec<VehicleId> = [(0.0, 10.0), (100.0, 20.0)]
            .iter()
            .map(|(s, v)| {
                vehicles.insert_with_key(|id| {
                    Vehicle::new(id, spec, Driver::new(test_params()), *s, *v)
                })
            })
            .collect();
        let mut analytics = Analytics::new(&DataManagerConfig::default());
        analytics.record(1.0, &order, &vehicles, 1000.0, 0);
        let sample = analytics.latest().unwrap();
        assert_approx_eq!(sample.mean_speed_mps, 15.0, 1e-9);
        assert_eq!(sample.min_speed_mps, 10.0);
        assert_eq!(sample.max_speed_mps, 20.0);
        // Two neighbour gaps covering the whole ring minus two car lengths
        assert_approx_eq!(sample.mean_gap_m, (1000.0 - 2.0 * 4.6) / 2.0, 1e-9);
    }

    #[test]
    fn capacity_cap_drops_oldest() {
        let mut vehicles = VehicleSet::default();
        let spec = catalog_spec("sedan").unwrap();
        let order = vec![vehicles.insert_with_key(|id| {
            Vehicle::new(id, spec, Driver::new(test_params()), 0.0, 5.0)
        })];
        let config = DataManagerConfig {
            enabled: true,
            max_samples: 3,
        };
        let mut analytics = Analytics::new(&config);
        for i in 0..10 {
            analytics.record(i as f64, &order, &vehicles, 1000.0, 0);
        }
        assert_eq!(analytics.samples().len(), 3);
        assert_eq!(analytics.samples()[0].time_s, 7.0);
    }

    #[test]
    fn disabled_collector_records_nothing() {
        let config = DataManagerConfig {
            enabled: false,
            max_samples: 10,
        };
        let mut analytics = Analytics::new(&config);
        analytics.record(0.0, &[], &VehicleSet::default(), 1000.0, 0);
        assert!(analytics.samples().is_empty());
    }
}
