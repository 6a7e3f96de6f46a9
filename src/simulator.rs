//! Simulated measurement device
//!
//! Stands in for the positioning table and vibration analyzer. Travel time
//! scales with distance from the origin (floored at a minimum), analysis adds
//! a fixed delay, and the extracted features are a deterministic function of
//! the target point plus controlled noise so repeated scans of the same point
//! stay comparable.

use crate::error::SimulationError;
use crate::protocol::{AnalysisInfo, OperatingEnvelope, Point};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::debug;

/// Feature vector layout: time-domain block then power-spectrum block
pub const FEATURE_NAMES: [&str; 8] = [
    "Time_skewness_y",
    "Time_kurtosis_y",
    "Time_rms_y",
    "Time_crestfactor_y",
    "Powerspectrum_skewness_y",
    "Powerspectrum_kurtosis_y",
    "Powerspectrum_rms_y",
    "Powerspectrum_crestfactor_y",
];

const ALGORITHM_VERSION: &str = "v2.1.0";
const ANALYSIS_WINDOW_MS: u64 = 200;
const MIN_TRAVEL_MS: u64 = 100;
const TRAVEL_MS_PER_UNIT: f64 = 10.0;

/// One completed measurement at a point
#[derive(Debug, Clone)]
pub struct FeatureReport {
    pub features: Vec<String>,
    pub values: Vec<f64>,
    pub analysis_info: AnalysisInfo,
}

/// Contract of the measurement device: bounded non-negative completion time,
/// a serializable payload, and the possibility of failure
#[async_trait]
pub trait Measurement: Send + Sync {
    async fn measure(&self, point: Point) -> Result<FeatureReport, SimulationError>;
}

/// Software stand-in for the real table/analyzer pair
pub struct VibrationSimulator {
    envelope: OperatingEnvelope,
}

impl VibrationSimulator {
    pub fn new(envelope: OperatingEnvelope) -> Self {
        Self { envelope }
    }

    fn travel_time(point: Point) -> Duration {
        let ms = (point.distance_from_origin() * TRAVEL_MS_PER_UNIT) as u64;
        Duration::from_millis(ms.max(MIN_TRAVEL_MS))
    }
}

#[async_trait]
impl Measurement for VibrationSimulator {
    async fn measure(&self, point: Point) -> Result<FeatureReport, SimulationError> {
        if !self.envelope.contains(point) {
            return Err(SimulationError::OutOfBounds {
                x: point.x,
                y: point.y,
            });
        }

        let travel = Self::travel_time(point);
        debug!("moving to ({:.2}, {:.2}), travel {travel:?}", point.x, point.y);
        tokio::time::sleep(travel).await;

        debug!("analyzing vibration at ({:.2}, {:.2})", point.x, point.y);
        tokio::time::sleep(Duration::from_millis(ANALYSIS_WINDOW_MS)).await;

        Ok(FeatureReport {
            features: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            values: feature_values(point),
            analysis_info: AnalysisInfo {
                duration_ms: ANALYSIS_WINDOW_MS,
                sampling_rate: self.envelope.sampling_rate,
                data_points: 200,
                algorithm_version: ALGORITHM_VERSION.into(),
            },
        })
    }
}

/// Position-seeded feature synthesis so nearby points show related vibration
/// characteristics
fn feature_values(point: Point) -> Vec<f64> {
    let seed = (point.x * 1000.0 + point.y * 1000.0) as i64 as u64;
    let mut rng = StdRng::seed_from_u64(seed);

    let base_amplitude = 1.0 + point.x.abs() * 0.1 + point.y.abs() * 0.05;
    let noise = (rng.gen::<f64>() - 0.5) * 0.2;

    vec![
        // Time domain
        (rng.gen::<f64>() - 0.5) * 2.0 + noise,            // skewness
        rng.gen::<f64>() * 3.0 + 2.0 + noise,              // kurtosis
        base_amplitude * (0.5 + rng.gen::<f64>() * 0.5),   // rms
        2.0 + rng.gen::<f64>() * 2.0 + noise,              // crest factor
        // Power spectrum
        (rng.gen::<f64>() - 0.5) * 1.5 + noise,            // skewness
        rng.gen::<f64>() * 2.0 + 1.5 + noise,              // kurtosis
        base_amplitude * (0.3 + rng.gen::<f64>() * 0.4),   // rms
        1.5 + rng.gen::<f64>() * 1.5 + noise,              // crest factor
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_deterministic_per_point() {
        let point = Point { x: 12.5, y: -7.0 };
        assert_eq!(feature_values(point), feature_values(point));
        assert_ne!(
            feature_values(point),
            feature_values(Point { x: 12.5, y: -6.0 })
        );
    }

    #[test]
    fn test_feature_vector_shape() {
        let values = feature_values(Point { x: 3.0, y: 4.0 });
        assert_eq!(values.len(), FEATURE_NAMES.len());
        assert!(values.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn test_travel_time_floor() {
        assert_eq!(
            VibrationSimulator::travel_time(Point { x: 0.0, y: 0.0 }),
            Duration::from_millis(100)
        );
        // 3-4-5 triangle: 50 units -> 500ms
        assert_eq!(
            VibrationSimulator::travel_time(Point { x: 30.0, y: 40.0 }),
            Duration::from_millis(500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_success() {
        let simulator = VibrationSimulator::new(OperatingEnvelope::default());
        let report = simulator
            .measure(Point { x: 10.0, y: 0.0 })
            .await
            .expect("measurement failed");
        assert_eq!(report.features.len(), 8);
        assert_eq!(report.values.len(), 8);
        assert_eq!(report.analysis_info.sampling_rate, 1000);
    }

    #[tokio::test]
    async fn test_measure_out_of_bounds() {
        let simulator = VibrationSimulator::new(OperatingEnvelope::default());
        let result = simulator.measure(Point { x: 99.0, y: 0.0 }).await;
        assert!(matches!(
            result,
            Err(SimulationError::OutOfBounds { .. })
        ));
    }
}
