use crate::generator::propagation::log_distance_rssi;
use anyhow::{bail, Context};
use fpcore::data::{Measurement, Position, Reading};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating a synthetic calibration survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub width: f64,
    pub height: f64,
    /// Distance between neighbouring calibration points.
    pub spacing: f64,
    pub access_points: usize,
    pub captures_per_point: usize,
    pub probes: usize,
    /// Uniform RSSI jitter amplitude in dB.
    pub noise: f64,
    pub reference_power: f64,
    pub path_loss_exponent: f64,
    /// Readings weaker than this are not reported.
    pub sensitivity: f64,
    pub seed: u64,
    pub description: Option<String>,
    pub scenario: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            width: 40.0,
            height: 20.0,
            spacing: 2.0,
            access_points: 6,
            captures_per_point: 3,
            probes: 25,
            noise: 2.0,
            reference_power: -40.0,
            path_loss_exponent: 2.7,
            sensitivity: -90.0,
            seed: 0,
            description: None,
            scenario: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPoint {
    pub key: String,
    pub position: Position,
}

/// Held-out query with its true location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    pub truth: Position,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    pub access_points: Vec<AccessPoint>,
    pub calibration: Vec<Measurement>,
    pub probes: Vec<Probe>,
}

impl GeneratorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            bail!("survey spacing must be positive, got {}", self.spacing);
        }
        if !(self.width.is_finite() && self.width >= 0.0 && self.height.is_finite() && self.height >= 0.0)
        {
            bail!("survey area {}x{} is invalid", self.width, self.height);
        }
        if self.access_points == 0 {
            bail!("survey needs at least one access point");
        }
        Ok(())
    }

    fn grid_axis(&self, extent: f64) -> usize {
        (extent / self.spacing).floor() as usize + 1
    }

    fn jitter(&self, rng: &mut StdRng) -> f64 {
        if self.noise > 0.0 {
            rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        }
    }

    fn measure(
        &self,
        rng: &mut StdRng,
        access_points: &[AccessPoint],
        uid: String,
        position: &Position,
    ) -> Measurement {
        let mut measurement = Measurement::new(uid);
        for access_point in access_points {
            let distance = position.distance_to(&access_point.position);
            let rssi = log_distance_rssi(self.reference_power, self.path_loss_exponent, distance)
                + self.jitter(rng);
            if rssi >= self.sensitivity {
                measurement
                    .push_reading(Reading::new(access_point.key.clone(), rssi).with_kind("rf_transmitter"));
            }
        }
        measurement
    }
}

pub fn build_survey_from_config(config: &GeneratorConfig) -> anyhow::Result<Survey> {
    config.validate()?;
    let columns = config.grid_axis(config.width);
    let rows = config.grid_axis(config.height);
    let capture_count = columns
        .checked_mul(rows)
        .and_then(|points| points.checked_mul(config.captures_per_point))
        .context("overflow computing capture count for generator")?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let access_points: Vec<AccessPoint> = (0..config.access_points)
        .map(|index| AccessPoint {
            key: format!("AP_{:02}", index + 1),
            position: Position::new_2d(
                rng.gen_range(0.0..=config.width),
                rng.gen_range(0.0..=config.height),
            ),
        })
        .collect();

    let mut calibration = Vec::with_capacity(capture_count);
    for column in 0..columns {
        for row in 0..rows {
            let position =
                Position::new_2d(column as f64 * config.spacing, row as f64 * config.spacing);
            for capture in 0..config.captures_per_point {
                let timestamp = calibration.len() as f64 * 0.5;
                let uid = format!("survey-{}-{}-{}", column, row, capture);
                let measurement = config
                    .measure(&mut rng, &access_points, uid, &position)
                    .with_position(position.clone())
                    .with_timestamp(timestamp);
                calibration.push(measurement);
            }
        }
    }

    let probes = (0..config.probes)
        .map(|index| {
            let truth = Position::new_2d(
                rng.gen_range(0.0..=config.width),
                rng.gen_range(0.0..=config.height),
            );
            let measurement =
                config.measure(&mut rng, &access_points, format!("probe-{}", index), &truth);
            Probe { truth, measurement }
        })
        .collect();

    Ok(Survey {
        access_points,
        calibration,
        probes,
    })
}

pub fn build_survey(spacing: f64) -> anyhow::Result<Survey> {
    let config = GeneratorConfig {
        spacing,
        ..Default::default()
    };
    build_survey_from_config(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_builds_expected_capture_count() {
        let survey = build_survey(10.0).unwrap();
        // 5 columns x 3 rows x 3 captures
        assert_eq!(survey.calibration.len(), 45);
        assert_eq!(survey.probes.len(), 25);
        assert!(survey
            .calibration
            .iter()
            .all(|measurement| measurement.position.is_some()));
        assert!(survey
            .probes
            .iter()
            .all(|probe| probe.measurement.position.is_none()));
    }

    #[test]
    fn generator_is_reproducible_per_seed() {
        let config = GeneratorConfig {
            width: 6.0,
            height: 6.0,
            spacing: 3.0,
            access_points: 3,
            captures_per_point: 1,
            probes: 2,
            noise: 0.0,
            seed: 13,
            description: Some("test".into()),
            scenario: Some("small room".into()),
            ..Default::default()
        };
        let first = build_survey_from_config(&config).unwrap();
        let second = build_survey_from_config(&config).unwrap();
        assert_eq!(first.calibration, second.calibration);
        assert_eq!(first.access_points.len(), 3);
        assert_eq!(first.access_points[0].key, "AP_01");
    }

    #[test]
    fn weak_readings_are_not_reported() {
        let config = GeneratorConfig {
            width: 100.0,
            height: 0.0,
            spacing: 100.0,
            access_points: 1,
            captures_per_point: 1,
            probes: 0,
            noise: 0.0,
            sensitivity: -41.0,
            ..Default::default()
        };
        let survey = build_survey_from_config(&config).unwrap();
        let reported: usize = survey
            .calibration
            .iter()
            .map(|measurement| measurement.readings.len())
            .sum();
        assert!(reported <= 1);
    }

    #[test]
    fn invalid_spacing_is_rejected() {
        assert!(build_survey(0.0).is_err());
        assert!(build_survey(f64::NAN).is_err());
    }
}
