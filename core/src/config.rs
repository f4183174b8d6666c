//! Filter configuration
//!
//! The configuration surface mirrors the keys the filter is tuned with:
//!
//! ```yaml
//! earth:
//!   gravity_magnitude: 9.8098
//!   rotation_speed: 7.292115e-5
//!   latitude: 48.9827     # degrees
//! covariance:
//!   prior:
//!     pos: 1.0e-6
//!     vel: 1.0e-6
//!     orientation: 1.0e-6
//!     epsilon: 1.0e-6     # gyro bias
//!     delta: 1.0e-6       # accel bias
//!   process:
//!     gyro: 1.0e-4
//!     accel: 2.5e-3
//!   measurement:
//!     pos: 1.0e-4
//!     orientation: 1.0e-4
//! ```
//!
//! Files can be JSON, YAML or TOML; the format is chosen from the file extension. The filter
//! itself never touches the file system and assumes it receives a validated configuration.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::earth;
use crate::error::ConfigError;

/// Earth constants
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarthConfig {
    /// Gravity magnitude in m/s^2
    pub gravity_magnitude: f64,
    /// Earth rotation rate in rad/s
    pub rotation_speed: f64,
    /// Latitude in degrees
    pub latitude: f64,
}
impl Default for EarthConfig {
    /// Somigliana gravity at sea level for the default latitude.
    fn default() -> Self {
        let latitude = 48.9827;
        EarthConfig {
            gravity_magnitude: earth::gravity(&latitude, &0.0),
            rotation_speed: earth::RATE,
            latitude,
        }
    }
}

/// Prior variances, one per error-state block
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorCovariance {
    pub pos: f64,
    pub vel: f64,
    pub orientation: f64,
    /// Gyroscope bias
    pub epsilon: f64,
    /// Accelerometer bias
    pub delta: f64,
}
impl Default for PriorCovariance {
    fn default() -> Self {
        PriorCovariance {
            pos: 1.0e-6,
            vel: 1.0e-6,
            orientation: 1.0e-6,
            epsilon: 1.0e-6,
            delta: 1.0e-6,
        }
    }
}

/// Process noise variances
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessCovariance {
    pub gyro: f64,
    pub accel: f64,
}
impl Default for ProcessCovariance {
    fn default() -> Self {
        ProcessCovariance {
            gyro: 1.0e-4,
            accel: 2.5e-3,
        }
    }
}

/// Measurement noise variances
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementCovariance {
    pub pos: f64,
    pub orientation: f64,
}
impl Default for MeasurementCovariance {
    fn default() -> Self {
        MeasurementCovariance {
            pos: 1.0e-4,
            orientation: 1.0e-4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CovarianceConfig {
    pub prior: PriorCovariance,
    pub process: ProcessCovariance,
    pub measurement: MeasurementCovariance,
}

/// Complete filter configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub earth: EarthConfig,
    pub covariance: CovarianceConfig,
}

impl FilterConfig {
    /// Latitude converted to radians
    pub fn latitude_radians(&self) -> f64 {
        self.earth.latitude.to_radians()
    }

    /// Check every value for range and finiteness.
    ///
    /// Gravity must be positive, the latitude within ±90°, every variance non-negative, and the
    /// measurement variances strictly positive so that the innovation covariance is invertible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.covariance;
        let checks: [(&'static str, f64, bool); 12] = [
            (
                "earth.gravity_magnitude",
                self.earth.gravity_magnitude,
                self.earth.gravity_magnitude > 0.0,
            ),
            (
                "earth.rotation_speed",
                self.earth.rotation_speed,
                self.earth.rotation_speed >= 0.0,
            ),
            (
                "earth.latitude",
                self.earth.latitude,
                self.earth.latitude.abs() <= 90.0,
            ),
            ("covariance.prior.pos", c.prior.pos, c.prior.pos >= 0.0),
            ("covariance.prior.vel", c.prior.vel, c.prior.vel >= 0.0),
            (
                "covariance.prior.orientation",
                c.prior.orientation,
                c.prior.orientation >= 0.0,
            ),
            ("covariance.prior.epsilon", c.prior.epsilon, c.prior.epsilon >= 0.0),
            ("covariance.prior.delta", c.prior.delta, c.prior.delta >= 0.0),
            ("covariance.process.gyro", c.process.gyro, c.process.gyro >= 0.0),
            ("covariance.process.accel", c.process.accel, c.process.accel >= 0.0),
            (
                "covariance.measurement.pos",
                c.measurement.pos,
                c.measurement.pos > 0.0,
            ),
            (
                "covariance.measurement.orientation",
                c.measurement.orientation,
                c.measurement.orientation > 0.0,
            ),
        ];
        for (key, value, in_range) in checks {
            if !value.is_finite() || !in_range {
                return Err(ConfigError::InvalidValue { key, value });
            }
        }
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        Ok(toml::from_str(&s)?)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            other => Err(ConfigError::UnsupportedExtension(other.map(str::to_string))),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            other => Err(ConfigError::UnsupportedExtension(other.map(str::to_string))),
        }
    }
    /// Read a configuration file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::from_file(&path)?;
        config.validate()?;
        log::info!("Loaded filter configuration from {}", path.as_ref().display());
        Ok(config)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}
