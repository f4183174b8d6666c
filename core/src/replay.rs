//! Replay of recorded inertial and lidar-pose logs
//!
//! Recorded logs are plain CSV files with a header row:
//!
//! - inertial samples: `time,gyro_x,gyro_y,gyro_z,acc_x,acc_y,acc_z[,qw,qx,qy,qz]`
//! - lidar poses: `time,x,y,z,qw,qx,qy,qz`
//!
//! The two logs are merged into one time-ordered [Event] stream and fed through an
//! [ErrorStateKalmanFilter]. One [OdometryRecord] is produced for every inertial sample the
//! filter absorbs.
use std::path::Path;

use log::{info, warn};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ReplayError;
use crate::kalman::ErrorStateKalmanFilter;
use crate::{InertialSample, Pose};

/// One row of an inertial log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuRecord {
    /// Timestamp in seconds
    pub time: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    /// Optional sensor orientation (body to navigation), scalar first
    #[serde(default)]
    pub qw: Option<f64>,
    #[serde(default)]
    pub qx: Option<f64>,
    #[serde(default)]
    pub qy: Option<f64>,
    #[serde(default)]
    pub qz: Option<f64>,
}
impl ImuRecord {
    /// Convert to an [InertialSample]. The orientation is attached only when all four
    /// quaternion components are present; it is normalized on the way.
    pub fn to_sample(&self) -> InertialSample {
        let sample = InertialSample::new(
            self.time,
            Vector3::new(self.gyro_x, self.gyro_y, self.gyro_z),
            Vector3::new(self.acc_x, self.acc_y, self.acc_z),
        );
        match (self.qw, self.qx, self.qy, self.qz) {
            (Some(w), Some(x), Some(y), Some(z)) => {
                let orientation = Quaternion::new(w, x, y, z);
                sample.with_orientation(UnitQuaternion::from_quaternion(orientation))
            }
            _ => sample,
        }
    }
}

/// One row of a lidar pose log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
}
impl PoseRecord {
    pub fn to_pose(&self) -> Pose {
        let q = Quaternion::new(self.qw, self.qx, self.qy, self.qz);
        let q = UnitQuaternion::from_quaternion(q);
        Pose::new(q.to_rotation_matrix(), Vector3::new(self.x, self.y, self.z))
    }
}

/// Filter output at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometryRecord {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}
impl OdometryRecord {
    pub fn new(time: f64, pose: &Pose, velocity: &Vector3<f64>) -> Self {
        let q = UnitQuaternion::from_rotation_matrix(&pose.rotation);
        OdometryRecord {
            time,
            x: pose.translation[0],
            y: pose.translation[1],
            z: pose.translation[2],
            qw: q.w,
            qx: q.i,
            qy: q.j,
            qz: q.k,
            vx: velocity[0],
            vy: velocity[1],
            vz: velocity[2],
        }
    }
}

/// Read every row of a CSV file with a header.
pub fn read_csv<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>, ReplayError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

/// Write rows to a CSV file, header first.
pub fn write_csv<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> Result<(), ReplayError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// A single step of a replay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Inertial sample to propagate with
    Imu(InertialSample),
    /// Lidar pose observed at `time`
    Correction { time: f64, pose: Pose },
}
impl Event {
    pub fn time(&self) -> f64 {
        match self {
            Event::Imu(sample) => sample.time,
            Event::Correction { time, .. } => *time,
        }
    }
}

/// Merge inertial and pose logs into one stream ordered by time.
///
/// At equal timestamps the inertial sample comes first.
pub fn build_event_stream(imu: &[ImuRecord], poses: &[PoseRecord]) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::with_capacity(imu.len() + poses.len());
    events.extend(imu.iter().map(|r| Event::Imu(r.to_sample())));
    events.extend(poses.iter().map(|r| Event::Correction {
        time: r.time,
        pose: r.to_pose(),
    }));
    events.sort_by(|a, b| a.time().total_cmp(&b.time()));
    events
}

/// Outcome of [run_closed_loop].
#[derive(Debug, Clone, Default)]
pub struct ReplayOutput {
    /// One record per absorbed inertial sample, the initialization sample included
    pub records: Vec<OdometryRecord>,
    pub corrections: usize,
    pub rejected_samples: usize,
    pub rejected_corrections: usize,
}

/// Run the filter over an event stream.
///
/// The filter is initialized on the first inertial sample, at the first observed pose if the
/// stream has one (identity otherwise) and at rest. Each correction is paired with the latest
/// inertial sample. Rejected inputs are logged and counted; they never stop the replay.
pub fn run_closed_loop(
    filter: &mut ErrorStateKalmanFilter,
    events: &[Event],
) -> Result<ReplayOutput, ReplayError> {
    let (first_index, first_sample) = events
        .iter()
        .enumerate()
        .find_map(|(i, e)| match e {
            Event::Imu(sample) => Some((i, *sample)),
            Event::Correction { .. } => None,
        })
        .ok_or(ReplayError::NoInertialData)?;
    let initial_pose = events
        .iter()
        .find_map(|e| match e {
            Event::Correction { pose, .. } => Some(*pose),
            Event::Imu(_) => None,
        })
        .unwrap_or_default();

    filter.init(initial_pose, Vector3::zeros(), &first_sample);
    let mut output = ReplayOutput::default();
    let (pose, velocity) = filter.odometry();
    output
        .records
        .push(OdometryRecord::new(first_sample.time, &pose, &velocity));

    let mut latest = first_sample;
    for (i, event) in events.iter().enumerate() {
        if i == first_index {
            continue;
        }
        match event {
            Event::Imu(sample) => match filter.update(sample) {
                Ok(()) => {
                    latest = *sample;
                    let (pose, velocity) = filter.odometry();
                    output
                        .records
                        .push(OdometryRecord::new(sample.time, &pose, &velocity));
                }
                Err(e) => {
                    warn!("Event #{i}: {e}");
                    output.rejected_samples += 1;
                }
            },
            Event::Correction { time, pose } => match filter.correct(&latest, *time, pose) {
                Ok(()) => output.corrections += 1,
                Err(e) => {
                    warn!("Event #{i}: {e}");
                    output.rejected_corrections += 1;
                }
            },
        }
    }
    info!(
        "Replay finished: {} odometry records, {} corrections applied, {} samples and {} corrections rejected",
        output.records.len(),
        output.corrections,
        output.rejected_samples,
        output.rejected_corrections
    );
    Ok(output)
}
