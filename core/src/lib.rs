//! IMU / lidar error-state Kalman filter
//!
//! This crate implements an error-state Kalman filter (ESKF) that fuses high-rate inertial
//! measurements with lower-rate relative-pose corrections produced by a lidar odometry front
//! end. The inertial samples drive a strapdown integration of the *nominal* state (pose and
//! velocity) while a linear Kalman recursion tracks the small *error* between the nominal state
//! and the truth, together with the gyroscope and accelerometer biases. Whenever the lidar front
//! end reports a pose, the error is estimated, folded back into the nominal state, and reset.
//!
//! The filter does not read sensors, synchronise clocks, or publish messages. It consumes plain
//! numeric structures ([InertialSample] and [Pose]) and hands back a pose/velocity pair. The
//! [replay] module and the `eskf-replay` binary show one way of driving it from recorded logs.
//!
//! ## Crate overview
//!
//! - [earth]: Earth constants, gravity and Earth-rate vectors, and the hat / vee operators.
//! - [linalg]: Covariance symmetrization, the conditioned solve used for the Kalman gain, and rotation renormalization.
//! - [state]: Error-state block layout, the nominal state, and the two-sample inertial window.
//! - [linearize]: The continuous-time process model (`F`, `B`) and the measurement model (`G`, `C`).
//! - [kalman]: The [kalman::ErrorStateKalmanFilter] itself.
//! - [config]: The configuration surface and its JSON / YAML / TOML loaders.
//! - [error]: Error enums.
//! - [replay]: CSV records and a closed-loop replay driver.
//!
//! ## State definitions
//!
//! The nominal state is a rigid transform $T_{nb} = (C_b^n, p^n)$ (body to navigation frame) and a
//! navigation-frame velocity $v^n$. The 15-element error state is laid out as five 3-blocks:
//!
//! $$
//! \delta x = [\delta p, \delta v, \phi, \epsilon, \nabla]
//! $$
//!
//! Where:
//! - $\delta p$ and $\delta v$ are the position and velocity errors (navigation frame).
//! - $\phi$ is the small-angle orientation error (navigation frame).
//! - $\epsilon$ and $\nabla$ are the gyroscope and accelerometer bias estimates (body frame).
//!
//! The sign convention is *nominal minus true*: correcting the nominal state means subtracting the
//! estimated error from it.
//!
//! ## Strapdown equations
//!
//! Given two consecutive samples separated by $\Delta t$, the orientation is advanced with the
//! trapezoidal angular increment
//!
//! $$
//! \Delta\theta = \frac{1}{2} \Delta t \left( (\omega_{k-1} - \epsilon) + (\omega_k - \epsilon) \right)
//! $$
//!
//! applied on the right of the current orientation quaternion. Velocity and position follow from
//! the gravity-compensated specific force evaluated with the orientation before and after that
//! update:
//!
//! $$
//! \Delta v = \frac{1}{2} \Delta t \left( C_{k-1} (f_{k-1} - \nabla) + C_k (f_k - \nabla) - 2 g^n \right), \quad
//! p \leftarrow p + v \Delta t + \frac{1}{2} \Delta v \Delta t, \quad v \leftarrow v + \Delta v
//! $$
pub mod config;
pub mod earth;
pub mod error;
pub mod kalman;
pub mod linalg;
pub mod linearize;
pub mod replay;
pub mod state;

use std::fmt::{self, Display};

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

pub use config::FilterConfig;
pub use error::FilterError;
pub use kalman::ErrorStateKalmanFilter;

/// A single timestamped inertial sample.
///
/// The vectors are in the body frame of the vehicle and are raw: the accelerometer reports
/// specific force, so a sensor at rest reads `+g` along the navigation vertical.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InertialSample {
    /// Timestamp in seconds
    pub time: f64,
    /// Angular rate in rad/s, body frame x, y, z axis
    pub gyro: Vector3<f64>,
    /// Specific force in m/s^2, body frame x, y, z axis
    pub accel: Vector3<f64>,
    /// Body to navigation orientation reported by the sensor, if any
    pub orientation: Option<UnitQuaternion<f64>>,
}
impl InertialSample {
    pub fn new(time: f64, gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        InertialSample {
            time,
            gyro,
            accel,
            orientation: None,
        }
    }
    /// Attach a sensor-reported orientation
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f64>) -> Self {
        self.orientation = Some(orientation);
        self
    }
}
impl Display for InertialSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InertialSample {{ time: {:.6}, gyro: [{:.4}, {:.4}, {:.4}], accel: [{:.4}, {:.4}, {:.4}] }}",
            self.time,
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.accel[0],
            self.accel[1],
            self.accel[2]
        )
    }
}

/// A rigid-body transform from the body frame to the navigation frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}
impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}
impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Pose {
            rotation,
            translation,
        }
    }
    pub fn identity() -> Self {
        Pose {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }
    /// Build a pose from a 4×4 homogeneous transform.
    ///
    /// The rotation block is taken as-is; callers supplying single-precision or otherwise
    /// degraded matrices can pass the rotation through [linalg::renormalize_rotation] first.
    pub fn from_homogeneous(matrix: &Matrix4<f64>) -> Self {
        let rotation: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        Pose {
            rotation: Rotation3::from_matrix_unchecked(rotation),
            translation: matrix.fixed_view::<3, 1>(0, 3).into_owned(),
        }
    }
    /// The pose as a 4×4 homogeneous transform
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.matrix());
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        matrix
    }
}
impl From<Matrix4<f64>> for Pose {
    fn from(matrix: Matrix4<f64>) -> Self {
        Pose::from_homogeneous(&matrix)
    }
}
impl From<Pose> for Matrix4<f64> {
    fn from(pose: Pose) -> Self {
        pose.to_homogeneous()
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (roll, pitch, yaw) = self.rotation.euler_angles();
        write!(
            f,
            "Pose {{ position: [{:.4}, {:.4}, {:.4}], rpy: [{:.4}, {:.4}, {:.4}] }}",
            self.translation[0], self.translation[1], self.translation[2], roll, pitch, yaw
        )
    }
}
