//! Linearized process and measurement models for the error-state filter
//!
//! # Process model
//!
//! The continuous-time error dynamics are
//!
//! $$
//! \dot{\delta x} = F \delta x + B w, \qquad w = [w_g, w_a]
//! $$
//!
//! with the following non-zero 3×3 blocks of $F$ (rows / columns in [ErrorBlock] order):
//!
//! | row \ column  | position | velocity | orientation        | gyro bias   | accel bias |
//! |---------------|----------|----------|--------------------|-------------|------------|
//! | position      |          | $I$      |                    |             |            |
//! | velocity      |          |          | $[f^n \times]$     |             | $C_b^n$    |
//! | orientation   |          |          | $[-\omega_{ie} \times]$ | $-C_b^n$ |            |
//!
//! and $B$ mapping gyro noise to the orientation rows through $-C_b^n$ and accelerometer noise
//! to the velocity rows through $C_b^n$.
//!
//! The orientation / orientation block is set once from the constant Earth rotation vector and
//! is not re-linearized around the current attitude. Transport rate and the attitude dependence
//! of the Earth-rate term are neglected; for ground vehicles over short horizons the omitted
//! terms are far below gyro noise.
//!
//! The model is discretized with a first-order Euler step, $F_d = I + F T$ and $B_d = B T$.
//!
//! # Measurement model
//!
//! The lidar front end observes position and orientation directly, so $G$ selects the position
//! and orientation error blocks and $C$ is the 6×6 identity.
use nalgebra::{Matrix3, Matrix6, Rotation3, SMatrix, Vector3};

use crate::earth::{skew_symmetric_to_vector, vector_to_skew_symmetric};
use crate::linalg::symmetrize;
use crate::state::{
    CovarianceMatrix, ERROR_STATE_DIM, ErrorBlock, ErrorState, MEASUREMENT_DIM,
    MeasurementNoiseMatrix, MeasurementVector, PROCESS_NOISE_DIM, ProcessNoiseMatrix, set_block3,
};
use crate::{InertialSample, Pose};

/// Column of the gyro noise block in `B` and `Q`
pub const GYRO_NOISE: usize = 0;
/// Column of the accelerometer noise block in `B` and `Q`
pub const ACCEL_NOISE: usize = 3;
/// Row of the position residual in the observation
pub const POSITION_RESIDUAL: usize = 0;
/// Row of the orientation residual in the observation
pub const ORIENTATION_RESIDUAL: usize = 3;

pub type ProcessJacobian = SMatrix<f64, ERROR_STATE_DIM, ERROR_STATE_DIM>;
pub type NoiseInputMatrix = SMatrix<f64, ERROR_STATE_DIM, PROCESS_NOISE_DIM>;
pub type MeasurementJacobian = SMatrix<f64, MEASUREMENT_DIM, ERROR_STATE_DIM>;

/// Inputs to the process equation derived from one inertial sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessInput {
    /// Body to navigation rotation $C_b^n$
    pub body_to_nav: Matrix3<f64>,
    /// Specific force in the navigation frame, $f^n = C_b^n f^b$
    pub specific_force: Vector3<f64>,
}
impl ProcessInput {
    /// Derive the process input from a sample.
    ///
    /// The sample's own orientation is used when the sensor reports one; otherwise the
    /// filter's current nominal rotation stands in for it.
    pub fn from_sample(sample: &InertialSample, nominal_rotation: &Rotation3<f64>) -> Self {
        let body_to_nav = match sample.orientation {
            Some(q) => q.to_rotation_matrix().into_inner(),
            None => *nominal_rotation.matrix(),
        };
        ProcessInput {
            body_to_nav,
            specific_force: body_to_nav * sample.accel,
        }
    }
}

/// Continuous-time process Jacobian `F` and noise input map `B`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessModel {
    jacobian: ProcessJacobian,
    noise_input: NoiseInputMatrix,
}
impl ProcessModel {
    /// Build the constant part of the model for a given navigation-frame Earth rotation vector.
    pub fn new(earth_rotation: &Vector3<f64>) -> Self {
        let mut jacobian = ProcessJacobian::zeros();
        set_block3(
            &mut jacobian,
            ErrorBlock::Position.offset(),
            ErrorBlock::Velocity.offset(),
            &Matrix3::identity(),
        );
        set_block3(
            &mut jacobian,
            ErrorBlock::Orientation.offset(),
            ErrorBlock::Orientation.offset(),
            &vector_to_skew_symmetric(&(-*earth_rotation)),
        );
        ProcessModel {
            jacobian,
            noise_input: NoiseInputMatrix::zeros(),
        }
    }
    /// Refresh the sample-dependent blocks of `F` and `B`.
    pub fn set_process_equation(&mut self, input: &ProcessInput) {
        let c_nb = &input.body_to_nav;
        let neg_c_nb = -input.body_to_nav;
        // velocity error
        set_block3(
            &mut self.jacobian,
            ErrorBlock::Velocity.offset(),
            ErrorBlock::Orientation.offset(),
            &vector_to_skew_symmetric(&input.specific_force),
        );
        set_block3(
            &mut self.jacobian,
            ErrorBlock::Velocity.offset(),
            ErrorBlock::AccelBias.offset(),
            c_nb,
        );
        set_block3(
            &mut self.noise_input,
            ErrorBlock::Velocity.offset(),
            ACCEL_NOISE,
            c_nb,
        );
        // orientation error
        set_block3(
            &mut self.jacobian,
            ErrorBlock::Orientation.offset(),
            ErrorBlock::GyroBias.offset(),
            &neg_c_nb,
        );
        set_block3(
            &mut self.noise_input,
            ErrorBlock::Orientation.offset(),
            GYRO_NOISE,
            &neg_c_nb,
        );
    }
    /// First-order Euler discretization over `dt` seconds: `(I + F dt, B dt)`.
    pub fn discretize(&self, dt: f64) -> (ProcessJacobian, NoiseInputMatrix) {
        (
            ProcessJacobian::identity() + self.jacobian * dt,
            self.noise_input * dt,
        )
    }
    /// Propagate the error state mean and covariance over `dt` seconds.
    ///
    /// `X ← F_d X`, `P ← F_d P F_dᵀ + B_d Q B_dᵀ` (symmetrized).
    pub fn propagate(
        &self,
        dt: f64,
        error: &mut ErrorState,
        covariance: &mut CovarianceMatrix,
        process_noise: &ProcessNoiseMatrix,
    ) {
        let (f, b) = self.discretize(dt);
        *error.as_vector_mut() = f * error.as_vector();
        *covariance = symmetrize(
            &(f * *covariance * f.transpose() + b * process_noise * b.transpose()),
        );
    }
    pub fn jacobian(&self) -> &ProcessJacobian {
        &self.jacobian
    }
    pub fn noise_input(&self) -> &NoiseInputMatrix {
        &self.noise_input
    }
}

/// Relative-pose measurement model: `Y = G δx + C n`.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementModel {
    jacobian: MeasurementJacobian,
    noise_map: Matrix6<f64>,
}
impl Default for MeasurementModel {
    fn default() -> Self {
        MeasurementModel::new()
    }
}
impl MeasurementModel {
    pub fn new() -> Self {
        let mut jacobian = MeasurementJacobian::zeros();
        set_block3(
            &mut jacobian,
            POSITION_RESIDUAL,
            ErrorBlock::Position.offset(),
            &Matrix3::identity(),
        );
        set_block3(
            &mut jacobian,
            ORIENTATION_RESIDUAL,
            ErrorBlock::Orientation.offset(),
            &Matrix3::identity(),
        );
        MeasurementModel {
            jacobian,
            noise_map: Matrix6::identity(),
        }
    }
    /// Innovation between the filter's pose and an observed pose.
    ///
    /// The position residual is `p_filter - p_observed`; the orientation residual is
    /// `vee(I - C_filter C_observedᵀ)`, a first-order approximation valid for small
    /// misalignment.
    pub fn innovation(&self, predicted: &Pose, observed: &Pose) -> MeasurementVector {
        let mut y = MeasurementVector::zeros();
        y.fixed_rows_mut::<3>(POSITION_RESIDUAL)
            .copy_from(&(predicted.translation - observed.translation));
        let c_nn_obs = predicted.rotation.matrix() * observed.rotation.matrix().transpose();
        y.fixed_rows_mut::<3>(ORIENTATION_RESIDUAL)
            .copy_from(&skew_symmetric_to_vector(&(Matrix3::identity() - c_nn_obs)));
        y
    }
    /// Measurement noise as seen by the innovation, `C R Cᵀ`.
    pub fn mapped_noise(&self, noise: &MeasurementNoiseMatrix) -> MeasurementNoiseMatrix {
        self.noise_map * noise * self.noise_map.transpose()
    }
    pub fn jacobian(&self) -> &MeasurementJacobian {
        &self.jacobian
    }
    pub fn noise_map(&self) -> &Matrix6<f64> {
        &self.noise_map
    }
}
