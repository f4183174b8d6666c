//! Error-state Kalman filter for IMU / lidar fusion
//!
//! [ErrorStateKalmanFilter] keeps a nominal pose and velocity that are integrated from every
//! inertial sample, and a 15-element error state with covariance that is propagated alongside
//! it. A lidar pose observation is turned into an innovation against the nominal pose, the
//! error state is estimated from it, and the estimate is folded back into the nominal state.
//!
//! ```rust
//! use lio_eskf::{ErrorStateKalmanFilter, FilterConfig, InertialSample, Pose};
//! use nalgebra::Vector3;
//!
//! let config = FilterConfig::default();
//! let g = config.earth.gravity_magnitude;
//! let mut eskf = ErrorStateKalmanFilter::new(&config);
//! let at_rest = |t: f64| InertialSample::new(t, Vector3::zeros(), Vector3::new(0.0, 0.0, g));
//!
//! eskf.init(Pose::identity(), Vector3::zeros(), &at_rest(0.0));
//! eskf.update(&at_rest(0.01)).unwrap();
//! let (pose, velocity) = eskf.odometry();
//! assert!(pose.translation.norm() < 1e-12);
//! assert!(velocity.norm() < 1e-12);
//! ```
use log::{debug, info, warn};
use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::config::{CovarianceConfig, FilterConfig};
use crate::earth;
use crate::error::FilterError;
use crate::linalg::{ConditioningOptions, conditioned_spd_solve, renormalize_rotation, symmetrize};
use crate::linearize::{MeasurementModel, ProcessInput, ProcessModel};
use crate::state::{
    CovarianceMatrix, ErrorBlock, ErrorState, InertialWindow, MeasurementNoiseMatrix,
    NominalState, ProcessNoiseMatrix, set_block3,
};
use crate::{InertialSample, Pose};

/// Orientation correction (rad) above which a single correction is reported as suspicious
pub const SMALL_ANGLE_LIMIT: f64 = 0.1;

/// Error-state Kalman filter.
///
/// Call [ErrorStateKalmanFilter::init] once, then [ErrorStateKalmanFilter::update] for every
/// inertial sample and [ErrorStateKalmanFilter::correct] for every lidar pose.
#[derive(Clone, Debug)]
pub struct ErrorStateKalmanFilter {
    gravity: Vector3<f64>,
    earth_rotation: Vector3<f64>,
    prior_covariance: CovarianceMatrix,
    covariance: CovarianceMatrix,
    process_noise: ProcessNoiseMatrix,
    measurement_noise: MeasurementNoiseMatrix,
    process: ProcessModel,
    measurement: MeasurementModel,
    nominal: NominalState,
    error: ErrorState,
    window: InertialWindow,
    time: f64,
    initialized: bool,
    conditioning: ConditioningOptions,
}

impl ErrorStateKalmanFilter {
    /// Build a filter from a (validated) configuration.
    pub fn new(config: &FilterConfig) -> ErrorStateKalmanFilter {
        let gravity = earth::gravity_vector(config.earth.gravity_magnitude);
        let earth_rotation =
            earth::rotation_vector(config.earth.rotation_speed, config.latitude_radians());
        let prior_covariance = prior_covariance(&config.covariance);

        info!(
            "ESKF earth: gravity {:.6} m/s^2, rotation speed {:e} rad/s, latitude {:.4} deg",
            config.earth.gravity_magnitude, config.earth.rotation_speed, config.earth.latitude
        );
        let c = &config.covariance;
        info!(
            "ESKF prior: pos {:e}, vel {:e}, orientation {:e}, epsilon {:e}, delta {:e}",
            c.prior.pos, c.prior.vel, c.prior.orientation, c.prior.epsilon, c.prior.delta
        );
        info!(
            "ESKF noise: process gyro {:e}, accel {:e}; measurement pos {:e}, orientation {:e}",
            c.process.gyro, c.process.accel, c.measurement.pos, c.measurement.orientation
        );

        ErrorStateKalmanFilter {
            gravity,
            earth_rotation,
            prior_covariance,
            covariance: prior_covariance,
            process_noise: process_noise(&config.covariance),
            measurement_noise: measurement_noise(&config.covariance),
            process: ProcessModel::new(&earth_rotation),
            measurement: MeasurementModel::new(),
            nominal: NominalState::default(),
            error: ErrorState::zeros(),
            window: InertialWindow::new(),
            time: 0.0,
            initialized: false,
            conditioning: ConditioningOptions::default(),
        }
    }

    /// Override the limits applied to the innovation covariance before it is factorised.
    pub fn with_conditioning(mut self, conditioning: ConditioningOptions) -> Self {
        self.conditioning = conditioning;
        self
    }

    /// Seed the filter with a starting pose, velocity and inertial sample.
    ///
    /// The error state and covariance are reset to the prior, and the filter clock is set to the
    /// sample's timestamp. Calling `init` again restarts the filter.
    pub fn init(&mut self, pose: Pose, velocity: Vector3<f64>, sample: &InertialSample) {
        self.nominal = NominalState {
            pose: Pose::new(renormalize_rotation(pose.rotation.matrix()), pose.translation),
            velocity,
        };
        self.error = ErrorState::zeros();
        self.covariance = self.prior_covariance;
        self.window.reset(*sample);
        self.time = sample.time;
        self.refresh_process(sample);
        self.initialized = true;

        info!(
            "ESKF initialized at t = {:.6}: position [{:.4}, {:.4}, {:.4}], velocity [{:.4}, {:.4}, {:.4}]",
            self.time,
            pose.translation[0],
            pose.translation[1],
            pose.translation[2],
            velocity[0],
            velocity[1],
            velocity[2]
        );
    }

    /// Absorb one inertial sample: integrate the nominal state and propagate the error state.
    ///
    /// A sample that is not strictly newer than the filter clock, or whose timestamp is not
    /// finite, is rejected and leaves the filter untouched.
    pub fn update(&mut self, sample: &InertialSample) -> Result<(), FilterError> {
        if !self.initialized {
            return Err(FilterError::NotInitialized);
        }
        if !sample.time.is_finite() || sample.time <= self.time {
            warn!(
                "Dropping inertial sample at {:.6} s, filter clock is {:.6} s",
                sample.time, self.time
            );
            return Err(FilterError::StaleSample {
                sample_time: sample.time,
                filter_time: self.time,
            });
        }
        self.window.push(*sample);
        let (previous, current) = self
            .window
            .pair()
            .map(|(previous, current)| (*previous, *current))
            .ok_or(FilterError::NotInitialized)?;

        let dt = current.time - previous.time;
        let angular_delta = self.angular_delta(&previous, &current, dt);
        let (previous_rotation, current_rotation) = self.update_orientation(&angular_delta);
        let velocity_delta = self.velocity_delta(
            &previous,
            &current,
            &previous_rotation,
            &current_rotation,
            dt,
        );
        self.update_position(&velocity_delta, dt);

        self.window.pop_oldest();

        let step = sample.time - self.time;
        self.refresh_process(sample);
        self.process.propagate(
            step,
            &mut self.error,
            &mut self.covariance,
            &self.process_noise,
        );
        self.time = sample.time;

        debug!(
            "ESKF update t = {:.6}: position [{:.4}, {:.4}, {:.4}], velocity [{:.4}, {:.4}, {:.4}]",
            self.time,
            self.nominal.pose.translation[0],
            self.nominal.pose.translation[1],
            self.nominal.pose.translation[2],
            self.nominal.velocity[0],
            self.nominal.velocity[1],
            self.nominal.velocity[2]
        );
        Ok(())
    }

    /// Correct the filter with a lidar pose observed at `time`.
    ///
    /// `sample` is the most recent inertial sample; it linearizes the prediction from the filter
    /// clock to `time`. The filter clock itself is not advanced. If the innovation covariance
    /// cannot be factorised safely the prediction is kept, the nominal state is left as it was,
    /// and [FilterError::IllConditioned] is returned.
    pub fn correct(
        &mut self,
        sample: &InertialSample,
        time: f64,
        observed: &Pose,
    ) -> Result<(), FilterError> {
        if !self.initialized {
            return Err(FilterError::NotInitialized);
        }
        if !time.is_finite() || time <= self.time {
            warn!(
                "Dropping observation at {:.6} s, filter clock is {:.6} s",
                time, self.time
            );
            return Err(FilterError::StaleObservation {
                observation_time: time,
                filter_time: self.time,
            });
        }

        // predict
        self.refresh_process(sample);
        self.process.propagate(
            time - self.time,
            &mut self.error,
            &mut self.covariance,
            &self.process_noise,
        );

        // gain
        let y = self.measurement.innovation(&self.nominal.pose, observed);
        let g = *self.measurement.jacobian();
        let noise = self.measurement.mapped_noise(&self.measurement_noise);
        let s = g * self.covariance * g.transpose() + noise;
        let k = match conditioned_spd_solve(&s, &(g * self.covariance), self.conditioning) {
            Ok(solution) => solution.transpose(),
            Err(e) => {
                warn!("ESKF correction at {:.6} s rejected: {}", time, e);
                return Err(e.into());
            }
        };

        // covariance and error update
        let i_kg = CovarianceMatrix::identity() - k * g;
        self.covariance =
            symmetrize(&(i_kg * self.covariance * i_kg.transpose() + k * noise * k.transpose()));
        let x = self.error.as_vector() + k * (y - g * self.error.as_vector());
        self.error = ErrorState::from(x);

        let angle = self.error.block(ErrorBlock::Orientation).norm();
        if angle > SMALL_ANGLE_LIMIT {
            warn!(
                "ESKF orientation correction of {:.4} rad at {:.6} s exceeds the small-angle limit",
                angle, time
            );
        }

        // inject
        self.nominal = renormalized(self.nominal.corrected(&self.error));
        self.error.reset_transient();

        debug!(
            "ESKF correct t = {:.6}: position [{:.4}, {:.4}, {:.4}], innovation norm {:.6}",
            time,
            self.nominal.pose.translation[0],
            self.nominal.pose.translation[1],
            self.nominal.pose.translation[2],
            y.norm()
        );
        Ok(())
    }

    /// The best current pose and velocity estimate.
    ///
    /// Any pending position, velocity or orientation error is applied to a copy of the nominal
    /// state; the filter itself is not modified.
    pub fn odometry(&self) -> (Pose, Vector3<f64>) {
        let estimate = renormalized(self.nominal.corrected(&self.error));
        (estimate.pose, estimate.velocity)
    }

    /// Angular rate with the estimated gyro bias removed
    pub fn unbiased_angular_vel(&self, angular_vel: &Vector3<f64>) -> Vector3<f64> {
        angular_vel - self.gyro_bias()
    }

    /// Navigation-frame acceleration: the accel-bias-corrected specific force rotated by `rotation`
    /// (body to navigation), minus gravity.
    pub fn unbiased_linear_acc(
        &self,
        linear_acc: &Vector3<f64>,
        rotation: &Matrix3<f64>,
    ) -> Vector3<f64> {
        rotation * (linear_acc - self.accel_bias()) - self.gravity
    }

    /// Timestamp of the last absorbed inertial sample
    pub fn time(&self) -> f64 {
        self.time
    }
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
    pub fn error_state(&self) -> &ErrorState {
        &self.error
    }
    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.covariance
    }
    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.error.block(ErrorBlock::GyroBias)
    }
    pub fn accel_bias(&self) -> Vector3<f64> {
        self.error.block(ErrorBlock::AccelBias)
    }
    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }
    pub fn earth_rotation(&self) -> &Vector3<f64> {
        &self.earth_rotation
    }

    fn refresh_process(&mut self, sample: &InertialSample) {
        let input = ProcessInput::from_sample(sample, &self.nominal.pose.rotation);
        self.process.set_process_equation(&input);
    }

    /// Trapezoidal angular increment over the bias-corrected rates.
    fn angular_delta(
        &self,
        previous: &InertialSample,
        current: &InertialSample,
        dt: f64,
    ) -> Vector3<f64> {
        let previous_rate = self.unbiased_angular_vel(&previous.gyro);
        let current_rate = self.unbiased_angular_vel(&current.gyro);
        0.5 * dt * (previous_rate + current_rate)
    }

    /// Rotate the nominal orientation by `angular_delta` (body frame) and return the rotations
    /// before and after.
    fn update_orientation(
        &mut self,
        angular_delta: &Vector3<f64>,
    ) -> (Matrix3<f64>, Matrix3<f64>) {
        let previous = self.nominal.pose.rotation;
        // identity for a zero increment
        let delta = UnitQuaternion::from_scaled_axis(*angular_delta);
        let current = UnitQuaternion::from_rotation_matrix(&previous) * delta;
        self.nominal.pose.rotation =
            renormalize_rotation(&current.to_rotation_matrix().into_inner());
        (previous.into_inner(), *self.nominal.pose.rotation.matrix())
    }

    fn velocity_delta(
        &self,
        previous: &InertialSample,
        current: &InertialSample,
        previous_rotation: &Matrix3<f64>,
        current_rotation: &Matrix3<f64>,
        dt: f64,
    ) -> Vector3<f64> {
        let previous_acc = self.unbiased_linear_acc(&previous.accel, previous_rotation);
        let current_acc = self.unbiased_linear_acc(&current.accel, current_rotation);
        0.5 * dt * (previous_acc + current_acc)
    }

    fn update_position(&mut self, velocity_delta: &Vector3<f64>, dt: f64) {
        self.nominal.pose.translation += dt * self.nominal.velocity + 0.5 * dt * velocity_delta;
        self.nominal.velocity += velocity_delta;
    }
}

fn renormalized(state: NominalState) -> NominalState {
    NominalState {
        pose: Pose::new(
            renormalize_rotation(state.pose.rotation.matrix()),
            state.pose.translation,
        ),
        velocity: state.velocity,
    }
}

fn prior_covariance(config: &CovarianceConfig) -> CovarianceMatrix {
    let prior = &config.prior;
    let mut p = CovarianceMatrix::zeros();
    for (block, variance) in [
        (ErrorBlock::Position, prior.pos),
        (ErrorBlock::Velocity, prior.vel),
        (ErrorBlock::Orientation, prior.orientation),
        (ErrorBlock::GyroBias, prior.epsilon),
        (ErrorBlock::AccelBias, prior.delta),
    ] {
        set_block3(
            &mut p,
            block.offset(),
            block.offset(),
            &Matrix3::from_diagonal_element(variance),
        );
    }
    p
}

fn process_noise(config: &CovarianceConfig) -> ProcessNoiseMatrix {
    use crate::linearize::{ACCEL_NOISE, GYRO_NOISE};
    let mut q = ProcessNoiseMatrix::zeros();
    set_block3(
        &mut q,
        GYRO_NOISE,
        GYRO_NOISE,
        &Matrix3::from_diagonal_element(config.process.gyro),
    );
    set_block3(
        &mut q,
        ACCEL_NOISE,
        ACCEL_NOISE,
        &Matrix3::from_diagonal_element(config.process.accel),
    );
    q
}

fn measurement_noise(config: &CovarianceConfig) -> MeasurementNoiseMatrix {
    use crate::linearize::{ORIENTATION_RESIDUAL, POSITION_RESIDUAL};
    let mut r = MeasurementNoiseMatrix::zeros();
    set_block3(
        &mut r,
        POSITION_RESIDUAL,
        POSITION_RESIDUAL,
        &Matrix3::from_diagonal_element(config.measurement.pos),
    );
    set_block3(
        &mut r,
        ORIENTATION_RESIDUAL,
        ORIENTATION_RESIDUAL,
        &Matrix3::from_diagonal_element(config.measurement.orientation),
    );
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::orthonormality_error;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::Rotation3;

    fn config() -> FilterConfig {
        FilterConfig::default()
    }

    fn at_rest(config: &FilterConfig, time: f64) -> InertialSample {
        InertialSample::new(
            time,
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, config.earth.gravity_magnitude),
        )
    }

    fn initialized() -> (FilterConfig, ErrorStateKalmanFilter) {
        let cfg = config();
        let mut eskf = ErrorStateKalmanFilter::new(&cfg);
        eskf.init(Pose::identity(), Vector3::zeros(), &at_rest(&cfg, 0.0));
        (cfg, eskf)
    }

    #[test]
    fn construction() {
        let cfg = config();
        let eskf = ErrorStateKalmanFilter::new(&cfg);
        assert!(!eskf.is_initialized());
        assert_eq!(eskf.gravity()[2], cfg.earth.gravity_magnitude);
        let lat = cfg.latitude_radians();
        assert_approx_eq!(eskf.earth_rotation()[0], 0.0);
        assert_approx_eq!(eskf.earth_rotation()[1], earth::RATE * lat.cos(), 1e-15);
        assert_approx_eq!(eskf.earth_rotation()[2], earth::RATE * lat.sin(), 1e-15);
        assert_eq!(eskf.covariance()[(0, 0)], cfg.covariance.prior.pos);
        assert_eq!(eskf.covariance()[(9, 9)], cfg.covariance.prior.epsilon);
        assert_eq!(eskf.covariance()[(14, 14)], cfg.covariance.prior.delta);
        assert_eq!(eskf.covariance()[(0, 1)], 0.0);
    }

    #[test]
    fn noise_matrices_are_block_diagonal() {
        let cfg = config();
        let q = process_noise(&cfg.covariance);
        let r = measurement_noise(&cfg.covariance);
        assert_eq!(q[(0, 0)], cfg.covariance.process.gyro);
        assert_eq!(q[(5, 5)], cfg.covariance.process.accel);
        assert_eq!(r[(2, 2)], cfg.covariance.measurement.pos);
        assert_eq!(r[(3, 3)], cfg.covariance.measurement.orientation);
        assert_eq!(q[(0, 3)], 0.0);
        assert_eq!(r[(1, 4)], 0.0);
    }

    #[test]
    fn requires_init() {
        let cfg = config();
        let mut eskf = ErrorStateKalmanFilter::new(&cfg);
        assert_eq!(
            eskf.update(&at_rest(&cfg, 0.01)),
            Err(FilterError::NotInitialized)
        );
        assert_eq!(
            eskf.correct(&at_rest(&cfg, 0.01), 0.01, &Pose::identity()),
            Err(FilterError::NotInitialized)
        );
    }

    #[test]
    fn init_sets_state_and_clock() {
        let cfg = config();
        let mut eskf = ErrorStateKalmanFilter::new(&cfg);
        let pose = Pose::new(
            Rotation3::from_euler_angles(0.0, 0.0, 0.5),
            Vector3::new(1.0, 2.0, 3.0),
        );
        eskf.init(pose, Vector3::new(0.5, 0.0, 0.0), &at_rest(&cfg, 12.5));
        assert!(eskf.is_initialized());
        assert_eq!(eskf.time(), 12.5);
        let (odom_pose, velocity) = eskf.odometry();
        assert_eq!(odom_pose.translation, pose.translation);
        assert_eq!(velocity, Vector3::new(0.5, 0.0, 0.0));
        assert_approx_eq!(odom_pose.rotation.angle(), 0.5, 1e-12);
    }

    #[test]
    fn zero_motion_update() {
        let (cfg, mut eskf) = initialized();
        assert_eq!(eskf.update(&at_rest(&cfg, 0.01)), Ok(()));
        assert_eq!(eskf.time(), 0.01);
        let (pose, velocity) = eskf.odometry();
        assert!(pose.translation.norm() < 1e-12);
        assert!(velocity.norm() < 1e-12);
        assert!((pose.rotation.matrix() - Matrix3::identity()).amax() < 1e-12);
    }

    #[test]
    fn stale_update_is_rejected_without_change() {
        let (cfg, mut eskf) = initialized();
        eskf.update(&at_rest(&cfg, 0.01)).unwrap();
        let before = eskf.clone();
        let result = eskf.update(&at_rest(&cfg, 0.005));
        assert_eq!(
            result,
            Err(FilterError::StaleSample {
                sample_time: 0.005,
                filter_time: 0.01
            })
        );
        assert!(eskf.update(&at_rest(&cfg, 0.01)).is_err());
        assert_eq!(eskf.odometry(), before.odometry());
        assert_eq!(eskf.error_state(), before.error_state());
        assert_eq!(eskf.covariance(), before.covariance());
        assert_eq!(eskf.time(), before.time());
    }

    #[test]
    fn stale_correction_is_rejected_without_change() {
        let (cfg, mut eskf) = initialized();
        eskf.update(&at_rest(&cfg, 0.01)).unwrap();
        let before = eskf.clone();
        let observed = Pose::new(Rotation3::identity(), Vector3::new(5.0, 0.0, 0.0));
        assert!(matches!(
            eskf.correct(&at_rest(&cfg, 0.01), 0.01, &observed),
            Err(FilterError::StaleObservation { .. })
        ));
        assert_eq!(eskf.odometry(), before.odometry());
        assert_eq!(eskf.error_state(), before.error_state());
        assert_eq!(eskf.covariance(), before.covariance());
    }

    #[test]
    fn non_finite_sample_time_is_rejected_without_change() {
        let (cfg, mut eskf) = initialized();
        eskf.update(&at_rest(&cfg, 0.01)).unwrap();
        let mut before = eskf.clone();
        for time in [f64::NAN, f64::INFINITY] {
            assert!(matches!(
                eskf.update(&at_rest(&cfg, time)),
                Err(FilterError::StaleSample { .. })
            ));
        }
        assert_eq!(eskf.time().to_bits(), before.time().to_bits());
        assert_eq!(eskf.odometry(), before.odometry());
        assert_eq!(eskf.error_state(), before.error_state());
        assert_eq!(eskf.covariance(), before.covariance());

        // the clock still guards against older samples afterwards
        assert!(eskf.update(&at_rest(&cfg, 0.0)).is_err());
        let accel = Vector3::new(1.0, 0.0, cfg.earth.gravity_magnitude);
        let next = InertialSample::new(0.02, Vector3::zeros(), accel);
        eskf.update(&next).unwrap();
        before.update(&next).unwrap();
        assert_eq!(eskf.odometry(), before.odometry());
        assert!(eskf.odometry().0.translation.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn non_finite_observation_time_is_rejected_without_change() {
        let (cfg, mut eskf) = initialized();
        eskf.update(&at_rest(&cfg, 0.01)).unwrap();
        let before = eskf.clone();
        let observed = Pose::new(Rotation3::identity(), Vector3::new(0.01, 0.0, 0.0));
        for time in [f64::NAN, f64::INFINITY] {
            assert!(matches!(
                eskf.correct(&at_rest(&cfg, 0.01), time, &observed),
                Err(FilterError::StaleObservation { .. })
            ));
        }
        assert_eq!(eskf.odometry(), before.odometry());
        assert_eq!(eskf.error_state(), before.error_state());
        assert_eq!(eskf.covariance(), before.covariance());

        assert_eq!(eskf.correct(&at_rest(&cfg, 0.01), 0.015, &observed), Ok(()));
        assert!(eskf.covariance().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn constant_acceleration_integrates_trapezoidally() {
        let (cfg, mut eskf) = initialized();
        let accel = Vector3::new(1.0, 0.0, cfg.earth.gravity_magnitude);
        for k in 1..=10 {
            let sample = InertialSample::new(k as f64 * 0.1, Vector3::zeros(), accel);
            eskf.update(&sample).unwrap();
        }
        let (pose, velocity) = eskf.odometry();
        // the first step ramps up from the at-rest init sample
        assert_approx_eq!(velocity[0], 0.95, 1e-9);
        assert_approx_eq!(pose.translation[0], 0.0025 + 0.9 * (0.05 + 0.95) / 2.0, 1e-9);
        assert_approx_eq!(velocity[2], 0.0, 1e-9);
    }

    #[test]
    fn constant_rate_rotates_about_body_axis() {
        let (cfg, mut eskf) = initialized();
        let rate = Vector3::new(0.0, 0.0, 0.2);
        let g = Vector3::new(0.0, 0.0, cfg.earth.gravity_magnitude);
        for k in 1..=100 {
            eskf.update(&InertialSample::new(k as f64 * 0.01, rate, g)).unwrap();
        }
        let (pose, _) = eskf.odometry();
        // the init sample contributes half a step of zero rate
        assert_approx_eq!(pose.rotation.angle(), 0.2 - 0.001, 1e-9);
        assert!(orthonormality_error(pose.rotation.matrix()) < 1e-12);
    }

    #[test]
    fn self_consistent_correction_is_a_no_op() {
        let (cfg, mut eskf) = initialized();
        for k in 1..=5 {
            eskf.update(&at_rest(&cfg, k as f64 * 0.01)).unwrap();
        }
        let (pose, velocity) = eskf.odometry();
        let sample = at_rest(&cfg, 0.05);
        assert_eq!(eskf.correct(&sample, 0.055, &pose), Ok(()));
        let (corrected, corrected_velocity) = eskf.odometry();
        assert!((corrected.translation - pose.translation).norm() < 1e-9);
        assert!((corrected_velocity - velocity).norm() < 1e-9);
        for block in ErrorBlock::TRANSIENT {
            assert_eq!(eskf.error_state().block(block), Vector3::zeros());
        }
        // correct does not move the clock
        assert_eq!(eskf.time(), 0.05);
    }

    #[test]
    fn correction_pulls_towards_observation() {
        let (cfg, mut eskf) = initialized();
        eskf.update(&at_rest(&cfg, 0.01)).unwrap();
        let observed = Pose::new(
            Rotation3::from_axis_angle(&Vector3::z_axis(), 0.01),
            Vector3::new(0.2, 0.0, 0.0),
        );
        eskf.correct(&at_rest(&cfg, 0.01), 0.02, &observed).unwrap();
        let (pose, _) = eskf.odometry();
        assert!(pose.translation[0] > 0.0 && pose.translation[0] < 0.2);
        let (_, _, yaw) = pose.rotation.euler_angles();
        assert!(yaw > 0.0 && yaw < 0.01);
        assert!(orthonormality_error(pose.rotation.matrix()) < 1e-12);
        for block in ErrorBlock::TRANSIENT {
            assert_eq!(eskf.error_state().block(block), Vector3::zeros());
        }
        let p = eskf.covariance();
        assert_eq!(*p, p.transpose());
        assert!(p[(0, 0)] < cfg.covariance.prior.pos + 1e-3);
    }

    #[test]
    fn ill_conditioned_correction_is_rejected() {
        let mut cfg = config();
        cfg.covariance.prior = crate::config::PriorCovariance {
            pos: 0.0,
            vel: 0.0,
            orientation: 0.0,
            epsilon: 0.0,
            delta: 0.0,
        };
        cfg.covariance.process.gyro = 0.0;
        cfg.covariance.process.accel = 0.0;
        cfg.covariance.measurement.pos = 0.0;
        cfg.covariance.measurement.orientation = 0.0;
        let mut eskf = ErrorStateKalmanFilter::new(&cfg);
        eskf.init(Pose::identity(), Vector3::zeros(), &at_rest(&cfg, 0.0));
        eskf.update(&at_rest(&cfg, 0.01)).unwrap();
        let before = eskf.odometry();
        let observed = Pose::new(Rotation3::identity(), Vector3::new(1.0, 0.0, 0.0));
        let result = eskf.correct(&at_rest(&cfg, 0.01), 0.02, &observed);
        assert!(matches!(result, Err(FilterError::IllConditioned(_))));
        assert_eq!(eskf.odometry(), before);
        assert!(eskf.covariance().iter().all(|v| v.is_finite()));
        assert!(eskf.error_state().as_vector().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn unbiased_outputs() {
        let (cfg, mut eskf) = initialized();
        let mut x = *eskf.error_state().as_vector();
        x[ErrorBlock::GyroBias.offset()] = 0.01;
        x[ErrorBlock::AccelBias.offset() + 2] = 0.1;
        eskf.error = ErrorState::from(x);
        let w = eskf.unbiased_angular_vel(&Vector3::new(0.02, 0.0, 0.0));
        assert_approx_eq!(w[0], 0.01, 1e-15);
        let a = eskf.unbiased_linear_acc(
            &Vector3::new(0.0, 0.0, cfg.earth.gravity_magnitude + 0.1),
            &Matrix3::identity(),
        );
        assert!(a.norm() < 1e-12);
    }

    #[test]
    fn odometry_applies_pending_error_without_mutation() {
        let (_, mut eskf) = initialized();
        let mut error = ErrorState::zeros();
        error.set_block(ErrorBlock::Position, &Vector3::new(0.1, 0.0, 0.0));
        eskf.error = error;
        let snapshot = eskf.clone();
        let (pose, _) = eskf.odometry();
        assert_approx_eq!(pose.translation[0], -0.1);
        assert_eq!(eskf.error_state(), snapshot.error_state());
        assert_eq!(eskf.odometry(), snapshot.odometry());
    }
}
