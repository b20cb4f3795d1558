extern crate nalgebra as na;
use na::{DMatrix, DVector, Matrix6x2, Vector6};
use na::linalg::SVD;

use crate::control_error::ControlError;
use crate::kinematic_traits::{Joints, KinematicModel};
use crate::parameters::{BaseInput, DriveParameters};

/// Struct representing the combined arm + base Jacobian matrix
pub struct Jacobian {
    /// A 6x(N+2) matrix representing the Jacobian
    ///
    /// The Jacobian matrix maps the joint and base velocities to the end-effector velocities.
    /// The first N columns correspond to the arm joints, the last 2 to the base DOF.
    /// Rows are the linear (first 3) and angular (last 3) velocities of the end effector.
    matrix: DMatrix<f64>,

    /// Singular values below this are treated as zero when computing the pseudoinverse
    epsilon: f64,
}

impl Jacobian {
    /// Constructs the Jacobian for the current state of the robot.
    ///
    /// # Arguments
    ///
    /// * `model` - the kinematic model that supplies the arm Jacobian blocks
    /// * `joints` - the arm configuration
    /// * `drive` - the geometry of the differential drive base
    /// * `epsilon` - cutoff for small singular values
    ///
    /// # Returns
    ///
    /// A new instance of `Jacobian`, or an error if the model returned blocks of wrong shape.
    pub fn new(model: &impl KinematicModel, joints: &Joints, drive: &DriveParameters,
               epsilon: f64) -> Result<Self, ControlError> {
        let matrix = full_jacobian(model, joints, drive)?;
        Ok(Self { matrix, epsilon })
    }

    /// Wraps the already assembled 6x(N+2) matrix.
    pub fn from_matrix(matrix: DMatrix<f64>, epsilon: f64) -> Result<Self, ControlError> {
        if matrix.nrows() != 6 {
            return Err(ControlError::DimensionMismatch {
                what: "Jacobian rows", expected: 6, found: matrix.nrows() });
        }
        if matrix.ncols() < 2 {
            return Err(ControlError::DimensionMismatch {
                what: "Jacobian columns", expected: 2, found: matrix.ncols() });
        }
        Ok(Self { matrix, epsilon })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of arm joints (N)
    pub fn arm_dof(&self) -> usize {
        self.matrix.ncols() - 2
    }

    /// Computes the joint and base velocities required to achieve a desired end-effector
    /// velocity, using all columns.
    ///
    /// # Arguments
    ///
    /// * `desired_end_effector_velocity` - A 6D vector of the desired linear and angular velocity
    ///
    /// # Returns
    ///
    /// Stacked `[arm | base]` velocities. Rank deficient Jacobians are solved in the least
    /// squares sense.
    pub fn velocities_from_vector(&self, desired_end_effector_velocity: &Vector6<f64>)
                                  -> Result<DVector<f64>, ControlError> {
        let active = vec![true; self.arm_dof()];
        self.velocities_masked(desired_end_effector_velocity, &active)
    }

    /// Same as [Jacobian::velocities_from_vector], but only arm joints marked as active
    /// in `active_arm` may move. The velocity of inactive joints is exactly zero. The
    /// canonical matrix is not modified; the base columns are always active.
    pub fn velocities_masked(&self, desired_end_effector_velocity: &Vector6<f64>,
                             active_arm: &[bool]) -> Result<DVector<f64>, ControlError> {
        let n = self.arm_dof();
        if active_arm.len() != n {
            return Err(ControlError::DimensionMismatch {
                what: "active joint mask", expected: n, found: active_arm.len() });
        }
        let columns: Vec<usize> = (0..n)
            .filter(|&i| active_arm[i])
            .chain([n, n + 1])
            .collect();

        let reduced = self.matrix.select_columns(columns.iter());
        let reduced_inverse = pseudo_inverse(&reduced, self.epsilon)?;
        let reduced_velocities = reduced_inverse * desired_end_effector_velocity;

        let mut velocities = DVector::zeros(n + 2);
        for (k, &column) in columns.iter().enumerate() {
            velocities[column] = reduced_velocities[k];
        }
        Ok(velocities)
    }

    /// End effector velocity that results from the given stacked `[arm | base]` velocities.
    pub fn twist(&self, velocities: &DVector<f64>) -> Vector6<f64> {
        let product = &self.matrix * velocities;
        Vector6::from_iterator(product.iter().copied())
    }
}

/// Moore-Penrose pseudoinverse computed through SVD. Singular values below `epsilon`
/// are treated as zero, so singular matrices produce the least squares solution.
pub fn pseudo_inverse(matrix: &DMatrix<f64>, epsilon: f64) -> Result<DMatrix<f64>, ControlError> {
    let svd = SVD::new(matrix.clone(), true, true);
    svd.pseudo_inverse(epsilon).map_err(ControlError::Pseudoinverse)
}

/// Stacks the linear and angular velocity blocks supplied by the kinematic model into the
/// 6xN arm Jacobian.
pub fn arm_jacobian(model: &impl KinematicModel, joints: &Joints) -> Result<DMatrix<f64>, ControlError> {
    let n = model.dof();
    if joints.len() != n {
        return Err(ControlError::DimensionMismatch { what: "arm joints", expected: n, found: joints.len() });
    }
    let (linear, angular) = model.arm_jacobian_blocks(joints);
    for block in [&linear, &angular] {
        if block.nrows() != 3 {
            return Err(ControlError::DimensionMismatch { what: "Jacobian block rows", expected: 3, found: block.nrows() });
        }
        if block.ncols() != n {
            return Err(ControlError::DimensionMismatch { what: "Jacobian block columns", expected: n, found: block.ncols() });
        }
    }

    let mut jacobian = DMatrix::zeros(6, n);
    jacobian.view_mut((0, 0), (3, n)).copy_from(&linear);
    jacobian.view_mut((3, 0), (3, n)).copy_from(&angular);
    Ok(jacobian)
}

/// Differential drive Jacobian mapping the 2 base DOF to the planar twist
/// `[v_x, 0, 0, 0, 0, omega_z]` of the base.
///
/// For [BaseInput::WheelRates] with wheel radius `r` and axle length `l`, left and right
/// wheel rates give `v_x = r/2 (left + right)` and `omega_z = r/l (right - left)`.
/// For [BaseInput::Twist] the inputs are `v_x` and `omega_z` themselves.
pub fn base_jacobian(drive: &DriveParameters) -> Matrix6x2<f64> {
    match drive.input {
        BaseInput::WheelRates => {
            let r = drive.wheel_radius;
            let l = drive.axle_length;
            Matrix6x2::new(
                r / 2.0, r / 2.0,
                0.0, 0.0,
                0.0, 0.0,
                0.0, 0.0,
                0.0, 0.0,
                -r / l, r / l,
            )
        }
        BaseInput::Twist => Matrix6x2::new(
            1.0, 0.0,
            0.0, 0.0,
            0.0, 0.0,
            0.0, 0.0,
            0.0, 0.0,
            0.0, 1.0,
        ),
    }
}

/// The full 6x(N+2) Jacobian `[arm | base]`.
pub fn full_jacobian(model: &impl KinematicModel, joints: &Joints, drive: &DriveParameters)
                     -> Result<DMatrix<f64>, ControlError> {
    let arm = arm_jacobian(model, joints)?;
    let n = arm.ncols();
    let mut jacobian = DMatrix::zeros(6, n + 2);
    jacobian.view_mut((0, 0), (6, n)).copy_from(&arm);
    jacobian.view_mut((0, n), (6, 2)).copy_from(&base_jacobian(drive));
    Ok(jacobian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic_traits::{Limits, Transform, VelocityLimits};
    use crate::parameters::Parameters;

    const EPSILON: f64 = 1e-6;

    /// Arm with 3 prismatic joints along x, y, z and 3 rotary joints around x, y, z,
    /// all acting directly on the end effector.
    pub struct CartesianArm;

    impl KinematicModel for CartesianArm {
        fn dof(&self) -> usize {
            6
        }

        fn arm_jacobian_blocks(&self, _joints: &Joints) -> (DMatrix<f64>, DMatrix<f64>) {
            let mut linear = DMatrix::zeros(3, 6);
            let mut angular = DMatrix::zeros(3, 6);
            for i in 0..3 {
                linear[(i, i)] = 1.0;
                angular[(i, i + 3)] = 1.0;
            }
            (linear, angular)
        }

        fn end_effector_transform(&self) -> Transform {
            Transform::identity()
        }

        fn base_transform(&self) -> Transform {
            Transform::identity()
        }

        fn joint_limits(&self) -> Limits {
            Limits::unbounded(6)
        }

        fn velocity_limits(&self) -> VelocityLimits {
            Limits::unbounded(6)
        }

        fn active_joint_values(&self) -> Joints {
            Joints::zeros(6)
        }
    }

    fn assert_matrix_approx_eq(left: &DMatrix<f64>, right: &DMatrix<f64>, epsilon: f64) {
        assert_eq!(left.shape(), right.shape());
        for i in 0..left.nrows() {
            for j in 0..left.ncols() {
                assert!((left[(i, j)] - right[(i, j)]).abs() < epsilon, "left[{0},{1}] = {2} is not approximately equal to right[{0},{1}] = {3}", i, j, left[(i, j)], right[(i, j)]);
            }
        }
    }

    #[test]
    fn test_base_jacobian_wheel_rates() {
        let drive = Parameters::fetch().drive;
        let jacobian = base_jacobian(&drive);
        assert_eq!(jacobian[(0, 0)], 0.0125 / 2.0);
        assert_eq!(jacobian[(0, 1)], 0.0125 / 2.0);
        assert_eq!(jacobian[(5, 0)], -0.0125 / 0.37476);
        assert_eq!(jacobian[(5, 1)], 0.0125 / 0.37476);
        for row in 1..5 {
            assert_eq!(jacobian[(row, 0)], 0.0);
            assert_eq!(jacobian[(row, 1)], 0.0);
        }
    }

    #[test]
    fn test_full_jacobian_layout() {
        let drive = Parameters::fetch().drive;
        let jacobian = full_jacobian(&CartesianArm, &Joints::zeros(6), &drive).unwrap();
        assert_eq!(jacobian.shape(), (6, 8));
        let mut expected = DMatrix::zeros(6, 8);
        for i in 0..6 {
            expected[(i, i)] = 1.0;
        }
        expected.view_mut((0, 6), (6, 2)).copy_from(&base_jacobian(&drive));
        assert_matrix_approx_eq(&jacobian, &expected, 1e-15);
    }

    #[test]
    fn test_wrong_joint_count() {
        let drive = Parameters::fetch().drive;
        let result = full_jacobian(&CartesianArm, &Joints::zeros(4), &drive);
        assert!(matches!(result, Err(ControlError::DimensionMismatch { expected: 6, found: 4, .. })));
    }

    #[test]
    fn test_velocities_reconstruct_twist() {
        let drive = Parameters::unicycle().drive;
        let jacobian = Jacobian::new(&CartesianArm, &Joints::zeros(6), &drive, 1e-10).unwrap();
        let desired = Vector6::new(0.1, -0.2, 0.3, 0.01, 0.02, -0.03);
        let velocities = jacobian.velocities_from_vector(&desired).unwrap();
        let twist = jacobian.twist(&velocities);
        for i in 0..6 {
            assert!((twist[i] - desired[i]).abs() < EPSILON);
        }
    }

    #[test]
    fn test_masked_joint_does_not_move() {
        let drive = Parameters::unicycle().drive;
        let jacobian = Jacobian::new(&CartesianArm, &Joints::zeros(6), &drive, 1e-10).unwrap();
        let desired = Vector6::new(0.1, 0.0, 0.0, 0.0, 0.0, 0.0);
        let mut active = vec![true; 6];
        active[0] = false;
        let velocities = jacobian.velocities_masked(&desired, &active).unwrap();
        assert_eq!(velocities[0], 0.0);
        // Forward motion is taken over by the base (forward speed input)
        assert!((velocities[6] - 0.1).abs() < EPSILON);
        let twist = jacobian.twist(&velocities);
        assert!((twist[0] - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_singular_is_least_squares() {
        // All columns zero except one: the rank is 1, no error expected
        let mut matrix = DMatrix::zeros(6, 3);
        matrix[(0, 0)] = 2.0;
        let jacobian = Jacobian::from_matrix(matrix, 1e-10).unwrap();
        let desired = Vector6::new(1.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        let velocities = jacobian.velocities_from_vector(&desired).unwrap();
        assert!((velocities[0] - 0.5).abs() < EPSILON);
        assert!(velocities[1].abs() < EPSILON);
        assert!(velocities[2].abs() < EPSILON);
    }

    #[test]
    fn test_pseudo_inverse_of_invertible() {
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let inverse = pseudo_inverse(&matrix, 1e-12).unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.25]);
        assert_matrix_approx_eq(&inverse, &expected, 1e-12);
    }
}
