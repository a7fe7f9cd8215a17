use glam::{Mat4, Quat, Vec3};

pub(crate) trait ConvertCoordinates {
    /// Converts from glTF's right-handed coordinates to the host's
    /// left-handed convention by mirroring across Z:
    /// - positions/normals/scales keep X and Y, negate Z
    /// - quaternions negate Z and W
    ///
    /// Triangle winding flips with the mirror; the mesh builder reverses
    /// each index triple to compensate.
    fn convert_coordinates(self) -> Self;
}

impl ConvertCoordinates for [f32; 3] {
    fn convert_coordinates(self) -> Self {
        [self[0], self[1], -self[2]]
    }
}

impl ConvertCoordinates for Vec3 {
    fn convert_coordinates(self) -> Self {
        Vec3::new(self.x, self.y, -self.z)
    }
}

impl ConvertCoordinates for [f32; 4] {
    /// Quaternion form: solution of q' = r q r* for the Z mirror.
    fn convert_coordinates(self) -> Self {
        [self[0], self[1], -self[2], -self[3]]
    }
}

impl ConvertCoordinates for Quat {
    fn convert_coordinates(self) -> Self {
        Quat::from_xyzw(self.x, self.y, -self.z, -self.w)
    }
}

impl ConvertCoordinates for Mat4 {
    /// Basis-change conjugation: C · M · C with C = diag(1, 1, -1, 1).
    fn convert_coordinates(self) -> Self {
        let c = Mat4::from_scale(Vec3::new(1.0, 1.0, -1.0));
        c * self * c
    }
}

/// Tangents carry a handedness sign in W, which flips with the mirror.
pub(crate) fn convert_tangent(tangent: [f32; 4]) -> [f32; 4] {
    [tangent[0], tangent[1], -tangent[2], -tangent[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_mirror_across_z() {
        assert_eq!([1.0, 2.0, 3.0].convert_coordinates(), [1.0, 2.0, -3.0]);
    }

    #[test]
    fn quaternions_negate_z_and_w() {
        assert_eq!(
            [0.1, 0.2, 0.3, 0.9].convert_coordinates(),
            [0.1, 0.2, -0.3, -0.9]
        );
    }

    #[test]
    fn converted_rotation_matches_converted_matrix() {
        let rotation = Quat::from_axis_angle(Vec3::new(1.0, 2.0, 3.0).normalize(), 0.7);
        let converted = Mat4::from_quat(rotation.convert_coordinates());
        let conjugated = Mat4::from_quat(rotation).convert_coordinates();
        for (a, b) in converted
            .to_cols_array()
            .iter()
            .zip(conjugated.to_cols_array().iter())
        {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
