//! Acceleration magnitude extraction.

use contracts::{MotionSample, Vec3};

/// Euclidean norm of an acceleration vector (g).
#[inline]
pub fn magnitude(accel: &Vec3) -> f32 {
    accel.norm()
}

/// Magnitude of a sample's acceleration; gyro and temperature are ignored.
#[inline]
pub fn sample_magnitude(sample: &MotionSample) -> f32 {
    magnitude(&sample.accel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_at_rest() {
        let accel = Vec3::new(0.0, 0.0, 1.0);
        assert!((magnitude(&accel) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_magnitude_ignores_gyro() {
        let mut sample = MotionSample::from_accel(0.6, 0.0, 0.8);
        sample.gyro = Some(Vec3::new(100.0, 200.0, 300.0));
        sample.temp_c = Some(36.5);
        assert!((sample_magnitude(&sample) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_magnitude_is_sign_agnostic() {
        let a = magnitude(&Vec3::new(-0.3, 0.4, -1.2));
        let b = magnitude(&Vec3::new(0.3, -0.4, 1.2));
        assert_eq!(a, b);
        assert!((a - 1.3).abs() < 1e-6);
    }
}
