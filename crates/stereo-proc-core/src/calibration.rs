//! Rectified camera models built from [CameraInfo] messages.

use crate::message::{CameraInfo, Header};
use eyre::{Result, ensure};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3, Vector4};

/// A single rectified pinhole camera.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCameraModel {
    header: Header,
    width: u32,
    height: u32,
    k: Matrix3<f64>,
    r: Matrix3<f64>,
    p: Matrix3x4<f64>,
    d: Vec<f64>,
}

impl PinholeCameraModel {
    pub fn from_camera_info(info: &CameraInfo) -> Self {
        Self {
            header: info.header.clone(),
            width: info.width,
            height: info.height,
            k: Matrix3::from_row_slice(&info.k),
            r: Matrix3::from_row_slice(&info.r),
            p: Matrix3x4::from_row_slice(&info.p),
            d: info.d.clone(),
        }
    }

    /// A camera counts as calibrated once its intrinsic focal length is
    /// set.
    pub fn is_calibrated(&self) -> bool {
        self.k[(0, 0)] != 0.0
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn intrinsic_matrix(&self) -> &Matrix3<f64> {
        &self.k
    }

    pub fn rotation_matrix(&self) -> &Matrix3<f64> {
        &self.r
    }

    pub fn projection_matrix(&self) -> &Matrix3x4<f64> {
        &self.p
    }

    pub fn distortion_coeffs(&self) -> &[f64] {
        &self.d
    }

    /// Rectified focal length along x.
    pub fn fx(&self) -> f64 {
        self.p[(0, 0)]
    }

    /// Rectified focal length along y.
    pub fn fy(&self) -> f64 {
        self.p[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.p[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.p[(1, 2)]
    }

    /// Translation term `-fx * baseline` of a right camera.
    pub fn tx(&self) -> f64 {
        self.p[(0, 3)]
    }
}

/// A rectified left/right camera pair and its disparity reprojection
/// matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCameraModel {
    left: PinholeCameraModel,
    right: PinholeCameraModel,
    baseline: f64,
    q: Matrix4<f64>,
}

impl StereoCameraModel {
    /// Builds the stereo model from a synchronized calibration pair.
    ///
    /// Fails if the two halves carry different timestamps, if either
    /// camera is uncalibrated, or if the right projection matrix does
    /// not encode a usable baseline.
    pub fn from_camera_info(left_info: &CameraInfo, right_info: &CameraInfo) -> Result<Self> {
        ensure!(
            left_info.header.stamp == right_info.header.stamp,
            "left and right calibration are from different instants ({:?} vs {:?})",
            left_info.header.stamp,
            right_info.header.stamp
        );

        let left = PinholeCameraModel::from_camera_info(left_info);
        let right = PinholeCameraModel::from_camera_info(right_info);
        ensure!(left.is_calibrated(), "left camera is not calibrated");
        ensure!(right.is_calibrated(), "right camera is not calibrated");
        ensure!(
            left.fx() != 0.0 && left.fy() != 0.0 && right.fx() != 0.0,
            "rectified projection matrices have zero focal length"
        );

        let baseline = -right.tx() / right.fx();
        ensure!(
            baseline.is_finite() && baseline != 0.0,
            "right projection matrix does not encode a stereo baseline"
        );

        // Q maps (u, v, d, 1) to homogeneous (X, Y, Z, W). Scaled by
        // fx * fy * Tx so that fx != fy is handled.
        let tx = -baseline;
        let mut q = Matrix4::zeros();
        q[(0, 0)] = left.fy() * tx;
        q[(0, 3)] = -left.fy() * left.cx() * tx;
        q[(1, 1)] = left.fx() * tx;
        q[(1, 3)] = -left.fx() * left.cy() * tx;
        q[(2, 3)] = left.fx() * left.fy() * tx;
        q[(3, 2)] = -left.fy();
        q[(3, 3)] = left.fy() * (left.cx() - right.cx());

        Ok(Self {
            left,
            right,
            baseline,
            q,
        })
    }

    pub fn left(&self) -> &PinholeCameraModel {
        &self.left
    }

    pub fn right(&self) -> &PinholeCameraModel {
        &self.right
    }

    /// Distance between the optical centers, in the units of the
    /// projection matrix translation.
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// The 4x4 matrix reprojecting (u, v, disparity, 1) into 3D.
    pub fn reprojection_matrix(&self) -> &Matrix4<f64> {
        &self.q
    }

    /// Depth of a point with the given disparity. Infinite for a
    /// disparity equal to the principal point offset.
    pub fn depth_from_disparity(&self, disparity: f64) -> f64 {
        let fx_baseline = -self.right.tx();
        fx_baseline / (disparity - (self.left.cx() - self.right.cx()))
    }

    /// Disparity observed for a point at the given depth.
    pub fn disparity_from_depth(&self, depth: f64) -> f64 {
        let fx_baseline = -self.right.tx();
        fx_baseline / depth + (self.left.cx() - self.right.cx())
    }

    /// Reprojects pixel (u, v) with disparity `d` into the left camera
    /// frame. Coordinates are non-finite when `d` maps to infinity.
    pub fn project_pixel(&self, u: f64, v: f64, d: f64) -> Vector3<f64> {
        let xyzw = self.q * Vector4::new(u, v, d, 1.0);
        xyzw.xyz() / xyzw.w
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    /// A 640x480 pair with f = 500 px, principal point (320, 240) and a
    /// 0.1 m baseline.
    pub(crate) fn camera_pair(stamp: Duration) -> (CameraInfo, CameraInfo) {
        let info = |tx: f64, frame_id: &str| CameraInfo {
            header: Header::new(stamp, frame_id),
            width: 640,
            height: 480,
            k: [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0],
            p: [
                500.0, 0.0, 320.0, tx, 0.0, 500.0, 240.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ..Default::default()
        };
        (info(0.0, "left"), info(-50.0, "right"))
    }

    #[test]
    fn test_stereo_model_baseline_and_depth() {
        let (left, right) = camera_pair(Duration::from_secs(1));
        let model = StereoCameraModel::from_camera_info(&left, &right).unwrap();

        assert!((model.baseline() - 0.1).abs() < 1e-12);
        // Z = f * B / d = 500 * 0.1 / 5
        assert!((model.depth_from_disparity(5.0) - 10.0).abs() < 1e-9);
        assert!((model.disparity_from_depth(10.0) - 5.0).abs() < 1e-9);
        assert!(model.depth_from_disparity(0.0).is_infinite());
    }

    #[test]
    fn test_project_pixel_matches_pinhole_geometry() {
        let (left, right) = camera_pair(Duration::from_secs(1));
        let model = StereoCameraModel::from_camera_info(&left, &right).unwrap();

        let point = model.project_pixel(420.0, 140.0, 5.0);
        assert!((point.z - 10.0).abs() < 1e-9);
        assert!((point.x - 2.0).abs() < 1e-9);
        assert!((point.y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_disparity_projects_to_infinity() {
        let (left, right) = camera_pair(Duration::from_secs(1));
        let model = StereoCameraModel::from_camera_info(&left, &right).unwrap();

        let point = model.project_pixel(100.0, 100.0, 0.0);
        assert!(!point.z.is_finite());
    }

    #[test]
    fn test_reject_uncalibrated_camera() {
        let (left, mut right) = camera_pair(Duration::from_secs(1));
        right.k = [0.0; 9];

        assert!(StereoCameraModel::from_camera_info(&left, &right).is_err());
    }

    #[test]
    fn test_reject_mismatched_stamps() {
        let (left, _) = camera_pair(Duration::from_secs(1));
        let (_, right) = camera_pair(Duration::from_secs(2));

        assert!(StereoCameraModel::from_camera_info(&left, &right).is_err());
    }

    #[test]
    fn test_reject_missing_baseline() {
        let (left, mut right) = camera_pair(Duration::from_secs(1));
        right.p[3] = 0.0;

        assert!(StereoCameraModel::from_camera_info(&left, &right).is_err());
    }
}
