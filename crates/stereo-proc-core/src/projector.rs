//! Reprojection of a disparity grid into 3D points.

use crate::{
    calibration::StereoCameraModel,
    message::{DisparityImage, MISSING_DISPARITY},
};
use eyre::{Result, WrapErr};
use itertools::iproduct;

/// One reprojected pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub valid: bool,
}

impl Point3 {
    pub const INVALID: Point3 = Point3 {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
        valid: false,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            valid: true,
        }
    }
}

/// A row-major grid of reprojected points shaped like the disparity
/// grid it came from.
///
/// The buffer may be reused across tuples. Its allocation is kept and
/// only re-sized when the grid shape changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointBuffer {
    width: u32,
    height: u32,
    points: Vec<Point3>,
}

impl PointBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut buffer = Self::default();
        buffer.resize(width, height);
        buffer
    }

    /// Re-shapes the grid, resetting every point to invalid.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.points.clear();
        self.points
            .resize(width as usize * height as usize, Point3::INVALID);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, u: u32, v: u32) -> &Point3 {
        &self.points[self.index(u, v)]
    }

    pub fn get_mut(&mut self, u: u32, v: u32) -> &mut Point3 {
        let index = self.index(u, v);
        &mut self.points[index]
    }

    /// Points in row-major order.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|point| point.valid).count()
    }

    fn index(&self, u: u32, v: u32) -> usize {
        assert!(
            u < self.width && v < self.height,
            "pixel ({u}, {v}) outside a {}x{} grid",
            self.width,
            self.height
        );
        v as usize * self.width as usize + u as usize
    }
}

/// Whether a disparity value marks a pixel without a stereo match.
pub fn is_missing_disparity(disparity: f32) -> bool {
    disparity == MISSING_DISPARITY || !disparity.is_finite()
}

/// Turns a disparity grid into a [PointBuffer] through the reprojection
/// matrix of a [StereoCameraModel].
///
/// A point is invalid when its disparity is missing or when any of its
/// projected coordinates is not finite, e.g. a zero disparity mapping
/// to infinite depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisparityProjector;

impl DisparityProjector {
    pub fn new() -> Self {
        Self
    }

    /// Projects into a caller-owned buffer, re-sizing it to the grid.
    pub fn project_into(
        &self,
        disparity: &DisparityImage,
        model: &StereoCameraModel,
        points: &mut PointBuffer,
    ) -> Result<()> {
        disparity
            .validate()
            .wrap_err("unreadable disparity image")?;

        let (width, height) = (disparity.width(), disparity.height());
        if (points.width(), points.height()) != (width, height) {
            points.resize(width, height);
        }

        for (v, u) in iproduct!(0..height, 0..width) {
            let d = disparity.at(u, v);
            let point = if is_missing_disparity(d) {
                Point3::INVALID
            } else {
                let xyz = model.project_pixel(u as f64, v as f64, d as f64).cast::<f32>();
                if xyz.iter().all(|c| c.is_finite()) {
                    Point3::new(xyz.x, xyz.y, xyz.z)
                } else {
                    Point3::INVALID
                }
            };
            *points.get_mut(u, v) = point;
        }

        Ok(())
    }

    /// Projects into a freshly allocated buffer.
    pub fn project(
        &self,
        disparity: &DisparityImage,
        model: &StereoCameraModel,
    ) -> Result<PointBuffer> {
        let mut points = PointBuffer::default();
        self.project_into(disparity, model, &mut points)?;
        Ok(points)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        calibration::tests::camera_pair,
        message::{Header, Image},
    };
    use std::time::Duration;

    pub(crate) fn disparity_grid(width: u32, height: u32, values: &[f32]) -> DisparityImage {
        let header = Header::new(Duration::from_secs(1), "left_optical");
        DisparityImage {
            header: header.clone(),
            image: Image::from_f32(header, width, height, values).unwrap(),
            f: 500.0,
            t: 0.1,
            min_disparity: 0.0,
            max_disparity: 64.0,
            delta_d: 0.0625,
        }
    }

    pub(crate) fn stereo_model() -> StereoCameraModel {
        let (left, right) = camera_pair(Duration::from_secs(1));
        StereoCameraModel::from_camera_info(&left, &right).unwrap()
    }

    #[test]
    fn test_invalid_iff_missing_or_non_finite() {
        let model = stereo_model();
        let values = [
            5.0,
            MISSING_DISPARITY,
            0.0,
            f32::NAN,
            2.0,
            f32::INFINITY,
            -3.0,
            64.0,
        ];
        let disparity = disparity_grid(4, 2, &values);

        let points = DisparityProjector::new()
            .project(&disparity, &model)
            .unwrap();

        for (index, (&d, point)) in values.iter().zip(points.points()).enumerate() {
            let (u, v) = (index as u32 % 4, index as u32 / 4);
            let projected = model.project_pixel(u as f64, v as f64, d as f64);
            let expected_valid = !is_missing_disparity(d)
                && projected.iter().all(|c| (*c as f32).is_finite());

            assert_eq!(point.valid, expected_valid, "pixel {index} with d = {d}");
            if point.valid {
                assert!(point.x.is_finite() && point.y.is_finite() && point.z.is_finite());
            } else {
                assert!(point.x.is_nan() && point.y.is_nan() && point.z.is_nan());
            }
        }

        // zero disparity maps to infinite depth
        assert!(!points.get(2, 0).valid);
        assert!(points.get(0, 0).valid);
        assert!(points.get(3, 1).valid);
        assert_eq!(points.valid_count(), 4);
    }

    #[test]
    fn test_depth_follows_disparity() {
        let model = stereo_model();
        let disparity = disparity_grid(2, 1, &[5.0, 2.0]);

        let points = DisparityProjector::new()
            .project(&disparity, &model)
            .unwrap();

        // Z = f * B / d
        assert!((points.get(0, 0).z - 10.0).abs() < 1e-4);
        assert!((points.get(1, 0).z - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_project_into_resizes_scratch() {
        let model = stereo_model();
        let projector = DisparityProjector::new();
        let mut scratch = PointBuffer::new(8, 8);

        projector
            .project_into(&disparity_grid(2, 2, &[5.0; 4]), &model, &mut scratch)
            .unwrap();
        assert_eq!((scratch.width(), scratch.height()), (2, 2));
        assert_eq!(scratch.len(), 4);

        projector
            .project_into(&disparity_grid(3, 1, &[5.0; 3]), &model, &mut scratch)
            .unwrap();
        assert_eq!((scratch.width(), scratch.height()), (3, 1));
        assert_eq!(scratch.valid_count(), 3);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let model = stereo_model();
        let disparity = disparity_grid(2, 2, &[5.0, MISSING_DISPARITY, 2.0, 5.0]);
        let projector = DisparityProjector::new();

        let first = projector.project(&disparity, &model).unwrap();
        let second = projector.project(&disparity, &model).unwrap();

        for (a, b) in first.points().iter().zip(second.points()) {
            assert_eq!(a.valid, b.valid);
            assert_eq!(a.x.to_bits(), b.x.to_bits());
            assert_eq!(a.y.to_bits(), b.y.to_bits());
            assert_eq!(a.z.to_bits(), b.z.to_bits());
        }
    }

    #[test]
    fn test_reject_non_float_disparity() {
        let model = stereo_model();
        let mut disparity = disparity_grid(2, 1, &[5.0, 5.0]);
        disparity.image.encoding = crate::message::Encoding::Mono16;

        assert!(
            DisparityProjector::new()
                .project(&disparity, &model)
                .is_err()
        );
    }
}
