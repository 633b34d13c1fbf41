//! Packing of reprojected points and their color into [PointCloud2]
//! records.
//!
//! Every pixel of the grid becomes one 16 byte record:
//!
//! | offset | field | type    |
//! |--------|-------|---------|
//! | 0      | x     | float32 |
//! | 4      | y     | float32 |
//! | 8      | z     | float32 |
//! | 12     | rgb   | packed  |
//!
//! The `rgb` slot holds `r << 16 | g << 8 | b` and is declared as a
//! float32 field, the way point cloud viewers expect it. Invalid points
//! are kept in place with NaN in all four slots, so the cloud is never
//! dense.

use crate::{
    message::{Encoding, Header, Image, PointCloud2, PointField, PointFieldType, SparsePointCloud},
    projector::PointBuffer,
    throttle::Throttle,
};
use bytemuck::{Pod, Zeroable};
use eyre::{Result, WrapErr, ensure};
use itertools::iproduct;
use std::time::Duration;
use tracing::warn;

/// Size of one encoded point in bytes.
pub const POINT_STEP: u32 = size_of::<PointRecord>() as u32;

/// Default interval between unrecognized encoding warnings.
pub const ENCODING_WARNING_INTERVAL: Duration = Duration::from_secs(30);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PointRecord {
    x: f32,
    y: f32,
    z: f32,
    rgb: u32,
}

impl PointRecord {
    const INVALID: PointRecord = PointRecord {
        x: f32::NAN,
        y: f32::NAN,
        z: f32::NAN,
        rgb: f32::NAN.to_bits(),
    };
}

/// Packs 8-bit channels into the low three bytes.
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Field descriptors of the record layout.
pub fn point_fields() -> Vec<PointField> {
    vec![
        PointField::new("x", 0, PointFieldType::Float32),
        PointField::new("y", 4, PointFieldType::Float32),
        PointField::new("z", 8, PointFieldType::Float32),
        PointField::new("rgb", 12, PointFieldType::Float32),
    ]
}

/// Color layouts the encoder knows how to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorLayout {
    Mono8,
    Rgb8,
    Bgr8,
}

impl ColorLayout {
    fn of(encoding: &Encoding) -> Option<Self> {
        match encoding {
            Encoding::Mono8 => Some(ColorLayout::Mono8),
            Encoding::Rgb8 => Some(ColorLayout::Rgb8),
            Encoding::Bgr8 => Some(ColorLayout::Bgr8),
            _ => None,
        }
    }

    fn sample(self, image: &Image, u: u32, v: u32) -> u32 {
        let row = image.row(v);
        let u = u as usize;
        match self {
            ColorLayout::Mono8 => {
                let g = row[u];
                pack_rgb(g, g, g)
            }
            ColorLayout::Rgb8 => {
                let px = &row[u * 3..u * 3 + 3];
                pack_rgb(px[0], px[1], px[2])
            }
            ColorLayout::Bgr8 => {
                let px = &row[u * 3..u * 3 + 3];
                pack_rgb(px[2], px[1], px[0])
            }
        }
    }
}

/// Serializes a [PointBuffer] and a color image into a [PointCloud2].
#[derive(Debug, Clone)]
pub struct PointCloudEncoder {
    encoding_warning: Throttle,
}

impl Default for PointCloudEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PointCloudEncoder {
    pub fn new() -> Self {
        Self::with_warning_interval(ENCODING_WARNING_INTERVAL)
    }

    pub fn with_warning_interval(interval: Duration) -> Self {
        Self {
            encoding_warning: Throttle::new(interval),
        }
    }

    /// Encodes one record per grid pixel in row-major order.
    ///
    /// The color image must have the grid's shape. Its `mono8`, `rgb8`
    /// or `bgr8` pixels are packed into the `rgb` slot of valid points.
    /// With any other encoding the geometry is still written, no color
    /// byte is, and a rate-limited warning is logged.
    pub fn encode(
        &mut self,
        points: &PointBuffer,
        color: &Image,
        header: &Header,
    ) -> Result<PointCloud2> {
        self.check_color(points, color)?;
        let layout = self.layout(&color.encoding);

        let (width, height) = (points.width(), points.height());
        let mut data = Vec::with_capacity(points.len() * POINT_STEP as usize);

        for (v, u) in iproduct!(0..height, 0..width) {
            let point = points.get(u, v);
            let record = if point.valid {
                PointRecord {
                    x: point.x,
                    y: point.y,
                    z: point.z,
                    rgb: layout.map_or(0, |layout| layout.sample(color, u, v)),
                }
            } else if layout.is_some() {
                PointRecord::INVALID
            } else {
                PointRecord {
                    rgb: 0,
                    ..PointRecord::INVALID
                }
            };
            data.extend_from_slice(bytemuck::bytes_of(&record));
        }

        Ok(PointCloud2 {
            header: header.clone(),
            height,
            width,
            fields: point_fields(),
            is_bigendian: cfg!(target_endian = "big"),
            point_step: POINT_STEP,
            row_step: POINT_STEP * width,
            data,
            is_dense: false,
        })
    }

    /// Collects the valid points into the legacy sparse list.
    ///
    /// Color is packed like [encode](Self::encode) and stored as the
    /// float with the same bits. With an unrecognized encoding the
    /// color channel is left empty.
    pub fn encode_sparse(
        &mut self,
        points: &PointBuffer,
        color: &Image,
        header: &Header,
    ) -> Result<SparsePointCloud> {
        self.check_color(points, color)?;
        let layout = self.layout(&color.encoding);

        let mut cloud = SparsePointCloud {
            header: header.clone(),
            ..Default::default()
        };

        for (v, u) in iproduct!(0..points.height(), 0..points.width()) {
            let point = points.get(u, v);
            if !point.valid {
                continue;
            }
            cloud.points.push([point.x, point.y, point.z]);
            if let Some(layout) = layout {
                cloud.rgb.push(f32::from_bits(layout.sample(color, u, v)));
            }
        }

        Ok(cloud)
    }

    fn check_color(&self, points: &PointBuffer, color: &Image) -> Result<()> {
        ensure!(
            color.dimensions() == (points.width(), points.height()),
            "color image is {}x{} but the disparity grid is {}x{}",
            color.width,
            color.height,
            points.width(),
            points.height()
        );
        color.validate().wrap_err("unreadable color image")?;
        Ok(())
    }

    fn layout(&mut self, encoding: &Encoding) -> Option<ColorLayout> {
        let layout = ColorLayout::of(encoding);
        if layout.is_none() && self.encoding_warning.ready() {
            warn!(
                %encoding,
                "Could not fill color channel of the point cloud, unrecognized encoding"
            );
        }
        layout
    }
}
