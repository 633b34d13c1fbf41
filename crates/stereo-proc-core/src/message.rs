//! Sensor message types flowing through the stereo pipeline.
//!
//! The layouts follow the common robotics conventions: images carry a
//! string encoding tag and a row stride in bytes, camera calibration
//! carries row-major K/R/P matrices, and point clouds are a flat byte
//! buffer described by a list of fields.

use crate::types::WithTimestamp;
use eyre::{Result, ensure};
use std::{fmt, str::FromStr, time::Duration};

/// Missing-value marker stored in disparity images for pixels where
/// no stereo match was found.
pub const MISSING_DISPARITY: f32 = f32::NEG_INFINITY;

/// Timestamp and coordinate frame shared by every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub stamp: Duration,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Duration, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// Pixel encoding tag of an [Image].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
    Mono8,
    Mono16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    BayerRggb8,
    BayerBggr8,
    BayerGbrg8,
    BayerGrbg8,
    /// Single channel 32-bit float, used for disparity.
    Float32,
    Other(String),
}

impl Encoding {
    pub fn as_str(&self) -> &str {
        match self {
            Encoding::Mono8 => "mono8",
            Encoding::Mono16 => "mono16",
            Encoding::Rgb8 => "rgb8",
            Encoding::Bgr8 => "bgr8",
            Encoding::Rgba8 => "rgba8",
            Encoding::Bgra8 => "bgra8",
            Encoding::BayerRggb8 => "bayer_rggb8",
            Encoding::BayerBggr8 => "bayer_bggr8",
            Encoding::BayerGbrg8 => "bayer_gbrg8",
            Encoding::BayerGrbg8 => "bayer_grbg8",
            Encoding::Float32 => "32FC1",
            Encoding::Other(name) => name,
        }
    }

    /// Bytes per pixel, if the encoding is known.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        let bpp = match self {
            Encoding::Mono8
            | Encoding::BayerRggb8
            | Encoding::BayerBggr8
            | Encoding::BayerGbrg8
            | Encoding::BayerGrbg8 => 1,
            Encoding::Mono16 => 2,
            Encoding::Rgb8 | Encoding::Bgr8 => 3,
            Encoding::Rgba8 | Encoding::Bgra8 | Encoding::Float32 => 4,
            Encoding::Other(_) => return None,
        };
        Some(bpp)
    }

    /// Number of channels, if the encoding is known. Bayer mosaics
    /// count as one.
    pub fn channels(&self) -> Option<usize> {
        let channels = match self {
            Encoding::Mono8
            | Encoding::Mono16
            | Encoding::Float32
            | Encoding::BayerRggb8
            | Encoding::BayerBggr8
            | Encoding::BayerGbrg8
            | Encoding::BayerGrbg8 => 1,
            Encoding::Rgb8 | Encoding::Bgr8 => 3,
            Encoding::Rgba8 | Encoding::Bgra8 => 4,
            Encoding::Other(_) => return None,
        };
        Some(channels)
    }

    pub fn is_bayer(&self) -> bool {
        matches!(
            self,
            Encoding::BayerRggb8 | Encoding::BayerBggr8 | Encoding::BayerGbrg8 | Encoding::BayerGrbg8
        )
    }

    pub fn is_color(&self) -> bool {
        matches!(
            self,
            Encoding::Rgb8 | Encoding::Bgr8 | Encoding::Rgba8 | Encoding::Bgra8
        ) || self.is_bayer()
    }
}

impl FromStr for Encoding {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoding = match s {
            "mono8" => Encoding::Mono8,
            "mono16" => Encoding::Mono16,
            "rgb8" => Encoding::Rgb8,
            "bgr8" => Encoding::Bgr8,
            "rgba8" => Encoding::Rgba8,
            "bgra8" => Encoding::Bgra8,
            "bayer_rggb8" => Encoding::BayerRggb8,
            "bayer_bggr8" => Encoding::BayerBggr8,
            "bayer_gbrg8" => Encoding::BayerGbrg8,
            "bayer_grbg8" => Encoding::BayerGrbg8,
            "32FC1" => Encoding::Float32,
            other => Encoding::Other(other.to_string()),
        };
        Ok(encoding)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image with a row stride in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub encoding: Encoding,
    /// Full row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Wraps tightly packed pixel data, checking the buffer length.
    pub fn new(
        header: Header,
        width: u32,
        height: u32,
        encoding: Encoding,
        data: Vec<u8>,
    ) -> Result<Self> {
        let Some(bpp) = encoding.bytes_per_pixel() else {
            eyre::bail!("cannot infer the row stride of encoding '{encoding}'");
        };
        let step = width * bpp as u32;
        ensure!(
            data.len() == step as usize * height as usize,
            "expected {} bytes for a {width}x{height} {encoding} image, got {}",
            step as usize * height as usize,
            data.len()
        );

        Ok(Self {
            header,
            width,
            height,
            encoding,
            step,
            data,
        })
    }

    /// Builds a `32FC1` image from row-major float values.
    pub fn from_f32(header: Header, width: u32, height: u32, values: &[f32]) -> Result<Self> {
        ensure!(
            values.len() == width as usize * height as usize,
            "expected {} values for a {width}x{height} grid, got {}",
            width as usize * height as usize,
            values.len()
        );
        let data: Vec<u8> = bytemuck::cast_slice(values).to_vec();
        Self::new(header, width, height, Encoding::Float32, data)
    }

    /// Checks that the stride and buffer can hold `height` rows of
    /// `width` pixels.
    pub fn validate(&self) -> Result<()> {
        if let Some(bpp) = self.encoding.bytes_per_pixel() {
            ensure!(
                self.step as usize >= self.width as usize * bpp,
                "row stride {} is shorter than {} pixels of {}",
                self.step,
                self.width,
                self.encoding
            );
        }
        ensure!(
            self.data.len() >= self.step as usize * self.height as usize,
            "image buffer holds {} bytes, {} rows of {} bytes expected",
            self.data.len(),
            self.height,
            self.step
        );
        Ok(())
    }

    /// The bytes of row `v`, including any stride padding.
    pub fn row(&self, v: u32) -> &[u8] {
        let start = v as usize * self.step as usize;
        &self.data[start..start + self.step as usize]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Calibration of a single camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    /// Distortion coefficients.
    pub d: Vec<f64>,
    /// Intrinsic matrix, row-major 3x3.
    pub k: [f64; 9],
    /// Rectification rotation, row-major 3x3.
    pub r: [f64; 9],
    /// Projection matrix of the rectified camera, row-major 3x4.
    pub p: [f64; 12],
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            header: Header::default(),
            width: 0,
            height: 0,
            distortion_model: "plumb_bob".to_string(),
            d: Vec::new(),
            k: [0.0; 9],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [0.0; 12],
        }
    }
}

/// A disparity map aligned with the rectified left image.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityImage {
    pub header: Header,
    /// `32FC1` grid of disparities; unmatched pixels hold
    /// [MISSING_DISPARITY].
    pub image: Image,
    /// Focal length in pixels.
    pub f: f32,
    /// Stereo baseline in world units.
    pub t: f32,
    /// Smallest disparity searched.
    pub min_disparity: f32,
    /// Largest disparity searched.
    pub max_disparity: f32,
    /// Smallest achievable disparity increment.
    pub delta_d: f32,
}

impl DisparityImage {
    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// Checks that the grid is a readable `32FC1` image.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.image.encoding == Encoding::Float32,
            "disparity must be encoded as 32FC1, got {}",
            self.image.encoding
        );
        self.image.validate()
    }

    /// Disparity at pixel (u, v). The grid must have been validated.
    pub fn at(&self, u: u32, v: u32) -> f32 {
        let row = self.image.row(v);
        let offset = u as usize * size_of::<f32>();
        bytemuck::pod_read_unaligned(&row[offset..offset + size_of::<f32>()])
    }
}

/// Datatype tags of a [PointField].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PointFieldType {
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Float32 = 7,
    Float64 = 8,
}

/// Describes one named field inside a point record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: PointFieldType,
    pub count: u32,
}

impl PointField {
    pub fn new(name: &str, offset: u32, datatype: PointFieldType) -> Self {
        Self {
            name: name.to_string(),
            offset,
            datatype,
            count: 1,
        }
    }
}

/// A dense, organized point cloud stored as fixed-size records.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud2 {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    /// Length of one point record in bytes.
    pub point_step: u32,
    /// Length of one row in bytes.
    pub row_step: u32,
    pub data: Vec<u8>,
    /// False when the cloud may contain invalid points.
    pub is_dense: bool,
}

impl PointCloud2 {
    /// Byte range of the record for pixel (u, v).
    pub fn point_bytes(&self, u: u32, v: u32) -> &[u8] {
        let start = v as usize * self.row_step as usize + u as usize * self.point_step as usize;
        &self.data[start..start + self.point_step as usize]
    }
}

/// The legacy unorganized point list: valid points only, with one
/// `rgb` channel value per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparsePointCloud {
    pub header: Header,
    pub points: Vec<[f32; 3]>,
    /// Packed RGB per point, reinterpreted as a float.
    pub rgb: Vec<f32>,
}

impl SparsePointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Any input the stereo nodes synchronize on.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Image(Image),
    CameraInfo(CameraInfo),
    Disparity(DisparityImage),
}

impl Frame {
    pub fn header(&self) -> &Header {
        match self {
            Frame::Image(image) => &image.header,
            Frame::CameraInfo(info) => &info.header,
            Frame::Disparity(disparity) => &disparity.header,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Frame::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_camera_info(&self) -> Option<&CameraInfo> {
        match self {
            Frame::CameraInfo(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_disparity(&self) -> Option<&DisparityImage> {
        match self {
            Frame::Disparity(disparity) => Some(disparity),
            _ => None,
        }
    }
}

impl WithTimestamp for Frame {
    fn timestamp(&self) -> Duration {
        self.header().stamp
    }
}

impl From<Image> for Frame {
    fn from(image: Image) -> Self {
        Frame::Image(image)
    }
}

impl From<CameraInfo> for Frame {
    fn from(info: CameraInfo) -> Self {
        Frame::CameraInfo(info)
    }
}

impl From<DisparityImage> for Frame {
    fn from(disparity: DisparityImage) -> Self {
        Frame::Disparity(disparity)
    }
}
