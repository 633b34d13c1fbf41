//! Demand-driven processing of a raw stereo pair.
//!
//! The image operations themselves (debayering, rectification and block
//! matching) live behind [StereoBackend]. The pipeline only decides
//! which of them must run for a given [OutputDemand] and chains their
//! results into disparity and point clouds.

use crate::{
    calibration::{PinholeCameraModel, StereoCameraModel},
    demand::OutputDemand,
    encoder::PointCloudEncoder,
    message::{DisparityImage, Image, PointCloud2, SparsePointCloud},
    params::StereoParams,
    projector::{DisparityProjector, PointBuffer},
};
use eyre::{Result, WrapErr, bail};
use tracing::debug;

/// Mono and color renditions of one raw image.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoColor {
    /// `mono8` image.
    pub mono: Image,
    /// Color image. A mono camera yields a `mono8` copy.
    pub color: Image,
}

/// Image processing operations the pipeline is built on.
pub trait StereoBackend {
    /// Splits a raw, possibly Bayer-patterned, image into mono and color.
    fn debayer(&mut self, raw: &Image) -> Result<MonoColor>;

    /// Undistorts and rectifies an image of the given camera.
    fn rectify(&mut self, image: &Image, camera: &PinholeCameraModel) -> Result<Image>;

    /// Computes the disparity of a rectified `mono8` pair.
    fn correlate(
        &mut self,
        left_rect: &Image,
        right_rect: &Image,
        model: &StereoCameraModel,
        params: &StereoParams,
    ) -> Result<DisparityImage>;
}

/// Images computed for one camera.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonoImageSet {
    pub mono: Option<Image>,
    pub rect: Option<Image>,
    pub color: Option<Image>,
    pub rect_color: Option<Image>,
}

/// Everything computed for one synchronized pair.
///
/// A product is present when it was requested or when a requested
/// product depends on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoImageSet {
    pub left: MonoImageSet,
    pub right: MonoImageSet,
    pub disparity: Option<DisparityImage>,
    pub points: Option<PointCloud2>,
    pub sparse_points: Option<SparsePointCloud>,
}

/// The demand bits of one side of the rig.
#[derive(Debug, Clone, Copy)]
struct Side {
    name: &'static str,
    mono: OutputDemand,
    rect: OutputDemand,
    color: OutputDemand,
    rect_color: OutputDemand,
}

const LEFT: Side = Side {
    name: "left",
    mono: OutputDemand::LEFT_MONO,
    rect: OutputDemand::LEFT_RECT,
    color: OutputDemand::LEFT_COLOR,
    rect_color: OutputDemand::LEFT_RECT_COLOR,
};

const RIGHT: Side = Side {
    name: "right",
    mono: OutputDemand::RIGHT_MONO,
    rect: OutputDemand::RIGHT_RECT,
    color: OutputDemand::RIGHT_COLOR,
    rect_color: OutputDemand::RIGHT_RECT_COLOR,
};

/// Runs only the processing steps a demand set needs.
pub struct StereoPipeline<B> {
    backend: B,
    params: StereoParams,
    projector: DisparityProjector,
    encoder: PointCloudEncoder,
    scratch: PointBuffer,
}

impl<B> StereoPipeline<B>
where
    B: StereoBackend,
{
    pub fn new(backend: B) -> Self {
        Self::with_encoder(backend, PointCloudEncoder::new())
    }

    pub fn with_encoder(backend: B, encoder: PointCloudEncoder) -> Self {
        Self {
            backend,
            params: StereoParams::default(),
            projector: DisparityProjector::new(),
            encoder,
            scratch: PointBuffer::default(),
        }
    }

    pub fn params(&self) -> &StereoParams {
        &self.params
    }

    /// Replaces the correlation parameters used from the next pair on.
    pub fn set_params(&mut self, params: StereoParams) {
        self.params = params;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Processes one raw pair.
    ///
    /// `model` is `None` when the pair's calibration could not be
    /// turned into a stereo model; only unrectified outputs can then be
    /// produced. Disparity is stamped with the left raw header and the
    /// point products with the disparity header.
    pub fn process(
        &mut self,
        left_raw: &Image,
        right_raw: &Image,
        model: Option<&StereoCameraModel>,
        demand: OutputDemand,
    ) -> Result<StereoImageSet> {
        let needed = demand.expand();
        if needed.needs_rectification() && model.is_none() {
            bail!("rectified outputs requested but the cameras are not calibrated");
        }

        debug!(
            requested = ?demand,
            needed = ?needed,
            "Processing stereo pair"
        );

        let mut output = StereoImageSet {
            left: self.process_side(LEFT, left_raw, model.map(|m| m.left()), needed)?,
            right: self.process_side(RIGHT, right_raw, model.map(|m| m.right()), needed)?,
            ..Default::default()
        };

        if !needed.contains(OutputDemand::DISPARITY) {
            return Ok(output);
        }
        let Some(model) = model else {
            bail!("disparity requested but the cameras are not calibrated");
        };
        let (Some(left_rect), Some(right_rect)) = (&output.left.rect, &output.right.rect) else {
            bail!("rectified pair missing for disparity");
        };

        let mut disparity = self
            .backend
            .correlate(left_rect, right_rect, model, &self.params)
            .wrap_err("stereo correlation failed")?;
        disparity.header = left_raw.header.clone();
        disparity.image.header = left_raw.header.clone();

        if needed.intersects(OutputDemand::POINT_CLOUD | OutputDemand::SPARSE_POINT_CLOUD) {
            let Some(color) = &output.left.rect_color else {
                bail!("rectified color image missing for the point cloud");
            };
            self.projector
                .project_into(&disparity, model, &mut self.scratch)?;

            if needed.contains(OutputDemand::POINT_CLOUD) {
                output.points = Some(self.encoder.encode(
                    &self.scratch,
                    color,
                    &disparity.header,
                )?);
            }
            if needed.contains(OutputDemand::SPARSE_POINT_CLOUD) {
                output.sparse_points = Some(self.encoder.encode_sparse(
                    &self.scratch,
                    color,
                    &disparity.header,
                )?);
            }
        }

        output.disparity = Some(disparity);
        Ok(output)
    }

    fn process_side(
        &mut self,
        side: Side,
        raw: &Image,
        camera: Option<&PinholeCameraModel>,
        needed: OutputDemand,
    ) -> Result<MonoImageSet> {
        let mut images = MonoImageSet::default();
        if !needed.intersects(side.mono | side.rect | side.color | side.rect_color) {
            return Ok(images);
        }

        let MonoColor { mono, color } = self
            .backend
            .debayer(raw)
            .wrap_err_with(|| format!("debayering the {} image failed", side.name))?;

        if let Some(camera) = camera {
            if needed.contains(side.rect) {
                images.rect = Some(
                    self.backend
                        .rectify(&mono, camera)
                        .wrap_err_with(|| format!("rectifying the {} image failed", side.name))?,
                );
            }
            if needed.contains(side.rect_color) {
                images.rect_color = Some(
                    self.backend
                        .rectify(&color, camera)
                        .wrap_err_with(|| {
                            format!("rectifying the {} color image failed", side.name)
                        })?,
                );
            }
        }

        if needed.contains(side.mono) {
            images.mono = Some(mono);
        }
        if needed.contains(side.color) {
            images.color = Some(color);
        }

        Ok(images)
    }
}
