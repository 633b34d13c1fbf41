use eyre::{Result, bail};
use std::time::Duration;
use stereo_proc_core::{
    CameraInfo, DisparityImage, Encoding, Header, Image, MonoColor, OutputTopic,
    PinholeCameraModel, StereoBackend, StereoCameraModel, StereoParams, Upstream,
};
use stereo_proc_node::{OutputMessage, Publisher};

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub published: Vec<(OutputTopic, OutputMessage)>,
    pub fail: bool,
}

impl RecordingPublisher {
    #[allow(dead_code)]
    pub fn topics(&self) -> Vec<OutputTopic> {
        self.published.iter().map(|(topic, _)| *topic).collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, output: OutputTopic, message: OutputMessage) -> Result<()> {
        if self.fail {
            bail!("transport down");
        }
        self.published.push((output, message));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingUpstream {
    pub activations: usize,
    pub deactivations: usize,
}

impl Upstream for RecordingUpstream {
    fn activate(&mut self) {
        self.activations += 1;
    }

    fn deactivate(&mut self) {
        self.deactivations += 1;
    }
}

/// Passes images through unchanged and reports a constant disparity of
/// 5 px with one missing pixel.
#[derive(Debug, Default)]
pub struct PassThroughBackend {
    /// Parameters of the last correlation.
    pub correlated_with: Option<StereoParams>,
}

impl StereoBackend for PassThroughBackend {
    fn debayer(&mut self, raw: &Image) -> Result<MonoColor> {
        Ok(MonoColor {
            mono: raw.clone(),
            color: raw.clone(),
        })
    }

    fn rectify(&mut self, image: &Image, _camera: &PinholeCameraModel) -> Result<Image> {
        Ok(image.clone())
    }

    fn correlate(
        &mut self,
        left_rect: &Image,
        _right_rect: &Image,
        _model: &StereoCameraModel,
        params: &StereoParams,
    ) -> Result<DisparityImage> {
        self.correlated_with = Some(params.clone());
        let (width, height) = left_rect.dimensions();
        let mut values = vec![5.0; width as usize * height as usize];
        values[1] = stereo_proc_core::MISSING_DISPARITY;
        Ok(disparity_image(
            left_rect.header.stamp,
            width,
            height,
            &values,
        ))
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// A calibrated pair with f = 500 px and a 0.1 m baseline.
pub fn camera_pair(stamp: Duration) -> (CameraInfo, CameraInfo) {
    let info = |tx: f64, frame_id: &str| CameraInfo {
        header: Header::new(stamp, frame_id),
        width: 2,
        height: 2,
        k: [500.0, 0.0, 1.0, 0.0, 500.0, 1.0, 0.0, 0.0, 1.0],
        p: [500.0, 0.0, 1.0, tx, 0.0, 500.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        ..Default::default()
    };
    (info(0.0, "left_optical"), info(-50.0, "right_optical"))
}

pub fn mono_image(stamp: Duration, frame_id: &str) -> Image {
    Image::new(
        Header::new(stamp, frame_id),
        2,
        2,
        Encoding::Mono8,
        vec![10, 20, 30, 40],
    )
    .unwrap()
}

pub fn disparity_image(stamp: Duration, width: u32, height: u32, values: &[f32]) -> DisparityImage {
    let header = Header::new(stamp, "left_optical");
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
