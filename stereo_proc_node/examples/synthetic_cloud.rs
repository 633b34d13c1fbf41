//! Feeds a synthetic stereo tuple through the point cloud node and
//! prints the resulting cloud.
//!
//! Run with `RUST_LOG=debug` to see the synchronizer and lifecycle logs.

use eyre::Result;
use std::time::Duration;
use stereo_proc_core::{
    CameraInfo, DisparityImage, Encoding, Header, Image, MISSING_DISPARITY, OutputTopic,
    SubscriberEvent, Upstream,
};
use stereo_proc_node::{
    Config, Input, NodeEvent, OutputMessage, PointCloudNode, Publisher, StereoNode, run,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 4;
const HEIGHT: u32 = 3;

struct PrintPublisher;

impl Publisher for PrintPublisher {
    fn publish(&mut self, output: OutputTopic, message: OutputMessage) -> Result<()> {
        if let OutputMessage::PointCloud(cloud) = message {
            info!(
                topic = output.name(),
                width = cloud.width,
                height = cloud.height,
                bytes = cloud.data.len(),
                "Published point cloud"
            );
            for chunk in cloud.data.chunks_exact(cloud.point_step as usize) {
                let read = |i: usize| {
                    f32::from_ne_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
                };
                let rgb = u32::from_ne_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]);
                println!("{:>8.3} {:>8.3} {:>8.3}  #{rgb:06x}", read(0), read(4), read(8));
            }
        }
        Ok(())
    }
}

struct LogUpstream;

impl Upstream for LogUpstream {
    fn activate(&mut self) {
        info!("Upstream inputs subscribed");
    }

    fn deactivate(&mut self) {
        info!("Upstream inputs unsubscribed");
    }
}

fn camera_info(stamp: Duration, frame_id: &str, tx: f64) -> CameraInfo {
    let (cx, cy) = (f64::from(WIDTH) / 2.0, f64::from(HEIGHT) / 2.0);
    CameraInfo {
        header: Header::new(stamp, frame_id),
        width: WIDTH,
        height: HEIGHT,
        k: [400.0, 0.0, cx, 0.0, 400.0, cy, 0.0, 0.0, 1.0],
        p: [400.0, 0.0, cx, tx, 0.0, 400.0, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        ..Default::default()
    }
}

fn tuple(stamp: Duration) -> Result<Vec<NodeEvent>> {
    let header = Header::new(stamp, "left_optical");

    let color: Vec<u8> = (0..WIDTH * HEIGHT)
        .flat_map(|i| [(i * 20) as u8, 128, 255 - (i * 20) as u8])
        .collect();
    let color = Image::new(header.clone(), WIDTH, HEIGHT, Encoding::Rgb8, color)?;

    let values: Vec<f32> = (0..WIDTH * HEIGHT)
        .map(|i| if i % 5 == 0 { MISSING_DISPARITY } else { 4.0 + i as f32 })
        .collect();
    let disparity = DisparityImage {
        header: header.clone(),
        image: Image::from_f32(header, WIDTH, HEIGHT, &values)?,
        f: 400.0,
        t: 0.12,
        min_disparity: 0.0,
        max_disparity: 64.0,
        delta_d: 0.0625,
    };

    Ok(vec![
        NodeEvent::Frame(Input::LeftImageRectColor, color.into()),
        NodeEvent::Frame(
            Input::LeftCameraInfo,
            camera_info(stamp, "left_optical", 0.0).into(),
        ),
        NodeEvent::Frame(
            Input::RightCameraInfo,
            camera_info(stamp, "right_optical", -48.0).into(),
        ),
        NodeEvent::Frame(Input::Disparity, disparity.into()),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::default();
    let node = PointCloudNode::new(&config, PrintPublisher, LogUpstream)?;

    let (tx, rx) = mpsc::channel(16);
    let producer = tokio::spawn(async move {
        let subscribers = |previous, current| {
            NodeEvent::Subscribers(SubscriberEvent::new(OutputTopic::PointCloud, previous, current))
        };

        tx.send(subscribers(0, 1)).await?;
        for event in tuple(Duration::from_millis(100))? {
            tx.send(event).await?;
        }
        tx.send(subscribers(1, 0)).await?;
        eyre::Ok(())
    });

    let node = run(node, rx).await;
    producer.await??;

    info!(groups = node.stats().groups_emitted, "Done");
    Ok(())
}
