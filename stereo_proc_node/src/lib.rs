//! stereo-proc-node - Stereo processing nodes that only work for
//! subscribed outputs.
//!
//! Two nodes are provided on top of
//! [stereo-proc-core](../stereo_proc_core/index.html):
//!
//! - [PointCloudNode] joins `left/image_rect_color`, both
//!   `camera_info` topics and `disparity`, and publishes a colored
//!   `points2` cloud.
//! - [StereoProcNode] joins the raw left and right images with their
//!   calibration and publishes mono, color and rectified images for both
//!   cameras, the disparity map, and the dense and legacy point clouds.
//!
//! Inputs are subscribed through an [Upstream](stereo_proc_core::Upstream)
//! only while some output has a subscriber. Transport is abstracted by
//! [Publisher] and the [NodeEvent]s fed into [run].
//!
//! # Configuration
//!
//! Nodes are configured from YAML:
//!
//! ```yaml
//! sync:
//!   queue_size: 3
//! topics:
//!   left: /stereo/left
//!   right: /stereo/right
//!   disparity: /stereo/disparity
//! warnings:
//!   encoding_interval: 30s
//!   advertisement_interval: 1m
//! stereo:
//!   correlation_window_size: 15
//!   disparity_range: 64
//! ```

pub mod advertisement;
pub mod config;
pub mod node;

pub use advertisement::AdvertisementChecker;
pub use config::{Config, NodeKind};
pub use node::{
    Input, NodeEvent, OutputMessage, PointCloudNode, Publisher, StereoNode, StereoProcNode, run,
};
