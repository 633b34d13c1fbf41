//! Building blocks of a demand-driven stereo processing node.
//!
//! - [sync()] and [Synchronizer] join independently arriving input
//!   streams into groups sharing one exact timestamp.
//! - [LifecycleManager] counts subscribers per output and decides when
//!   the upstream inputs must be (un)subscribed.
//! - [StereoPipeline] runs only the image processing an
//!   [OutputDemand] needs.
//! - [DisparityProjector] and [PointCloudEncoder] turn a disparity map
//!   into a colored [PointCloud2].
//!
//! # Usage
//!
//! ```rust
//! use futures::{
//!     stream,
//!     stream::{StreamExt, TryStreamExt},
//! };
//! use std::time::Duration;
//! use stereo_proc_core::{SyncConfig, WithTimestamp, sync};
//!
//! #[derive(Debug, Clone)]
//! struct Stamped(Duration);
//!
//! impl WithTimestamp for Stamped {
//!     fn timestamp(&self) -> Duration {
//!         self.0
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> eyre::Result<()> {
//! let ms = Duration::from_millis;
//! let left = stream::iter([Stamped(ms(100)), Stamped(ms(200)), Stamped(ms(300))]);
//! let right = stream::iter([Stamped(ms(200)), Stamped(ms(300))]);
//!
//! let input = stream::select(
//!     left.map(|msg| ("left", msg)),
//!     right.map(|msg| ("right", msg)),
//! )
//! .map(eyre::Ok);
//!
//! let groups: Vec<_> = sync(input, ["left", "right"], SyncConfig::stereo())?
//!     .try_collect()
//!     .await?;
//!
//! assert_eq!(groups.len(), 2);
//! assert_eq!(groups[0]["left"].timestamp(), ms(200));
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod calibration;
mod config;
pub mod demand;
pub mod encoder;
pub mod lifecycle;
pub mod message;
mod params;
pub mod pipeline;
pub mod projector;
pub mod state;
mod sync;
mod throttle;
mod types;

pub use calibration::{PinholeCameraModel, StereoCameraModel};
pub use config::SyncConfig;
pub use demand::{OutputDemand, OutputTopic};
pub use encoder::PointCloudEncoder;
pub use lifecycle::{
    ActivationPolicy, LifecycleManager, LifecycleState, SubscriberEvent, Transition, Upstream,
};
pub use message::*;
pub use params::StereoParams;
pub use pipeline::{MonoColor, MonoImageSet, StereoBackend, StereoImageSet, StereoPipeline};
pub use projector::{DisparityProjector, Point3, PointBuffer};
pub use state::{SyncState, SyncStats};
pub use sync::{Synchronizer, sync};
pub use throttle::Throttle;
pub use types::*;
