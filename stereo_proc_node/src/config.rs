//! Configuration parsing and validation for the stereo nodes.

use eyre::{Result, WrapErr, ensure};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};
use stereo_proc_core::{StereoParams, SyncConfig};

/// Root configuration structure.
///
/// The node kind is not part of it. Each node type picks its own
/// synchronizer defaults through [sync_config_for](Config::sync_config_for).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Synchronization parameters.
    #[serde(default)]
    pub sync: SyncSection,

    /// Input namespaces and topics.
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Rate limits of repeated diagnostics.
    #[serde(default)]
    pub warnings: WarningsConfig,

    /// Initial correlation parameters, passed to the backend as given.
    #[serde(default)]
    pub stereo: StereoParams,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .wrap_err_with(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).wrap_err("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(queue_size) = self.sync.queue_size {
            ensure!(queue_size > 0, "sync.queue_size must be greater than zero");
        }

        let topics = &self.topics;
        ensure!(!topics.left.is_empty(), "topics.left cannot be empty");
        ensure!(!topics.right.is_empty(), "topics.right cannot be empty");
        ensure!(
            !topics.disparity.is_empty(),
            "topics.disparity cannot be empty"
        );
        ensure!(
            topics.left != topics.right,
            "Left and right cameras share the namespace '{}'",
            topics.left
        );

        ensure!(
            !self.warnings.encoding_interval.is_zero(),
            "warnings.encoding_interval must be greater than zero"
        );
        ensure!(
            !self.warnings.advertisement_interval.is_zero(),
            "warnings.advertisement_interval must be greater than zero"
        );

        Ok(())
    }

    /// Convert to the core synchronizer configuration of `node`,
    /// defaulting the queue size to the one of that node.
    pub fn sync_config_for(&self, node: NodeKind) -> SyncConfig {
        match self.sync.queue_size {
            Some(queue_size) => SyncConfig::new(queue_size),
            None => match node {
                NodeKind::PointCloud => SyncConfig::point_cloud(),
                NodeKind::Stereo => SyncConfig::stereo(),
            },
        }
    }
}

/// The node a synchronizer is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Disparity plus rectified color in, `points2` out.
    PointCloud,
    /// Raw stereo pair in, every image and stereo product out.
    Stereo,
}

/// Synchronization parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    /// Pending frames kept per input. Defaults to 5 for the point
    /// cloud node and 3 for the stereo node. A full queue evicts its
    /// oldest frame.
    #[serde(default)]
    pub queue_size: Option<usize>,
}

/// Namespaces the node resolves its input topics in.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_left")]
    pub left: String,

    #[serde(default = "default_right")]
    pub right: String,

    #[serde(default = "default_disparity")]
    pub disparity: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
            disparity: default_disparity(),
        }
    }
}

fn default_left() -> String {
    "left".to_string()
}

fn default_right() -> String {
    "right".to_string()
}

fn default_disparity() -> String {
    "disparity".to_string()
}

/// Intervals between repeated warnings.
#[derive(Debug, Clone, Deserialize)]
pub struct WarningsConfig {
    /// Unrecognized color encoding of the point cloud source.
    #[serde(with = "humantime_serde", default = "default_encoding_interval")]
    pub encoding_interval: Duration,

    /// Required inputs that nobody advertises.
    #[serde(with = "humantime_serde", default = "default_advertisement_interval")]
    pub advertisement_interval: Duration,
}

impl Default for WarningsConfig {
    fn default() -> Self {
        Self {
            encoding_interval: default_encoding_interval(),
            advertisement_interval: default_advertisement_interval(),
        }
    }
}

fn default_encoding_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_advertisement_interval() -> Duration {
    Duration::from_secs(60)
}
