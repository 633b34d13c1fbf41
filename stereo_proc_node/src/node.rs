//! The point cloud node and the full stereo processing node.
//!
//! Both nodes are driven by [NodeEvent]s delivered one at a time, either
//! through [handle](StereoNode::handle) or the async [run] loop. Input
//! frames only reach the synchronizer while some downstream subscriber
//! keeps the inputs active.

use crate::{
    advertisement::AdvertisementChecker,
    config::{Config, NodeKind, TopicsConfig},
};
use eyre::{OptionExt, Result, WrapErr};
use std::time::Duration;
use stereo_proc_core::{
    ActivationPolicy, DisparityImage, DisparityProjector, Frame, Image, LifecycleManager,
    OutputDemand, OutputTopic, PointBuffer, PointCloud2, PointCloudEncoder, SparsePointCloud,
    StereoBackend, StereoCameraModel, StereoImageSet, StereoParams, StereoPipeline,
    SubscriberEvent, SyncStats, SyncedGroup, Synchronizer, Transition, Upstream,
};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// A synchronizer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    LeftImageRaw,
    LeftImageRectColor,
    LeftCameraInfo,
    RightImageRaw,
    RightCameraInfo,
    Disparity,
}

impl Input {
    /// Topic name resolved in the configured namespaces.
    pub fn topic(self, topics: &TopicsConfig) -> String {
        match self {
            Input::LeftImageRaw => format!("{}/image_raw", topics.left),
            Input::LeftImageRectColor => format!("{}/image_rect_color", topics.left),
            Input::LeftCameraInfo => format!("{}/camera_info", topics.left),
            Input::RightImageRaw => format!("{}/image_raw", topics.right),
            Input::RightCameraInfo => format!("{}/camera_info", topics.right),
            Input::Disparity => topics.disparity.clone(),
        }
    }
}

/// A message handed to the [Publisher].
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    Image(Image),
    Disparity(DisparityImage),
    PointCloud(PointCloud2),
    SparsePointCloud(SparsePointCloud),
}

/// The transport side of the published outputs.
pub trait Publisher {
    fn publish(&mut self, output: OutputTopic, message: OutputMessage) -> Result<()>;
}

/// Everything a node reacts to.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A frame arrived on an input topic.
    Frame(Input, Frame),
    /// The subscriber count of an output changed.
    Subscribers(SubscriberEvent),
    /// New correlation parameters.
    Reconfigure(StereoParams),
    /// The topics currently advertised by any publisher.
    Advertised(Vec<String>),
}

/// Common surface of the nodes, used by [run].
pub trait StereoNode {
    fn handle(&mut self, event: NodeEvent);

    /// Periodic housekeeping.
    fn tick(&mut self);

    fn tick_interval(&self) -> Duration;

    fn stats(&self) -> &SyncStats;
}

/// Processes events until every sender is dropped, then returns the
/// node.
pub async fn run<N>(mut node: N, mut rx: mpsc::Receiver<NodeEvent>) -> N
where
    N: StereoNode,
{
    let mut ticker = tokio::time::interval(node.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Starting stereo node loop");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => node.handle(event),
                None => break,
            },
            _ = ticker.tick() => node.tick(),
        }
    }

    let stats = node.stats();
    info!(
        groups_emitted = stats.groups_emitted,
        rejected = stats.rejected,
        dropped = stats.dropped,
        "Stereo node loop ended"
    );
    node
}

/// Gates the synchronizer inputs on the downstream subscriber counts.
struct InputGate<U> {
    synchronizer: Synchronizer<'static, Input, Frame>,
    lifecycle: LifecycleManager,
    checker: AdvertisementChecker,
    advertised: Vec<String>,
    upstream: U,
}

impl<U> InputGate<U>
where
    U: Upstream,
{
    fn new(
        kind: NodeKind,
        inputs: &[Input],
        lifecycle: LifecycleManager,
        config: &Config,
        upstream: U,
    ) -> Result<Self> {
        let sync_config = config.sync_config_for(kind);
        let synchronizer = Synchronizer::new(inputs.iter().copied(), &sync_config)?;
        let required = inputs.iter().map(|input| input.topic(&config.topics));

        info!(
            ?kind,
            inputs = inputs.len(),
            queue_size = sync_config.queue_size,
            "Initialized input synchronizer"
        );

        Ok(Self {
            synchronizer,
            lifecycle,
            checker: AdvertisementChecker::new(required, config.warnings.advertisement_interval),
            advertised: Vec::new(),
            upstream,
        })
    }

    /// Feeds a frame to the synchronizer and runs `handler` on the
    /// group it completes, if any.
    fn push<R>(
        &mut self,
        input: Input,
        frame: Frame,
        handler: impl FnOnce(&SyncedGroup<Input, Frame>) -> R,
    ) -> Option<R> {
        if !self.lifecycle.is_active() {
            debug!(?input, "Dropping frame received while inputs are inactive");
            return None;
        }
        self.synchronizer.add_with(input, frame, handler)
    }

    fn subscribers(&mut self, event: SubscriberEvent) {
        match self.lifecycle.apply(event, &mut self.upstream) {
            Some(Transition::Activate) => {
                info!("Subscribing to input topics");
                self.checker.reset();
                self.check_advertised();
            }
            Some(Transition::Deactivate) => {
                info!("Unsubscribing from input topics");
                self.synchronizer.clear();
            }
            None => {}
        }
    }

    fn advertised(&mut self, topics: Vec<String>) {
        self.advertised = topics;
        self.check_advertised();
    }

    fn check_advertised(&mut self) {
        if self.lifecycle.is_active() {
            self.checker.check(&self.advertised);
        }
    }

    fn stats(&self) -> &SyncStats {
        self.synchronizer.stats()
    }
}

fn input_frame<'a, T>(
    group: &'a SyncedGroup<Input, Frame>,
    input: Input,
    view: impl Fn(&'a Frame) -> Option<&'a T>,
) -> Result<&'a T> {
    group
        .get(&input)
        .and_then(view)
        .ok_or_eyre(format!("synchronized tuple lacks a usable {input:?} frame"))
}

fn publish<P>(publisher: &mut P, output: OutputTopic, message: OutputMessage)
where
    P: Publisher,
{
    if let Err(err) = publisher.publish(output, message) {
        warn!(
            topic = output.name(),
            error = %err,
            "Failed to publish output"
        );
    }
}

/// Turns a disparity map and the rectified left color image into a
/// colored point cloud on `points2`.
pub struct PointCloudNode<P, U> {
    gate: InputGate<U>,
    stage: CloudStage<P>,
}

/// The per-tuple work of [PointCloudNode].
struct CloudStage<P> {
    projector: DisparityProjector,
    encoder: PointCloudEncoder,
    scratch: PointBuffer,
    publisher: P,
}

impl<P> CloudStage<P>
where
    P: Publisher,
{
    fn handle(&mut self, group: &SyncedGroup<Input, Frame>) {
        match self.process(group) {
            Ok(cloud) => publish(
                &mut self.publisher,
                OutputTopic::PointCloud,
                OutputMessage::PointCloud(cloud),
            ),
            Err(err) => warn!(error = %format!("{err:#}"), "Skipping synchronized tuple"),
        }
    }

    fn process(&mut self, group: &SyncedGroup<Input, Frame>) -> Result<PointCloud2> {
        let color = input_frame(group, Input::LeftImageRectColor, Frame::as_image)?;
        let left_info = input_frame(group, Input::LeftCameraInfo, Frame::as_camera_info)?;
        let right_info = input_frame(group, Input::RightCameraInfo, Frame::as_camera_info)?;
        let disparity = input_frame(group, Input::Disparity, Frame::as_disparity)?;

        let model = StereoCameraModel::from_camera_info(left_info, right_info)
            .wrap_err("unusable stereo calibration")?;
        self.projector
            .project_into(disparity, &model, &mut self.scratch)?;
        self.encoder
            .encode(&self.scratch, color, &disparity.header)
    }
}

impl<P, U> PointCloudNode<P, U>
where
    P: Publisher,
    U: Upstream,
{
    pub const INPUTS: [Input; 4] = [
        Input::LeftImageRectColor,
        Input::LeftCameraInfo,
        Input::RightCameraInfo,
        Input::Disparity,
    ];

    pub fn new(config: &Config, publisher: P, upstream: U) -> Result<Self> {
        let lifecycle = LifecycleManager::new(
            ActivationPolicy::Single(OutputTopic::PointCloud),
            [OutputTopic::PointCloud],
        );

        Ok(Self {
            gate: InputGate::new(
                NodeKind::PointCloud,
                &Self::INPUTS,
                lifecycle,
                config,
                upstream,
            )?,
            stage: CloudStage {
                projector: DisparityProjector::new(),
                encoder: PointCloudEncoder::with_warning_interval(
                    config.warnings.encoding_interval,
                ),
                scratch: PointBuffer::default(),
                publisher,
            },
        })
    }

    pub fn publisher(&self) -> &P {
        &self.stage.publisher
    }

    pub fn upstream(&self) -> &U {
        &self.gate.upstream
    }

    pub fn is_active(&self) -> bool {
        self.gate.lifecycle.is_active()
    }
}

impl<P, U> StereoNode for PointCloudNode<P, U>
where
    P: Publisher,
    U: Upstream,
{
    fn handle(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Frame(input, frame) => {
                let stage = &mut self.stage;
                self.gate.push(input, frame, |group| stage.handle(group));
            }
            NodeEvent::Subscribers(event) => self.gate.subscribers(event),
            NodeEvent::Reconfigure(_) => {
                debug!("Point cloud node has no correlation parameters, ignoring reconfigure")
            }
            NodeEvent::Advertised(topics) => self.gate.advertised(topics),
        }
    }

    fn tick(&mut self) {
        self.gate.check_advertised();
    }

    fn tick_interval(&self) -> Duration {
        self.gate.checker.interval()
    }

    fn stats(&self) -> &SyncStats {
        self.gate.stats()
    }
}

/// Rectifies, colorizes and correlates a raw stereo pair, computing only
/// the outputs that currently have subscribers.
pub struct StereoProcNode<B, P, U> {
    gate: InputGate<U>,
    stage: StereoStage<B, P>,
}

/// The per-tuple work of [StereoProcNode].
struct StereoStage<B, P> {
    pipeline: StereoPipeline<B>,
    publisher: P,
}

impl<B, P> StereoStage<B, P>
where
    B: StereoBackend,
    P: Publisher,
{
    fn handle(&mut self, group: &SyncedGroup<Input, Frame>, demand: OutputDemand) {
        if demand.is_empty() {
            return;
        }
        if let Err(err) = self.process(group, demand) {
            warn!(error = %format!("{err:#}"), "Skipping synchronized tuple");
        }
    }

    fn process(&mut self, group: &SyncedGroup<Input, Frame>, demand: OutputDemand) -> Result<()> {
        let left_raw = input_frame(group, Input::LeftImageRaw, Frame::as_image)?;
        let left_info = input_frame(group, Input::LeftCameraInfo, Frame::as_camera_info)?;
        let right_raw = input_frame(group, Input::RightImageRaw, Frame::as_image)?;
        let right_info = input_frame(group, Input::RightCameraInfo, Frame::as_camera_info)?;

        let model = match StereoCameraModel::from_camera_info(left_info, right_info) {
            Ok(model) => Some(model),
            Err(err) => {
                debug!(error = %err, "Stereo calibration unusable, rectified outputs unavailable");
                None
            }
        };

        let mut images = self
            .pipeline
            .process(left_raw, right_raw, model.as_ref(), demand)?;

        for output in OutputTopic::ALL {
            if !demand.contains(output.demand()) {
                continue;
            }
            let Some(message) = take_output(&mut images, output) else {
                continue;
            };
            let message = match message {
                OutputMessage::Image(mut image) => {
                    image.header = left_raw.header.clone();
                    OutputMessage::Image(image)
                }
                other => other,
            };
            publish(&mut self.publisher, output, message);
        }

        Ok(())
    }
}

impl<B, P, U> StereoProcNode<B, P, U>
where
    B: StereoBackend,
    P: Publisher,
    U: Upstream,
{
    pub const INPUTS: [Input; 4] = [
        Input::LeftImageRaw,
        Input::LeftCameraInfo,
        Input::RightImageRaw,
        Input::RightCameraInfo,
    ];

    pub fn new(config: &Config, backend: B, publisher: P, upstream: U) -> Result<Self> {
        let lifecycle = LifecycleManager::new(ActivationPolicy::AnyOutput, OutputTopic::ALL);
        let mut pipeline = StereoPipeline::with_encoder(
            backend,
            PointCloudEncoder::with_warning_interval(config.warnings.encoding_interval),
        );
        pipeline.set_params(config.stereo.clone());

        Ok(Self {
            gate: InputGate::new(NodeKind::Stereo, &Self::INPUTS, lifecycle, config, upstream)?,
            stage: StereoStage {
                pipeline,
                publisher,
            },
        })
    }

    pub fn publisher(&self) -> &P {
        &self.stage.publisher
    }

    pub fn upstream(&self) -> &U {
        &self.gate.upstream
    }

    pub fn backend(&self) -> &B {
        self.stage.pipeline.backend()
    }

    pub fn params(&self) -> &StereoParams {
        self.stage.pipeline.params()
    }

    pub fn is_active(&self) -> bool {
        self.gate.lifecycle.is_active()
    }

    /// Replaces the correlation parameters used from the next tuple on.
    /// They are forwarded to the backend as received.
    pub fn reconfigure(&mut self, params: StereoParams) {
        info!(?params, "Reconfigure request received");
        self.stage.pipeline.set_params(params);
    }
}

/// Moves the product published on `output` out of the set.
fn take_output(images: &mut StereoImageSet, output: OutputTopic) -> Option<OutputMessage> {
    let image = match output {
        OutputTopic::LeftMono => images.left.mono.take(),
        OutputTopic::LeftRect => images.left.rect.take(),
        OutputTopic::LeftColor => images.left.color.take(),
        OutputTopic::LeftRectColor => images.left.rect_color.take(),
        OutputTopic::RightMono => images.right.mono.take(),
        OutputTopic::RightRect => images.right.rect.take(),
        OutputTopic::RightColor => images.right.color.take(),
        OutputTopic::RightRectColor => images.right.rect_color.take(),
        OutputTopic::Disparity => return images.disparity.take().map(OutputMessage::Disparity),
        OutputTopic::PointCloud => return images.points.take().map(OutputMessage::PointCloud),
        OutputTopic::SparsePointCloud => {
            return images
                .sparse_points
                .take()
                .map(OutputMessage::SparsePointCloud);
        }
    };
    image.map(OutputMessage::Image)
}

impl<B, P, U> StereoNode for StereoProcNode<B, P, U>
where
    B: StereoBackend,
    P: Publisher,
    U: Upstream,
{
    fn handle(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Frame(input, frame) => {
                let demand = self.gate.lifecycle.demand();
                let stage = &mut self.stage;
                self.gate
                    .push(input, frame, |group| stage.handle(group, demand));
            }
            NodeEvent::Subscribers(event) => self.gate.subscribers(event),
            NodeEvent::Reconfigure(params) => self.reconfigure(params),
            NodeEvent::Advertised(topics) => self.gate.advertised(topics),
        }
    }

    fn tick(&mut self) {
        self.gate.check_advertised();
    }

    fn tick_interval(&self) -> Duration {
        self.gate.checker.interval()
    }

    fn stats(&self) -> &SyncStats {
        self.gate.stats()
    }
}
