//! Producible outputs and the per-tuple demand set.

use bitflags::bitflags;

bitflags! {
    /// The outputs requested for one synchronized tuple.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OutputDemand: u32 {
        const LEFT_MONO          = 1 << 0;
        const LEFT_RECT          = 1 << 1;
        const LEFT_COLOR         = 1 << 2;
        const LEFT_RECT_COLOR    = 1 << 3;
        const RIGHT_MONO         = 1 << 4;
        const RIGHT_RECT         = 1 << 5;
        const RIGHT_COLOR        = 1 << 6;
        const RIGHT_RECT_COLOR   = 1 << 7;
        const DISPARITY          = 1 << 8;
        const POINT_CLOUD        = 1 << 9;
        const SPARSE_POINT_CLOUD = 1 << 10;

        const LEFT_ALL = Self::LEFT_MONO.bits()
            | Self::LEFT_RECT.bits()
            | Self::LEFT_COLOR.bits()
            | Self::LEFT_RECT_COLOR.bits();
        const RIGHT_ALL = Self::RIGHT_MONO.bits()
            | Self::RIGHT_RECT.bits()
            | Self::RIGHT_COLOR.bits()
            | Self::RIGHT_RECT_COLOR.bits();
        const STEREO_ALL = Self::DISPARITY.bits()
            | Self::POINT_CLOUD.bits()
            | Self::SPARSE_POINT_CLOUD.bits();
    }
}

impl OutputDemand {
    /// Adds every intermediate product the requested outputs depend on.
    ///
    /// Point clouds need the disparity and the rectified color image
    /// they are colored from. Disparity needs both rectified images.
    /// Rectified color needs the rectified mono pass and the debayered
    /// color image, and rectified mono needs the mono image.
    pub fn expand(self) -> Self {
        let mut demand = self;

        if demand.intersects(Self::POINT_CLOUD | Self::SPARSE_POINT_CLOUD) {
            demand |= Self::DISPARITY | Self::LEFT_RECT_COLOR;
        }
        if demand.contains(Self::DISPARITY) {
            demand |= Self::LEFT_RECT | Self::RIGHT_RECT;
        }
        if demand.contains(Self::LEFT_RECT_COLOR) {
            demand |= Self::LEFT_RECT | Self::LEFT_COLOR;
        }
        if demand.contains(Self::RIGHT_RECT_COLOR) {
            demand |= Self::RIGHT_RECT | Self::RIGHT_COLOR;
        }
        if demand.contains(Self::LEFT_RECT) {
            demand |= Self::LEFT_MONO;
        }
        if demand.contains(Self::RIGHT_RECT) {
            demand |= Self::RIGHT_MONO;
        }

        demand
    }

    /// Whether any rectification must run, which requires calibration.
    pub fn needs_rectification(self) -> bool {
        self.intersects(
            Self::LEFT_RECT | Self::LEFT_RECT_COLOR | Self::RIGHT_RECT | Self::RIGHT_RECT_COLOR,
        )
    }
}

/// One published output of the stereo nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputTopic {
    LeftMono,
    LeftRect,
    LeftColor,
    LeftRectColor,
    RightMono,
    RightRect,
    RightColor,
    RightRectColor,
    Disparity,
    PointCloud,
    SparsePointCloud,
}

impl OutputTopic {
    pub const ALL: [OutputTopic; 11] = [
        OutputTopic::LeftMono,
        OutputTopic::LeftRect,
        OutputTopic::LeftColor,
        OutputTopic::LeftRectColor,
        OutputTopic::RightMono,
        OutputTopic::RightRect,
        OutputTopic::RightColor,
        OutputTopic::RightRectColor,
        OutputTopic::Disparity,
        OutputTopic::PointCloud,
        OutputTopic::SparsePointCloud,
    ];

    /// Topic name relative to the node namespace.
    pub fn name(self) -> &'static str {
        match self {
            OutputTopic::LeftMono => "left/image_mono",
            OutputTopic::LeftRect => "left/image_rect",
            OutputTopic::LeftColor => "left/image_color",
            OutputTopic::LeftRectColor => "left/image_rect_color",
            OutputTopic::RightMono => "right/image_mono",
            OutputTopic::RightRect => "right/image_rect",
            OutputTopic::RightColor => "right/image_color",
            OutputTopic::RightRectColor => "right/image_rect_color",
            OutputTopic::Disparity => "disparity",
            OutputTopic::PointCloud => "points2",
            OutputTopic::SparsePointCloud => "points",
        }
    }

    pub fn demand(self) -> OutputDemand {
        match self {
            OutputTopic::LeftMono => OutputDemand::LEFT_MONO,
            OutputTopic::LeftRect => OutputDemand::LEFT_RECT,
            OutputTopic::LeftColor => OutputDemand::LEFT_COLOR,
            OutputTopic::LeftRectColor => OutputDemand::LEFT_RECT_COLOR,
            OutputTopic::RightMono => OutputDemand::RIGHT_MONO,
            OutputTopic::RightRect => OutputDemand::RIGHT_RECT,
            OutputTopic::RightColor => OutputDemand::RIGHT_COLOR,
            OutputTopic::RightRectColor => OutputDemand::RIGHT_RECT_COLOR,
            OutputTopic::Disparity => OutputDemand::DISPARITY,
            OutputTopic::PointCloud => OutputDemand::POINT_CLOUD,
            OutputTopic::SparsePointCloud => OutputDemand::SPARSE_POINT_CLOUD,
        }
    }

    /// The image outputs, which share one message type.
    pub fn is_image(self) -> bool {
        self.demand()
            .intersects(OutputDemand::LEFT_ALL | OutputDemand::RIGHT_ALL)
    }
}
