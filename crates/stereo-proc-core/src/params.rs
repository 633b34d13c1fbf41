use serde::Deserialize;

/// Tunable parameters of the block-matching correlation stage.
///
/// The pipeline stores these and hands them to the
/// [StereoBackend](crate::StereoBackend) untouched. Range checks are
/// the backend's business.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StereoParams {
    /// Normalization window size of the pre-filter, in pixels.
    pub prefilter_size: u32,
    /// Clip bound of the pre-filtered pixel values.
    pub prefilter_cap: u32,
    /// SAD correlation window width, in pixels.
    pub correlation_window_size: u32,
    /// Disparity to begin the search at.
    pub min_disparity: i32,
    /// Number of disparities to search.
    pub disparity_range: u32,
    /// Required margin of the best match over the next best, in percent.
    pub uniqueness_ratio: f64,
    /// Minimum texture inside the correlation window.
    pub texture_threshold: u32,
    /// Largest region size considered a speckle.
    pub speckle_size: u32,
    /// Largest disparity variation inside a connected region.
    pub speckle_range: u32,
}

impl Default for StereoParams {
    fn default() -> Self {
        Self {
            prefilter_size: 9,
            prefilter_cap: 31,
            correlation_window_size: 15,
            min_disparity: 0,
            disparity_range: 64,
            uniqueness_ratio: 15.0,
            texture_threshold: 10,
            speckle_size: 100,
            speckle_range: 4,
        }
    }
}
