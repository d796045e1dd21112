/// Gas-challenge post-processing: per-pixel sO2 time series, change from
/// baseline, tumour / non-tumour aggregates and histograms.
///
/// ```text
///  TimestepSource ──► estimate_timestep ──► PixelTimeSeries
///                                                │
///                                                ▼
///                                           DeltaSeries ──► PixelAggregates
///                                                                 │
///                                  TumourPartition ───────────────┤
///                                                                 ▼
///                                         GroupedAggregates ──► HistogramReport
/// ```

pub mod challenge;
pub mod histogram;
pub mod source;

pub use challenge::{
    estimate_timestep, pixel_map, DeltaSeries, GroupedAggregates, PixelAggregates,
    PixelTimeSeries, TumourPartition,
};
pub use histogram::{Histogram, HistogramReport};
pub use source::{TimestepFiles, TimestepSource};
