mod hsv;
mod mask;
mod pipeline;
pub mod threshold;
pub mod types;

pub use pipeline::SegmentationPipeline;
pub use threshold::{Bound, Channel, ThresholdBounds, ThresholdState};
pub use types::Mask;
