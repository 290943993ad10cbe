#[cfg(feature = "gstreamer")]
mod gstreamer_source;
mod pipeline_builder;

#[cfg(feature = "gstreamer")]
pub use gstreamer_source::GStreamerSource;
pub use pipeline_builder::{PipelineBuilder, APPSINK_NAME};
