use crate::domain::value_objects::CaptureConfig;

pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Build the GStreamer pipeline string for camera capture into an appsink
    /// Encodes H264 for low latency and muxes into MPEG-TS so any chunk boundary is decodable
    pub fn build_pipeline_string(device: &str, config: &CaptureConfig) -> String {
        // x264enc takes kbit/s
        let bitrate_kbps = (config.bitrate() / 1000).max(1);
        // key-int-max = frame rate gives one IDR per second
        format!(
            "v4l2src device={} ! \
             video/x-raw,width={},height={},framerate={}/1 ! \
             videoconvert ! \
             x264enc bitrate={} tune=zerolatency speed-preset=ultrafast key-int-max={} ! \
             h264parse config-interval=1 ! \
             mpegtsmux alignment=7 ! \
             appsink name={} sync=false emit-signals=false",
            device,
            config.width(),
            config.height(),
            config.frame_rate(),
            bitrate_kbps,
            config.frame_rate(),
            APPSINK_NAME
        )
    }
}

/// Name the capture pipeline gives its appsink
pub const APPSINK_NAME: &str = "sink";
