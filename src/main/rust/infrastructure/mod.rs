pub mod capture;
pub mod gstreamer;
pub mod metrics;
pub mod network;
