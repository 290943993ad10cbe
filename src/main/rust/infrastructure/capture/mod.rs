pub mod file_replay_source;
pub mod synthetic_source;

pub use file_replay_source::FileReplaySource;
pub use synthetic_source::SyntheticSource;
