//! Recording module: catalogue of run artifacts on disk.

pub mod manager;

pub use manager::{
    newest_file_since, snapshot_files, RecordingInfo, RecordingManager, RECORDING_EXTENSIONS,
    TRACE_EXTENSIONS,
};
