pub mod streamer;

pub use streamer::{BackwardResult, ForwardResult, PipelineStreamer};
