//! Threaded transcoding pipeline.
//!
//! Each stage (video decode, video filters, audio decode, muxer) runs on its
//! own thread. Stages are connected by bounded [`BufferFifo`] queues and
//! signal end of stream in-band with a zero-size buffer. The muxer merges
//! the tracks in timestamp order before handing payloads to a
//! [`MuxWriter`].
//!
//! ```no_run
//! use transcode_framerate::StreamTiming;
//! use transcode_pipeline::{NullWriter, PipelineBuilder, PipelineConfig};
//! # use transcode_pipeline::{DecodedPicture, VideoDecoder};
//! # struct MyDecoder;
//! # impl VideoDecoder for MyDecoder {
//! #     fn decode(&mut self, _: &[u8], _: Option<i64>)
//! #         -> transcode_core::Result<Vec<DecodedPicture>> { Ok(Vec::new()) }
//! # }
//! # fn main() -> transcode_pipeline::Result<()> {
//! let pipeline = PipelineBuilder::new()
//!     .config(PipelineConfig::default())
//!     .video(MyDecoder, StreamTiming::default())
//!     .muxer(NullWriter::new())
//!     .start()?;
//!
//! let input = pipeline.video_input().expect("video track");
//! // push demuxed packets, then the end-of-stream buffer
//! input.push(transcode_core::Buffer::eof())?;
//!
//! let summary = pipeline.wait()?;
//! println!("{} bytes muxed", summary.tracks[0].bytes);
//! # Ok(())
//! # }
//! ```

pub mod decode;
mod error;
mod fifo;
mod filter;
mod node;
mod pipeline;
mod sync;
mod writer;

pub use decode::{
    AudioDecodeStage, AudioDecoder, DecodeConfig, DecodeStats, DecodedAudio, DecodedPicture,
    VideoDecodeStage, VideoDecoder, DEFAULT_KEYFRAME_WAIT, NO_PTS,
};
pub use error::{PipelineError, PipelineTrackType, Result};
pub use fifo::{BufferFifo, Fifo};
pub use filter::{DeinterlaceFilter, Filter, FilterChain, FilterNode, VideoFilter};
pub use node::{spawn_node, Node, NodeHandle, NodeId, NodeStats};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineState};
pub use sync::{
    spawn_muxer, SyncConfig, SyncPolicy, SyncSummary, Synchronizer, Track, TrackSummary,
};
pub use writer::{MuxWriter, NullWriter};
