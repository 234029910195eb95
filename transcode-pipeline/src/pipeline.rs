//! Pipeline assembly.
//!
//! ```text
//! video packets ─► decode-video ─► filters ─┐
//! audio packets ─► decode-audio ────────────┼─► muxer ─► writer
//! audio packets ─► decode-audio ────────────┘
//! ```
//!
//! Every box is a thread; every arrow is a bounded [`BufferFifo`]. The
//! caller feeds demuxed packets into the input queues and ends each with
//! the zero-size end-of-stream buffer.

use crate::decode::{AudioDecodeStage, AudioDecoder, DecodeConfig, VideoDecodeStage, VideoDecoder};
use crate::error::PipelineTrackType;
use crate::fifo::BufferFifo;
use crate::filter::{DeinterlaceFilter, FilterChain, FilterNode, VideoFilter};
use crate::node::{spawn_node, NodeHandle};
use crate::sync::{spawn_muxer, SyncConfig, SyncSummary, Synchronizer};
use crate::writer::MuxWriter;
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};
use transcode_core::Error as CoreError;
use transcode_deinterlace::DeinterlaceConfig;
use transcode_framerate::StreamTiming;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineState {
    /// Threads are running.
    Running,
    /// Every thread finished.
    Finished,
    /// Aborted by the caller or by a failing stage.
    Aborted,
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of every queue between stages.
    pub queue_depth: usize,
    /// Video decode settings.
    pub decode: DecodeConfig,
    /// Deinterlace the video track.
    pub deinterlace: Option<DeinterlaceConfig>,
    /// Muxer settings.
    pub sync: SyncConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_depth: 32,
            decode: DecodeConfig::default(),
            deinterlace: None,
            sync: SyncConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue_depth must be at least 1".into(),
            ));
        }
        self.decode.reorder.validate()?;
        if let Some(deinterlace) = &self.deinterlace {
            deinterlace.validate()?;
        }
        Ok(())
    }
}

/// A running transcoding pipeline.
pub struct Pipeline {
    state: PipelineState,
    inputs: Vec<(PipelineTrackType, Arc<BufferFifo>)>,
    queues: Vec<Arc<BufferFifo>>,
    nodes: Vec<NodeHandle>,
    muxer: Option<JoinHandle<Result<SyncSummary>>>,
    /// Shared by the muxer and every stage; raised by a failing stage.
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Get current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Input queues in track order: video first, then audio.
    pub fn inputs(&self) -> impl Iterator<Item = (PipelineTrackType, &Arc<BufferFifo>)> {
        self.inputs.iter().map(|(kind, fifo)| (*kind, fifo))
    }

    /// Queue receiving video packets.
    pub fn video_input(&self) -> Option<Arc<BufferFifo>> {
        self.input(PipelineTrackType::Video, 0)
    }

    /// Queue receiving packets of the `index`-th audio track.
    pub fn audio_input(&self, index: usize) -> Option<Arc<BufferFifo>> {
        self.input(PipelineTrackType::Audio, index)
    }

    fn input(&self, kind: PipelineTrackType, index: usize) -> Option<Arc<BufferFifo>> {
        self.inputs
            .iter()
            .filter(|(k, _)| *k == kind)
            .nth(index)
            .map(|(_, fifo)| Arc::clone(fifo))
    }

    /// Stop every thread and close every queue.
    pub fn abort(&mut self) {
        if self.state == PipelineState::Running {
            info!("Aborting pipeline");
        }
        self.cancel.store(true, Ordering::Relaxed);
        for queue in &self.queues {
            queue.close();
        }
        self.state = PipelineState::Aborted;
    }

    /// Wait for every thread to finish and return the muxer summary.
    ///
    /// A failing stage aborts the rest of the pipeline; its error is the
    /// one returned.
    pub fn wait(mut self) -> Result<SyncSummary> {
        let mut first_error: Option<PipelineError> = None;

        for node in std::mem::take(&mut self.nodes) {
            let name = node.name().to_string();
            match node.join() {
                Ok(stats) => debug!(node = %name, ?stats, "node joined"),
                Err(e) => {
                    if first_error.is_none() {
                        error!(node = %name, error = %e, "stage failed, aborting");
                        self.abort();
                    }
                    record(&mut first_error, e);
                }
            }
        }

        let summary = match self.muxer.take().map(JoinHandle::join) {
            Some(Ok(Ok(summary))) => Some(summary),
            Some(Ok(Err(e))) => {
                record(&mut first_error, e);
                None
            }
            Some(Err(_)) => {
                record(
                    &mut first_error,
                    PipelineError::stage_failed("muxer", "thread panicked"),
                );
                None
            }
            None => None,
        };

        let summary = match (first_error, summary) {
            (Some(e), _) => {
                self.state = PipelineState::Aborted;
                return Err(e);
            }
            (None, Some(summary)) => summary,
            (None, None) => return Err(PipelineError::stage_failed("muxer", "not started")),
        };
        if self.cancel.load(Ordering::Relaxed) || summary.cancelled {
            self.state = PipelineState::Aborted;
            return Err(PipelineError::Aborted("cancelled".into()));
        }
        self.state = PipelineState::Finished;
        info!(
            tracks = summary.tracks.len(),
            watermark = summary.watermark,
            "Pipeline finished"
        );
        Ok(summary)
    }
}

/// Keep the most telling error: a closed queue or an abort is usually the
/// consequence of a failure elsewhere.
fn record(slot: &mut Option<PipelineError>, error: PipelineError) {
    let secondary = |e: &PipelineError| {
        matches!(
            e,
            PipelineError::Aborted(_) | PipelineError::Core(CoreError::Closed)
        )
    };
    match slot {
        None => *slot = Some(error),
        Some(current) if secondary(current) && !secondary(&error) => *slot = Some(error),
        Some(_) => {}
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.nodes.is_empty() && self.muxer.is_none() {
            return;
        }
        self.abort();
        for node in self.nodes.drain(..) {
            let _ = node.join();
        }
        if let Some(muxer) = self.muxer.take() {
            let _ = muxer.join();
        }
    }
}

struct VideoInput {
    decoder: Box<dyn VideoDecoder>,
    timing: StreamTiming,
}

struct AudioInput {
    name: String,
    decoder: Box<dyn AudioDecoder>,
}

/// Builder for constructing pipelines.
pub struct PipelineBuilder {
    config: PipelineConfig,
    video: Option<VideoInput>,
    audio: Vec<AudioInput>,
    video_filters: Vec<Box<dyn VideoFilter>>,
    writer: Option<Box<dyn MuxWriter>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Create a new pipeline builder.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            video: None,
            audio: Vec::new(),
            video_filters: Vec::new(),
            writer: None,
        }
    }

    /// Set configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the video decoder and what is known about the stream timing.
    pub fn video<D: VideoDecoder + 'static>(mut self, decoder: D, timing: StreamTiming) -> Self {
        self.video = Some(VideoInput {
            decoder: Box::new(decoder),
            timing,
        });
        self
    }

    /// Add an audio track.
    pub fn audio<D: AudioDecoder + 'static>(mut self, decoder: D) -> Self {
        let name = format!("decode-audio-{}", self.audio.len());
        self.audio.push(AudioInput {
            name,
            decoder: Box::new(decoder),
        });
        self
    }

    /// Add a video filter, run after the deinterlacer.
    pub fn video_filter(mut self, filter: Box<dyn VideoFilter>) -> Self {
        self.video_filters.push(filter);
        self
    }

    /// Set the output writer.
    pub fn muxer<W: MuxWriter + 'static>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Start every thread.
    pub fn start(self) -> Result<Pipeline> {
        self.config.validate()?;
        let writer = self
            .writer
            .ok_or_else(|| PipelineError::InvalidConfig("No muxer configured".into()))?;
        if self.video.is_none() && self.audio.is_empty() {
            return Err(PipelineError::InvalidConfig("No tracks configured".into()));
        }

        let depth = self.config.queue_depth;
        let queue = |queues: &mut Vec<Arc<BufferFifo>>| {
            let fifo = Arc::new(BufferFifo::new(depth));
            queues.push(Arc::clone(&fifo));
            fifo
        };

        let mut sync = Synchronizer::new(writer, self.config.sync.clone());
        let mut pipeline = Pipeline {
            state: PipelineState::Running,
            inputs: Vec::new(),
            queues: Vec::new(),
            nodes: Vec::new(),
            muxer: None,
            cancel: sync.cancel_handle(),
        };
        let mut tracks = Vec::new();

        if let Some(video) = self.video {
            let input = queue(&mut pipeline.queues);
            let decoded = queue(&mut pipeline.queues);
            let stage =
                VideoDecodeStage::new(video.decoder, video.timing, self.config.decode.clone())?;
            pipeline.nodes.push(spawn_node(
                stage,
                Arc::clone(&input),
                Arc::clone(&decoded),
                Arc::clone(&pipeline.cancel),
            )?);

            let mut chain: FilterChain<dyn VideoFilter> = FilterChain::new();
            if let Some(config) = self.config.deinterlace.clone() {
                chain.add(Box::new(DeinterlaceFilter::new(config)?));
            }
            for filter in self.video_filters {
                chain.add(filter);
            }

            let output = if chain.is_empty() {
                decoded
            } else {
                let filtered = queue(&mut pipeline.queues);
                pipeline.nodes.push(spawn_node(
                    FilterNode::new("filter-video", chain),
                    decoded,
                    Arc::clone(&filtered),
                    Arc::clone(&pipeline.cancel),
                )?);
                filtered
            };
            pipeline.inputs.push((PipelineTrackType::Video, input));
            tracks.push((PipelineTrackType::Video, output));
        }

        for audio in self.audio {
            let input = queue(&mut pipeline.queues);
            let output = queue(&mut pipeline.queues);
            pipeline.nodes.push(spawn_node(
                AudioDecodeStage::new(audio.name, audio.decoder),
                Arc::clone(&input),
                Arc::clone(&output),
                Arc::clone(&pipeline.cancel),
            )?);
            pipeline.inputs.push((PipelineTrackType::Audio, input));
            tracks.push((PipelineTrackType::Audio, output));
        }

        for (kind, fifo) in tracks {
            sync.add_track(kind, fifo);
        }
        pipeline.muxer = Some(spawn_muxer(sync)?);

        info!(
            nodes = pipeline.nodes.len(),
            tracks = pipeline.inputs.len(),
            "Pipeline started"
        );
        Ok(pipeline)
    }
}
