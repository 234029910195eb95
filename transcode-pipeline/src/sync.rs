//! Multi-track synchronization.
//!
//! The synchronizer merges the output queues of every track into the single
//! stream a container writer expects. Each round it peeks at the head of
//! every live track and writes the one that starts earliest.
//!
//! Under [`SyncPolicy::Strict`] a round only selects when *every* live
//! track has a buffer waiting. This keeps long runs of a single track out
//! of formats that cannot play them back, but it stalls for as long as any
//! live track produces nothing: a track that stops without sending its
//! end-of-stream buffer blocks the muxer indefinitely.
//! [`SyncPolicy::BestEffort`] picks among whatever is available.

use crate::error::PipelineTrackType;
use crate::fifo::BufferFifo;
use crate::writer::MuxWriter;
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use transcode_core::ClockTime;

/// How tracks are interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// Wait until every live track has data.
    Strict,
    /// Take the earliest of whatever is available.
    BestEffort,
}

/// Synchronization configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interleaving policy; `None` asks the writer.
    pub policy: Option<SyncPolicy>,
    /// Sleep between rounds that found nothing to write.
    pub poll_interval: Duration,
    /// Hand buffers to the writer. When off (analysis pass), buffers are
    /// consumed without touching the writer.
    pub write_output: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: None,
            poll_interval: Duration::from_millis(50),
            write_output: true,
        }
    }
}

impl SyncConfig {
    /// Force an interleaving policy.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable writing.
    pub fn with_write_output(mut self, enabled: bool) -> Self {
        self.write_output = enabled;
        self
    }
}

/// One output stream feeding the writer.
#[derive(Debug)]
pub struct Track {
    kind: PipelineTrackType,
    fifo: Arc<BufferFifo>,
    eof: bool,
    frames: u64,
    bytes: u64,
}

impl Track {
    /// Track kind.
    pub fn kind(&self) -> PipelineTrackType {
        self.kind
    }

    /// Whether the end-of-stream buffer was consumed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Buffers written.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Payload bytes written.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Per-track totals.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    /// Track kind.
    pub kind: PipelineTrackType,
    /// Buffers written.
    pub frames: u64,
    /// Payload bytes written.
    pub bytes: u64,
    /// Average bitrate over the whole output.
    pub kbps: f64,
}

/// Totals reported when the synchronizer finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    /// Per-track totals, in track order.
    pub tracks: Vec<TrackSummary>,
    /// Final output size reported by the writer.
    pub file_size: Option<u64>,
    /// Container bytes per buffer beyond the payloads.
    pub overhead_per_frame: Option<f64>,
    /// Stop time of the last written buffer.
    pub watermark: i64,
    /// Stopped by the cancel flag rather than end of stream.
    pub cancelled: bool,
}

/// Merges track queues into one ordered stream for a writer.
pub struct Synchronizer {
    config: SyncConfig,
    policy: SyncPolicy,
    writer: Box<dyn MuxWriter>,
    tracks: Vec<Track>,
    /// Stop time of the last buffer taken.
    watermark: i64,
    cancel: Arc<AtomicBool>,
    started: bool,
}

impl Synchronizer {
    /// Create a synchronizer for `writer`.
    pub fn new<W>(writer: W, config: SyncConfig) -> Self
    where
        W: MuxWriter + 'static,
    {
        let policy = config.policy.unwrap_or(if writer.requires_strict_sync() {
            SyncPolicy::Strict
        } else {
            SyncPolicy::BestEffort
        });
        Self {
            config,
            policy,
            writer: Box::new(writer),
            tracks: Vec::new(),
            watermark: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    /// Add a track. Ties between tracks go to the one added first.
    pub fn add_track(&mut self, kind: PipelineTrackType, fifo: Arc<BufferFifo>) -> usize {
        self.tracks.push(Track {
            kind,
            fifo,
            eof: false,
            frames: 0,
            bytes: 0,
        });
        self.tracks.len() - 1
    }

    /// Policy in effect.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Tracks, in insertion order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Stop time of the last buffer taken.
    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    /// Flag that stops [`run`](Self::run) at its next round.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Whether every track has reached end of stream.
    pub fn all_done(&self) -> bool {
        self.tracks.iter().all(|t| t.eof)
    }

    /// Pick the track to take from next.
    ///
    /// End-of-stream buffers found at a track head are consumed here and
    /// mark the track done. Returns `None` when nothing is selectable this
    /// round.
    pub fn select(&mut self) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if track.eof {
                continue;
            }
            let Some((eof, start)) = track.fifo.peek(|b| (b.is_eof(), b.start)) else {
                if self.policy == SyncPolicy::Strict {
                    return None;
                }
                continue;
            };
            if eof {
                track.fifo.try_pop();
                track.eof = true;
                debug!(track = index, kind = %track.kind, "track reached end of stream");
                continue;
            }
            if best.map_or(true, |(_, pts)| start < pts) {
                best = Some((index, start));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Run one round. Returns whether a buffer was taken.
    pub fn step(&mut self) -> Result<bool> {
        let Some(index) = self.select() else {
            return Ok(false);
        };
        let track = &mut self.tracks[index];
        let Some(buf) = track.fifo.try_pop() else {
            return Ok(false);
        };

        // an analysis pass only drains the tracks
        if self.config.write_output {
            self.writer.write(index, &buf)?;
            track.frames += 1;
            track.bytes += buf.size() as u64;
            self.watermark = buf.stop;
        }
        Ok(true)
    }

    /// Merge every track until all reach end of stream or the cancel flag
    /// is raised, then close the writer.
    pub fn run(&mut self) -> Result<SyncSummary> {
        if self.config.write_output && !self.started {
            self.writer.init()?;
            self.started = true;
        }
        info!(
            format = self.writer.format_name(),
            tracks = self.tracks.len(),
            policy = ?self.policy,
            "muxing started"
        );

        let mut cancelled = false;
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("muxing cancelled");
                cancelled = true;
                break;
            }
            if self.step()? {
                continue;
            }
            if self.all_done() {
                break;
            }
            thread::sleep(self.config.poll_interval);
        }

        let file_size = if self.config.write_output {
            self.writer.finish()?
        } else {
            None
        };
        let mut summary = self.summarize(file_size);
        summary.cancelled = cancelled;
        if self.config.write_output {
            self.log_summary(&summary);
        }
        Ok(summary)
    }

    fn summarize(&self, file_size: Option<u64>) -> SyncSummary {
        let tracks: Vec<TrackSummary> = self
            .tracks
            .iter()
            .map(|t| TrackSummary {
                kind: t.kind,
                frames: t.frames,
                bytes: t.bytes,
                kbps: if self.watermark > 0 {
                    90000.0 * t.bytes as f64 / self.watermark as f64 / 125.0
                } else {
                    0.0
                },
            })
            .collect();

        let bytes: u64 = tracks.iter().map(|t| t.bytes).sum();
        let frames: u64 = tracks.iter().map(|t| t.frames).sum();
        let overhead_per_frame = match file_size {
            Some(size) if bytes > 0 && frames > 0 => {
                Some((size as f64 - bytes as f64) / frames as f64)
            }
            _ => None,
        };

        SyncSummary {
            tracks,
            file_size,
            overhead_per_frame,
            watermark: self.watermark,
            cancelled: false,
        }
    }

    fn log_summary(&self, summary: &SyncSummary) {
        if let Some(size) = summary.file_size {
            info!("mux: file size, {} bytes", size);
        }
        for (index, track) in summary.tracks.iter().enumerate() {
            info!(
                "mux: track {} ({}), {} bytes, {:.2} kbps",
                index, track.kind, track.bytes, track.kbps
            );
        }
        if let Some(overhead) = summary.overhead_per_frame {
            info!("mux: overhead, {:.2} bytes per frame", overhead);
        }
        debug!(end = %ClockTime(summary.watermark), "muxing finished");
    }
}

/// Run a synchronizer on its own thread. The track queues are closed when
/// it stops.
pub fn spawn_muxer(mut sync: Synchronizer) -> Result<thread::JoinHandle<Result<SyncSummary>>> {
    thread::Builder::new()
        .name("muxer".to_string())
        .spawn(move || {
            let result = sync.run();
            if let Err(e) = &result {
                error!(error = %e, "muxing failed");
            }
            // wake producers still blocked on full track queues
            for track in &sync.tracks {
                track.fifo.close();
            }
            result
        })
        .map_err(|e| PipelineError::stage_failed("muxer", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::NullWriter;
    use transcode_core::Buffer;

    fn buf(start: i64, size: usize) -> Buffer {
        let mut b = Buffer::from_bytes(vec![0; size]);
        b.start = start;
        b.stop = start + 5;
        b
    }

    fn track(starts: &[i64]) -> Arc<BufferFifo> {
        let fifo = Arc::new(BufferFifo::new(16));
        for &s in starts {
            fifo.push(buf(s, 10)).unwrap();
        }
        fifo
    }

    #[test]
    fn test_policy_from_writer() {
        let sync = Synchronizer::new(NullWriter::new().strict(), SyncConfig::default());
        assert_eq!(sync.policy(), SyncPolicy::Strict);
        let sync = Synchronizer::new(NullWriter::new(), SyncConfig::default());
        assert_eq!(sync.policy(), SyncPolicy::BestEffort);
        let sync = Synchronizer::new(
            NullWriter::new().strict(),
            SyncConfig::default().with_policy(SyncPolicy::BestEffort),
        );
        assert_eq!(sync.policy(), SyncPolicy::BestEffort);
    }

    #[test]
    fn test_ties_go_to_first_track() {
        let mut sync = Synchronizer::new(NullWriter::new(), SyncConfig::default());
        sync.add_track(PipelineTrackType::Video, track(&[10]));
        sync.add_track(PipelineTrackType::Audio, track(&[10]));
        assert_eq!(sync.select(), Some(0));
    }

    #[test]
    fn test_best_effort_skips_empty_tracks() {
        let mut sync = Synchronizer::new(NullWriter::new(), SyncConfig::default());
        sync.add_track(PipelineTrackType::Video, track(&[]));
        sync.add_track(PipelineTrackType::Audio, track(&[30]));
        assert_eq!(sync.select(), Some(1));
    }

    #[test]
    fn test_strict_waits_for_empty_track() {
        let mut sync = Synchronizer::new(NullWriter::new().strict(), SyncConfig::default());
        sync.add_track(PipelineTrackType::Video, track(&[]));
        sync.add_track(PipelineTrackType::Audio, track(&[30]));
        assert_eq!(sync.select(), None);
    }

    #[test]
    fn test_counters_and_watermark() {
        let mut sync = Synchronizer::new(NullWriter::new(), SyncConfig::default());
        sync.add_track(PipelineTrackType::Video, track(&[0, 20]));
        assert!(sync.step().unwrap());
        assert!(sync.step().unwrap());
        assert!(!sync.step().unwrap());
        assert_eq!(sync.tracks()[0].frames(), 2);
        assert_eq!(sync.tracks()[0].bytes(), 20);
        assert_eq!(sync.watermark(), 25);
    }

    #[test]
    fn test_analysis_pass_drains_without_counting() {
        let video = track(&[0, 20]);
        video.push(Buffer::eof()).unwrap();
        let mut sync = Synchronizer::new(
            NullWriter::new(),
            SyncConfig::default()
                .with_write_output(false)
                .with_poll_interval(Duration::from_millis(1)),
        );
        sync.add_track(PipelineTrackType::Video, Arc::clone(&video));
        let summary = sync.run().unwrap();

        assert!(video.is_empty());
        assert!(sync.all_done());
        assert_eq!(summary.tracks[0].frames, 0);
        assert_eq!(summary.tracks[0].bytes, 0);
        assert_eq!(summary.watermark, 0);
        assert_eq!(summary.file_size, None);
    }

    #[test]
    fn test_run_summary() {
        let video = track(&[0, 3003]);
        video.push(Buffer::eof()).unwrap();
        let audio = track(&[0]);
        audio.push(Buffer::eof()).unwrap();

        let mut sync = Synchronizer::new(
            NullWriter::new(),
            SyncConfig::default().with_poll_interval(Duration::from_millis(1)),
        );
        sync.add_track(PipelineTrackType::Video, video);
        sync.add_track(PipelineTrackType::Audio, audio);
        let summary = sync.run().unwrap();

        assert!(!summary.cancelled);
        assert_eq!(summary.watermark, 3008);
        assert_eq!(summary.file_size, Some(30));
        assert_eq!(summary.overhead_per_frame, Some(0.0));
        assert_eq!(summary.tracks[0].frames, 2);
        assert!(summary.tracks[0].kbps > 0.0);
    }

    #[test]
    fn test_cancel_stops_run() {
        let mut sync = Synchronizer::new(
            NullWriter::new(),
            SyncConfig::default().with_poll_interval(Duration::from_millis(1)),
        );
        sync.add_track(PipelineTrackType::Video, track(&[]));
        sync.cancel_handle().store(true, Ordering::Relaxed);
        assert!(sync.run().unwrap().cancelled);
    }
}
