//! Decode stages.
//!
//! The decoders themselves live outside this crate, behind
//! [`VideoDecoder`] and [`AudioDecoder`]. The stages here turn what they
//! return into timed buffers.
//!
//! Some decode paths hand back pictures in the right order but with their
//! timestamps scrambled (packed B-frames). The video stage corrects this with
//! a [`ReorderQueue`]: every decoded picture waits in a small delay ring
//! and, when it leaves, takes the smallest timestamp seen so far. Inputs
//! whose timestamps are in order pass through unchanged; disorder up to the
//! ring capacity is corrected.

use crate::node::Node;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use transcode_core::{
    ticks_to_seconds, Buffer, BufferFlags, BufferList, Error as CoreError, Plane, ReorderConfig,
    ReorderQueue,
};
use transcode_framerate::{CadenceTracker, DurationEstimator, StreamTiming};

/// Packet `start` value of an audio packet without a timestamp.
pub const NO_PTS: i64 = -1;

/// Non-key pictures dropped at most while waiting for a keyframe.
pub const DEFAULT_KEYFRAME_WAIT: u32 = 60;

/// A picture returned by a [`VideoDecoder`].
#[derive(Debug, Clone)]
pub struct DecodedPicture {
    /// Timestamp relayed from the packet, if the decoder had one.
    pub pts: Option<i64>,
    /// Extra fields to display (1 = repeat first field, 2 = repeat frame).
    pub repeat_pict: u32,
    /// Top field first.
    pub top_field_first: bool,
    /// Interlaced rather than progressive.
    pub interlaced: bool,
    /// Keyframe.
    pub keyframe: bool,
    /// Pixel planes.
    pub planes: Vec<Plane>,
}

impl DecodedPicture {
    fn flags(&self) -> BufferFlags {
        let mut flags = BufferFlags::empty();
        flags.set(BufferFlags::TOP_FIELD_FIRST, self.top_field_first);
        flags.set(BufferFlags::PROGRESSIVE, !self.interlaced);
        flags.set(BufferFlags::REPEAT_FIRST_FIELD, self.repeat_pict == 1);
        flags.set(BufferFlags::REPEAT_FRAME, self.repeat_pict == 2);
        flags.set(BufferFlags::KEYFRAME, self.keyframe);
        flags
    }
}

/// External video decoder boundary.
pub trait VideoDecoder: Send {
    /// Decode one packet. `pts` is the packet timestamp when it had one.
    fn decode(&mut self, data: &[u8], pts: Option<i64>) -> transcode_core::Result<Vec<DecodedPicture>>;

    /// Return the pictures still held inside the decoder at end of stream.
    fn drain(&mut self) -> transcode_core::Result<Vec<DecodedPicture>> {
        Ok(Vec::new())
    }

    /// Discard internal state after a seek.
    fn flush(&mut self) {}

    /// Timing information the decoder learned from the stream, if any.
    fn timing(&self) -> Option<StreamTiming> {
        None
    }
}

/// A block of samples returned by an [`AudioDecoder`].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Samples per channel.
    pub samples: u32,
    /// Sample data.
    pub data: Vec<u8>,
}

/// External audio decoder boundary.
pub trait AudioDecoder: Send {
    /// Current sample rate (0 when not yet known).
    fn sample_rate(&self) -> u32;

    /// Decode one packet.
    fn decode(&mut self, data: &[u8]) -> transcode_core::Result<Vec<DecodedAudio>>;
}

/// Video decode stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Correct scrambled decoder timestamps with the reorder queue.
    pub reorder_timestamps: bool,
    /// Reorder queue settings.
    pub reorder: ReorderConfig,
    /// Non-key pictures dropped at most at start and after a flush.
    pub keyframe_wait: u32,
    /// Chapter the stream starts in.
    pub chapter_start: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            reorder_timestamps: true,
            reorder: ReorderConfig::default(),
            keyframe_wait: DEFAULT_KEYFRAME_WAIT,
            chapter_start: 1,
        }
    }
}

impl DecodeConfig {
    /// Enable or disable timestamp reordering.
    pub fn with_reorder_timestamps(mut self, enabled: bool) -> Self {
        self.reorder_timestamps = enabled;
        self
    }

    /// Set the reorder queue settings.
    pub fn with_reorder(mut self, reorder: ReorderConfig) -> Self {
        self.reorder = reorder;
        self
    }

    /// Set the keyframe wait.
    pub fn with_keyframe_wait(mut self, pictures: u32) -> Self {
        self.keyframe_wait = pictures;
        self
    }

    /// Set the starting chapter.
    pub fn with_chapter_start(mut self, chapter: u32) -> Self {
        self.chapter_start = chapter;
        self
    }
}

/// Video decode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Packets received.
    pub packets: u64,
    /// Pictures emitted.
    pub frames: u64,
    /// Packets the decoder rejected.
    pub decode_errors: u64,
    /// Pictures dropped while waiting for a keyframe.
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingChapter {
    number: u32,
    time: i64,
}

/// Decodes video packets into timed pictures.
pub struct VideoDecodeStage {
    decoder: Box<dyn VideoDecoder>,
    config: DecodeConfig,
    estimator: DurationEstimator,
    queue: ReorderQueue<i64, Buffer>,
    cadence: CadenceTracker,
    /// Estimated start of the next picture.
    pts_next: f64,
    chapter: Option<PendingChapter>,
    wait_for_keyframe: u32,
    stats: DecodeStats,
}

impl VideoDecodeStage {
    /// Create a video decode stage.
    pub fn new<D>(decoder: D, timing: StreamTiming, config: DecodeConfig) -> Result<Self>
    where
        D: VideoDecoder + 'static,
    {
        let queue = ReorderQueue::from_config(&config.reorder)?;
        Ok(Self {
            decoder: Box::new(decoder),
            estimator: DurationEstimator::new(timing)?,
            queue,
            cadence: CadenceTracker::new(),
            pts_next: 0.0,
            chapter: None,
            wait_for_keyframe: config.keyframe_wait,
            stats: DecodeStats::default(),
            config,
        })
    }

    /// Counters.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Decode one packet and return the pictures ready to leave.
    ///
    /// A negative `start` marks a packet without a timestamp. The zero-size
    /// end-of-stream packet drains the decoder and the reorder queue, then
    /// is appended to the output.
    pub fn decode_packet(&mut self, packet: Buffer) -> Result<BufferList> {
        let mut out = BufferList::new();

        if packet.is_eof() {
            match self.decoder.drain() {
                Ok(pictures) => {
                    for picture in pictures {
                        self.handle_picture(picture, &mut out);
                    }
                }
                Err(e) => self.decode_failed(&e),
            }
            for (start, buf) in self.queue.flush() {
                self.emit(buf, start, &mut out);
            }
            info!(
                frames = self.stats.frames,
                decode_errors = self.stats.decode_errors,
                dropped = self.stats.dropped,
                "video decode done"
            );
            out.push(packet);
            return Ok(out);
        }

        self.stats.packets += 1;
        let pts = (packet.start >= 0).then_some(packet.start);
        if packet.new_chap != 0 {
            self.chapter = Some(PendingChapter {
                number: packet.new_chap,
                time: pts.unwrap_or(self.pts_next as i64),
            });
        }

        let data = packet.plane(0).map(|p| p.data.as_slice()).unwrap_or(&[]);
        match self.decoder.decode(data, pts) {
            Ok(pictures) => {
                for picture in pictures {
                    self.handle_picture(picture, &mut out);
                }
            }
            Err(e) => self.decode_failed(&e),
        }
        Ok(out)
    }

    /// Discard everything in flight (seek or discontinuity) and wait for
    /// the next keyframe.
    pub fn flush(&mut self) {
        let discarded = self.queue.len();
        self.queue.clear();
        self.decoder.flush();
        self.wait_for_keyframe = self.config.keyframe_wait;
        debug!(discarded, "video decode flushed");
    }

    fn decode_failed(&mut self, error: &CoreError) {
        self.stats.decode_errors += 1;
        warn!(errors = self.stats.decode_errors, %error, "decode error");
    }

    fn handle_picture(&mut self, picture: DecodedPicture, out: &mut BufferList) {
        if self.wait_for_keyframe > 0 {
            if !picture.keyframe {
                self.wait_for_keyframe -= 1;
                self.stats.dropped += 1;
                trace!("dropping picture while waiting for a keyframe");
                return;
            }
            self.wait_for_keyframe = 0;
        }

        if !self.estimator.is_confirmed() {
            if let Some(timing) = self.decoder.timing() {
                if let Err(e) = self.estimator.update_timing(timing) {
                    debug!(error = %e, "ignoring decoder timing");
                }
            }
        }
        let frame_duration = self.estimator.estimate().with_repeats(picture.repeat_pict);

        // pictures without a timestamp continue from the last one
        let pts = picture.pts.map_or(self.pts_next, |p| p as f64);
        self.pts_next = pts + frame_duration;

        let flags = picture.flags();
        let mut buf = Buffer::from_planes(picture.planes);
        buf.flags = flags;
        buf.duration = frame_duration as i64;

        if self.config.reorder_timestamps {
            buf.sequence = self.queue.pushed();
            if let Some((start, released)) = self.queue.push(pts as i64, buf) {
                self.emit(released, start, out);
            }
        } else {
            buf.sequence = self.stats.frames;
            self.emit(buf, pts as i64, out);
        }
    }

    /// Stamp a picture leaving in display order.
    fn emit(&mut self, mut buf: Buffer, start: i64, out: &mut BufferList) {
        buf.start = start;
        buf.stop = start + buf.duration;

        match self.chapter {
            Some(chapter) if buf.start >= chapter.time => {
                buf.new_chap = chapter.number;
                info!(
                    "Chapter {} at frame {} time {}",
                    chapter.number, self.stats.frames, buf.start
                );
                self.chapter = None;
            }
            _ if self.stats.frames == 0 => {
                info!(
                    "Chapter {} at frame 0 time {}",
                    self.config.chapter_start, buf.start
                );
            }
            _ => {}
        }

        self.cadence.observe(buf.flags, buf.start);
        self.stats.frames += 1;
        out.push(buf);
    }
}

impl Node for VideoDecodeStage {
    fn name(&self) -> &str {
        "decode-video"
    }

    fn process(&mut self, input: Buffer) -> Result<BufferList> {
        self.decode_packet(input)
    }
}

/// Decodes audio packets into timed sample blocks.
pub struct AudioDecodeStage {
    name: String,
    decoder: Box<dyn AudioDecoder>,
    /// Start of the next block; fractional ticks are kept.
    pts_next: f64,
    blocks: u64,
    decode_errors: u64,
}

impl AudioDecodeStage {
    /// Create an audio decode stage.
    pub fn new<D>(name: impl Into<String>, decoder: D) -> Self
    where
        D: AudioDecoder + 'static,
    {
        Self {
            name: name.into(),
            decoder: Box::new(decoder),
            pts_next: 0.0,
            blocks: 0,
            decode_errors: 0,
        }
    }

    /// Sample blocks produced.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Packets the decoder rejected.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Decode one packet. `start` is [`NO_PTS`] when it has no timestamp.
    pub fn decode_packet(&mut self, packet: Buffer) -> Result<BufferList> {
        if packet.is_eof() {
            debug!(
                stage = %self.name,
                blocks = self.blocks,
                end = ticks_to_seconds(self.pts_next as i64),
                "audio decode done"
            );
            return Ok(BufferList::from_head(packet));
        }

        if packet.start < NO_PTS && self.pts_next <= 0.0 {
            trace!(start = packet.start, "discarding audio before time zero");
            return Ok(BufferList::new());
        }

        // resync on a new timestamp without losing partial ticks
        if packet.start != NO_PTS && self.pts_next as i64 != packet.start {
            self.pts_next = packet.start as f64;
        }

        let data = packet.plane(0).map(|p| p.data.as_slice()).unwrap_or(&[]);
        let blocks = match self.decoder.decode(data) {
            Ok(blocks) => blocks,
            Err(e) => {
                self.decode_errors += 1;
                warn!(stage = %self.name, errors = self.decode_errors, error = %e, "decode error");
                return Ok(BufferList::new());
            }
        };

        let rate = self.decoder.sample_rate();
        let per_sample = if rate > 0 {
            transcode_core::CLOCK_RATE as f64 / f64::from(rate)
        } else {
            0.0
        };

        let mut out = BufferList::new();
        for block in blocks {
            let duration = f64::from(block.samples) * per_sample;
            let pts_next = self.pts_next + duration;

            let mut buf = Buffer::from_bytes(block.data);
            buf.start = self.pts_next as i64;
            buf.stop = pts_next as i64;
            buf.duration = duration as i64;
            buf.sequence = self.blocks;
            self.pts_next = pts_next;
            self.blocks += 1;
            out.push(buf);
        }
        Ok(out)
    }
}

impl Node for AudioDecodeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: Buffer) -> Result<BufferList> {
        self.decode_packet(input)
    }
}

impl VideoDecoder for Box<dyn VideoDecoder> {
    fn decode(
        &mut self,
        data: &[u8],
        pts: Option<i64>,
    ) -> transcode_core::Result<Vec<DecodedPicture>> {
        (**self).decode(data, pts)
    }

    fn drain(&mut self) -> transcode_core::Result<Vec<DecodedPicture>> {
        (**self).drain()
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn timing(&self) -> Option<StreamTiming> {
        (**self).timing()
    }
}

impl AudioDecoder for Box<dyn AudioDecoder> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn decode(&mut self, data: &[u8]) -> transcode_core::Result<Vec<DecodedAudio>> {
        (**self).decode(data)
    }
}
