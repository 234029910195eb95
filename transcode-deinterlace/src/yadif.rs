//! YADIF (Yet Another Deinterlacing Filter) implementation.
//!
//! YADIF rebuilds the missing field of an interlaced frame from a sliding
//! window of three frames: previous, current and next.
//!
//! # Algorithm Overview
//!
//! For each pixel of a row that must be rebuilt:
//!
//! 1. **Spatial prediction**: average the rows above and below, following
//!    whichever diagonal (one or two pixels off-axis) has the smallest
//!    discontinuity.
//! 2. **Temporal prediction**: average the same-parity rows of the
//!    neighbouring frames.
//! 3. **Clamp**: keep the spatial prediction within a band around the
//!    temporal one. The band is the largest of three temporal differences,
//!    optionally widened by a second check two rows away.
//!
//! Rows of the preserved field are copied. The first and last two rows
//! cannot be filtered and copy the nearest preserved row instead.
//!
//! # Threading
//!
//! Every plane is cut into horizontal segments, one per worker of a
//! persistent [`Taskset`]. Each worker filters its rows of every plane and
//! hands them back; output is identical for any segment count.
//!
//! # References
//!
//! - YADIF ("yet another deinterlacing filter") by Michael Niedermayer

use crate::config::{DeinterlaceConfig, FilterMode, OutputRate, Parity};
use crate::error::{DeinterlaceError, Result};
use crate::refine::MotionRefiner;
use crate::taskset::Taskset;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, trace};
use transcode_core::{Buffer, BufferFlags, BufferList, Plane};

/// Smallest luma dimension the filter accepts.
const MIN_DIMENSION: usize = 4;

/// Work shared by every segment of one field pass.
#[derive(Debug)]
pub(crate) struct FieldJob {
    prev: Arc<Buffer>,
    cur: Arc<Buffer>,
    next: Arc<Buffer>,
    /// Rows with `(y ^ parity) & 1 == 1` are rebuilt.
    parity: usize,
    tff: usize,
    mode: FilterMode,
    spatial_check: bool,
}

/// Rows `start..` of one plane, filtered by one segment.
#[derive(Debug)]
pub(crate) struct PlaneRows {
    plane: usize,
    start: usize,
    data: Vec<u8>,
}

#[inline]
fn at(plane: &Plane, x: isize, y: usize) -> i32 {
    let x = x.clamp(0, plane.width as isize - 1) as usize;
    i32::from(plane.data[y * plane.stride + x])
}

/// Edge-directed average of rows `y - 1` and `y + 1`.
fn spatial_predict(cur: &Plane, x: isize, y: usize) -> i32 {
    let (up, down) = (y - 1, y + 1);
    let c = at(cur, x, up);
    let e = at(cur, x, down);

    let mut pred = (c + e) >> 1;
    let mut score = (at(cur, x - 1, up) - at(cur, x - 1, down)).abs()
        + (c - e).abs()
        + (at(cur, x + 1, up) - at(cur, x + 1, down)).abs()
        - 1;

    // the two-pixel diagonal is only tried when the one-pixel one won
    for dir in [-1isize, 1] {
        for j in [dir, 2 * dir] {
            let s = (at(cur, x - 1 + j, up) - at(cur, x - 1 - j, down)).abs()
                + (at(cur, x + j, up) - at(cur, x - j, down)).abs()
                + (at(cur, x + 1 + j, up) - at(cur, x + 1 - j, down)).abs();
            if s >= score {
                break;
            }
            score = s;
            pred = (at(cur, x + j, up) + at(cur, x - j, down)) >> 1;
        }
    }
    pred
}

/// Rebuild row `y` from the three-frame window.
///
/// `parity` selects which neighbour frames hold the same field as the
/// row: previous + current when set, current + next otherwise.
fn filter_line(
    dst: &mut [u8],
    prev: &Plane,
    cur: &Plane,
    next: &Plane,
    y: usize,
    parity: bool,
    spatial_check: bool,
) {
    let (prev2, next2) = if parity { (prev, cur) } else { (cur, next) };
    let (up, down) = (y - 1, y + 1);

    for (x, out) in dst.iter_mut().enumerate() {
        let x = x as isize;
        let c = at(cur, x, up);
        let e = at(cur, x, down);
        let d = (at(prev2, x, y) + at(next2, x, y)) >> 1;

        let temporal_diff0 = (at(prev2, x, y) - at(next2, x, y)).abs();
        let temporal_diff1 = ((at(prev, x, up) - c).abs() + (at(prev, x, down) - e).abs()) >> 1;
        let temporal_diff2 = ((at(next, x, up) - c).abs() + (at(next, x, down) - e).abs()) >> 1;
        let mut diff = (temporal_diff0 >> 1).max(temporal_diff1).max(temporal_diff2);

        if spatial_check {
            let b = (at(prev2, x, y - 2) + at(next2, x, y - 2)) >> 1;
            let f = (at(prev2, x, y + 2) + at(next2, x, y + 2)) >> 1;
            let max = (d - e).max(d - c).max((b - c).min(f - e));
            let min = (d - e).min(d - c).min((b - c).max(f - e));
            diff = diff.max(min).max(-max);
        }

        let pred = spatial_predict(cur, x, y).clamp(d - diff, d + diff);
        *out = pred as u8;
    }
}

/// Spatial-only rebuild of row `y`.
fn interpolate_line(dst: &mut [u8], cur: &Plane, y: usize) {
    for (x, out) in dst.iter_mut().enumerate() {
        *out = spatial_predict(cur, x as isize, y) as u8;
    }
}

/// Nearest row of the preserved field.
fn preserved_neighbour(y: usize, height: usize) -> usize {
    if y ^ 1 < height {
        y ^ 1
    } else {
        y - 1
    }
}

/// Rows of `height` handled by `segment` of `count`.
///
/// Segments are an even number of rows so both fields split alike; the
/// last segment takes the remainder.
pub fn segment_rows(height: usize, segment: usize, count: usize) -> (usize, usize) {
    let segment_height = (height / count) & !1;
    let start = segment_height * segment;
    let stop = if segment == count - 1 {
        height
    } else {
        segment_height * (segment + 1)
    };
    (start, stop)
}

/// Filter one segment of every plane.
pub(crate) fn filter_segment(segment: usize, count: usize, job: &FieldJob) -> Vec<PlaneRows> {
    let mut out = Vec::with_capacity(job.cur.num_planes());

    for (index, cur) in job.cur.planes().iter().enumerate() {
        let (prev, next) = match (job.prev.plane(index), job.next.plane(index)) {
            (Some(prev), Some(next)) => (prev, next),
            _ => (cur, cur),
        };
        let (w, h) = (cur.width, cur.height);
        let (start, stop) = segment_rows(h, segment, count);
        let mut data = vec![0u8; (stop - start) * w];

        for (y, dst) in (start..stop).zip(data.chunks_exact_mut(w.max(1))) {
            if (y ^ job.parity) & 1 == 0 {
                dst.copy_from_slice(cur.row(y));
                continue;
            }
            match job.mode {
                FilterMode::SpatialTemporal if y > 1 && y + 2 < h => filter_line(
                    dst,
                    prev,
                    cur,
                    next,
                    y,
                    (job.parity ^ job.tff) == 1,
                    job.spatial_check,
                ),
                FilterMode::Spatial if y > 0 && y + 1 < h => interpolate_line(dst, cur, y),
                _ => dst.copy_from_slice(cur.row(preserved_neighbour(y, h))),
            }
        }

        out.push(PlaneRows {
            plane: index,
            start,
            data,
        });
    }
    out
}

/// Counters for a deinterlacer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeinterlaceStats {
    /// Frames accepted.
    pub frames_in: u64,
    /// Frames produced.
    pub frames_out: u64,
    /// Taskset cycles run.
    pub cycles: u64,
}

/// YADIF deinterlacer state.
pub struct YadifDeinterlacer {
    config: DeinterlaceConfig,
    /// Sliding window: previous, current, next.
    window: [Option<Arc<Buffer>>; 3],
    primed: bool,
    taskset: Taskset<Arc<FieldJob>, Vec<PlaneRows>>,
    refiner: Option<MotionRefiner>,
    stats: DeinterlaceStats,
}

impl YadifDeinterlacer {
    /// Create a deinterlacer and start its segment workers.
    pub fn new(config: DeinterlaceConfig) -> Result<Self> {
        config.validate()?;
        let segments = config.segments.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let taskset = Taskset::spawn("deinterlace", segments, move |segment, job: Arc<FieldJob>| {
            filter_segment(segment, segments, &job)
        })?;

        info!(
            segments,
            mode = ?config.mode,
            rate = ?config.rate,
            refine = config.refine.is_some(),
            "deinterlacer ready"
        );

        Ok(Self {
            refiner: config.refine.map(MotionRefiner::new),
            config,
            window: [None, None, None],
            primed: false,
            taskset,
            stats: DeinterlaceStats::default(),
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &DeinterlaceConfig {
        &self.config
    }

    /// Number of worker segments.
    pub fn segments(&self) -> usize {
        self.taskset.count()
    }

    /// Counters.
    pub fn stats(&self) -> DeinterlaceStats {
        self.stats
    }

    /// Push a frame.
    ///
    /// With the temporal filter the first frame only primes the window and
    /// yields nothing; every later frame yields the output for the frame
    /// before it. The zero-size end-of-stream buffer flushes the window and
    /// is passed through last.
    pub fn push_frame(&mut self, frame: Buffer) -> Result<BufferList> {
        if frame.is_eof() {
            let mut out = self.flush()?;
            out.push(frame);
            return Ok(out);
        }
        self.validate_frame(&frame)?;
        self.stats.frames_in += 1;

        if self.config.mode == FilterMode::Spatial {
            let frame = Arc::new(frame);
            return Ok(self.filter_fields(Arc::clone(&frame), Arc::clone(&frame), frame));
        }

        let frame = Arc::new(frame);
        self.store_ref(Arc::clone(&frame));
        if !self.primed {
            // no previous frame yet: the first frame stands in for it
            self.store_ref(Arc::new(frame.dup()));
            self.primed = true;
            trace!("deinterlace window primed");
            return Ok(BufferList::new());
        }
        Ok(self.filter_window())
    }

    /// Emit the frame still held by the window, using a copy of it as the
    /// next frame.
    pub fn flush(&mut self) -> Result<BufferList> {
        if !self.primed {
            return Ok(BufferList::new());
        }
        let Some(last) = self.window[2].as_ref().map(|b| b.dup()) else {
            return Ok(BufferList::new());
        };
        self.store_ref(Arc::new(last));
        let out = self.filter_window();
        self.window = [None, None, None];
        self.primed = false;
        debug!(frames_out = self.stats.frames_out, "deinterlacer flushed");
        Ok(out)
    }

    /// Drop the window and refinement history.
    pub fn reset(&mut self) {
        self.window = [None, None, None];
        self.primed = false;
        if let Some(refiner) = &mut self.refiner {
            refiner.reset();
        }
    }

    fn store_ref(&mut self, frame: Arc<Buffer>) {
        self.window.rotate_left(1);
        self.window[2] = Some(frame);
    }

    fn filter_window(&mut self) -> BufferList {
        match &self.window {
            [Some(prev), Some(cur), Some(next)] => {
                let (prev, cur, next) = (Arc::clone(prev), Arc::clone(cur), Arc::clone(next));
                self.filter_fields(prev, cur, next)
            }
            _ => BufferList::new(),
        }
    }

    fn filter_fields(&mut self, prev: Arc<Buffer>, cur: Arc<Buffer>, next: Arc<Buffer>) -> BufferList {
        let tff = match self.config.parity {
            // field order of the frame being rebuilt, not of the newest input
            Parity::Auto => usize::from(cur.flags.contains(BufferFlags::TOP_FIELD_FIRST)),
            Parity::Top => 1,
            Parity::Bottom => 0,
        };
        let bob = self.config.rate == OutputRate::Bob;
        let passes = self.config.passes();

        let mut frames = Vec::with_capacity(2);
        for pass in 0..passes {
            let job = Arc::new(FieldJob {
                prev: Arc::clone(&prev),
                cur: Arc::clone(&cur),
                next: Arc::clone(&next),
                parity: pass ^ tff ^ 1,
                tff,
                mode: self.config.mode,
                spatial_check: self.config.spatial_check,
            });
            let mut frame = self.run(&job);
            if let Some(refiner) = &mut self.refiner {
                frame = refiner.refine(&frame, job.parity);
            }
            if bob || pass == passes - 1 {
                frame.copy_props_from(&cur);
                frames.push(frame);
            }
        }

        if bob {
            if let [first, second] = frames.as_mut_slice() {
                first.stop -= (first.stop - first.start) / 2;
                first.duration = first.stop - first.start;
                second.start = first.stop;
                second.duration = second.stop - second.start;
                second.new_chap = 0;
            }
        }

        self.stats.frames_out += frames.len() as u64;
        frames.into_iter().collect()
    }

    /// One taskset cycle: every segment of every plane.
    fn run(&mut self, job: &Arc<FieldJob>) -> Buffer {
        let args = vec![Arc::clone(job); self.taskset.count()];
        let results = self.taskset.cycle(args);
        self.stats.cycles += 1;

        let mut dst = job.cur.alloc_like();
        for rows in results.into_iter().flatten() {
            if let Some(plane) = dst.plane_mut(rows.plane) {
                let width = plane.width;
                for (i, src) in rows.data.chunks_exact(width.max(1)).enumerate() {
                    plane.row_mut(rows.start + i).copy_from_slice(src);
                }
            }
        }
        dst
    }

    fn validate_frame(&self, frame: &Buffer) -> Result<()> {
        let (width, height) = (frame.width(), frame.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(DeinterlaceError::invalid_dimensions(width, height));
        }
        if frame.num_planes() > 3 {
            return Err(DeinterlaceError::unsupported_format(format!(
                "{} planes",
                frame.num_planes()
            )));
        }
        for plane in frame.planes() {
            // subsampled planes need both fields and a row to clamp into
            if plane.width < 2 || plane.height < 2 {
                return Err(DeinterlaceError::invalid_dimensions(plane.width, plane.height));
            }
            if plane.stride < plane.width || plane.data.len() < plane.stride * plane.height {
                return Err(DeinterlaceError::unsupported_format(format!(
                    "{}x{} plane with stride {} and {} bytes",
                    plane.width,
                    plane.height,
                    plane.stride,
                    plane.data.len()
                )));
            }
        }
        if let Some(last) = &self.window[2] {
            if self.config.mode == FilterMode::SpatialTemporal && !last.same_geometry(frame) {
                return Err(DeinterlaceError::frame_mismatch(
                    last.width(),
                    last.height(),
                    width,
                    height,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefineConfig;
    use transcode_core::PixelLayout;

    fn create_interlaced_frame(width: u32, height: u32, pattern: u8) -> Buffer {
        let mut frame = Buffer::picture(PixelLayout::Yuv420p, width, height);
        frame.flags = BufferFlags::TOP_FIELD_FIRST;
        for p in 0..3 {
            if let Some(plane) = frame.plane_mut(p) {
                for y in 0..plane.height {
                    let value = if y % 2 == 0 { pattern } else { 255 - pattern };
                    plane.row_mut(y).fill(value);
                }
            }
        }
        frame
    }

    fn timed(mut frame: Buffer, start: i64, duration: i64) -> Buffer {
        frame.start = start;
        frame.stop = start + duration;
        frame.duration = duration;
        frame
    }

    fn yadif(config: DeinterlaceConfig) -> YadifDeinterlacer {
        YadifDeinterlacer::new(config.with_segments(2)).unwrap()
    }

    #[test]
    fn test_segment_rows() {
        assert_eq!(segment_rows(16, 0, 2), (0, 8));
        assert_eq!(segment_rows(16, 1, 2), (8, 16));
        // odd splits round down to even heights; last takes the rest
        assert_eq!(segment_rows(15, 0, 2), (0, 6));
        assert_eq!(segment_rows(15, 1, 2), (6, 15));
        // more segments than row pairs
        assert_eq!(segment_rows(4, 2, 8), (0, 0));
        assert_eq!(segment_rows(4, 7, 8), (0, 4));
    }

    #[test]
    fn test_spatial_predict_flat() {
        let mut plane = Plane::new(8, 4);
        plane.data.fill(77);
        assert_eq!(spatial_predict(&plane, 0, 1), 77);
        assert_eq!(spatial_predict(&plane, 7, 2), 77);
    }

    #[test]
    fn test_spatial_predict_follows_diagonal() {
        // a one-pixel diagonal edge: row 0 bright from x=4, row 2 from x=2
        let mut plane = Plane::new(8, 3);
        for x in 0..8 {
            plane.row_mut(0)[x] = if x >= 4 { 200 } else { 0 };
            plane.row_mut(2)[x] = if x >= 2 { 200 } else { 0 };
        }
        // along the edge the prediction is a clean edge value, not a blur
        let v = spatial_predict(&plane, 3, 1);
        assert!(v == 0 || v == 200, "got {}", v);
    }

    #[test]
    fn test_priming_latency() {
        let mut yadif = yadif(DeinterlaceConfig::default());
        let out = yadif.push_frame(timed(create_interlaced_frame(16, 16, 50), 0, 3003)).unwrap();
        assert!(out.is_empty());

        let out = yadif.push_frame(timed(create_interlaced_frame(16, 16, 100), 3003, 3003)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.front().unwrap().start, 0);

        let out = yadif.push_frame(timed(create_interlaced_frame(16, 16, 150), 6006, 3003)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.front().unwrap().start, 3003);
    }

    #[test]
    fn test_bob_timing() {
        let mut yadif = yadif(DeinterlaceConfig::default().with_rate(OutputRate::Bob));
        let mut first = timed(create_interlaced_frame(16, 16, 50), 0, 3003);
        first.new_chap = 2;
        yadif.push_frame(first).unwrap();
        let out: Vec<Buffer> = yadif
            .push_frame(timed(create_interlaced_frame(16, 16, 100), 3003, 3003))
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start, 0);
        assert_eq!(out[0].stop, out[1].start);
        assert_eq!(out[1].stop, 3003);
        assert_eq!(out[0].duration + out[1].duration, 3003);
        assert_eq!(out[0].new_chap, 2);
        assert_eq!(out[1].new_chap, 0);
    }

    #[test]
    fn test_preserved_field_copied() {
        let mut yadif = yadif(DeinterlaceConfig::default().with_parity(Parity::Top));
        yadif.push_frame(create_interlaced_frame(16, 16, 40)).unwrap();
        let out = yadif.push_frame(create_interlaced_frame(16, 16, 90)).unwrap();
        let plane = out.front().unwrap().plane(0).unwrap();
        for y in (0..16).step_by(2) {
            assert!(plane.row(y).iter().all(|&v| v == 40));
        }
    }

    #[test]
    fn test_spatial_mode_no_latency() {
        let mut yadif = yadif(DeinterlaceConfig::default().with_mode(FilterMode::Spatial));
        let out = yadif.push_frame(create_interlaced_frame(16, 16, 60)).unwrap();
        assert_eq!(out.len(), 1);
        // rebuilt rows are interpolated from the kept field
        let plane = out.front().unwrap().plane(0).unwrap();
        assert!(plane.row(5).iter().all(|&v| v == 60));
        assert!(yadif.flush().unwrap().is_empty());
    }

    #[test]
    fn test_two_pass_refine_single_output() {
        let config = DeinterlaceConfig::default().with_refine(RefineConfig::default());
        let mut yadif = yadif(config);
        yadif.push_frame(create_interlaced_frame(16, 16, 50)).unwrap();
        let out = yadif.push_frame(create_interlaced_frame(16, 16, 100)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(yadif.stats().cycles, 2);
    }

    #[test]
    fn test_eof_flushes_and_passes_through() {
        let mut yadif = yadif(DeinterlaceConfig::default());
        yadif.push_frame(timed(create_interlaced_frame(16, 16, 50), 0, 3003)).unwrap();
        yadif.push_frame(timed(create_interlaced_frame(16, 16, 100), 3003, 3003)).unwrap();

        let out: Vec<Buffer> = yadif.push_frame(Buffer::eof()).unwrap().into_iter().collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start, 3003);
        assert!(out[1].is_eof());
        assert_eq!(yadif.stats().frames_in, 2);
        assert_eq!(yadif.stats().frames_out, 2);
    }

    #[test]
    fn test_reset() {
        let mut yadif = yadif(DeinterlaceConfig::default());
        yadif.push_frame(create_interlaced_frame(16, 16, 50)).unwrap();
        yadif.reset();
        assert!(yadif.push_frame(create_interlaced_frame(16, 16, 50)).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut yadif = yadif(DeinterlaceConfig::default());
        let result = yadif.push_frame(Buffer::picture(PixelLayout::Yuv420p, 2, 2));
        assert!(matches!(
            result,
            Err(DeinterlaceError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_degenerate_chroma_plane_rejected() {
        let mut yadif = yadif(DeinterlaceConfig::default());
        let frame = Buffer::from_planes(vec![Plane::new(16, 16), Plane::new(8, 1)]);
        assert!(matches!(
            yadif.push_frame(frame),
            Err(DeinterlaceError::InvalidDimensions { .. })
        ));

        let frame = Buffer::from_planes(vec![Plane::new(16, 16), Plane::new(0, 8)]);
        assert!(matches!(
            yadif.push_frame(frame),
            Err(DeinterlaceError::InvalidDimensions { .. })
        ));

        let mut short = Plane::new(16, 16);
        short.data.truncate(16);
        assert!(matches!(
            yadif.push_frame(Buffer::from_planes(vec![short])),
            Err(DeinterlaceError::UnsupportedFormat { .. })
        ));
        assert_eq!(yadif.stats().frames_in, 0);
    }

    #[test]
    fn test_frame_mismatch() {
        let mut yadif = yadif(DeinterlaceConfig::default());
        yadif.push_frame(create_interlaced_frame(16, 16, 50)).unwrap();
        let result = yadif.push_frame(create_interlaced_frame(32, 32, 100));
        assert!(matches!(result, Err(DeinterlaceError::FrameMismatch { .. })));
    }
}
