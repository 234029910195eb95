//! Video filter chain.
//!
//! Filters sit between the video decode stage and the muxer. A filter may
//! hold buffers back (the deinterlacer keeps a three-frame window), so each
//! one returns a batch and is flushed at end of stream.

use crate::node::Node;
use crate::Result;
use transcode_core::{Buffer, BufferList};
use transcode_deinterlace::{DeinterlaceConfig, Deinterlacer, YadifDeinterlacer};

/// Base filter trait.
pub trait Filter: Send {
    /// Get filter name.
    fn name(&self) -> &str;

    /// Check if filter is enabled.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Video filter trait.
pub trait VideoFilter: Filter {
    /// Process a video frame.
    fn process(&mut self, frame: Buffer) -> Result<BufferList>;

    /// Flush any buffered frames.
    fn flush(&mut self) -> Result<BufferList> {
        Ok(BufferList::new())
    }
}

/// Chain of filters.
pub struct FilterChain<F: ?Sized> {
    filters: Vec<Box<F>>,
}

impl<F: ?Sized> Default for FilterChain<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> FilterChain<F> {
    /// Create a new empty filter chain.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the chain.
    pub fn add(&mut self, filter: Box<F>) {
        self.filters.push(filter);
    }

    /// Get number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if chain is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl FilterChain<dyn VideoFilter> {
    /// Process a video frame through all filters.
    pub fn process(&mut self, frame: Buffer) -> Result<BufferList> {
        self.run_from(0, BufferList::from_head(frame))
    }

    /// Flush all filters, first to last. Whatever a filter flushes passes
    /// through the filters after it.
    pub fn flush(&mut self) -> Result<BufferList> {
        let mut out = BufferList::new();
        for index in 0..self.filters.len() {
            let flushed = if self.filters[index].is_enabled() {
                self.filters[index].flush()?
            } else {
                BufferList::new()
            };
            out.append(self.run_from(index + 1, flushed)?);
        }
        Ok(out)
    }

    fn run_from(&mut self, first: usize, mut frames: BufferList) -> Result<BufferList> {
        for filter in self.filters.iter_mut().skip(first) {
            if !filter.is_enabled() {
                continue;
            }
            let mut next = BufferList::new();
            for frame in frames {
                next.append(filter.process(frame)?);
            }
            frames = next;
        }
        Ok(frames)
    }
}

/// Deinterlacing filter.
pub struct DeinterlaceFilter {
    deinterlacer: YadifDeinterlacer,
}

impl DeinterlaceFilter {
    /// Create a deinterlacing filter.
    pub fn new(config: DeinterlaceConfig) -> Result<Self> {
        Ok(Self {
            deinterlacer: YadifDeinterlacer::new(config)?,
        })
    }

    /// The wrapped deinterlacer.
    pub fn deinterlacer(&self) -> &YadifDeinterlacer {
        &self.deinterlacer
    }
}

impl Filter for DeinterlaceFilter {
    fn name(&self) -> &str {
        "deinterlace"
    }
}

impl VideoFilter for DeinterlaceFilter {
    fn process(&mut self, frame: Buffer) -> Result<BufferList> {
        Ok(Deinterlacer::process(&mut self.deinterlacer, frame)?)
    }

    fn flush(&mut self) -> Result<BufferList> {
        Ok(Deinterlacer::flush(&mut self.deinterlacer)?)
    }
}

/// Runs a filter chain as a pipeline node.
///
/// The end-of-stream buffer is held back from the filters: the chain is
/// flushed and the sentinel forwarded after everything it released.
pub struct FilterNode {
    name: String,
    chain: FilterChain<dyn VideoFilter>,
}

impl FilterNode {
    /// Wrap a filter chain.
    pub fn new(name: impl Into<String>, chain: FilterChain<dyn VideoFilter>) -> Self {
        Self {
            name: name.into(),
            chain,
        }
    }
}

impl Node for FilterNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: Buffer) -> Result<BufferList> {
        if input.is_eof() {
            let mut out = self.chain.flush()?;
            out.push(input);
            return Ok(out);
        }
        self.chain.process(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::PixelLayout;

    /// Holds one frame back, shifting timestamps by 1.
    struct Delay {
        held: Option<Buffer>,
        enabled: bool,
    }

    impl Filter for Delay {
        fn name(&self) -> &str {
            "delay"
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    impl VideoFilter for Delay {
        fn process(&mut self, mut frame: Buffer) -> Result<BufferList> {
            frame.start += 1;
            Ok(self.held.replace(frame).into_iter().collect())
        }

        fn flush(&mut self) -> Result<BufferList> {
            Ok(self.held.take().into_iter().collect())
        }
    }

    fn frame(start: i64) -> Buffer {
        let mut buf = Buffer::picture(PixelLayout::Gray8, 8, 8);
        buf.start = start;
        buf
    }

    fn delay(enabled: bool) -> Box<dyn VideoFilter> {
        Box::new(Delay {
            held: None,
            enabled,
        })
    }

    fn starts(list: BufferList) -> Vec<i64> {
        list.into_iter().map(|b| b.start).collect()
    }

    #[test]
    fn test_empty_chain_passes_through() {
        let mut chain: FilterChain<dyn VideoFilter> = FilterChain::new();
        assert!(chain.is_empty());
        assert_eq!(starts(chain.process(frame(5)).unwrap()), vec![5]);
        assert!(chain.flush().unwrap().is_empty());
    }

    #[test]
    fn test_chained_flush_passes_downstream() {
        let mut chain: FilterChain<dyn VideoFilter> = FilterChain::new();
        chain.add(delay(true));
        chain.add(delay(true));
        assert_eq!(chain.len(), 2);

        assert!(chain.process(frame(0)).unwrap().is_empty());
        assert!(chain.process(frame(10)).unwrap().is_empty());
        assert_eq!(starts(chain.process(frame(20)).unwrap()), vec![2]);
        // both held frames come out, each through every filter
        assert_eq!(starts(chain.flush().unwrap()), vec![12, 22]);
    }

    #[test]
    fn test_flush_runs_each_frame_through_later_filters_once() {
        let mut chain: FilterChain<dyn VideoFilter> = FilterChain::new();
        for _ in 0..3 {
            chain.add(delay(true));
        }

        let mut out = Vec::new();
        for start in [0, 10, 20, 30] {
            out.extend(starts(chain.process(frame(start)).unwrap()));
        }
        assert_eq!(out, vec![3]);
        out.extend(starts(chain.flush().unwrap()));
        assert_eq!(out, vec![3, 13, 23, 33]);
    }

    #[test]
    fn test_disabled_filter_skipped() {
        let mut chain: FilterChain<dyn VideoFilter> = FilterChain::new();
        chain.add(delay(false));
        assert_eq!(starts(chain.process(frame(3)).unwrap()), vec![3]);
    }

    #[test]
    fn test_filter_node_forwards_eof_last() {
        let mut chain: FilterChain<dyn VideoFilter> = FilterChain::new();
        chain.add(delay(true));
        let mut node = FilterNode::new("filters", chain);

        assert!(node.process(frame(0)).unwrap().is_empty());
        let out: Vec<Buffer> = node.process(Buffer::eof()).unwrap().into_iter().collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start, 1);
        assert!(out[1].is_eof());
    }

    #[test]
    fn test_deinterlace_filter_latency() {
        let config = DeinterlaceConfig::default().with_segments(2);
        let mut filter = DeinterlaceFilter::new(config).unwrap();
        assert_eq!(filter.name(), "deinterlace");
        assert!(VideoFilter::process(&mut filter, frame(0)).unwrap().is_empty());
        assert_eq!(VideoFilter::process(&mut filter, frame(3003)).unwrap().len(), 1);
        assert_eq!(VideoFilter::flush(&mut filter).unwrap().len(), 1);
        assert_eq!(filter.deinterlacer().stats().frames_out, 2);
    }
}
