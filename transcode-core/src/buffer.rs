//! The unit of data flowing between pipeline stages.
//!
//! A [`Buffer`] is a timestamped frame, sample block or compressed payload.
//! Buffers are exclusively owned by whichever stage holds them: they are not
//! `Clone`, and copying pixel data requires an explicit [`Buffer::dup`].
//! A stage that emits several buffers at once hands them over as a
//! [`BufferList`], which converts to and from a singly-linked chain of
//! buffers.

use bitflags::bitflags;
use std::collections::VecDeque;
use std::fmt;

bitflags! {
    /// Picture properties carried from the decoder to the filters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u16 {
        /// Top field is displayed first.
        const TOP_FIELD_FIRST = 0x0001;
        /// Progressive frame (both fields captured at the same instant).
        const PROGRESSIVE = 0x0002;
        /// The first field is displayed a second time.
        const REPEAT_FIRST_FIELD = 0x0004;
        /// The whole frame is displayed a second time.
        const REPEAT_FRAME = 0x0008;
        /// Decoder reported a keyframe.
        const KEYFRAME = 0x0010;
    }
}

/// Planar layouts the filters understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelLayout {
    /// Planar YUV 4:2:0.
    Yuv420p,
    /// Planar YUV 4:2:2.
    Yuv422p,
    /// Planar YUV 4:4:4.
    Yuv444p,
    /// Single luma plane.
    Gray8,
}

impl PixelLayout {
    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
            Self::Gray8 => 1,
        }
    }

    /// Chroma subsampling factors (horizontal, vertical).
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (2, 2),
            Self::Yuv422p => (2, 1),
            Self::Yuv444p | Self::Gray8 => (1, 1),
        }
    }

    /// Dimensions of a plane for a picture of `width` x `height`.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (usize, usize) {
        if plane == 0 {
            return (width as usize, height as usize);
        }
        let (hsub, vsub) = self.chroma_subsampling();
        (
            width.div_ceil(hsub) as usize,
            height.div_ceil(vsub) as usize,
        )
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yuv420p => write!(f, "yuv420p"),
            Self::Yuv422p => write!(f, "yuv422p"),
            Self::Yuv444p => write!(f, "yuv444p"),
            Self::Gray8 => write!(f, "gray8"),
        }
    }
}

/// One plane of pixel or sample data.
#[derive(Clone)]
pub struct Plane {
    /// Raw bytes, `stride * height` long.
    pub data: Vec<u8>,
    /// Bytes per row.
    pub stride: usize,
    /// Meaningful bytes per row.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl Plane {
    /// Allocate a zeroed plane with the stride aligned to 32 bytes.
    pub fn new(width: usize, height: usize) -> Self {
        let stride = (width + 31) & !31;
        Self {
            data: vec![0u8; stride * height],
            stride,
            width,
            height,
        }
    }

    /// Wrap existing bytes as a single-row plane.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data,
            stride: len,
            width: len,
            height: 1,
        }
    }

    /// The meaningful bytes of row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        let offset = y * self.stride;
        &self.data[offset..offset + self.width]
    }

    /// Mutable access to the meaningful bytes of row `y`.
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let offset = y * self.stride;
        &mut self.data[offset..offset + self.width]
    }

    fn dup(&self) -> Self {
        Self {
            data: self.data.clone(),
            stride: self.stride,
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}

/// A timestamped unit of pipeline data.
///
/// `start`, `stop` and `duration` are 90 kHz ticks. `duration` is derived
/// from context (the frame-rate estimate, a sample count), never copied from
/// the container. A buffer with no planes (or only empty planes) is the
/// end-of-stream sentinel.
pub struct Buffer {
    /// Presentation start time.
    pub start: i64,
    /// Presentation stop time. `stop >= start` once corrected.
    pub stop: i64,
    /// Informative duration.
    pub duration: i64,
    /// Decode order, assigned when the buffer is decoded.
    pub sequence: u64,
    /// Picture flags.
    pub flags: BufferFlags,
    /// Chapter that starts at this buffer (0 = none).
    pub new_chap: u32,
    planes: Vec<Plane>,
    next: Option<Box<Buffer>>,
}

impl Buffer {
    /// Create a buffer from existing planes.
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self {
            start: 0,
            stop: 0,
            duration: 0,
            sequence: 0,
            flags: BufferFlags::empty(),
            new_chap: 0,
            planes,
            next: None,
        }
    }

    /// Allocate a zeroed picture.
    pub fn picture(layout: PixelLayout, width: u32, height: u32) -> Self {
        let planes = (0..layout.num_planes())
            .map(|p| {
                let (w, h) = layout.plane_dimensions(p, width, height);
                Plane::new(w, h)
            })
            .collect();
        Self::from_planes(planes)
    }

    /// Wrap a payload (audio samples, compressed data) as a single plane.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::from_planes(vec![Plane::from_bytes(data)])
    }

    /// The zero-size end-of-stream sentinel.
    pub fn eof() -> Self {
        Self::from_planes(Vec::new())
    }

    /// Total payload size in bytes.
    pub fn size(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Whether this is the end-of-stream sentinel.
    pub fn is_eof(&self) -> bool {
        self.size() == 0
    }

    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// All planes.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// A plane by index.
    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    /// Mutable access to a plane by index.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut Plane> {
        self.planes.get_mut(index)
    }

    /// Width of the first plane.
    pub fn width(&self) -> usize {
        self.planes.first().map(|p| p.width).unwrap_or(0)
    }

    /// Height of the first plane.
    pub fn height(&self) -> usize {
        self.planes.first().map(|p| p.height).unwrap_or(0)
    }

    /// Copy timing, sequence, flags and chapter mark from another buffer.
    pub fn copy_props_from(&mut self, other: &Buffer) {
        self.start = other.start;
        self.stop = other.stop;
        self.duration = other.duration;
        self.sequence = other.sequence;
        self.flags = other.flags;
        self.new_chap = other.new_chap;
    }

    /// An explicit deep copy of payload and properties. The chain link is
    /// not copied.
    pub fn dup(&self) -> Self {
        let mut copy = Self::from_planes(self.planes.iter().map(Plane::dup).collect());
        copy.copy_props_from(self);
        copy
    }

    /// Allocate an empty picture with the same plane geometry.
    pub fn alloc_like(&self) -> Self {
        let planes = self
            .planes
            .iter()
            .map(|p| Plane {
                data: vec![0u8; p.data.len()],
                stride: p.stride,
                width: p.width,
                height: p.height,
            })
            .collect();
        Self::from_planes(planes)
    }

    /// Whether two buffers share plane geometry.
    pub fn same_geometry(&self, other: &Buffer) -> bool {
        self.planes.len() == other.planes.len()
            && self
                .planes
                .iter()
                .zip(&other.planes)
                .all(|(a, b)| a.width == b.width && a.height == b.height && a.stride == b.stride)
    }

    /// Detach and return the next buffer of the chain.
    pub fn take_next(&mut self) -> Option<Buffer> {
        self.next.take().map(|b| *b)
    }

    /// Whether this buffer heads a chain of more than one.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // unlink the chain iteratively
        let mut next = self.next.take();
        while let Some(mut buf) = next {
            next = buf.next.take();
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("start", &self.start)
            .field("stop", &self.stop)
            .field("sequence", &self.sequence)
            .field("flags", &self.flags)
            .field("size", &self.size())
            .field("chained", &self.next.is_some())
            .finish()
    }
}

/// An owned batch of buffers emitted together.
///
/// Buffers are queued unlinked; [`into_head`](BufferList::into_head) and
/// [`from_head`](BufferList::from_head) convert to and from the linked
/// `next` chain.
#[derive(Debug, Default)]
pub struct BufferList {
    items: VecDeque<Buffer>,
}

impl BufferList {
    /// An empty chain.
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Adopt an existing chain.
    pub fn from_head(head: Buffer) -> Self {
        let mut list = Self::new();
        let mut cursor = Some(head);
        while let Some(mut buf) = cursor {
            cursor = buf.take_next();
            list.push(buf);
        }
        list
    }

    /// Append a buffer at the tail of the chain.
    pub fn push(&mut self, mut buf: Buffer) {
        debug_assert!(buf.next.is_none(), "pushing a buffer that heads a chain");
        buf.next = None;
        self.items.push_back(buf);
    }

    /// Append every buffer of another chain.
    pub fn append(&mut self, mut other: BufferList) {
        self.items.append(&mut other.items);
    }

    /// Detach the first buffer, transferring ownership to the caller.
    pub fn pop_front(&mut self) -> Option<Buffer> {
        self.items.pop_front()
    }

    /// The first buffer, if any.
    pub fn front(&self) -> Option<&Buffer> {
        self.items.front()
    }

    /// Mutable access to the last buffer, if any.
    pub fn back_mut(&mut self) -> Option<&mut Buffer> {
        self.items.back_mut()
    }

    /// Number of buffers in the chain.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate the chain without taking ownership.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.items.iter())
    }

    /// Hand the chain over as its linked head buffer.
    pub fn into_head(mut self) -> Option<Buffer> {
        let mut head: Option<Buffer> = None;
        while let Some(mut buf) = self.items.pop_back() {
            buf.next = head.map(Box::new);
            head = Some(buf);
        }
        head
    }
}

/// Borrowing iterator over a [`BufferList`].
pub struct Iter<'a>(std::collections::vec_deque::Iter<'a, Buffer>);

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Buffer;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// Consuming iterator over a [`BufferList`].
pub struct IntoIter(std::collections::vec_deque::IntoIter<Buffer>);

impl Iterator for IntoIter {
    type Item = Buffer;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl IntoIterator for BufferList {
    type Item = Buffer;
    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter(self.items.into_iter())
    }
}

impl FromIterator<Buffer> for BufferList {
    fn from_iter<I: IntoIterator<Item = Buffer>>(iter: I) -> Self {
        let mut list = Self::new();
        for buf in iter {
            list.push(buf);
        }
        list
    }
}
