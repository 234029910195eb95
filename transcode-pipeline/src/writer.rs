//! Output writer boundary.
//!
//! Container layouts live outside this crate. The synchronizer only needs
//! to open the output, append payloads track by track and close it.

use crate::Result;
use transcode_core::Buffer;

/// A container writer.
pub trait MuxWriter: Send {
    /// Format name, for logs.
    fn format_name(&self) -> &str;

    /// Open the output and write the header.
    fn init(&mut self) -> Result<()>;

    /// Append one payload to `track` (the index returned by
    /// [`Synchronizer::add_track`](crate::Synchronizer::add_track)).
    fn write(&mut self, track: usize, buffer: &Buffer) -> Result<()>;

    /// Write the trailer and close the output. Returns the final size in
    /// bytes, when known.
    fn finish(&mut self) -> Result<Option<u64>>;

    /// Whether interleaving must be strict: the format produces unplayable
    /// files when tracks drift apart.
    fn requires_strict_sync(&self) -> bool {
        false
    }
}

impl MuxWriter for Box<dyn MuxWriter> {
    fn format_name(&self) -> &str {
        (**self).format_name()
    }

    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn write(&mut self, track: usize, buffer: &Buffer) -> Result<()> {
        (**self).write(track, buffer)
    }

    fn finish(&mut self) -> Result<Option<u64>> {
        (**self).finish()
    }

    fn requires_strict_sync(&self) -> bool {
        (**self).requires_strict_sync()
    }
}

/// A writer that discards everything, counting bytes.
#[derive(Debug, Default)]
pub struct NullWriter {
    bytes: u64,
    strict: bool,
}

impl NullWriter {
    /// Create a null writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the writer ask for strict interleaving.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl MuxWriter for NullWriter {
    fn format_name(&self) -> &str {
        "null"
    }

    fn init(&mut self) -> Result<()> {
        self.bytes = 0;
        Ok(())
    }

    fn write(&mut self, _track: usize, buffer: &Buffer) -> Result<()> {
        self.bytes += buffer.size() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.bytes))
    }

    fn requires_strict_sync(&self) -> bool {
        self.strict
    }
}
