use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::process::Stdio;

/// An owned OS stream handle bound to one of a stage's standard streams.
///
/// Dropping a `Stream` closes the underlying descriptor.
#[derive(Debug)]
pub enum Stream {
    File(File),
    PipeReader(PipeReader),
    PipeWriter(PipeWriter),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::File(f) => f.read(buf),
            Stream::PipeReader(r) => r.read(buf),
            Stream::PipeWriter(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot read from the write end of a pipe",
            )),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::File(f) => f.write(buf),
            Stream::PipeWriter(w) => w.write(buf),
            Stream::PipeReader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot write to the read end of a pipe",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::File(f) => f.flush(),
            Stream::PipeWriter(w) => w.flush(),
            Stream::PipeReader(_) => Ok(()),
        }
    }
}

impl From<Stream> for Stdio {
    fn from(stream: Stream) -> Self {
        match stream {
            Stream::File(f) => f.into(),
            Stream::PipeReader(r) => r.into(),
            Stream::PipeWriter(w) => w.into(),
        }
    }
}

/// Ownership state of one standard-stream slot of an execution unit.
///
/// `Transferred` records that the handle left the unit (handed to a child process or
/// lent to a builtin and closed), so it can never be closed or used twice.
#[derive(Debug, Default)]
pub enum StreamSlot {
    #[default]
    None,
    Owned(Stream),
    Transferred,
}

impl StreamSlot {
    /// Install `stream`, returning whatever the slot held before.
    pub fn set(&mut self, stream: Stream) -> Option<Stream> {
        match std::mem::replace(self, StreamSlot::Owned(stream)) {
            StreamSlot::Owned(previous) => Some(previous),
            StreamSlot::None | StreamSlot::Transferred => None,
        }
    }

    /// Move the handle out of the slot. The slot is marked `Transferred` if it held one.
    pub fn take(&mut self) -> Option<Stream> {
        match std::mem::take(self) {
            StreamSlot::Owned(stream) => {
                *self = StreamSlot::Transferred;
                Some(stream)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// Close a still-owned handle in place.
    pub fn close(&mut self) {
        if self.is_owned() {
            *self = StreamSlot::Transferred;
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, StreamSlot::Owned(_))
    }
}
