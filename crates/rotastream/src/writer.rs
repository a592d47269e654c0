//! Blocking `io::Write` adapter, so a rotator can back a tracing subscriber

use bytes::Bytes;
use std::io;
use tracing_subscriber::fmt::MakeWriter;

use crate::rotator::Rotator;

/// Forwards each write to the rotator's queue
#[derive(Debug)]
pub struct RotatorWriter<'a> {
    rotator: &'a Rotator,
}

impl io::Write for RotatorWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rotator
            .write(Bytes::copy_from_slice(buf))
            .map_err(|e| {
                if e.is_terminal() {
                    io::Error::new(io::ErrorKind::BrokenPipe, e)
                } else {
                    io::Error::other(e)
                }
            })?;
        Ok(buf.len())
    }

    // Commits happen on the rotator task
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Rotator {
    type Writer = RotatorWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatorWriter { rotator: self }
    }
}
