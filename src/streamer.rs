//! Seekable byte stream over a remote object.
//!
//! The transport's read call may return fewer bytes than requested for
//! reasons unrelated to end-of-stream, so a single [`std::io::Read::read`]
//! keeps re-issuing reads at the advancing offset until the request is
//! satisfied or the transport reports true end-of-stream. Seeks just move
//! the offset; nothing already transferred is fetched again.

use log::debug;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::transport::{DeviceId, DeviceTransport, ObjectHandle};

/// Readable, seekable view of one object's content.
///
/// The object size is declared up front from cached metadata so callers can
/// size buffers; reads past the declared size yield end-of-stream, not an
/// error. If the declared size overshoots the actual content, the stream
/// ends where the transport does.
pub struct ObjectStream {
    transport: Arc<dyn DeviceTransport>,
    device_id: DeviceId,
    handle: ObjectHandle,
    size: u64,
    offset: u64,
}

impl ObjectStream {
    pub(crate) fn new(transport: Arc<dyn DeviceTransport>, device_id: DeviceId, handle: ObjectHandle, size: u64) -> Self {
        Self {
            transport,
            device_id,
            handle,
            size,
            offset: 0,
        }
    }

    /// Declared object size in bytes, from cached metadata.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current read offset in bytes.
    pub fn position(&self) -> u64 {
        self.offset
    }
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("device_id", &self.device_id)
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.size - self.offset) as usize);

        let mut filled = 0;
        while filled < want {
            let chunk = self
                .transport
                .read_object(self.device_id, self.handle, self.offset, want - filled)
                .map_err(io::Error::other)?;
            if chunk.is_empty() {
                // True end-of-stream: the declared size was optimistic.
                debug!(
                    "object stream: transport EOF at offset {} (declared size {})",
                    self.offset, self.size
                );
                break;
            }
            let n = chunk.len().min(want - filled);
            buf[filled..filled + n].copy_from_slice(&chunk[..n]);
            filled += n;
            self.offset += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for ObjectStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
            SeekFrom::Current(delta) => self.offset as i128 + delta as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of object",
            ));
        }
        // Seeking past the declared size is allowed; reads there return EOF.
        self.offset = target as u64;
        Ok(self.offset)
    }
}
