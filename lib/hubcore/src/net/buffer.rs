use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

/// An immutable, sealed sequence of bytes. A broadcast produces one `Buffer`
/// which every recipient's write queue references through `Rc`; the last
/// queue to drain it releases the allocation.
pub struct Buffer {
    data: Vec<u8>,
}

pub type SharedBuffer = Rc<Buffer>;

impl Buffer {
    #[inline]
    pub fn new(data: Vec<u8>) -> SharedBuffer {
        Rc::new(Buffer { data })
    }

    #[inline]
    pub fn from_line(line: &str) -> SharedBuffer {
        Buffer::new(line.as_bytes().to_vec())
    }

    /// One zlib frame holding the whole payload. Used for the compressed
    /// roster stream sent to peers that advertised `ZLIF`.
    pub fn zlib(payload: &[u8]) -> SharedBuffer {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload)
            .expect("Error compressing into memory");
        Buffer::new(encoder.finish().expect("Error finishing zlib frame"))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Write priority. Control-plane lines (handshake replies, status) drain
/// ahead of routed traffic; routed traffic stays strictly FIFO within the
/// data band.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Priority {
    Control,
    Data,
}

/// Prioritized queue of shared buffers. The buffer currently draining is
/// tracked with its write offset and is always finished before the next one
/// starts, whatever its band.
pub struct WriteQueue {
    current: Option<(SharedBuffer, usize)>,
    control: VecDeque<SharedBuffer>,
    data: VecDeque<SharedBuffer>,
}

impl WriteQueue {
    #[inline]
    pub fn new() -> WriteQueue {
        WriteQueue {
            current: None,
            control: VecDeque::new(),
            data: VecDeque::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, priority: Priority, buffer: SharedBuffer) {
        match priority {
            Priority::Control => self.control.push_back(buffer),
            Priority::Data => self.data.push_back(buffer),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.control.is_empty() && self.data.is_empty()
    }

    /// Total bytes still to be written.
    pub fn pending(&self) -> usize {
        let active = match &self.current {
            Some((buffer, offset)) => buffer.len() - offset,
            None => 0,
        };

        active
            + self.control.iter().map(|buffer| buffer.len()).sum::<usize>()
            + self.data.iter().map(|buffer| buffer.len()).sum::<usize>()
    }

    /// Write as much queued data as the writer accepts. `WouldBlock` stops
    /// the drain without error; a zero-length write surfaces as `WriteZero`.
    pub fn drain<W: io::Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        let mut total = 0usize;

        loop {
            if self.current.is_none() {
                self.current = self
                    .control
                    .pop_front()
                    .or_else(|| self.data.pop_front())
                    .map(|buffer| (buffer, 0));
            }

            let finished = {
                let (buffer, offset) = match &mut self.current {
                    Some(active) => (&active.0, &mut active.1),
                    None => return Ok(total),
                };

                match writer.write(&buffer.as_slice()[*offset..]) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(count) => {
                        *offset += count;
                        total += count;
                        *offset == buffer.len()
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                    Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            };

            if finished {
                self.current = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.control.clear();
        self.data.clear();
    }

    /// All queued bytes in drain order. Test and diagnostics helper.
    pub fn queued(&self) -> Vec<u8> {
        let mut out = Vec::new();

        if let Some((buffer, offset)) = &self.current {
            out.extend_from_slice(&buffer.as_slice()[*offset..]);
        }
        for buffer in &self.control {
            out.extend_from_slice(buffer.as_slice());
        }
        for buffer in &self.data {
            out.extend_from_slice(buffer.as_slice());
        }

        out
    }
}
