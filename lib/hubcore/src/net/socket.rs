use crate::net::buffer::{Priority, SharedBuffer, WriteQueue};
use crate::support::{SocketError, SocketResult};
use adcproto::command::MAX_LINE;
use adcproto::logging;
use mio::net::TcpStream;
use std::cmp::min;
use std::io::Read;
use std::net::Shutdown;
use std::time::{Duration, Instant};

/// Unauthenticated connections are dropped after this long.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Grace period for draining the write queue of a disconnecting session.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// A non-blocking line-framed connection: a 1 KiB read buffer feeding
/// complete lines upward and a prioritized queue of shared buffers going
/// down. The stream is optional so protocol logic can run against a
/// detached socket in tests.
pub struct Socket {
    stream: Option<TcpStream>,
    read_buf: [u8; MAX_LINE],
    read_pos: usize,
    queue: WriteQueue,
    disconnecting: bool,
    log: logging::Logger,
}

impl Socket {
    pub fn new(stream: Option<TcpStream>, log: logging::Logger) -> Socket {
        Socket {
            stream,
            read_buf: [0; MAX_LINE],
            read_pos: 0,
            queue: WriteQueue::new(),
            disconnecting: false,
            log,
        }
    }

    /// Register this socket on the supplied poll for both read and write
    /// readiness, edge triggered.
    pub fn register(&self, token: mio::Token, poll: &mio::Poll) -> ::std::io::Result<()> {
        poll.register(
            self.stream.as_ref().expect("Can't register a detached socket"),
            token,
            mio::Ready::readable() | mio::Ready::writable(),
            mio::PollOpt::edge(),
        )
    }

    pub fn deregister(&self, poll: &mio::Poll) -> ::std::io::Result<()> {
        match self.stream.as_ref() {
            Some(stream) => poll.deregister(stream),
            None => Ok(()),
        }
    }

    /// Read everything the stream has, appending complete lines to `lines`.
    /// Lines found before an error are kept; the error still tears the
    /// connection down.
    pub fn read_lines(&mut self, lines: &mut Vec<String>) -> SocketResult<()> {
        let mut chunk = [0u8; MAX_LINE];

        loop {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Ok(()),
            };

            match stream.read(&mut chunk) {
                Ok(0) => return Err(SocketError::Closed),
                Ok(count) => self.ingest(&chunk[..count], lines)?,
                Err(ref err) if err.kind() == ::std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref err) if err.kind() == ::std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Feed raw bytes through the line framer. Exposed separately so the
    /// framing rules are testable without a stream.
    pub fn ingest(&mut self, mut data: &[u8], lines: &mut Vec<String>) -> SocketResult<()> {
        while !data.is_empty() {
            let free = MAX_LINE - self.read_pos;
            if free == 0 {
                return Err(SocketError::Overflow);
            }

            let take = min(free, data.len());
            self.read_buf[self.read_pos..self.read_pos + take].copy_from_slice(&data[..take]);
            self.read_pos += take;
            data = &data[take..];

            self.extract(lines)?;
        }

        Ok(())
    }

    /// Pull complete lines out of the read buffer and compact the remainder
    /// to the front. Empty lines are keep-alives and are dropped.
    fn extract(&mut self, lines: &mut Vec<String>) -> SocketResult<()> {
        let mut start = 0usize;

        for index in 0..self.read_pos {
            if self.read_buf[index] != b'\n' {
                continue;
            }

            if index > start {
                lines.push(String::from_utf8_lossy(&self.read_buf[start..index]).into_owned());
            }
            start = index + 1;
        }

        self.read_buf.copy_within(start..self.read_pos, 0);
        self.read_pos -= start;

        if self.read_pos == MAX_LINE {
            logging::debug!(self.log, "line cap exceeded"; "context" => "extract");
            return Err(SocketError::Overflow);
        }

        Ok(())
    }

    /// Queue a shared buffer for transmission. Disconnecting sockets accept
    /// nothing new; their queue only drains.
    pub fn enqueue(&mut self, priority: Priority, buffer: &SharedBuffer) {
        if self.disconnecting {
            return;
        }

        self.queue.push(priority, buffer.clone());
    }

    /// Drain the write queue into the stream as far as it will go.
    pub fn flush(&mut self) -> SocketResult<()> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(()),
        };

        self.queue.drain(stream)?;
        Ok(())
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Stop accepting traffic; the queue drains and the reactor reaps the
    /// socket once it is empty or the grace timer fires.
    #[inline]
    pub fn disconnect(&mut self) {
        self.disconnecting = true;
    }

    #[inline]
    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// Tear the connection down and clear any unsent data.
    pub fn close(&mut self) {
        self.queue.clear();

        if let Some(stream) = self.stream.take() {
            drop(stream.shutdown(Shutdown::Both));
        }
    }

    /// Queued outbound bytes in drain order. Test and diagnostics helper.
    pub fn queued(&self) -> Vec<u8> {
        self.queue.queued()
    }

    /// Drop everything queued without writing it. Test helper.
    pub fn discard_queued(&mut self) {
        self.queue.clear();
    }
}

pub type ConnId = usize;

struct ConnSlot {
    socket: Option<Socket>,
    deadline: Option<Instant>,
}

/// The connection table: pooled slots, reused through a free list. Sessions
/// and the roster refer to connections exclusively through `ConnId` handles.
pub struct Conns {
    slots: Vec<ConnSlot>,
    free: Vec<ConnId>,
}

impl Conns {
    pub fn new() -> Conns {
        Conns {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, socket: Socket) -> ConnId {
        match self.free.pop() {
            Some(conn) => {
                self.slots[conn] = ConnSlot {
                    socket: Some(socket),
                    deadline: None,
                };
                conn
            }
            None => {
                self.slots.push(ConnSlot {
                    socket: Some(socket),
                    deadline: None,
                });
                self.slots.len() - 1
            }
        }
    }

    #[inline]
    pub fn socket_mut(&mut self, conn: ConnId) -> Option<&mut Socket> {
        self.slots.get_mut(conn).and_then(|slot| slot.socket.as_mut())
    }

    #[inline]
    pub fn socket(&self, conn: ConnId) -> Option<&Socket> {
        self.slots.get(conn).and_then(|slot| slot.socket.as_ref())
    }

    /// Enqueue a shared buffer on one connection.
    #[inline]
    pub fn send(&mut self, conn: ConnId, priority: Priority, buffer: &SharedBuffer) {
        if let Some(socket) = self.socket_mut(conn) {
            socket.enqueue(priority, buffer);
        }
    }

    pub fn set_deadline(&mut self, conn: ConnId, deadline: Instant) {
        if let Some(slot) = self.slots.get_mut(conn) {
            slot.deadline = Some(deadline);
        }
    }

    pub fn clear_deadline(&mut self, conn: ConnId) {
        if let Some(slot) = self.slots.get_mut(conn) {
            slot.deadline = None;
        }
    }

    #[inline]
    pub fn deadline(&self, conn: ConnId) -> Option<Instant> {
        self.slots.get(conn).and_then(|slot| slot.deadline)
    }

    /// Mark a connection disconnecting and arm the drain grace timer.
    pub fn start_drain(&mut self, conn: ConnId) {
        if let Some(slot) = self.slots.get_mut(conn) {
            if let Some(socket) = slot.socket.as_mut() {
                socket.disconnect();
            }
            slot.deadline = Some(Instant::now() + DRAIN_TIMEOUT);
        }
    }

    #[inline]
    pub fn is_disconnecting(&self, conn: ConnId) -> bool {
        self.socket(conn).map_or(false, |socket| socket.is_disconnecting())
    }

    /// Close the socket and reclaim the slot. Already-closed slots are left
    /// alone so a slot is never freed twice.
    pub fn close(&mut self, conn: ConnId) {
        if let Some(slot) = self.slots.get_mut(conn) {
            if let Some(mut socket) = slot.socket.take() {
                socket.close();
                self.free.push(conn);
            }
            slot.deadline = None;
        }
    }

    /// The nearest armed deadline across all connections.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().filter_map(|slot| slot.deadline).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::buffer::Buffer;

    fn detached() -> Socket {
        Socket::new(None, logging::discard())
    }

    #[test]
    fn test_single_line() {
        let mut socket = detached();
        let mut lines = Vec::new();

        socket.ingest(b"HSUP ADBASE\n", &mut lines).unwrap();

        assert_eq!(lines, vec!["HSUP ADBASE".to_string()]);
        assert_eq!(socket.read_pos, 0);
    }

    #[test]
    fn test_partial_then_complete() {
        let mut socket = detached();
        let mut lines = Vec::new();

        socket.ingest(b"BMSG AAAA Hi", &mut lines).unwrap();
        assert!(lines.is_empty());

        socket.ingest(b"\\sall\nBINF ", &mut lines).unwrap();
        assert_eq!(lines, vec!["BMSG AAAA Hi\\sall".to_string()]);
        assert_eq!(socket.read_pos, 5);
    }

    #[test]
    fn test_multiple_lines_one_read() {
        let mut socket = detached();
        let mut lines = Vec::new();

        socket.ingest(b"one x\ntwo y\nthree z\n", &mut lines).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "three z");
    }

    #[test]
    fn test_keepalives_dropped() {
        let mut socket = detached();
        let mut lines = Vec::new();

        socket.ingest(b"\n\nBMSG AAAA hi\n\n", &mut lines).unwrap();

        assert_eq!(lines, vec!["BMSG AAAA hi".to_string()]);
    }

    #[test]
    fn test_line_cap_accepts_1023_plus_newline() {
        let mut socket = detached();
        let mut lines = Vec::new();

        let mut data = vec![b'a'; 1023];
        data.push(b'\n');

        socket.ingest(&data, &mut lines).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 1023);
    }

    #[test]
    fn test_line_cap_rejects_1024_without_newline() {
        let mut socket = detached();
        let mut lines = Vec::new();

        let data = vec![b'a'; 1024];
        let result = socket.ingest(&data, &mut lines);

        assert_eq!(result, Err(SocketError::Overflow));
        assert!(lines.is_empty());
    }

    #[test]
    fn test_line_cap_rejects_oversized_split_reads() {
        let mut socket = detached();
        let mut lines = Vec::new();

        socket.ingest(&vec![b'a'; 1000], &mut lines).unwrap();
        let result = socket.ingest(&vec![b'a'; 25], &mut lines);

        assert_eq!(result, Err(SocketError::Overflow));
    }

    #[test]
    fn test_enqueue_after_disconnect_is_dropped() {
        let mut socket = detached();

        socket.enqueue(Priority::Data, &Buffer::from_line("kept\n"));
        socket.disconnect();
        socket.enqueue(Priority::Data, &Buffer::from_line("dropped\n"));

        assert_eq!(socket.queued(), b"kept\n");
    }

    #[test]
    fn test_conns_slot_reuse() {
        let mut conns = Conns::new();

        let first = conns.insert(detached());
        let second = conns.insert(detached());
        assert_ne!(first, second);

        conns.close(first);
        let third = conns.insert(detached());
        assert_eq!(third, first);
    }

    #[test]
    fn test_conns_deadlines() {
        let mut conns = Conns::new();
        let conn = conns.insert(detached());

        assert_eq!(conns.next_deadline(), None);

        let deadline = Instant::now() + Duration::from_secs(5);
        conns.set_deadline(conn, deadline);
        assert_eq!(conns.next_deadline(), Some(deadline));

        conns.clear_deadline(conn);
        assert_eq!(conns.next_deadline(), None);
    }

    #[test]
    fn test_start_drain_marks_socket() {
        let mut conns = Conns::new();
        let conn = conns.insert(detached());

        conns.start_drain(conn);

        assert!(conns.is_disconnecting(conn));
        assert!(conns.deadline(conn).is_some());
    }
}
