use adcproto::logging;
use mio::net::{TcpListener, TcpStream};
use std::io;
use std::net::SocketAddr;

/// What connects on a listening port.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ListenerKind {
    /// Regular peers speaking the client protocol.
    Client,
    /// Federated sibling hubs.
    InterHub,
}

/// A non-blocking accept socket.
pub struct Listener {
    kind: ListenerKind,
    inner: TcpListener,
    log: logging::Logger,
}

impl Listener {
    pub fn bind(kind: ListenerKind, address: &str, log: logging::Logger) -> io::Result<Listener> {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid listen address"))?;

        let inner = TcpListener::bind(&address)?;

        logging::info!(log, "listening"; "context" => "bind", "address" => %address, "kind" => ?kind);

        Ok(Listener { kind, inner, log })
    }

    #[inline]
    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn register(&self, token: mio::Token, poll: &mio::Poll) -> io::Result<()> {
        poll.register(&self.inner, token, mio::Ready::readable(), mio::PollOpt::edge())
    }

    /// Accept one pending connection, or `None` once the backlog is empty.
    pub fn accept(&self) -> io::Result<Option<TcpStream>> {
        match self.inner.accept() {
            Ok((stream, peer)) => {
                logging::debug!(self.log, "accepted connection";
                                "context" => "accept",
                                "peer" => %peer,
                                "kind" => ?self.kind);
                Ok(Some(stream))
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}
