use crate::hub::interhub::InterSession;
use crate::hub::plugin::PluginManager;
use crate::hub::session::ClientSession;
use crate::hub::{Hub, HubCtx, SessionKind, SessionTable};
use crate::net::listener::{Listener, ListenerKind};
use crate::net::socket::{ConnId, Conns, Socket, LOGIN_TIMEOUT};
use adcproto::logging;
use indexmap::IndexSet;
use mio::net::TcpStream;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

// Listener tokens live below this; connection tokens are offset by it.
const TOKEN_BASE: usize = 64;

const MAX_EVENTS: usize = 8192;

/// The single-threaded readiness loop. Owns the poll, the listeners, the
/// connection and session tables and the hub state itself; every line a
/// socket produces is dispatched into the owning session with the full hub
/// context threaded along.
pub struct Reactor {
    poll: mio::Poll,
    events: mio::Events,
    listeners: Vec<Listener>,
    conns: Conns,
    sessions: SessionTable,
    live: IndexSet<ConnId>,
    hub: Hub,
    plugins: PluginManager,
    log: logging::Logger,
}

impl Reactor {
    pub fn new(hub: Hub, plugins: PluginManager, log: logging::Logger) -> io::Result<Reactor> {
        Ok(Reactor {
            poll: mio::Poll::new()?,
            events: mio::Events::with_capacity(MAX_EVENTS),
            listeners: Vec::new(),
            conns: Conns::new(),
            sessions: SessionTable::new(),
            live: IndexSet::new(),
            hub,
            plugins,
            log,
        })
    }

    /// Open a listening port for clients or sibling hubs.
    pub fn listen(&mut self, kind: ListenerKind, address: &str) -> io::Result<()> {
        assert!(self.listeners.len() < TOKEN_BASE, "Listener token space exhausted");

        let listener = Listener::bind(kind, address, self.log.new(logging::o!()))?;
        listener.register(mio::Token(self.listeners.len()), &self.poll)?;
        self.listeners.push(listener);

        Ok(())
    }

    /// Dial a federated sibling hub. The handshake proceeds as the socket
    /// becomes writable.
    pub fn connect_hub(&mut self, address: &str) -> io::Result<()> {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid peer address"))?;

        let stream = TcpStream::connect(&address)?;
        let conn = self.open_conn(stream);
        self.conns.set_deadline(conn, Instant::now() + LOGIN_TIMEOUT);

        let mut session = InterSession::new_outbound(conn, self.log.new(logging::o!()));
        {
            let mut ctx = HubCtx {
                hub: &mut self.hub,
                plugins: &mut self.plugins,
                conns: &mut self.conns,
                sessions: &mut self.sessions,
            };
            session.on_connected(&mut ctx);
        }
        self.sessions.insert(conn, SessionKind::Inter(session));

        logging::info!(self.log, "dialing federation peer"; "context" => "connect", "address" => %address);
        Ok(())
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once(Duration::from_secs(1));
        }
    }

    /// One reactor cycle: poll, accept, read/dispatch, flush, timers.
    pub fn run_once(&mut self, max_wait: Duration) {
        let timeout = match self.conns.next_deadline() {
            Some(deadline) => {
                let now = Instant::now();
                let until = match deadline > now {
                    true => deadline - now,
                    _ => Duration::from_millis(0),
                };
                until.min(max_wait)
            }
            None => max_wait,
        };

        self.poll
            .poll(&mut self.events, Some(timeout))
            .expect("Poll failed");

        let mut ready = Vec::with_capacity(self.events.iter().count());
        for event in &self.events {
            let readiness = event.readiness();
            ready.push((
                event.token().0,
                readiness.is_readable(),
                readiness.is_writable(),
            ));
        }

        for (token, readable, writable) in ready {
            if token < TOKEN_BASE {
                if readable {
                    self.accept_ready(token);
                }
                continue;
            }

            let conn = token - TOKEN_BASE;
            if readable {
                self.read_ready(conn);
            }
            if writable {
                self.write_ready(conn);
            }
        }

        self.flush_all();
        self.check_timers();
    }

    fn open_conn(&mut self, stream: TcpStream) -> ConnId {
        let socket = Socket::new(Some(stream), self.log.new(logging::o!()));
        let conn = self.conns.insert(socket);

        self.conns
            .socket(conn)
            .expect("Fresh slot without a socket")
            .register(mio::Token(TOKEN_BASE + conn), &self.poll)
            .expect("Stream registration failed");

        self.live.insert(conn);
        conn
    }

    fn accept_ready(&mut self, index: usize) {
        loop {
            let accepted = self.listeners[index].accept();
            let kind = self.listeners[index].kind();

            match accepted {
                Ok(Some(stream)) => self.accept_conn(kind, stream),
                Ok(None) => return,
                Err(err) => {
                    logging::warn!(self.log, "accept failed"; "context" => "accept", "error" => %err);
                    return;
                }
            }
        }
    }

    fn accept_conn(&mut self, kind: ListenerKind, stream: TcpStream) {
        let conn = self.open_conn(stream);
        self.conns.set_deadline(conn, Instant::now() + LOGIN_TIMEOUT);

        match kind {
            ListenerKind::Client => {
                let sid = self.hub.server.alloc_sid(&self.hub.roster);
                let mut session = ClientSession::new(conn, sid, self.log.new(logging::o!()));

                {
                    let mut ctx = HubCtx {
                        hub: &mut self.hub,
                        plugins: &mut self.plugins,
                        conns: &mut self.conns,
                        sessions: &mut self.sessions,
                    };
                    session.on_connected(&mut ctx);
                }

                self.sessions.insert(conn, SessionKind::Client(session));
            }
            ListenerKind::InterHub => {
                let session = InterSession::new_inbound(conn, self.log.new(logging::o!()));
                self.sessions.insert(conn, SessionKind::Inter(session));
            }
        }
    }

    fn read_ready(&mut self, conn: ConnId) {
        let mut lines = Vec::new();

        let result = {
            let socket = match self.conns.socket_mut(conn) {
                Some(socket) => socket,
                None => return,
            };

            if socket.is_disconnecting() {
                return;
            }

            socket.read_lines(&mut lines)
        };

        for line in &lines {
            // A fatal line stops delivery of anything queued behind it.
            if self.conns.is_disconnecting(conn) {
                break;
            }

            self.dispatch_line(conn, line);
        }

        if let Err(err) = result {
            logging::debug!(self.log, "read failed"; "context" => "read", "conn" => conn, "error" => ?err);
            self.teardown(conn);
        }
    }

    fn dispatch_line(&mut self, conn: ConnId, line: &str) {
        let mut session = match self.sessions.take(conn) {
            Some(session) => session,
            None => return,
        };

        {
            let mut ctx = HubCtx {
                hub: &mut self.hub,
                plugins: &mut self.plugins,
                conns: &mut self.conns,
                sessions: &mut self.sessions,
            };

            match &mut session {
                SessionKind::Client(client) => client.on_line(&mut ctx, line),
                SessionKind::Inter(link) => link.on_line(&mut ctx, line),
            }
        }

        self.sessions.put(conn, session);
    }

    fn write_ready(&mut self, conn: ConnId) {
        let failed = match self.conns.socket_mut(conn) {
            Some(socket) => socket.flush().is_err(),
            None => return,
        };

        if failed {
            self.teardown(conn);
        }
    }

    /// Force-drain every live connection, reaping the ones that finished
    /// disconnecting or died on the way out.
    fn flush_all(&mut self) {
        let live: Vec<ConnId> = self.live.iter().copied().collect();

        for conn in live {
            let state = match self.conns.socket_mut(conn) {
                Some(socket) => match socket.flush() {
                    Ok(()) => {
                        if socket.is_disconnecting() && !socket.has_egress() {
                            Some(true)
                        } else {
                            None
                        }
                    }
                    Err(_) => Some(false),
                },
                None => None,
            };

            match state {
                Some(drained) => {
                    if !drained {
                        logging::debug!(self.log, "write failed"; "context" => "flush", "conn" => conn);
                    }
                    self.teardown(conn);
                }
                None => {}
            }
        }
    }

    /// Login and drain deadlines. Both end in a silent teardown; the login
    /// case deliberately emits nothing a scanner could fingerprint.
    fn check_timers(&mut self) {
        let now = Instant::now();
        let live: Vec<ConnId> = self.live.iter().copied().collect();

        for conn in live {
            let expired = match self.conns.deadline(conn) {
                Some(deadline) => deadline <= now,
                None => false,
            };

            if expired {
                logging::debug!(self.log, "connection timed out"; "context" => "timer", "conn" => conn);
                self.teardown(conn);
            }
        }
    }

    /// Death order: roster (inside the session teardown), session, socket.
    fn teardown(&mut self, conn: ConnId) {
        if let Some(mut session) = self.sessions.take(conn) {
            let mut ctx = HubCtx {
                hub: &mut self.hub,
                plugins: &mut self.plugins,
                conns: &mut self.conns,
                sessions: &mut self.sessions,
            };

            match &mut session {
                SessionKind::Client(client) => client.on_socket_closed(&mut ctx),
                SessionKind::Inter(link) => link.on_socket_closed(&mut ctx),
            }
        }

        self.sessions.remove(conn);

        if let Some(socket) = self.conns.socket_mut(conn) {
            drop(socket.deregister(&self.poll));
        }
        self.conns.close(conn);
        self.live.swap_remove(&conn);
    }
}
