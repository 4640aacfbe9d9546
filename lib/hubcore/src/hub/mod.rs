//! The hub proper: roster and routing, hub identity and federation,
//! client and inter-hub session state machines, plugin dispatch.

pub mod interhub;
pub mod plugin;
pub mod roster;
pub mod server;
pub mod session;

use crate::hub::interhub::InterSession;
use crate::hub::plugin::PluginManager;
use crate::hub::roster::Roster;
use crate::hub::server::ServerManager;
use crate::hub::session::ClientSession;
use crate::net::buffer::{Priority, SharedBuffer};
use crate::net::socket::{ConnId, Conns};
use adcproto::command::escape;
use adcproto::logging;
use adcproto::sid::Sid;

/// Hub-wide state: identity and federation on one side, the roster on the
/// other. Passed by reference into every session operation; nothing here is
/// reachable through globals.
pub struct Hub {
    pub server: ServerManager,
    pub roster: Roster,
    pub motd: String,
    pub log: logging::Logger,
}

impl Hub {
    pub fn new(server: ServerManager, motd: String, log: logging::Logger) -> Hub {
        let roster = Roster::new(log.new(logging::o!()));

        Hub {
            server,
            roster,
            motd,
            log,
        }
    }

    #[inline]
    pub fn sid(&self) -> Sid {
        self.server.sid()
    }

    /// `ISTA` line addressed at one peer.
    pub fn status_line(&self, sid: Sid, code: u16, msg: &str) -> String {
        format!("ISTA {} {} {}\n", sid, code, escape(msg))
    }

    /// Route a buffer to one sid: locally when the sid is ours, over the
    /// owning hub's link when it is not, dropped (and logged) when no link
    /// covers it.
    pub fn direct_to(&mut self, conns: &mut Conns, dest: Sid, buffer: &SharedBuffer) -> bool {
        if self.server.is_local(dest) {
            let delivered = self.roster.send_to(conns, dest, buffer);
            if !delivered {
                logging::debug!(self.log, "directed message for unknown local sid";
                                "context" => "direct", "dest" => %dest);
            }
            return delivered;
        }

        match self.server.link_for(self.server.hub_of(dest)) {
            Some(link) => {
                conns.send(link, Priority::Data, buffer);
                true
            }
            None => {
                logging::warn!(self.log, "directed message for unreachable hub";
                               "context" => "direct", "dest" => %dest);
                false
            }
        }
    }

    /// Broadcast to every local peer (minus the optional sender) and forward
    /// once to every federation link except the one owning the source shard.
    pub fn broadcast(
        &mut self,
        conns: &mut Conns,
        buffer: &SharedBuffer,
        except: Option<Sid>,
        source: Sid,
    ) {
        self.roster.broadcast(conns, buffer, except);
        self.forward_inter(conns, buffer, source);
    }

    /// UDP-active (or passive) filtered broadcast, forwarded like `broadcast`.
    pub fn broadcast_active(
        &mut self,
        conns: &mut Conns,
        buffer: &SharedBuffer,
        active: bool,
        except: Option<Sid>,
        source: Sid,
    ) {
        self.roster.broadcast_active(conns, buffer, active, except);
        self.forward_inter(conns, buffer, source);
    }

    /// Feature-filtered broadcast, forwarded like `broadcast`.
    pub fn broadcast_feature(
        &mut self,
        conns: &mut Conns,
        buffer: &SharedBuffer,
        clauses: &[(bool, String)],
        except: Option<Sid>,
        source: Sid,
    ) {
        self.roster.broadcast_feature(conns, buffer, clauses, except);
        self.forward_inter(conns, buffer, source);
    }

    fn forward_inter(&mut self, conns: &mut Conns, buffer: &SharedBuffer, source: Sid) {
        for link in self.server.links_except_shard(source) {
            conns.send(link, Priority::Data, buffer);
        }
    }
}

/// Everything a session operation may touch, threaded by reference from the
/// reactor. The session being driven is taken out of `sessions` for the
/// duration of the call.
pub struct HubCtx<'a> {
    pub hub: &'a mut Hub,
    pub plugins: &'a mut PluginManager,
    pub conns: &'a mut Conns,
    pub sessions: &'a mut SessionTable,
}

/// The two things a connection can be speaking for.
pub enum SessionKind {
    Client(ClientSession),
    Inter(InterSession),
}

/// Session storage parallel to the connection table. Slots are `Option` so
/// the reactor can move a session out while driving it.
pub struct SessionTable {
    slots: Vec<Option<SessionKind>>,
}

impl SessionTable {
    pub fn new() -> SessionTable {
        SessionTable { slots: Vec::new() }
    }

    pub fn insert(&mut self, conn: ConnId, session: SessionKind) {
        if conn >= self.slots.len() {
            self.slots.resize_with(conn + 1, || None);
        }

        assert!(self.slots[conn].is_none(), "Session slot already occupied: {}", conn);
        self.slots[conn] = Some(session);
    }

    #[inline]
    pub fn take(&mut self, conn: ConnId) -> Option<SessionKind> {
        self.slots.get_mut(conn).and_then(|slot| slot.take())
    }

    #[inline]
    pub fn put(&mut self, conn: ConnId, session: SessionKind) {
        self.slots[conn] = Some(session);
    }

    #[inline]
    pub fn remove(&mut self, conn: ConnId) {
        if let Some(slot) = self.slots.get_mut(conn) {
            *slot = None;
        }
    }

    #[inline]
    pub fn get_mut(&mut self, conn: ConnId) -> Option<&mut SessionKind> {
        self.slots.get_mut(conn).and_then(|slot| slot.as_mut())
    }
}
