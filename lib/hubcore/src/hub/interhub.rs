use crate::hub::plugin::{DISCONNECT, MODIFY, STOP};
use crate::hub::roster;
use crate::hub::HubCtx;
use crate::net::buffer::{Buffer, Priority};
use crate::net::socket::ConnId;
use adcproto::auth;
use adcproto::base32;
use adcproto::command::{Command, MsgType};
use adcproto::logging;
use adcproto::sid::Sid;
use adcproto::userinfo::{self, UserInfo};

/// Federation link state machine. Both ends run the same framing as client
/// sessions; the handshake authenticates the dialing hub against the shared
/// inter-hub password.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LinkState {
    /// Connected, handshake in flight.
    Protocol,
    /// Challenge issued, awaiting `HPAS`.
    Verify,
    /// Rosters exchanged, mirroring deltas and relaying directed traffic.
    Normal,
    /// Terminal.
    Closed,
}

/// A connection to a sibling hub. Mirrors a subset of the remote hub's
/// roster into ours and carries directed traffic whose destination shard is
/// the peer's.
pub struct InterSession {
    conn: ConnId,
    state: LinkState,
    outbound: bool,
    peer_hub: Option<Sid>,
    salt: Option<[u8; auth::SALT_SIZE]>,
    log: logging::Logger,
}

impl InterSession {
    pub fn new_inbound(conn: ConnId, log: logging::Logger) -> InterSession {
        InterSession {
            conn,
            state: LinkState::Protocol,
            outbound: false,
            peer_hub: None,
            salt: None,
            log,
        }
    }

    pub fn new_outbound(conn: ConnId, log: logging::Logger) -> InterSession {
        InterSession {
            conn,
            state: LinkState::Protocol,
            outbound: true,
            peer_hub: None,
            salt: None,
            log,
        }
    }

    #[inline]
    pub fn conn(&self) -> ConnId {
        self.conn
    }

    #[inline]
    pub fn state(&self) -> LinkState {
        self.state
    }

    #[inline]
    pub fn peer_hub(&self) -> Option<Sid> {
        self.peer_hub
    }

    /// Fired once the outbound connection exists; opens the handshake.
    pub fn on_connected(&mut self, ctx: &mut HubCtx) {
        if self.outbound {
            let line = Buffer::from_line("HSUP +BASE\n");
            ctx.conns.send(self.conn, Priority::Control, &line);
        }
    }

    pub fn on_line(&mut self, ctx: &mut HubCtx, line: &str) {
        if self.state == LinkState::Closed {
            return;
        }

        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(err) => {
                logging::warn!(self.log, "unparsable interhub line"; "context" => "line", "error" => %err);
                self.close(ctx);
                return;
            }
        };

        self.handle(ctx, cmd);
    }

    /// The link died: drop every peer homed at that hub and tell our local
    /// users.
    pub fn on_socket_closed(&mut self, ctx: &mut HubCtx) {
        if self.state == LinkState::Closed {
            return;
        }

        self.teardown(ctx);
    }

    /// Orderly local-side close; the socket drains whatever is queued.
    pub fn close(&mut self, ctx: &mut HubCtx) {
        if self.state == LinkState::Closed {
            return;
        }

        self.teardown(ctx);
        ctx.conns.start_drain(self.conn);
    }

    fn teardown(&mut self, ctx: &mut HubCtx) {
        if let Some(hub) = self.peer_hub.take() {
            ctx.hub.server.link_down(hub);

            let mask = ctx.hub.server.mask();
            for sid in ctx.hub.roster.all_in_hub(hub, mask) {
                ctx.hub.roster.remove(sid);
                let line = Buffer::from_line(&format!("IQUI {} ND\n", sid));
                ctx.hub.roster.broadcast(ctx.conns, &line, None);
            }
        }

        let _ = ctx.plugins.fire_inter_disconnected(self);
        self.state = LinkState::Closed;

        logging::info!(self.log, "interhub link closed"; "context" => "close");
    }

    fn handle(&mut self, ctx: &mut HubCtx, mut cmd: Command) {
        let action = ctx.plugins.fire_inter_line(self, &mut cmd);
        if action.is_set(DISCONNECT) {
            self.close(ctx);
            return;
        }
        if action.is_set(STOP) {
            return;
        }
        if action.is_set(MODIFY) {
            cmd.reassemble();
        }

        match self.state {
            LinkState::Protocol => self.handle_protocol(ctx, &cmd),
            LinkState::Verify => self.handle_verify(ctx, &cmd),
            LinkState::Normal => self.handle_normal(ctx, &cmd),
            LinkState::Closed => {}
        }
    }

    fn handle_protocol(&mut self, ctx: &mut HubCtx, cmd: &Command) {
        if !self.outbound {
            // Accepting side: one HSUP, then challenge.
            if !(cmd.kind() == MsgType::HubBound && cmd.code() == "SUP") {
                logging::debug!(self.log, "non-handshake traffic on interhub port"; "context" => "protocol");
                self.close(ctx);
                return;
            }

            if ctx.hub.server.interpass().is_none() {
                logging::error!(self.log, "interhub connection refused, no interpass configured";
                                "context" => "protocol");
                self.close(ctx);
                return;
            }

            let salt = auth::generate_salt();
            let line = format!(
                "ISUP +BASE\nIGPA {} {}\n",
                ctx.hub.sid(),
                base32::encode(&salt)
            );
            self.salt = Some(salt);
            ctx.conns
                .send(self.conn, Priority::Control, &Buffer::from_line(&line));
            self.state = LinkState::Verify;
            return;
        }

        // Dialing side: the ISUP is informational, the IGPA carries the
        // challenge and the acceptor's identity.
        match (cmd.kind(), cmd.code()) {
            (MsgType::FromHub, "SUP") => {}
            (MsgType::FromHub, "GPA") => self.answer_challenge(ctx, cmd),
            _ => {
                logging::debug!(self.log, "unexpected handshake traffic"; "context" => "protocol");
                self.close(ctx);
            }
        }
    }

    fn answer_challenge(&mut self, ctx: &mut HubCtx, cmd: &Command) {
        let peer = match cmd.token(1).and_then(|token| Sid::from_wire(token).ok()) {
            Some(peer) => peer,
            None => {
                self.close(ctx);
                return;
            }
        };

        let salt = match cmd.token(2).and_then(base32::decode) {
            Some(salt) if salt.len() >= auth::SALT_SIZE => salt,
            _ => {
                self.close(ctx);
                return;
            }
        };

        let password = match ctx.hub.server.interpass() {
            Some(password) => password.to_string(),
            None => {
                logging::error!(self.log, "dialed a federation peer without an interpass";
                                "context" => "verify");
                self.close(ctx);
                return;
            }
        };

        let response = auth::hub_response(&password, &salt[..auth::SALT_SIZE]);
        let line = format!("HPAS {} {}\n", ctx.hub.sid(), response);
        ctx.conns
            .send(self.conn, Priority::Control, &Buffer::from_line(&line));

        // Optimistic entry: a bad password gets us dropped by the acceptor.
        self.establish(ctx, peer);
    }

    fn handle_verify(&mut self, ctx: &mut HubCtx, cmd: &Command) {
        if !(cmd.kind() == MsgType::HubBound && cmd.code() == "PAS" && cmd.tokens().len() == 3) {
            logging::debug!(self.log, "expected HPAS on interhub link"; "context" => "verify");
            self.close(ctx);
            return;
        }

        let peer = match cmd.token(1).and_then(|token| Sid::from_wire(token).ok()) {
            Some(peer) if peer != ctx.hub.sid() => peer,
            _ => {
                self.close(ctx);
                return;
            }
        };

        let salt = match self.salt.take() {
            Some(salt) => salt,
            None => {
                self.close(ctx);
                return;
            }
        };

        let password = ctx.hub.server.interpass().unwrap_or("").to_string();
        if !auth::verify_hub(&password, &salt, cmd.token(2).unwrap_or("")) {
            logging::warn!(self.log, "interhub password mismatch"; "context" => "verify");
            self.close(ctx);
            return;
        }

        self.establish(ctx, peer);
    }

    /// Both sides land here: register the link, announce it, stream our
    /// local roster across.
    fn establish(&mut self, ctx: &mut HubCtx, peer: Sid) {
        ctx.conns.clear_deadline(self.conn);
        self.peer_hub = Some(peer);
        self.state = LinkState::Normal;
        ctx.hub.server.link_up(peer, self.conn);

        let action = ctx.plugins.fire_inter_connected(self);
        if action.is_set(DISCONNECT) {
            self.close(ctx);
            return;
        }

        let list = ctx.hub.roster.local_user_list();
        if !list.is_empty() {
            ctx.conns.send(self.conn, Priority::Data, &Buffer::new(list));
        }

        logging::info!(self.log, "interhub link established"; "context" => "establish", "peer" => %peer);
    }

    fn handle_normal(&mut self, ctx: &mut HubCtx, cmd: &Command) {
        if cmd.code() == "INF" && cmd.kind() == MsgType::Broadcast {
            self.mirror_info(ctx, cmd);
            return;
        }

        if cmd.code() == "QUI" && cmd.kind() == MsgType::FromHub {
            if let Some(sid) = cmd.token(1).and_then(|token| Sid::from_wire(token).ok()) {
                if ctx.hub.roster.remove(sid) {
                    let line = Buffer::from_line(cmd.full());
                    ctx.hub.roster.broadcast(ctx.conns, &line, None);
                }
            }
            return;
        }

        match cmd.kind() {
            // Broadcast classes are delivered locally exactly once and never
            // re-forwarded to other links.
            MsgType::Broadcast => {
                let line = Buffer::from_line(cmd.full());
                ctx.hub.roster.broadcast(ctx.conns, &line, None);
            }
            MsgType::Active => {
                let line = Buffer::from_line(cmd.full());
                ctx.hub.roster.broadcast_active(ctx.conns, &line, true, None);
            }
            MsgType::Passive => {
                let line = Buffer::from_line(cmd.full());
                ctx.hub.roster.broadcast_active(ctx.conns, &line, false, None);
            }
            MsgType::Feature => {
                let clauses = roster::feature_clauses(cmd);
                let line = Buffer::from_line(cmd.full());
                ctx.hub.roster.broadcast_feature(ctx.conns, &line, &clauses, None);
            }
            MsgType::Direct | MsgType::DirectQuiet => {
                let dest = match cmd.token(2).and_then(|token| Sid::from_wire(token).ok()) {
                    Some(dest) => dest,
                    None => return,
                };

                if ctx.hub.server.is_local(dest) {
                    let line = Buffer::from_line(cmd.full());
                    if !ctx.hub.roster.send_to(ctx.conns, dest, &line) {
                        logging::debug!(self.log, "relayed message for unknown local sid";
                                        "context" => "normal", "dest" => %dest);
                    }
                } else {
                    logging::debug!(self.log, "dropping relayed message for foreign shard";
                                    "context" => "normal", "dest" => %dest);
                }
            }
            _ => {
                logging::debug!(self.log, "ignoring interhub message"; "context" => "normal",
                                "code" => cmd.code());
            }
        }
    }

    /// A roster delta from the peer: upsert the remote entry and tell our
    /// local users.
    fn mirror_info(&mut self, ctx: &mut HubCtx, cmd: &Command) {
        let sid = match cmd.token(1).and_then(|token| Sid::from_wire(token).ok()) {
            Some(sid) => sid,
            None => return,
        };

        if ctx.hub.server.is_local(sid) {
            logging::warn!(self.log, "remote INF claims a local-shard sid";
                           "context" => "mirror", "sid" => %sid);
            return;
        }

        let update = UserInfo::from_params(cmd.tokens()[2..].iter().map(String::as_str));

        // Identity collisions across the federation are dropped rather than
        // allowed to corrupt the uniqueness indexes.
        if let Some(cid) = update.get(userinfo::ID) {
            if ctx.hub.roster.has_cid(cid) && ctx.hub.roster.sid_of_cid(cid) != Some(sid) {
                logging::warn!(self.log, "remote INF collides on cid"; "context" => "mirror", "sid" => %sid);
                return;
            }
        }
        if !ctx.hub.roster.has(sid, false) {
            // A fresh entry must arrive whole; partial descriptors can only
            // update an existing one.
            if update.nick().is_none() || update.cid_str().is_none() {
                logging::warn!(self.log, "incomplete remote INF for unknown sid";
                               "context" => "mirror", "sid" => %sid);
                return;
            }

            if ctx.hub.roster.has_nick(update.nick().expect("Checked above")) {
                logging::warn!(self.log, "remote INF collides on nick"; "context" => "mirror", "sid" => %sid);
                return;
            }
        }

        ctx.hub.roster.add_remote(sid, update);

        let line = Buffer::from_line(cmd.full());
        ctx.hub.roster.broadcast(ctx.conns, &line, None);
    }
}
