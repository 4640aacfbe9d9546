use crate::hub::plugin::{DISCONNECT, MODIFY, STOP};
use crate::hub::roster;
use crate::hub::{HubCtx, SessionKind};
use crate::net::buffer::{Buffer, Priority};
use crate::net::socket::{ConnId, Conns};
use crate::support::{protocol_fault, LineFault, LineResult};
use adcproto::auth;
use adcproto::base32;
use adcproto::cid::Cid;
use adcproto::command::{escape, Command, MsgType};
use adcproto::logging;
use adcproto::sid::Sid;
use adcproto::userinfo::{self, UserInfo};
use anymap::AnyMap;
use hashbrown::HashSet;
use std::time::Duration;

/// The per-peer protocol state machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    /// Freshly accepted; exactly one `HSUP` is expected.
    Protocol,
    /// Handshake replied; exactly one `BINF` is expected.
    Identify,
    /// A plugin asked for a password; exactly one `HPAS` is expected.
    Verify,
    /// Logged in, routing routine traffic.
    Normal,
    /// Terminal. The socket drains and the reactor reaps it.
    Disconnected,
}

/// One connected peer: its socket handle, protocol state, identity and the
/// opaque bag plugins hang their per-session data on.
pub struct ClientSession {
    conn: ConnId,
    sid: Sid,
    state: State,
    cid: Option<Cid>,
    info: UserInfo,
    supports: HashSet<String>,
    salt: Option<[u8; auth::SALT_SIZE]>,
    password: Option<String>,
    added: bool,
    pending_close: Option<Option<String>>,
    data: AnyMap,
    log: logging::Logger,
}

impl ClientSession {
    pub fn new(conn: ConnId, sid: Sid, log: logging::Logger) -> ClientSession {
        let log = log.new(logging::o!("sid" => sid.to_wire()));

        ClientSession {
            conn,
            sid,
            state: State::Protocol,
            cid: None,
            info: UserInfo::new(),
            supports: HashSet::new(),
            salt: None,
            password: None,
            added: false,
            pending_close: None,
            data: AnyMap::new(),
            log,
        }
    }

    #[inline]
    pub fn conn(&self) -> ConnId {
        self.conn
    }

    #[inline]
    pub fn sid(&self) -> Sid {
        self.sid
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn info(&self) -> &UserInfo {
        &self.info
    }

    #[inline]
    pub fn cid(&self) -> Option<&Cid> {
        self.cid.as_ref()
    }

    /// The per-plugin key/value bag.
    #[inline]
    pub fn user_data(&mut self) -> &mut AnyMap {
        &mut self.data
    }

    /// Called by a login hook: challenge the peer for this password before
    /// letting it into the hub.
    pub fn ask_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
    }

    /// Called by any hook that set `DISCONNECT`: the reason for the close it
    /// requested.
    pub fn request_disconnect(&mut self, reason: Option<&str>) {
        self.pending_close = Some(reason.map(|msg| msg.to_string()));
    }

    /// Fired right after accept.
    pub fn on_connected(&mut self, ctx: &mut HubCtx) {
        logging::debug!(self.log, "client connected"; "context" => "connect");

        let action = ctx.plugins.fire_client_connected(self);
        if action.is_set(DISCONNECT) {
            self.apply_disconnect(ctx);
        }
    }

    /// One complete inbound line.
    pub fn on_line(&mut self, ctx: &mut HubCtx, line: &str) {
        if self.state == State::Disconnected {
            return;
        }

        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(err) => {
                logging::debug!(self.log, "unparsable line"; "context" => "line", "error" => %err);
                self.close(ctx, None);
                return;
            }
        };

        if let Err(fault) = self.handle(ctx, cmd) {
            match fault {
                LineFault::Parse(err) => {
                    logging::debug!(self.log, "parse fault"; "context" => "line", "error" => %err);
                    self.close(ctx, None);
                }
                LineFault::Protocol(msg) => {
                    self.error(ctx, &msg);
                    self.close(ctx, Some(&msg));
                }
            }
        }
    }

    /// The socket died underneath us: no draining, no farewell traffic to
    /// the peer itself.
    pub fn on_socket_closed(&mut self, ctx: &mut HubCtx) {
        if self.state == State::Disconnected {
            return;
        }

        if self.added {
            let line = format!("IQUI {} ND\n", self.sid);
            self.logout(ctx);
            ctx.hub
                .broadcast(ctx.conns, &Buffer::from_line(&line), None, ctx.hub.sid());
        }

        let _ = ctx.plugins.fire_client_disconnected(self);
        self.state = State::Disconnected;
    }

    /// Orderly close. With a reason the departure is announced as
    /// `IQUI <sid> DI <hub> <reason>`, without one as the silent `ND` form.
    pub fn close(&mut self, ctx: &mut HubCtx, reason: Option<&str>) {
        if self.state == State::Disconnected {
            return;
        }

        if self.added {
            let line = match reason {
                Some(msg) => format!("IQUI {} DI {} {}\n", self.sid, ctx.hub.sid(), escape(msg)),
                None => format!("IQUI {} ND\n", self.sid),
            };
            self.logout(ctx);
            ctx.hub
                .broadcast(ctx.conns, &Buffer::from_line(&line), None, ctx.hub.sid());
        }

        let _ = ctx.plugins.fire_client_disconnected(self);
        self.state = State::Disconnected;
        ctx.conns.start_drain(self.conn);

        logging::debug!(self.log, "session closed"; "context" => "close");
    }

    /// Operator-driven removal. The victim always receives the full `IQUI`;
    /// the rest of the hub sees it too unless the removal is silent.
    pub fn kicked(&mut self, ctx: &mut HubCtx, full: String, silent: bool) {
        if self.state == State::Disconnected {
            return;
        }

        self.send_line(ctx.conns, Priority::Data, &full);

        let announce = match silent {
            true => format!("IQUI {} ND\n", self.sid),
            false => full,
        };

        self.logout(ctx);
        ctx.hub
            .broadcast(ctx.conns, &Buffer::from_line(&announce), None, ctx.hub.sid());

        let _ = ctx.plugins.fire_client_disconnected(self);
        self.state = State::Disconnected;
        ctx.conns.start_drain(self.conn);
    }

    fn handle(&mut self, ctx: &mut HubCtx, mut cmd: Command) -> LineResult {
        let action = ctx.plugins.fire_client_line(self, &mut cmd);
        if action.is_set(DISCONNECT) {
            self.apply_disconnect(ctx);
            return Ok(());
        }
        if action.is_set(STOP) {
            return Ok(());
        }
        if action.is_set(MODIFY) {
            cmd.reassemble();
        }

        match self.state {
            State::Protocol => self.handle_protocol(ctx, &cmd),
            State::Identify => self.handle_identify(ctx, &cmd),
            State::Verify => self.handle_verify(ctx, &cmd),
            State::Normal => self.handle_normal(ctx, &cmd),
            State::Disconnected => Ok(()),
        }
    }

    fn handle_protocol(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        if cmd.kind() == MsgType::HubBound && cmd.code() == "SUP" {
            self.handle_supports(ctx, cmd);
            return Ok(());
        }

        // Anything else is dropped without a word; a port scanner must not
        // be able to confirm what protocol this is.
        logging::debug!(self.log, "non-handshake traffic before HSUP"; "context" => "protocol");
        self.close(ctx, None);
        Ok(())
    }

    fn handle_supports(&mut self, ctx: &mut HubCtx, cmd: &Command) {
        for token in cmd.tokens().iter().skip(1) {
            if let Some(name) = token.strip_prefix("AD").or_else(|| token.strip_prefix('+')) {
                self.supports.insert(name.to_string());
            } else if let Some(name) = token.strip_prefix("RM").or_else(|| token.strip_prefix('-')) {
                self.supports.remove(name);
            }
        }

        let hub_sid = ctx.hub.sid();
        let reply = format!(
            "ISUP {} +BASE\nISID {}\nIINF {} NI{} HU1 DE{} VE{} OP1\n",
            hub_sid,
            self.sid,
            hub_sid,
            escape(ctx.hub.server.name()),
            escape(ctx.hub.server.description()),
            adcproto::VERSION,
        );
        self.send_line(ctx.conns, Priority::Control, &reply);

        self.state = State::Identify;
    }

    fn handle_identify(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        if !(cmd.kind() == MsgType::Broadcast && cmd.code() == "INF" && cmd.tokens().len() >= 2) {
            return Err(protocol_fault("State mismatch: BINF expected"));
        }

        if cmd.token(1) != Some(self.sid.to_wire().as_str()) {
            return Err(protocol_fault("SID mismatch"));
        }

        let info = UserInfo::from_params(cmd.tokens()[2..].iter().map(String::as_str));

        let cid = match info.cid_str() {
            Some(text) => Cid::parse(text).map_err(|_| protocol_fault("Invalid CID"))?,
            None => return Err(protocol_fault("Missing parameters in INF")),
        };

        if info.nick().is_none() || !(info.has(userinfo::IP4) || info.has(userinfo::IP6)) {
            return Err(protocol_fault("Missing parameters in INF"));
        }

        if ctx.hub.server.is_banned(cid.as_str()) {
            return Err(protocol_fault("Banned"));
        }

        self.cid = Some(cid);
        self.info = info;

        if !self.claim_identity(ctx)? {
            return Ok(());
        }

        let action = ctx.plugins.fire_client_login(self);
        if action.is_set(DISCONNECT) {
            self.apply_disconnect(ctx);
            return Ok(());
        }

        if self.password.is_some() {
            let salt = auth::generate_salt();
            let line = format!("IGPA {} {}\n", ctx.hub.sid(), base32::encode(&salt));
            self.salt = Some(salt);
            self.send_line(ctx.conns, Priority::Control, &line);
            self.state = State::Verify;
        } else {
            self.login(ctx);
        }

        Ok(())
    }

    fn handle_verify(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        if !(cmd.kind() == MsgType::HubBound && cmd.code() == "PAS" && cmd.tokens().len() == 3) {
            return Err(protocol_fault("State mismatch: HPAS expected"));
        }

        if cmd.token(1) != Some(self.sid.to_wire().as_str()) {
            return Err(protocol_fault("SID mismatch"));
        }

        let salt = match self.salt.take() {
            Some(salt) => salt,
            None => return Err(protocol_fault("No challenge outstanding")),
        };
        let password = self.password.take().unwrap_or_default();
        let response = cmd.token(2).unwrap_or("");

        let verified = {
            let cid = self.cid.as_ref().expect("Verify state without a cid");
            auth::verify_client(cid, &password, &salt, response)
        };

        if !verified {
            logging::info!(self.log, "password mismatch"; "context" => "verify");
            let status = ctx.hub.status_line(self.sid, 223, "Bad username or password");
            self.send_line(ctx.conns, Priority::Control, &status);
            self.close(ctx, None);
            return Ok(());
        }

        // Another peer may have claimed the identity while we waited.
        if !self.claim_identity(ctx)? {
            return Ok(());
        }

        self.login(ctx);
        Ok(())
    }

    /// The cid/nick uniqueness gate, run at IDENTIFY and repeated after a
    /// successful HPAS. `Ok(false)` means the session was already closed.
    fn claim_identity(&mut self, ctx: &mut HubCtx) -> Result<bool, LineFault> {
        let cid = self.cid.clone().expect("Identity check before cid");

        if ctx.hub.roster.has_cid(cid.as_str()) {
            let status = ctx.hub.status_line(self.sid, 24, "CID busy, change CID or wait");
            self.send_line(ctx.conns, Priority::Control, &status);

            // Ping the incumbent, it may be a ghost session.
            if let Some(ghost) = ctx.hub.roster.sid_of_cid(cid.as_str()) {
                let ping = Buffer::from_line(&format!("INTD {}\n", self.sid));
                ctx.hub.direct_to(ctx.conns, ghost, &ping);
            }

            self.close(ctx, None);
            return Ok(false);
        }

        let nick = self.info.nick().expect("Identity check before nick");
        if ctx.hub.roster.has_nick(nick) {
            return Err(protocol_fault("Nick taken"));
        }

        Ok(true)
    }

    /// The login procedure: roster snapshot out, roster insertion, join
    /// announcement, motd.
    fn login(&mut self, ctx: &mut HubCtx) {
        ctx.conns.clear_deadline(self.conn);
        self.state = State::Normal;

        let action = ctx.plugins.fire_user_connected(self);
        if action.is_set(DISCONNECT) {
            self.apply_disconnect(ctx);
            return;
        }

        let list = ctx.hub.roster.user_list();
        if !list.is_empty() {
            let snapshot = match self.supports.contains("ZLIF") {
                true => Buffer::zlib(&list),
                _ => Buffer::new(list),
            };
            ctx.conns.send(self.conn, Priority::Data, &snapshot);
        }

        self.added = true;
        ctx.hub
            .roster
            .add_local(self.sid, self.conn, self.info.clone());

        // The joiner sees its own BINF close the snapshot.
        let announce = Buffer::from_line(&self.info.to_adc(self.sid));
        ctx.hub.broadcast(ctx.conns, &announce, None, self.sid);

        let motd = format!("IMSG {} {}\n", ctx.hub.sid(), escape(&ctx.hub.motd));
        self.send_line(ctx.conns, Priority::Data, &motd);

        logging::info!(self.log, "user logged in";
                       "context" => "login",
                       "nick" => self.info.nick().unwrap_or(""));
    }

    fn handle_normal(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        if cmd.token(1) != Some(self.sid.to_wire().as_str()) {
            return Err(protocol_fault(format!("SID mismatch: {} expected", self.sid)));
        }

        match cmd.kind() {
            MsgType::Client | MsgType::FromHub | MsgType::Udp => {
                return Err(protocol_fault(format!(
                    "Message type unsupported: {} received",
                    cmd.kind().as_char()
                )));
            }
            _ => {}
        }

        if cmd.kind() == MsgType::HubBound {
            if cmd.code() == "DSC" {
                return self.handle_kick(ctx, cmd);
            }

            self.warn(ctx, "Unknown hub-directed message ignored");
            return Ok(());
        }

        if cmd.code() == "INF" {
            if cmd.kind() == MsgType::Broadcast {
                return self.handle_info(ctx, cmd);
            }

            self.warn(ctx, "INF message type invalid");
            return Ok(());
        }

        if cmd.code() == "MSG" {
            return self.handle_message(ctx, cmd);
        }

        self.route(ctx, cmd)
    }

    /// Default type-letter routing for everything without specialized
    /// handling. Unknown command codes of a valid type end up here and are
    /// forwarded verbatim.
    fn route(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        let buffer = Buffer::from_line(cmd.full());

        match cmd.kind() {
            MsgType::Broadcast => {
                ctx.hub.broadcast(ctx.conns, &buffer, Some(self.sid), self.sid);
            }
            MsgType::Active => {
                ctx.hub
                    .broadcast_active(ctx.conns, &buffer, true, Some(self.sid), self.sid);
            }
            MsgType::Passive => {
                ctx.hub
                    .broadcast_active(ctx.conns, &buffer, false, Some(self.sid), self.sid);
            }
            MsgType::Feature => {
                let clauses = roster::feature_clauses(cmd);
                ctx.hub
                    .broadcast_feature(ctx.conns, &buffer, &clauses, Some(self.sid), self.sid);
            }
            MsgType::Direct | MsgType::DirectQuiet => return self.route_directed(ctx, cmd),
            _ => unreachable!("Unroutable type gated upstream"),
        }

        Ok(())
    }

    fn route_directed(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        let dest = match cmd.token(2).and_then(|token| Sid::from_wire(token).ok()) {
            Some(dest) => dest,
            None => return Err(protocol_fault("Invalid destination sid")),
        };

        if dest == ctx.hub.sid() {
            return self.user_command(ctx, cmd);
        }

        let buffer = Buffer::from_line(cmd.full());
        ctx.hub.direct_to(ctx.conns, dest, &buffer);

        if cmd.kind() == MsgType::Direct {
            // Delivery ack: the sender gets its own line back.
            ctx.conns.send(self.conn, Priority::Data, &buffer);
        }

        Ok(())
    }

    /// A directed message at the hub sid is a command for the hub bot.
    fn user_command(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        let body = cmd.token(3).unwrap_or("").to_string();

        let action = ctx.plugins.fire_user_command(self, &body);
        if action.is_set(DISCONNECT) {
            self.apply_disconnect(ctx);
            return Ok(());
        }

        if !action.is_set(STOP) {
            let buffer = Buffer::from_line(cmd.full());
            ctx.conns.send(self.conn, Priority::Data, &buffer);
        }

        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        match cmd.kind() {
            MsgType::Direct | MsgType::DirectQuiet => {
                let dest = match cmd.token(2).and_then(|token| Sid::from_wire(token).ok()) {
                    Some(dest) => dest,
                    None => return Err(protocol_fault("Invalid destination sid")),
                };

                if dest == ctx.hub.sid() {
                    return self.user_command(ctx, cmd);
                }

                if cmd.tokens().len() < 4 {
                    self.warn(ctx, "Message parameters corrupt");
                    return Ok(());
                }

                let text = cmd.token(3).unwrap_or("").to_string();
                let action = match pm_group(cmd, 4) {
                    Some(group) => ctx.plugins.fire_user_private_message(self, cmd, &text, group),
                    None => ctx.plugins.fire_user_message(self, cmd, &text),
                };

                if action.is_set(DISCONNECT) {
                    self.apply_disconnect(ctx);
                    return Ok(());
                }
                if action.is_set(STOP) {
                    return Ok(());
                }

                let buffer = Buffer::from_line(cmd.full());
                ctx.hub.direct_to(ctx.conns, dest, &buffer);

                if cmd.kind() == MsgType::Direct {
                    ctx.conns.send(self.conn, Priority::Data, &buffer);
                }

                Ok(())
            }
            MsgType::Broadcast | MsgType::Active | MsgType::Passive => {
                if cmd.tokens().len() < 3 {
                    self.warn(ctx, "Message parameters corrupt");
                    return Ok(());
                }

                let text = cmd.token(2).unwrap_or("").to_string();
                let action = match pm_group(cmd, 3) {
                    Some(group) => ctx.plugins.fire_user_private_message(self, cmd, &text, group),
                    None => ctx.plugins.fire_user_message(self, cmd, &text),
                };

                if action.is_set(DISCONNECT) {
                    self.apply_disconnect(ctx);
                    return Ok(());
                }
                if action.is_set(STOP) {
                    return Ok(());
                }

                self.route(ctx, cmd)
            }
            _ => self.route(ctx, cmd),
        }
    }

    /// A `BINF` in NORMAL is an info update.
    fn handle_info(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        let mut update = UserInfo::from_params(cmd.tokens()[2..].iter().map(String::as_str));

        let action = ctx.plugins.fire_client_info(self, &mut update);
        if action.is_set(DISCONNECT) {
            self.apply_disconnect(ctx);
            return Ok(());
        }

        if self.info.has_redundant(&update) {
            return Err(protocol_fault("Redundant INF parameter received"));
        }

        if update.has(userinfo::ID) && update.get(userinfo::ID) != self.info.get(userinfo::ID) {
            return Err(protocol_fault("CID change rejected"));
        }

        if let Some(nick) = update.nick() {
            if ctx.hub.roster.has_nick(nick) {
                return Err(protocol_fault("Nick taken"));
            }
        }

        let buffer = match action.is_set(MODIFY) {
            true => Buffer::from_line(&update.to_adc(self.sid)),
            _ => Buffer::from_line(cmd.full()),
        };
        ctx.hub.broadcast(ctx.conns, &buffer, Some(self.sid), self.sid);

        self.info.merge(&update);
        if ctx.hub.roster.update_local(self.sid, &update) {
            logging::debug!(self.log, "udp mode switched"; "context" => "info");
        }

        Ok(())
    }

    /// `HDSC <actor> <victim> <mode> <mode|ND> <params...>` - operator
    /// removal of a peer, optionally recording a ban.
    fn handle_kick(&mut self, ctx: &mut HubCtx, cmd: &Command) -> LineResult {
        if !self.info.is_op() {
            self.warn(ctx, "Access denied");
            return Ok(());
        }

        let tokens = cmd.tokens();
        if tokens.len() < 6 {
            self.warn(ctx, "Disconnect command corrupt");
            return Ok(());
        }

        let silent = tokens[4] == "ND";
        if !(silent || tokens[3] == tokens[4]) {
            self.warn(ctx, "Disconnect command corrupt");
            return Ok(());
        }

        let victim = match Sid::from_wire(&tokens[2]) {
            Ok(victim) => victim,
            Err(_) => {
                self.warn(ctx, "Disconnect command corrupt");
                return Ok(());
            }
        };

        let victim_conn = match ctx.hub.roster.conn_of(victim) {
            Some(conn) => conn,
            None => {
                self.warn(ctx, "No such user");
                return Ok(());
            }
        };
        let victim_cid = ctx
            .hub
            .roster
            .local_info(victim)
            .and_then(|info| info.cid_str())
            .map(str::to_string);

        let full = match tokens[3].as_str() {
            "DI" if tokens.len() == 6 => {
                format!("IQUI {} DI {} {}\n", victim, self.sid, escape(&tokens[5]))
            }
            "KK" if tokens.len() == 6 => {
                if let Some(cid) = &victim_cid {
                    ctx.hub.server.ban(cid, None);
                }
                format!("IQUI {} KK {} {}\n", victim, self.sid, escape(&tokens[5]))
            }
            "BN" if tokens.len() == 7 => {
                let seconds: u64 = match tokens[5].parse() {
                    Ok(seconds) => seconds,
                    Err(_) => {
                        self.warn(ctx, "Disconnect command corrupt");
                        return Ok(());
                    }
                };
                if let Some(cid) = &victim_cid {
                    ctx.hub.server.ban(cid, Some(Duration::from_secs(seconds)));
                }
                format!(
                    "IQUI {} BN {} {} {}\n",
                    victim,
                    self.sid,
                    seconds,
                    escape(&tokens[6])
                )
            }
            "RD" if tokens.len() == 7 => format!(
                "IQUI {} RD {} {} {}\n",
                victim,
                self.sid,
                escape(&tokens[5]),
                escape(&tokens[6])
            ),
            _ => {
                self.warn(ctx, "Disconnect command corrupt");
                return Ok(());
            }
        };

        if victim == self.sid {
            self.kicked(ctx, full, silent);
            return Ok(());
        }

        let mut session = ctx
            .sessions
            .take(victim_conn)
            .expect("Rostered peer without a session");
        if let SessionKind::Client(target) = &mut session {
            target.kicked(ctx, full, silent);
        }
        ctx.sessions.put(victim_conn, session);

        Ok(())
    }

    fn logout(&mut self, ctx: &mut HubCtx) {
        if !self.added {
            return;
        }

        self.added = false;
        ctx.hub.roster.remove(self.sid);
        let _ = ctx.plugins.fire_user_disconnected(self);
    }

    fn apply_disconnect(&mut self, ctx: &mut HubCtx) {
        let reason = self.pending_close.take().unwrap_or(None);
        self.close(ctx, reason.as_deref());
    }

    fn warn(&mut self, ctx: &mut HubCtx, msg: &str) {
        let line = ctx.hub.status_line(self.sid, 100, msg);
        self.send_line(ctx.conns, Priority::Control, &line);
    }

    fn error(&mut self, ctx: &mut HubCtx, msg: &str) {
        let line = ctx.hub.status_line(self.sid, 200, msg);
        self.send_line(ctx.conns, Priority::Control, &line);
    }

    fn send_line(&self, conns: &mut Conns, priority: Priority, line: &str) {
        conns.send(self.conn, priority, &Buffer::from_line(line));
    }
}

/// Locate a `PM<sid>` flag among the trailing parameters.
fn pm_group(cmd: &Command, start: usize) -> Option<Sid> {
    cmd.tokens().iter().skip(start).find_map(|token| {
        match token.strip_prefix("PM") {
            Some(rest) => Sid::from_wire(rest).ok(),
            None => None,
        }
    })
}
