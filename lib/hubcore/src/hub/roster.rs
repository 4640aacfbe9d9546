use crate::net::buffer::{Priority, SharedBuffer};
use crate::net::socket::{ConnId, Conns};
use adcproto::command::Command;
use adcproto::logging;
use adcproto::sid::Sid;
use adcproto::userinfo::{self, UserInfo};
use hashbrown::{HashMap, HashSet};

/// A locally connected, fully logged-in peer.
pub struct LocalEntry {
    pub conn: ConnId,
    pub info: UserInfo,
    pub udp_active: bool,
}

/// The authoritative map of logged-in peers: local sessions and remote
/// descriptors mirrored from federated hubs, plus the nick and cid
/// uniqueness indexes. Entries hold connection handles, never sockets or
/// sessions.
pub struct Roster {
    local: HashMap<Sid, LocalEntry>,
    remote: HashMap<Sid, UserInfo>,
    nicks: HashSet<String>,
    cids: HashSet<String>,
    log: logging::Logger,
}

impl Roster {
    pub fn new(log: logging::Logger) -> Roster {
        Roster {
            local: HashMap::new(),
            remote: HashMap::new(),
            nicks: HashSet::new(),
            cids: HashSet::new(),
            log,
        }
    }

    #[inline]
    pub fn has(&self, sid: Sid, local_only: bool) -> bool {
        self.local.contains_key(&sid) || (!local_only && self.remote.contains_key(&sid))
    }

    #[inline]
    pub fn is_local(&self, sid: Sid) -> bool {
        self.local.contains_key(&sid)
    }

    #[inline]
    pub fn has_cid(&self, cid: &str) -> bool {
        self.cids.contains(cid)
    }

    #[inline]
    pub fn has_nick(&self, nick: &str) -> bool {
        self.nicks.contains(nick)
    }

    /// Find the sid currently holding a cid. Linear; used only on collision.
    pub fn sid_of_cid(&self, cid: &str) -> Option<Sid> {
        self.local
            .iter()
            .find(|(_, entry)| entry.info.cid_str() == Some(cid))
            .map(|(&sid, _)| sid)
            .or_else(|| {
                self.remote
                    .iter()
                    .find(|(_, info)| info.cid_str() == Some(cid))
                    .map(|(&sid, _)| sid)
            })
    }

    #[inline]
    pub fn conn_of(&self, sid: Sid) -> Option<ConnId> {
        self.local.get(&sid).map(|entry| entry.conn)
    }

    #[inline]
    pub fn local_info(&self, sid: Sid) -> Option<&UserInfo> {
        self.local.get(&sid).map(|entry| &entry.info)
    }

    #[inline]
    pub fn local_count(&self) -> usize {
        self.local.len()
    }

    #[inline]
    pub fn remote_count(&self) -> usize {
        self.remote.len()
    }

    /// Insert a local session. Uniqueness violations here mean the checks
    /// upstream were skipped and the roster would corrupt, so they halt.
    pub fn add_local(&mut self, sid: Sid, conn: ConnId, info: UserInfo) {
        assert!(!self.has(sid, false), "Sid already in roster: {}", sid);

        let nick = info.nick().expect("Roster entry must carry a nick").to_string();
        let cid = info.cid_str().expect("Roster entry must carry a cid").to_string();

        assert!(!self.nicks.contains(&nick), "Nick already in roster: {}", nick);
        assert!(!self.cids.contains(&cid), "Cid already in roster: {}", cid);

        let udp_active = info.is_udp_active();

        self.nicks.insert(nick);
        self.cids.insert(cid);
        self.local.insert(
            sid,
            LocalEntry {
                conn,
                info,
                udp_active,
            },
        );

        logging::debug!(self.log, "local peer added"; "context" => "add_local", "sid" => %sid);
    }

    /// Upsert a remote descriptor, rewriting the secondary indexes when the
    /// nick or cid changes.
    pub fn add_remote(&mut self, sid: Sid, update: UserInfo) {
        assert!(
            !self.local.contains_key(&sid),
            "Remote sid collides with a local session: {}",
            sid
        );

        let entry = self.remote.entry(sid).or_insert_with(UserInfo::new);

        if update.has(userinfo::ID) {
            if let Some(old) = entry.cid_str() {
                self.cids.remove(old);
            }
            self.cids.insert(update.cid_str().expect("Checked above").to_string());
        }

        if update.has(userinfo::NICK) {
            if let Some(old) = entry.nick() {
                self.nicks.remove(old);
            }
            self.nicks.insert(update.nick().expect("Checked above").to_string());
        }

        entry.merge(&update);

        logging::debug!(self.log, "remote peer updated"; "context" => "add_remote", "sid" => %sid);
    }

    /// Merge an INF update into a local entry. Returns true when the peer
    /// flipped between UDP-active and passive.
    pub fn update_local(&mut self, sid: Sid, update: &UserInfo) -> bool {
        let entry = self.local.get_mut(&sid).expect("Update for unknown local sid");

        if update.has(userinfo::NICK) {
            if let Some(old) = entry.info.nick() {
                self.nicks.remove(old);
            }
            self.nicks.insert(update.nick().expect("Checked above").to_string());
        }

        entry.info.merge(update);

        let udp_active = entry.info.is_udp_active();
        let switched = udp_active != entry.udp_active;
        entry.udp_active = udp_active;

        switched
    }

    /// Remove a peer, local or remote, clearing the secondary indexes.
    pub fn remove(&mut self, sid: Sid) -> bool {
        let info = match self.local.remove(&sid) {
            Some(entry) => entry.info,
            None => match self.remote.remove(&sid) {
                Some(info) => info,
                None => return false,
            },
        };

        if let Some(nick) = info.nick() {
            self.nicks.remove(nick);
        }
        if let Some(cid) = info.cid_str() {
            self.cids.remove(cid);
        }

        logging::debug!(self.log, "peer removed"; "context" => "remove", "sid" => %sid);
        true
    }

    /// Remote sids homed at the given hub under the supplied shard mask.
    pub fn all_in_hub(&self, hub: Sid, mask: u32) -> Vec<Sid> {
        self.remote
            .keys()
            .filter(|sid| sid.masked(mask) == hub.masked(mask))
            .copied()
            .collect()
    }

    /// The whole roster as a stream of BINF lines, for the login snapshot.
    pub fn user_list(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for (&sid, entry) in self.local.iter() {
            out.extend_from_slice(entry.info.to_adc(sid).as_bytes());
        }
        for (&sid, info) in self.remote.iter() {
            out.extend_from_slice(info.to_adc(sid).as_bytes());
        }

        out
    }

    /// Local entries only, for the federation roster exchange.
    pub fn local_user_list(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for (&sid, entry) in self.local.iter() {
            out.extend_from_slice(entry.info.to_adc(sid).as_bytes());
        }

        out
    }

    /// Enqueue a buffer on one local peer's socket.
    pub fn send_to(&self, conns: &mut Conns, sid: Sid, buffer: &SharedBuffer) -> bool {
        match self.local.get(&sid) {
            Some(entry) => {
                conns.send(entry.conn, Priority::Data, buffer);
                true
            }
            None => false,
        }
    }

    /// Enqueue one shared buffer on every local peer's socket, except the
    /// optional sender.
    pub fn broadcast(&self, conns: &mut Conns, buffer: &SharedBuffer, except: Option<Sid>) {
        self.broadcast_filter(conns, buffer, except, |_| true)
    }

    /// Broadcast to UDP-active (or passive) peers only.
    pub fn broadcast_active(
        &self,
        conns: &mut Conns,
        buffer: &SharedBuffer,
        active: bool,
        except: Option<Sid>,
    ) {
        self.broadcast_filter(conns, buffer, except, |entry| entry.udp_active == active)
    }

    /// Broadcast to peers whose `SU` set satisfies every feature clause.
    pub fn broadcast_feature(
        &self,
        conns: &mut Conns,
        buffer: &SharedBuffer,
        clauses: &[(bool, String)],
        except: Option<Sid>,
    ) {
        self.broadcast_filter(conns, buffer, except, |entry| {
            clauses
                .iter()
                .all(|(required, feature)| entry.info.has_feature(feature) == *required)
        })
    }

    fn broadcast_filter<F>(&self, conns: &mut Conns, buffer: &SharedBuffer, except: Option<Sid>, keep: F)
    where
        F: Fn(&LocalEntry) -> bool,
    {
        for (&sid, entry) in self.local.iter() {
            if Some(sid) == except || !keep(entry) {
                continue;
            }

            conns.send(entry.conn, Priority::Data, buffer);
        }
    }
}

/// Extract the `(+|-)XXXX` clauses of a feature-filtered broadcast. Clauses
/// follow the sender sid and stop at the first token of another shape.
pub fn feature_clauses(cmd: &Command) -> Vec<(bool, String)> {
    let mut clauses = Vec::new();

    for token in cmd.tokens().iter().skip(2) {
        let bytes = token.as_bytes();

        let required = match bytes.first() {
            Some(b'+') => true,
            Some(b'-') => false,
            _ => break,
        };

        if bytes.len() != 5 {
            break;
        }

        clauses.push((required, token[1..].to_string()));
    }

    clauses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::buffer::Buffer;
    use crate::net::socket::Socket;

    fn roster() -> Roster {
        Roster::new(logging::discard())
    }

    fn info(nick: &str, cid: &str) -> UserInfo {
        let mut info = UserInfo::new();
        info.set(userinfo::NICK, nick);
        info.set(userinfo::ID, cid);
        info.set(userinfo::IP4, "127.0.0.1");
        info
    }

    fn conns_with(count: usize) -> (Conns, Vec<ConnId>) {
        let mut conns = Conns::new();
        let ids = (0..count)
            .map(|_| conns.insert(Socket::new(None, logging::discard())))
            .collect();
        (conns, ids)
    }

    fn queued(conns: &Conns, conn: ConnId) -> String {
        String::from_utf8(conns.socket(conn).unwrap().queued()).unwrap()
    }

    #[test]
    fn test_add_remove_local() {
        let mut roster = roster();
        let sid = Sid::from_value(1);

        roster.add_local(sid, 0, info("Alice", "AAAAAAAAAAAAA"));

        assert!(roster.has(sid, true));
        assert!(roster.has_nick("Alice"));
        assert!(roster.has_cid("AAAAAAAAAAAAA"));
        assert_eq!(roster.conn_of(sid), Some(0));

        assert!(roster.remove(sid));
        assert!(!roster.has(sid, false));
        assert!(!roster.has_nick("Alice"));
        assert!(!roster.has_cid("AAAAAAAAAAAAA"));
    }

    #[test]
    #[should_panic(expected = "Sid already in roster")]
    fn test_duplicate_sid_is_fatal() {
        let mut roster = roster();
        let sid = Sid::from_value(1);

        roster.add_local(sid, 0, info("Alice", "AAAAAAAAAAAAA"));
        roster.add_local(sid, 1, info("Bob", "AAAAAAAAAAAAC"));
    }

    #[test]
    #[should_panic(expected = "Cid already in roster")]
    fn test_duplicate_cid_is_fatal() {
        let mut roster = roster();

        roster.add_local(Sid::from_value(1), 0, info("Alice", "AAAAAAAAAAAAA"));
        roster.add_local(Sid::from_value(2), 1, info("Bob", "AAAAAAAAAAAAA"));
    }

    #[test]
    fn test_remote_upsert_rewrites_indexes() {
        let mut roster = roster();
        let sid = Sid::from_value(0x10001);

        roster.add_remote(sid, info("Carol", "AAAAAAAAAAAAC"));
        assert!(roster.has_nick("Carol"));

        roster.add_remote(sid, info("Carola", "AAAAAAAAAAAAC"));
        assert!(!roster.has_nick("Carol"));
        assert!(roster.has_nick("Carola"));
        assert_eq!(roster.remote_count(), 1);
    }

    #[test]
    fn test_update_local_detects_mode_switch() {
        let mut roster = roster();
        let sid = Sid::from_value(1);
        roster.add_local(sid, 0, info("Alice", "AAAAAAAAAAAAA"));

        let mut update = UserInfo::new();
        update.set(userinfo::UDP4, "4117");

        assert!(roster.update_local(sid, &update));
        assert!(!roster.update_local(sid, &UserInfo::from_params(vec!["NIAlicia"])));
        assert!(roster.has_nick("Alicia"));
        assert!(!roster.has_nick("Alice"));
    }

    #[test]
    fn test_all_in_hub() {
        let mut roster = roster();
        let mask = adcproto::sid::shard_mask(4);

        roster.add_remote(Sid::from_value(0x10001), info("Carol", "AAAAAAAAAAAAC"));
        roster.add_remote(Sid::from_value(0x10002), info("Dave", "AAAAAAAAAAAAE"));
        roster.add_remote(Sid::from_value(0x20001), info("Erin", "AAAAAAAAAAAAG"));

        let mut in_hub = roster.all_in_hub(Sid::from_value(0x10000), mask);
        in_hub.sort();

        assert_eq!(in_hub, vec![Sid::from_value(0x10001), Sid::from_value(0x10002)]);
    }

    #[test]
    fn test_broadcast_shares_one_buffer() {
        let mut roster = roster();
        let (mut conns, ids) = conns_with(3);

        roster.add_local(Sid::from_value(1), ids[0], info("Alice", "AAAAAAAAAAAAA"));
        roster.add_local(Sid::from_value(2), ids[1], info("Bob", "AAAAAAAAAAAAC"));
        roster.add_local(Sid::from_value(3), ids[2], info("Carol", "AAAAAAAAAAAAE"));

        let buffer = Buffer::from_line("BMSG AAAB hi\n");
        roster.broadcast(&mut conns, &buffer, Some(Sid::from_value(1)));

        // Sender excluded, everyone else got the same allocation.
        assert_eq!(queued(&conns, ids[0]), "");
        assert_eq!(queued(&conns, ids[1]), "BMSG AAAB hi\n");
        assert_eq!(queued(&conns, ids[2]), "BMSG AAAB hi\n");
        assert_eq!(::std::rc::Rc::strong_count(&buffer), 3);
    }

    #[test]
    fn test_broadcast_active_filter() {
        let mut roster = roster();
        let (mut conns, ids) = conns_with(2);

        let mut active = info("Alice", "AAAAAAAAAAAAA");
        active.set(userinfo::UDP4, "4117");

        roster.add_local(Sid::from_value(1), ids[0], active);
        roster.add_local(Sid::from_value(2), ids[1], info("Bob", "AAAAAAAAAAAAC"));

        let buffer = Buffer::from_line("ASCH AAAD query\n");
        roster.broadcast_active(&mut conns, &buffer, true, None);

        assert_eq!(queued(&conns, ids[0]), "ASCH AAAD query\n");
        assert_eq!(queued(&conns, ids[1]), "");
    }

    #[test]
    fn test_broadcast_feature_filter() {
        let mut roster = roster();
        let (mut conns, ids) = conns_with(3);

        let mut tigr = info("Alice", "AAAAAAAAAAAAA");
        tigr.set(userinfo::FEATURES, "TIGR,ZLIF");
        let mut nat = info("Bob", "AAAAAAAAAAAAC");
        nat.set(userinfo::FEATURES, "NAT0");

        roster.add_local(Sid::from_value(1), ids[0], tigr);
        roster.add_local(Sid::from_value(2), ids[1], nat);
        roster.add_local(Sid::from_value(3), ids[2], info("Carol", "AAAAAAAAAAAAE"));

        let cmd = Command::parse("FSCH AAAD +TIGR query").unwrap();
        let clauses = feature_clauses(&cmd);
        assert_eq!(clauses, vec![(true, "TIGR".to_string())]);

        let buffer = Buffer::from_line(cmd.full());
        roster.broadcast_feature(&mut conns, &buffer, &clauses, None);

        assert_eq!(queued(&conns, ids[0]), "FSCH AAAD +TIGR query\n");
        assert_eq!(queued(&conns, ids[1]), "");
        assert_eq!(queued(&conns, ids[2]), "");
    }

    #[test]
    fn test_feature_clauses_mixed() {
        let cmd = Command::parse("FSCH AAAD +TIGR -NAT0 query").unwrap();

        assert_eq!(
            feature_clauses(&cmd),
            vec![(true, "TIGR".to_string()), (false, "NAT0".to_string())]
        );
    }

    #[test]
    fn test_user_list_contains_everyone() {
        let mut roster = roster();
        roster.add_local(Sid::from_value(1), 0, info("Alice", "AAAAAAAAAAAAA"));
        roster.add_remote(Sid::from_value(0x10001), info("Carol", "AAAAAAAAAAAAC"));

        let list = String::from_utf8(roster.user_list()).unwrap();
        assert!(list.contains("NIAlice"));
        assert!(list.contains("NICarol"));

        let local = String::from_utf8(roster.local_user_list()).unwrap();
        assert!(local.contains("NIAlice"));
        assert!(!local.contains("NICarol"));
    }
}
