use crate::hub::roster::Roster;
use crate::net::socket::ConnId;
use adcproto::logging;
use adcproto::sid::{shard_mask, Sid};
use hashbrown::HashMap;
use std::time::{Duration, Instant};

/// Hub identity and federation state: the local hub sid, the shard mask
/// splitting the sid space between federated hubs, the sid allocator, the
/// link table towards sibling hubs and the ban registry.
pub struct ServerManager {
    sid: Sid,
    mask: u32,
    bits: u32,
    name: String,
    description: String,
    interpass: Option<String>,
    links: HashMap<Sid, ConnId>,
    bans: HashMap<String, Option<Instant>>,
    cursor: u32,
    log: logging::Logger,
}

impl ServerManager {
    /// `sid_bits` is the shard-mask width agreed across the federation; the
    /// hub's own sid is `hub_id` shifted into the shard bits, low bits zero.
    /// Zero bits means a standalone hub, which takes the reserved zero sid
    /// as its own address.
    pub fn new(
        name: &str,
        description: &str,
        sid_bits: u32,
        hub_id: u32,
        interpass: Option<String>,
        log: logging::Logger,
    ) -> ServerManager {
        let mask = shard_mask(sid_bits);

        let sid = match sid_bits {
            0 => {
                assert!(hub_id == 0, "Standalone hub cannot carry a hub id");
                Sid::NONE
            }
            _ => {
                assert!(hub_id < (1 << sid_bits), "Hub id does not fit the shard width");
                Sid::from_value(hub_id << (Sid::BITS - sid_bits))
            }
        };

        logging::info!(log, "hub identity";
                       "context" => "new",
                       "sid" => %sid,
                       "shard_bits" => sid_bits);

        ServerManager {
            sid,
            mask,
            bits: sid_bits,
            name: name.to_string(),
            description: description.to_string(),
            interpass,
            links: HashMap::new(),
            bans: HashMap::new(),
            cursor: 1,
            log,
        }
    }

    #[inline]
    pub fn sid(&self) -> Sid {
        self.sid
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn interpass(&self) -> Option<&str> {
        self.interpass.as_deref()
    }

    /// True when a sid falls inside this hub's shard.
    #[inline]
    pub fn is_local(&self, sid: Sid) -> bool {
        sid.masked(self.mask) == self.sid
    }

    /// The hub owning a sid.
    #[inline]
    pub fn hub_of(&self, sid: Sid) -> Sid {
        sid.masked(self.mask)
    }

    /// Hand out a fresh peer sid inside the local shard. Sids recycle after
    /// disconnect but are never reissued while present in the roster.
    pub fn alloc_sid(&mut self, roster: &Roster) -> Sid {
        let low_space = 1u32 << (Sid::BITS - self.bits);

        for _ in 0..low_space {
            let low = self.cursor % low_space;
            self.cursor = self.cursor.wrapping_add(1);

            if low == 0 {
                continue;
            }

            let sid = Sid::from_value(self.sid.value() | low);
            if !roster.has(sid, false) {
                return sid;
            }
        }

        panic!("Session id space exhausted");
    }

    /// Record a federation link as live.
    pub fn link_up(&mut self, hub: Sid, conn: ConnId) {
        logging::info!(self.log, "federation link up"; "context" => "link_up", "hub" => %hub);
        self.links.insert(hub, conn);
    }

    pub fn link_down(&mut self, hub: Sid) {
        logging::info!(self.log, "federation link down"; "context" => "link_down", "hub" => %hub);
        self.links.remove(&hub);
    }

    #[inline]
    pub fn link_for(&self, hub: Sid) -> Option<ConnId> {
        self.links.get(&hub).copied()
    }

    /// Links to forward a message to, skipping the hub that owns the
    /// message's source sid so nothing ever loops back.
    pub fn links_except_shard(&self, source: Sid) -> Vec<ConnId> {
        let source_hub = source.masked(self.mask);

        self.links
            .iter()
            .filter(|(&hub, _)| hub != source_hub)
            .map(|(_, &conn)| conn)
            .collect()
    }

    /// Record a cid ban. `None` duration bans permanently.
    pub fn ban(&mut self, cid: &str, duration: Option<Duration>) {
        let until = duration.map(|duration| Instant::now() + duration);

        logging::info!(self.log, "cid banned"; "context" => "ban", "cid" => cid);
        self.bans.insert(cid.to_string(), until);
    }

    /// Check a cid against the ban registry, purging the entry lazily once
    /// it expires.
    pub fn is_banned(&mut self, cid: &str) -> bool {
        match self.bans.get(cid) {
            None => false,
            Some(None) => true,
            Some(Some(until)) => {
                if Instant::now() < *until {
                    true
                } else {
                    self.bans.remove(cid);
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(bits: u32, id: u32) -> ServerManager {
        ServerManager::new("TestHub", "testing", bits, id, None, logging::discard())
    }

    #[test]
    fn test_identity_arithmetic() {
        let standalone = manager(0, 0);
        assert_eq!(standalone.sid(), Sid::NONE);
        assert_eq!(standalone.mask(), 0);
        assert!(standalone.is_local(Sid::from_value(0xfffff)));

        let sharded = manager(4, 3);
        assert_eq!(sharded.sid(), Sid::from_value(0x30000));
        assert!(sharded.is_local(Sid::from_value(0x30007)));
        assert!(!sharded.is_local(Sid::from_value(0x20007)));
        assert_eq!(sharded.hub_of(Sid::from_value(0x2abcd)), Sid::from_value(0x20000));
    }

    #[test]
    #[should_panic(expected = "Hub id does not fit the shard width")]
    fn test_identity_rejects_wide_hub_id() {
        let _ = manager(2, 4);
    }

    #[test]
    fn test_alloc_skips_zero_and_in_use() {
        let mut server = manager(0, 0);
        let mut roster = Roster::new(logging::discard());

        let first = server.alloc_sid(&roster);
        assert_eq!(first, Sid::from_value(1));

        let mut info = adcproto::userinfo::UserInfo::new();
        info.set(adcproto::userinfo::NICK, "Alice");
        info.set(adcproto::userinfo::ID, "AAAAAAAAAAAAA");
        roster.add_local(first, 0, info);

        let second = server.alloc_sid(&roster);
        assert_ne!(second, first);
        assert!(!second.is_none());
    }

    #[test]
    fn test_alloc_stays_inside_shard() {
        let mut server = manager(4, 3);
        let roster = Roster::new(logging::discard());

        for _ in 0..100 {
            let sid = server.alloc_sid(&roster);
            assert_eq!(sid.masked(server.mask()), server.sid());
            assert_ne!(sid, server.sid());
        }
    }

    #[test]
    fn test_links_and_loop_suppression() {
        let mut server = manager(4, 1);

        server.link_up(Sid::from_value(0x20000), 7);
        server.link_up(Sid::from_value(0x30000), 9);

        assert_eq!(server.link_for(Sid::from_value(0x20000)), Some(7));

        // A message sourced in hub 2 must not be forwarded back to hub 2.
        let targets = server.links_except_shard(Sid::from_value(0x20005));
        assert_eq!(targets, vec![9]);

        // Locally sourced traffic goes to every link.
        let mut targets = server.links_except_shard(Sid::from_value(0x10005));
        targets.sort();
        assert_eq!(targets, vec![7, 9]);

        server.link_down(Sid::from_value(0x20000));
        assert_eq!(server.link_for(Sid::from_value(0x20000)), None);
    }

    #[test]
    fn test_ban_registry() {
        let mut server = manager(0, 0);

        assert!(!server.is_banned("AAAAAAAAAAAAA"));

        server.ban("AAAAAAAAAAAAA", None);
        assert!(server.is_banned("AAAAAAAAAAAAA"));

        server.ban("AAAAAAAAAAAAC", Some(Duration::from_secs(0)));
        assert!(!server.is_banned("AAAAAAAAAAAAC"));
        assert!(server.is_banned("AAAAAAAAAAAAA"));
    }
}
