use crate::command::escape;
use crate::sid::Sid;
use hashbrown::HashMap;

/// Two character INF parameter name.
pub type FieldId = [u8; 2];

pub const NICK: FieldId = *b"NI";
pub const ID: FieldId = *b"ID";
pub const IP4: FieldId = *b"I4";
pub const IP6: FieldId = *b"I6";
pub const UDP4: FieldId = *b"U4";
pub const UDP6: FieldId = *b"U6";
pub const FEATURES: FieldId = *b"SU";
pub const OPERATOR: FieldId = *b"OP";

/// Typed view over the INF parameters of one peer. A fully logged-in peer
/// always carries `NI`, `ID` and at least one of `I4`/`I6`.
#[derive(Clone, Debug, Default)]
pub struct UserInfo {
    fields: HashMap<FieldId, String>,
}

impl UserInfo {
    #[inline]
    pub fn new() -> UserInfo {
        UserInfo {
            fields: HashMap::new(),
        }
    }

    /// Build from the parameter tokens of an INF line. Tokens too short to
    /// carry a parameter name are dropped; empty values are kept so that a
    /// parsed update can express parameter removal.
    pub fn from_params<'a, I>(params: I) -> UserInfo
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut info = UserInfo::new();

        for param in params {
            let bytes = param.as_bytes();
            if bytes.len() < 2 {
                continue;
            }

            let id = [bytes[0], bytes[1]];
            info.fields.insert(id, param[2..].to_string());
        }

        info
    }

    /// Raw parameter lookup. Present-but-empty values are visible here.
    #[inline]
    pub fn get(&self, id: FieldId) -> Option<&str> {
        self.fields.get(&id).map(|value| value.as_str())
    }

    /// True when the parameter is present with a non-empty value.
    #[inline]
    pub fn has(&self, id: FieldId) -> bool {
        self.get(id).map_or(false, |value| !value.is_empty())
    }

    #[inline]
    pub fn set(&mut self, id: FieldId, value: &str) {
        if value.is_empty() {
            self.fields.remove(&id);
        } else {
            self.fields.insert(id, value.to_string());
        }
    }

    /// Apply an update: non-empty values overwrite, empty values delete.
    pub fn merge(&mut self, update: &UserInfo) {
        for (&id, value) in update.fields.iter() {
            if value.is_empty() {
                self.fields.remove(&id);
            } else {
                self.fields.insert(id, value.clone());
            }
        }
    }

    /// True when any parameter of the update matches the current value.
    pub fn has_redundant(&self, update: &UserInfo) -> bool {
        update
            .fields
            .iter()
            .any(|(id, value)| self.fields.get(id) == Some(value))
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &String)> {
        self.fields.iter()
    }

    #[inline]
    pub fn nick(&self) -> Option<&str> {
        self.get(NICK).filter(|value| !value.is_empty())
    }

    #[inline]
    pub fn cid_str(&self) -> Option<&str> {
        self.get(ID).filter(|value| !value.is_empty())
    }

    /// A peer is UDP-active when it published a UDP port.
    #[inline]
    pub fn is_udp_active(&self) -> bool {
        self.has(UDP4) || self.has(UDP6)
    }

    #[inline]
    pub fn is_op(&self) -> bool {
        self.get(OPERATOR) == Some("1")
    }

    /// Membership test against the comma separated `SU` feature set.
    pub fn has_feature(&self, feature: &str) -> bool {
        match self.get(FEATURES) {
            Some(set) => set.split(',').any(|item| item == feature),
            None => false,
        }
    }

    /// Serialize as a `BINF` line for the given sid. Parameters are emitted
    /// in sorted order so the wire form is deterministic; empty values are
    /// dropped.
    pub fn to_adc(&self, sid: Sid) -> String {
        let mut params: Vec<(&FieldId, &String)> = self
            .fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();
        params.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = format!("BINF {}", sid);
        for (id, value) in params {
            out.push(' ');
            out.push(id[0] as char);
            out.push(id[1] as char);
            out.push_str(&escape(value));
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserInfo {
        UserInfo::from_params(vec!["NIAlice", "IDAAAAAAAAAAAAA", "I4127.0.0.1", "SUTIGR,ZLIF"])
    }

    #[test]
    fn test_from_params() {
        let info = sample();

        assert_eq!(info.nick(), Some("Alice"));
        assert_eq!(info.cid_str(), Some("AAAAAAAAAAAAA"));
        assert_eq!(info.get(IP4), Some("127.0.0.1"));
        assert!(!info.has(IP6));
    }

    #[test]
    fn test_udp_activeness() {
        let mut info = sample();
        assert!(!info.is_udp_active());

        info.set(UDP4, "4117");
        assert!(info.is_udp_active());
    }

    #[test]
    fn test_operator_flag() {
        let mut info = sample();
        assert!(!info.is_op());

        info.set(OPERATOR, "1");
        assert!(info.is_op());
    }

    #[test]
    fn test_features() {
        let info = sample();

        assert!(info.has_feature("TIGR"));
        assert!(info.has_feature("ZLIF"));
        assert!(!info.has_feature("TIG"));
        assert!(!info.has_feature("NAT0"));
    }

    #[test]
    fn test_merge_deletes_on_empty() {
        let mut info = sample();
        let update = UserInfo::from_params(vec!["NIBob", "I4"]);

        info.merge(&update);

        assert_eq!(info.nick(), Some("Bob"));
        assert!(!info.has(IP4));
    }

    #[test]
    fn test_has_redundant() {
        let info = sample();

        assert!(info.has_redundant(&UserInfo::from_params(vec!["NIAlice"])));
        assert!(!info.has_redundant(&UserInfo::from_params(vec!["NIBob"])));
    }

    #[test]
    fn test_to_adc_deterministic() {
        let info = UserInfo::from_params(vec!["NIAlice Smith", "IDAAAAAAAAAAAAA", "I4127.0.0.1"]);
        let line = info.to_adc(Sid::from_value(1));

        assert_eq!(
            line,
            "BINF AAAB I4127.0.0.1 IDAAAAAAAAAAAAA NIAlice\\sSmith\n"
        );
    }
}
