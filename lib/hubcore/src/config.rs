use hashbrown::HashMap;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CLIENT_PORT: u16 = 1511;
pub const DEFAULT_INTER_PORT: u16 = 1512;

#[derive(Serialize, Deserialize)]
pub struct HubSection {
    pub name: String,
    pub description: String,
    pub motd: String,
    /// Shard-mask width shared by the federation; 0 means standalone.
    pub sid_bits: u32,
    /// This hub's id within the shard bits.
    pub hub_id: u32,
    pub interpass: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct NetSection {
    pub client_addr: String,
    pub inter_addr: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct PeerHub {
    pub address: String,
}

#[derive(Serialize, Deserialize)]
pub struct HubConfig {
    pub hub: HubSection,
    pub net: NetSection,
    #[serde(default)]
    pub peers: Vec<PeerHub>,
    /// Nickname to password table consumed by the password gate plugin.
    #[serde(default)]
    pub passwords: HashMap<String, String>,
}

impl Default for HubConfig {
    fn default() -> HubConfig {
        HubConfig {
            hub: HubSection {
                name: "adchub".to_string(),
                description: "An ADC hub".to_string(),
                motd: "Welcome".to_string(),
                sid_bits: 0,
                hub_id: 0,
                interpass: None,
            },
            net: NetSection {
                client_addr: format!("0.0.0.0:{}", DEFAULT_CLIENT_PORT),
                inter_addr: None,
            },
            peers: Vec::new(),
            passwords: HashMap::new(),
        }
    }
}

impl HubConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> HubConfig {
        serdeconv::from_toml_file(path).expect("Error loading hub configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let rendered = serdeconv::to_toml_string(&HubConfig::default()).unwrap();
        let restored: HubConfig = serdeconv::from_toml_str(&rendered).unwrap();

        assert_eq!(restored.hub.name, "adchub");
        assert_eq!(restored.hub.sid_bits, 0);
        assert_eq!(restored.net.client_addr, "0.0.0.0:1511");
        assert!(restored.peers.is_empty());
    }

    #[test]
    fn test_parse_federated_config() {
        let restored: HubConfig = serdeconv::from_toml_str(
            r#"
[hub]
name = "North"
description = "northern node"
motd = "hi"
sid_bits = 4
hub_id = 1
interpass = "linkpass"

[net]
client_addr = "0.0.0.0:1511"
inter_addr = "0.0.0.0:1512"

[[peers]]
address = "10.0.0.2:1512"

[passwords]
admin = "hunter2"
"#,
        )
        .unwrap();

        assert_eq!(restored.hub.sid_bits, 4);
        assert_eq!(restored.hub.interpass.as_deref(), Some("linkpass"));
        assert_eq!(restored.peers.len(), 1);
        assert_eq!(restored.passwords.get("admin").map(String::as_str), Some("hunter2"));
    }
}
