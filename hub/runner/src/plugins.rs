use hubcore::hub::plugin::{Action, Plugin, DISCONNECT, HANDLE, STOP};
use hubcore::hub::session::ClientSession;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Challenges configured nicknames for their password at login.
pub struct PasswordGate {
    passwords: HashMap<String, String>,
}

impl PasswordGate {
    pub fn new<'a, I>(passwords: I) -> PasswordGate
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        PasswordGate {
            passwords: passwords
                .into_iter()
                .map(|(nick, password)| (nick.clone(), password.clone()))
                .collect(),
        }
    }
}

impl Plugin for PasswordGate {
    fn id(&self) -> &str {
        "passwd"
    }

    fn on_client_login(&mut self, action: &mut Action, client: &mut ClientSession) {
        let nick = match client.info().nick() {
            Some(nick) => nick.to_string(),
            None => return,
        };

        if let Some(password) = self.passwords.get(&nick) {
            client.ask_password(password);
            action.set(HANDLE);
        }
    }
}

struct FloodWindow {
    start: Instant,
    count: u32,
}

/// Per-session chat rate limiter. Counters live in the session's plugin bag.
pub struct FloodGuard {
    max_messages: u32,
    window: Duration,
}

impl FloodGuard {
    pub fn new(max_messages: u32, window: Duration) -> FloodGuard {
        FloodGuard {
            max_messages,
            window,
        }
    }

    /// True when this message pushes the session over the limit.
    fn over_limit(&self, client: &mut ClientSession) -> bool {
        let now = Instant::now();
        let window = self.window;
        let data = client.user_data();

        if data.get::<FloodWindow>().is_none() {
            data.insert(FloodWindow {
                start: now,
                count: 0,
            });
        }

        let state = data.get_mut::<FloodWindow>().expect("Inserted above");

        if now.duration_since(state.start) > window {
            state.start = now;
            state.count = 0;
        }

        state.count += 1;
        state.count > self.max_messages
    }
}

impl Plugin for FloodGuard {
    fn id(&self) -> &str {
        "floodguard"
    }

    fn on_user_message(
        &mut self,
        action: &mut Action,
        client: &mut ClientSession,
        _cmd: &adcproto::command::Command,
        _msg: &str,
    ) {
        if self.over_limit(client) {
            client.request_disconnect(Some("Flooding"));
            action.set(STOP | DISCONNECT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adcproto::command::Command;
    use adcproto::logging;
    use adcproto::sid::Sid;
    use hubcore::hub::plugin::PluginManager;

    #[test]
    fn test_password_gate_copies_table() {
        let mut table = HashMap::new();
        table.insert("admin".to_string(), "hunter2".to_string());

        let gate = PasswordGate::new(&table);
        assert_eq!(gate.passwords.get("admin").map(String::as_str), Some("hunter2"));
    }

    #[test]
    fn test_flood_guard_stops_spammers() {
        let mut plugins = PluginManager::new(logging::discard());
        plugins.register(Box::new(FloodGuard::new(2, Duration::from_secs(60))));

        let mut client = ClientSession::new(0, Sid::from_value(1), logging::discard());
        let cmd = Command::parse("BMSG AAAB hi").unwrap();

        for _ in 0..2 {
            let action = plugins.fire_user_message(&mut client, &cmd, "hi");
            assert!(!action.is_set(DISCONNECT));
        }

        let action = plugins.fire_user_message(&mut client, &cmd, "hi");
        assert!(action.is_set(STOP));
        assert!(action.is_set(DISCONNECT));
    }
}
