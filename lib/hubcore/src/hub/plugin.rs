use crate::hub::interhub::InterSession;
use crate::hub::session::ClientSession;
use adcproto::command::Command;
use adcproto::logging;
use adcproto::sid::Sid;
use adcproto::userinfo::UserInfo;

pub const NOTHING: u8 = 0x0;
/// The handler rewrote the arguments; the message is re-serialized before
/// routing.
pub const MODIFY: u8 = 0x1;
/// The handler acted on the event. Informational.
pub const HANDLE: u8 = 0x2;
/// Skip the default behavior.
pub const STOP: u8 = 0x4;
/// The session was closed; downstream handlers never run and no routing
/// happens.
pub const DISCONNECT: u8 = 0x8;

/// The action bitset shared by every handler of one event. Each event kind
/// permits a fixed subset of bits; setting anything else is a programming
/// error and halts the process.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Action {
    can: u8,
    does: u8,
}

impl Action {
    #[inline]
    fn new(can: u8) -> Action {
        Action { can, does: NOTHING }
    }

    #[inline]
    pub fn set(&mut self, bits: u8) {
        assert!(
            self.can & bits == bits,
            "Illegal action bits {:#x} for this event (allowed {:#x})",
            bits,
            self.can
        );
        self.does |= bits;
    }

    #[inline]
    pub fn is_set(&self, bits: u8) -> bool {
        self.does & bits == bits
    }
}

/// The fixed event catalogue.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EventKind {
    PluginStarted,
    PluginStopped,
    PluginMessage,
    ClientConnected,
    ClientDisconnected,
    ClientLine,
    ClientLogin,
    ClientInfo,
    UserConnected,
    UserDisconnected,
    UserCommand,
    UserMessage,
    UserPrivateMessage,
    InterConnected,
    InterDisconnected,
    InterLine,
}

/// Bits each event kind permits its handlers to set.
pub fn allowed(kind: EventKind) -> u8 {
    match kind {
        EventKind::PluginStarted | EventKind::PluginStopped => NOTHING,
        EventKind::PluginMessage => HANDLE,
        EventKind::ClientConnected => HANDLE | DISCONNECT,
        EventKind::ClientDisconnected => HANDLE,
        EventKind::ClientLine => MODIFY | HANDLE | STOP | DISCONNECT,
        EventKind::ClientLogin => HANDLE | DISCONNECT,
        EventKind::ClientInfo => MODIFY | HANDLE | DISCONNECT,
        EventKind::UserConnected => HANDLE | DISCONNECT,
        EventKind::UserDisconnected => HANDLE,
        EventKind::UserCommand => MODIFY | HANDLE | STOP | DISCONNECT,
        EventKind::UserMessage => HANDLE | STOP | DISCONNECT,
        EventKind::UserPrivateMessage => HANDLE | STOP | DISCONNECT,
        EventKind::InterConnected => HANDLE | DISCONNECT,
        EventKind::InterDisconnected => HANDLE,
        EventKind::InterLine => MODIFY | HANDLE | STOP | DISCONNECT,
    }
}

/// A registered event handler. Every method defaults to doing nothing;
/// handlers implement what they care about and communicate back through the
/// action bitset and the session itself.
#[allow(unused_variables)]
pub trait Plugin {
    fn id(&self) -> &str;

    fn on_started(&mut self, action: &mut Action) {}
    fn on_stopped(&mut self, action: &mut Action) {}
    fn on_plugin_message(&mut self, action: &mut Action, from: &str, data: &str) {}

    fn on_client_connected(&mut self, action: &mut Action, client: &mut ClientSession) {}
    fn on_client_disconnected(&mut self, action: &mut Action, client: &mut ClientSession) {}
    fn on_client_line(&mut self, action: &mut Action, client: &mut ClientSession, cmd: &mut Command) {}
    fn on_client_login(&mut self, action: &mut Action, client: &mut ClientSession) {}
    fn on_client_info(&mut self, action: &mut Action, client: &mut ClientSession, update: &mut UserInfo) {}

    fn on_user_connected(&mut self, action: &mut Action, client: &mut ClientSession) {}
    fn on_user_disconnected(&mut self, action: &mut Action, client: &mut ClientSession) {}
    fn on_user_command(&mut self, action: &mut Action, client: &mut ClientSession, msg: &str) {}
    fn on_user_message(&mut self, action: &mut Action, client: &mut ClientSession, cmd: &Command, msg: &str) {}
    fn on_user_private_message(
        &mut self,
        action: &mut Action,
        client: &mut ClientSession,
        cmd: &Command,
        msg: &str,
        group: Sid,
    ) {
    }

    fn on_inter_connected(&mut self, action: &mut Action, link: &mut InterSession) {}
    fn on_inter_disconnected(&mut self, action: &mut Action, link: &mut InterSession) {}
    fn on_inter_line(&mut self, action: &mut Action, link: &mut InterSession, cmd: &mut Command) {}
}

/// Ordered handler registry. Handlers run in registration order; dispatch
/// stops early once a handler disconnects the session, since downstream
/// handlers must treat it as gone.
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    log: logging::Logger,
}

impl PluginManager {
    pub fn new(log: logging::Logger) -> PluginManager {
        PluginManager {
            plugins: Vec::new(),
            log,
        }
    }

    pub fn register(&mut self, mut plugin: Box<dyn Plugin>) {
        let mut action = Action::new(allowed(EventKind::PluginStarted));
        plugin.on_started(&mut action);

        logging::info!(self.log, "plugin registered"; "context" => "register", "plugin" => plugin.id());
        self.plugins.push(plugin);
    }

    /// Fire `PLUGIN_STOPPED` on every handler and drop them all.
    pub fn shutdown(&mut self) {
        for plugin in self.plugins.iter_mut() {
            let mut action = Action::new(allowed(EventKind::PluginStopped));
            plugin.on_stopped(&mut action);
        }

        self.plugins.clear();
    }

    /// Inter-plugin side channel.
    pub fn fire_plugin_message(&mut self, from: &str, data: &str) -> Action {
        self.dispatch(EventKind::PluginMessage, |plugin, action| {
            plugin.on_plugin_message(action, from, data)
        })
    }

    pub fn fire_client_connected(&mut self, client: &mut ClientSession) -> Action {
        self.dispatch(EventKind::ClientConnected, |plugin, action| {
            plugin.on_client_connected(action, client)
        })
    }

    pub fn fire_client_disconnected(&mut self, client: &mut ClientSession) -> Action {
        self.dispatch(EventKind::ClientDisconnected, |plugin, action| {
            plugin.on_client_disconnected(action, client)
        })
    }

    pub fn fire_client_line(&mut self, client: &mut ClientSession, cmd: &mut Command) -> Action {
        self.dispatch(EventKind::ClientLine, |plugin, action| {
            plugin.on_client_line(action, client, cmd)
        })
    }

    pub fn fire_client_login(&mut self, client: &mut ClientSession) -> Action {
        self.dispatch(EventKind::ClientLogin, |plugin, action| {
            plugin.on_client_login(action, client)
        })
    }

    pub fn fire_client_info(&mut self, client: &mut ClientSession, update: &mut UserInfo) -> Action {
        self.dispatch(EventKind::ClientInfo, |plugin, action| {
            plugin.on_client_info(action, client, update)
        })
    }

    pub fn fire_user_connected(&mut self, client: &mut ClientSession) -> Action {
        self.dispatch(EventKind::UserConnected, |plugin, action| {
            plugin.on_user_connected(action, client)
        })
    }

    pub fn fire_user_disconnected(&mut self, client: &mut ClientSession) -> Action {
        self.dispatch(EventKind::UserDisconnected, |plugin, action| {
            plugin.on_user_disconnected(action, client)
        })
    }

    pub fn fire_user_command(&mut self, client: &mut ClientSession, msg: &str) -> Action {
        self.dispatch(EventKind::UserCommand, |plugin, action| {
            plugin.on_user_command(action, client, msg)
        })
    }

    pub fn fire_user_message(&mut self, client: &mut ClientSession, cmd: &Command, msg: &str) -> Action {
        self.dispatch(EventKind::UserMessage, |plugin, action| {
            plugin.on_user_message(action, client, cmd, msg)
        })
    }

    pub fn fire_user_private_message(
        &mut self,
        client: &mut ClientSession,
        cmd: &Command,
        msg: &str,
        group: Sid,
    ) -> Action {
        self.dispatch(EventKind::UserPrivateMessage, |plugin, action| {
            plugin.on_user_private_message(action, client, cmd, msg, group)
        })
    }

    pub fn fire_inter_connected(&mut self, link: &mut InterSession) -> Action {
        self.dispatch(EventKind::InterConnected, |plugin, action| {
            plugin.on_inter_connected(action, link)
        })
    }

    pub fn fire_inter_disconnected(&mut self, link: &mut InterSession) -> Action {
        self.dispatch(EventKind::InterDisconnected, |plugin, action| {
            plugin.on_inter_disconnected(action, link)
        })
    }

    pub fn fire_inter_line(&mut self, link: &mut InterSession, cmd: &mut Command) -> Action {
        self.dispatch(EventKind::InterLine, |plugin, action| {
            plugin.on_inter_line(action, link, cmd)
        })
    }

    fn dispatch<F>(&mut self, kind: EventKind, mut fire: F) -> Action
    where
        F: FnMut(&mut Box<dyn Plugin>, &mut Action),
    {
        let mut action = Action::new(allowed(kind));

        for plugin in self.plugins.iter_mut() {
            fire(plugin, &mut action);

            if action.is_set(DISCONNECT) {
                break;
            }
        }

        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        id: &'static str,
        bits: u8,
        seen: ::std::rc::Rc<::std::cell::RefCell<Vec<&'static str>>>,
    }

    impl Plugin for Recorder {
        fn id(&self) -> &str {
            self.id
        }

        fn on_plugin_message(&mut self, action: &mut Action, _from: &str, _data: &str) {
            self.seen.borrow_mut().push(self.id);
            if self.bits != NOTHING {
                action.set(self.bits);
            }
        }
    }

    fn manager() -> PluginManager {
        PluginManager::new(logging::discard())
    }

    #[test]
    fn test_action_set_and_query() {
        let mut action = Action::new(HANDLE | STOP);

        assert!(!action.is_set(HANDLE));
        action.set(HANDLE);
        assert!(action.is_set(HANDLE));
        assert!(!action.is_set(STOP));
    }

    #[test]
    #[should_panic(expected = "Illegal action bits")]
    fn test_action_rejects_illegal_bits() {
        let mut action = Action::new(HANDLE);
        action.set(STOP);
    }

    #[test]
    fn test_dispatch_runs_in_registration_order() {
        let seen = ::std::rc::Rc::new(::std::cell::RefCell::new(Vec::new()));
        let mut plugins = manager();

        plugins.register(Box::new(Recorder {
            id: "first",
            bits: NOTHING,
            seen: seen.clone(),
        }));
        plugins.register(Box::new(Recorder {
            id: "second",
            bits: HANDLE,
            seen: seen.clone(),
        }));

        let action = plugins.fire_plugin_message("test", "data");

        assert!(action.is_set(HANDLE));
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_allowed_table() {
        assert_eq!(allowed(EventKind::ClientDisconnected), HANDLE);
        assert_eq!(allowed(EventKind::PluginStarted), NOTHING);
        assert_eq!(allowed(EventKind::ClientLine), MODIFY | HANDLE | STOP | DISCONNECT);
        assert_eq!(allowed(EventKind::ClientInfo), MODIFY | HANDLE | DISCONNECT);
    }
}
