//! Control vocabulary carried inside `Message` packets.
//!
//! Liveness pings, peer listing, deploy acknowledgements and module signals
//! all ride as plain text. Anything that is not a known directive is free
//! text and is only logged by the receiver.

use std::fmt;

use crate::node::Node;

pub const PING_REQ: &str = "__PING_REQ";
pub const PING_ACK: &str = "__PING_ACK";
pub const LIST_PEERS: &str = "__LIST_PEERS";
pub const LIST_RSP: &str = "__LIST_RSP";
pub const DEPLOY_ACK: &str = "__DEPLOY_ACK";
pub const DEPLOY_ERROR: &str = "__DEPLOY_ERROR";
pub const SIGNAL: &str = "__SIGNAL";

/// What a module signal asks the module subsystem to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAction {
    Start,
    Stop,
    Install,
    Uninstall,
}

impl ModuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleAction::Start => "start",
            ModuleAction::Stop => "stop",
            ModuleAction::Install => "install",
            ModuleAction::Uninstall => "uninstall",
        }
    }
}

impl std::str::FromStr for ModuleAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ModuleAction::Start),
            "stop" => Ok(ModuleAction::Stop),
            "install" => Ok(ModuleAction::Install),
            "uninstall" => Ok(ModuleAction::Uninstall),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    PingReq,
    PingAck,
    ListPeers,
    ListResponse(Vec<Node>),
    DeployAck,
    DeployError,
    Signal { target: String, action: ModuleAction },
    /// A `__SIGNAL` line that did not parse.
    BadSignal(String),
    Text(String),
}

impl ControlMessage {
    pub fn parse(text: &str) -> Self {
        match text {
            PING_REQ => return ControlMessage::PingReq,
            PING_ACK => return ControlMessage::PingAck,
            LIST_PEERS => return ControlMessage::ListPeers,
            DEPLOY_ACK => return ControlMessage::DeployAck,
            DEPLOY_ERROR => return ControlMessage::DeployError,
            _ => {}
        }

        if let Some(list) = text.strip_prefix(LIST_RSP) {
            return ControlMessage::ListResponse(parse_peer_list(list));
        }

        if let Some(rest) = text.strip_prefix(SIGNAL) {
            let mut words = rest.split_whitespace();
            return match (words.next(), words.next().map(str::parse::<ModuleAction>), words.next()) {
                (Some(target), Some(Ok(action)), None) if rest.starts_with(' ') => {
                    ControlMessage::Signal {
                        target: target.to_string(),
                        action,
                    }
                }
                _ => ControlMessage::BadSignal(rest.trim().to_string()),
            };
        }

        ControlMessage::Text(text.to_string())
    }

    pub fn to_text(&self) -> String {
        match self {
            ControlMessage::PingReq => PING_REQ.to_string(),
            ControlMessage::PingAck => PING_ACK.to_string(),
            ControlMessage::ListPeers => LIST_PEERS.to_string(),
            ControlMessage::ListResponse(peers) => {
                let list: Vec<String> = peers.iter().map(Node::to_string).collect();
                format!("{LIST_RSP}{}", list.join(","))
            }
            ControlMessage::DeployAck => DEPLOY_ACK.to_string(),
            ControlMessage::DeployError => DEPLOY_ERROR.to_string(),
            ControlMessage::Signal { target, action } => format!("{SIGNAL} {target} {action}"),
            ControlMessage::BadSignal(rest) => format!("{SIGNAL} {rest}"),
            ControlMessage::Text(text) => text.clone(),
        }
    }
}

/// Parse `host:port,host:port,...`. Entries that do not parse are skipped.
fn parse_peer_list(list: &str) -> Vec<Node> {
    list.split(',')
        .filter_map(|entry| {
            let (host, port) = entry.trim().rsplit_once(':')?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Some(Node::new(host, port.parse().ok()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_directives_parse() {
        assert_eq!(ControlMessage::parse("__PING_REQ"), ControlMessage::PingReq);
        assert_eq!(ControlMessage::parse("__PING_ACK"), ControlMessage::PingAck);
        assert_eq!(ControlMessage::parse("__LIST_PEERS"), ControlMessage::ListPeers);
        assert_eq!(ControlMessage::parse("__DEPLOY_ACK"), ControlMessage::DeployAck);
        assert_eq!(ControlMessage::parse("__DEPLOY_ERROR"), ControlMessage::DeployError);
    }

    #[test]
    fn peer_list_round_trips() {
        let peers = vec![Node::new("10.0.0.1", 51234), Node::new("::1", 7000)];
        let text = ControlMessage::ListResponse(peers.clone()).to_text();
        assert_eq!(text, "__LIST_RSP10.0.0.1:51234,[::1]:7000");
        assert_eq!(ControlMessage::parse(&text), ControlMessage::ListResponse(peers));
    }

    #[test]
    fn empty_peer_list() {
        assert_eq!(
            ControlMessage::parse("__LIST_RSP"),
            ControlMessage::ListResponse(Vec::new())
        );
    }

    #[test]
    fn signal_parses() {
        assert_eq!(
            ControlMessage::parse("__SIGNAL web install"),
            ControlMessage::Signal {
                target: "web".into(),
                action: ModuleAction::Install
            }
        );
        let text = ControlMessage::Signal {
            target: "db".into(),
            action: ModuleAction::Stop,
        }
        .to_text();
        assert_eq!(text, "__SIGNAL db stop");
    }

    #[test]
    fn malformed_signals_are_flagged() {
        assert!(matches!(
            ControlMessage::parse("__SIGNAL web explode"),
            ControlMessage::BadSignal(_)
        ));
        assert!(matches!(
            ControlMessage::parse("__SIGNAL web"),
            ControlMessage::BadSignal(_)
        ));
        assert!(matches!(
            ControlMessage::parse("__SIGNAL web start now"),
            ControlMessage::BadSignal(_)
        ));
    }

    #[test]
    fn anything_else_is_text() {
        assert_eq!(
            ControlMessage::parse("hello swarm"),
            ControlMessage::Text("hello swarm".into())
        );
    }
}
