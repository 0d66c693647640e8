use serde::Deserialize;
use tracing::debug;

use crate::mqtt;

// ---------------------------------------------------------------------------
// Command vocabulary
// ---------------------------------------------------------------------------

/// The closed set of commands the device reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ToggleStatus,
}

#[derive(Debug, Deserialize)]
struct CommandMsg {
    command: String,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse an inbound message into a command. Commands are best-effort:
/// messages on non-command topics, malformed payloads, and unknown command
/// names are all silently dropped.
pub fn parse(topic: &str, payload: &[u8]) -> Option<Command> {
    if !mqtt::is_command_topic(topic) {
        debug!(%topic, "ignoring message on non-command topic");
        return None;
    }

    let msg: CommandMsg = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            debug!("ignoring malformed command payload: {e}");
            return None;
        }
    };

    match msg.command.as_str() {
        "toggle_status" => Some(Command::ToggleStatus),
        other => {
            debug!(command = %other, "ignoring unknown command");
            None
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "devices/node1/commands";

    #[test]
    fn parses_toggle_status() {
        let cmd = parse(TOPIC, br#"{"command":"toggle_status"}"#);
        assert_eq!(cmd, Some(Command::ToggleStatus));
    }

    #[test]
    fn ignores_non_command_topic() {
        assert_eq!(
            parse("devices/node1/sensors", br#"{"command":"toggle_status"}"#),
            None
        );
    }

    #[test]
    fn ignores_unknown_command() {
        assert_eq!(parse(TOPIC, br#"{"command":"reboot"}"#), None);
    }

    #[test]
    fn ignores_wrong_field_name() {
        assert_eq!(parse(TOPIC, br#"{"cmd":"x"}"#), None);
    }

    #[test]
    fn ignores_invalid_json() {
        assert_eq!(parse(TOPIC, b"not json"), None);
        assert_eq!(parse(TOPIC, b""), None);
    }

    #[test]
    fn ignores_wrong_value_type() {
        assert_eq!(parse(TOPIC, br#"{"command":7}"#), None);
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let cmd = parse(TOPIC, br#"{"command":"toggle_status","source":"app"}"#);
        assert_eq!(cmd, Some(Command::ToggleStatus));
    }
}
