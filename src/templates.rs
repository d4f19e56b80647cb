//! Predefined device templates.
//!
//! A template is a [`DeviceHandler`] pre-configured with a device family's prompts,
//! login questions, error messages and mode transitions.

use crate::device::DeviceHandler;
use crate::error::ConnectError;
use crate::inventory::TransportKind;
use std::collections::HashMap;

/// `dyn_param` key answered at the login name question.
pub const USERNAME_PARAM: &str = "Username";

/// `dyn_param` key answered at login and enable password questions.
pub const PASSWORD_PARAM: &str = "Password";

/// Creates the handler for a transport kind.
pub fn by_transport(kind: TransportKind) -> Result<DeviceHandler, ConnectError> {
    match kind {
        TransportKind::TelnetCisco => cisco_ios_telnet(),
    }
}

/// Returns a `DeviceHandler` configured for Cisco IOS/IOS-XE devices behind telnet.
///
/// Login name and password answers are filled in by the session from the operator's
/// credentials; the same secret answers the `enable` password question.
pub fn cisco_ios_telnet() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        // Prompt
        vec![
            ("Config".to_string(), vec![r"^\S+\(\S+\)#\s*$"]),
            ("Enable".to_string(), vec![r"^[^\s#>]+#\s*$"]),
            ("Login".to_string(), vec![r"^[^\s<>#]+>\s*$"]),
        ],
        // Write (interactive inputs)
        vec![
            (
                USERNAME_PARAM.to_string(),
                (true, USERNAME_PARAM.to_string(), false),
                vec![r"(?i)^\s*(user ?name|login)\s*:\s*$"],
            ),
            (
                PASSWORD_PARAM.to_string(),
                (true, PASSWORD_PARAM.to_string(), false),
                vec![r"(?i)^\s*password\s*:\s*$"],
            ),
            (
                "ReplaceKeys".to_string(),
                (false, "yes\n".to_string(), true),
                vec![r"(?i)\[yes/no\]\s*:?\s*$"],
            ),
            (
                "Confirm".to_string(),
                (false, "\n".to_string(), true),
                vec![r"(?i)\[confirm\]\s*$"],
            ),
        ],
        // More regex
        vec![r"^\s*--More--\s*$", r"\s*<--- More --->\s*"],
        // Error regex
        vec![
            r"^% Invalid input detected.*",
            r"^% Incomplete command.*",
            r"^% Ambiguous command.*",
            r"^% Unknown command.*",
            r"^% Please create RSA keys.*",
            r"^% Please define a .*",
            r"^% Authorization failed.*",
            r"^Command authorization failed.*",
            r"^Command rejected:.*",
            r"^\s*\^\s*$",
        ],
        // Edges
        vec![
            (
                "Login".to_string(),
                "enable".to_string(),
                "Enable".to_string(),
                false,
            ),
            (
                "Enable".to_string(),
                "configure terminal".to_string(),
                "Config".to_string(),
                false,
            ),
            (
                "Config".to_string(),
                "end".to_string(),
                "Enable".to_string(),
                true,
            ),
        ],
        // Ignore errors
        Vec::<&str>::new(),
        // Dyn param
        HashMap::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> DeviceHandler {
        cisco_ios_telnet().expect("cisco template should build")
    }

    #[test]
    fn prompts_map_to_cli_modes() {
        let mut h = handler();
        h.read("router1>");
        assert_eq!(h.current_state(), "login");
        h.read("router1#");
        assert_eq!(h.current_state(), "enable");
        h.read("router1(config)#");
        assert_eq!(h.current_state(), "config");
        h.read("router1(config-line)#");
        assert_eq!(h.current_state(), "config");
    }

    #[test]
    fn login_questions_are_answered_from_params() {
        let mut h = handler();
        h.dyn_param
            .insert(USERNAME_PARAM.to_string(), "netops\n".to_string());
        h.dyn_param
            .insert(PASSWORD_PARAM.to_string(), "hunter2\n".to_string());
        assert_eq!(
            h.read_need_write("Username: "),
            Some(("netops\n".to_string(), false))
        );
        assert_eq!(
            h.read_need_write("Password: "),
            Some(("hunter2\n".to_string(), false))
        );
    }

    #[test]
    fn key_generation_notices_are_not_errors() {
        let mut h = handler();
        h.read("% Generating 2048 bit RSA keys, keys will be non-exportable...");
        assert!(!h.error());
        h.read("% Invalid input detected at '^' marker.");
        assert!(h.error());
    }

    #[test]
    fn key_generation_refusals_are_errors() {
        let mut h = handler();
        h.read("% Please define a domain-name first.");
        assert!(h.error());
        h.read("% Please define a hostname other than Router.");
        assert!(h.error());
    }

    #[test]
    fn replace_keys_question_is_confirmed() {
        let h = handler();
        let answer = h.read_need_write("Do you really want to replace them? [yes/no]: ");
        assert_eq!(answer, Some(("yes\n".to_string(), true)));
    }

    #[test]
    fn save_confirmation_is_accepted() {
        let h = handler();
        let answer = h.read_need_write("Destination filename [startup-config]? [confirm]");
        assert_eq!(answer, Some(("\n".to_string(), true)));
    }

    #[test]
    fn config_mode_is_reached_from_user_mode_through_enable() {
        let mut h = handler();
        h.read("router1>");
        let path = h.trans_state_write("Config").expect("path to config");
        let commands: Vec<_> = path.iter().map(|(cmd, _)| cmd.as_str()).collect();
        assert_eq!(commands, vec!["enable", "configure terminal"]);
    }
}
