//! Device prompt state machine.
//!
//! Every line a device prints is matched against one combined [`RegexSet`] and mapped to a
//! state: plain output, a pagination marker, an error line, one of the CLI prompts
//! (user, privileged, configuration) or an interactive question that needs an answer
//! (login name, password, confirmation). The session layer feeds lines in, asks which
//! prompt it is looking at, and asks for the command path to a target mode.

use std::collections::{HashMap, HashSet, VecDeque};

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::error::ConnectError;

/// Transition edge: (from_state, command, to_state, is_exit).
pub type Edge = (String, String, String, bool);

/// Interactive input: (is_dynamic, value or `dyn_param` key, record_in_output).
pub type InputSpec = (bool, String, bool);

pub struct DeviceHandler {
    /// Index of the current state in the `all_states` vector
    current_state_index: usize,

    /// All possible states the device can be in
    all_states: Vec<String>,

    /// Combined regex set for matching all state patterns
    all_regex: RegexSet,

    /// Maps regex match index to state index
    regex_index_map: HashMap<usize, usize>,

    /// Index range for prompt states in `all_states` (start, end)
    prompt_index: (usize, usize),

    /// Maps input states to the answer that must be typed
    input_map: HashMap<String, InputSpec>,

    /// State transition graph used for BFS mode switching
    edges: Vec<Edge>,

    /// Regex patterns for errors that should be ignored
    ignore_errors: Option<RegexSet>,

    /// Dynamic parameters for input substitution (login name, passwords)
    pub dyn_param: HashMap<String, String>,

    /// Last prompt text matched by the state machine.
    current_prompt: Option<String>,
}

/// Predefined states that exist in every device handler.
static PRE_STATE: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        "Output".to_string(),
        "More".to_string(),
        "Error".to_string(),
    ]
});

impl DeviceHandler {
    /// Creates a new `DeviceHandler` with the specified state machine configuration.
    ///
    /// # Arguments
    ///
    /// * `prompt` - List of (state_name, regex_patterns) for CLI prompts
    /// * `write` - List of (state_name, input, regex_patterns) for states requiring input
    /// * `more_regex` - Regex patterns that match pagination prompts (e.g., "--More--")
    /// * `error_regex` - Regex patterns that match error messages
    /// * `edges` - State transition graph: (from, command, to, is_exit)
    /// * `ignore_errors` - Regex patterns for errors that should be ignored
    /// * `dyn_param` - Dynamic parameters for input substitution
    pub fn new<I, S>(
        prompt: Vec<(String, I)>,
        write: Vec<(String, InputSpec, I)>,
        more_regex: I,
        error_regex: I,
        edges: Vec<Edge>,
        ignore_errors: I,
        dyn_param: HashMap<String, String>,
    ) -> Result<DeviceHandler, ConnectError>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        let mut all_states: Vec<String> = PRE_STATE
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();

        let mut regexs: Vec<String> = Vec::new();
        let mut regex_index_map = HashMap::new();

        let start_offset = regexs.len();
        regexs.extend(more_regex.into_iter().map(|s| s.as_ref().to_string()));
        for i in start_offset..regexs.len() {
            regex_index_map.insert(i, 1);
        }

        let start_offset = regexs.len();
        regexs.extend(error_regex.into_iter().map(|s| s.as_ref().to_string()));
        for i in start_offset..regexs.len() {
            regex_index_map.insert(i, 2);
        }

        for (state, regex_iter) in prompt {
            let state_index = all_states.len();
            all_states.push(state.to_ascii_lowercase());

            let start_offset = regexs.len();
            // Prompts may be preceded by NUL padding and a bare carriage return.
            regexs.extend(
                regex_iter
                    .into_iter()
                    .map(|s| format!(r"^\x00*\r{{0,1}}{}", s.as_ref().trim_start_matches('^'))),
            );
            for i in start_offset..regexs.len() {
                regex_index_map.insert(i, state_index);
            }
        }

        if all_states.len() == PRE_STATE.len() {
            return Err(ConnectError::InvalidDeviceHandlerConfig(
                "at least one prompt state is required".to_string(),
            ));
        }
        let prompt_index = (PRE_STATE.len(), all_states.len() - 1);

        let mut input_map = HashMap::new();
        for (state, input, regex_iter) in write {
            let state_index = all_states.len();
            all_states.push(state.to_ascii_lowercase());

            let start_offset = regexs.len();
            regexs.extend(regex_iter.into_iter().map(|s| s.as_ref().to_string()));
            input_map.insert(state.to_ascii_lowercase(), input);

            for i in start_offset..regexs.len() {
                regex_index_map.insert(i, state_index);
            }
        }

        input_map.insert("more".to_string(), (false, " ".to_string(), false));

        let all_regex = RegexSet::new(&regexs).map_err(|err| {
            ConnectError::InvalidDeviceHandlerConfig(format!(
                "failed to build state regex set: {}",
                err
            ))
        })?;

        let mut ignore_iter = ignore_errors.into_iter().peekable();
        let ignore_errors = if ignore_iter.peek().is_none() {
            None
        } else {
            Some(
                RegexSet::new(ignore_iter.map(|s| s.as_ref().to_string())).map_err(|err| {
                    ConnectError::InvalidDeviceHandlerConfig(format!(
                        "invalid ignore_errors regex set: {}",
                        err
                    ))
                })?,
            )
        };

        let edges = edges
            .into_iter()
            .map(|(start, cmd, end, exit)| {
                (start.to_ascii_lowercase(), cmd, end.to_ascii_lowercase(), exit)
            })
            .collect();

        Ok(Self {
            current_state_index: 0,
            all_states,
            all_regex,
            regex_index_map,
            prompt_index,
            input_map,
            edges,
            ignore_errors,
            dyn_param,
            current_prompt: None,
        })
    }

    /// Converts a line of output to a (state_index, state_name) pair.
    ///
    /// The first matching pattern wins; unmatched lines are plain output.
    fn line2state(&self, line: &str) -> (usize, &str) {
        let index = match self.all_regex.matches(line).into_iter().next() {
            Some(v) => v,
            None => return (0, "output"),
        };
        let state_index = self.regex_index_map.get(&index).copied().unwrap_or(0);
        let state = self
            .all_states
            .get(state_index)
            .map(|s| s.as_str())
            .unwrap_or("output");
        (state_index, state)
    }

    /// Reads a line of output and updates the current state.
    pub fn read(&mut self, line: &str) {
        trace!("Read line: '{:?}'", line);
        let (state_index, state) = self.line2state(line);
        trace!("Converted to state: '{:?}'", state);
        if self.ignore_error(line) {
            trace!("Ignoring error state");
            self.current_state_index = 0;
            return;
        }
        if self.match_prompt(state_index) {
            self.current_prompt = Some(line.to_string());
        }
        self.current_state_index = state_index;
    }

    fn ignore_error(&self, line: &str) -> bool {
        self.ignore_errors
            .as_ref()
            .map(|set| set.is_match(line))
            .unwrap_or(false)
    }

    fn match_prompt(&self, index: usize) -> bool {
        let (start, end) = self.prompt_index;
        index >= start && index <= end
    }

    /// Checks if a line matches a prompt pattern, i.e. the device waits for a command.
    pub fn read_prompt(&self, line: &str) -> bool {
        trace!("Checking if line is a prompt: '{:?}'", line);
        let (index, _) = self.line2state(line);
        self.match_prompt(index)
    }

    /// Checks if a line is an interactive question and returns the answer to send.
    ///
    /// Returns `Some((input, should_record))`, where `should_record` tells the caller
    /// whether the question text belongs in the command output. Dynamic inputs whose
    /// parameter is missing yield `None`.
    pub fn read_need_write(&self, line: &str) -> Option<(String, bool)> {
        trace!("Checking if input is required: '{:?}'", line);
        let (_, state) = self.line2state(line);
        let (is_dyn, s, is_record) = self.input_map.get(state)?;
        if *is_dyn {
            return self.dyn_param.get(s).map(|cmd| (cmd.clone(), *is_record));
        }
        Some((s.clone(), *is_record))
    }

    /// Returns the state name a line maps to without touching the current state.
    pub fn classify_line(&self, line: &str) -> &str {
        self.line2state(line).1
    }

    /// Returns the current state name.
    pub fn current_state(&self) -> &str {
        self.all_states
            .get(self.current_state_index)
            .map(|s| s.as_str())
            .unwrap_or("output")
    }

    /// Returns last prompt text matched by the state machine.
    pub fn current_prompt(&self) -> Option<&str> {
        self.current_prompt.as_deref()
    }

    /// Checks if the current state is an error state.
    pub fn error(&self) -> bool {
        // All states are normalized to lowercase during handler construction.
        self.current_state().eq("error")
    }

    /// Calculates the commands needed to transition to a target state.
    ///
    /// Breadth-first search over the edge list from the current state; returns
    /// (command, state_reached) pairs in execution order.
    pub fn trans_state_write(&self, state: &str) -> Result<Vec<(String, String)>, ConnectError> {
        let start_node = self.current_state().to_string();
        let end_node = state.to_ascii_lowercase();

        if start_node == end_node {
            return Ok(Vec::new());
        }
        if !self.all_states.contains(&end_node) {
            return Err(ConnectError::UnreachableState(end_node));
        }

        let mut adj_list: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for (from, label, to, _) in &self.edges {
            adj_list
                .entry(from.as_str())
                .or_default()
                .push((to.as_str(), label.as_str()));
        }

        let mut queue = VecDeque::new();
        queue.push_back(start_node.as_str());
        let mut visited = HashSet::new();
        visited.insert(start_node.as_str());
        // child -> (parent, edge label)
        let mut predecessors: HashMap<&str, (&str, &str)> = HashMap::new();

        while let Some(current_node) = queue.pop_front() {
            trace!("Current node: '{:?}'", current_node);
            if current_node == end_node {
                break;
            }
            if let Some(neighbors) = adj_list.get(current_node) {
                for &(neighbor_node, edge_label) in neighbors {
                    if visited.insert(neighbor_node) {
                        predecessors.insert(neighbor_node, (current_node, edge_label));
                        queue.push_back(neighbor_node);
                    }
                }
            }
        }

        if !predecessors.contains_key(end_node.as_str()) {
            return Err(ConnectError::UnreachableState(end_node));
        }

        let mut path = Vec::new();
        let mut current = end_node.as_str();
        while current != start_node {
            match predecessors.get(current) {
                Some(&(parent, edge_label)) => {
                    path.push((edge_label.to_string(), current.to_string()));
                    current = parent;
                }
                None => {
                    return Err(ConnectError::InternalServerError(format!(
                        "failed to backtrack path from '{}' to '{}'",
                        end_node, start_node
                    )));
                }
            }
        }
        path.reverse();
        trace!("Command path: '{:?}'", path);
        Ok(path)
    }
}

/// Matches carriage returns and backspace runs at the start of a line.
///
/// Devices redraw the line this way while paging, which would otherwise hide prompts.
pub static IGNORE_START_LINE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid IGNORE_START_LINE regex: {err}"),
        },
    );

#[cfg(test)]
mod tests {
    use super::DeviceHandler;
    use crate::error::ConnectError;
    use std::collections::HashMap;

    fn build_test_handler() -> DeviceHandler {
        let mut dyn_param = HashMap::new();
        dyn_param.insert("Password".to_string(), "secret\n".to_string());

        DeviceHandler::new(
            vec![
                ("Config".to_string(), vec![r"^dev\(\S+\)#\s*$"]),
                ("Enable".to_string(), vec![r"^dev#\s*$"]),
                ("Login".to_string(), vec![r"^dev>\s*$"]),
            ],
            vec![
                (
                    "Password".to_string(),
                    (true, "Password".to_string(), false),
                    vec![r"^Password:\s*$"],
                ),
                (
                    "Confirm".to_string(),
                    (false, "yes\n".to_string(), true),
                    vec![r"\[yes/no\]:\s*$"],
                ),
            ],
            vec![r"^\s*--More--\s*$"],
            vec![r"^% .+$"],
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
            vec![r"^% benign$"],
            dyn_param,
        )
        .expect("test handler config should be valid")
    }

    #[test]
    fn error_state_is_detected_after_error_line() {
        let mut handler = build_test_handler();
        handler.read("% Invalid input detected at '^' marker.");
        assert!(handler.error());
    }

    #[test]
    fn ignore_error_pattern_resets_to_output_state() {
        let mut handler = build_test_handler();
        handler.read("% benign");
        assert!(!handler.error());
        assert_eq!(handler.current_state(), "output");
    }

    #[test]
    fn config_submode_prompt_is_still_config() {
        let mut handler = build_test_handler();
        handler.read("dev(config-line)#");
        assert_eq!(handler.current_state(), "config");
        assert_eq!(handler.current_prompt(), Some("dev(config-line)#"));
    }

    #[test]
    fn read_need_write_supports_dynamic_and_static_inputs() {
        let handler = build_test_handler();
        assert_eq!(
            handler.read_need_write("Password:"),
            Some(("secret\n".to_string(), false))
        );
        assert_eq!(
            handler.read_need_write("Do you really want to replace them? [yes/no]: "),
            Some(("yes\n".to_string(), true))
        );
        assert_eq!(
            handler.read_need_write(" --More-- "),
            Some((" ".to_string(), false))
        );
        assert_eq!(handler.read_need_write("plain output"), None);
    }

    #[test]
    fn missing_dynamic_parameter_yields_no_answer() {
        let mut handler = build_test_handler();
        handler.dyn_param.clear();
        assert_eq!(handler.read_need_write("Password:"), None);
    }

    #[test]
    fn transition_path_is_found_for_reachable_state() {
        let mut handler = build_test_handler();
        handler.read("dev>");
        let path = handler
            .trans_state_write("Config")
            .expect("config should be reachable");
        assert_eq!(
            path,
            vec![
                ("enable".to_string(), "enable".to_string()),
                ("configure terminal".to_string(), "config".to_string()),
            ]
        );
    }

    #[test]
    fn transition_to_same_state_is_empty() {
        let mut handler = build_test_handler();
        handler.read("dev#");
        assert!(handler.trans_state_write("enable").unwrap().is_empty());
    }

    #[test]
    fn transition_to_unknown_state_returns_error() {
        let mut handler = build_test_handler();
        handler.read("dev#");
        let err = handler.trans_state_write("shell").unwrap_err();
        assert!(matches!(err, ConnectError::UnreachableState(_)));
    }

    #[test]
    fn invalid_handler_regex_returns_config_error() {
        let result = DeviceHandler::new(
            vec![("Enable".to_string(), vec![r"^dev#("])],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            HashMap::new(),
        );
        assert!(matches!(
            result,
            Err(ConnectError::InvalidDeviceHandlerConfig(_))
        ));
    }
}
