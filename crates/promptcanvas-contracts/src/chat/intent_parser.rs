use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

/// One parsed line of the interactive session.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    /// Trimmed, non-empty string argument.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    let parts: Vec<String> = match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    };
    parts.join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("value".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn plain_text_is_a_generate_intent() {
        let intent = parse_intent("  a red bicycle  ");
        assert_eq!(intent.action, "generate");
        assert_eq!(intent.prompt.as_deref(), Some("a red bicycle"));
    }

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn parse_setting_commands() {
        let category = parse_intent("/category HR");
        assert_eq!(category.action, "set_category");
        assert_eq!(category.arg("value"), Some("HR"));

        let style = parse_intent("/style flat illustration");
        assert_eq!(style.action, "set_style");
        assert_eq!(style.arg("value"), Some("flat illustration"));

        let count = parse_intent("/COUNT 3");
        assert_eq!(count.action, "set_count");
        assert_eq!(count.arg("value"), Some("3"));

        let history = parse_intent("/history");
        assert_eq!(history.action, "show_history");
        assert_eq!(history.arg("value"), None);
    }

    #[test]
    fn parse_quoted_paths() {
        let intent = parse_intent("/use \"/tmp/my photo.png\"");
        assert_eq!(intent.action, "set_active_image");
        assert_eq!(intent.command_args["path"], json!("/tmp/my photo.png"));

        let mask = parse_intent("/mask mask.png");
        assert_eq!(mask.action, "set_mask");
        assert_eq!(mask.arg("path"), Some("mask.png"));
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/clear").action, "clear_active_image");
        assert_eq!(parse_intent("/refine").action, "toggle_refine");
        assert_eq!(parse_intent("/styles").action, "list_styles");
        assert_eq!(parse_intent("/quit").action, "quit");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
