//! `parley set` / `parley unset` handling.

use std::fmt;

use crate::core::config::data::Config;
use crate::core::orchestrator::{OverlapPolicy, RegeneratePolicy};
use crate::utils::url::validate_base_url;

/// Keys accepted by `set` and `unset`, in display order.
pub const SETTING_KEYS: [&str; 7] = [
    "base-url",
    "default-model",
    "data-sources",
    "regenerate",
    "overlap",
    "connect-timeout",
    "native-regenerate",
];

/// Errors that can occur when modifying configuration settings.
#[derive(Debug, PartialEq, Eq)]
pub enum SettingError {
    /// The provided setting key is not recognized.
    UnknownKey(String),
    /// The value does not fit the key.
    InvalidValue {
        key: &'static str,
        input: String,
        expected: String,
    },
    /// Required arguments are missing.
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
}

impl SettingError {
    /// Print the error message to stderr with appropriate formatting.
    pub fn print(&self) {
        match self {
            SettingError::UnknownKey(key) => {
                eprintln!("❌ Unknown config key: {key}");
                eprintln!("   Known keys: {}", SETTING_KEYS.join(", "));
            }
            SettingError::InvalidValue {
                key,
                input,
                expected,
            } => {
                eprintln!("❌ Invalid value for {key}: {input}");
                eprintln!("   {expected}");
            }
            SettingError::MissingArgs { hint, example } => {
                eprintln!("⚠️  {hint}");
                eprintln!("Example: {example}");
            }
        }
    }
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(f, "Unknown config key: {key}"),
            SettingError::InvalidValue { key, input, .. } => {
                write!(f, "Invalid value for {key}: {input}")
            }
            SettingError::MissingArgs { hint, .. } => write!(f, "{hint}"),
        }
    }
}

impl std::error::Error for SettingError {}

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn single_value<'a>(
    args: &'a [String],
    hint: &'static str,
    example: &'static str,
) -> Result<&'a str, SettingError> {
    match args.first().map(|arg| arg.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SettingError::MissingArgs { hint, example }),
    }
}

fn invalid(key: &'static str, input: &str, expected: impl Into<String>) -> SettingError {
    SettingError::InvalidValue {
        key,
        input: input.to_string(),
        expected: expected.into(),
    }
}

/// Applies `parley set <key> <args...>` to `config` and returns the message to show.
pub fn apply_set(config: &mut Config, key: &str, args: &[String]) -> Result<String, SettingError> {
    match key {
        "base-url" => {
            let input = single_value(
                args,
                "Specify the service URL",
                "parley set base-url http://localhost:3001",
            )?;
            let url = validate_base_url(input).map_err(|err| invalid("base-url", input, err))?;
            config.base_url = Some(url.clone());
            Ok(format!("✅ Set base-url to: {url}"))
        }
        "default-model" => {
            let model = single_value(
                args,
                "Specify the model name",
                "parley set default-model gpt-4o-mini",
            )?;
            config.default_model = Some(model.to_string());
            Ok(format!("✅ Set default-model to: {model}"))
        }
        "data-sources" => {
            let sources: Vec<String> = args
                .iter()
                .flat_map(|arg| arg.split(','))
                .map(str::trim)
                .filter(|source| !source.is_empty())
                .map(str::to_owned)
                .collect();
            if sources.is_empty() {
                return Err(SettingError::MissingArgs {
                    hint: "Specify one or more data sources",
                    example: "parley set data-sources handbook.pdf faq.md",
                });
            }
            let message = format!("✅ Set data-sources to: {}", sources.join(", "));
            config.data_sources = sources;
            Ok(message)
        }
        "regenerate" => {
            let input = single_value(
                args,
                "Specify the regenerate policy",
                "parley set regenerate reuse-user-turn",
            )?;
            let policy: RegeneratePolicy =
                input.parse().map_err(|err: String| invalid("regenerate", input, err))?;
            config.regenerate = Some(policy);
            Ok(format!("✅ Set regenerate to: {policy}"))
        }
        "overlap" => {
            let input = single_value(
                args,
                "Specify the overlap policy",
                "parley set overlap cancel-previous",
            )?;
            let policy: OverlapPolicy = input
                .parse()
                .map_err(|err: String| invalid("overlap", input, err))?;
            config.overlap = Some(policy);
            Ok(format!("✅ Set overlap to: {policy}"))
        }
        "connect-timeout" => {
            let input = single_value(
                args,
                "Specify the timeout in seconds",
                "parley set connect-timeout 5",
            )?;
            let secs = input
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| invalid("connect-timeout", input, "Use a whole number of seconds"))?;
            config.connect_timeout_secs = Some(secs);
            Ok(format!("✅ Set connect-timeout to: {secs}s"))
        }
        "native-regenerate" => {
            let input = single_value(
                args,
                "Specify on or off",
                "parley set native-regenerate on",
            )?;
            let enabled = parse_bool(input).ok_or_else(|| {
                invalid(
                    "native-regenerate",
                    input,
                    "Use 'on' or 'off' (also accepts true/false, yes/no)",
                )
            })?;
            config.native_regenerate = Some(enabled);
            Ok(format!(
                "✅ Set native-regenerate to: {}",
                if enabled { "on" } else { "off" }
            ))
        }
        other => Err(SettingError::UnknownKey(other.to_string())),
    }
}

/// Applies `parley unset <key>`, restoring the built-in default.
pub fn apply_unset(config: &mut Config, key: &str) -> Result<String, SettingError> {
    match key {
        "base-url" => config.base_url = None,
        "default-model" => config.default_model = None,
        "data-sources" => config.data_sources.clear(),
        "regenerate" => config.regenerate = None,
        "overlap" => config.overlap = None,
        "connect-timeout" => config.connect_timeout_secs = None,
        "native-regenerate" => config.native_regenerate = None,
        other => return Err(SettingError::UnknownKey(other.to_string())),
    }
    Ok(format!("✅ Unset {key}"))
}
