use std::str::FromStr;

use thiserror::Error;
use utils::env::{GetFromEnvError, get_from_env};

/// Selects how console log lines are rendered
pub const LOG_STYLE_ENV_VAR: &str = "LOG_STYLE";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextColoring {
    On,
    Off,
    Auto,
}

impl TextColoring {
    #[must_use]
    pub fn use_ansi(self, is_terminal: bool) -> bool {
        match self {
            TextColoring::On => true,
            TextColoring::Off => false,
            TextColoring::Auto => is_terminal,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogStyle {
    Text(TextColoring),
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        LogStyle::Text(TextColoring::Auto)
    }
}

impl FromStr for LogStyle {
    type Err = LogStyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.as_str() {
            "json" => Ok(LogStyle::Json),
            "text" => Ok(LogStyle::Text(TextColoring::Auto)),
            "text-colored" => Ok(LogStyle::Text(TextColoring::On)),
            "text-uncolored" => Ok(LogStyle::Text(TextColoring::Off)),
            _ => Err(LogStyleParseError::UnrecognizedFormat(s)),
        }
    }
}

pub fn get_log_style_from_env(env_var_name: &str) -> Result<Option<LogStyle>, LogStyleParseError> {
    get_from_env(env_var_name)?
        .map(|val| val.parse())
        .transpose()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogStyleParseError {
    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),
    #[error("Env var error: {0:?}")]
    GetFromEnvError(#[from] GetFromEnvError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Verbose so that it doesn't clash with variables used by other tests
    static TEST_ENV_VAR: &str = "LOG_STYLE_TEST_ENV_VAR";

    #[rstest]
    #[case("text", LogStyle::Text(TextColoring::Auto))]
    #[case("text-colored", LogStyle::Text(TextColoring::On))]
    #[case("text-uncolored", LogStyle::Text(TextColoring::Off))]
    #[case("json", LogStyle::Json)]
    #[case("tEXt", LogStyle::Text(TextColoring::Auto))]
    #[case("tEXt-coLoRed", LogStyle::Text(TextColoring::On))]
    #[case("TEXT-UNCOLORED", LogStyle::Text(TextColoring::Off))]
    #[case("jSoN", LogStyle::Json)]
    fn parse_known_styles(#[case] input: &str, #[case] expected: LogStyle) {
        assert_eq!(input.parse::<LogStyle>(), Ok(expected));
    }

    #[test]
    fn parse_unknown_style() {
        assert_eq!(
            "Foo".parse::<LogStyle>(),
            Err(LogStyleParseError::UnrecognizedFormat("foo".to_owned()))
        );
    }

    #[rstest]
    #[case(TextColoring::On, false, true)]
    #[case(TextColoring::Off, true, false)]
    #[case(TextColoring::Auto, true, true)]
    #[case(TextColoring::Auto, false, false)]
    fn ansi_selection(
        #[case] coloring: TextColoring,
        #[case] is_terminal: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(coloring.use_ansi(is_terminal), expected);
    }

    #[test]
    #[serial_test::serial]
    fn parse_env_var() {
        unsafe {
            std::env::set_var(TEST_ENV_VAR, "JSON");
        }
        assert_eq!(get_log_style_from_env(TEST_ENV_VAR), Ok(Some(LogStyle::Json)));

        unsafe {
            std::env::set_var(TEST_ENV_VAR, "bar");
        }
        assert_eq!(
            get_log_style_from_env(TEST_ENV_VAR),
            Err(LogStyleParseError::UnrecognizedFormat("bar".to_owned()))
        );

        unsafe {
            std::env::remove_var(TEST_ENV_VAR);
        }
        assert_eq!(get_log_style_from_env(TEST_ENV_VAR), Ok(None));
    }
}
