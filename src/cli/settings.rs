//! # CLI Settings Parser
//!
//! Splits cleaned CLI output such as the reply to `get` into settings.
//!
//! ```text
//! gyro_lpf1_static_hz = 250
//! Allowed range: 0 - 1000
//! ```
//!
//! `diff`/`dump` output prefixes each line with `set `, which is accepted too.
//! Lines without ` = ` are not settings and are skipped, as are blank lines
//! and `#` comments.

use serde::Serialize;

/// One `name = value` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

/// Parse every `name = value` line of a capture, in order
///
/// # Examples
///
/// ```
/// use fc_link::cli::settings::parse_settings;
///
/// let settings = parse_settings("roll_rate = 70\r\npitch_rate = 70\r\n");
/// assert_eq!(settings.len(), 2);
/// assert_eq!(settings[0].name, "roll_rate");
/// assert_eq!(settings[0].value, "70");
/// ```
pub fn parse_settings(text: &str) -> Vec<Setting> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("set ").unwrap_or(line);
            let (name, value) = line.split_once(" = ")?;
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return None;
            }
            Some(Setting {
                name: name.to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_output() {
        let text = "gyro_lpf1_static_hz = 250\r\nAllowed range: 0 - 1000\r\n\r\n";
        assert_eq!(
            parse_settings(text),
            vec![Setting {
                name: "gyro_lpf1_static_hz".to_string(),
                value: "250".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_diff_output() {
        let text = "# master\r\nset motor_pwm_protocol = DSHOT600\r\nfeature -AIRMODE\r\nrc_smoothing = ON\r\n";
        let settings = parse_settings(text);

        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].name, "motor_pwm_protocol");
        assert_eq!(settings[0].value, "DSHOT600");
        assert_eq!(settings[1].name, "rc_smoothing");
    }

    #[test]
    fn test_value_may_contain_spaces() {
        let settings = parse_settings("name = My Quad\n");
        assert_eq!(settings[0].value, "My Quad");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_settings("").is_empty());
    }
}
