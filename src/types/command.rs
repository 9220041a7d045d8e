//! Command tokens and delivery outcomes

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::{BridgeError, Result};

/// A command for the device: a non-negative integer in ASCII decimal form.
///
/// The digits are kept exactly as submitted (`"07"` stays `"07"`), because the
/// device echoes the same bytes back in its acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandToken(String);

impl CommandToken {
    /// Build a token from a digit-only string.
    pub fn new(digits: impl Into<String>) -> Result<Self> {
        let digits = digits.into();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BridgeError::invalid_command(format!(
                "expected ASCII digits, got {digits:?}"
            )));
        }
        Ok(Self(digits))
    }

    pub fn from_number(value: u64) -> Self {
        Self(value.to_string())
    }

    /// Extract the `command` field of a client JSON message.
    ///
    /// Accepts a non-negative integer or a digit-only string. Everything else
    /// (floats, booleans, negative numbers, missing field, invalid JSON) is
    /// rejected.
    ///
    /// JSON integers must fit in a `u64`; larger values are rejected because
    /// their digits are not preserved by the parser. Send them as a string.
    pub fn from_message(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BridgeError::invalid_command(format!("invalid JSON: {e}")))?;

        match value.get("command") {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Self::from_number)
                .ok_or_else(|| {
                    BridgeError::invalid_command(format!("not a non-negative 64-bit integer: {n}"))
                }),
            Some(Value::String(s)) => Self::new(s.as_str()),
            Some(other) => {
                Err(BridgeError::invalid_command(format!("unsupported command value: {other}")))
            }
            None => Err(BridgeError::invalid_command("missing `command` field")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire payload sent to the device.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The exact reply that confirms this command, e.g. `ACK2` for `2`.
    pub fn expected_ack(&self, prefix: &str) -> Vec<u8> {
        let mut ack = Vec::with_capacity(prefix.len() + self.0.len());
        ack.extend_from_slice(prefix.as_bytes());
        ack.extend_from_slice(self.0.as_bytes());
        ack
    }
}

impl FromStr for CommandToken {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final state of one command after the delivery state machine ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A matching acknowledgement arrived.
    Delivered { attempts: u32 },

    /// Every attempt failed; carries the last reply seen, if any.
    Exhausted { attempts: u32, last_reply: Option<Vec<u8>> },

    /// The device address was not known yet. Nothing was sent.
    Unreachable,

    /// Shutdown interrupted delivery.
    Cancelled { attempts: u32 },
}

impl CommandOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, CommandOutcome::Delivered { .. })
    }

    /// Number of datagrams sent for this command.
    pub fn attempts(&self) -> u32 {
        match self {
            CommandOutcome::Delivered { attempts }
            | CommandOutcome::Exhausted { attempts, .. }
            | CommandOutcome::Cancelled { attempts } => *attempts,
            CommandOutcome::Unreachable => 0,
        }
    }
}

/// A command paired with its outcome, published for telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub token: CommandToken,
    pub outcome: CommandOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_integer_and_digit_string_commands() {
        assert_eq!(CommandToken::from_message(r#"{"command": 2}"#).unwrap().as_str(), "2");
        assert_eq!(CommandToken::from_message(r#"{"command": "17"}"#).unwrap().as_str(), "17");
        assert_eq!(CommandToken::from_message(r#"{"command": "007"}"#).unwrap().as_str(), "007");
        assert_eq!(
            CommandToken::from_message(r#"{"command": 0, "extra": true}"#).unwrap().as_str(),
            "0"
        );
    }

    #[test]
    fn rejects_everything_else() {
        let rejected = [
            "not json",
            r#"{"cmd": 1}"#,
            r#"{"command": -1}"#,
            r#"{"command": 1.5}"#,
            r#"{"command": true}"#,
            r#"{"command": null}"#,
            r#"{"command": ""}"#,
            r#"{"command": "1a"}"#,
            r#"{"command": " 1"}"#,
            r#"{"command": "²"}"#,
            r#"{"command": [1]}"#,
            r#"[1, 2]"#,
        ];
        for text in rejected {
            let err = CommandToken::from_message(text).expect_err(text);
            assert!(matches!(err, BridgeError::InvalidCommand { .. }), "{text}");
        }
    }

    #[test]
    fn integers_are_limited_to_64_bits() {
        let max = CommandToken::from_message(r#"{"command": 18446744073709551615}"#).unwrap();
        assert_eq!(max.as_str(), "18446744073709551615");

        let err = CommandToken::from_message(r#"{"command": 18446744073709551616}"#).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidCommand { .. }));

        let long = CommandToken::from_message(r#"{"command": "18446744073709551616"}"#).unwrap();
        assert_eq!(long.as_str(), "18446744073709551616");
    }

    #[test]
    fn expected_ack_prefixes_the_digits() {
        let token: CommandToken = "12".parse().unwrap();
        assert_eq!(token.expected_ack("ACK"), b"ACK12".to_vec());
        assert_eq!(token.as_bytes(), b"12");
        assert_eq!(token.to_string(), "12");
    }

    #[test]
    fn outcome_attempt_counts() {
        assert_eq!(CommandOutcome::Delivered { attempts: 2 }.attempts(), 2);
        assert_eq!(CommandOutcome::Exhausted { attempts: 3, last_reply: None }.attempts(), 3);
        assert_eq!(CommandOutcome::Unreachable.attempts(), 0);
        assert!(!CommandOutcome::Unreachable.is_delivered());
    }
}
