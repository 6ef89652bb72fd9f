//! Message templates and byte patterns used by adaptation modules
//!
//! Templates build outgoing messages, patterns recognize incoming ones.
//!
//! ```text
//! template: "F0 00 20 33 01 10 30 {bank+01} {program} F7"
//! pattern:  "F0 00 20 33 01 ?? 10"
//! ```
//!
//! Template placeholders are `{channel}`, `{bank}` and `{program}`, each with
//! an optional hex offset (`{channel+30}`). Placeholder values must render to
//! 7-bit data bytes.

use std::fmt;
use std::str::FromStr;

use patchbay_core::midi::{int_vector_to_byte_vector, split_sysex, MessageError, SYSEX_END, SYSEX_START};
use patchbay_core::MidiMessage;
use serde::Deserialize;
use thiserror::Error;

/// Errors parsing or rendering templates and patterns
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid token '{0}'")]
    InvalidToken(String),

    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),

    #[error("template must start with F0 and end with F7")]
    NotSysex,

    #[error("empty pattern")]
    EmptyPattern,

    #[error("value {value} at index {index} is not a 7-bit data byte")]
    DataOutOfRange { index: usize, value: i32 },

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Values a template placeholder can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Channel,
    Bank,
    Program,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateToken {
    Byte(u8),
    Value { source: Placeholder, offset: u8 },
}

/// Values substituted into a template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateContext {
    pub channel: u8,
    pub bank: u32,
    pub program: u32,
}

impl TemplateContext {
    fn value(&self, source: Placeholder) -> i64 {
        match source {
            Placeholder::Channel => i64::from(self.channel),
            Placeholder::Bank => i64::from(self.bank),
            Placeholder::Program => i64::from(self.program),
        }
    }
}

fn parse_hex_byte(token: &str) -> Result<u8, TemplateError> {
    if token.is_empty() || token.len() > 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TemplateError::InvalidToken(token.to_string()));
    }
    u8::from_str_radix(token, 16).map_err(|_| TemplateError::InvalidToken(token.to_string()))
}

fn parse_placeholder(token: &str) -> Result<TemplateToken, TemplateError> {
    let inner = &token[1..token.len() - 1];
    let (name, offset) = match inner.split_once('+') {
        Some((name, offset)) => (name.trim(), parse_hex_byte(offset.trim())?),
        None => (inner.trim(), 0),
    };

    let source = match name {
        "channel" => Placeholder::Channel,
        "bank" => Placeholder::Bank,
        "program" => Placeholder::Program,
        _ => return Err(TemplateError::UnknownPlaceholder(name.to_string())),
    };

    Ok(TemplateToken::Value { source, offset })
}

/// Builds one or more SysEx messages from placeholders
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct MessageTemplate {
    tokens: Vec<TemplateToken>,
}

impl MessageTemplate {
    /// Render into messages
    ///
    /// A template containing several `F0 .. F7` frames yields one message per frame.
    pub fn render(&self, ctx: &TemplateContext) -> Result<Vec<MidiMessage>, TemplateError> {
        let mut ints = Vec::with_capacity(self.tokens.len());

        for (index, token) in self.tokens.iter().enumerate() {
            let value = match *token {
                TemplateToken::Byte(b) => i32::from(b),
                TemplateToken::Value { source, offset } => {
                    let value = ctx.value(source) + i64::from(offset);
                    if !(0..=0x7F).contains(&value) {
                        return Err(TemplateError::DataOutOfRange {
                            index,
                            value: value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                        });
                    }
                    value as i32
                }
            };
            ints.push(value);
        }

        let bytes = int_vector_to_byte_vector(&ints)?;
        Ok(split_sysex(&bytes))
    }
}

impl FromStr for MessageTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = s
            .split_whitespace()
            .map(|token| {
                if token.starts_with('{') && token.ends_with('}') && token.len() > 2 {
                    parse_placeholder(token)
                } else {
                    parse_hex_byte(token).map(TemplateToken::Byte)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        match (tokens.first(), tokens.last()) {
            (Some(TemplateToken::Byte(SYSEX_START)), Some(TemplateToken::Byte(SYSEX_END))) => {
                Ok(Self { tokens })
            }
            _ => Err(TemplateError::NotSysex),
        }
    }
}

impl TryFrom<String> for MessageTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Prefix pattern with `??` wildcards
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct BytePattern {
    bytes: Vec<Option<u8>>,
}

impl BytePattern {
    /// Whether the message starts with this pattern
    pub fn matches(&self, message: &[u8]) -> bool {
        message.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(message)
                .all(|(expected, actual)| expected.map_or(true, |b| b == *actual))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl FromStr for BytePattern {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s
            .split_whitespace()
            .map(|token| match token {
                "??" => Ok(None),
                _ => parse_hex_byte(token).map(Some),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if bytes.is_empty() {
            return Err(TemplateError::EmptyPattern);
        }
        Ok(Self { bytes })
    }
}

impl TryFrom<String> for BytePattern {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .bytes
            .iter()
            .map(|b| b.map_or_else(|| "??".to_string(), |b| format!("{:02X}", b)))
            .collect();
        write!(f, "{}", tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_placeholders() {
        let template: MessageTemplate = "F0 42 {channel+30} 58 {bank+01} {program} F7".parse().unwrap();
        let ctx = TemplateContext {
            channel: 2,
            bank: 1,
            program: 100,
        };

        let messages = template.render(&ctx).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_bytes(), &[0xF0, 0x42, 0x32, 0x58, 0x02, 0x64, 0xF7]);
    }

    #[test]
    fn test_render_multiple_frames() {
        let template: MessageTemplate = "F0 01 F7 F0 02 {channel} F7".parse().unwrap();
        let messages = template.render(&TemplateContext::default()).unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_render_rejects_non_data_values() {
        let template: MessageTemplate = "F0 {program} F7".parse().unwrap();
        let ctx = TemplateContext {
            program: 128,
            ..Default::default()
        };

        assert_eq!(
            template.render(&ctx),
            Err(TemplateError::DataOutOfRange { index: 1, value: 128 })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "F0 {voice} F7".parse::<MessageTemplate>(),
            Err(TemplateError::UnknownPlaceholder("voice".to_string()))
        );
        assert_eq!("41 10 F7".parse::<MessageTemplate>(), Err(TemplateError::NotSysex));
        assert!("F0 XYZ F7".parse::<MessageTemplate>().is_err());
        assert!("F0 100 F7".parse::<MessageTemplate>().is_err());
        assert_eq!("".parse::<BytePattern>(), Err(TemplateError::EmptyPattern));
    }

    #[test]
    fn test_signed_tokens_rejected() {
        assert_eq!(
            "F0 +F F7".parse::<MessageTemplate>(),
            Err(TemplateError::InvalidToken("+F".to_string()))
        );
        assert!("F0 {channel++1} F7".parse::<MessageTemplate>().is_err());
        assert_eq!(
            "F0 -1".parse::<BytePattern>(),
            Err(TemplateError::InvalidToken("-1".to_string()))
        );
    }

    #[test]
    fn test_pattern_matching() {
        let pattern: BytePattern = "F0 7E ?? 06 02".parse().unwrap();

        assert!(pattern.matches(&[0xF0, 0x7E, 0x05, 0x06, 0x02, 0x41, 0xF7]));
        assert!(!pattern.matches(&[0xF0, 0x7E, 0x05, 0x06, 0x01, 0xF7]));
        assert!(!pattern.matches(&[0xF0, 0x7E]));
        assert_eq!(pattern.to_string(), "F0 7E ?? 06 02");
    }

    #[test]
    fn test_deserialize_from_yaml_string() {
        let template: MessageTemplate = serde_yaml::from_str("\"F0 7E 7F 06 01 F7\"").unwrap();
        assert_eq!(template.render(&TemplateContext::default()).unwrap()[0].len(), 6);

        assert!(serde_yaml::from_str::<BytePattern>("\"F0 ZZ\"").is_err());
    }
}
