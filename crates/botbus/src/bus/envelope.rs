//! Wire envelope types for bus communication.
//!
//! Every message on the bus is an [`Envelope`]: a source identifier, a kind
//! tag from a small closed set, and a kind-specific payload. `CMD` carries a
//! console command to whichever process understands it; `RSP` carries the
//! asynchronous answer back, labelled with the caller-supplied correlation
//! value in `original`.

use serde::{Deserialize, Serialize};

/// Closed set of envelope kinds understood on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Cmd,
    Rsp,
}

impl Kind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Cmd => "CMD",
            Self::Rsp => "RSP",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CMD" => Some(Self::Cmd),
            "RSP" => Some(Self::Rsp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A payload field that is either a single line of text or a sequence of lines.
///
/// Encoded as a bare JSON string or a JSON array of strings. The untagged
/// representation keeps a one-element array a `List` on decode - senders that
/// wrap a single response line in a sequence stay a single-element sequence,
/// never collapse to a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// Kind-specific envelope payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    /// A command forwarded over the bus: first token, remaining argument
    /// text, and the full original input line for relay.
    Command {
        command: String,
        args: String,
        line: String,
    },

    /// An asynchronous answer. `original` carries the caller-supplied
    /// correlation value so the receiver can label the output.
    Response {
        original: FieldValue,
        response: FieldValue,
    },
}

impl Contents {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Command { .. } => Kind::Cmd,
            Self::Response { .. } => Kind::Rsp,
        }
    }
}

/// Decode-time failure: the multipart payload does not match any known kind.
///
/// Receivers drop the message, log, and keep polling - a malformed frame is
/// never fatal to the receive loop.
#[derive(Debug, thiserror::Error)]
pub enum MalformedEnvelope {
    #[error("malformed envelope: {got} parts, need at least 2")]
    TooFewParts { got: usize },

    #[error("malformed envelope: unknown kind tag {tag:?}")]
    UnknownKind { tag: String },

    #[error("malformed envelope: {kind} payload has {got} parts, expected {want}")]
    PartCount { kind: Kind, want: usize, got: usize },

    #[error("malformed envelope: part {index} is not valid UTF-8")]
    NotText { index: usize },

    #[error("malformed envelope: part {index} is not a valid field value: {source}")]
    Field {
        index: usize,
        source: serde_json::Error,
    },
}

/// The unit of bus communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Identifier of the emitting process.
    pub source: String,
    pub contents: Contents,
}

impl Envelope {
    pub fn command(
        source: impl Into<String>,
        command: impl Into<String>,
        args: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            contents: Contents::Command {
                command: command.into(),
                args: args.into(),
                line: line.into(),
            },
        }
    }

    pub fn response(
        source: impl Into<String>,
        original: impl Into<FieldValue>,
        response: impl Into<FieldValue>,
    ) -> Self {
        Self {
            source: source.into(),
            contents: Contents::Response {
                original: original.into(),
                response: response.into(),
            },
        }
    }

    pub fn kind(&self) -> Kind {
        self.contents.kind()
    }

    /// Serialize to wire parts: part 0 = source, part 1 = kind tag, parts 2..
    /// = payload fields as JSON values.
    pub fn to_parts(&self) -> serde_json::Result<Vec<Vec<u8>>> {
        let mut parts = vec![
            self.source.as_bytes().to_vec(),
            self.kind().as_tag().as_bytes().to_vec(),
        ];
        match &self.contents {
            Contents::Command {
                command,
                args,
                line,
            } => {
                parts.push(serde_json::to_vec(command)?);
                parts.push(serde_json::to_vec(args)?);
                parts.push(serde_json::to_vec(line)?);
            }
            Contents::Response { original, response } => {
                parts.push(serde_json::to_vec(original)?);
                parts.push(serde_json::to_vec(response)?);
            }
        }
        Ok(parts)
    }

    /// Parse wire parts back into an envelope.
    ///
    /// Total for anything [`to_parts`](Self::to_parts) produced; anything
    /// else fails with [`MalformedEnvelope`].
    pub fn from_parts<B: AsRef<[u8]>>(parts: &[B]) -> Result<Self, MalformedEnvelope> {
        if parts.len() < 2 {
            return Err(MalformedEnvelope::TooFewParts { got: parts.len() });
        }

        let source = text_part(parts, 0)?;
        let tag = text_part(parts, 1)?;
        let kind = Kind::from_tag(&tag).ok_or(MalformedEnvelope::UnknownKind { tag })?;

        let payload = &parts[2..];
        let contents = match kind {
            Kind::Cmd => {
                expect_parts(kind, 3, payload.len())?;
                Contents::Command {
                    command: json_part(payload, 0)?,
                    args: json_part(payload, 1)?,
                    line: json_part(payload, 2)?,
                }
            }
            Kind::Rsp => {
                expect_parts(kind, 2, payload.len())?;
                Contents::Response {
                    original: json_part(payload, 0)?,
                    response: json_part(payload, 1)?,
                }
            }
        };

        Ok(Self { source, contents })
    }
}

fn expect_parts(kind: Kind, want: usize, got: usize) -> Result<(), MalformedEnvelope> {
    if got == want {
        Ok(())
    } else {
        Err(MalformedEnvelope::PartCount { kind, want, got })
    }
}

fn text_part<B: AsRef<[u8]>>(parts: &[B], index: usize) -> Result<String, MalformedEnvelope> {
    std::str::from_utf8(parts[index].as_ref())
        .map(str::to_string)
        .map_err(|_| MalformedEnvelope::NotText { index })
}

fn json_part<B: AsRef<[u8]>, T: serde::de::DeserializeOwned>(
    payload: &[B],
    index: usize,
) -> Result<T, MalformedEnvelope> {
    serde_json::from_slice(payload[index].as_ref()).map_err(|source| MalformedEnvelope::Field {
        // Offset past the source and tag parts.
        index: index + 2,
        source,
    })
}
