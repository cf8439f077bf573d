use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const CMD_SET_MODE: &str = "setMode";
pub const CMD_SET_PHONE_GYRO: &str = "setPhoneGyro";

/// `{ "cmd": "setMode", "mode": <int> }`
///
/// The mode code is kept raw here; range checking belongs to whoever owns
/// the mode enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SetMode {
    pub mode: i64,
}

/// `{ "cmd": "setPhoneGyro", "gx": <float>, "gy": <float>, "gz": <float> }`
/// Rates in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SetPhoneGyro {
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    SetMode(SetMode),
    SetPhoneGyro(SetPhoneGyro),
    /// Well-formed envelope with a `cmd` we do not know. Not an error.
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("json parse error: {0}")]
    Json(#[source] serde_json::Error),
    #[error("missing or non-string 'cmd' field")]
    MissingCmd,
    #[error("bad '{cmd}' payload: {source}")]
    Payload {
        cmd: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one inbound frame.
///
/// Two-stage: the envelope is read first so that an unrecognised `cmd`
/// comes back as `InboundCommand::Unknown` instead of a parse failure.
pub fn decode(frame: &[u8]) -> Result<InboundCommand, DecodeError> {
    let doc: Value = serde_json::from_slice(frame).map_err(DecodeError::Json)?;

    let cmd = match doc.get("cmd").and_then(Value::as_str) {
        Some(c) => c.to_owned(),
        None => return Err(DecodeError::MissingCmd),
    };

    match cmd.as_str() {
        CMD_SET_MODE => payload(CMD_SET_MODE, doc).map(InboundCommand::SetMode),
        CMD_SET_PHONE_GYRO => payload(CMD_SET_PHONE_GYRO, doc).map(InboundCommand::SetPhoneGyro),
        _ => Ok(InboundCommand::Unknown(cmd)),
    }
}

fn payload<T: for<'de> Deserialize<'de>>(cmd: &'static str, doc: Value) -> Result<T, DecodeError> {
    serde_json::from_value(doc).map_err(|source| DecodeError::Payload { cmd, source })
}
