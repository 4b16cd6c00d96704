use serde::Serialize;
use serde_json::Value;

/// Duration used by `bypass.timed.on` when the caller doesn't pick one
pub const DEFAULT_BYPASS_SECS: u32 = 60;

pub const PROTOCOL_VERSION: u8 = 1;

/// Commands understood by the `/device/command` endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    TelemetryGet,
    AwayModeSet,
    BypassTimedOn,
    BypassPermanentOn,
    BypassOff,
}

impl Command {
    /// Everything a softener accepts
    pub const SOFTENER: [Command; 5] = [
        Command::TelemetryGet,
        Command::AwayModeSet,
        Command::BypassTimedOn,
        Command::BypassPermanentOn,
        Command::BypassOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::TelemetryGet => "telemetry.get",
            Command::AwayModeSet => "awayMode.set",
            Command::BypassTimedOn => "bypass.timed.on",
            Command::BypassPermanentOn => "bypass.permanent.on",
            Command::BypassOff => "bypass.off",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::SOFTENER.into_iter().find(|c| c.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandParams {
    pub active: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Body posted to `/device/command`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    pub command: String,
    pub serial_number: String,
    pub protocol_version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<CommandParams>,
}

/// Build the payload for `command`, or `None` if it isn't in `supported`.
pub fn build_command_payload(
    serial_number: &str,
    supported: &[Command],
    command: &str,
    active: bool,
    duration: u32,
) -> Option<CommandPayload> {
    let command = Command::from_name(command).filter(|c| supported.contains(c))?;

    // telemetry.get rejects any params object
    let params = match command {
        Command::TelemetryGet => None,
        Command::BypassTimedOn => Some(CommandParams {
            active: active as u8,
            duration: Some(duration),
        }),
        _ => Some(CommandParams {
            active: active as u8,
            duration: None,
        }),
    };

    Some(CommandPayload {
        command: command.as_str().to_string(),
        serial_number: serial_number.to_string(),
        protocol_version: PROTOCOL_VERSION,
        params,
    })
}

/// Named softener operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetTelemetry,
    StartVacationMode,
    StopVacationMode,
    StartBypassMode,
    StartBypassTimedMode,
    StopBypassMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionBinding {
    pub command: Command,
    pub active: bool,
    pub uses_duration: bool,
}

const fn bind(command: Command, active: bool, uses_duration: bool) -> ActionBinding {
    ActionBinding {
        command,
        active,
        uses_duration,
    }
}

impl Action {
    pub fn binding(self) -> ActionBinding {
        match self {
            Action::GetTelemetry => bind(Command::TelemetryGet, true, false),
            Action::StartVacationMode => bind(Command::AwayModeSet, true, false),
            Action::StopVacationMode => bind(Command::AwayModeSet, false, false),
            Action::StartBypassMode => bind(Command::BypassPermanentOn, true, false),
            Action::StartBypassTimedMode => bind(Command::BypassTimedOn, true, true),
            Action::StopBypassMode => bind(Command::BypassOff, true, false),
        }
    }
}

/// Interpret the `success` field of a command response with JSON truthiness.
pub fn command_succeeded(response: &Value) -> bool {
    match response.get("success") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
    }
}
