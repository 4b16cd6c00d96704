use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::command::{build_command_payload, Command, CommandPayload};
use crate::error::{Error, Result};

/// Registry entries with this name are water softeners
pub const SOFTENER_NAME: &str = "Smart HE";

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub connection: Option<Connection>,
}

/// One element of `data.devices` from `/device/registry`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub serial_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub generation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sw_version: Option<String>,
    pub region: Option<Region>,
    pub status: Option<DeviceStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegistryData {
    pub devices: Vec<RegistryEntry>,
}

/// Registry fields only water softeners carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftenerInfo {
    pub model: Option<String>,
    pub generation: Option<String>,
    pub software_version: Option<String>,
    pub region: Option<String>,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Generic,
    Softener(SoftenerInfo),
}

impl DeviceKind {
    pub fn classify(entry: &RegistryEntry) -> Self {
        if entry.name != SOFTENER_NAME {
            return DeviceKind::Generic;
        }

        DeviceKind::Softener(SoftenerInfo {
            model: entry.model.clone(),
            generation: entry.generation.clone(),
            software_version: entry.sw_version.clone(),
            region: entry.region.as_ref().and_then(|r| r.code.clone()),
            online: entry
                .status
                .as_ref()
                .and_then(|s| s.connection.as_ref())
                .map(|c| c.online)
                .unwrap_or(false),
        })
    }

    pub fn supported_commands(&self) -> &'static [Command] {
        match self {
            DeviceKind::Generic => &[],
            DeviceKind::Softener(_) => &Command::SOFTENER,
        }
    }
}

/// A device from the registry and the last property snapshot fetched for it
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub name: String,
    pub serial_number: String,
    pub kind: DeviceKind,
    properties: HashMap<String, Value>,
}

impl Device {
    pub fn from_entry(entry: &RegistryEntry) -> Self {
        Self {
            name: entry.name.clone(),
            serial_number: entry.serial_number.clone(),
            kind: DeviceKind::classify(entry),
            properties: HashMap::new(),
        }
    }

    pub fn is_softener(&self) -> bool {
        matches!(self.kind, DeviceKind::Softener(_))
    }

    pub fn softener(&self) -> Option<&SoftenerInfo> {
        match &self.kind {
            DeviceKind::Softener(info) => Some(info),
            DeviceKind::Generic => None,
        }
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    /// Look up a datapoint from the last snapshot. Nothing is defaulted.
    pub fn get_property(&self, name: &str) -> Result<&Value> {
        self.properties
            .get(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    /// Replace every property with `data.datapoints` from a `/device/data` envelope
    pub fn apply_snapshot(&mut self, envelope: &Value) -> Result<bool> {
        let datapoints = envelope
            .get("data")
            .ok_or_else(|| Error::MalformedResponse("device data has no 'data' key".into()))?
            .get("datapoints")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::MalformedResponse("device data has no 'datapoints' object".into())
            })?;

        self.properties = datapoints
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        debug!(
            "Device {} now has {} properties",
            self.serial_number,
            self.properties.len()
        );
        Ok(true)
    }

    pub fn build_command_payload(
        &self,
        command: &str,
        active: bool,
        duration: u32,
    ) -> Option<CommandPayload> {
        build_command_payload(
            &self.serial_number,
            self.kind.supported_commands(),
            command,
            active,
            duration,
        )
    }
}
