use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::{annotation::AnnotationType, hash::HashType, signer::KeyType};

/// Default time to wait for the broker to accept a connection.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Top level configuration for an annotating publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkInfo {
    /// Annotators to run over every payload, in order
    pub annotators: Vec<AnnotationType>,
    /// Hash used to derive annotation keys
    pub hash: HashInfo,
    /// Signing credential shared by all annotators
    pub signature: SignatureInfo,
    /// Where annotations are published
    pub stream: StreamInfo,
}

impl SdkInfo {
    /// Reads and parses a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {e}", path.display()))?;
        Self::from_json_str(&contents)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let info: SdkInfo = serde_json::from_str(s)?;
        info.validate()?;
        Ok(info)
    }

    /// Checks settings that serde alone cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if let StreamInfo::Mqtt(mqtt) = &self.stream {
            mqtt.validate()?;
        }
        Ok(())
    }
}

/// Hash selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashInfo {
    /// Algorithm used for annotation keys
    #[serde(rename = "type")]
    pub hash_type: HashType,
}

/// Location and algorithm of one half of a key pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Key algorithm
    #[serde(rename = "type")]
    pub key_type: KeyType,
    /// File holding the hex encoded key
    pub path: PathBuf,
}

/// Signing credential handed to every annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureInfo {
    /// Public half, used by consumers to verify
    #[serde(rename = "public")]
    pub public_key: KeyInfo,
    /// Private half, used to sign
    #[serde(rename = "private")]
    pub private_key: KeyInfo,
}

/// Stream backend together with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "type", content = "config")]
pub enum StreamInfo {
    /// MQTT broker
    #[serde(rename = "mqtt")]
    #[strum(serialize = "mqtt")]
    Mqtt(MqttConfig),
    /// In-process recorder
    #[serde(rename = "mock")]
    #[strum(serialize = "mock")]
    Mock,
}

/// Network endpoint of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Host name or address
    pub host: String,
    /// URI scheme, e.g. `tcp` or `ssl`
    pub protocol: String,
    /// Port number
    pub port: u16,
}

impl ServiceInfo {
    /// Renders the endpoint as `protocol://host:port`.
    pub fn uri(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// MQTT broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Quality of service level, 0 through 2
    pub qos: u8,
    /// Username, empty for anonymous
    #[serde(default)]
    pub user: String,
    /// Password, empty for anonymous
    #[serde(default)]
    pub password: String,
    /// Broker endpoint
    pub provider: ServiceInfo,
    /// Clean-session flag
    #[serde(default)]
    pub cleanness: bool,
    /// Topics every message is published to, in order
    pub topics: Vec<String>,
    /// Time to wait for the broker to accept a connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl MqttConfig {
    /// Rejects settings the broker client cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.qos > 2 {
            bail!("MQTT qos must be 0, 1 or 2, got {}", self.qos);
        }
        if self.topics.is_empty() {
            bail!("MQTT config must name at least one topic.");
        }
        Ok(())
    }
}
