use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    annotation::{Annotation, AnnotationBuilder, AnnotationType},
    annotator::{local_hostname, Annotator},
    error::AnnotationError,
    hash::{derive_hash, HashType},
    signer::Signer,
};

/// Judges whether a reading was produced by an automated sensor feed
/// (satisfied) or entered by hand on a sheet (not satisfied).
pub struct AutomationAnnotator {
    hash_type: HashType,
    signer: Arc<dyn Signer>,
}

impl AutomationAnnotator {
    /// Creates an annotator that keys payloads with `hash_type` and signs with `signer`.
    pub fn new(hash_type: HashType, signer: Arc<dyn Signer>) -> Self {
        Self { hash_type, signer }
    }
}

#[async_trait]
impl Annotator for AutomationAnnotator {
    fn kind(&self) -> AnnotationType {
        AnnotationType::Automation
    }

    async fn annotate(&self, data: &[u8]) -> Result<Annotation> {
        let key = derive_hash(self.hash_type, data)?;
        let host = local_hostname();

        let satisfied = match Reading::sniff(data)? {
            Reading::Sheet(_) => false,
            Reading::Sensor(_) => true,
        };
        log::trace!("automation annotation for {key}: satisfied={satisfied}");

        AnnotationBuilder::new(key, self.hash_type, host, self.kind(), satisfied)
            .sign(self.signer.as_ref())
            .await
    }
}

/// A value typed into a spreadsheet by hand.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetReading {
    /// Sheet the value was entered on
    pub sheet_id: String,
    /// The entered value
    pub value: String,
}

/// A batch of samples pulled from a device's data API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Device the samples came from
    pub sensor_id: String,
    /// The API response body
    pub value: ReadingValues,
}

/// OData response carrying sensor samples.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadingValues {
    /// OData metadata URL, absent on some gateways
    #[serde(rename = "@odata.context", default)]
    pub context: String,
    /// Samples in the response
    #[serde(rename = "value")]
    pub values: Vec<SensorValue>,
}

/// One timestamped, quality-tagged sample.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorValue {
    /// Fully qualified name of the tag
    #[serde(rename = "FQN")]
    pub fqn: String,
    /// Sample timestamp as sent by the device
    #[serde(rename = "DateTime")]
    pub date_time: String,
    /// OPC quality code
    #[serde(rename = "OpcQuality")]
    pub opc_quality: u32,
    /// Measured value
    #[serde(rename = "Value")]
    pub value: f64,
    /// Display text, empty when absent
    #[serde(rename = "Text", default)]
    pub text: String,
}

/// Record shapes an automation payload may take.
///
/// Payloads carry no discriminator, so the shape is found by trying the
/// manual sheet layout first and the sensor layout second.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Manually entered
    Sheet(SheetReading),
    /// Machine produced
    Sensor(SensorReading),
}

impl Reading {
    /// Classifies `data`, failing with [`AnnotationError::MalformedPayload`]
    /// when it fits neither shape.
    pub fn sniff(data: &[u8]) -> Result<Self> {
        let sheet_err = match serde_json::from_slice::<SheetReading>(data) {
            Ok(sheet) => return Ok(Reading::Sheet(sheet)),
            Err(e) => e,
        };
        match serde_json::from_slice::<SensorReading>(data) {
            Ok(sensor) => Ok(Reading::Sensor(sensor)),
            Err(sensor_err) => Err(AnnotationError::MalformedPayload(format!(
                "not a sheet reading ({sheet_err}), not a sensor reading ({sensor_err})"
            ))
            .into()),
        }
    }
}
