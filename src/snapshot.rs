use crate::filter::Matched;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::debug;

/// Filtered, normalized view of the hardware tree for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<String, HardwareEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HardwareEntry {
    pub name: String,
    pub hardware_type: String,
    pub sensors: Vec<SensorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorEntry {
    pub name: String,
    #[serde(serialize_with = "finite_only")]
    pub value: f32,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
}

impl Snapshot {
    /// Builds entries in match order; a later match under an existing key
    /// replaces the earlier entry.
    pub fn build(matched: &[Matched<'_>], include_sensor_type: bool) -> Self {
        let mut entries = BTreeMap::new();
        for m in matched {
            let hardware_type = m.node.hardware_type.as_str();
            let sensors = m
                .node
                .sensors
                .iter()
                .map(|s| SensorEntry {
                    name: s.name.clone(),
                    value: s.value.unwrap_or(0.0),
                    sensor_type: include_sensor_type.then(|| hardware_type.to_string()),
                })
                .collect();
            let entry = HardwareEntry {
                name: m.display_name.clone(),
                hardware_type: hardware_type.to_string(),
                sensors,
            };
            if entries.insert(m.key.clone(), entry).is_some() {
                debug!(key = %m.key, hardware = %m.node.identifier, "entry replaced by later hardware");
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&HardwareEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HardwareEntry)> {
        self.entries.iter()
    }
}

/// Standard JSON has no spelling for NaN or infinities; refuse them here so
/// the payload writer can switch to its literal-token form.
fn finite_only<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(S::Error::custom(format!("non-finite sensor value {value}")));
    }
    serializer.serialize_f32(*value)
}
