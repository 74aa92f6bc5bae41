//! Compact text rendering of a [`Snapshot`].
//!
//! Finite snapshots are plain JSON from `serde_json`. When a sensor value is
//! NaN or infinite the standard encoder refuses it and the payload is written
//! again with the bare literals `NaN`, `Infinity` and `-Infinity`. That form
//! is a non-standard extension: consumers need a lenient decoder to read it.

use crate::snapshot::Snapshot;
use tracing::{debug, error};

pub const EMPTY_PAYLOAD: &str = "{}";

pub fn render(snapshot: &Snapshot) -> String {
    match serde_json::to_string(snapshot) {
        Ok(text) => text,
        Err(err) => {
            debug!(error = %err, "falling back to non-finite literal encoding");
            match render_extended(snapshot) {
                Ok(text) => text,
                Err(err) => {
                    error!(error = %err, "payload could not be encoded");
                    EMPTY_PAYLOAD.to_string()
                }
            }
        }
    }
}

/// Same layout as the standard encoding, with non-finite numbers spelled as
/// literal tokens.
pub fn render_extended(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    let mut out = String::from("{");
    for (i, (key, entry)) in snapshot.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(key)?);
        out.push_str(":{\"Name\":");
        out.push_str(&serde_json::to_string(&entry.name)?);
        out.push_str(",\"HardwareType\":");
        out.push_str(&serde_json::to_string(&entry.hardware_type)?);
        out.push_str(",\"Sensors\":[");
        for (j, sensor) in entry.sensors.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            out.push_str("{\"Name\":");
            out.push_str(&serde_json::to_string(&sensor.name)?);
            out.push_str(",\"Value\":");
            out.push_str(&number(sensor.value)?);
            if let Some(t) = &sensor.sensor_type {
                out.push_str(",\"Type\":");
                out.push_str(&serde_json::to_string(t)?);
            }
            out.push('}');
        }
        out.push_str("]}");
    }
    out.push('}');
    Ok(out)
}

fn number(value: f32) -> Result<String, serde_json::Error> {
    if value.is_nan() {
        return Ok("NaN".to_string());
    }
    if value.is_infinite() {
        let literal = if value > 0.0 { "Infinity" } else { "-Infinity" };
        return Ok(literal.to_string());
    }
    serde_json::to_string(&value)
}
