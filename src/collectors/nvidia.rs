use std::process::Command;
use tracing::debug;

const QUERY: &str =
    "--query-gpu=index,name,utilization.gpu,memory.used,memory.total,temperature.gpu,power.draw";

#[derive(Debug, Clone, PartialEq)]
pub struct SmiRow {
    pub index: String,
    pub name: String,
    pub utilization_percent: Option<f32>,
    pub memory_used_mib: Option<f32>,
    pub memory_total_mib: Option<f32>,
    pub temperature_celsius: Option<f32>,
    pub power_watts: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmiField {
    Temperature,
    Utilization,
    MemoryUsed,
    MemoryTotal,
    Power,
}

impl SmiRow {
    pub fn field(&self, field: SmiField) -> Option<f32> {
        match field {
            SmiField::Temperature => self.temperature_celsius,
            SmiField::Utilization => self.utilization_percent,
            SmiField::MemoryUsed => self.memory_used_mib,
            SmiField::MemoryTotal => self.memory_total_mib,
            SmiField::Power => self.power_watts,
        }
    }
}

/// Queries every NVIDIA GPU. Empty when the tool is missing or fails.
pub fn query() -> Vec<SmiRow> {
    let Some(output) = run_nvidia_smi(&[QUERY, "--format=csv,noheader,nounits"]) else {
        return Vec::new();
    };
    if !output.status.success() {
        debug!(status = %output.status, "nvidia-smi exited with failure");
        return Vec::new();
    }

    let Ok(text) = String::from_utf8(output.stdout) else {
        return Vec::new();
    };

    parse_rows(&text)
}

pub fn parse_rows(text: &str) -> Vec<SmiRow> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(|v| v.trim()).collect();
            if parts.len() < 7 || parts[0].is_empty() {
                return None;
            }

            Some(SmiRow {
                index: parts[0].to_string(),
                name: parts[1].to_string(),
                utilization_percent: parse_f32_loose(parts[2]),
                memory_used_mib: parse_f32_loose(parts[3]),
                memory_total_mib: parse_f32_loose(parts[4]),
                temperature_celsius: parse_f32_loose(parts[5]),
                power_watts: parse_f32_loose(parts[6]),
            })
        })
        .collect()
}

fn run_nvidia_smi(args: &[&str]) -> Option<std::process::Output> {
    if let Ok(output) = Command::new("nvidia-smi").args(args).output() {
        return Some(output);
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(output) = Command::new(r"C:\Windows\System32\nvidia-smi.exe")
            .args(args)
            .output()
        {
            return Some(output);
        }
    }

    None
}

/// Parses numbers the way nvidia-smi prints them, tolerating decimal commas
/// and unit suffixes. `[N/A]` and similar placeholders yield `None`.
pub fn parse_f32_loose(input: &str) -> Option<f32> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f32>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f32>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f32>().ok()
}
