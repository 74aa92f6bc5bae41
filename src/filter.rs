//! Token decoding and hardware matching.
//!
//! A node matches when its type text equals a requested token. Every GPU
//! vendor type also matches the token `Gpu`, and all GPUs share the display
//! name and key `Gpu`, so discrete and integrated GPUs collapse into one
//! entry. That loss is a known limitation.

use crate::hardware::{flatten, HardwareNode};

pub const TOKEN_DELIMITER: char = ',';
pub const GPU_KEY: &str = "Gpu";

/// Requested type tokens in first-seen order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    tokens: Vec<String>,
}

impl TokenSet {
    /// Splits on commas and drops empty tokens. Tokens are matched exactly,
    /// so surrounding whitespace is significant.
    pub fn decode(input: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for token in input.split(TOKEN_DELIMITER) {
            if token.is_empty() || tokens.iter().any(|t| t == token) {
                continue;
            }
            tokens.push(token.to_string());
        }
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matched<'a> {
    pub node: &'a HardwareNode,
    pub key: String,
    pub display_name: String,
}

/// Nodes of `hardware` (depth-first, pre-order) whose type was requested.
pub fn select<'a>(hardware: &'a [HardwareNode], tokens: &TokenSet) -> Vec<Matched<'a>> {
    flatten(hardware)
        .into_iter()
        .filter_map(|node| {
            let type_text = node.hardware_type.as_str();
            let is_gpu = type_text.contains(GPU_KEY);
            if !tokens.contains(type_text) && !(is_gpu && tokens.contains(GPU_KEY)) {
                return None;
            }

            let (key, display_name) = if is_gpu {
                (GPU_KEY.to_string(), GPU_KEY.to_string())
            } else {
                (node.identifier.clone(), node.name.clone())
            };
            Some(Matched {
                node,
                key,
                display_name,
            })
        })
        .collect()
}
