//! Common types for LLM interactions

use serde::{Deserialize, Serialize};

/// Sampling parameters collected from the sidebar controls.
///
/// Only `max_output_tokens`, `temperature` and `top_p` reach the provider;
/// `top_k` and `repetition_penalty` are accepted for the controls but never
/// transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 5012,
            temperature: 0.9,
            top_k: 40,
            top_p: 0.9,
            repetition_penalty: 1.05,
        }
    }
}

impl GenerationOptions {
    /// Check every field against its control range
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            f64::from(self.max_output_tokens),
            f64::from(self.temperature),
            f64::from(self.top_k),
            f64::from(self.top_p),
            f64::from(self.repetition_penalty),
        ];
        for (spec, value) in option_specs().iter().zip(values) {
            if !(spec.min..=spec.max).contains(&value) {
                return Err(format!(
                    "{} must be between {} and {} (got {value})",
                    spec.name, spec.min, spec.max
                ));
            }
        }
        Ok(())
    }
}

/// Range, default and step for one sidebar control
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OptionSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub step: f64,
    /// Whether the value is sent to the provider
    pub transmitted: bool,
}

/// Control specs in `GenerationOptions` field order
pub fn option_specs() -> [OptionSpec; 5] {
    [
        OptionSpec {
            name: "max_output_tokens",
            min: 10.0,
            max: 8192.0,
            default: 5012.0,
            step: 10.0,
            transmitted: true,
        },
        OptionSpec {
            name: "temperature",
            min: 0.0,
            max: 2.0,
            default: 0.9,
            step: 0.05,
            transmitted: true,
        },
        OptionSpec {
            name: "top_k",
            min: 0.0,
            max: 200.0,
            default: 40.0,
            step: 1.0,
            transmitted: false,
        },
        OptionSpec {
            name: "top_p",
            min: 0.0,
            max: 1.0,
            default: 0.9,
            step: 0.01,
            transmitted: true,
        },
        OptionSpec {
            name: "repetition_penalty",
            min: 0.5,
            max: 2.0,
            default: 1.05,
            step: 0.01,
            transmitted: false,
        },
    ]
}

/// LLM request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            prompt: prompt.into(),
            options,
        }
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: Usage,
}

/// Usage statistics
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
