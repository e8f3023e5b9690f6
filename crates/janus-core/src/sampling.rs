//! Sampling parameters for generation.

use serde::{Deserialize, Serialize};

/// Parameters controlling generation sampling.
///
/// Immutable once a request is accepted; wire adapters default absent
/// fields before admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature for sampling (0.0 = greedy, higher = more random).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p (nucleus) sampling threshold.
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling (0 = disabled).
    #[serde(default)]
    pub top_k: u32,

    /// Presence penalty (-2.0 to 2.0).
    #[serde(default)]
    pub presence_penalty: f32,

    /// Frequency penalty (-2.0 to 2.0).
    #[serde(default)]
    pub frequency_penalty: f32,

    /// Stop sequences that halt generation.
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Random seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: 0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stop_sequences: Vec::new(),
            max_tokens: default_max_tokens(),
            seed: None,
        }
    }
}

impl SamplingParams {
    /// Creates greedy sampling parameters (temperature = 0).
    #[must_use]
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            ..Default::default()
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the top-p value.
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the top-k value.
    #[must_use]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the maximum tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Adds a stop sequence.
    #[must_use]
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the sampling parameters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRequest`] if any parameter is out of
    /// range.
    pub fn validate(&self) -> crate::Result<()> {
        if self.temperature < 0.0 {
            return Err(crate::Error::invalid_request("temperature must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(crate::Error::invalid_request("top_p must be between 0.0 and 1.0"));
        }
        if !(-2.0..=2.0).contains(&self.presence_penalty) {
            return Err(crate::Error::invalid_request(
                "presence_penalty must be between -2.0 and 2.0",
            ));
        }
        if !(-2.0..=2.0).contains(&self.frequency_penalty) {
            return Err(crate::Error::invalid_request(
                "frequency_penalty must be between -2.0 and 2.0",
            ));
        }
        if self.max_tokens == 0 {
            return Err(crate::Error::invalid_request("max_tokens must be greater than 0"));
        }
        if self.stop_sequences.iter().any(String::is_empty) {
            return Err(crate::Error::invalid_request("stop sequences must be non-empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SamplingParams::default().validate().unwrap();
        SamplingParams::greedy().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(SamplingParams::default()
            .with_temperature(-0.1)
            .validate()
            .is_err());
        assert!(SamplingParams::default().with_top_p(1.5).validate().is_err());
        assert!(SamplingParams::default().with_max_tokens(0).validate().is_err());
        assert!(SamplingParams::default().with_stop("").validate().is_err());
    }
}
