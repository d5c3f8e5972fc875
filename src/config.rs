//! `AlgorithmConfig` — deserializable tunables for an [`crate::algorithm::Algorithm`],
//! in the shape of a small `serde`+`toml` config struct.

use serde::Deserialize;

/// How to handle a stale DH-parameter file on the embedding transport's
/// TLS listener. TLS itself is out of scope for this crate; this
/// placeholder exists purely so an embedding transport has a documented,
/// typed knob to read instead of reinventing the question.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityPolicy {
    AlwaysRegenerate,
    Never,
    #[default]
    Prompt,
}

/// Tunables for [`crate::algorithm::Algorithm`]. Deserializable from TOML so
/// an embedder can ship one alongside the rest of its configuration, the
/// way `liveshare::config::Config` is loaded.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlgorithmConfig {
    /// Upper bound on the total number of requests retained across every
    /// user's `RequestLog` before `Algorithm::cleanup` prunes.
    #[serde(default = "default_max_total_log_size")]
    pub max_total_log_size: u32,

    /// Ambient policy placeholder read by the embedding transport; unused
    /// by the algorithm core itself.
    #[serde(default)]
    pub security_policy: SecurityPolicy,
}

fn default_max_total_log_size() -> u32 {
    2048
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self { max_total_log_size: default_max_total_log_size(), security_policy: SecurityPolicy::default() }
    }
}

impl AlgorithmConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
