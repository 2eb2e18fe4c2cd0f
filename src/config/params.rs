//! The inbound parameter record of `run_tophat2_app` and its validation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::defs::PipelineError;

pub const REQUIRED_PARAMS: &[&str] = &[
    "input_ref",
    "assembly_or_genome_ref",
    "workspace_name",
    "alignment_suffix",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryType {
    FrUnstranded,
    FrFirststrand,
    FrSecondstrand,
}

impl LibraryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::FrUnstranded => "fr-unstranded",
            LibraryType::FrFirststrand => "fr-firststrand",
            LibraryType::FrSecondstrand => "fr-secondstrand",
        }
    }
}

/// Bowtie2 presets understood by tophat (`--b2-very-fast` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    B2VeryFast,
    B2Fast,
    B2Sensitive,
    B2VerySensitive,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::B2VeryFast => "b2-very-fast",
            Preset::B2Fast => "b2-fast",
            Preset::B2Sensitive => "b2-sensitive",
            Preset::B2VerySensitive => "b2-very-sensitive",
        }
    }
}

/// Parameters of one run. Cloned per collection member so every worker owns
/// the copy it injects its condition label into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopHatParams {
    pub input_ref: String,
    pub assembly_or_genome_ref: String,
    pub workspace_name: String,
    pub alignment_suffix: String,
    #[serde(default)]
    pub alignment_set_suffix: Option<String>,
    #[serde(default)]
    pub reads_condition: Option<String>,

    #[serde(default)]
    pub num_threads: Option<i64>,
    #[serde(default)]
    pub read_mismatches: Option<i64>,
    #[serde(default)]
    pub read_gap_length: Option<i64>,
    #[serde(default)]
    pub read_edit_dist: Option<i64>,
    #[serde(default)]
    pub min_intron_length: Option<i64>,
    #[serde(default)]
    pub max_intron_length: Option<i64>,
    #[serde(default)]
    pub min_anchor_length: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub report_secondary_alignments: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub no_coverage_search: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_choice")]
    pub library_type: Option<LibraryType>,
    #[serde(default, deserialize_with = "deserialize_choice")]
    pub preset_options: Option<Preset>,
}

/// Flags arrive either as JSON booleans or as 0/1 integers.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => Ok(Some(n.as_f64().is_some_and(|v| v != 0.0))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected boolean or integer flag, got {}",
            other
        ))),
    }
}

/// Enumerated options; an empty string means the option was not chosen.
fn deserialize_choice<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(other) => serde_json::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl TopHatParams {
    /// Checks required keys on the raw record before deserialising, so the
    /// error names the missing key verbatim.
    pub fn from_value(value: Value) -> Result<Self, PipelineError> {
        let map = value
            .as_object()
            .ok_or_else(|| PipelineError::Validation("parameters must be a JSON object".to_string()))?;

        for key in REQUIRED_PARAMS {
            match map.get(*key) {
                None | Some(Value::Null) => {
                    return Err(PipelineError::Validation(format!(
                        "\"{}\" parameter is required, but missing",
                        key
                    )));
                }
                Some(_) => {}
            }
        }

        serde_json::from_value(value)
            .map_err(|e| PipelineError::Validation(format!("invalid parameters: {}", e)))
    }

    pub fn alignment_set_suffix(&self) -> Result<&str, PipelineError> {
        self.alignment_set_suffix.as_deref().ok_or_else(|| {
            PipelineError::Validation("\"alignment_set_suffix\" parameter is required, but missing".to_string())
        })
    }

    /// Requested worker count; zero, negative or absent falls back to 1.
    pub fn thread_count(&self) -> usize {
        match self.num_threads {
            Some(n) if n > 0 => n as usize,
            _ => 1,
        }
    }

    pub fn condition(&self) -> &str {
        match self.reads_condition.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => crate::config::defs::DEFAULT_CONDITION,
        }
    }
}
