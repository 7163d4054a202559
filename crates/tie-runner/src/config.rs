//! Typed view of the YAML configuration file.
//!
//! Stage sections are kept as ordered option lists because the order options
//! are written in is the order their flags are emitted in. The string
//! `from_conditions` marks an option whose value is derived at call time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use serde_yaml::Value;

use crate::call_id::Stage;
use crate::condition::{scalar_string, Condition, ConditionSet};
use crate::errors::ConfigError;
use crate::progress::ProgressFilter;

pub const FROM_CONDITIONS: &str = "from_conditions";

/// Cufflinks/cuffdiff progress bars: `[*****      ]  37%`.
pub const DEFAULT_PRGBAR_REGEX: &str = r"\[[*#=>\s]*\]\s*\d+%";

/// One option value as written in a stage section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    FromConditions,
    Switch(bool),
    Literal(String),
}

impl ConfigValue {
    fn from_yaml(section: &str, option: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(ConfigValue::Switch(false)),
            Value::Bool(b) => Ok(ConfigValue::Switch(*b)),
            Value::Number(n) => Ok(ConfigValue::Literal(n.to_string())),
            Value::String(s) if s == FROM_CONDITIONS => Ok(ConfigValue::FromConditions),
            Value::String(s) => Ok(ConfigValue::Literal(s.clone())),
            Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
                Err(ConfigError::NonScalarOption {
                    section: section.to_string(),
                    option: option.to_string(),
                    found: yaml_kind(value),
                })
            }
        }
    }
}

/// Flag options and positional arguments of one stage, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOptions {
    options: Vec<(String, ConfigValue)>,
    positional: Vec<(String, ConfigValue)>,
}

impl StageOptions {
    pub fn from_yaml(stage: Stage, value: &Value) -> Result<Self, ConfigError> {
        let section = stage.options_key();
        let mapping = match value {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(m) => m,
            _ => {
                return Err(ConfigError::NotAMapping {
                    section: section.to_string(),
                })
            }
        };

        let mut out = Self::default();
        for (key, value) in mapping {
            let name = key_string(section, key)?;
            if name == "positional_args" {
                out.positional = parse_positional(stage, value)?;
                continue;
            }
            let parsed = ConfigValue::from_yaml(section, &name, value)?;
            out.options.push((name, parsed));
        }
        Ok(out)
    }

    pub fn options(&self) -> &[(String, ConfigValue)] {
        &self.options
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Positional arguments the file leaves out are derived.
    pub fn positional(&self, name: &str) -> ConfigValue {
        self.positional
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(ConfigValue::FromConditions)
    }
}

fn parse_positional(stage: Stage, value: &Value) -> Result<Vec<(String, ConfigValue)>, ConfigError> {
    let section = format!("{}.positional_args", stage.options_key());
    let mapping = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(m) => m,
        _ => return Err(ConfigError::NotAMapping { section }),
    };
    let expected = stage.positional_args();
    let mut out = Vec::new();
    for (key, value) in mapping {
        let name = key_string(&section, key)?;
        if !expected.contains(&name.as_str()) {
            return Err(ConfigError::UnknownPositional {
                section: stage.options_key().to_string(),
                name,
                expected: expected.join(", "),
            });
        }
        let parsed = ConfigValue::from_yaml(&section, &name, value)?;
        out.push((name, parsed));
    }
    Ok(out)
}

fn key_string(section: &str, key: &Value) -> Result<String, ConfigError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::NonScalarOption {
            section: section.to_string(),
            option: "<key>".to_string(),
            found: yaml_kind(other),
        }),
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub run_id: Option<String>,
    pub base_dir: PathBuf,
    #[serde(default)]
    pub bowtie_indexes_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "yes")]
    pub run_tophat: bool,
    #[serde(default = "yes")]
    pub run_cufflinks: bool,
    #[serde(default = "yes")]
    pub run_cuffmerge: bool,
    #[serde(default = "yes")]
    pub run_cuffdiff: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailInfo {
    pub email_from: String,
    pub email_to: String,
    /// Base64-encoded SMTP credential.
    #[serde(default)]
    pub email_li: String,
    #[serde(default)]
    pub smtp_url: Option<String>,
}

impl EmailInfo {
    pub fn credential(&self) -> Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.email_li.trim())
            .map_err(|e| anyhow!("email_li is not valid base64: {}", e))?;
        String::from_utf8(bytes).map_err(|e| anyhow!("email_li is not UTF-8: {}", e))
    }
}

fn current_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Deserialize)]
pub struct QsubOptions {
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default)]
    pub datahome: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub core_range: String,
    #[serde(default)]
    pub ld_library_path: String,
    pub template: PathBuf,
    #[serde(default = "current_dir")]
    pub script_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    run_options: RunOptions,
    #[serde(default)]
    prgbar_regex: Option<String>,
    #[serde(default)]
    email_info: Option<EmailInfo>,
    #[serde(default)]
    qsub_options: Option<QsubOptions>,
    #[serde(default)]
    tophat_options: Option<Value>,
    #[serde(default)]
    cufflinks_options: Option<Value>,
    #[serde(default)]
    cuffmerge_options: Option<Value>,
    #[serde(default)]
    cuffdiff_options: Option<Value>,
    #[serde(default)]
    condition_queue: Vec<Condition>,
}

impl RawConfig {
    fn stage_section(&self, stage: Stage) -> Option<&Value> {
        match stage {
            Stage::Tophat => self.tophat_options.as_ref(),
            Stage::Cufflinks => self.cufflinks_options.as_ref(),
            Stage::Cuffmerge => self.cuffmerge_options.as_ref(),
            Stage::Cuffdiff => self.cuffdiff_options.as_ref(),
        }
    }
}

/// The validated configuration of one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
    pub run_id: String,
    pub run: RunOptions,
    pub progress: ProgressFilter,
    pub email: Option<EmailInfo>,
    pub qsub: Option<QsubOptions>,
    pub conditions: ConditionSet,
    stages: BTreeMap<Stage, StageOptions>,
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(raw)?;

        if raw.condition_queue.is_empty() {
            return Err(ConfigError::NoConditions);
        }
        let mut seen: Vec<&str> = Vec::new();
        for condition in &raw.condition_queue {
            if seen.contains(&condition.name.as_str()) {
                return Err(ConfigError::DuplicateCondition(condition.name.clone()));
            }
            seen.push(&condition.name);
        }

        let mut stages = BTreeMap::new();
        for stage in Stage::ALL {
            match raw.stage_section(stage) {
                Some(section) => {
                    stages.insert(stage, StageOptions::from_yaml(stage, section)?);
                }
                None if stage_toggle(&raw.run_options, stage) => {
                    return Err(ConfigError::MissingSection {
                        section: stage.options_key().to_string(),
                    });
                }
                None => {}
            }
        }

        let progress =
            ProgressFilter::new(raw.prgbar_regex.as_deref().unwrap_or(DEFAULT_PRGBAR_REGEX))?;
        let run_id = raw
            .run_options
            .run_id
            .clone()
            .unwrap_or_else(|| format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S")));

        Ok(Self {
            source: None,
            run_id,
            run: raw.run_options,
            progress,
            email: raw.email_info,
            qsub: raw.qsub_options,
            conditions: ConditionSet::new(raw.condition_queue),
            stages,
        })
    }

    pub fn stage_options(&self, stage: Stage) -> Result<&StageOptions, ConfigError> {
        self.stages
            .get(&stage)
            .ok_or_else(|| ConfigError::MissingSection {
                section: stage.options_key().to_string(),
            })
    }

    pub fn stage_enabled(&self, stage: Stage) -> bool {
        stage_toggle(&self.run, stage)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.run
            .log_dir
            .clone()
            .unwrap_or_else(|| self.run.base_dir.join(format!("{}_logs", self.run_id)))
    }
}

fn stage_toggle(run: &RunOptions, stage: Stage) -> bool {
    match stage {
        Stage::Tophat => run.run_tophat,
        Stage::Cufflinks => run.run_cufflinks,
        Stage::Cuffmerge => run.run_cuffmerge,
        Stage::Cuffdiff => run.run_cuffdiff,
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config = Config::from_yaml_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    config.source = Some(path.to_path_buf());
    Ok(config)
}
