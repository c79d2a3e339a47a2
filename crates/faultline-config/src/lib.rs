//! Configuration loading.
//!
//! A configuration file holds several named configurations:
//!
//! ```text
//! { "default": { "design_path": "...", "design_name": "top", "k": 2, … } }
//! ```
//!
//! [`Config::load`] selects one by name, validates it, wipes and recreates
//! the dump directory, and copies the configuration file into it so a run's
//! artifacts are self-describing.

use faultline_netlist::SignalId;
use faultline_verify::GateFaults;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing configuration `{0}` in file")]
    MissingConf(String),
    #[error("missing parameter `{0}` in configuration file")]
    MissingParam(String),
    #[error("illegal signal list for `{0}`")]
    IllegalSignalList(String),
    #[error("illegal value for `{key}`: {message}")]
    IllegalValue { key: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which procedures a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Procedure {
    #[default]
    Both,
    Proc1,
    Proc2,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub procedure: Procedure,

    // Design info
    pub design_path: PathBuf,
    pub design_name: String,
    pub delay: u32,

    pub subcircuit: bool,
    pub subcircuit_interface_path: Option<PathBuf>,
    pub subcircuit_interface_name: Option<String>,
    pub alert_list: IndexMap<String, Vec<bool>>,
    pub invariant_list: IndexMap<String, Vec<bool>>,
    pub initial_partition_path: Option<PathBuf>,

    // Fault model
    pub f_included_prefix: Vec<String>,
    pub f_excluded_prefix: Vec<String>,
    pub f_excluded_signals: Vec<SignalId>,
    pub f_gates: GateFaults,
    pub exclude_inputs: bool,
    pub k: u32,
    pub increasing_k: bool,

    // Dump info
    pub dump_path: PathBuf,
    pub enumerate_exploitable: bool,
    pub optim_atleast2: bool,
    pub dump_vcd: bool,
    pub dump_partitioning: bool,
    pub merge_seed: u64,
    pub interesting_names: Vec<String>,
}

impl Config {
    /// Loads and validates a named configuration, then prepares the dump
    /// directory (wiping any previous contents) and copies the
    /// configuration file into it.
    pub fn load(config_file: impl AsRef<Path>, config_name: &str) -> ConfigResult<Config> {
        let config_file = config_file.as_ref();
        let data = std::fs::read_to_string(config_file)?;
        let config = Config::from_json_str(&data, config_name)?;

        if config.dump_path.exists() {
            log::debug!("wiping previous dump directory `{}`", config.dump_path.display());
            std::fs::remove_dir_all(&config.dump_path)?;
        }
        std::fs::create_dir_all(&config.dump_path)?;
        std::fs::copy(config_file, config.dump_path.join("config_file"))?;
        Ok(config)
    }

    /// Parses a named configuration without touching the filesystem.
    pub fn from_json_str(data: &str, config_name: &str) -> ConfigResult<Config> {
        let doc: Value = serde_json::from_str(data)?;
        let entry = doc
            .get(config_name)
            .ok_or_else(|| ConfigError::MissingConf(config_name.to_string()))?;

        let subcircuit = opt_bool(entry, "subcircuit")?.unwrap_or(false);
        let config = Config {
            design_path: PathBuf::from(req_str(entry, "design_path")?),
            design_name: req_str(entry, "design_name")?,
            k: req_u32(entry, "k")?,
            delay: req_u32(entry, "delay")?,
            dump_path: PathBuf::from(req_str(entry, "dump_path")?),
            alert_list: bitvec_table(entry, "alert_list", true)?,
            invariant_list: bitvec_table(entry, "invariant_list", false)?,
            subcircuit,
            subcircuit_interface_path: if subcircuit {
                Some(PathBuf::from(req_str(entry, "subcircuit_interface_path")?))
            } else {
                None
            },
            subcircuit_interface_name: if subcircuit {
                Some(req_str(entry, "subcircuit_interface_name")?)
            } else {
                None
            },
            initial_partition_path: opt_str(entry, "initial_partition_path")?.map(PathBuf::from),
            f_included_prefix: string_list(entry, "f_included_prefix")?,
            f_excluded_prefix: string_list(entry, "f_excluded_prefix")?,
            f_excluded_signals: signal_id_list(entry, "f_excluded_signals")?,
            f_gates: gate_faults(entry)?,
            exclude_inputs: opt_bool(entry, "exclude_inputs")?.unwrap_or(false),
            increasing_k: opt_bool(entry, "increasing_k")?.unwrap_or(true),
            enumerate_exploitable: opt_bool(entry, "enumerate_exploitable")?.unwrap_or(false),
            // Known to over-prune in some partitionings; opt-in only.
            optim_atleast2: opt_bool(entry, "optim_atleast2")?.unwrap_or(false),
            dump_vcd: opt_bool(entry, "dump_vcd")?.unwrap_or(false),
            dump_partitioning: opt_bool(entry, "dump_partitioning")?.unwrap_or(true),
            merge_seed: opt_u64(entry, "merge_seed")?.unwrap_or(42),
            interesting_names: string_list(entry, "interesting_names")?,
            procedure: procedure(entry)?,
        };
        Ok(config)
    }
}

fn req_field<'v>(entry: &'v Value, key: &str) -> ConfigResult<&'v Value> {
    entry
        .get(key)
        .ok_or_else(|| ConfigError::MissingParam(key.to_string()))
}

fn req_str(entry: &Value, key: &str) -> ConfigResult<String> {
    req_field(entry, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::IllegalValue {
            key: key.to_string(),
            message: "expected a string".to_string(),
        })
}

fn req_u32(entry: &Value, key: &str) -> ConfigResult<u32> {
    let value = req_field(entry, key)?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ConfigError::IllegalValue {
            key: key.to_string(),
            message: "expected an unsigned integer".to_string(),
        })
}

fn opt_str(entry: &Value, key: &str) -> ConfigResult<Option<String>> {
    match entry.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| ConfigError::IllegalValue {
                key: key.to_string(),
                message: "expected a string".to_string(),
            }),
    }
}

fn opt_bool(entry: &Value, key: &str) -> ConfigResult<Option<bool>> {
    match entry.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| ConfigError::IllegalValue {
                key: key.to_string(),
                message: "expected a boolean".to_string(),
            }),
    }
}

fn opt_u64(entry: &Value, key: &str) -> ConfigResult<Option<u64>> {
    match entry.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ConfigError::IllegalValue {
                key: key.to_string(),
                message: "expected an unsigned integer".to_string(),
            }),
    }
}

fn string_list(entry: &Value, key: &str) -> ConfigResult<Vec<String>> {
    match entry.get(key) {
        None => Ok(Vec::new()),
        Some(value) => {
            let array = value
                .as_array()
                .ok_or_else(|| ConfigError::IllegalSignalList(key.to_string()))?;
            array
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ConfigError::IllegalSignalList(key.to_string()))
                })
                .collect()
        }
    }
}

fn signal_id_list(entry: &Value, key: &str) -> ConfigResult<Vec<SignalId>> {
    match entry.get(key) {
        None => Ok(Vec::new()),
        Some(value) => {
            let array = value
                .as_array()
                .ok_or_else(|| ConfigError::IllegalSignalList(key.to_string()))?;
            array
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .map(SignalId::from_raw)
                        .ok_or_else(|| ConfigError::IllegalSignalList(key.to_string()))
                })
                .collect()
        }
    }
}

/// Reads a `{name → [bit…]}` table of literal bit vectors (alert safe
/// values or golden-state invariants).
fn bitvec_table(
    entry: &Value,
    key: &str,
    required: bool,
) -> ConfigResult<IndexMap<String, Vec<bool>>> {
    let table = match entry.get(key) {
        Some(table) => table,
        None if required => return Err(ConfigError::MissingParam(key.to_string())),
        None => return Ok(IndexMap::new()),
    };
    let object = table.as_object().ok_or_else(|| ConfigError::IllegalValue {
        key: key.to_string(),
        message: "expected an object".to_string(),
    })?;

    let mut result = IndexMap::new();
    for (name, bits) in object {
        let array = bits
            .as_array()
            .ok_or_else(|| ConfigError::IllegalSignalList(name.clone()))?;
        let mut values = Vec::with_capacity(array.len());
        for bit in array {
            let value = match bit {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_u64().map(|n| n != 0).ok_or_else(|| {
                    ConfigError::IllegalSignalList(name.clone())
                })?,
                _ => return Err(ConfigError::IllegalSignalList(name.clone())),
            };
            values.push(value);
        }
        result.insert(name.clone(), values);
    }
    Ok(result)
}

/// `f_gates`: the symbolic names or the legacy integer encoding.
fn gate_faults(entry: &Value) -> ConfigResult<GateFaults> {
    let Some(value) = entry.get("f_gates") else {
        return Ok(GateFaults::All);
    };
    if let Some(text) = value.as_str() {
        return match text.to_ascii_uppercase().as_str() {
            "ALL" => Ok(GateFaults::All),
            "SEQ" => Ok(GateFaults::Seq),
            other => Err(ConfigError::IllegalValue {
                key: "f_gates".to_string(),
                message: format!("unknown mode `{other}`"),
            }),
        };
    }
    match value.as_u64() {
        Some(0) => Ok(GateFaults::All),
        Some(1) => Ok(GateFaults::Seq),
        _ => Err(ConfigError::IllegalValue {
            key: "f_gates".to_string(),
            message: "expected \"ALL\", \"SEQ\", 0 or 1".to_string(),
        }),
    }
}

/// `procedure`: the symbolic names or the legacy integer encoding.
fn procedure(entry: &Value) -> ConfigResult<Procedure> {
    let Some(value) = entry.get("procedure") else {
        return Ok(Procedure::Both);
    };
    if let Some(text) = value.as_str() {
        return match text.to_ascii_uppercase().as_str() {
            "BOTH" => Ok(Procedure::Both),
            "PROC_1" => Ok(Procedure::Proc1),
            "PROC_2" => Ok(Procedure::Proc2),
            other => Err(ConfigError::IllegalValue {
                key: "procedure".to_string(),
                message: format!("unknown procedure `{other}`"),
            }),
        };
    }
    match value.as_u64() {
        Some(0) => Ok(Procedure::Both),
        Some(1) => Ok(Procedure::Proc1),
        Some(2) => Ok(Procedure::Proc2),
        _ => Err(ConfigError::IllegalValue {
            key: "procedure".to_string(),
            message: "expected \"BOTH\", \"PROC_1\", \"PROC_2\" or 0..2".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "default": {
            "design_path": "designs/top.json",
            "design_name": "top",
            "k": 2,
            "delay": 3,
            "dump_path": "out",
            "alert_list": { "alarm": [0, 0] }
        }
    }"#;

    #[test]
    fn minimal_configuration_gets_defaults() {
        let config = Config::from_json_str(MINIMAL, "default").unwrap();
        assert_eq!(config.k, 2);
        assert_eq!(config.delay, 3);
        assert_eq!(config.design_name, "top");
        assert_eq!(config.alert_list["alarm"], vec![false, false]);
        assert!(config.invariant_list.is_empty());
        assert_eq!(config.procedure, Procedure::Both);
        assert_eq!(config.f_gates, GateFaults::All);
        assert!(config.increasing_k);
        assert!(config.dump_partitioning);
        assert!(!config.optim_atleast2);
        assert!(!config.exclude_inputs);
        assert_eq!(config.merge_seed, 42);
    }

    #[test]
    fn missing_configuration_name() {
        let err = Config::from_json_str(MINIMAL, "nightly").unwrap_err();
        assert!(matches!(err, ConfigError::MissingConf(_)));
    }

    #[test]
    fn missing_required_parameter() {
        let err = Config::from_json_str(r#"{ "default": { "design_path": "x" } }"#, "default")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam(_)));
    }

    #[test]
    fn rejects_non_array_bit_vector() {
        let doc = r#"{ "default": {
            "design_path": "x", "design_name": "m", "k": 1, "delay": 1,
            "dump_path": "out", "alert_list": { "alarm": 7 }
        } }"#;
        let err = Config::from_json_str(doc, "default").unwrap_err();
        assert!(matches!(err, ConfigError::IllegalSignalList(_)));
    }

    #[test]
    fn parses_symbolic_and_integer_enums() {
        let doc = r#"{ "a": {
            "design_path": "x", "design_name": "m", "k": 1, "delay": 1,
            "dump_path": "out", "alert_list": {},
            "procedure": "PROC_2", "f_gates": "SEQ"
        }, "b": {
            "design_path": "x", "design_name": "m", "k": 1, "delay": 1,
            "dump_path": "out", "alert_list": {},
            "procedure": 1, "f_gates": 1
        } }"#;
        let a = Config::from_json_str(doc, "a").unwrap();
        assert_eq!(a.procedure, Procedure::Proc2);
        assert_eq!(a.f_gates, GateFaults::Seq);
        let b = Config::from_json_str(doc, "b").unwrap();
        assert_eq!(b.procedure, Procedure::Proc1);
        assert_eq!(b.f_gates, GateFaults::Seq);
    }

    #[test]
    fn subcircuit_requires_interface() {
        let doc = r#"{ "default": {
            "design_path": "x", "design_name": "m", "k": 1, "delay": 1,
            "dump_path": "out", "alert_list": {}, "subcircuit": true
        } }"#;
        let err = Config::from_json_str(doc, "default").unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam(_)));
    }

    #[test]
    fn load_prepares_dump_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump");
        std::fs::create_dir_all(dump.join("stale")).unwrap();

        let doc = format!(
            r#"{{ "default": {{
                "design_path": "x", "design_name": "m", "k": 1, "delay": 1,
                "dump_path": "{}", "alert_list": {{}}
            }} }}"#,
            dump.display()
        );
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, doc).unwrap();

        let config = Config::load(&config_path, "default").unwrap();
        assert_eq!(config.dump_path, dump);
        assert!(!dump.join("stale").exists());
        assert!(dump.join("config_file").exists());
    }
}
