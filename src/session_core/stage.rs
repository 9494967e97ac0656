//! Stage trait and the declared-inputs/outputs contract
//!
//! Stages read prior results out of a shared namespaced store rather than
//! receiving typed objects, so the compiler cannot check their dependencies.
//! The declared required-value map plus the post-write audit are the runtime
//! substitute: every input is resolved before the stage body runs, and the
//! keys a stage writes are reconciled against what it declared and described.

use super::error::StageError;
use super::types::Array;
use std::collections::HashMap;

/// Where a declared required value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// A `namespace/key` path into the raw recording data.
    Raw { path: String },
    /// Another stage's output, addressed as stage + key.
    Stage { stage: String, key: String },
}

impl ValueSource {
    pub fn raw(path: impl Into<String>) -> Self {
        ValueSource::Raw { path: path.into() }
    }

    pub fn stage(stage: impl Into<String>, key: impl Into<String>) -> Self {
        ValueSource::Stage {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

/// One entry of a stage's required-value map.
#[derive(Debug, Clone)]
pub struct RequiredValue {
    /// Local name the stage body uses to address the resolved array.
    pub name: &'static str,
    pub source: ValueSource,
}

impl RequiredValue {
    pub fn new(name: &'static str, source: ValueSource) -> Self {
        Self { name, source }
    }
}

/// Inputs resolved ahead of a stage body, keyed by local name.
pub struct ResolvedInputs {
    values: HashMap<String, Array>,
}

impl ResolvedInputs {
    pub fn new(values: HashMap<String, Array>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Result<&Array, StageError> {
        self.values.get(name).ok_or_else(|| {
            StageError::ContractViolation(format!("input '{}' was not declared", name))
        })
    }

    /// A 1-D input; shape violations are data-quality failures.
    pub fn vector(&self, name: &str) -> Result<&[f64], StageError> {
        self.get(name)?.vector().ok_or_else(|| {
            StageError::DataQuality(format!("input '{}' must be a 1-D array", name))
        })
    }
}

/// Values a stage produced, in write order: key, unit label, array.
#[derive(Default)]
pub struct StageOutput {
    entries: Vec<(String, String, Array)>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, unit: impl Into<String>, array: Array) {
        self.entries.push((key.into(), unit.into(), array));
    }

    pub fn entries(&self) -> &[(String, String, Array)] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(key, _, _)| key.as_str()).collect()
    }
}

/// A named, idempotent-per-run unit of computation.
///
/// Implementations declare their inputs and outputs statically and keep the
/// body a pure function of the resolved inputs. The session owns the rest of
/// the run protocol: resolve everything, run the body, write all outputs in
/// one transaction, audit the written keys.
pub trait Stage {
    /// Unique stage name; doubles as the output namespace.
    fn name(&self) -> &'static str;

    /// Human-readable description recorded on the output namespace.
    fn description(&self) -> &'static str;

    /// Declared required values, resolved eagerly before `compute` runs.
    fn required_values(&self) -> Vec<RequiredValue>;

    /// Full set of output keys this stage may write.
    fn saved_keys(&self) -> &'static [&'static str];

    /// Description per output key. A written key with no (or an empty)
    /// description fails the audit.
    fn descriptions(&self) -> &'static [(&'static str, &'static str)];

    /// Stage body: pure function of the resolved inputs.
    fn compute(&self, inputs: &ResolvedInputs) -> Result<StageOutput, StageError>;
}

/// Reconcile the keys a stage produced against its declarations.
///
/// Policy (asymmetric on purpose):
/// - written but undeclared -> warning
/// - written, declared, but undescribed -> hard failure
/// - declared but not written -> warning (optional outputs are tolerated)
pub fn audit_output(stage: &dyn Stage, output: &StageOutput) -> Result<(), StageError> {
    let declared = stage.saved_keys();
    let descriptions: HashMap<&str, &str> = stage.descriptions().iter().copied().collect();
    let written = output.keys();

    for key in &written {
        if !declared.contains(key) {
            log::warn!(
                "Stage '{}' wrote undeclared key '{}'",
                stage.name(),
                key
            );
            continue;
        }
        match descriptions.get(key) {
            Some(text) if !text.is_empty() => {}
            _ => {
                return Err(StageError::ContractViolation(format!(
                    "stage '{}' wrote key '{}' with no description",
                    stage.name(),
                    key
                )));
            }
        }
    }

    for key in declared {
        if !written.contains(key) {
            log::warn!(
                "Stage '{}' declared key '{}' but did not write it",
                stage.name(),
                key
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStage {
        keys: Vec<(String, String, Array)>,
    }

    impl Stage for FakeStage {
        fn name(&self) -> &'static str {
            "FakeStage"
        }

        fn description(&self) -> &'static str {
            "test stage"
        }

        fn required_values(&self) -> Vec<RequiredValue> {
            Vec::new()
        }

        fn saved_keys(&self) -> &'static [&'static str] {
            &["described", "undescribed", "optional"]
        }

        fn descriptions(&self) -> &'static [(&'static str, &'static str)] {
            &[("described", "a described output"), ("undescribed", "")]
        }

        fn compute(&self, _inputs: &ResolvedInputs) -> Result<StageOutput, StageError> {
            let mut output = StageOutput::new();
            for (key, unit, array) in &self.keys {
                output.insert(key.clone(), unit.clone(), array.clone());
            }
            Ok(output)
        }
    }

    fn run_audit(keys: &[&str]) -> Result<(), StageError> {
        let stage = FakeStage {
            keys: keys
                .iter()
                .map(|k| (k.to_string(), "au".to_string(), Array::from_vec(vec![1.0])))
                .collect(),
        };
        let inputs = ResolvedInputs::new(HashMap::new());
        let output = stage.compute(&inputs).unwrap();
        audit_output(&stage, &output)
    }

    #[test]
    fn test_described_key_passes() {
        assert!(run_audit(&["described"]).is_ok());
    }

    #[test]
    fn test_written_undescribed_key_fails() {
        // Declared with an empty description and written: hard failure.
        let result = run_audit(&["described", "undescribed"]);
        assert!(matches!(result, Err(StageError::ContractViolation(_))));
    }

    #[test]
    fn test_undescribed_unwritten_key_tolerated() {
        // "undescribed" is declared but never written: warning only.
        assert!(run_audit(&["described"]).is_ok());
    }

    #[test]
    fn test_undeclared_key_is_warning_only() {
        assert!(run_audit(&["described", "extra"]).is_ok());
    }
}
