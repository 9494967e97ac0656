//! Session - owns one container and applies stages to it

use super::container::{Container, NamespaceKind};
use super::error::{ContainerError, StageError};
use super::stage::{audit_output, ResolvedInputs, Stage, ValueSource};
use super::types::Array;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// One recording session: exactly one container, plus the set of stages
/// already applied to it.
///
/// The applied set is derived by scanning stage namespaces when the session
/// opens and kept in sync as stages run. Namespace presence in the container
/// is the sole source of truth for "is this stage present"; `apply` never
/// leaves a partial namespace behind, so the two can not drift.
pub struct Session {
    container: Container,
    applied: HashSet<String>,
}

impl Session {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        Self::from_container(Container::open(path)?)
    }

    pub fn in_memory() -> Result<Self, ContainerError> {
        Self::from_container(Container::open_in_memory()?)
    }

    /// Wrap an already-open container, scanning its applied stages.
    pub fn from_container(container: Container) -> Result<Self, ContainerError> {
        let applied = container
            .namespace_names(NamespaceKind::Stage)?
            .into_iter()
            .collect::<HashSet<String>>();
        if !applied.is_empty() {
            log::info!(
                "Session opened with {} applied stage(s): {}",
                applied.len(),
                sorted_names(&applied).join(", ")
            );
        }
        Ok(Self { container, applied })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Mutable container access for seeding raw recording namespaces.
    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    pub fn is_applied(&self, stage_name: &str) -> bool {
        self.applied.contains(stage_name)
    }

    pub fn applied_stages(&self) -> Vec<String> {
        sorted_names(&self.applied)
    }

    /// Apply a stage: resolve all declared inputs, run the body, write every
    /// output in one transaction, audit the written keys, register the stage.
    ///
    /// On any error the container and applied set are exactly as before the
    /// call; the transactional write is what makes that guarantee hold.
    pub fn apply(&mut self, stage: &dyn Stage) -> Result<(), StageError> {
        let name = stage.name();
        if self.applied.contains(name) || self.container.has_namespace(name)? {
            return Err(StageError::ContractViolation(format!(
                "stage '{}' is already applied; re-runs target a fresh container",
                name
            )));
        }

        let inputs = self.validate(stage)?;
        let output = stage.compute(&inputs)?;
        audit_output(stage, &output)?;

        self.container.write_namespace(
            name,
            NamespaceKind::Stage,
            stage.description(),
            output.entries(),
        )?;
        self.applied.insert(name.to_string());

        log::info!(
            "✅ Applied stage '{}' ({} values written)",
            name,
            output.entries().len()
        );
        Ok(())
    }

    /// Eagerly resolve every declared required value. Any failure aborts the
    /// stage before its body runs, with nothing written.
    fn validate(&self, stage: &dyn Stage) -> Result<ResolvedInputs, StageError> {
        let mut values = HashMap::new();
        for required in stage.required_values() {
            let array = self.resolve(&required.source)?;
            values.insert(required.name.to_string(), array);
        }
        Ok(ResolvedInputs::new(values))
    }

    fn resolve(&self, source: &ValueSource) -> Result<Array, StageError> {
        match source {
            ValueSource::Raw { path } => {
                let (namespace, key) = path.split_once('/').ok_or_else(|| {
                    StageError::ContractViolation(format!(
                        "raw path '{}' must be 'namespace/key'",
                        path
                    ))
                })?;
                self.container
                    .read_array(namespace, key)
                    .map_err(|_| StageError::MissingDependency {
                        stage: namespace.to_string(),
                        key: key.to_string(),
                    })
            }
            ValueSource::Stage { stage, key } => {
                if !self.applied.contains(stage) {
                    return Err(StageError::MissingDependency {
                        stage: stage.clone(),
                        key: key.clone(),
                    });
                }
                // The namespace is applied; a missing key within it is
                // reported with the available keys rather than flattened
                // into MissingDependency.
                Ok(self.container.read_array(stage, key)?)
            }
        }
    }

    /// Public read path: `"StageName.key"`. The only way calling code outside
    /// a stage reads derived values.
    pub fn pull(&self, qualified: &str) -> Result<Array, StageError> {
        let (stage, key) = qualified.split_once('.').ok_or_else(|| {
            StageError::ContractViolation(format!(
                "qualified key '{}' must be 'StageName.key'",
                qualified
            ))
        })?;
        if !self.applied.contains(stage) {
            return Err(StageError::MissingDependency {
                stage: stage.to_string(),
                key: key.to_string(),
            });
        }
        Ok(self.container.read_array(stage, key)?)
    }

    /// Persist a checkpoint of the whole container to a new path.
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        self.container.export(path)
    }
}

fn sorted_names(set: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = set.iter().cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_core::stage::{RequiredValue, StageOutput};

    /// Stage writing one described key, optionally failing mid-body.
    struct TestStage {
        fail: bool,
    }

    impl Stage for TestStage {
        fn name(&self) -> &'static str {
            "TestStage"
        }

        fn description(&self) -> &'static str {
            "doubles the raw trace"
        }

        fn required_values(&self) -> Vec<RequiredValue> {
            vec![RequiredValue::new(
                "trace",
                ValueSource::raw("raw/trace"),
            )]
        }

        fn saved_keys(&self) -> &'static [&'static str] {
            &["doubled"]
        }

        fn descriptions(&self) -> &'static [(&'static str, &'static str)] {
            &[("doubled", "input trace times two")]
        }

        fn compute(&self, inputs: &ResolvedInputs) -> Result<StageOutput, StageError> {
            if self.fail {
                return Err(StageError::DataQuality("synthetic failure".to_string()));
            }
            let trace = inputs.vector("trace")?;
            let doubled: Vec<f64> = trace.iter().map(|v| v * 2.0).collect();
            let mut output = StageOutput::new();
            output.insert("doubled", "au", Array::from_vec(doubled));
            Ok(output)
        }
    }

    /// Stage depending on TestStage's output.
    struct DownstreamStage;

    impl Stage for DownstreamStage {
        fn name(&self) -> &'static str {
            "DownstreamStage"
        }

        fn description(&self) -> &'static str {
            "negates the doubled trace"
        }

        fn required_values(&self) -> Vec<RequiredValue> {
            vec![RequiredValue::new(
                "doubled",
                ValueSource::stage("TestStage", "doubled"),
            )]
        }

        fn saved_keys(&self) -> &'static [&'static str] {
            &["negated"]
        }

        fn descriptions(&self) -> &'static [(&'static str, &'static str)] {
            &[("negated", "doubled trace, sign flipped")]
        }

        fn compute(&self, inputs: &ResolvedInputs) -> Result<StageOutput, StageError> {
            let doubled = inputs.vector("doubled")?;
            let negated: Vec<f64> = doubled.iter().map(|v| -v).collect();
            let mut output = StageOutput::new();
            output.insert("negated", "au", Array::from_vec(negated));
            Ok(output)
        }
    }

    fn seeded_session() -> Session {
        let mut session = Session::in_memory().unwrap();
        session
            .container_mut()
            .write_namespace(
                "raw",
                NamespaceKind::Raw,
                "synthetic recording",
                &[(
                    "trace".to_string(),
                    "au".to_string(),
                    Array::from_vec(vec![1.0, 2.0, 3.0]),
                )],
            )
            .unwrap();
        session
    }

    #[test]
    fn test_apply_registers_and_pull_reads() {
        let mut session = seeded_session();
        session.apply(&TestStage { fail: false }).unwrap();

        assert!(session.is_applied("TestStage"));
        let doubled = session.pull("TestStage.doubled").unwrap();
        assert_eq!(doubled.data(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_failed_apply_leaves_session_unchanged() {
        let mut session = seeded_session();
        let result = session.apply(&TestStage { fail: true });

        assert!(matches!(result, Err(StageError::DataQuality(_))));
        assert!(!session.is_applied("TestStage"));
        assert!(!session.container().has_namespace("TestStage").unwrap());
    }

    #[test]
    fn test_duplicate_apply_rejected() {
        let mut session = seeded_session();
        session.apply(&TestStage { fail: false }).unwrap();

        let result = session.apply(&TestStage { fail: false });
        assert!(matches!(result, Err(StageError::ContractViolation(_))));
    }

    #[test]
    fn test_stage_dependency_resolution() {
        let mut session = seeded_session();
        session.apply(&TestStage { fail: false }).unwrap();
        session.apply(&DownstreamStage).unwrap();

        let negated = session.pull("DownstreamStage.negated").unwrap();
        assert_eq!(negated.data(), &[-2.0, -4.0, -6.0]);
    }

    #[test]
    fn test_missing_dependency_fails_before_compute() {
        let mut session = seeded_session();
        // DownstreamStage requires TestStage, which has not been applied.
        let result = session.apply(&DownstreamStage);

        match result {
            Err(StageError::MissingDependency { stage, key }) => {
                assert_eq!(stage, "TestStage");
                assert_eq!(key, "doubled");
            }
            other => panic!("Expected MissingDependency, got {:?}", other),
        }
        assert!(!session.container().has_namespace("DownstreamStage").unwrap());
    }

    #[test]
    fn test_pull_unapplied_stage_fails() {
        let session = seeded_session();
        let result = session.pull("TestStage.doubled");
        assert!(matches!(result, Err(StageError::MissingDependency { .. })));
    }

    #[test]
    fn test_pull_requires_qualified_key() {
        let session = seeded_session();
        let result = session.pull("not_qualified");
        assert!(matches!(result, Err(StageError::ContractViolation(_))));
    }

    #[test]
    fn test_applied_set_rescanned_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");

        {
            let mut session = Session::open(&path).unwrap();
            session
                .container_mut()
                .write_namespace(
                    "raw",
                    NamespaceKind::Raw,
                    "synthetic recording",
                    &[(
                        "trace".to_string(),
                        "au".to_string(),
                        Array::from_vec(vec![1.0]),
                    )],
                )
                .unwrap();
            session.apply(&TestStage { fail: false }).unwrap();
        }

        let reopened = Session::open(&path).unwrap();
        assert!(reopened.is_applied("TestStage"));
        // Raw namespaces are data, not applied stages.
        assert!(!reopened.is_applied("raw"));
    }
}
