//! Validator configuration
//!
//! A configuration starts from a [`Preset`] and overrides individual
//! sections. In YAML only the keys that differ from the preset need to be
//! given:
//!
//! ```yaml
//! preset: Authoring
//! bindings:
//!   extensible_handling: Ignore
//! exec:
//!   max_issues: 50
//! ```

use crate::plan::{BindingsPlan, CardinalityPlan, PrimitivesPlan, ReferencesPlan, Step};
use crate::{ConfigError, ValidationPlan};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;

/// Named starting points for a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Preset {
    /// Structure and lexical checks only; stops at the first error
    Ingestion,
    /// Everything, with extensible bindings reported as warnings
    Authoring,
    /// Everything, with extensible bindings reported as information
    #[default]
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepMode {
    Off,
    #[default]
    On,
}

/// How codes outside an extensible binding's list are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtensibleHandling {
    Ignore,
    Warning,
    #[default]
    Information,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferenceMode {
    Off,
    /// Check the target type of literal references
    TypeOnly,
    /// Also resolve `#id` references against contained resources
    #[default]
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    pub mode: StepMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    pub mode: StepMode,
    pub extensible_handling: ExtensibleHandling,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimitivesConfig {
    pub mode: StepMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencesConfig {
    pub mode: ReferenceMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    pub fail_fast: bool,
    pub max_issues: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_issues: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    pub cardinality: CardinalityConfig,
    pub bindings: BindingsConfig,
    pub primitives: PrimitivesConfig,
    pub references: ReferencesConfig,
    pub exec: ExecConfig,
}

impl ValidatorConfig {
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self {
            preset: Some(preset),
            ..Self::default()
        };
        match preset {
            Preset::Ingestion => {
                config.bindings.mode = StepMode::Off;
                config.references.mode = ReferenceMode::Off;
                config.exec.fail_fast = true;
                config.exec.max_issues = 100;
            }
            Preset::Authoring => {
                config.bindings.extensible_handling = ExtensibleHandling::Warning;
            }
            Preset::Server => {}
        }
        config
    }

    pub fn builder() -> ValidatorConfigBuilder {
        ValidatorConfigBuilder::default()
    }

    /// Load a configuration, layering the document over its `preset`
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let overlay: Yaml = serde_yaml::from_str(yaml)?;
        let preset = match overlay.get("preset") {
            Some(value) => serde_yaml::from_value(value.clone())?,
            None => Preset::default(),
        };
        let mut merged = serde_yaml::to_value(Self::preset(preset))?;
        merge(&mut merged, overlay);
        Ok(serde_yaml::from_value(merged)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration and turn it into an executable plan
    pub fn compile(&self) -> Result<ValidationPlan, ConfigError> {
        if self.exec.max_issues == 0 {
            return Err(ConfigError::InvalidConfig(
                "exec.max_issues must be at least 1".to_string(),
            ));
        }

        let mut steps = Vec::new();
        if self.cardinality.mode == StepMode::On {
            steps.push(Step::Cardinality(CardinalityPlan::from(&self.cardinality)));
        }
        if self.primitives.mode == StepMode::On {
            steps.push(Step::Primitives(PrimitivesPlan::from(&self.primitives)));
        }
        if self.bindings.mode == StepMode::On {
            steps.push(Step::Bindings(BindingsPlan::from(&self.bindings)));
        }
        if self.references.mode != ReferenceMode::Off {
            steps.push(Step::References(ReferencesPlan::from(&self.references)));
        }
        if steps.is_empty() {
            return Err(ConfigError::NoStepsEnabled);
        }

        tracing::debug!(steps = steps.len(), "Compiled validation plan");
        Ok(ValidationPlan {
            steps,
            fail_fast: self.exec.fail_fast,
            max_issues: self.exec.max_issues,
        })
    }
}

/// Recursively overlay `overlay` onto `base`; mappings merge, everything
/// else replaces.
fn merge(base: &mut Yaml, overlay: Yaml) {
    match (base, overlay) {
        (_, Yaml::Null) => {}
        (Yaml::Mapping(base), Yaml::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidatorConfigBuilder {
    config: ValidatorConfig,
}

impl ValidatorConfigBuilder {
    /// Reset every setting to the preset's values
    pub fn preset(mut self, preset: Preset) -> Self {
        self.config = ValidatorConfig::preset(preset);
        self
    }

    pub fn cardinality_mode(mut self, mode: StepMode) -> Self {
        self.config.cardinality.mode = mode;
        self
    }

    pub fn bindings_mode(mut self, mode: StepMode) -> Self {
        self.config.bindings.mode = mode;
        self
    }

    pub fn extensible_handling(mut self, handling: ExtensibleHandling) -> Self {
        self.config.bindings.extensible_handling = handling;
        self
    }

    pub fn primitives_mode(mut self, mode: StepMode) -> Self {
        self.config.primitives.mode = mode;
        self
    }

    pub fn reference_mode(mut self, mode: ReferenceMode) -> Self {
        self.config.references.mode = mode;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.config.exec.fail_fast = fail_fast;
        self
    }

    pub fn max_issues(mut self, max_issues: usize) -> Self {
        self.config.exec.max_issues = max_issues;
        self
    }

    pub fn build(self) -> ValidatorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn presets_compile() {
        let plan = ValidatorConfig::preset(Preset::Ingestion).compile().unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.fail_fast);

        let plan = ValidatorConfig::preset(Preset::Authoring).compile().unwrap();
        assert_eq!(plan.steps.len(), 4);
        assert!(!plan.fail_fast);
        assert_eq!(plan.max_issues, 1000);
    }

    #[test]
    fn yaml_overrides_preset() {
        let yaml = r#"
preset: Authoring
bindings:
  extensible_handling: Ignore
references:
  mode: TypeOnly
exec:
  max_issues: 50
"#;
        let config = ValidatorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.preset, Some(Preset::Authoring));
        assert_eq!(config.bindings.mode, StepMode::On);
        assert_eq!(config.bindings.extensible_handling, ExtensibleHandling::Ignore);
        assert_eq!(config.references.mode, ReferenceMode::TypeOnly);
        assert_eq!(config.exec.max_issues, 50);
        assert!(!config.exec.fail_fast);
    }

    #[test]
    fn empty_yaml_is_the_default_preset() {
        let config = ValidatorConfig::from_yaml("").unwrap();
        assert_eq!(config, ValidatorConfig::preset(Preset::Server));
    }

    #[test]
    fn yaml_round_trip() {
        let config = ValidatorConfig::builder()
            .preset(Preset::Ingestion)
            .primitives_mode(StepMode::Off)
            .max_issues(7)
            .build();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(ValidatorConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let err = ValidatorConfig::builder().max_issues(0).build().compile().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));

        let err = ValidatorConfig::builder()
            .cardinality_mode(StepMode::Off)
            .bindings_mode(StepMode::Off)
            .primitives_mode(StepMode::Off)
            .reference_mode(ReferenceMode::Off)
            .build()
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoStepsEnabled));

        assert!(ValidatorConfig::from_yaml("preset: Paranoid").is_err());
    }
}
