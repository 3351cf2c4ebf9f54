use crate::config::{
    BindingsConfig, CardinalityConfig, ExecConfig, ExtensibleHandling, PrimitivesConfig,
    ReferenceMode, ReferencesConfig,
};

/// Compiled validation plan - list of steps to execute
#[derive(Debug, Clone)]
pub struct ValidationPlan {
    pub steps: Vec<Step>,
    pub fail_fast: bool,
    pub max_issues: usize,
}

/// Every step with its default settings
impl Default for ValidationPlan {
    fn default() -> Self {
        let exec = ExecConfig::default();
        Self {
            steps: vec![
                Step::Cardinality((&CardinalityConfig::default()).into()),
                Step::Primitives((&PrimitivesConfig::default()).into()),
                Step::Bindings((&BindingsConfig::default()).into()),
                Step::References((&ReferencesConfig::default()).into()),
            ],
            fail_fast: exec.fail_fast,
            max_issues: exec.max_issues,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Cardinality(CardinalityPlan),
    Primitives(PrimitivesPlan),
    Bindings(BindingsPlan),
    References(ReferencesPlan),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Cardinality(_) => "cardinality",
            Step::Primitives(_) => "primitives",
            Step::Bindings(_) => "bindings",
            Step::References(_) => "references",
        }
    }
}

// ============================================================================
// Step Plans
// ============================================================================

#[derive(Debug, Clone)]
pub struct CardinalityPlan {}

impl From<&CardinalityConfig> for CardinalityPlan {
    fn from(_cfg: &CardinalityConfig) -> Self {
        Self {}
    }
}

#[derive(Debug, Clone)]
pub struct PrimitivesPlan {}

impl From<&PrimitivesConfig> for PrimitivesPlan {
    fn from(_cfg: &PrimitivesConfig) -> Self {
        Self {}
    }
}

#[derive(Debug, Clone)]
pub struct BindingsPlan {
    pub extensible_handling: ExtensibleHandling,
}

impl From<&BindingsConfig> for BindingsPlan {
    fn from(cfg: &BindingsConfig) -> Self {
        Self {
            extensible_handling: cfg.extensible_handling,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferencesPlan {
    /// Resolve `#id` references against the contained resources
    pub resolve_contained: bool,
}

impl From<&ReferencesConfig> for ReferencesPlan {
    fn from(cfg: &ReferencesConfig) -> Self {
        Self {
            resolve_contained: cfg.mode == ReferenceMode::Full,
        }
    }
}
