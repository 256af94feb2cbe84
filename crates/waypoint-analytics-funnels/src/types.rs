use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;
use waypoint_query::{
    normalize_path, DataError, HitFilter, HitKind, NormalizedHit, ValuePattern,
};

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("{0}")]
    Validation(String),

    #[error("Hit stream provider is not configured")]
    ProviderUnavailable,

    #[error("{0}")]
    Query(#[from] DataError),

    #[error("Analysis worker failed: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for FunnelError {
    fn from(err: tokio::task::JoinError) -> Self {
        FunnelError::Internal(err.to_string())
    }
}

fn invalid(message: impl Into<String>) -> FunnelError {
    FunnelError::Validation(message.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Url,
    Event,
}

impl StepKind {
    pub fn hit_kind(&self) -> HitKind {
        match self {
            StepKind::Url => HitKind::Pageview,
            StepKind::Event => HitKind::Event,
        }
    }
}

/// Where an event step may happen relative to the previous step's match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EventScope {
    /// Same page as the previous step's match
    CurrentPath,
    #[default]
    Anywhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParamOperator {
    Equals,
    Contains,
}

/// Condition on one event property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParamFilter {
    pub key: String,
    pub operator: ParamOperator,
    pub value: String,
}

impl ParamFilter {
    pub fn matches(&self, params: &BTreeMap<String, String>) -> bool {
        match params.get(&self.key) {
            Some(actual) => match self.operator {
                ParamOperator::Equals => *actual == self.value,
                ParamOperator::Contains => actual.contains(self.value.as_str()),
            },
            None => false,
        }
    }
}

/// One step as submitted by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Path or event name; a single `*` matches any sequence of characters
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_scope: Option<EventScope>,
    #[serde(default, rename = "params", skip_serializing_if = "Vec::is_empty")]
    pub param_filters: Vec<ParamFilter>,
}

impl StepDefinition {
    pub fn url(value: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Url,
            value: value.into(),
            event_scope: None,
            param_filters: Vec::new(),
        }
    }

    pub fn event(value: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Event,
            value: value.into(),
            event_scope: None,
            param_filters: Vec::new(),
        }
    }

    pub fn scoped(mut self, scope: EventScope) -> Self {
        self.event_scope = Some(scope);
        self
    }

    pub fn with_param(
        mut self,
        key: impl Into<String>,
        operator: ParamOperator,
        value: impl Into<String>,
    ) -> Self {
        self.param_filters.push(ParamFilter {
            key: key.into(),
            operator,
            value: value.into(),
        });
        self
    }
}

/// A validated step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    /// Normalized value (paths) or trimmed event name
    pub value: String,
    pub pattern: ValuePattern,
    pub scope: EventScope,
    pub param_filters: Vec<ParamFilter>,
}

impl Step {
    /// Kind, value pattern and every param filter hold for `hit`
    pub fn matches(&self, hit: &NormalizedHit) -> bool {
        hit.kind == self.kind.hit_kind()
            && self.pattern.matches(&hit.path_or_name)
            && self.param_filters.iter().all(|f| f.matches(&hit.params))
    }

    pub fn hit_filter(&self) -> HitFilter {
        HitFilter::new(self.kind.hit_kind(), self.pattern.clone())
    }
}

/// An ordered list of at least two validated steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPattern {
    steps: Vec<Step>,
}

impl StepPattern {
    pub const MIN_STEPS: usize = 2;

    /// Trims values, drops empty steps and validates the rest.
    ///
    /// Step numbers in error messages are 1-based positions among the
    /// remaining steps.
    pub fn new(definitions: Vec<StepDefinition>) -> Result<Self, FunnelError> {
        let usable: Vec<StepDefinition> = definitions
            .into_iter()
            .filter(|def| !def.value.trim().is_empty())
            .collect();

        if usable.len() < Self::MIN_STEPS {
            return Err(invalid(format!(
                "A funnel needs at least {} non-empty steps, got {}",
                Self::MIN_STEPS,
                usable.len()
            )));
        }

        let steps = usable
            .into_iter()
            .enumerate()
            .map(|(index, def)| Self::validate_step(index, def))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { steps })
    }

    fn validate_step(index: usize, def: StepDefinition) -> Result<Step, FunnelError> {
        let number = index + 1;
        let trimmed = def.value.trim();
        let value = match def.kind {
            StepKind::Url => normalize_path(trimmed),
            StepKind::Event => trimmed.to_string(),
        };

        let pattern = ValuePattern::parse(&value)
            .map_err(|e| invalid(format!("Step {number}: {e}")))?;

        if def.kind == StepKind::Url && !def.param_filters.is_empty() {
            return Err(invalid(format!(
                "Step {number}: parameter filters are only supported on event steps"
            )));
        }

        let scope = def.event_scope.unwrap_or_default();
        if scope == EventScope::CurrentPath {
            if def.kind == StepKind::Url {
                return Err(invalid(format!(
                    "Step {number}: eventScope applies to event steps only"
                )));
            }
            if index == 0 {
                return Err(invalid(
                    "Step 1: the first step has no previous page for eventScope 'current-path'",
                ));
            }
        }

        let param_filters = def
            .param_filters
            .into_iter()
            .map(|filter| {
                let key = filter.key.trim().to_string();
                if key.is_empty() {
                    return Err(invalid(format!(
                        "Step {number}: parameter filter key must not be empty"
                    )));
                }
                Ok(ParamFilter { key, ..filter })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Step {
            kind: def.kind,
            value,
            pattern,
            scope,
            param_filters,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Position of the first event step, if any
    pub fn first_event_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == StepKind::Event)
    }
}

/// `Strict` is "only direct entry": each step must be entered straight from
/// the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    Strict,
    Loose,
}

impl EntryMode {
    pub fn from_direct_entry(only_direct_entry: bool) -> Self {
        if only_direct_entry {
            EntryMode::Strict
        } else {
            EntryMode::Loose
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, EntryMode::Strict)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStepResult {
    pub step_index: usize,
    pub value: String,
    pub kind: StepKind,
    /// Distinct sessions reaching this step
    pub count: u64,
    /// Percentage of the previous step's sessions that reached this step
    pub conversion_rate: f64,
    pub drop_off_rate: f64,
}

/// Timing for one step transition, or for the whole funnel when
/// `from_step` is -1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimingResult {
    pub from_step: i64,
    pub to_step: i64,
    pub avg_seconds: f64,
    pub median_seconds: f64,
    pub sample_count: u64,
}
