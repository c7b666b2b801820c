//! Pipeline steps and the registry that publishes them by name.
//!
//! The registry is filled explicitly at startup; there is no discovery. A host
//! looks a step up by its function name, supplies arguments and a
//! [`StepContext`], and receives a [`StepValue`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::{FilePath, Result, SvnInfoError, WorkingCopyInfo};

/// Boxed future returned by [`StepDescriptor::start`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<StepValue>> + Send + 'a>>;

/// A capability a step may require from its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextKind {
    /// A [`FilePath`] workspace handle.
    FilePath,
}

impl ContextKind {
    /// Returns the capability name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilePath => "FilePath",
        }
    }
}

/// Capabilities supplied by the caller of a step.
#[derive(Clone, Debug, Default)]
pub struct StepContext {
    workspace: Option<FilePath>,
}

impl StepContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the workspace handle.
    #[must_use]
    pub fn with_workspace(mut self, workspace: FilePath) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Returns the workspace handle, if supplied.
    pub fn workspace(&self) -> Option<&FilePath> {
        self.workspace.as_ref()
    }

    /// Returns `true` if the context supplies `kind`.
    pub fn provides(&self, kind: ContextKind) -> bool {
        match kind {
            ContextKind::FilePath => self.workspace.is_some(),
        }
    }
}

/// A step argument value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    /// A string.
    String(String),
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::String(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

/// Named step arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepArgs {
    values: BTreeMap<String, ArgValue>,
}

impl StepArgs {
    /// Creates an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Returns an argument.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Returns a required string argument.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            Some(ArgValue::String(value)) => Ok(value),
            Some(other) => Err(SvnInfoError::InvalidArgument(format!(
                "`{name}` must be a string, got {other:?}"
            ))),
            None => Err(SvnInfoError::InvalidArgument(format!(
                "missing required argument `{name}`"
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for StepArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The value a step hands back to the pipeline script.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepValue {
    /// An ordered string-to-string map.
    Map(Vec<(String, String)>),
}

impl StepValue {
    /// Returns the map entries, if this is a map.
    pub fn as_map(&self) -> Option<&[(String, String)]> {
        match self {
            StepValue::Map(entries) => Some(entries),
        }
    }
}

impl From<WorkingCopyInfo> for StepValue {
    fn from(info: WorkingCopyInfo) -> Self {
        StepValue::Map(info.to_pairs())
    }
}

/// Describes a step to the host and starts executions of it.
pub trait StepDescriptor: Send + Sync {
    /// Name under which scripts call the step.
    fn function_name(&self) -> &'static str;

    /// Human-readable description.
    fn display_name(&self) -> &'static str;

    /// Capabilities the context must supply.
    fn required_context(&self) -> &'static [ContextKind];

    /// Binds the arguments and runs the step.
    fn start<'a>(&'a self, args: &'a StepArgs, context: &'a StepContext) -> StepFuture<'a>;
}

/// The `svninfo` step: working-copy info for a path in the workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SvninfoStep {
    path: String,
}

impl SvninfoStep {
    /// Function name of the step.
    pub const FUNCTION_NAME: &'static str = "svninfo";
    /// Display name of the step.
    pub const DISPLAY_NAME: &'static str = "Provides some data from svn info as a map.";

    /// Creates the step for a workspace-relative path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Binds the step from its arguments; `path` is required.
    pub fn from_args(args: &StepArgs) -> Result<Self> {
        Ok(Self::new(args.require_str("path")?))
    }

    /// The workspace-relative path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves the path in the workspace and queries the owning process.
    pub async fn run(&self, context: &StepContext) -> Result<WorkingCopyInfo> {
        let workspace = context
            .workspace()
            .ok_or(SvnInfoError::MissingContext {
                step: Self::FUNCTION_NAME,
                context: ContextKind::FilePath.as_str(),
            })?;
        let target = workspace.child(&self.path)?;
        target.svn_info().await
    }
}

/// Descriptor for [`SvninfoStep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SvninfoDescriptor;

impl StepDescriptor for SvninfoDescriptor {
    fn function_name(&self) -> &'static str {
        SvninfoStep::FUNCTION_NAME
    }

    fn display_name(&self) -> &'static str {
        SvninfoStep::DISPLAY_NAME
    }

    fn required_context(&self) -> &'static [ContextKind] {
        &[ContextKind::FilePath]
    }

    fn start<'a>(&'a self, args: &'a StepArgs, context: &'a StepContext) -> StepFuture<'a> {
        Box::pin(async move {
            let step = SvninfoStep::from_args(args)?;
            Ok(step.run(context).await?.into())
        })
    }
}

/// Name-to-step lookup table.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: BTreeMap<&'static str, Arc<dyn StepDescriptor>>,
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StepRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every step this crate provides.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register(SvninfoDescriptor);
        registry
    }

    /// Registers a step, replacing any step with the same function name.
    pub fn register(&mut self, step: impl StepDescriptor + 'static) {
        let name = step.function_name();
        if self.steps.insert(name, Arc::new(step)).is_some() {
            debug!(step = name, "replaced registered step");
        }
    }

    /// Looks up a step by function name.
    pub fn get(&self, name: &str) -> Option<&dyn StepDescriptor> {
        self.steps.get(name).map(|step| step.as_ref())
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.keys().copied()
    }

    /// Runs the step called `name`.
    ///
    /// Fails before starting the step if it is unknown or the context lacks a
    /// required capability.
    pub async fn invoke(
        &self,
        name: &str,
        args: &StepArgs,
        context: &StepContext,
    ) -> Result<StepValue> {
        let step = self
            .get(name)
            .ok_or_else(|| SvnInfoError::UnknownStep(name.to_string()))?;
        if let Some(missing) = step
            .required_context()
            .iter()
            .find(|kind| !context.provides(**kind))
        {
            return Err(SvnInfoError::MissingContext {
                step: step.function_name(),
                context: missing.as_str(),
            });
        }
        debug!(step = name, "starting step");
        step.start(args, context).await
    }
}
