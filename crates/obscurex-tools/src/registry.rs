use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use obscurex_core::{Tool, ToolCategory, ToolDescriptor};
use serde::Serialize;

use crate::error::RegistryError;

/// Maximum length of a tool name.
pub const MAX_TOOL_NAME_LEN: usize = 64;

type ToolConstructor = Box<dyn FnOnce() -> Result<Arc<dyn Tool>, String> + Send>;

struct ManifestEntry {
    name: String,
    category: ToolCategory,
    build: ToolConstructor,
}

/// An ordered list of tools to build and register at startup.
///
/// Each entry is constructed lazily by [`ToolRegistry::populate`], so one
/// entry failing to build never prevents the others from loading.
#[derive(Default)]
pub struct ToolManifest {
    entries: Vec<ManifestEntry>,
}

impl ToolManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry whose constructor may fail.
    pub fn with<F>(mut self, name: impl Into<String>, category: ToolCategory, build: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Tool>, String> + Send + 'static,
    {
        self.entries.push(ManifestEntry {
            name: name.into(),
            category,
            build: Box::new(build),
        });
        self
    }

    /// Add an already-built tool.
    pub fn with_tool(self, category: ToolCategory, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        self.with(name, category, move || Ok(tool))
    }

    pub fn extend(mut self, other: ToolManifest) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ToolManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolManifest")
            .field("entries", &self.names())
            .finish()
    }
}

/// A manifest entry that was not registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTool {
    pub name: String,
    pub reason: String,
}

/// Outcome of [`ToolRegistry::populate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedTool>,
}

impl PopulationReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Clone)]
struct RegisteredTool {
    tool: Arc<dyn Tool>,
    category: ToolCategory,
}

/// Registry of tools, resolved by name and listed in registration order.
///
/// Tool names are unique: registering a second tool under an existing name
/// fails with [`RegistryError::DuplicateTool`] instead of replacing it.
/// Registered tools are immutable for the lifetime of the registry.
///
/// # Example
///
/// ```rust
/// use obscurex_core::FunctionTool;
/// use obscurex_tools::ToolRegistry;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let echo = FunctionTool::sync("echo", "Echoes its input", json!({"type": "object"}), |p, _| Ok(p));
///
/// let mut registry = ToolRegistry::new();
/// registry.register(Arc::new(echo.clone())).unwrap();
/// assert!(registry.register(Arc::new(echo)).is_err());
/// assert_eq!(registry.names(), vec!["echo"]);
/// ```
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own category.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let category = tool.category();
        self.register_with_category(tool, category)
    }

    /// Register a tool, overriding the category it reports.
    pub fn register_with_category(
        &mut self,
        tool: Arc<dyn Tool>,
        category: ToolCategory,
    ) -> Result<(), RegistryError> {
        validate_descriptor(&tool.descriptor())?;

        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        tracing::debug!(tool = %name, category = %category, "Registered tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { tool, category });
        Ok(())
    }

    /// Builder-style registration.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, RegistryError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Build and register every manifest entry.
    ///
    /// Construction failures, invalid descriptors and duplicate names are
    /// logged and recorded in the report; they never abort the rest.
    pub fn populate(&mut self, manifest: ToolManifest) -> PopulationReport {
        let mut report = PopulationReport::default();

        for entry in manifest.entries {
            let outcome = (entry.build)()
                .map_err(|reason| RegistryError::Construction {
                    name: entry.name.clone(),
                    reason,
                })
                .and_then(|tool| {
                    let name = tool.name().to_string();
                    self.register_with_category(tool, entry.category)
                        .map(|()| name)
                });

            match outcome {
                Ok(name) => report.loaded.push(name),
                Err(e) => {
                    tracing::warn!(
                        tool = %entry.name,
                        category = %entry.category,
                        error = %e,
                        "Skipping tool during registry population"
                    );
                    report.skipped.push(SkippedTool {
                        name: e.tool_name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "Tool registry populated"
        );
        report
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i].tool))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors of every tool, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|registered| ToolDescriptor {
                category: registered.category,
                ..registered.tool.descriptor()
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|registered| registered.tool.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Check a descriptor's shape: a name of `[A-Za-z0-9_-]` up to 64 chars,
/// a non-empty description, and an object parameter schema.
pub fn validate_descriptor(descriptor: &ToolDescriptor) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidDescriptor {
        name: descriptor.name.clone(),
        reason: reason.to_string(),
    };

    if descriptor.name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if descriptor.name.len() > MAX_TOOL_NAME_LEN {
        return Err(invalid("name exceeds 64 characters"));
    }
    if !descriptor
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("name may only contain letters, digits, '_' and '-'"));
    }
    if descriptor.description.trim().is_empty() {
        return Err(invalid("description must not be empty"));
    }
    if !descriptor.parameters.is_object() {
        return Err(invalid("parameter schema must be a JSON object"));
    }
    Ok(())
}
