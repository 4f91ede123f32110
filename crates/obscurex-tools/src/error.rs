use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool '{0}'")]
    DuplicateTool(String),

    /// The tool's descriptor is not well formed.
    #[error("invalid descriptor for '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// The manifest entry could not build its tool.
    #[error("failed to construct tool '{name}': {reason}")]
    Construction { name: String, reason: String },
}

impl RegistryError {
    pub fn tool_name(&self) -> &str {
        match self {
            RegistryError::DuplicateTool(name)
            | RegistryError::InvalidDescriptor { name, .. }
            | RegistryError::Construction { name, .. } => name,
        }
    }
}
