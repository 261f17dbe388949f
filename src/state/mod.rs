//! State shared between charts and their UI collaborators

mod registry;
mod settings;

pub use registry::LoadingRegistry;
pub use settings::{SamplingSettings, SettingsProvider, SharedSettings};
