//! Message selection and rendering for fired rules

mod renderer;
mod selector;

pub use renderer::{format_value, RenderWarning, RenderedMessage, TemplateRenderer, ERROR_MARKER, MISSING_MARKER};
pub use selector::MessageSelector;
