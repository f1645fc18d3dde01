//! Provenance of traced values.
//!
//! A [`Source`] describes how to re-fetch an input value from the frame when a
//! cached trace is about to be reused. Guards are installed against sources;
//! a value without a source was created during tracing and needs no guard.
use serde::{Deserialize, Serialize};

use crate::containers::key::Projection;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// A local variable of the traced frame.
    Local(String),

    /// A global of the traced frame.
    Global(String),

    /// Attribute access on another source.
    Attr(Box<Source>, String),

    /// Subscript of another source by a constant key.
    GetItem(Box<Source>, Projection),

    /// The process module table.
    SysModules,
}

impl Source {
    pub fn local(name: impl Into<String>) -> Self {
        Source::Local(name.into())
    }

    pub fn global(name: impl Into<String>) -> Self {
        Source::Global(name.into())
    }

    pub fn attr(&self, name: impl Into<String>) -> Self {
        Source::Attr(Box::new(self.clone()), name.into())
    }

    pub fn item(&self, key: Projection) -> Self {
        Source::GetItem(Box::new(self.clone()), key)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Local(name) => write!(f, "L[{:?}]", name),
            Source::Global(name) => write!(f, "G[{:?}]", name),
            Source::Attr(base, name) => write!(f, "{}.{}", base, name),
            Source::GetItem(base, key) => write!(f, "{}[{}]", base, key),
            Source::SysModules => write!(f, "sys.modules"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sources_render_as_access_paths() {
        let source = Source::local("cfg")
            .attr("layers")
            .item(Projection::Str("attn".into()));
        assert_eq!(source.to_string(), "L[\"cfg\"].layers[\"attn\"]");
        assert_eq!(
            Source::SysModules.item(Projection::Str("os".into())).to_string(),
            "sys.modules[\"os\"]"
        );
    }
}
