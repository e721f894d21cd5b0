//! Records addressed by a typed identifier.

/// Implemented by every stored record: products, movements, documents, alerts.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;

    /// Short `kind:id` tag used in log fields and error messages.
    fn tag(&self, kind: &str) -> String {
        format!("{kind}:{}", self.id())
    }
}
