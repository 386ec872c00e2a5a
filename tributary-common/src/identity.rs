//! Operation identity and structural introspection.
//!
//! An [`OperationId`] is created once per logical multi-hop action and threaded through every
//! connector built for it, so that the discrete transfers a pipeline performs can be correlated
//! as a single action by whoever consumes the emitted events. It carries no authority.
//!
//! [`ComponentInfo`] lets a composed chain describe its own structure for diagnostics. Nothing in
//! the framework reads it back.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation token shared by all connectors of one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Recursive self-description of a connector and the components it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub kind: String,
    pub id: Option<OperationId>,
    pub inner: Vec<ComponentInfo>,
}

impl ComponentInfo {
    pub fn new(kind: impl Into<String>, id: Option<OperationId>, inner: Vec<ComponentInfo>) -> Self {
        Self { kind: kind.into(), id, inner }
    }

    pub fn leaf(kind: impl Into<String>, id: Option<OperationId>) -> Self {
        Self::new(kind, id, Vec::new())
    }

    /// Number of components in this tree, including the root.
    pub fn size(&self) -> usize {
        1 + self
            .inner
            .iter()
            .map(ComponentInfo::size)
            .sum::<usize>()
    }

    /// Returns true if every component in the tree carries `id`.
    pub fn is_aligned_to(&self, id: &OperationId) -> bool {
        self.id.as_ref() == Some(id) &&
            self.inner
                .iter()
                .all(|c| c.is_aligned_to(id))
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let id = self
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(f, "{:indent$}{} [{}]", "", self.kind, id, indent = depth * 2)?;
        for child in &self.inner {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// Implemented by every connector so an operation id can be threaded through a composition.
///
/// Composite connectors forward [`Identifiable::set_id`] to the components they wrap, so setting
/// the id on the outermost node aligns the whole chain.
pub trait Identifiable {
    fn id(&self) -> Option<&OperationId>;

    fn set_id(&mut self, id: Option<OperationId>);

    fn copy_id(&self) -> Option<OperationId> {
        self.id().copied()
    }

    fn component_info(&self) -> ComponentInfo;
}

impl<T: Identifiable + ?Sized> Identifiable for Box<T> {
    fn id(&self) -> Option<&OperationId> {
        (**self).id()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        (**self).set_id(id)
    }

    fn copy_id(&self) -> Option<OperationId> {
        (**self).copy_id()
    }

    fn component_info(&self) -> ComponentInfo {
        (**self).component_info()
    }
}
