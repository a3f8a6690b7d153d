//! CLI value enums and domain type conversions.

use clap::ValueEnum;

use crate::domain::{ChangeKind, DependencyType};

/// Change kind for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKindArg {
    /// Node creation
    Create,
    /// Attribute update
    Update,
    /// Node removal
    Delete,
    /// Relocation in the hierarchy
    Move,
}

impl From<ChangeKindArg> for ChangeKind {
    fn from(arg: ChangeKindArg) -> Self {
        match arg {
            ChangeKindArg::Create => ChangeKind::Create,
            ChangeKindArg::Update => ChangeKind::Update,
            ChangeKindArg::Delete => ChangeKind::Delete,
            ChangeKindArg::Move => ChangeKind::Move,
        }
    }
}

/// Dependency type filter for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyTypeArg {
    /// Inheritance
    Extends,
    /// Direct import
    Import,
    /// Interface implementation
    Implements,
    /// Runtime usage
    Uses,
    /// Generic dependency
    #[value(name = "depends_on", alias = "depends-on")]
    DependsOn,
}

impl From<DependencyTypeArg> for DependencyType {
    fn from(arg: DependencyTypeArg) -> Self {
        match arg {
            DependencyTypeArg::Extends => DependencyType::Extends,
            DependencyTypeArg::Import => DependencyType::Import,
            DependencyTypeArg::Implements => DependencyType::Implements,
            DependencyTypeArg::Uses => DependencyType::Uses,
            DependencyTypeArg::DependsOn => DependencyType::DependsOn,
        }
    }
}
