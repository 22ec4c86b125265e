//! Scope table (C2): per-lexical-scope symbol table with bubble-up lookup,
//! shadow classification, and function-parameter awareness.

use bitflags::bitflags;
use ember_core::NodeId;

bitflags! {
    /// Flags controlling [`Scope::query`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryFlags: u8 {
        /// Search enclosing scopes if not found locally.
        const BUBBLE_UP = 1 << 0;
        /// Include class member symbols in the search.
        const QUERY_CLASS_ITEMS = 1 << 1;
    }
}

/// What kind of thing a [`ScopeDef`] names, used to describe conflicting
/// prior declarations in diagnostics (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Variable,
    Function,
    Class,
    Import,
    ForIterator,
    CaughtError,
    Parameter,
}

impl DeclKind {
    pub fn describe(self) -> &'static str {
        match self {
            DeclKind::Variable => "variable",
            DeclKind::Function => "function",
            DeclKind::Class => "class",
            DeclKind::Import => "import",
            DeclKind::ForIterator => "for-iterator",
            DeclKind::CaughtError => "caught-error",
            DeclKind::Parameter => "parameter",
        }
    }
}

/// An additional stacked `import` declaration of the same top-level name,
/// legal only when every addition (including the first) is an `import`
/// with a distinct dotted element path.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub decl: NodeId,
    pub element_path: String,
    pub line: u32,
    pub column: u32,
}

/// The record registered in a scope for a named entity.
#[derive(Debug, Clone)]
pub struct ScopeDef {
    pub name: String,
    pub decl: NodeId,
    pub owner: ScopeId,
    pub kind: DeclKind,
    pub line: u32,
    pub column: u32,
    /// Only meaningful when `kind == Import`; the distinct-path bookkeeping
    /// described in §3.
    pub additional: Vec<ImportDecl>,
    /// For `Import`, the element path of the first declaration.
    pub element_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

struct ScopeNode {
    parent: Option<ScopeId>,
    class_and_func_nesting_level: u32,
    is_global: bool,
    symbols: Vec<ScopeDef>,
}

/// Owns every [`Scope`] for one translation unit. A scope is embedded in
/// its defining expression node conceptually; concretely it lives here,
/// addressed by [`ScopeId`], and the defining node just stores the id.
pub struct ScopeTable {
    scopes: Vec<ScopeNode>,
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Configurable shadow-warning toggles (§1, §4.2). Loading these from a
/// config file/CLI flags is out of scope; the struct itself is ambient
/// stack the driver fills in.
#[derive(Debug, Clone, Copy)]
pub struct WarningConfig {
    pub shadowing_direct_locals: bool,
    pub shadowing_parent_func_locals: bool,
    pub shadowing_globals: bool,
    pub deprecated_use: bool,
}

impl Default for WarningConfig {
    fn default() -> Self {
        WarningConfig {
            shadowing_direct_locals: true,
            shadowing_parent_func_locals: true,
            shadowing_globals: true,
            deprecated_use: true,
        }
    }
}

/// Outcome of a scope lookup used to classify shadowing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowSeverity {
    /// Not a shadow at all, or a warning category that's currently
    /// disabled by [`WarningConfig`].
    None,
    WarnDirectLocals,
    WarnParentFuncLocals,
    WarnGlobals,
}

/// Why [`ScopeTable::add`] failed.
#[derive(Debug, Clone)]
pub enum ScopeFailure {
    /// Same scope, same name, not legally stackable imports.
    Duplicate { prior: ScopeDef },
    /// Re-declaring a function parameter of the same function.
    ForbiddenParameterRedeclare { prior: ScopeDef },
    /// `self` or `base`.
    ReservedIdentifier { name: String },
}

pub const RESERVED_IDENTIFIERS: [&str; 2] = ["self", "base"];

impl ScopeTable {
    pub fn new() -> Self {
        ScopeTable { scopes: Vec::new() }
    }

    /// Create the single global scope for a translation unit.
    pub fn new_global(&mut self) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeNode {
            parent: None,
            class_and_func_nesting_level: 0,
            is_global: true,
            symbols: Vec::new(),
        });
        id
    }

    /// Create a child scope. `crosses_func_or_class_boundary` increments
    /// the nesting level; plain block scopes (if/while/for/do/with bodies)
    /// share the enclosing level.
    pub fn new_child(&mut self, parent: ScopeId, crosses_func_or_class_boundary: bool) -> ScopeId {
        let parent_level = self.scopes[parent.0 as usize].class_and_func_nesting_level;
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeNode {
            parent: Some(parent),
            class_and_func_nesting_level: if crosses_func_or_class_boundary {
                parent_level + 1
            } else {
                parent_level
            },
            is_global: false,
            symbols: Vec::new(),
        });
        id
    }

    pub fn is_global(&self, scope: ScopeId) -> bool {
        self.scopes[scope.0 as usize].is_global
    }

    pub fn nesting_level(&self, scope: ScopeId) -> u32 {
        self.scopes[scope.0 as usize].class_and_func_nesting_level
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    fn local_lookup(&self, scope: ScopeId, name: &str) -> Option<&ScopeDef> {
        self.scopes[scope.0 as usize]
            .symbols
            .iter()
            .find(|d| d.name == name)
    }

    /// `query(scope, name, flags)`.
    pub fn query(&self, scope: ScopeId, name: &str, flags: QueryFlags) -> Option<&ScopeDef> {
        if let Some(def) = self.local_lookup(scope, name) {
            return Some(def);
        }
        if flags.contains(QueryFlags::BUBBLE_UP)
            && let Some(parent) = self.parent(scope)
        {
            return self.query(parent, name, flags);
        }
        None
    }

    /// Find the nearest outer scope (strictly enclosing, not `scope`
    /// itself) that declares `name`, used for shadow classification.
    fn outer_lookup(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &ScopeDef)> {
        let mut current = self.parent(scope)?;
        loop {
            if let Some(def) = self.local_lookup(current, name) {
                return Some((current, def));
            }
            current = self.parent(current)?;
        }
    }

    fn classify_shadow(
        &self,
        scope: ScopeId,
        outer_scope: ScopeId,
        config: &WarningConfig,
    ) -> ShadowSeverity {
        let outer = &self.scopes[outer_scope.0 as usize];
        if outer.is_global {
            if config.shadowing_globals {
                return ShadowSeverity::WarnGlobals;
            }
            return ShadowSeverity::None;
        }
        let my_level = self.nesting_level(scope);
        if outer.class_and_func_nesting_level == my_level {
            if config.shadowing_direct_locals {
                return ShadowSeverity::WarnDirectLocals;
            }
        } else if config.shadowing_parent_func_locals {
            return ShadowSeverity::WarnParentFuncLocals;
        }
        ShadowSeverity::None
    }

    /// `add(scope, name, expr)`. Returns `Ok(Some(severity))` on success
    /// (possibly with a shadow warning to report), `Err(failure)` when the
    /// addition is illegal.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        scope: ScopeId,
        name: &str,
        decl: NodeId,
        kind: DeclKind,
        line: u32,
        column: u32,
        element_path: Option<&str>,
        config: &WarningConfig,
    ) -> Result<ShadowSeverity, ScopeFailure> {
        if RESERVED_IDENTIFIERS.contains(&name) {
            return Err(ScopeFailure::ReservedIdentifier {
                name: name.to_string(),
            });
        }

        if let Some(existing_idx) = self.scopes[scope.0 as usize]
            .symbols
            .iter()
            .position(|d| d.name == name)
        {
            let is_legal_import_stack = {
                let existing = &self.scopes[scope.0 as usize].symbols[existing_idx];
                kind == DeclKind::Import
                    && existing.kind == DeclKind::Import
                    && element_path.is_some_and(|p| {
                        existing.element_path.as_deref() != Some(p)
                            && existing.additional.iter().all(|a| a.element_path != p)
                    })
            };
            if is_legal_import_stack {
                let path = element_path.unwrap().to_string();
                self.scopes[scope.0 as usize].symbols[existing_idx]
                    .additional
                    .push(ImportDecl {
                        decl,
                        element_path: path,
                        line,
                        column,
                    });
                return Ok(ShadowSeverity::None);
            }
            let existing = &self.scopes[scope.0 as usize].symbols[existing_idx];
            if existing.kind == DeclKind::Parameter && kind == DeclKind::Parameter {
                return Err(ScopeFailure::ForbiddenParameterRedeclare {
                    prior: existing.clone(),
                });
            }
            return Err(ScopeFailure::Duplicate {
                prior: existing.clone(),
            });
        }

        // Re-declaring a visible function parameter of the *same* function
        // is forbidden even from a nested block scope inside that function.
        if let Some((outer_scope, outer_def)) = self.outer_lookup(scope, name)
            && outer_def.kind == DeclKind::Parameter
            && self.nesting_level(outer_scope) == self.nesting_level(scope)
        {
            return Err(ScopeFailure::ForbiddenParameterRedeclare {
                prior: outer_def.clone(),
            });
        }

        let severity = match self.outer_lookup(scope, name) {
            Some((outer_scope, _)) => self.classify_shadow(scope, outer_scope, config),
            None => ShadowSeverity::None,
        };

        self.scopes[scope.0 as usize].symbols.push(ScopeDef {
            name: name.to_string(),
            decl,
            owner: scope,
            kind,
            line,
            column,
            additional: Vec::new(),
            element_path: element_path.map(|s| s.to_string()),
        });

        Ok(severity)
    }

    /// `remove(scope, name)`: erase on rollback after a failed late
    /// parsing step.
    pub fn remove(&mut self, scope: ScopeId, name: &str) {
        self.scopes[scope.0 as usize]
            .symbols
            .retain(|d| d.name != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: u32) -> NodeId {
        NodeId::from_raw(i)
    }

    #[test]
    fn duplicate_same_scope_is_rejected() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        table
            .add(g, "x", node(1), DeclKind::Variable, 1, 1, None, &cfg)
            .unwrap();
        let err = table
            .add(g, "x", node(2), DeclKind::Variable, 2, 1, None, &cfg)
            .unwrap_err();
        assert!(matches!(err, ScopeFailure::Duplicate { .. }));
    }

    #[test]
    fn import_stacking_with_distinct_paths_is_legal() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        table
            .add(g, "a", node(1), DeclKind::Import, 1, 1, Some("a.b"), &cfg)
            .unwrap();
        let result = table.add(g, "a", node(2), DeclKind::Import, 2, 1, Some("a.c"), &cfg);
        assert!(result.is_ok());
        let def = table.query(g, "a", QueryFlags::empty()).unwrap();
        assert_eq!(def.additional.len(), 1);
    }

    #[test]
    fn import_stacking_with_same_path_is_duplicate() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        table
            .add(g, "a", node(1), DeclKind::Import, 1, 1, Some("a.b"), &cfg)
            .unwrap();
        let err = table
            .add(g, "a", node(2), DeclKind::Import, 2, 1, Some("a.b"), &cfg)
            .unwrap_err();
        assert!(matches!(err, ScopeFailure::Duplicate { .. }));
    }

    #[test]
    fn reserved_identifiers_cannot_be_declared() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        let err = table
            .add(g, "self", node(1), DeclKind::Variable, 1, 1, None, &cfg)
            .unwrap_err();
        assert!(matches!(err, ScopeFailure::ReservedIdentifier { .. }));
    }

    #[test]
    fn shadowing_global_warns_when_enabled() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        table
            .add(g, "x", node(1), DeclKind::Variable, 1, 1, None, &cfg)
            .unwrap();
        let func_scope = table.new_child(g, true);
        let severity = table
            .add(func_scope, "x", node(2), DeclKind::Variable, 2, 1, None, &cfg)
            .unwrap();
        assert_eq!(severity, ShadowSeverity::WarnGlobals);
    }

    #[test]
    fn bubble_up_finds_outer_declarations() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        table
            .add(g, "x", node(1), DeclKind::Variable, 1, 1, None, &cfg)
            .unwrap();
        let inner = table.new_child(g, false);
        assert!(table.query(inner, "x", QueryFlags::empty()).is_none());
        assert!(
            table
                .query(inner, "x", QueryFlags::BUBBLE_UP)
                .is_some()
        );
    }

    #[test]
    fn parameter_redeclaration_in_nested_block_is_forbidden() {
        let mut table = ScopeTable::new();
        let g = table.new_global();
        let cfg = WarningConfig::default();
        let func_scope = table.new_child(g, true);
        table
            .add(func_scope, "n", node(1), DeclKind::Parameter, 1, 1, None, &cfg)
            .unwrap();
        let block = table.new_child(func_scope, false);
        let err = table
            .add(block, "n", node(2), DeclKind::Variable, 2, 1, None, &cfg)
            .unwrap_err();
        assert!(matches!(err, ScopeFailure::ForbiddenParameterRedeclare { .. }));
    }
}
