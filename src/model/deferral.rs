//! Deferred-loading state of a model column
//!
//! Works on model source as it exists in the reference history point, so the
//! answer reflects what is deployed rather than what this change introduces.

use std::fmt;
use std::path::Path;

use tree_sitter::Node;

use super::TABLENAME_ATTRIBUTE;
use crate::error::CheckError;
use crate::python::{block_statements, descendants, line_of, PythonModule};

/// Wrapper that marks a column attribute as deferred
const DEFERRED_WRAPPER: &str = "deferred";

/// Constructors that accept a `deferred=True` keyword
const DEFERRABLE_CONSTRUCTORS: &[&str] = &["mapped_column", "column_property"];

/// Constructors whose first positional string names the database column
const COLUMN_CONSTRUCTORS: &[&str] = &["Column", "mapped_column"];

/// Wrappers whose first positional argument is the column construct
const COLUMN_WRAPPERS: &[&str] = &["deferred", "column_property"];

/// How a column is declared in a model class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDeferralState {
    /// Declared and wrapped in `deferred(...)`
    Deferred,
    /// Declared and loaded eagerly
    NotDeferred,
    /// Not declared in the class body
    Absent,
}

impl fmt::Display for ColumnDeferralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDeferralState::Deferred => write!(f, "deferred"),
            ColumnDeferralState::NotDeferred => write!(f, "not deferred"),
            ColumnDeferralState::Absent => write!(f, "absent"),
        }
    }
}

/// Result of inspecting a model file for one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInspection {
    /// Class declaring the table, `None` if no class does
    pub class_name: Option<String>,
    /// 1-based line of the column attribute, if found
    pub line: Option<usize>,
    pub state: ColumnDeferralState,
}

/// Inspect model source for the deferral state of `table.column`.
///
/// Only the first class (in document order) declaring `__tablename__ = table`
/// is considered, and only its immediate body.
pub fn inspect_model(
    content: &str,
    origin: &Path,
    table: &str,
    column: &str,
) -> Result<ModelInspection, CheckError> {
    let module = PythonModule::parse(content, origin)?;

    let Some(class) = find_table_class(&module, table) else {
        return Ok(ModelInspection {
            class_name: None,
            line: None,
            state: ColumnDeferralState::Absent,
        });
    };
    let class_name = class
        .child_by_field_name("name")
        .map(|name| module.text(name).to_string());

    let attributes = class_attributes(&module, class);
    let attribute = attributes
        .iter()
        .find(|attr| attr.name == column)
        .or_else(|| {
            attributes.iter().find(|attr| {
                attr.value
                    .and_then(|value| declared_column_name(&module, value))
                    .is_some_and(|name| name == column)
            })
        });

    let (line, state) = match attribute {
        Some(attr) => (Some(attr.line), classify(&module, attr.value)),
        None => (None, ColumnDeferralState::Absent),
    };

    Ok(ModelInspection {
        class_name,
        line,
        state,
    })
}

/// Deferral state of `table.column`, treating unparseable source as `Absent`
pub fn check_column_state(content: &str, table: &str, column: &str) -> ColumnDeferralState {
    match inspect_model(content, Path::new("<history>"), table, column) {
        Ok(inspection) => inspection.state,
        Err(e) => {
            tracing::debug!(error = %e, "model content could not be parsed");
            ColumnDeferralState::Absent
        }
    }
}

/// First class in document order whose body declares `__tablename__ = table`
pub(crate) fn find_table_class<'t>(module: &'t PythonModule<'_>, table: &str) -> Option<Node<'t>> {
    descendants(module.root())
        .into_iter()
        .filter(|node| node.kind() == "class_definition")
        .find(|class| {
            class_attributes(module, *class).iter().any(|attr| {
                attr.name == TABLENAME_ATTRIBUTE
                    && attr
                        .value
                        .and_then(|value| module.string_literal(value))
                        .is_some_and(|value| value == table)
            })
        })
}

/// A single-target assignment in a class body
struct Attribute<'s, 't> {
    name: &'s str,
    /// Right-hand side; `None` for a bare annotation such as `flag: Mapped[bool]`
    value: Option<Node<'t>>,
    line: usize,
}

fn class_attributes<'s, 't>(module: &PythonModule<'s>, class: Node<'t>) -> Vec<Attribute<'s, 't>> {
    let Some(body) = class.child_by_field_name("body") else {
        return Vec::new();
    };

    block_statements(body)
        .into_iter()
        .filter(|stmt| stmt.kind() == "assignment")
        .filter_map(|stmt| {
            let left = stmt.child_by_field_name("left")?;
            if left.kind() != "identifier" {
                return None;
            }
            let value = stmt.child_by_field_name("right");
            // `a = b = value` has more than one target
            if value.is_some_and(|v| v.kind() == "assignment") {
                return None;
            }
            if value.is_none() && stmt.child_by_field_name("type").is_none() {
                return None;
            }
            Some(Attribute {
                name: module.text(left),
                value,
                line: line_of(stmt),
            })
        })
        .collect()
}

fn classify(module: &PythonModule<'_>, value: Option<Node<'_>>) -> ColumnDeferralState {
    let Some(call) = value.filter(|v| v.kind() == "call") else {
        return ColumnDeferralState::NotDeferred;
    };

    match module.callee_name(call) {
        Some(DEFERRED_WRAPPER) => ColumnDeferralState::Deferred,
        Some(name) if DEFERRABLE_CONSTRUCTORS.contains(&name) => {
            let deferred_flag = module
                .call_arguments(call)
                .keyword(DEFERRED_WRAPPER)
                .is_some_and(|flag| flag.kind() == "true");
            if deferred_flag {
                ColumnDeferralState::Deferred
            } else {
                ColumnDeferralState::NotDeferred
            }
        }
        _ => ColumnDeferralState::NotDeferred,
    }
}

/// Database column name given explicitly to the column constructor:
/// `flag = deferred(Column("legacy_flag", Boolean))` names `legacy_flag`
fn declared_column_name(module: &PythonModule<'_>, value: Node<'_>) -> Option<String> {
    if value.kind() != "call" {
        return None;
    }
    let callee = module.callee_name(value)?;
    let first = *module.call_arguments(value).positional.first()?;

    if COLUMN_CONSTRUCTORS.contains(&callee) {
        module.string_literal(first)
    } else if COLUMN_WRAPPERS.contains(&callee) {
        declared_column_name(module, first)
    } else {
        None
    }
}
