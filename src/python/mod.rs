//! Python source parsing using tree-sitter
//!
//! Wraps a parsed module together with its source text and offers the small
//! set of structural queries the migration and model analysis need: document
//! order traversal, call argument splitting and literal string extraction.

mod literal;

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::CheckError;

pub use literal::string_literal;

/// A syntactically valid Python module
pub struct PythonModule<'s> {
    source: &'s str,
    tree: Tree,
}

impl<'s> PythonModule<'s> {
    /// Parse Python source.
    ///
    /// tree-sitter always produces a tree, recovering from errors where it can.
    /// Analysis on a recovered tree could silently miss statements, so any
    /// ERROR or MISSING node is reported as a syntax error instead.
    ///
    /// `origin` is only used for error messages.
    pub fn parse(source: &'s str, origin: &Path) -> Result<Self, CheckError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| CheckError::GrammarError {
                message: e.to_string(),
            })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| CheckError::PythonSyntaxError {
                path: origin.to_path_buf(),
                line: 1,
            })?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(CheckError::PythonSyntaxError {
                path: origin.to_path_buf(),
                line: first_error_line(root),
            });
        }

        Ok(Self { source, tree })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`
    pub fn text(&self, node: Node<'_>) -> &'s str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    /// Value of `node` if it is a literal string (see [`string_literal`])
    pub fn string_literal(&self, node: Node<'_>) -> Option<String> {
        string_literal(node, self.source)
    }

    /// Split the arguments of a `call` node into positional and keyword arguments
    pub fn call_arguments<'t>(&self, call: Node<'t>) -> CallArguments<'t> {
        let mut args = CallArguments::default();
        let Some(list) = call.child_by_field_name("arguments") else {
            return args;
        };
        if list.kind() != "argument_list" {
            // Generator argument: `f(x for x in y)`
            args.positional.push(list);
            return args;
        }

        let mut cursor = list.walk();
        for child in list.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {}
                "keyword_argument" => {
                    let name = child.child_by_field_name("name");
                    let value = child.child_by_field_name("value");
                    if let (Some(name), Some(value)) = (name, value) {
                        args.keywords.push((self.text(name).to_string(), value));
                    }
                }
                // `**kwargs` carries no keyword name we could match on
                "dictionary_splat" => {}
                _ => args.positional.push(child),
            }
        }
        args
    }

    /// `(receiver, method)` for calls of the form `name.method(...)`
    pub fn method_call(&self, call: Node<'_>) -> Option<(&'s str, &'s str)> {
        let function = call.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            return None;
        }
        let object = function.child_by_field_name("object")?;
        let attribute = function.child_by_field_name("attribute")?;
        if object.kind() != "identifier" {
            return None;
        }
        Some((self.text(object), self.text(attribute)))
    }

    /// Final name of the called function: `deferred` for both `deferred(...)`
    /// and `sa.orm.deferred(...)`
    pub fn callee_name(&self, call: Node<'_>) -> Option<&'s str> {
        let function = call.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(self.text(function)),
            "attribute" => function
                .child_by_field_name("attribute")
                .map(|attr| self.text(attr)),
            _ => None,
        }
    }
}

/// Arguments of a call expression
#[derive(Debug, Default)]
pub struct CallArguments<'t> {
    pub positional: Vec<Node<'t>>,
    pub keywords: Vec<(String, Node<'t>)>,
}

impl<'t> CallArguments<'t> {
    pub fn keyword(&self, name: &str) -> Option<Node<'t>> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }
}

/// All named nodes below (and including) `node`, in document order
pub fn descendants(node: Node<'_>) -> Vec<Node<'_>> {
    let mut nodes = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        nodes.push(current);
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    nodes
}

/// Statements directly inside a `block`, unwrapping `expression_statement`
pub fn block_statements(block: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = block.walk();
    block
        .named_children(&mut cursor)
        .filter_map(|stmt| match stmt.kind() {
            "comment" => None,
            "expression_statement" => stmt.named_child(0),
            _ => Some(stmt),
        })
        .collect()
}

/// 1-based line on which `node` starts
pub fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

fn first_error_line(root: Node<'_>) -> usize {
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        if current.is_error() || current.is_missing() {
            return line_of(current);
        }
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current
            .children(&mut cursor)
            .filter(|child| child.has_error() || child.is_missing())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    line_of(root)
}
