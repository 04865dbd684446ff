//! External tagged tree consumed by the compiler.
//!
//! The tree is the boundary format between a front end (parser, REPL, test
//! harness) and the compiler. Its textual notation is JSON:
//!
//! - `null`, `true`, `false` and numbers are scalar literals
//! - a JSON string is a symbol
//! - an array is a tagged form (`["let", ["params", "x"], "x"]`) or a call
//! - `{"at": {"line": 1, "column": 4}, "tree": ...}` tags a subtree with its
//!   source location

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a tree node in the original source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation {
            file: None,
            line,
            column,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Errors raised while reading the textual tree notation
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("invalid tree JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported tree node: {0}")]
    Unsupported(String),

    #[error("invalid location tag: {0}")]
    InvalidLocation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Null,
    Boolean(bool),
    Number(f64),
    Symbol(String),
    Node(Vec<Tree>),
    Located(SourceLocation, Box<Tree>),
}

impl Tree {
    pub fn symbol(name: impl Into<String>) -> Tree {
        Tree::Symbol(name.into())
    }

    /// A tagged form `[tag, items...]`.
    pub fn form(tag: &str, items: impl IntoIterator<Item = Tree>) -> Tree {
        let mut node = vec![Tree::symbol(tag)];
        node.extend(items);
        Tree::Node(node)
    }

    /// Reads the JSON notation from text.
    pub fn parse(text: &str) -> Result<Tree, TreeError> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Tree::from_json(&json)
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Tree, TreeError> {
        use serde_json::Value as Json;
        match json {
            Json::Null => Ok(Tree::Null),
            Json::Bool(b) => Ok(Tree::Boolean(*b)),
            Json::Number(n) => n
                .as_f64()
                .map(Tree::Number)
                .ok_or_else(|| TreeError::Unsupported(format!("number {}", n))),
            Json::String(s) => Ok(Tree::Symbol(s.clone())),
            Json::Array(items) => items
                .iter()
                .map(Tree::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Tree::Node),
            Json::Object(map) => {
                let at = map
                    .get("at")
                    .ok_or_else(|| TreeError::Unsupported(format!("object {}", json)))?;
                let inner = map
                    .get("tree")
                    .ok_or_else(|| TreeError::Unsupported(format!("object {}", json)))?;
                let location: SourceLocation = serde_json::from_value(at.clone())
                    .map_err(|e| TreeError::InvalidLocation(e.to_string()))?;
                Ok(Tree::Located(location, Box::new(Tree::from_json(inner)?)))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Tree::Null => Json::Null,
            Tree::Boolean(b) => Json::Bool(*b),
            // Integral values print without a fraction; -0.0 keeps its sign
            Tree::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 && !(*n == 0.0 && n.is_sign_negative()) => {
                Json::from(*n as i64)
            }
            // Non-finite numbers have no JSON spelling
            Tree::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Tree::Symbol(s) => Json::String(s.clone()),
            Tree::Node(items) => Json::Array(items.iter().map(Tree::to_json).collect()),
            Tree::Located(location, inner) => serde_json::json!({
                "at": location,
                "tree": inner.to_json(),
            }),
        }
    }

    /// The tree with any location tags peeled off.
    pub fn strip(&self) -> &Tree {
        match self {
            Tree::Located(_, inner) => inner.strip(),
            other => other,
        }
    }

    /// The outermost location tag, if any.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Tree::Located(location, _) => Some(location),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self.strip() {
            Tree::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_reads_forms_and_scalars() {
        let tree = Tree::from_json(&json!(["add", 1, ["str", "x"], null, true])).unwrap();
        assert_eq!(
            tree,
            Tree::Node(vec![
                Tree::symbol("add"),
                Tree::Number(1.0),
                Tree::form("str", [Tree::symbol("x")]),
                Tree::Null,
                Tree::Boolean(true),
            ])
        );
    }

    #[test]
    fn test_location_tags() {
        let tree = Tree::parse(r#"{"at": {"line": 3, "column": 7, "file": "a.tarn"}, "tree": "x"}"#)
            .unwrap();
        let location = tree.location().cloned().unwrap();
        assert_eq!(location, SourceLocation::new(3, 7).in_file("a.tarn"));
        assert_eq!(location.to_string(), "a.tarn:3:7");
        assert_eq!(tree.strip(), &Tree::symbol("x"));
        assert_eq!(Tree::from_json(&tree.to_json()).unwrap(), tree);
    }

    #[test]
    fn test_rejects_plain_objects() {
        assert!(matches!(
            Tree::from_json(&json!({"x": 1})),
            Err(TreeError::Unsupported(_))
        ));
        assert!(matches!(
            Tree::from_json(&json!({"at": {"line": "one"}, "tree": 1})),
            Err(TreeError::InvalidLocation(_))
        ));
    }
}
