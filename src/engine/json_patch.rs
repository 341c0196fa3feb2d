//! engine::json_patch
//!
//! JSON Patch (RFC 6902) applied to structured file content.
//!
//! Patches are applied to a copy of the document; on any failure the
//! original is left untouched.
//!
//! # Example
//!
//! ```
//! use forgepipe::engine::json_patch::{apply, PatchOperation};
//! use serde_json::json;
//!
//! let mut doc = json!({"version": "1.0.0"});
//! apply(&mut doc, &[PatchOperation::Replace {
//!     path: "/version".into(),
//!     value: json!("2.0.0"),
//! }]).unwrap();
//! assert_eq!(doc, json!({"version": "2.0.0"}));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOperation {
    /// Target pointer of the operation.
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Move { path, .. }
            | PatchOperation::Copy { path, .. }
            | PatchOperation::Test { path, .. } => path,
        }
    }
}

/// Errors from applying a patch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),

    #[error("path '{0}' does not exist")]
    PathNotFound(String),

    #[error("array index '{index}' is out of range at '{path}'")]
    InvalidIndex { path: String, index: String },

    #[error("test failed at '{0}'")]
    TestFailed(String),

    #[error("cannot move '{from}' into its own child '{path}'")]
    MoveIntoChild { from: String, path: String },

    #[error("cannot remove the document root")]
    RemoveRoot,
}

/// Apply `operations` in order.
///
/// # Errors
///
/// Returns the first failing operation's error; `doc` is unchanged.
pub fn apply(doc: &mut Value, operations: &[PatchOperation]) -> Result<(), PatchError> {
    let mut working = doc.clone();
    for operation in operations {
        apply_one(&mut working, operation)?;
    }
    *doc = working;
    Ok(())
}

fn apply_one(doc: &mut Value, operation: &PatchOperation) -> Result<(), PatchError> {
    match operation {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(drop),
        PatchOperation::Replace { path, value } => {
            let tokens = parse_pointer(path)?;
            let target = lookup_mut(doc, &tokens, path)?;
            *target = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            if from == path {
                return Ok(());
            }
            if path.starts_with(&format!("{}/", from)) {
                return Err(PatchError::MoveIntoChild {
                    from: from.clone(),
                    path: path.clone(),
                });
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let tokens = parse_pointer(from)?;
            let value = lookup(doc, &tokens, from)?.clone();
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => {
            let tokens = parse_pointer(path)?;
            if lookup(doc, &tokens, path)? == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.clone()))
            }
        }
    }
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let mut tokens = parse_pointer(path)?;
    let Some(last) = tokens.pop() else {
        *doc = value;
        return Ok(());
    };
    match lookup_mut(doc, &tokens, path)? {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                parse_index(&last, path)?
            };
            if index > items.len() {
                return Err(PatchError::InvalidIndex {
                    path: path.to_string(),
                    index: last,
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<Value, PatchError> {
    let mut tokens = parse_pointer(path)?;
    let last = tokens.pop().ok_or(PatchError::RemoveRoot)?;
    match lookup_mut(doc, &tokens, path)? {
        Value::Object(map) => map
            .remove(&last)
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(&last, path)?;
            if index >= items.len() {
                return Err(PatchError::InvalidIndex {
                    path: path.to_string(),
                    index: last,
                });
            }
            Ok(items.remove(index))
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn lookup<'a>(doc: &'a Value, tokens: &[String], path: &str) -> Result<&'a Value, PatchError> {
    tokens.iter().try_fold(doc, |current, token| {
        let next = match current {
            Value::Object(map) => map.get(token),
            Value::Array(items) => items.get(parse_index(token, path)?),
            _ => None,
        };
        next.ok_or_else(|| PatchError::PathNotFound(path.to_string()))
    })
}

fn lookup_mut<'a>(
    doc: &'a mut Value,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut Value, PatchError> {
    tokens.iter().try_fold(doc, |current, token| {
        let next = match current {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => items.get_mut(parse_index(token, path)?),
            _ => None,
        };
        next.ok_or_else(|| PatchError::PathNotFound(path.to_string()))
    })
}

/// Split a JSON pointer into unescaped reference tokens.
fn parse_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| PatchError::InvalidPointer(pointer.to_string()))?;
    rest.split('/')
        .map(|token| {
            if token.contains('~') && !valid_escapes(token) {
                return Err(PatchError::InvalidPointer(pointer.to_string()));
            }
            Ok(token.replace("~1", "/").replace("~0", "~"))
        })
        .collect()
}

fn valid_escapes(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'~')
        .all(|(i, _)| matches!(bytes.get(i + 1), Some(b'0') | Some(b'1')))
}

/// Array indices are decimal without leading zeros.
fn parse_index(token: &str, path: &str) -> Result<usize, PatchError> {
    let well_formed = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !well_formed {
        return Err(PatchError::InvalidIndex {
            path: path.to_string(),
            index: token.to_string(),
        });
    }
    token.parse().map_err(|_| PatchError::InvalidIndex {
        path: path.to_string(),
        index: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(ops: Value) -> Vec<PatchOperation> {
        serde_json::from_value(ops).unwrap()
    }

    #[test]
    fn add_object_member_and_array_element() {
        let mut doc = json!({"deps": ["a"]});
        apply(
            &mut doc,
            &patch(json!([
                {"op": "add", "path": "/name", "value": "pkg"},
                {"op": "add", "path": "/deps/-", "value": "c"},
                {"op": "add", "path": "/deps/1", "value": "b"}
            ])),
        )
        .unwrap();
        assert_eq!(doc, json!({"name": "pkg", "deps": ["a", "b", "c"]}));
    }

    #[test]
    fn add_at_root_replaces_document() {
        let mut doc = json!({"a": 1});
        apply(&mut doc, &patch(json!([{"op": "add", "path": "", "value": [1]}]))).unwrap();
        assert_eq!(doc, json!([1]));
    }

    #[test]
    fn remove_and_replace() {
        let mut doc = json!({"a": 1, "b": [1, 2, 3]});
        apply(
            &mut doc,
            &patch(json!([
                {"op": "remove", "path": "/a"},
                {"op": "replace", "path": "/b/0", "value": 9},
                {"op": "remove", "path": "/b/2"}
            ])),
        )
        .unwrap();
        assert_eq!(doc, json!({"b": [9, 2]}));
    }

    #[test]
    fn replace_missing_is_error() {
        let mut doc = json!({});
        let err = apply(
            &mut doc,
            &patch(json!([{"op": "replace", "path": "/x", "value": 1}])),
        )
        .unwrap_err();
        assert_eq!(err, PatchError::PathNotFound("/x".into()));
    }

    #[test]
    fn move_and_copy() {
        let mut doc = json!({"a": {"b": 1}, "c": []});
        apply(
            &mut doc,
            &patch(json!([
                {"op": "copy", "from": "/a/b", "path": "/c/0"},
                {"op": "move", "from": "/a", "path": "/d"}
            ])),
        )
        .unwrap();
        assert_eq!(doc, json!({"c": [1], "d": {"b": 1}}));
    }

    #[test]
    fn move_into_child_rejected() {
        let mut doc = json!({"a": {"b": 1}});
        let err = apply(
            &mut doc,
            &patch(json!([{"op": "move", "from": "/a", "path": "/a/b/c"}])),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::MoveIntoChild { .. }));
    }

    #[test]
    fn failed_test_leaves_document_untouched() {
        let mut doc = json!({"version": "1"});
        let err = apply(
            &mut doc,
            &patch(json!([
                {"op": "replace", "path": "/version", "value": "2"},
                {"op": "test", "path": "/version", "value": "3"}
            ])),
        )
        .unwrap_err();
        assert_eq!(err, PatchError::TestFailed("/version".into()));
        assert_eq!(doc, json!({"version": "1"}));
    }

    #[test]
    fn escaped_tokens() {
        let mut doc = json!({"a/b": 1, "m~n": 2});
        apply(
            &mut doc,
            &patch(json!([
                {"op": "test", "path": "/a~1b", "value": 1},
                {"op": "remove", "path": "/m~0n"}
            ])),
        )
        .unwrap();
        assert_eq!(doc, json!({"a/b": 1}));
    }

    #[test]
    fn invalid_pointers_and_indices() {
        let mut doc = json!({"a": [1]});
        assert!(matches!(
            apply(&mut doc, &patch(json!([{"op": "remove", "path": "a"}]))),
            Err(PatchError::InvalidPointer(_))
        ));
        assert!(matches!(
            apply(&mut doc, &patch(json!([{"op": "remove", "path": "/a/01"}]))),
            Err(PatchError::InvalidIndex { .. })
        ));
        assert!(matches!(
            apply(&mut doc, &patch(json!([{"op": "add", "path": "/a/5", "value": 0}]))),
            Err(PatchError::InvalidIndex { .. })
        ));
        assert!(matches!(
            apply(&mut doc, &patch(json!([{"op": "remove", "path": "/~2"}]))),
            Err(PatchError::InvalidPointer(_))
        ));
        assert_eq!(
            apply(&mut doc, &patch(json!([{"op": "remove", "path": ""}]))),
            Err(PatchError::RemoveRoot)
        );
    }

    #[test]
    fn operations_deserialize_from_rfc_form() {
        let ops = patch(json!([{"op": "move", "from": "/a", "path": "/b"}]));
        assert_eq!(
            ops,
            vec![PatchOperation::Move {
                from: "/a".into(),
                path: "/b".into()
            }]
        );
        assert_eq!(ops[0].path(), "/b");
    }
}
