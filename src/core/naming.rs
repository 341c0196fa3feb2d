//! core::naming
//!
//! Ref naming rules.
//!
//! The Git Data API is inconsistent about ref spelling: creating a ref wants
//! the fully qualified `refs/heads/<name>` form, while updating one wants
//! `heads/<name>`. Callers may pass either a bare branch name or an already
//! qualified ref; these helpers add a prefix only when it is absent.
//!
//! # Example
//!
//! ```
//! use forgepipe::core::naming::{branch_name, create_ref, update_ref};
//!
//! assert_eq!(create_ref("feat"), "refs/heads/feat");
//! assert_eq!(create_ref("refs/heads/feat"), "refs/heads/feat");
//! assert_eq!(update_ref("feat"), "heads/feat");
//! assert_eq!(update_ref("refs/heads/feat"), "heads/feat");
//! assert_eq!(branch_name("heads/feat"), "feat");
//! ```

const REFS_PREFIX: &str = "refs/";
const HEADS_PREFIX: &str = "heads/";

/// Normalize a branch name or ref to the form used when creating a ref.
pub fn create_ref(name: &str) -> String {
    if name.starts_with(REFS_PREFIX) {
        name.to_string()
    } else if name.starts_with(HEADS_PREFIX) {
        format!("{}{}", REFS_PREFIX, name)
    } else {
        format!("{}{}{}", REFS_PREFIX, HEADS_PREFIX, name)
    }
}

/// Normalize a branch name or ref to the form used when updating a ref.
pub fn update_ref(name: &str) -> String {
    let name = name.strip_prefix(REFS_PREFIX).unwrap_or(name);
    if name.starts_with(HEADS_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", HEADS_PREFIX, name)
    }
}

/// Strip any ref qualification, leaving the bare branch name.
///
/// Branch reads and pull request heads take the bare name.
pub fn branch_name(name: &str) -> &str {
    let name = name.strip_prefix(REFS_PREFIX).unwrap_or(name);
    name.strip_prefix(HEADS_PREFIX).unwrap_or(name)
}
