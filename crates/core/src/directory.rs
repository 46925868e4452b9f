use std::collections::HashMap;

use thiserror::Error;

/// One entry of the workspace membership listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown user identifier `{id}`")]
    UnknownIdentifier { id: String },
}

/// Mapping from opaque user identifier to display name.
///
/// Built once at startup from a full membership listing and read-only for
/// the rest of the session; callers share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct UserDirectory {
    names: HashMap<String, String>,
}

impl UserDirectory {
    pub fn from_members(members: Vec<Member>) -> Self {
        let mut names = HashMap::with_capacity(members.len());
        for member in members {
            names.insert(member.id, member.display_name);
        }
        Self { names }
    }

    /// Pure lookup; absence is a recoverable failure, never a panic.
    pub fn resolve(&self, id: &str) -> Result<&str, DirectoryError> {
        self.names
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| DirectoryError::UnknownIdentifier { id: id.to_owned() })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
