//! One place computing the per-user on-disk layout.
//!
//! ```text
//! <data_dir>/users/<user_id>/
//!   sessions/<session_id>.jsonl     append-only context log per conversation
//!   memory.md                       long-term memory document
//!   audit/YYYY-MM-DD.jsonl          date-partitioned audit log
//!   events/*.json                   dropped trigger files
//!   heartbeat.txt                   schedule document
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct UserPaths {
    root: PathBuf,
}

impl UserPaths {
    pub fn new(data_dir: impl AsRef<Path>, user_id: &str) -> Self {
        Self {
            root: data_dir.as_ref().join("users").join(sanitize(user_id)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn context_log(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.jsonl", sanitize(session_id)))
    }

    pub fn memory_doc(&self) -> PathBuf {
        self.root.join("memory.md")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    pub fn events_dir(&self) -> PathBuf {
        self.root.join("events")
    }

    pub fn heartbeat_doc(&self) -> PathBuf {
        self.root.join("heartbeat.txt")
    }
}

/// Session ids and user ids may contain characters that are separators on
/// disk.  Collapse them so every id maps to a flat filename.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_per_user() {
        let paths = UserPaths::new("/data", "user-1");
        assert_eq!(paths.root(), Path::new("/data/users/user-1"));
        assert_eq!(paths.memory_doc(), Path::new("/data/users/user-1/memory.md"));
        assert_eq!(paths.heartbeat_doc(), Path::new("/data/users/user-1/heartbeat.txt"));
    }

    #[test]
    fn session_id_separators_are_flattened() {
        let paths = UserPaths::new("/data", "u");
        let log = paths.context_log("telegram:chat-42:7");
        assert_eq!(
            log.file_name().unwrap().to_str().unwrap(),
            "telegram_chat-42_7.jsonl"
        );
    }

    #[test]
    fn sanitized_ids_stay_deterministic() {
        let paths = UserPaths::new("/data", "u");
        assert_eq!(paths.context_log("a:b"), paths.context_log("a:b"));
    }
}
