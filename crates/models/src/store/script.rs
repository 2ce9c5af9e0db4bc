//! Conditional updates executed by the store against a single document.
//!
//! Script sources are part of the wire protocol with the store. Change them
//! only together with [`SCRIPT_VERSION`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::models::article::Content;

/// Revision of the script sources below.
pub const SCRIPT_VERSION: u32 = 2;

/// Replace content of a draft, if it is locked by `params.username`.
pub const SAVE_IF_OWNER: &str = "\
if (ctx._source.locked_by != params.username) { \
    ctx.op = 'none' \
} else { \
    ctx._source.headline = params.headline; \
    ctx._source.summary = params.summary; \
    ctx._source.content = params.content; \
    ctx._source.tag = params.tag; \
    ctx._source.note = params.note; \
    ctx._source.revised_at = params.revised_at; \
    ctx._source.revised_by = params.username \
}";

/// Mark a draft as revised by `params.username` without changing its content
/// or revision instant, if it is locked by that user.
pub const TOUCH_IF_OWNER: &str = "\
if (ctx._source.locked_by != params.username) { \
    ctx.op = 'none' \
} else { \
    ctx._source.revised_by = params.username \
}";

/// Delete a draft, if it is locked by `params.username`.
pub const DELETE_IF_OWNER: &str = "\
if (ctx._source.locked_by != params.username) { \
    ctx.op = 'none' \
} else { \
    ctx.op = 'delete' \
}";

/// Delete a draft, if it is locked by `params.username` and was not revised
/// since `params.revised_at`.
pub const DELETE_IF_UNCHANGED: &str = "\
if (ctx._source.locked_by != params.username) { \
    ctx.op = 'none' \
} else if (ctx._source.revised_at != params.revised_at) { \
    ctx.op = 'none' \
} else { \
    ctx.op = 'delete' \
}";

/// A conditional update of a draft, guarded by its `locked_by` field.
#[derive(Clone, Debug)]
pub enum Script {
    SaveIfOwner {
        username: String,
        content: Content,
        revised_at: DateTime<Utc>,
    },
    TouchIfOwner {
        username: String,
    },
    DeleteIfOwner {
        username: String,
    },
    DeleteIfUnchanged {
        username: String,
        revised_at: Option<DateTime<Utc>>,
    },
}

/// What a script decided to do with a document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Updated,
    Deleted,
    Noop,
}

impl Script {
    /// Name of this script, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Script::SaveIfOwner { .. } => "save-if-owner",
            Script::TouchIfOwner { .. } => "touch-if-owner",
            Script::DeleteIfOwner { .. } => "delete-if-owner",
            Script::DeleteIfUnchanged { .. } => "delete-if-unchanged",
        }
    }

    /// Painless source of this script.
    pub fn source(&self) -> &'static str {
        match self {
            Script::SaveIfOwner { .. } => SAVE_IF_OWNER,
            Script::TouchIfOwner { .. } => TOUCH_IF_OWNER,
            Script::DeleteIfOwner { .. } => DELETE_IF_OWNER,
            Script::DeleteIfUnchanged { .. } => DELETE_IF_UNCHANGED,
        }
    }

    /// Parameters passed to [`Script::source`].
    pub fn params(&self) -> Value {
        match self {
            Script::SaveIfOwner { username, content, revised_at } => json!({
                "username": username,
                "headline": content.headline,
                "summary": content.summary,
                "content": content.content,
                "tag": content.tag,
                "note": content.note,
                "revised_at": revised_at,
            }),
            Script::TouchIfOwner { username } | Script::DeleteIfOwner { username } => json!({
                "username": username,
            }),
            Script::DeleteIfUnchanged { username, revised_at } => json!({
                "username": username,
                "revised_at": revised_at,
            }),
        }
    }

    fn username(&self) -> &str {
        match self {
            Script::SaveIfOwner { username, .. }
            | Script::TouchIfOwner { username }
            | Script::DeleteIfOwner { username }
            | Script::DeleteIfUnchanged { username, .. } => username,
        }
    }

    /// Run this script against a document's source in-process, exactly as
    /// the store would.
    pub fn apply(&self, source: &mut Map<String, Value>) -> Outcome {
        let owner = source.get("locked_by").and_then(Value::as_str);

        if owner != Some(self.username()) {
            return Outcome::Noop;
        }

        let params = match self {
            Script::DeleteIfOwner { .. } => return Outcome::Deleted,
            Script::DeleteIfUnchanged { .. } => {
                let params = self.params();
                let current = source.get("revised_at").unwrap_or(&Value::Null);
                return if *current == params["revised_at"] {
                    Outcome::Deleted
                } else {
                    Outcome::Noop
                };
            }
            _ => self.params(),
        };

        if let Value::Object(params) = params {
            for (field, value) in params {
                if field == "username" {
                    source.insert("revised_by".to_string(), value);
                } else {
                    source.insert(field, value);
                }
            }
        }

        Outcome::Updated
    }
}
