use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::VersionId;

/// An article, as stored in any of the draft, version, and publish
/// partitions.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Article {
    /// Key of this document within its partition.
    #[serde(default)]
    pub id: String,
    /// Identifier of the logical article, shared by all its documents.
    #[serde(default)]
    pub guid: String,
    /// Version number, present only on versions and published copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Version this document was derived from. Absent (or zero) for articles
    /// which have never been submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<i64>,
    #[serde(flatten)]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_by: Option<String>,
    /// User allowed to modify this draft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
}

/// Editable fields of an article.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub headline: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

impl Article {
    /// A new, empty draft locked to its creator.
    pub fn new_draft(guid: &str, user: &str, now: DateTime<Utc>) -> Article {
        Article {
            id: guid.to_string(),
            guid: guid.to_string(),
            created_at: Some(now),
            created_by: Some(user.to_string()),
            locked_by: Some(user.to_string()),
            .. Article::default()
        }
    }

    /// Has this article never been submitted?
    pub fn is_new(&self) -> bool {
        self.from_version.map_or(true, |v| v == 0)
    }

    /// Identifier of this version, if this is a version.
    pub fn version_id(&self) -> Option<VersionId> {
        self.version.map(|version| VersionId {
            guid: self.guid.clone(),
            version,
        })
    }

    /// User who last changed this article's content.
    pub fn last_author(&self) -> Option<&str> {
        self.revised_by.as_ref()
            .or_else(|| self.created_by.as_ref())
            .map(String::as_str)
    }

    /// Copy of this article with all content removed.
    pub fn stripped(&self) -> Article {
        Article {
            content: Content::default(),
            .. self.clone()
        }
    }
}
