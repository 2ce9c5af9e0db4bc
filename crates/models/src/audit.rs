//! Audit trail of changes made to articles and logins.
//!
//! Records are written as single-line JSON objects to the [`TARGET`] log
//! target, from where they can be routed independently of other logs.

use log::{error, info};
use serde::Serialize;
use std::fmt;

/// Log target of audit records.
pub const TARGET: &str = "newsdesk::audit";

/// Entity responsible for an action.
#[derive(Clone, Copy, Debug)]
pub enum Actor<'a> {
    /// Actions invoked from the CLI.
    System,
    /// A logged-in user.
    User(&'a str),
}

impl<'a> Actor<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Actor::System => "system",
            Actor::User(name) => name,
        }
    }
}

impl<'a> From<&'a str> for Actor<'a> {
    fn from(name: &'a str) -> Self {
        Actor::User(name)
    }
}

impl<'a> Serialize for Actor<'a> {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(self.name())
    }
}

/// An action on an article.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    Edit,
    Save,
    SubmitSelf,
    SubmitOther,
    DiscardSelf,
    DiscardOther,
    Publish,
    Unpublish,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Save => "save",
            Action::SubmitSelf => "submit-self",
            Action::SubmitOther => "submit-other",
            Action::DiscardSelf => "discard-self",
            Action::DiscardOther => "discard-other",
            Action::Publish => "publish",
            Action::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct ArticleRecord<'a> {
    audit: &'static str,
    action: Action,
    user: Actor<'a>,
    article_guid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    article_version: Option<i64>,
}

#[derive(Serialize)]
struct LoginRecord<'a> {
    audit: &'static str,
    action: &'a str,
    user: Actor<'a>,
    login: &'a str,
}

/// Record a successful action on an article.
pub fn article(actor: Actor, action: Action, guid: &str, version: Option<i64>) {
    emit(&ArticleRecord {
        audit: "article",
        action,
        user: actor,
        article_guid: guid,
        article_version: version,
    });
}

/// Record a change to a login.
pub fn login(actor: Actor, action: &str, username: &str) {
    emit(&LoginRecord {
        audit: "login",
        action,
        user: actor,
        login: username,
    });
}

fn emit<T: Serialize>(record: &T) {
    match serde_json::to_string(record) {
        Ok(line) => info!(target: TARGET, "{}", line),
        Err(err) => error!("Cannot serialize audit record: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn article_records_carry_all_fields() {
        let record = ArticleRecord {
            audit: "article",
            action: Action::SubmitOther,
            user: Actor::User("bob"),
            article_guid: "g",
            article_version: Some(12),
        };

        assert_eq!(serde_json::to_value(&record).unwrap(), json!({
            "audit": "article",
            "action": "submit-other",
            "user": "bob",
            "article_guid": "g",
            "article_version": 12,
        }));
    }

    #[test]
    fn action_names_match_serialization() {
        for action in &[Action::Create, Action::DiscardSelf, Action::Unpublish] {
            assert_eq!(serde_json::to_value(action).unwrap(), json!(action.as_str()));
        }
    }
}
