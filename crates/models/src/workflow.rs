//! The article workflow engine.
//!
//! Every operation touching a draft or a published copy holds the
//! in-process lock for that article from before its first store call until
//! it returns. Requests arriving at other processes are ordered only by the
//! store: create-only writes and owner-checked scripts.

use failure::Fail;
use log::{error, warn};
use newsdesk_error::ApiError;
use newsdesk_macros::From;

use crate::{
    audit::{self, Action, Actor},
    listing::{self, ArticleSet, GetArticleError, ListError, ListPage, ListQuery},
    lock::LockRegistry,
    models::{Article, Content},
    permissions::Roles,
    store::{
        Created,
        Deleted,
        Partition,
        Refresh,
        Script,
        Store,
        StoreError,
        Updated,
    },
    version::{self, ParseVersionIdError, VersionId},
};

/// Article workflow over a document store.
///
/// A single instance should be shared by all request handlers of a process.
/// Separate instances over one store behave like separate processes.
pub struct Workflow {
    store: Box<dyn Store>,
    drafts: LockRegistry,
    publishes: LockRegistry,
}

impl Workflow {
    pub fn new(store: Box<dyn Store>) -> Workflow {
        Workflow {
            store,
            drafts: LockRegistry::new(),
            publishes: LockRegistry::new(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        &*self.store
    }

    /// Locks on drafts, keyed by article guid.
    pub fn draft_locks(&self) -> &LockRegistry {
        &self.drafts
    }

    /// Locks on published copies, keyed by article guid.
    pub fn publish_locks(&self) -> &LockRegistry {
        &self.publishes
    }

    /// Create a new, empty article.
    pub fn create(&self, user: &str) -> Result<Article, WorkflowError> {
        logged(user, Action::Create, None, self.do_create(user))
    }

    fn do_create(&self, user: &str) -> Result<Article, WorkflowError> {
        let guid = self.store.next_id();
        let draft = Article::new_draft(&guid, user, version::now());
        let doc = serde_json::to_value(&draft)?;

        match self.store.create(Partition::Draft, &guid, &doc, Refresh::WaitFor)? {
            Created::Created => (),
            Created::Conflict => return Err(WorkflowError::IdCollision(guid)),
        }

        audit::article(Actor::User(user), Action::Create, &guid, None);

        Ok(draft)
    }

    /// Re-open version `id` for editing as a new draft.
    ///
    /// Users lacking [`Roles::ARTICLE_EDIT_OTHER`] may only re-open versions
    /// they authored.
    pub fn edit(&self, user: &str, roles: Roles, id: &str)
    -> Result<Article, WorkflowError> {
        logged(user, Action::Edit, Some(id), self.do_edit(user, roles, id))
    }

    fn do_edit(&self, user: &str, roles: Roles, id: &str)
    -> Result<Article, WorkflowError> {
        let id = id.parse::<VersionId>()?;

        let handle = self.drafts.acquire(&id.guid);
        let _guard = handle.lock();

        let source = self.load(Partition::Version, &id.to_string())?;

        if source.last_author() != Some(user)
        && !roles.contains(Roles::ARTICLE_EDIT_OTHER) {
            return Err(WorkflowError::EditForbidden(id));
        }

        let draft = Article {
            id: id.guid.clone(),
            guid: id.guid.clone(),
            version: None,
            from_version: Some(id.version),
            revised_at: Some(version::now()),
            revised_by: Some(user.to_string()),
            locked_by: Some(user.to_string()),
            .. source
        };
        let doc = serde_json::to_value(&draft)?;

        match self.store.create(Partition::Draft, &id.guid, &doc, Refresh::WaitFor)? {
            Created::Created => (),
            Created::Conflict => {
                let owner = match self.store.get(Partition::Draft, &id.guid, true)? {
                    Some(doc) => doc.parse::<Article>()?.locked_by,
                    None => None,
                }.unwrap_or_else(|| "nobody".to_string());

                return Err(WorkflowError::DraftExists {
                    guid: id.guid,
                    owner,
                });
            }
        }

        audit::article(Actor::User(user), Action::Edit, &id.guid, Some(id.version));

        Ok(draft)
    }

    /// Replace content of a draft locked by `user`.
    pub fn save(&self, user: &str, guid: &str, content: Content)
    -> Result<Article, WorkflowError> {
        logged(user, Action::Save, Some(guid), self.do_save(user, guid, content))
    }

    fn do_save(&self, user: &str, guid: &str, content: Content)
    -> Result<Article, WorkflowError> {
        let handle = self.drafts.acquire(guid);
        let _guard = handle.lock();

        self.update_owned(guid, &Script::SaveIfOwner {
            username: user.to_string(),
            content,
            revised_at: version::now(),
        }, Refresh::WaitFor)?;

        let draft = self.load(Partition::Draft, guid)?;

        audit::article(Actor::User(user), Action::Save, guid, None);

        Ok(draft)
    }

    /// Submit a draft locked by `user` as a new version, optionally saving
    /// `content` into it first.
    ///
    /// Returns the new version without its content.
    pub fn submit_self(&self, user: &str, guid: &str, content: Option<Content>)
    -> Result<Article, WorkflowError> {
        logged(user, Action::SubmitSelf, Some(guid),
            self.do_submit_self(user, guid, content))
    }

    fn do_submit_self(&self, user: &str, guid: &str, content: Option<Content>)
    -> Result<Article, WorkflowError> {
        let handle = self.drafts.acquire(guid);
        let _guard = handle.lock();

        let script = match content {
            Some(content) => Script::SaveIfOwner {
                username: user.to_string(),
                content,
                revised_at: version::now(),
            },
            None => Script::TouchIfOwner { username: user.to_string() },
        };
        self.update_owned(guid, &script, Refresh::No)?;

        let draft = self.load(Partition::Draft, guid)?;
        let version = self.promote(user, guid, draft)?;

        audit::article(Actor::User(user), Action::SubmitSelf, guid, version.version);

        Ok(version)
    }

    /// Submit a draft regardless of who holds its lock.
    ///
    /// Returns the new version without its content.
    pub fn submit_other(&self, user: &str, guid: &str)
    -> Result<Article, WorkflowError> {
        logged(user, Action::SubmitOther, Some(guid), self.do_submit_other(user, guid))
    }

    fn do_submit_other(&self, user: &str, guid: &str)
    -> Result<Article, WorkflowError> {
        let handle = self.drafts.acquire(guid);
        let _guard = handle.lock();

        let draft = self.load(Partition::Draft, guid)?;

        if draft.locked_by.is_none() {
            return Err(WorkflowError::DraftUnlocked(guid.to_string()));
        }

        let version = self.promote(user, guid, draft)?;

        audit::article(Actor::User(user), Action::SubmitOther, guid, version.version);

        Ok(version)
    }

    /// Delete a draft locked by `user`.
    pub fn discard_self(&self, user: &str, guid: &str) -> Result<(), WorkflowError> {
        logged(user, Action::DiscardSelf, Some(guid), self.do_discard_self(user, guid))
    }

    fn do_discard_self(&self, user: &str, guid: &str) -> Result<(), WorkflowError> {
        let handle = self.drafts.acquire(guid);
        let _guard = handle.lock();

        let script = Script::DeleteIfOwner { username: user.to_string() };

        match self.store.update_with_script(
            Partition::Draft, guid, &script, Refresh::WaitFor)?
        {
            Updated::Deleted => (),
            Updated::Noop => return Err(WorkflowError::Locked(guid.to_string())),
            Updated::NotFound => return Err(WorkflowError::NotFound(guid.to_string())),
            outcome => return Err(WorkflowError::UnexpectedOutcome(script.name(), outcome)),
        }

        audit::article(Actor::User(user), Action::DiscardSelf, guid, None);

        Ok(())
    }

    /// Delete a draft regardless of who holds its lock.
    pub fn discard_other(&self, user: &str, guid: &str) -> Result<(), WorkflowError> {
        logged(user, Action::DiscardOther, Some(guid), self.do_discard_other(user, guid))
    }

    fn do_discard_other(&self, user: &str, guid: &str) -> Result<(), WorkflowError> {
        let handle = self.drafts.acquire(guid);
        let _guard = handle.lock();

        match self.store.delete(Partition::Draft, guid, Refresh::WaitFor)? {
            Deleted::Deleted => (),
            Deleted::NotFound => return Err(WorkflowError::NotFound(guid.to_string())),
        }

        audit::article(Actor::User(user), Action::DiscardOther, guid, None);

        Ok(())
    }

    /// Make version `id` the published copy of its article.
    pub fn publish(&self, user: &str, id: &str) -> Result<Article, WorkflowError> {
        logged(user, Action::Publish, Some(id), self.do_publish(user, id))
    }

    fn do_publish(&self, user: &str, id: &str) -> Result<Article, WorkflowError> {
        let id = id.parse::<VersionId>()?;

        let handle = self.publishes.acquire(&id.guid);
        let _guard = handle.lock();

        let version = self.load(Partition::Version, &id.to_string())?;
        let published = Article {
            id: id.guid.clone(),
            guid: id.guid.clone(),
            locked_by: None,
            .. version
        };
        let doc = serde_json::to_value(&published)?;

        self.store.upsert(Partition::Publish, &id.guid, &doc, Refresh::WaitFor)?;

        audit::article(Actor::User(user), Action::Publish, &id.guid, Some(id.version));

        Ok(published)
    }

    /// Remove the published copy of an article.
    pub fn unpublish(&self, user: &str, guid: &str) -> Result<(), WorkflowError> {
        logged(user, Action::Unpublish, Some(guid), self.do_unpublish(user, guid))
    }

    fn do_unpublish(&self, user: &str, guid: &str) -> Result<(), WorkflowError> {
        let handle = self.publishes.acquire(guid);
        let _guard = handle.lock();

        match self.store.delete(Partition::Publish, guid, Refresh::WaitFor)? {
            Deleted::Deleted => (),
            Deleted::NotFound => return Err(WorkflowError::NotFound(guid.to_string())),
        }

        audit::article(Actor::User(user), Action::Unpublish, guid, None);

        Ok(())
    }

    /// Get all documents of an article.
    pub fn get(&self, guid: &str) -> Result<ArticleSet, GetArticleError> {
        listing::get(&*self.store, guid)
    }

    /// List recently created articles.
    pub fn list(&self, query: &ListQuery) -> Result<ListPage, ListError> {
        listing::list(&*self.store, query)
    }

    /// Load and parse a single article document.
    fn load(&self, partition: Partition, id: &str) -> Result<Article, WorkflowError> {
        match self.store.get(partition, id, true)? {
            Some(doc) => Ok(doc.parse()?),
            None => Err(WorkflowError::NotFound(id.to_string())),
        }
    }

    /// Run a script which updates a draft only when its caller owns it.
    fn update_owned(&self, guid: &str, script: &Script, refresh: Refresh)
    -> Result<(), WorkflowError> {
        match self.store.update_with_script(Partition::Draft, guid, script, refresh)? {
            Updated::Updated => Ok(()),
            Updated::Noop => Err(WorkflowError::Locked(guid.to_string())),
            Updated::NotFound => Err(WorkflowError::NotFound(guid.to_string())),
            outcome => Err(WorkflowError::UnexpectedOutcome(script.name(), outcome)),
        }
    }

    /// Turn a draft into a new version and delete the draft.
    ///
    /// The version's identifier derives from the draft's last revision, so
    /// concurrent promotions of one draft collide on create. The caller must
    /// hold the draft's lock.
    fn promote(&self, user: &str, guid: &str, draft: Article)
    -> Result<Article, WorkflowError> {
        let revised_at = draft.revised_at
            .or(draft.created_at)
            .unwrap_or_else(version::now);
        let id = VersionId::for_revision(guid, &revised_at);
        let owner = draft.locked_by.clone();
        let cleanup = Script::DeleteIfUnchanged {
            username: owner.clone().unwrap_or_default(),
            revised_at: draft.revised_at,
        };

        let mut version = Article {
            id: id.to_string(),
            guid: guid.to_string(),
            version: Some(id.version),
            locked_by: None,
            .. draft
        };

        if version.is_new() {
            version.created_by = version.created_by.take()
                .or(owner)
                .or_else(|| Some(user.to_string()));
            version.created_at = Some(revised_at);
            version.revised_at = None;
            version.revised_by = None;
        } else {
            version.revised_at = Some(revised_at);
            version.revised_by = Some(user.to_string());
        }

        let doc = serde_json::to_value(&version)?;

        match self.store.create(Partition::Version, &version.id, &doc, Refresh::No)? {
            Created::Created => (),
            Created::Conflict => return Err(WorkflowError::VersionExists(id)),
        }

        // Another process may have changed or removed the draft since it was
        // loaded. Only the promoted revision is deleted, otherwise the new
        // version is removed again.
        match self.store.update_with_script(
            Partition::Draft, guid, &cleanup, Refresh::WaitFor)
        {
            Ok(Updated::Deleted) => Ok(version.stripped()),
            Ok(Updated::Noop) | Ok(Updated::NotFound) => {
                warn!("Draft {} changed while being submitted as {}, rolling back",
                    guid, id);
                self.roll_back(id)
            }
            Ok(outcome) => Err(WorkflowError::UnexpectedOutcome(cleanup.name(), outcome)),
            Err(err) => Err(WorkflowError::PartialSubmit(id, err)),
        }
    }

    /// Remove a version whose draft could not be claimed.
    fn roll_back(&self, id: VersionId) -> Result<Article, WorkflowError> {
        match self.store.delete(Partition::Version, &id.to_string(), Refresh::WaitFor) {
            Ok(_) => Err(WorkflowError::DraftChanged(id.guid)),
            Err(err) => Err(WorkflowError::Rollback(id, err)),
        }
    }
}

/// Log a failed operation along with who attempted it and on what.
fn logged<T>(user: &str, action: Action, target: Option<&str>, result: Result<T, WorkflowError>)
-> Result<T, WorkflowError> {
    if let Err(ref err) = result {
        let target = target.unwrap_or("-");

        if err.status().is_server_error() {
            error!("{} by {} on {} failed: {}", action, user, target, err);
        } else {
            warn!("{} by {} on {} refused: {}", action, user, target, err);
        }
    }

    result
}

#[derive(ApiError, Debug, Fail, From)]
pub enum WorkflowError {
    #[api(code = "article:not-found", status = "NOT_FOUND")]
    #[fail(display = "article {} not found", _0)]
    NotFound(String),
    /// Draft is locked by another user.
    #[api(code = "article:locked", status = "FORBIDDEN")]
    #[fail(display = "draft {} is locked by another user", _0)]
    Locked(String),
    #[api(code = "article:edit:forbidden", status = "FORBIDDEN")]
    #[fail(display = "version {} was last revised by another user", _0)]
    EditForbidden(VersionId),
    #[api(code = "article:draft:exists", status = "CONFLICT")]
    #[fail(display = "article {} is already being edited by {}", guid, owner)]
    DraftExists {
        guid: String,
        owner: String,
    },
    #[api(code = "article:draft:unlocked", status = "CONFLICT")]
    #[fail(display = "draft {} is not locked by anybody", _0)]
    DraftUnlocked(String),
    #[api(internal)]
    #[fail(display = "store generated an id already in use: {}", _0)]
    IdCollision(String),
    #[api(internal)]
    #[fail(display = "version {} already exists", _0)]
    VersionExists(VersionId),
    #[api(internal)]
    #[fail(display = "version {} was created but its draft could not be deleted: {}",
        _0, _1)]
    PartialSubmit(VersionId, #[cause] StoreError),
    #[api(code = "article:draft:changed", status = "CONFLICT")]
    #[fail(display = "draft {} changed while being submitted", _0)]
    DraftChanged(String),
    #[api(internal)]
    #[fail(display = "version {} could not be removed after its draft changed: {}",
        _0, _1)]
    Rollback(VersionId, #[cause] StoreError),
    #[api(internal)]
    #[fail(display = "script {} had unexpected outcome {:?}", _0, _1)]
    UnexpectedOutcome(&'static str, Updated),
    #[fail(display = "{}", _0)]
    BadId(#[cause] #[from] ParseVersionIdError),
    #[api(internal)]
    #[fail(display = "malformed article: {}", _0)]
    Json(#[cause] #[from] serde_json::Error),
    #[fail(display = "{}", _0)]
    Store(#[cause] #[from] StoreError),
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use std::{sync::{Arc, Barrier}, thread};
    use crate::store::{Document, Health, Hit, MemoryStore, Search};
    use super::*;

    /// A memory store which cannot remove drafts by script.
    struct FailingDraftDeletes(MemoryStore);

    impl Store for FailingDraftDeletes {
        fn next_id(&self) -> String {
            self.0.next_id()
        }

        fn get(&self, partition: Partition, id: &str, realtime: bool)
        -> Result<Option<Document>, StoreError> {
            self.0.get(partition, id, realtime)
        }

        fn create(&self, partition: Partition, id: &str, doc: &Value, refresh: Refresh)
        -> Result<Created, StoreError> {
            self.0.create(partition, id, doc, refresh)
        }

        fn upsert(&self, partition: Partition, id: &str, doc: &Value, refresh: Refresh)
        -> Result<(), StoreError> {
            self.0.upsert(partition, id, doc, refresh)
        }

        fn update_with_script(
            &self,
            partition: Partition,
            id: &str,
            script: &Script,
            refresh: Refresh,
        ) -> Result<Updated, StoreError> {
            match script {
                Script::DeleteIfUnchanged { .. } =>
                    Err(StoreError::Response("connection reset".into())),
                _ => self.0.update_with_script(partition, id, script, refresh),
            }
        }

        fn delete(&self, partition: Partition, id: &str, refresh: Refresh)
        -> Result<Deleted, StoreError> {
            self.0.delete(partition, id, refresh)
        }

        fn search(&self, search: &Search) -> Result<Vec<Hit>, StoreError> {
            self.0.search(search)
        }

        fn health(&self) -> Result<Health, StoreError> {
            self.0.health()
        }

        fn init(&self) -> Result<(), StoreError> {
            self.0.init()
        }

        fn drop_all(&self) -> Result<(), StoreError> {
            self.0.drop_all()
        }
    }

    fn engine() -> (Workflow, MemoryStore) {
        let store = MemoryStore::new();
        (Workflow::new(Box::new(store.clone())), store)
    }

    fn headline(text: &str) -> Content {
        Content {
            headline: text.to_string(),
            .. Content::default()
        }
    }

    fn stored(store: &MemoryStore, partition: Partition, id: &str) -> Option<Article> {
        store.get(partition, id, true).unwrap().map(|doc| doc.parse().unwrap())
    }

    /// Create, save, and submit an article as alice.
    fn first_version(flow: &Workflow) -> Article {
        let draft = flow.create("alice").unwrap();
        flow.save("alice", &draft.guid, headline("X")).unwrap();
        flow.submit_self("alice", &draft.guid, None).unwrap()
    }

    #[test]
    fn submitting_new_article_creates_first_version() {
        let (flow, store) = engine();
        let draft = flow.create("alice").unwrap();
        assert_eq!(draft.id, draft.guid);
        assert_eq!(draft.locked_by.as_ref().map(String::as_str), Some("alice"));

        flow.save("alice", &draft.guid, headline("X")).unwrap();
        let version = flow.submit_self("alice", &draft.guid, None).unwrap();

        assert!(stored(&store, Partition::Draft, &draft.guid).is_none());
        assert_eq!(version.content, Content::default());
        assert_eq!(version.id, format!("{}:{}", draft.guid, version.version.unwrap()));

        let saved = stored(&store, Partition::Version, &version.id).unwrap();
        assert_eq!(saved.content.headline, "X");
        assert_eq!(saved.created_by.as_ref().map(String::as_str), Some("alice"));
        assert!(saved.revised_by.is_none());
        assert!(saved.revised_at.is_none());
        assert!(saved.locked_by.is_none());
        assert_eq!(saved.created_at.unwrap().timestamp_nanos(), saved.version.unwrap());
    }

    #[test]
    fn submitting_reopened_version_for_another_user() {
        let (flow, store) = engine();
        let v1 = first_version(&flow);

        let draft = flow.edit("alice", Roles::ARTICLE_EDIT_SELF, &v1.id).unwrap();
        assert_eq!(draft.from_version, v1.version);
        assert_eq!(draft.content.headline, "X");

        let v2 = flow.submit_other("bob", &v1.guid).unwrap();
        assert_ne!(v1.id, v2.id);
        assert!(v2.version > v1.version);

        let saved = stored(&store, Partition::Version, &v2.id).unwrap();
        assert_eq!(saved.from_version, v1.version);
        assert_eq!(saved.revised_by.as_ref().map(String::as_str), Some("bob"));
        assert_eq!(saved.created_by.as_ref().map(String::as_str), Some("alice"));
        assert_eq!(saved.content.headline, "X");
        assert_eq!(store.count(Partition::Draft), 0);
    }

    #[test]
    fn only_lock_holder_can_save() {
        let (flow, store) = engine();
        let flow = Arc::new(flow);
        let guid = flow.create("alice").unwrap().guid;
        let barrier = Arc::new(Barrier::new(2));

        let threads = vec![("alice", "holder's"), ("bob", "intruder's")]
            .into_iter()
            .map(|(user, text)| {
                let flow = flow.clone();
                let barrier = barrier.clone();
                let guid = guid.clone();
                thread::spawn(move || {
                    let content = Content {
                        headline: text.to_string(),
                        summary: text.to_string(),
                        tag: vec![text.to_string()],
                        .. Content::default()
                    };
                    barrier.wait();
                    flow.save(user, &guid, content)
                })
            })
            .collect::<Vec<_>>();

        let mut results = threads.into_iter().map(|t| t.join().unwrap());
        let alice = results.next().unwrap();
        let bob = results.next().unwrap();

        assert_eq!(alice.unwrap().content.headline, "holder's");
        let err = bob.unwrap_err();
        assert!(match err { WorkflowError::Locked(_) => true, _ => false });
        assert_eq!(err.status(), newsdesk_error::StatusCode::FORBIDDEN);

        let draft = stored(&store, Partition::Draft, &guid).unwrap();
        assert_eq!(draft.content, Content {
            headline: "holder's".into(),
            summary: "holder's".into(),
            tag: vec!["holder's".into()],
            .. Content::default()
        });
        assert!(flow.draft_locks().is_empty());
    }

    #[test]
    fn publish_then_unpublish() {
        let (flow, store) = engine();
        let v1 = first_version(&flow);

        let published = flow.publish("carol", &v1.id).unwrap();
        assert_eq!(published.id, v1.guid);
        let live = stored(&store, Partition::Publish, &v1.guid).unwrap();
        assert_eq!(live.version, v1.version);
        assert_eq!(live.content.headline, "X");
        assert!(live.locked_by.is_none());

        flow.unpublish("carol", &v1.guid).unwrap();
        assert!(stored(&store, Partition::Publish, &v1.guid).is_none());
        assert!(stored(&store, Partition::Version, &v1.id).is_some());

        let err = flow.unpublish("carol", &v1.guid).unwrap_err();
        assert_eq!(err.status(), newsdesk_error::StatusCode::NOT_FOUND);
        assert!(flow.publish_locks().is_empty());
    }

    #[test]
    fn republishing_replaces_live_copy() {
        let (flow, store) = engine();
        let v1 = first_version(&flow);
        flow.edit("alice", Roles::ARTICLE_EDIT_SELF, &v1.id).unwrap();
        let v2 = flow.submit_self("alice", &v1.guid, Some(headline("Y"))).unwrap();

        flow.publish("carol", &v1.id).unwrap();
        flow.publish("carol", &v2.id).unwrap();

        let live = stored(&store, Partition::Publish, &v1.guid).unwrap();
        assert_eq!(live.version, v2.version);
        assert_eq!(live.content.headline, "Y");
        assert_eq!(store.count(Partition::Publish), 1);
    }

    #[test]
    fn reopening_edited_article_names_owner() {
        let (flow, store) = engine();
        let v1 = first_version(&flow);

        flow.edit("alice", Roles::ARTICLE_EDIT_SELF, &v1.id).unwrap();
        let err = flow.edit("bob", Roles::ARTICLE_EDIT_OTHER, &v1.id).unwrap_err();

        assert_eq!(err.status(), newsdesk_error::StatusCode::CONFLICT);
        assert!(err.to_string().contains("alice"));
        let draft = stored(&store, Partition::Draft, &v1.guid).unwrap();
        assert_eq!(draft.locked_by.as_ref().map(String::as_str), Some("alice"));
    }

    #[test]
    fn reopening_others_version_requires_role() {
        let (flow, _) = engine();
        let v1 = first_version(&flow);

        let err = flow.edit("bob", Roles::ARTICLE_EDIT_SELF, &v1.id).unwrap_err();
        assert!(match err { WorkflowError::EditForbidden(_) => true, _ => false });

        let draft = flow.edit("bob", Roles::ARTICLE_EDIT_OTHER, &v1.id).unwrap();
        assert_eq!(draft.locked_by.as_ref().map(String::as_str), Some("bob"));
    }

    #[test]
    fn malformed_and_missing_versions() {
        let (flow, _) = engine();

        let err = flow.edit("alice", Roles::all(), "no-version").unwrap_err();
        assert_eq!(err.status(), newsdesk_error::StatusCode::BAD_REQUEST);

        let err = flow.publish("alice", "abc:123").unwrap_err();
        assert_eq!(err.status(), newsdesk_error::StatusCode::NOT_FOUND);
    }

    #[test]
    fn discarding_drafts() {
        let (flow, store) = engine();
        let guid = flow.create("alice").unwrap().guid;

        let err = flow.discard_self("bob", &guid).unwrap_err();
        assert!(match err { WorkflowError::Locked(_) => true, _ => false });
        assert_eq!(store.count(Partition::Draft), 1);

        flow.discard_self("alice", &guid).unwrap();
        assert_eq!(store.count(Partition::Draft), 0);
        let err = flow.discard_self("alice", &guid).unwrap_err();
        assert!(match err { WorkflowError::NotFound(_) => true, _ => false });

        let guid = flow.create("alice").unwrap().guid;
        flow.discard_other("bob", &guid).unwrap();
        let err = flow.discard_other("bob", &guid).unwrap_err();
        assert!(match err { WorkflowError::NotFound(_) => true, _ => false });
    }

    #[test]
    fn saving_foreign_or_missing_drafts() {
        let (flow, _) = engine();
        let guid = flow.create("alice").unwrap().guid;

        let err = flow.submit_self("bob", &guid, Some(headline("Z"))).unwrap_err();
        assert!(match err { WorkflowError::Locked(_) => true, _ => false });
        let err = flow.submit_self("bob", &guid, None).unwrap_err();
        assert!(match err { WorkflowError::Locked(_) => true, _ => false });

        let err = flow.save("alice", "missing", headline("Z")).unwrap_err();
        assert!(match err { WorkflowError::NotFound(_) => true, _ => false });
    }

    #[test]
    fn unlocked_drafts_are_not_submitted() {
        let (flow, store) = engine();
        let draft = Article {
            id: "g".into(),
            guid: "g".into(),
            created_at: Some(version::now()),
            .. Article::default()
        };
        store.upsert(Partition::Draft, "g", &serde_json::to_value(&draft).unwrap(),
            Refresh::No).unwrap();

        let err = flow.submit_other("bob", "g").unwrap_err();
        assert!(match err { WorkflowError::DraftUnlocked(_) => true, _ => false });
        assert_eq!(err.status(), newsdesk_error::StatusCode::CONFLICT);
        assert_eq!(store.count(Partition::Version), 0);
    }

    #[test]
    fn version_collision_keeps_draft() {
        let (flow, store) = engine();
        let guid = flow.create("alice").unwrap().guid;
        let draft = flow.save("alice", &guid, headline("X")).unwrap();

        let id = VersionId::for_revision(&guid, &draft.revised_at.unwrap());
        let squatter = serde_json::json!({ "id": id.to_string(), "guid": guid });
        store.create(Partition::Version, &id.to_string(), &squatter, Refresh::No).unwrap();

        let err = flow.submit_other("bob", &guid).unwrap_err();
        assert!(match err { WorkflowError::VersionExists(_) => true, _ => false });
        assert!(err.status().is_server_error());
        assert!(stored(&store, Partition::Draft, &guid).is_some());
        let kept = stored(&store, Partition::Version, &id.to_string()).unwrap();
        assert_eq!(kept.content, Content::default());
    }

    #[test]
    fn failed_draft_delete_reports_partial_submit() {
        let store = MemoryStore::new();
        let flow = Workflow::new(Box::new(FailingDraftDeletes(store.clone())));
        let guid = flow.create("alice").unwrap().guid;

        let err = flow.submit_self("alice", &guid, Some(headline("X"))).unwrap_err();

        assert!(match err { WorkflowError::PartialSubmit(..) => true, _ => false });
        assert!(err.status().is_server_error());
        assert_eq!(store.count(Partition::Version), 1);
        let draft = stored(&store, Partition::Draft, &guid).unwrap();
        assert_eq!(draft.content.headline, "X");
    }

    #[test]
    fn submitting_stale_revision_rolls_back() {
        let store = MemoryStore::new();
        let first = Workflow::new(Box::new(store.clone()));
        let second = Workflow::new(Box::new(store.clone()));
        let guid = first.create("alice").unwrap().guid;

        let save = |text: &str| Script::SaveIfOwner {
            username: "alice".into(),
            content: headline(text),
            revised_at: version::now(),
        };

        // Both processes save and load before either promotes.
        first.update_owned(&guid, &save("A"), Refresh::No).unwrap();
        let stale = first.load(Partition::Draft, &guid).unwrap();
        second.update_owned(&guid, &save("B"), Refresh::No).unwrap();
        let fresh = second.load(Partition::Draft, &guid).unwrap();

        let err = first.promote("alice", &guid, stale).unwrap_err();
        assert!(match err { WorkflowError::DraftChanged(_) => true, _ => false });
        assert_eq!(err.status(), newsdesk_error::StatusCode::CONFLICT);
        assert_eq!(store.count(Partition::Version), 0);

        let version = second.promote("alice", &guid, fresh).unwrap();
        assert_eq!(store.count(Partition::Version), 1);
        assert_eq!(store.count(Partition::Draft), 0);
        let saved = stored(&store, Partition::Version, &version.id).unwrap();
        assert_eq!(saved.content.headline, "B");
    }

    #[test]
    fn submitting_discarded_draft_rolls_back() {
        let store = MemoryStore::new();
        let first = Workflow::new(Box::new(store.clone()));
        let second = Workflow::new(Box::new(store.clone()));
        let guid = first.create("alice").unwrap().guid;
        first.save("alice", &guid, headline("X")).unwrap();

        let draft = first.load(Partition::Draft, &guid).unwrap();
        second.discard_other("bob", &guid).unwrap();

        let err = first.promote("bob", &guid, draft).unwrap_err();
        assert!(match err { WorkflowError::DraftChanged(_) => true, _ => false });
        assert_eq!(store.count(Partition::Version), 0);
        assert_eq!(store.count(Partition::Draft), 0);
    }

    #[test]
    fn reopening_over_malformed_draft_is_an_error() {
        let (flow, store) = engine();
        let v1 = first_version(&flow);
        store.upsert(Partition::Draft, &v1.guid, &serde_json::json!({ "guid": 5 }),
            Refresh::No).unwrap();

        let err = flow.edit("alice", Roles::ARTICLE_EDIT_SELF, &v1.id).unwrap_err();
        assert!(match err { WorkflowError::Store(StoreError::Json(_)) => true, _ => false });
        assert!(err.status().is_server_error());
    }

    #[test]
    fn concurrent_submits_in_one_process_create_one_version() {
        let (flow, store) = engine();
        let flow = Arc::new(flow);
        let guid = flow.create("alice").unwrap().guid;
        flow.save("alice", &guid, headline("X")).unwrap();
        let barrier = Arc::new(Barrier::new(8));

        let threads = (0..8).map(|_| {
            let flow = flow.clone();
            let barrier = barrier.clone();
            let guid = guid.clone();
            thread::spawn(move || {
                barrier.wait();
                flow.submit_other("bob", &guid)
            })
        }).collect::<Vec<_>>();

        let ok = threads.into_iter()
            .map(|t| t.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(ok, 1);
        assert_eq!(store.count(Partition::Version), 1);
        assert_eq!(store.count(Partition::Draft), 0);
        assert!(flow.draft_locks().is_empty());
    }

    #[test]
    fn concurrent_submits_across_processes_create_one_version() {
        let store = MemoryStore::new();
        let first = Arc::new(Workflow::new(Box::new(store.clone())));
        let second = Arc::new(Workflow::new(Box::new(store.clone())));

        for _ in 0..20 {
            let guid = first.create("alice").unwrap().guid;
            first.save("alice", &guid, headline("X")).unwrap();
            let barrier = Arc::new(Barrier::new(2));
            let before = store.count(Partition::Version);

            let threads = vec![first.clone(), second.clone()].into_iter().map(|flow| {
                let barrier = barrier.clone();
                let guid = guid.clone();
                thread::spawn(move || {
                    barrier.wait();
                    flow.submit_self("alice", &guid, None)
                })
            }).collect::<Vec<_>>();

            let results = threads.into_iter()
                .map(|t| t.join().unwrap())
                .collect::<Vec<_>>();

            assert!(results.iter().any(Result::is_ok));
            assert_eq!(store.count(Partition::Version), before + 1);
            assert!(stored(&store, Partition::Draft, &guid).is_none());
        }
    }

    #[test]
    fn reads_aggregate_all_partitions() {
        let (flow, _) = engine();
        let v1 = first_version(&flow);
        flow.edit("alice", Roles::ARTICLE_EDIT_SELF, &v1.id).unwrap();
        flow.publish("carol", &v1.id).unwrap();

        let set = flow.get(&v1.guid).unwrap();
        assert!(set.draft.is_some());
        assert!(set.publish.is_some());
        assert_eq!(set.versions.len(), 1);

        let page = flow.list(&ListQuery::parse(None, None, None).unwrap()).unwrap();
        assert_eq!(page.articles.len(), 1);
        assert_eq!(page.articles[0].guid, v1.guid);
    }
}
