use actix_web::{
    HttpResponse,
    web::{self, Data, Json, Query, ServiceConfig},
};
use failure::Fail;
use newsdesk_error::ApiError;
use newsdesk_models::{
    Article,
    ArticleSet,
    Content,
    ListPage,
    ListQuery,
    Workflow,
    permissions::{
        CreateArticle,
        EditArticle,
        PublishArticle,
        SubmitArticle,
        WriteDraft,
    },
};
use newsdesk_web::{Id, OptionalJson, Session};
use serde::Deserialize;

use crate::Result;

/// Configure routes.
pub fn configure(app: &mut ServiceConfig) {
    app
        .route("/article", web::get().to(get_article))
        .route("/articles", web::get().to(list_articles))
        .service(web::scope("/article")
            .route("/create", web::get().to(create_article))
            .route("/edit", web::get().to(edit_article))
            .route("/save", web::post().to(save_draft))
            .route("/submit-self", web::post().to(submit_own_draft))
            .route("/discard-self", web::get().to(discard_own_draft))
            .route("/submit-other", web::get().to(submit_other_draft))
            .route("/discard-other", web::get().to(discard_other_draft))
            .route("/publish", web::get().to(publish_version))
            .route("/unpublish", web::get().to(unpublish_article))
        )
    ;
}

/// Empty `200 OK` response.
fn done() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").finish()
}

/// Create a new article.
///
/// The article starts as an empty draft locked to the caller.
///
/// ## Method
///
/// ```text
/// GET /api/article/create
/// ```
fn create_article(workflow: Data<Workflow>, session: Session<CreateArticle>)
-> Result<Json<Article>> {
    Ok(Json(workflow.create(session.user())?))
}

/// Re-open a version for editing.
///
/// ## Method
///
/// ```text
/// GET /api/article/edit?id=<guid>:<version>
/// ```
fn edit_article(workflow: Data<Workflow>, session: Session<EditArticle>, id: Id)
-> Result<Json<Article>> {
    Ok(Json(workflow.edit(session.user(), session.roles(), &id)?))
}

#[derive(ApiError, Debug, Fail)]
#[api(code = "article:save:no-body", status = "BAD_REQUEST")]
#[fail(display = "article content is required")]
struct MissingContentError;

/// Replace content of a draft.
///
/// ## Method
///
/// ```text
/// POST /api/article/save?id=<guid>
/// ```
fn save_draft(
    workflow: Data<Workflow>,
    session: Session<WriteDraft>,
    id: Id,
    content: OptionalJson<Content>,
) -> Result<HttpResponse> {
    let content = content.into_inner().ok_or(MissingContentError)?;
    workflow.save(session.user(), &id, content)?;
    Ok(done())
}

/// Submit one's own draft as a new version.
///
/// A body, when present, is saved into the draft first.
///
/// ## Method
///
/// ```text
/// POST /api/article/submit-self?id=<guid>
/// ```
fn submit_own_draft(
    workflow: Data<Workflow>,
    session: Session<WriteDraft>,
    id: Id,
    content: OptionalJson<Content>,
) -> Result<Json<Article>> {
    Ok(Json(workflow.submit_self(session.user(), &id, content.into_inner())?))
}

/// Delete one's own draft.
///
/// ## Method
///
/// ```text
/// GET /api/article/discard-self?id=<guid>
/// ```
fn discard_own_draft(workflow: Data<Workflow>, session: Session<WriteDraft>, id: Id)
-> Result<HttpResponse> {
    workflow.discard_self(session.user(), &id)?;
    Ok(done())
}

/// Submit a draft held by another user.
///
/// ## Method
///
/// ```text
/// GET /api/article/submit-other?id=<guid>
/// ```
fn submit_other_draft(workflow: Data<Workflow>, session: Session<SubmitArticle>, id: Id)
-> Result<Json<Article>> {
    Ok(Json(workflow.submit_other(session.user(), &id)?))
}

/// Delete a draft held by another user.
///
/// ## Method
///
/// ```text
/// GET /api/article/discard-other?id=<guid>
/// ```
fn discard_other_draft(workflow: Data<Workflow>, session: Session<SubmitArticle>, id: Id)
-> Result<HttpResponse> {
    workflow.discard_other(session.user(), &id)?;
    Ok(done())
}

/// Publish a version.
///
/// ## Method
///
/// ```text
/// GET /api/article/publish?id=<guid>:<version>
/// ```
fn publish_version(workflow: Data<Workflow>, session: Session<PublishArticle>, id: Id)
-> Result<HttpResponse> {
    workflow.publish(session.user(), &id)?;
    Ok(done())
}

/// Remove the published copy of an article.
///
/// ## Method
///
/// ```text
/// GET /api/article/unpublish?id=<guid>
/// ```
fn unpublish_article(workflow: Data<Workflow>, session: Session<PublishArticle>, id: Id)
-> Result<HttpResponse> {
    workflow.unpublish(session.user(), &id)?;
    Ok(done())
}

/// Get an article with its whole history.
///
/// ## Method
///
/// ```text
/// GET /api/article?id=<guid>
/// ```
fn get_article(workflow: Data<Workflow>, _: Session, id: Id) -> Result<Json<ArticleSet>> {
    Ok(Json(workflow.get(&id)?))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "type")]
    types: Option<String>,
    since: Option<String>,
    cursor_mark: Option<String>,
}

/// List recently created articles.
///
/// ## Method
///
/// ```text
/// GET /api/articles?type=draft,version,publish&since=<rfc3339>&cursor_mark=<token>
/// ```
fn list_articles(workflow: Data<Workflow>, _: Session, params: Query<ListParams>)
-> Result<Json<ListPage>> {
    let query = ListQuery::parse(
        params.types.as_ref().map(String::as_str),
        params.since.as_ref().map(String::as_str),
        params.cursor_mark.as_ref().map(String::as_str),
    )?;

    Ok(Json(workflow.list(&query)?))
}
