use axum::{
    Extension, Json,
    extract::{Path, RawQuery, State, rejection::JsonRejection},
    response::Redirect,
};
use tracing::Instrument;

use crate::{
    auth::AuthUser,
    controller::Controller,
    error::AppError,
    models::{DeleteConfirmation, Entity, FormView, Id, ListPage},
    pagination::PageQuery,
    repository::RepositoryState,
    resources::Resource,
};

// Catalog handlers are generic over the entity and are only reachable through the
// access gate in `routes::catalog`, which has already resolved and authorised the caller.

/// list
///
/// `GET /{entity}/?page=N`
pub async fn list<R: Resource>(
    State(repo): State<RepositoryState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListPage<R>>, AppError> {
    let query = PageQuery::from_raw(query.as_deref());
    let page = Controller::<R>::new(repo.as_ref())
        .list(query.page.as_deref())
        .await?;
    Ok(Json(page))
}

/// detail
///
/// `GET /{entity}/{id}`: the record with its related collections.
pub async fn detail<R: Resource>(
    State(repo): State<RepositoryState>,
    Path(id): Path<Id>,
) -> Result<Json<R::Detail>, AppError> {
    let detail = Controller::<R>::new(repo.as_ref()).get(id).await?;
    Ok(Json(detail))
}

pub async fn create_form<R: Resource>(
    State(repo): State<RepositoryState>,
) -> Result<Json<FormView<R::Form>>, AppError> {
    let view = Controller::<R>::new(repo.as_ref()).blank_form().await?;
    Ok(Json(view))
}

/// create
///
/// `POST /{entity}/create/`. Redirects (303) to the new record's detail page.
pub async fn create<R: Resource>(
    State(repo): State<RepositoryState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<R::Form>, JsonRejection>,
) -> Result<Redirect, AppError> {
    let controller = Controller::<R>::new(repo.as_ref());
    let form = match body {
        Ok(Json(form)) => form,
        Err(rejection) => return Err(controller.malformed_body(None, &rejection.body_text()).await),
    };
    let record = controller
        .create(form)
        .instrument(actor_span(&user, R::ENTITY))
        .await?;
    Ok(Redirect::to(&R::ENTITY.detail_url(record.id())))
}

pub async fn update_form<R: Resource>(
    State(repo): State<RepositoryState>,
    Path(id): Path<Id>,
) -> Result<Json<FormView<R::Form>>, AppError> {
    let view = Controller::<R>::new(repo.as_ref()).edit_form(id).await?;
    Ok(Json(view))
}

/// update
///
/// `POST /{entity}/{id}/update`. Redirects (303) to the detail page.
pub async fn update<R: Resource>(
    State(repo): State<RepositoryState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Id>,
    body: Result<Json<R::Form>, JsonRejection>,
) -> Result<Redirect, AppError> {
    let controller = Controller::<R>::new(repo.as_ref());
    let form = match body {
        Ok(Json(form)) => form,
        Err(rejection) => {
            return Err(controller.malformed_body(Some(id), &rejection.body_text()).await);
        }
    };
    let record = controller
        .update(id, form)
        .instrument(actor_span(&user, R::ENTITY))
        .await?;
    Ok(Redirect::to(&R::ENTITY.detail_url(record.id())))
}

/// delete_confirm
///
/// `GET /{entity}/{id}/delete/`: the object to confirm, or a 409 refusal listing
/// the records that block its deletion.
pub async fn delete_confirm<R: Resource>(
    State(repo): State<RepositoryState>,
    Path(id): Path<Id>,
) -> Result<Json<DeleteConfirmation<R>>, AppError> {
    let confirmation = Controller::<R>::new(repo.as_ref())
        .confirm_delete(id)
        .await?;
    Ok(Json(confirmation))
}

/// delete
///
/// `POST /{entity}/{id}/delete/`. Redirects (303) to the list page.
pub async fn delete<R: Resource>(
    State(repo): State<RepositoryState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Id>,
) -> Result<Redirect, AppError> {
    Controller::<R>::new(repo.as_ref())
        .delete(id)
        .instrument(actor_span(&user, R::ENTITY))
        .await?;
    Ok(Redirect::to(&R::ENTITY.list_url()))
}

fn actor_span(user: &AuthUser, entity: Entity) -> tracing::Span {
    tracing::info_span!("catalog_write", user = %user.username, %entity)
}

// --- Public ---

/// root_redirect
///
/// The landing page is the section list.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 303, description = "Redirect to /section/"))
)]
pub async fn root_redirect() -> Redirect {
    Redirect::to(&Entity::Section.list_url())
}

/// health
///
/// Liveness probe for load balancers; does not touch storage.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
