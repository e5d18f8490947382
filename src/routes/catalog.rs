use axum::{Router, middleware, routing::get};

use crate::{
    AppState,
    access::{Gate, Operation, enforce},
    handlers,
    models::{Course, Instructor, Registration, Section, Semester, Student},
    resources::Resource,
};

/// Catalog Router Module
///
/// Mounts the uniform route group of every entity:
///
/// | Path                      | GET             | POST      | Operation |
/// |---------------------------|-----------------|-----------|-----------|
/// | `/{entity}/`              | list            |           | List      |
/// | `/{entity}/{id}`          | detail          |           | Detail    |
/// | `/{entity}/create/`       | blank form      | create    | Create    |
/// | `/{entity}/{id}/update`   | filled form     | update    | Update    |
/// | `/{entity}/{id}/delete/`  | confirm/refuse  | delete    | Delete    |
pub fn catalog_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(resource_routes::<Instructor>(state))
        .merge(resource_routes::<Section>(state))
        .merge(resource_routes::<Course>(state))
        .merge(resource_routes::<Registration>(state))
        .merge(resource_routes::<Semester>(state))
        .merge(resource_routes::<Student>(state))
}

/// resource_routes
///
/// The route group of one entity. Both methods on a path share the gate for the
/// operation that path performs.
pub fn resource_routes<R: Resource>(state: &AppState) -> Router<AppState> {
    let slug = R::ENTITY.slug();
    let gate = |operation| {
        middleware::from_fn_with_state(Gate::new(state.clone(), R::ENTITY, operation), enforce)
    };

    Router::new()
        .route(
            &format!("/{slug}/"),
            get(handlers::list::<R>).route_layer(gate(Operation::List)),
        )
        .route(
            &format!("/{slug}/{{id}}"),
            get(handlers::detail::<R>).route_layer(gate(Operation::Detail)),
        )
        .route(
            &format!("/{slug}/create/"),
            get(handlers::create_form::<R>)
                .post(handlers::create::<R>)
                .route_layer(gate(Operation::Create)),
        )
        .route(
            &format!("/{slug}/{{id}}/update"),
            get(handlers::update_form::<R>)
                .post(handlers::update::<R>)
                .route_layer(gate(Operation::Update)),
        )
        .route(
            &format!("/{slug}/{{id}}/delete/"),
            get(handlers::delete_confirm::<R>)
                .post(handlers::delete::<R>)
                .route_layer(gate(Operation::Delete)),
        )
}
