use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use courseinfo::{
    AppConfig, AppState, MemoryRepository, create_router,
    models::User,
    repository::{Repository, RepositoryState},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

// --- Test Harness ---

const REGISTRAR: Uuid = Uuid::from_u128(10);
const VIEWER: Uuid = Uuid::from_u128(11);
const ADMIN: Uuid = Uuid::from_u128(12);

/// Repository seeded with three identities:
/// a registrar with full course rights, a read-only course viewer and a superuser.
fn seeded_repo() -> Arc<MemoryRepository> {
    let user = |id: Uuid, username: &str, is_superuser: bool| User {
        id,
        username: username.to_string(),
        is_active: true,
        is_superuser,
    };
    Arc::new(
        MemoryRepository::new()
            .with_user(
                user(REGISTRAR, "registrar", false),
                &[
                    "courseinfo.view_course",
                    "courseinfo.add_course",
                    "courseinfo.change_course",
                    "courseinfo.delete_course",
                ],
            )
            .with_user(user(VIEWER, "viewer", false), &["courseinfo.view_course"])
            .with_user(user(ADMIN, "admin", true), &[]),
    )
}

fn app(repo: Arc<MemoryRepository>) -> Router {
    create_router(AppState::new(repo as RepositoryState, AppConfig::default()))
}

fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(id) = user {
        builder = builder.header("x-user-id", id.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

// --- Public Routes ---

#[tokio::test]
async fn test_health_check() {
    let response = app(seeded_repo())
        .oneshot(get("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_root_redirects_to_section_list() {
    let response = app(seeded_repo()).oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/section/");
}

#[tokio::test]
async fn test_openapi_document_lists_catalog_paths() {
    let response = app(seeded_repo())
        .oneshot(get("/api-docs/openapi.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/course/"]["get"].is_object());
    assert!(doc["paths"]["/student/{id}/delete/"]["post"].is_object());
    let page = &doc["paths"]["/instructor/"]["get"]["parameters"][0];
    assert_eq!(page["name"], "page");
    assert_eq!(page["in"], "query");
}

// --- Access Gate ---

#[tokio::test]
async fn test_anonymous_request_is_redirected_to_login() {
    let response = app(seeded_repo())
        .oneshot(get("/course/", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login/?next=%2Fcourse%2F");
}

#[tokio::test]
async fn test_missing_view_permission_is_forbidden() {
    let response = app(seeded_repo())
        .oneshot(get("/student/", Some(VIEWER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["permission"], "courseinfo.view_student");
}

#[tokio::test]
async fn test_view_permission_does_not_grant_writes() {
    let response = app(seeded_repo())
        .oneshot(post(
            "/course/create/",
            VIEWER,
            json!({"course_number": "CS101", "course_name": "Intro"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_gate_runs_before_not_found() {
    // Without the grant, an unknown id must not leak whether it exists.
    let response = app(seeded_repo())
        .oneshot(get("/student/12345", Some(VIEWER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// --- CRUD Flows ---

#[tokio::test]
async fn test_create_redirects_to_detail_and_duplicate_is_rejected() {
    let repo = seeded_repo();
    let router = app(repo.clone());
    let form = json!({"course_number": "CS101", "course_name": "Intro"});

    let created = router
        .clone()
        .oneshot(post("/course/create/", REGISTRAR, form.clone()))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    let detail_url = location(&created).to_string();
    assert!(detail_url.starts_with("/course/"));

    let detail = router
        .clone()
        .oneshot(get(&detail_url, Some(REGISTRAR)))
        .await
        .unwrap();
    assert_eq!(detail.status(), StatusCode::OK);
    let body = json_body(detail).await;
    assert_eq!(body["course"]["course_name"], "Intro");
    assert_eq!(body["section_list"], json!([]));

    let duplicate = router
        .oneshot(post("/course/create/", REGISTRAR, form))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(duplicate).await;
    assert_eq!(
        body["errors"]["__all__"][0],
        "Course with this Course number and Course name already exists."
    );
    assert_eq!(body["values"]["course_number"], "CS101");
    assert_eq!(repo.count(courseinfo::models::Entity::Course).await.unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_json_redisplays_the_form() {
    let request = Request::builder()
        .method("POST")
        .uri("/course/create/")
        .header("x-user-id", REGISTRAR.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(seeded_repo()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["errors"]["__all__"].is_array());
}

#[tokio::test]
async fn test_null_character_in_form_is_a_field_error() {
    let form = json!({"course_number": "A\u{0}", "course_name": "Intro"});
    let response = app(seeded_repo())
        .oneshot(post("/course/create/", REGISTRAR, form))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(
        body["errors"]["course_number"],
        json!(["Null characters are not allowed."])
    );
}

#[tokio::test]
async fn test_update_redirects_to_detail() {
    let repo = seeded_repo();
    let router = app(repo.clone());
    let created = router
        .clone()
        .oneshot(post(
            "/course/create/",
            REGISTRAR,
            json!({"course_number": "CS101", "course_name": "Intro"}),
        ))
        .await
        .unwrap();
    let detail_url = location(&created).to_string();

    let updated = router
        .clone()
        .oneshot(post(
            &format!("{}/update", detail_url),
            REGISTRAR,
            json!({"course_number": "CS101", "course_name": "Introduction"}),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&updated), detail_url);

    let body = json_body(
        router
            .oneshot(get(&detail_url, Some(REGISTRAR)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["course"]["course_name"], "Introduction");
}

#[tokio::test]
async fn test_delete_refusal_then_success() {
    let router = app(seeded_repo());
    let create = |uri: &'static str, body: Value| {
        let router = router.clone();
        async move {
            let response = router.oneshot(post(uri, ADMIN, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "creating via {uri}");
            let url = location(&response).to_string();
            url.rsplit('/').next().unwrap().parse::<i64>().unwrap()
        }
    };

    let instructor = create(
        "/instructor/create/",
        json!({"first_name": "Ada", "last_name": "Lovelace"}),
    )
    .await;
    let course = create(
        "/course/create/",
        json!({"course_number": "CS101", "course_name": "Intro"}),
    )
    .await;
    let semester = create("/semester/create/", json!({"year": 2024, "term": "Fall"})).await;
    let section = create(
        "/section/create/",
        json!({
            "section_name": "001",
            "semester": semester,
            "course": course,
            "instructor": instructor,
        }),
    )
    .await;

    let confirm = router
        .clone()
        .oneshot(get(&format!("/instructor/{instructor}/delete/"), Some(ADMIN)))
        .await
        .unwrap();
    assert_eq!(confirm.status(), StatusCode::CONFLICT);
    let body = json_body(confirm).await;
    assert_eq!(body["dependents"][0]["section_id"], section);

    let refused = router
        .clone()
        .oneshot(post(&format!("/instructor/{instructor}/delete/"), ADMIN, json!({})))
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::CONFLICT);

    let deleted = router
        .clone()
        .oneshot(post(&format!("/section/{section}/delete/"), ADMIN, json!({})))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&deleted), "/section/");

    let confirm = router
        .clone()
        .oneshot(get(&format!("/instructor/{instructor}/delete/"), Some(ADMIN)))
        .await
        .unwrap();
    assert_eq!(confirm.status(), StatusCode::OK);

    let deleted = router
        .oneshot(post(&format!("/instructor/{instructor}/delete/"), ADMIN, json!({})))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&deleted), "/instructor/");
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let response = app(seeded_repo())
        .oneshot(get("/course/404", Some(REGISTRAR)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_out_of_range_page_returns_last_page() {
    let response = app(seeded_repo())
        .oneshot(get("/student/?page=50", Some(ADMIN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["page"], 1);
    assert_eq!(body["num_pages"], 1);
}

#[tokio::test]
async fn test_page_parameter_edge_cases_never_fail() {
    let repo = seeded_repo();
    for n in 0..30 {
        repo.insert_instructor(&courseinfo::models::InstructorForm {
            first_name: format!("First{n}"),
            last_name: "Smith".to_string(),
            disambiguator: String::new(),
        })
        .await
        .unwrap();
    }
    let router = app(repo);

    for (query, expected) in [
        ("page=99999999999999999999", 2),
        ("page=0", 2),
        ("page=1&page=2", 2),
        ("page=2&page=1", 1),
        ("page=abc", 1),
    ] {
        let response = router
            .clone()
            .oneshot(get(&format!("/instructor/?{query}"), Some(ADMIN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "?{query}");
        let body = json_body(response).await;
        assert_eq!(body["page"], expected, "?{query}");
        assert_eq!(body["num_pages"], 2);
    }
}

// --- Live Server ---

#[tokio::test]
async fn test_live_server_answers_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let address = format!("http://{}", listener.local_addr().unwrap());
    let router = app(seeded_repo());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let health = client
        .get(format!("{}/health", address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(health.status().is_success());
    assert!(health.headers().contains_key("x-request-id"));

    let anonymous = client
        .get(format!("{}/semester/", address))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 303);
}
