mod utils;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use utils::{eventually, TestSetup, TestSetupBuilder};

use speculate::{auth::Role, build_router};

fn app(setup: &TestSetup) -> Router {
    build_router(setup.state.clone())
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(setup: &TestSetup, request: Request<Body>) -> Response {
    app(setup).oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Creates a binary prediction locking at midnight, twelve hours after the test clock
async fn create_prediction(setup: &TestSetup, moderator: &str) -> Value {
    let body = json!({
        "show_id": "show-1",
        "scope": "show",
        "template_key": "finale_twist",
        "kind": "binary",
        "options": [{ "label": "Yes" }, { "label": "No" }],
        "lock_at": "2025-03-11T00:00:00Z",
    });
    let response = send(setup, request("POST", "/predictions", Some(moderator), Some(body))).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_is_public() {
    let setup = TestSetupBuilder::new().build().await;
    let response = send(&setup, request("GET", "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn routes_require_bearer_token() {
    let setup = TestSetupBuilder::new().build().await;

    let response = send(&setup, request("GET", "/users/alice/stats", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "unauthorized");

    let response = send(
        &setup,
        request("GET", "/users/alice/stats", Some("not-a-jwt"), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pick_resolve_and_read_back_over_http() {
    let setup = TestSetupBuilder::new().build().await;
    let moderator = setup.token("mod", Role::Moderator);
    let alice = setup.token("alice", Role::User);
    let admin = setup.token("admin", Role::Admin);

    let view = create_prediction(&setup, &moderator).await;
    let id = view["id"].as_str().unwrap().to_string();
    let yes = view["options"][0]["id"].as_str().unwrap().to_string();

    let response = send(
        &setup,
        request(
            "POST",
            &format!("/predictions/{}/picks", id),
            Some(&alice),
            Some(json!({ "option_id": yes })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["potential_points"], 70);

    let response = send(
        &setup,
        request("GET", &format!("/predictions/{}", id), Some(&alice), None),
    )
    .await;
    let fetched = body_json(response).await;
    assert_eq!(fetched["total_picks"], 1);
    assert_eq!(fetched["my_pick"]["option_id"], yes.as_str());

    let response = send(
        &setup,
        request(
            "POST",
            &format!("/predictions/{}/resolve", id),
            Some(&moderator),
            Some(json!({
                "winning_option_id": yes,
                "evidence": { "source_type": "OFFICIAL", "url": "https://example.org/recap" }
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["correct_picks"], 1);
    assert_eq!(summary["points_awarded"], 70);

    eventually("balance credited", || async {
        let response = send(
            &setup,
            request("GET", "/users/alice/stats", Some(&alice), None),
        )
        .await;
        body_json(response).await["points_balance"] == 70
    })
    .await;

    let response = send(
        &setup,
        request("GET", "/users/alice/stats", Some(&alice), None),
    )
    .await;
    let stats = body_json(response).await;
    assert_eq!(stats["accuracy"], 1.0);
    assert_eq!(stats["level"], "Novice");

    let response = send(
        &setup,
        request("GET", "/users/alice/points?limit=10", Some(&alice), None),
    )
    .await;
    let history = body_json(response).await;
    assert_eq!(history["current_balance"], 70);
    assert_eq!(history["entries"][0]["reason"], "pick_correct");
    assert_eq!(
        history["entries"][0]["prediction"]["show_title"],
        "Harbor Lights"
    );

    let response = send(
        &setup,
        request("POST", "/admin/leaderboards/rebuild", Some(&admin), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &setup,
        request("GET", "/leaderboards/global", Some(&alice), None),
    )
    .await;
    let board = body_json(response).await;
    assert_eq!(board["entries"][0]["user_id"], "alice");
    assert_eq!(board["entries"][0]["score"], 70);
}

#[tokio::test]
async fn episode_hot_and_history_listings() {
    let setup = TestSetupBuilder::new().build().await;
    let moderator = setup.token("mod", Role::Moderator);
    let alice = setup.token("alice", Role::User);

    // Locks when ep-5 airs, twelve hours after the test clock
    let body = json!({
        "show_id": "show-1",
        "scope": "episode",
        "episode_id": "ep-5",
        "template_key": "who_leaves",
        "kind": "binary",
        "options": [{ "label": "Mara" }, { "label": "Theo" }],
    });
    let response = send(&setup, request("POST", "/predictions", Some(&moderator), Some(body))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    let id = view["id"].as_str().unwrap().to_string();
    let theo = view["options"][1]["id"].as_str().unwrap().to_string();

    let response = send(
        &setup,
        request(
            "POST",
            &format!("/predictions/{}/picks", id),
            Some(&alice),
            Some(json!({ "option_id": theo })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &setup,
        request("GET", "/episodes/ep-5/predictions", Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], id.as_str());
    assert_eq!(listed[0]["time_left"], "12h 0m");
    assert_eq!(listed[0]["my_pick"]["option_id"], theo.as_str());
    assert_eq!(listed[0]["options"][1]["percentage"], 100);

    let response = send(&setup, request("GET", "/predictions/hot", Some(&alice), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let hot = body_json(response).await;
    assert_eq!(hot[0]["id"], id.as_str());
    assert_eq!(hot[0]["show_title"], "Harbor Lights");
    assert_eq!(hot[0]["total_picks"], 1);

    let response = send(
        &setup,
        request("GET", "/users/alice/predictions?status=pending", Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let history = body_json(response).await;
    assert_eq!(history[0]["episode_title"], "Low Tide");
    assert_eq!(history[0]["picked_option"], "Theo");
    assert_eq!(history[0]["status"], "pending");

    let response = send(
        &setup,
        request("GET", "/users/alice/predictions?status=correct", Some(&alice), None),
    )
    .await;
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn stats_rebuild_routes_are_admin_only() {
    let setup = TestSetupBuilder::new().build().await;
    let admin = setup.token("admin", Role::Admin);
    let alice = setup.token("alice", Role::User);
    setup
        .state
        .points_service
        .admin_adjust(&setup.admin(), "alice", 25, "welcome credit")
        .await
        .unwrap();

    let response = send(
        &setup,
        request("POST", "/admin/jobs/stats-rebuild", Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &setup,
        request("POST", "/admin/jobs/stats-rebuild", Some(&admin), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "rebuilt": 1, "failed": 0 }));

    let response = send(
        &setup,
        request("POST", "/admin/users/alice/rebuild-stats", Some(&admin), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["points_balance"], 25);
    assert_eq!(stats["lifetime_points"], 25);
}

#[tokio::test]
async fn moderation_routes_check_roles() {
    let setup = TestSetupBuilder::new().build().await;
    let moderator = setup.token("mod", Role::Moderator);
    let alice = setup.token("alice", Role::User);

    let view = create_prediction(&setup, &moderator).await;
    let id = view["id"].as_str().unwrap();
    let yes = view["options"][0]["id"].as_str().unwrap();

    let response = send(
        &setup,
        request(
            "POST",
            &format!("/predictions/{}/resolve", id),
            Some(&alice),
            Some(json!({ "winning_option_id": yes })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &setup,
        request(
            "POST",
            "/admin/leaderboards/rebuild",
            Some(&moderator),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &setup,
        request(
            "POST",
            "/admin/points/adjust",
            Some(&moderator),
            Some(json!({ "user_id": "alice", "points": 10, "note": "nice" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_leaderboard_kind_is_rejected() {
    let setup = TestSetupBuilder::new().build().await;
    let alice = setup.token("alice", Role::User);

    let response = send(
        &setup,
        request("GET", "/leaderboards/monthly", Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &setup,
        request("GET", "/leaderboards/weekly", Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let board = body_json(response).await;
    assert_eq!(board["entries"], json!([]));
    assert_eq!(board["as_of"], Value::Null);
}

#[tokio::test]
async fn spoiler_comments_are_hidden_until_after_air() {
    let setup = TestSetupBuilder::new().build().await;
    let alice = setup.token("alice", Role::User);
    let bob = setup.token("bob", Role::User);

    let response = send(
        &setup,
        request(
            "POST",
            "/comments",
            Some(&alice),
            Some(json!({ "body": "Pretty sure the captain dies", "episode_id": "ep-5" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let comment = body_json(response).await;
    assert_eq!(comment["is_spoiler"], true);

    let list = |token: String| {
        let setup = &setup;
        async move {
            let response = send(
                setup,
                request("GET", "/comments?episode_id=ep-5", Some(&token), None),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
            body_json(response).await
        }
    };
    assert_eq!(list(bob.clone()).await, json!([]));
    assert_eq!(list(alice.clone()).await.as_array().unwrap().len(), 1);

    setup.clock.advance(chrono::Duration::hours(13));
    assert_eq!(list(bob).await.as_array().unwrap().len(), 1);

    let response = send(
        &setup,
        request("GET", "/comments", Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
