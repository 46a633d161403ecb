use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use resale_api::{AppStateInner, router};
use resale_db::Database;

const ADMIN_EMAIL: &str = "ops@resale.test";

fn app() -> Router {
    app_with_db().0
}

/// Router plus a handle on its database, for breaking the backend on purpose.
fn app_with_db() -> (Router, Arc<Database>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("resale_api=debug")
        .with_test_writer()
        .try_init();

    let mut state = AppStateInner::new(Database::open_in_memory().unwrap(), "test-secret");
    state.admin_emails = vec![ADMIN_EMAIL.to_string()];
    let db = state.db.clone();
    (router(Arc::new(state)), db)
}

fn exec(db: &Database, sql: &str) {
    db.with_conn(|conn| {
        conn.execute_batch(sql)?;
        Ok(())
    })
    .unwrap();
}

const FAIL_ARCHIVE: &str = "CREATE TRIGGER fail_archive BEFORE INSERT ON tickets_archive
     BEGIN SELECT RAISE(ABORT, 'archive offline'); END;";
const FAIL_DELETE: &str = "CREATE TRIGGER fail_delete BEFORE DELETE ON tickets
     BEGIN SELECT RAISE(ABORT, 'delete timed out'); END;";

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": email, "password": "correct horse", "display_name": "Sam" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn create_listing(app: &Router, token: &str, title: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/functions/ticket-actions",
        Some(token),
        Some(json!({
            "action": "create-ticket",
            "ticket": {
                "title": title,
                "category": "Concert",
                "venue": "Olympiahalle",
                "event_date": "2099-06-01",
                "price_cents": 12000,
                "quantity": 2
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    body["ticket"]["id"].as_str().unwrap().to_string()
}

fn soft_delete(ticket_id: &str) -> Option<Value> {
    Some(json!({ "action": "soft-delete-ticket", "ticketId": ticket_id }))
}

#[tokio::test]
async fn register_login_and_session() {
    let app = app();
    register(&app, "Sam@Example.com").await;

    let (status, _) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "sam@example.com", "password": "correct horse", "display_name": "Sam" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "sam@example.com", "password": "wrong horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "sam@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "sam@example.com");
}

#[tokio::test]
async fn listing_is_searchable() {
    let app = app();
    let token = register(&app, "seller@example.com").await;
    create_listing(&app, &token, "Jazz Night").await;
    create_listing(&app, &token, "Cup Final").await;

    let (status, body) = send(&app, "GET", "/tickets?q=jazz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["title"], "Jazz Night");
    assert_eq!(body["items"][0]["price_per_unit_cents"], 6000);

    let (_, body) = send(&app, "GET", "/tickets", None, None).await;
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn soft_delete_archives_then_reports_not_found() {
    let app = app();
    let token = register(&app, "seller@example.com").await;
    let id = create_listing(&app, &token, "Jazz Night").await;

    let (status, body) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn function_endpoint_requires_a_valid_token() {
    let app = app();
    let token = register(&app, "seller@example.com").await;
    let id = create_listing(&app, &token, "Jazz Night").await;

    let (status, body) = send(&app, "POST", "/functions/ticket-actions", None, soft_delete(&id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, "POST", "/functions/ticket-actions", Some("not-a-jwt"), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn strangers_and_sellers_of_sold_tickets_are_forbidden() {
    let app = app();
    let seller = register(&app, "seller@example.com").await;
    let buyer = register(&app, "buyer@example.com").await;
    let id = create_listing(&app, &seller, "Jazz Night").await;

    let (status, _) = send(&app, "POST", "/functions/ticket-actions", Some(&buyer), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", &format!("/tickets/{}/purchase", id), Some(&seller), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &format!("/tickets/{}/purchase", id), Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "sold");

    let (status, _) = send(&app, "POST", &format!("/tickets/{}/purchase", id), Some(&buyer), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/functions/ticket-actions", Some(&seller), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "POST",
        "/functions/ticket-actions",
        Some(&seller),
        Some(json!({ "action": "update-ticket", "ticketId": id, "patch": { "price_cents": 1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Still live and owned by the buyer
    let (status, body) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner_id"], body["buyer_id"]);
}

#[tokio::test]
async fn seller_can_update_unsold_listing() {
    let app = app();
    let token = register(&app, "seller@example.com").await;
    let id = create_listing(&app, &token, "Jazz Night").await;

    let (status, body) = send(
        &app,
        "POST",
        "/functions/ticket-actions",
        Some(&token),
        Some(json!({ "action": "update-ticket", "ticketId": id, "patch": { "title": "Jazz Night II" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticket"]["title"], "Jazz Night II");
}

#[tokio::test]
async fn unknown_action_is_a_bad_request() {
    let app = app();
    let token = register(&app, "seller@example.com").await;

    let (status, body) = send(
        &app,
        "POST",
        "/functions/ticket-actions",
        Some(&token),
        Some(json!({ "action": "hard-delete-ticket", "ticketId": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let app = app();
    let user = register(&app, "user@example.com").await;
    let admin = register(&app, ADMIN_EMAIL).await;
    let id = create_listing(&app, &user, "Jazz Night").await;
    send(&app, "POST", "/functions/ticket-actions", Some(&user), soft_delete(&id)).await;

    let (status, _) = send(&app, "GET", "/admin/stats", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "GET", "/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"], 2);
    assert_eq!(body["archived"], 1);
    assert_eq!(body["available"], 0);

    let (status, body) = send(&app, "GET", "/admin/archived-tickets", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["original_id"], id.as_str());

    let (status, body) = send(&app, "POST", "/admin/reconcile", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reconciled"], 0);
}

#[tokio::test]
async fn newsletter_subscription_lifecycle() {
    let app = app();
    let body = || Some(json!({ "email": "Fan@Example.com", "locale": "de" }));

    let (status, res) = send(&app, "POST", "/newsletter/subscribe", None, body()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(res["email"], "fan@example.com");

    let (status, _) = send(&app, "POST", "/newsletter/subscribe", None, body()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, res) = send(
        &app,
        "POST",
        "/newsletter/unsubscribe",
        None,
        Some(json!({ "email": "fan@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["subscribed"], false);

    let admin = register(&app, ADMIN_EMAIL).await;
    let (status, res) = send(&app, "GET", "/admin/newsletter-subscribers", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res[0]["email"], "fan@example.com");
    assert!(res[0]["unsubscribed_at"].is_string());
}

#[tokio::test]
async fn concurrent_registrations_yield_one_conflict() {
    let app = app();
    let body = || Some(json!({ "email": "twin@example.com", "password": "correct horse", "display_name": "Twin" }));

    let (a, b) = tokio::join!(
        send(&app, "POST", "/auth/register", None, body()),
        send(&app, "POST", "/auth/register", None, body()),
    );

    let mut statuses = [a.0, b.0];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn failed_archive_write_is_500_and_keeps_ticket() {
    let (app, db) = app_with_db();
    let token = register(&app, "seller@example.com").await;
    let id = create_listing(&app, &token, "Jazz Night").await;
    exec(&db, FAIL_ARCHIVE);

    let (status, body) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("nothing was deleted"));

    let (status, _) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn partial_failure_is_500_and_reconciled_later() {
    let (app, db) = app_with_db();
    let token = register(&app, "seller@example.com").await;
    let admin = register(&app, ADMIN_EMAIL).await;
    let id = create_listing(&app, &token, "Jazz Night").await;
    exec(&db, FAIL_DELETE);

    let (status, body) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("still listed"));

    let (status, _) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);

    exec(&db, "DROP TRIGGER fail_delete;");
    let (status, body) = send(&app, "POST", "/admin/reconcile", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reconciled"], 1);

    let (status, _) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn edit_after_partial_failure_survives_the_sweep() {
    let (app, db) = app_with_db();
    let token = register(&app, "seller@example.com").await;
    let admin = register(&app, ADMIN_EMAIL).await;
    let id = create_listing(&app, &token, "Jazz Night").await;

    exec(&db, FAIL_DELETE);
    let (status, _) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    exec(&db, "DROP TRIGGER fail_delete;");

    let (status, _) = send(
        &app,
        "POST",
        "/functions/ticket-actions",
        Some(&token),
        Some(json!({ "action": "update-ticket", "ticketId": id, "patch": { "title": "Jazz Night Encore" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, report) = send(&app, "POST", "/admin/reconcile", Some(&admin), None).await;
    assert_eq!(report["stale"], 1);
    let (status, body) = send(&app, "GET", &format!("/tickets/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Jazz Night Encore");

    let (status, _) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, archived) = send(&app, "GET", "/admin/archived-tickets", Some(&admin), None).await;
    assert_eq!(archived.as_array().unwrap().len(), 1);
    assert_eq!(archived[0]["title"], "Jazz Night Encore");
}

#[tokio::test]
async fn unreadable_backend_is_500() {
    let (app, db) = app_with_db();
    let token = register(&app, "seller@example.com").await;
    let id = create_listing(&app, &token, "Jazz Night").await;
    exec(&db, "DROP TABLE tickets;");

    let (status, body) = send(&app, "POST", "/functions/ticket-actions", Some(&token), soft_delete(&id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Ticket backend unavailable. It is safe to try again");
}
