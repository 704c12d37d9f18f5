mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::Fixture;
use monk_jsonapi::jsonapi::{Reply, MEDIA_TYPE};
use monk_jsonapi::{Action, Controller};

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Option<String>, Value)> {
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(&value)?),
        None => Body::empty(),
    };
    let request = Request::builder().method(method).uri(uri).body(body)?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = match bytes.is_empty() {
        true => Value::Null,
        false => serde_json::from_slice(&bytes)?,
    };

    Ok((status, content_type, value))
}

#[tokio::test]
async fn serves_documents_over_http() -> Result<()> {
    let fixture = Fixture::new();
    let app = fixture.group.clone().endpoint(common::PREFIX);

    let (status, content_type, body) = call(
        &app,
        Method::POST,
        "/api/tags",
        Some(json!({ "data": { "type": "tags", "attributes": { "name": "rust" } } })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(content_type.as_deref(), Some(MEDIA_TYPE));
    let id = body["data"]["id"].as_str().unwrap_or_default().to_string();

    let (status, _, body) = call(&app, Method::GET, "/api/tags?filter[id]=x", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["status"], "400");

    let (status, _, body) = call(&app, Method::GET, &format!("/api/tags/{}", id), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["name"], "rust");

    let (status, content_type, body) = call(&app, Method::DELETE, &format!("/api/tags/{}", id), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(content_type, None);
    assert!(body.is_null());

    Ok(())
}

#[tokio::test]
async fn renders_routing_failures_as_error_documents() -> Result<()> {
    let fixture = Fixture::new();
    let app = fixture.group.clone().endpoint(common::PREFIX);

    let (status, content_type, body) = call(&app, Method::GET, "/elsewhere/tags", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(content_type.as_deref(), Some(MEDIA_TYPE));
    assert_eq!(body["errors"][0]["title"], "not found");

    let (status, _, _) = call(&app, Method::GET, "/api/widgets", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = call(&app, Method::PUT, "/api/tags", None).await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["errors"][0]["detail"], "unsupported method");

    let (status, _, body) = call(&app, Method::GET, "/api/tags/a/b/c/d", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["detail"], "invalid path");

    Ok(())
}

#[tokio::test]
async fn limits_document_size() -> Result<()> {
    let fixture = Fixture::with_posts(common::posts().document_limit(64));
    let app = fixture.group.clone().endpoint(common::PREFIX);

    let title = "x".repeat(128);
    let (status, _, body) = call(
        &app,
        Method::POST,
        "/api/posts",
        Some(json!({ "data": { "type": "posts", "attributes": { "title": title } } })),
    )
    .await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["errors"][0]["detail"], "document too large");

    let (status, _, _) = call(
        &app,
        Method::POST,
        "/api/posts",
        Some(json!({ "data": { "type": "posts", "attributes": { "title": "x" } } })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn caps_bodies_at_the_largest_limit_of_the_group() -> Result<()> {
    let count = Action::sync(&[Method::POST], |ctx| {
        Ok(Reply::json(StatusCode::OK, json!({ "length": ctx.body.len() })))
    });
    let tags = Controller::new(common::TAG.clone())
        .document_limit(64)
        .collection_action("count", count.body_limit(256));
    let fixture = Fixture::build(vec![tags]);
    assert_eq!(fixture.group.body_limit(), 256);
    let app = fixture.group.clone().endpoint(common::PREFIX);

    // rejected while reading, before any controller runs
    let (status, content_type, body) = call(
        &app,
        Method::POST,
        "/api/tags/count",
        Some(json!({ "padding": "x".repeat(1024) })),
    )
    .await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(content_type.as_deref(), Some(MEDIA_TYPE));
    assert_eq!(body["errors"][0]["detail"], "document too large");

    let (status, _, body) = call(
        &app,
        Method::POST,
        "/api/tags/count",
        Some(json!({ "padding": "x".repeat(128) })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["length"].as_u64().unwrap_or_default() > 128);

    // within the group cap but above the document limit of tags
    let (status, _, body) = call(
        &app,
        Method::POST,
        "/api/tags",
        Some(json!({ "data": { "type": "tags", "attributes": { "name": "x".repeat(128) } } })),
    )
    .await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["errors"][0]["detail"], "document too large");

    Ok(())
}
