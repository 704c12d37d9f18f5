mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{to_many, to_one, Fixture};
use monk_jsonapi::filter::Filter;
use monk_jsonapi::{callback, Matcher};

struct Blog {
    user: String,
    post: String,
    tags: Vec<String>,
    comments: Vec<String>,
}

async fn blog(fixture: &Fixture) -> Result<Blog> {
    let user = fixture.create("users", json!({ "name": "Ada" }), json!({})).await?;
    let first = fixture.create("tags", json!({ "name": "rust" }), json!({})).await?;
    let second = fixture.create("tags", json!({ "name": "http" }), json!({})).await?;

    let post = fixture
        .create(
            "posts",
            json!({ "title": "Hello" }),
            json!({
                "author": to_one("users", &user),
                "tags": to_many("tags", &[&first, &second]),
            }),
        )
        .await?;

    let mut comments = Vec::new();
    for message in ["hello", "spam"] {
        let id = fixture
            .create("comments", json!({ "message": message }), json!({ "post": to_one("posts", &post) }))
            .await?;
        comments.push(id);
    }

    Ok(Blog { user, post, tags: vec![first, second], comments })
}

fn identifiers(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|item| item["id"].as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn resolves_relationships_of_single_resources() -> Result<()> {
    let fixture = Fixture::new();
    let blog = blog(&fixture).await?;

    let post = fixture.get(&format!("/posts/{}", blog.post)).await;
    assert_eq!(post.status, StatusCode::OK);

    let relationships = &post.data()["relationships"];
    assert_eq!(relationships["author"]["data"], json!({ "type": "users", "id": blog.user }));
    assert_eq!(identifiers(&relationships["tags"]["data"]), blog.tags);
    assert_eq!(identifiers(&relationships["comments"]["data"]), blog.comments);

    let user = fixture.get(&format!("/users/{}", blog.user)).await;
    assert_eq!(user.status, StatusCode::OK);
    assert_eq!(identifiers(&user.data()["relationships"]["posts"]["data"]), vec![blog.post.clone()]);
    assert_eq!(user.data()["relationships"]["profile"]["data"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn resolves_relationships_of_lists_in_bulk() -> Result<()> {
    let fixture = Fixture::new();
    let blog = blog(&fixture).await?;
    let lonely = fixture.create("posts", json!({ "title": "Lonely" }), json!({})).await?;

    let posts = fixture.get("/posts").await;
    assert_eq!(posts.status, StatusCode::OK);
    assert_eq!(posts.ids(), vec![blog.post.clone(), lonely]);

    let items = posts.data().as_array().unwrap();
    assert_eq!(identifiers(&items[0]["relationships"]["comments"]["data"]), blog.comments);
    assert_eq!(items[1]["relationships"]["comments"]["data"], json!([]));
    assert_eq!(items[1]["relationships"]["author"]["data"], Value::Null);

    let users = fixture.get("/users").await;
    let items = users.data().as_array().unwrap();
    assert_eq!(identifiers(&items[0]["relationships"]["posts"]["data"]), vec![blog.post]);

    Ok(())
}

#[tokio::test]
async fn serves_related_resources() -> Result<()> {
    let fixture = Fixture::new();
    let blog = blog(&fixture).await?;

    let comments = fixture.get(&format!("/posts/{}/comments", blog.post)).await;
    assert_eq!(comments.status, StatusCode::OK);
    assert_eq!(comments.ids(), blog.comments);
    assert_eq!(comments.data()[0]["type"], "comments");
    assert_eq!(comments.body["links"]["self"], json!(format!("/api/posts/{}/comments", blog.post)));

    let author = fixture.get(&format!("/posts/{}/author", blog.post)).await;
    assert_eq!(author.status, StatusCode::OK);
    assert_eq!(author.id(), blog.user);
    assert_eq!(author.data()["attributes"]["name"], "Ada");

    let post = fixture.get(&format!("/comments/{}/post", blog.comments[0])).await;
    assert_eq!(post.id(), blog.post);

    let tags = fixture.get(&format!("/posts/{}/tags", blog.post)).await;
    assert_eq!(tags.ids(), blog.tags);

    let profile = fixture.get(&format!("/users/{}/profile", blog.user)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.data(), &Value::Null);

    let unknown = fixture.get(&format!("/posts/{}/likes", blog.post)).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.detail(), "invalid relationship");

    Ok(())
}

#[tokio::test]
async fn reads_and_replaces_relationships() -> Result<()> {
    let fixture = Fixture::new();
    let blog = blog(&fixture).await?;
    let other = fixture.create("users", json!({ "name": "Grace" }), json!({})).await?;
    let path = format!("/posts/{}/relationships/author", blog.post);

    let author = fixture.get(&path).await;
    assert_eq!(author.status, StatusCode::OK);
    assert_eq!(author.data(), &json!({ "type": "users", "id": blog.user }));
    assert_eq!(author.body["links"]["self"], json!(format!("/api/posts/{}/relationships/author", blog.post)));

    let replaced = fixture.patch(&path, to_one("users", &other)).await;
    assert_eq!(replaced.status, StatusCode::OK);
    assert_eq!(replaced.data()["id"], json!(other));

    let cleared = fixture.patch(&path, json!({ "data": null })).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.data(), &Value::Null);

    let post = fixture.get(&format!("/posts/{}", blog.post)).await;
    assert_eq!(post.data()["relationships"]["author"]["data"], Value::Null);

    let wrong = fixture.patch(&path, to_one("posts", &blog.post)).await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.detail(), "resource type mismatch");

    let inverse = fixture
        .patch(&format!("/posts/{}/relationships/comments", blog.post), json!({ "data": [] }))
        .await;
    assert_eq!(inverse.status, StatusCode::BAD_REQUEST);
    assert_eq!(inverse.detail(), "invalid relationship");

    Ok(())
}

#[tokio::test]
async fn appends_and_removes_idempotently() -> Result<()> {
    let fixture = Fixture::new();
    let blog = blog(&fixture).await?;
    let third = fixture.create("tags", json!({ "name": "json" }), json!({})).await?;
    let path = format!("/posts/{}/relationships/tags", blog.post);

    for _ in 0..2 {
        let appended = fixture.post(&path, to_many("tags", &[&third])).await;
        assert_eq!(appended.status, StatusCode::OK);
        assert_eq!(identifiers(appended.data()), vec![blog.tags[0].clone(), blog.tags[1].clone(), third.clone()]);
    }

    for _ in 0..2 {
        let removed = fixture
            .request(Method::DELETE, &path, Some(to_many("tags", &[&blog.tags[0]])))
            .await;
        assert_eq!(removed.status, StatusCode::OK);
        assert_eq!(identifiers(removed.data()), vec![blog.tags[1].clone(), third.clone()]);
    }

    let invalid = fixture.post(&path, json!({ "data": [{ "type": "tags", "id": "nope" }] })).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.detail(), "invalid relationship id");

    let to_one = fixture
        .post(&format!("/posts/{}/relationships/author", blog.post), to_many("users", &[&blog.user]))
        .await;
    assert_eq!(to_one.status, StatusCode::BAD_REQUEST);
    assert_eq!(to_one.detail(), "invalid relationship");

    Ok(())
}

#[tokio::test]
async fn hides_soft_deleted_resources_from_relationships() -> Result<()> {
    let fixture = Fixture::new();
    let blog = blog(&fixture).await?;

    let deleted = fixture.delete(&format!("/posts/{}", blog.post)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let user = fixture.get(&format!("/users/{}", blog.user)).await;
    assert_eq!(user.data()["relationships"]["posts"]["data"], json!([]));

    let users = fixture.get("/users").await;
    assert_eq!(users.data()[0]["relationships"]["posts"]["data"], json!([]));

    let related = fixture.get(&format!("/users/{}/posts", blog.user)).await;
    assert!(related.ids().is_empty());

    let post = fixture.get(&format!("/comments/{}/post", blog.comments[0])).await;
    assert_eq!(post.status, StatusCode::OK);
    assert_eq!(post.data(), &Value::Null);

    Ok(())
}

#[tokio::test]
async fn has_one_with_several_matches_is_an_internal_error() -> Result<()> {
    let fixture = Fixture::new();
    let user = fixture.create("users", json!({ "name": "Ada" }), json!({})).await?;
    for bio in ["one", "two"] {
        fixture
            .create("profiles", json!({ "bio": bio }), json!({ "user": to_one("users", &user) }))
            .await?;
    }

    let found = fixture.get(&format!("/users/{}", user)).await;
    assert_eq!(found.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(found.detail(), "internal server error");

    let listed = fixture.get("/users").await;
    assert_eq!(listed.status, StatusCode::INTERNAL_SERVER_ERROR);

    let related = fixture.get(&format!("/users/{}/profile", user)).await;
    assert_eq!(related.status, StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

#[tokio::test]
async fn authorizers_narrow_inverse_relationships() -> Result<()> {
    let hide_spam = callback("hide-spam", Matcher::all(), |ctx| {
        ctx.relationship_filters
            .insert("comments".to_string(), vec![Filter::eq("message", "hello")]);
        Ok(())
    });
    let fixture = Fixture::with_posts(common::posts().authorizer(hide_spam));
    let blog = blog(&fixture).await?;

    let post = fixture.get(&format!("/posts/{}", blog.post)).await;
    assert_eq!(identifiers(&post.data()["relationships"]["comments"]["data"]), vec![blog.comments[0].clone()]);

    let posts = fixture.get("/posts").await;
    assert_eq!(
        identifiers(&posts.data()[0]["relationships"]["comments"]["data"]),
        vec![blog.comments[0].clone()]
    );

    let related = fixture.get(&format!("/posts/{}/comments", blog.post)).await;
    assert_eq!(related.ids(), vec![blog.comments[0].clone()]);

    Ok(())
}
