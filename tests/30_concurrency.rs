mod common;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{Fixture, Response};
use monk_jsonapi::database::Record;
use monk_jsonapi::{Callback, CallbackError, Context, Operation};

fn note(id: Option<&str>, attributes: Value) -> Value {
    match id {
        Some(id) => json!({ "data": { "type": "notes", "id": id, "attributes": attributes } }),
        None => json!({ "data": { "type": "notes", "attributes": attributes } }),
    }
}

fn update_token(response: &Response) -> String {
    response.data()["attributes"]["update-token"].as_str().unwrap_or_default().to_string()
}

/// Writes a competing note through the request's session after validation
/// passed, like a writer committing between load and write.
struct Rival(Operation);

#[async_trait]
impl Callback for Rival {
    fn name(&self) -> &str {
        "Rival"
    }

    fn matches(&self, ctx: &Context) -> bool {
        ctx.operation == self.0
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let record = ctx.record()?.clone();
        let id = match self.0 {
            Operation::Create => Uuid::new_v4(),
            _ => record.id(),
        };

        let mut rival = Record::with_id(record.meta().clone(), id);
        rival.set("text", "rival")?;
        rival.set("create_token", record.get_str("create_token").unwrap_or_default().to_string())?;
        rival.set("update_token", Uuid::new_v4().to_string())?;

        let session = ctx.session()?;
        match self.0 {
            Operation::Create => session.insert("notes", rival.to_document()).await?,
            _ => {
                session.replace("notes", rival.to_document()).await?;
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn idempotent_create_rejects_repeated_tokens() -> Result<()> {
    let fixture = Fixture::new();

    let missing = fixture.post("/notes", note(None, json!({ "text": "first" }))).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.detail(), "missing idempotent create token");

    let created = fixture
        .post("/notes", note(None, json!({ "text": "first", "create-token": "t1" })))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.data()["attributes"]["create-token"], "t1");
    assert!(uuid::Uuid::parse_str(&update_token(&created)).is_ok());

    let repeated = fixture
        .post("/notes", note(None, json!({ "text": "again", "create-token": "t1" })))
        .await;
    assert_eq!(repeated.status, StatusCode::CONFLICT);
    assert_eq!(repeated.detail(), "existing document with same idempotent create token");

    assert_eq!(fixture.store.documents("notes").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_with_one_token_store_one_note() -> Result<()> {
    let fixture = Fixture::new();
    let body = note(None, json!({ "text": "race", "create-token": "shared" }));

    let (first, second) = tokio::join!(fixture.post("/notes", body.clone()), fixture.post("/notes", body));

    let mut statuses = vec![first.status, second.status];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(fixture.store.documents("notes").await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn consistent_update_requires_the_stored_token() -> Result<()> {
    let fixture = Fixture::new();
    let created = fixture
        .post("/notes", note(None, json!({ "text": "draft", "create-token": "t1" })))
        .await;
    let id = created.id();
    let first_token = update_token(&created);

    let path = format!("/notes/{}", id);
    let updated = fixture
        .patch(&path, note(Some(&id), json!({ "text": "final", "update-token": first_token })))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.data()["attributes"]["text"], "final");
    let second_token = update_token(&updated);
    assert_ne!(second_token, first_token);

    let stale = fixture
        .patch(&path, note(Some(&id), json!({ "text": "stale", "update-token": first_token })))
        .await;
    assert_eq!(stale.status, StatusCode::CONFLICT);
    assert_eq!(stale.detail(), "invalid consistent update token");

    let tokenless = fixture.patch(&path, note(Some(&id), json!({ "text": "blind" }))).await;
    assert_eq!(tokenless.status, StatusCode::CONFLICT);

    let changed = fixture
        .patch(
            &path,
            note(Some(&id), json!({ "create-token": "t2", "update-token": second_token })),
        )
        .await;
    assert_eq!(changed.status, StatusCode::BAD_REQUEST);
    assert_eq!(changed.detail(), "idempotent create token cannot be changed");

    let found = fixture.get(&path).await;
    assert_eq!(found.data()["attributes"]["text"], "final");
    assert_eq!(update_token(&found), second_token);

    Ok(())
}

#[tokio::test]
async fn concurrent_updates_with_one_token_apply_once() -> Result<()> {
    let fixture = Fixture::new();
    let created = fixture
        .post("/notes", note(None, json!({ "text": "draft", "create-token": "t1" })))
        .await;
    let id = created.id();
    let token = update_token(&created);
    let path = format!("/notes/{}", id);

    let (first, second) = tokio::join!(
        fixture.patch(&path, note(Some(&id), json!({ "text": "left", "update-token": token }))),
        fixture.patch(&path, note(Some(&id), json!({ "text": "right", "update-token": token }))),
    );

    let (winner, loser) = match first.status {
        StatusCode::OK => (first, second),
        _ => (second, first),
    };
    assert_eq!(winner.status, StatusCode::OK);
    assert_eq!(loser.status, StatusCode::CONFLICT);

    let found = fixture.get(&path).await;
    assert_eq!(found.data()["attributes"]["text"], winner.data()["attributes"]["text"]);

    Ok(())
}

#[tokio::test]
async fn consistent_updates_forbid_partial_relationship_updates() -> Result<()> {
    let fixture = Fixture::new();
    let created = fixture
        .post("/notes", note(None, json!({ "text": "draft", "create-token": "t1" })))
        .await;

    let response = fixture
        .patch(&format!("/notes/{}/relationships/owner", created.id()), json!({ "data": null }))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.detail(), "partial updates not allowed with consistent updates");

    Ok(())
}

#[tokio::test]
async fn idempotent_create_loses_to_a_rival_insert() -> Result<()> {
    let fixture = Fixture::with_notes(common::notes().validator(Rival(Operation::Create)));

    let lost = fixture
        .post("/notes", note(None, json!({ "text": "mine", "create-token": "t1" })))
        .await;
    assert_eq!(lost.status, StatusCode::CONFLICT);
    assert_eq!(lost.detail(), "existing document with same idempotent create token");

    // the rival write shared the failed transaction
    assert!(fixture.store.documents("notes").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn consistent_update_loses_to_a_rival_write() -> Result<()> {
    let fixture = Fixture::with_notes(common::notes().validator(Rival(Operation::Update)));
    let created = fixture
        .post("/notes", note(None, json!({ "text": "draft", "create-token": "t1" })))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.id();
    let token = update_token(&created);
    let path = format!("/notes/{}", id);

    let lost = fixture
        .patch(&path, note(Some(&id), json!({ "text": "mine", "update-token": token })))
        .await;
    assert_eq!(lost.status, StatusCode::CONFLICT);
    assert_eq!(lost.detail(), "existing document with different consistent update token");

    let found = fixture.get(&path).await;
    assert_eq!(found.data()["attributes"]["text"], "draft");
    assert_eq!(update_token(&found), token);

    Ok(())
}
