//! HTTP adapter against a mock PostgREST/storage server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use nested::contract::error::AssetError;
use nested::contract::model::{ProfileFields, SaveOutcome};
use nested::domain::error::DomainError;
use nested::domain::ports::{AssetBucket, ListFilter, Lookup, RemoteError, RemoteStore, Table};
use nested::domain::service::Service;
use nested::infra::cache::MemoryCache;
use nested::infra::remote::{BackendClient, HttpRemoteStore};

const KEY: &str = "anon-test-key-0123456789";

fn store(server: &MockServer) -> HttpRemoteStore {
    let client = BackendClient::new(&server.base_url(), KEY, Duration::from_secs(5)).unwrap();
    HttpRemoteStore::new(client)
}

#[tokio::test]
async fn get_returns_first_row_or_none() {
    let server = MockServer::start();
    let found = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/profiles")
            .query_param("id", "eq.u1")
            .header("apikey", KEY);
        then.status(200).json_body(json!([{"id": "u1", "first_name": "Ada"}]));
    });
    let missing = server.mock(|when, then| {
        when.method(GET).path("/rest/v1/profiles").query_param("id", "eq.u2");
        then.status(200).json_body(json!([]));
    });

    let s = store(&server);
    let row = s.get(Table::Profiles, "u1").await.unwrap().unwrap();
    assert_eq!(row["first_name"], "Ada");
    assert!(s.get(Table::Profiles, "u2").await.unwrap().is_none());
    found.assert();
    missing.assert();
}

#[tokio::test]
async fn upsert_posts_with_merge_preference() {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/profiles")
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json_body(json!({"id": "u1", "bio": "hi"}));
        then.status(201).json_body(json!([{"id": "u1", "bio": "hi", "first_name": "Ada"}]));
    });

    let row = store(&server)
        .upsert(Table::Profiles, "u1", &json!({"bio": "hi"}))
        .await
        .unwrap();
    assert_eq!(row["first_name"], "Ada");
    m.assert();
}

#[tokio::test]
async fn unique_violation_maps_to_constraint_with_field() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/rest/v1/profiles");
        then.status(409).json_body(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"profiles_username_key\"",
            "details": "Key (username)=(ada) already exists."
        }));
    });

    let err = store(&server)
        .upsert(Table::Profiles, "u1", &json!({"username": "ada"}))
        .await
        .unwrap_err();
    assert_eq!(err.uniqueness_field(), Some("username"));
}

#[tokio::test]
async fn server_errors_are_transport_failures() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/v1/projects");
        then.status(503).body("upstream down");
    });

    let err = store(&server)
        .list(Table::Projects, &ListFilter::Published)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)));
    assert!(err.uniqueness_field().is_none());
}

#[tokio::test]
async fn list_and_delete_use_filters() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/projects")
            .query_param("owner_id", "eq.u1")
            .query_param("order", "updated_at.desc");
        then.status(200).json_body(json!([{"id": "a"}, {"id": "b"}]));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/rest/v1/projects").query_param("id", "eq.a");
        then.status(200).json_body(json!([{"id": "a"}]));
    });

    let s = store(&server);
    let rows = s
        .list(Table::Projects, &ListFilter::OwnedBy(common::user("u1")))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(s.delete(Table::Projects, "a").await.unwrap());
    list.assert();
    delete.assert();
}

#[tokio::test]
async fn lookups() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/profiles")
            .query_param("username", r"ilike.ada\_l")
            .query_param("id", "neq.u1");
        then.status(200).json_body(json!([{"id": "u2"}]));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/rpc/email_exists")
            .json_body(json!({"email": "a@nyu.edu"}));
        then.status(200).json_body(json!(false));
    });

    let s = store(&server);
    let taken = s
        .lookup(&Lookup::UsernameTaken {
            username: "ada_l".to_string(),
            except: Some(common::user("u1")),
        })
        .await
        .unwrap();
    assert!(taken);
    let registered = s
        .lookup(&Lookup::EmailRegistered("a@nyu.edu".to_string()))
        .await
        .unwrap();
    assert!(!registered);
}

#[tokio::test]
async fn upload_returns_public_url_or_rejection() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/storage/v1/object/avatars/u1/avatar.png")
            .header("x-upsert", "true")
            .header("content-type", "image/png");
        then.status(200).json_body(json!({"Key": "avatars/u1/avatar.png"}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/storage/v1/object/project-icons/u1/p.png");
        then.status(413).json_body(json!({"error": "Payload too large"}));
    });

    let s = store(&server);
    let url = s
        .upload_asset(AssetBucket::Avatars, "u1/avatar.png", &common::png(4))
        .await
        .unwrap();
    assert_eq!(
        url,
        format!("{}/storage/v1/object/public/avatars/u1/avatar.png", server.base_url())
    );

    let err = s
        .upload_asset(AssetBucket::ProjectIcons, "u1/p.png", &common::png(4))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RemoteError::AssetRejected(AssetError::Rejected { ref reason }) if reason == "Payload too large"
    ));
}

#[tokio::test]
async fn service_over_http_handles_conflict_and_outage() {
    let server = MockServer::start();
    let mut conflict = server.mock(|when, then| {
        when.method(POST).path("/rest/v1/profiles");
        then.status(409).json_body(json!({"code": "23505", "message": "duplicate key", "details": "Key (username)=(ada) already exists."}));
    });

    let cache = Arc::new(MemoryCache::new());
    let svc = Service::new(
        Some(Arc::new(store(&server))),
        cache.clone(),
        common::mail_policy(),
    );
    let fields = ProfileFields {
        username: Some("ada".to_string()),
        ..ProfileFields::default()
    };

    let err = svc.save_profile(&common::session("u1"), fields.clone()).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict { ref field } if field == "username"));
    assert!(cache.is_empty());

    conflict.delete();
    server.mock(|when, then| {
        when.method(POST).path("/rest/v1/profiles");
        then.status(502).body("bad gateway");
    });
    let out = svc.save_profile(&common::session("u1"), fields).await.unwrap();
    assert!(matches!(out, SaveOutcome::SavedLocallyOnly(ref p) if p.username.as_deref() == Some("ada")));
    assert_eq!(cache.len(), 1);
}
