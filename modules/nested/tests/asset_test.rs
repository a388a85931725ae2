mod common;

use serde_json::json;

use common::{cached_profile, cached_projects, draft, png, service, session, FakeRemote, UploadMode};
use nested::contract::error::AssetError;
use nested::contract::model::{Asset, AssetUrl, ProjectIcon};
use nested::domain::error::DomainError;
use nested::domain::ports::Table;

#[tokio::test]
async fn avatar_upload_sets_hosted_url_on_profile() {
    let remote = FakeRemote::new();
    let (svc, _) = service(Some(remote.clone()));

    let (url, out) = svc.upload_avatar(&session("u1"), png(1024)).await.unwrap();

    assert_eq!(url, AssetUrl::Hosted("https://cdn.test/avatars/u1/avatar.png".to_string()));
    assert!(out.is_synced());
    assert_eq!(out.record().avatar.as_deref(), Some(url.as_str()));
    assert_eq!(remote.row(Table::Profiles, "u1").unwrap()["avatar"], url.as_str());
}

#[tokio::test]
async fn unsupported_or_oversized_files_never_reach_storage() {
    let remote = FakeRemote::new();
    let (svc, _) = service(Some(remote.clone()));

    let pdf = Asset {
        file_name: "cv.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        bytes: vec![1, 2, 3],
    };
    assert!(matches!(
        svc.upload_avatar(&session("u1"), pdf).await,
        Err(DomainError::AssetRejected(AssetError::UnsupportedType { .. }))
    ));

    let huge = png(5 * 1024 * 1024 + 1);
    assert!(matches!(
        svc.upload_avatar(&session("u1"), huge).await,
        Err(DomainError::AssetRejected(AssetError::TooLarge { .. }))
    ));
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn unreachable_storage_falls_back_to_inline_data() {
    let remote = FakeRemote::new();
    remote.set_upload_mode(UploadMode::Fail);
    let (svc, cache) = service(Some(remote.clone()));

    let asset = Asset {
        file_name: "a.gif".to_string(),
        mime_type: "image/gif".to_string(),
        bytes: b"GIF89a".to_vec(),
    };
    let (url, out) = svc.upload_avatar(&session("u1"), asset).await.unwrap();

    assert_eq!(url, AssetUrl::Inline("data:image/gif;base64,R0lGODlh".to_string()));
    // the data URI stays on this device
    assert!(!out.is_synced());
    assert_eq!(remote.calls("upsert"), 0);
    assert!(remote.row(Table::Profiles, "u1").is_none());
    let cached = cached_profile(&cache, "u1").unwrap();
    assert_eq!(cached["record"]["avatar"], "data:image/gif;base64,R0lGODlh");
    assert_eq!(cached["unsynced"], true);
}

#[tokio::test]
async fn inline_avatar_keeps_known_remote_fields_locally() {
    let remote = FakeRemote::new();
    remote.seed(
        Table::Profiles,
        json!({"id": "u1", "first_name": "Ada", "avatar": "https://cdn.test/old.png"}),
    );
    remote.set_upload_mode(UploadMode::Fail);
    let (svc, cache) = service(Some(remote.clone()));

    let (url, out) = svc.upload_avatar(&session("u1"), png(8)).await.unwrap();

    assert!(matches!(url, AssetUrl::Inline(_)));
    assert!(!out.is_synced());
    assert_eq!(out.record().first_name, "Ada");
    assert_eq!(out.record().avatar.as_deref(), Some(url.as_str()));
    assert_eq!(
        remote.row(Table::Profiles, "u1").unwrap()["avatar"],
        "https://cdn.test/old.png"
    );
    assert_eq!(cached_profile(&cache, "u1").unwrap()["unsynced"], true);
}

#[tokio::test]
async fn storage_rejection_is_surfaced_without_fallback() {
    let remote = FakeRemote::new();
    remote.set_upload_mode(UploadMode::Reject);
    let (svc, cache) = service(Some(remote.clone()));

    let err = svc.upload_avatar(&session("u1"), png(10)).await.unwrap_err();

    assert!(matches!(err, DomainError::AssetRejected(AssetError::Rejected { .. })));
    assert!(cached_profile(&cache, "u1").is_none());
}

#[tokio::test]
async fn local_only_avatar_is_inline() {
    let (svc, _) = service(None);
    let (url, out) = svc.upload_avatar(&session("u1"), png(3)).await.unwrap();
    assert!(matches!(url, AssetUrl::Inline(ref u) if u.starts_with("data:image/png;base64,")));
    assert!(!out.is_synced());
}

#[tokio::test]
async fn project_icon_upload_updates_project() {
    let remote = FakeRemote::new();
    let (svc, _) = service(Some(remote.clone()));
    let project = svc
        .create_project(&session("u1"), draft("Nest"))
        .await
        .unwrap()
        .into_record();

    let (url, out) = svc
        .upload_project_icon(&session("u1"), project.id, png(100))
        .await
        .unwrap();

    assert_eq!(
        url.as_str(),
        format!("https://cdn.test/project-icons/u1/{}.png", project.id)
    );
    assert_eq!(out.record().icon, ProjectIcon::Image(url.as_str().to_string()));

    // icons have a lower ceiling than avatars
    let err = svc
        .upload_project_icon(&session("u1"), project.id, png(2 * 1024 * 1024 + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AssetRejected(AssetError::TooLarge { .. })));

    let err = svc
        .upload_project_icon(&session("u2"), project.id, png(100))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotOwner { .. }));
}

#[tokio::test]
async fn unreachable_storage_keeps_inline_icon_off_the_remote() {
    let remote = FakeRemote::new();
    let (svc, cache) = service(Some(remote.clone()));
    let project = svc
        .create_project(&session("u1"), draft("Nest"))
        .await
        .unwrap()
        .into_record();
    let key = project.id.to_string();
    let icon_before = remote.row(Table::Projects, &key).unwrap()["icon"].clone();
    let upserts_before = remote.calls("upsert");
    remote.set_upload_mode(UploadMode::Fail);

    let (url, out) = svc
        .upload_project_icon(&session("u1"), project.id, png(100))
        .await
        .unwrap();

    assert!(matches!(url, AssetUrl::Inline(ref u) if u.starts_with("data:image/png;base64,")));
    assert!(!out.is_synced());
    assert_eq!(out.record().icon, ProjectIcon::Image(url.as_str().to_string()));
    assert_eq!(remote.calls("upsert"), upserts_before);
    assert_eq!(remote.row(Table::Projects, &key).unwrap()["icon"], icon_before);

    let cached = cached_projects(&cache, "u1").unwrap();
    let entry = cached
        .iter()
        .find(|c| c["record"]["id"] == key.as_str())
        .unwrap();
    assert_eq!(entry["unsynced"], true);
    assert_eq!(entry["record"]["icon"], json!(out.record().icon));
}
