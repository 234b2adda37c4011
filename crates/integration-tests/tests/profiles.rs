//! User profiles, favourites and profile images.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};
use integration_tests::Harness;
use jb_core::documents::USERS;
use jb_core::{profile_image_path, user_image_path, AppError, BlobStore, LocalCache};
use jb_sync::{ProfileService, ProfileUpdate};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn profiles(harness: &Harness) -> ProfileService {
    ProfileService::new(std::sync::Arc::clone(&harness.gateway))
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn created_profile_round_trips() {
    let harness = Harness::new();
    let service = profiles(&harness);

    let created = assert_ok!(service.create_profile("u1", " ana@example.com ").await);
    assert_eq!(created.email, "ana@example.com");
    assert!(created.favourite_joke_ids.is_empty());
    assert_eq!(harness.docs.field(USERS, "u1", "email"), Some(json!("ana@example.com")));

    let loaded = assert_ok!(service.load_profile("u1").await);
    assert_eq!(loaded, Some(created));
    assert_eq!(service.load_profile("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn email_without_at_sign_is_rejected() {
    let harness = Harness::new();
    let err = assert_err!(profiles(&harness).create_profile("u1", "not-an-email").await);
    assert!(matches!(err, AppError::ValidationError(_)));
    assert!(harness.docs.is_empty(USERS));
}

#[tokio::test]
async fn update_touches_only_given_fields() {
    let harness = Harness::new();
    let service = profiles(&harness);
    service.create_profile("u1", "ana@example.com").await.unwrap();

    let update = ProfileUpdate {
        name: Some(" Ana ".into()),
        username: Some("ana.b_1".into()),
    };
    let user = assert_ok!(service.update_profile("u1", update).await);
    assert_eq!(user.name.as_deref(), Some("Ana"));
    assert_eq!(user.username.as_deref(), Some("ana.b_1"));

    let renamed = ProfileUpdate {
        name: Some("Ana B".into()),
        ..Default::default()
    };
    service.update_profile("u1", renamed).await.unwrap();
    let stored = service.load_profile("u1").await.unwrap().unwrap();
    assert_eq!(stored.name.as_deref(), Some("Ana B"));
    assert_eq!(stored.username.as_deref(), Some("ana.b_1"));
    assert_eq!(stored.email, "ana@example.com");
}

#[tokio::test]
async fn bad_usernames_and_missing_users_fail() {
    let harness = Harness::new();
    let service = profiles(&harness);
    service.create_profile("u1", "ana@example.com").await.unwrap();

    let bad = ProfileUpdate {
        username: Some("no spaces!".into()),
        ..Default::default()
    };
    assert!(matches!(
        service.update_profile("u1", bad).await,
        Err(AppError::ValidationError(_))
    ));
    assert_eq!(harness.docs.field(USERS, "u1", "username"), None);

    let err = assert_err!(service.update_profile("ghost", ProfileUpdate::default()).await);
    assert!(matches!(err, AppError::NotFound(_, id) if id == "ghost"));
    assert!(matches!(
        service.toggle_favourite("ghost", "joke-1").await,
        Err(AppError::NotFound(..))
    ));
}

#[tokio::test]
async fn favourites_toggle_in_and_out() {
    let harness = Harness::new();
    let service = profiles(&harness);
    service.create_profile("u1", "ana@example.com").await.unwrap();

    service.toggle_favourite("u1", "joke-1").await.unwrap();
    let user = service.toggle_favourite("u1", "joke-2").await.unwrap();
    assert_eq!(user.favourite_joke_ids, ["joke-1", "joke-2"]);
    assert_eq!(
        harness.docs.field(USERS, "u1", "favouriteJokesIDs"),
        Some(json!(["joke-1", "joke-2"]))
    );

    let user = service.toggle_favourite("u1", "joke-1").await.unwrap();
    assert_eq!(user.favourite_joke_ids, ["joke-2"]);
    let stored = service.load_profile("u1").await.unwrap().unwrap();
    assert_eq!(stored.favourite_joke_ids, ["joke-2"]);
}

#[tokio::test]
async fn uploaded_profile_image_is_resized_and_cached() {
    let harness = Harness::new();
    let images = harness.images();

    let meta = assert_ok!(images.upload_profile_image("u1", &png(2000, 1000)).await);
    assert_eq!(meta.path, profile_image_path("u1"));
    assert_eq!(meta.content_type, "image/jpeg");

    let profile = images.profile_image("u1").await.unwrap();
    let decoded = image::load_from_memory(&profile).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1024, 512));

    let avatar = images.user_image("u1").await.unwrap();
    assert_eq!(image::load_from_memory(&avatar).unwrap().width(), 256);

    let cached = harness.reopened_cache().load_image(&profile_image_path("u1")).unwrap();
    assert_eq!(cached.updated_at, meta.updated_at);
    assert_eq!(cached.bytes, profile);
}

#[tokio::test]
async fn newer_remote_image_replaces_the_cached_copy() {
    let harness = Harness::new();
    let images = harness.images();
    let path = user_image_path("u1");

    harness.blobs.upload(&path, vec![1, 1], "image/jpeg").await.unwrap();
    assert_eq!(images.user_image("u1").await, Some(vec![1, 1]));

    let newer = harness.blobs.upload(&path, vec![2, 2], "image/jpeg").await.unwrap();
    assert_eq!(images.user_image("u1").await, Some(vec![2, 2]));
    let cached = harness.reopened_cache().load_image(&path).unwrap();
    assert_eq!(cached.updated_at, newer.updated_at);

    assert_eq!(images.profile_image("u1").await, None);
}

#[tokio::test]
async fn undecodable_upload_is_an_image_error() {
    let harness = Harness::new();
    let err = assert_err!(harness.images().upload_profile_image("u1", b"plain text").await);
    assert!(matches!(err, AppError::Image(_)));
    assert_eq!(harness.blobs.download(&profile_image_path("u1")).await.unwrap(), None);
}

#[tokio::test]
async fn prefetch_skips_avatars_whose_cached_stamp_is_current() {
    let harness = Harness::new();
    let images = harness.images();
    for user in ["u1", "u2"] {
        harness.blobs.upload(&user_image_path(user), vec![7], "image/jpeg").await.unwrap();
    }
    let users = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];

    assert_eq!(images.prefetch_user_images(&users).await, 2);
    assert_eq!(images.prefetch_user_images(&users).await, 0);

    harness.blobs.upload(&user_image_path("u2"), vec![8], "image/jpeg").await.unwrap();
    assert_eq!(images.prefetch_user_images(&users).await, 1);
    let cached = harness.reopened_cache().load_image(&user_image_path("u2")).unwrap();
    assert_eq!(cached.bytes, vec![8]);
}
