use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::models::{
    BroadcastMessage, CatalogFields, NewUpload, UploadOwner, UploadRecord, UploadSnapshot,
    UploadStatus, UPLOAD_STATUS_EVENT,
};
use catalog_db::{CatalogStore, MemoryCatalogStore, MemoryUploadStore, UploadStore};
use catalog_infra::broadcast::SIGNATURE_HEADER;
use catalog_infra::{
    BroadcastError, Broadcaster, HttpBroadcaster, HttpBroadcasterConfig, TopicBroadcaster,
    UploadNotifier,
};
use uuid::Uuid;

struct Fixture {
    uploads: Arc<MemoryUploadStore>,
    catalog: Arc<MemoryCatalogStore>,
    topic: Arc<TopicBroadcaster>,
    notifier: UploadNotifier,
}

fn fixture() -> Fixture {
    let uploads = Arc::new(MemoryUploadStore::new());
    let catalog = Arc::new(MemoryCatalogStore::new());
    let topic = Arc::new(TopicBroadcaster::new(16));
    let notifier = UploadNotifier::new(topic.clone(), uploads.clone(), catalog.clone());
    Fixture {
        uploads,
        catalog,
        topic,
        notifier,
    }
}

async fn create_upload(uploads: &MemoryUploadStore, user_id: Uuid) -> UploadRecord {
    uploads
        .create(NewUpload {
            user_id,
            filename: "1700000000_catalog.csv".to_string(),
            original_name: "catalog.csv".to_string(),
            file_path: "uploads/1700000000_catalog.csv".to_string(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn snapshot_carries_count_and_owner() {
    let fx = fixture();
    let owner = UploadOwner {
        id: Uuid::new_v4(),
        name: "Dana".to_string(),
    };
    fx.uploads.add_owner(owner.clone()).unwrap();
    let upload = create_upload(&fx.uploads, owner.id).await;
    fx.catalog
        .upsert("K1", &CatalogFields::default(), upload.id)
        .await
        .unwrap();

    let mut rx = fx.topic.subscribe();
    fx.notifier
        .announce(&upload, Some(40), Some("Working".to_string()))
        .await;

    let message = rx.recv().await.unwrap();
    assert_eq!(message.event, UPLOAD_STATUS_EVENT);
    assert_eq!(message.upload.id, upload.id);
    assert_eq!(message.upload.products_count, 1);
    assert_eq!(message.upload.user, Some(owner));
    assert_eq!(message.progress, Some(40));
    assert_eq!(message.message.as_deref(), Some("Working"));
}

#[tokio::test]
async fn repeated_announcement_is_suppressed() {
    let fx = fixture();
    let upload = create_upload(&fx.uploads, Uuid::new_v4()).await;
    let processing = fx
        .uploads
        .transition(upload.id, UploadStatus::Processing, None)
        .await
        .unwrap();

    let mut rx = fx.topic.subscribe();
    fx.notifier.announce(&processing, None, None).await;
    fx.notifier.announce(&processing, None, None).await;
    fx.notifier.announce(&processing, Some(100), None).await;

    assert_eq!(rx.recv().await.unwrap().progress, None);
    assert_eq!(rx.recv().await.unwrap().progress, Some(100));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn forgotten_upload_is_announced_again() {
    let fx = fixture();
    let upload = create_upload(&fx.uploads, Uuid::new_v4()).await;
    let processing = fx
        .uploads
        .transition(upload.id, UploadStatus::Processing, None)
        .await
        .unwrap();

    let mut rx = fx.topic.subscribe();
    fx.notifier.announce(&processing, None, None).await;
    fx.notifier.forget(upload.id);
    fx.notifier.announce(&processing, None, None).await;

    assert_eq!(rx.recv().await.unwrap().upload.id, upload.id);
    assert_eq!(rx.recv().await.unwrap().upload.id, upload.id);
}

#[tokio::test]
async fn publishing_without_subscribers_is_fine() {
    let fx = fixture();
    let upload = create_upload(&fx.uploads, Uuid::new_v4()).await;
    assert_eq!(fx.topic.subscriber_count(), 0);
    fx.notifier.announce(&upload, None, None).await;
}

struct FailingBroadcaster {
    attempts: AtomicUsize,
}

#[async_trait]
impl Broadcaster for FailingBroadcaster {
    fn topic(&self) -> &str {
        "file-uploads"
    }

    async fn publish(&self, _message: &BroadcastMessage) -> Result<(), BroadcastError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BroadcastError::Rejected {
            status: 503,
            body: "relay down".to_string(),
        })
    }
}

#[tokio::test]
async fn delivery_failure_is_swallowed() {
    let uploads = Arc::new(MemoryUploadStore::new());
    let broadcaster = Arc::new(FailingBroadcaster {
        attempts: AtomicUsize::new(0),
    });
    let notifier = UploadNotifier::new(
        broadcaster.clone(),
        uploads.clone(),
        Arc::new(MemoryCatalogStore::new()),
    );
    let upload = create_upload(&uploads, Uuid::new_v4()).await;

    notifier.announce(&upload, None, None).await;
    assert_eq!(broadcaster.attempts.load(Ordering::SeqCst), 1);
}

fn sample_message() -> BroadcastMessage {
    let now = chrono::Utc::now();
    let record = UploadRecord {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        filename: "1700000000_catalog.csv".to_string(),
        original_name: "catalog.csv".to_string(),
        file_path: "uploads/1700000000_catalog.csv".to_string(),
        file_hash: None,
        status: UploadStatus::Completed,
        error_message: None,
        processed_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    BroadcastMessage::status_changed(UploadSnapshot::new(&record, 3, None), Some(100), None)
}

#[tokio::test]
async fn http_broadcaster_signs_body() {
    let mut server = mockito::Server::new_async().await;
    let message = sample_message();
    let body = serde_json::to_string(&message).unwrap();
    let signature = HttpBroadcaster::sign_payload(&body, "s3cret").unwrap();

    let mock = server
        .mock("POST", "/broadcast")
        .match_header(SIGNATURE_HEADER, format!("v1={}", signature).as_str())
        .match_header("x-broadcast-topic", "file-uploads")
        .with_status(202)
        .create_async()
        .await;

    let broadcaster = HttpBroadcaster::new(HttpBroadcasterConfig {
        url: format!("{}/broadcast", server.url()),
        secret: Some("s3cret".to_string()),
        timeout_seconds: 5,
    })
    .unwrap();

    broadcaster.publish(&message).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn http_broadcaster_reports_rejection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/broadcast")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let broadcaster = HttpBroadcaster::new(HttpBroadcasterConfig {
        url: format!("{}/broadcast", server.url()),
        secret: None,
        timeout_seconds: 5,
    })
    .unwrap();

    let err = broadcaster.publish(&sample_message()).await.unwrap_err();
    assert!(matches!(err, BroadcastError::Rejected { status: 500, .. }));
}
