//! Integration tests for the directory service and the client core over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::client::{
    ClientError, CompletionCache, HttpRemote, MemoryStore, RemoteStore, ResourceDirectory,
    SessionIdentity, VerificationController, VerificationOutcome, VoteLedger,
};
use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::models::{ResourceFields, TargetKind, VerificationStatus, VoteKind, VoteType};
use crate::{create_router, AppState};

const ADMIN_KEY: &str = "test-admin-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    admin: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path).await.expect("Failed to init DB");

        let config = Config {
            admin_psk: Some(ADMIN_KEY.to_string()),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            change_buffer: 64,
        };

        let app = create_router(AppState::new(Repository::new(pool), config));

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", ADMIN_KEY.parse().unwrap());

        TestFixture {
            client: Client::new(),
            admin: Client::builder().default_headers(headers).build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn remote(&self, admin: bool) -> Arc<HttpRemote> {
        let key = admin.then(|| ADMIN_KEY.to_string());
        Arc::new(HttpRemote::new(self.base_url.clone(), key))
    }

    /// A loaded client session for one visitor.
    async fn session(&self, visitor: &str, admin: bool) -> Session {
        let remote = self.remote(admin);
        let ledger = Arc::new(VoteLedger::new(
            remote.clone(),
            Arc::new(SessionIdentity::new(visitor)),
            Duration::from_millis(50),
        ));
        let cache = Arc::new(CompletionCache::load(Arc::new(MemoryStore::new())));
        let directory = Arc::new(ResourceDirectory::new(remote, ledger.clone(), cache.clone()));
        directory.load().await.expect("Failed to load directory");
        Session {
            verification: VerificationController::new(directory.clone(), ledger.clone(), cache.clone()),
            directory,
            ledger,
            cache,
        }
    }

    async fn admin_create(&self, name: &str) -> Value {
        let resp = self
            .admin
            .post(self.url("/api/admin/resources"))
            .json(&resource_json(name))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }
}

struct Session {
    directory: Arc<ResourceDirectory>,
    ledger: Arc<VoteLedger>,
    verification: VerificationController,
    cache: Arc<CompletionCache>,
}

fn resource_json(name: &str) -> Value {
    json!({
        "name": name,
        "type": "Clinic",
        "category": "Hospitals & Clinics",
        "address": "Chandavarkar Road, Borivali West",
        "services": ["OPD", "Pharmacy"],
        "status": "Open"
    })
}

fn fields(name: &str) -> ResourceFields {
    serde_json::from_value(resource_json(name)).unwrap()
}

/// Poll until `check` holds or a second passes.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let fixture = TestFixture::new().await;

    // Missing key
    let resp = fixture
        .client
        .post(fixture.url("/api/admin/resources"))
        .json(&resource_json("No Key Clinic"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Wrong key
    let resp = fixture
        .client
        .delete(fixture.url("/api/admin/resources/anything"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Bearer token works too
    let resp = fixture
        .client
        .post(fixture.url("/api/admin/resources"))
        .bearer_auth(ADMIN_KEY)
        .json(&resource_json("Bearer Clinic"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Public routes stay open
    let resp = fixture
        .client
        .get(fixture.url("/api/resources?live=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_community_submission_cannot_self_approve() {
    let fixture = TestFixture::new().await;

    let mut body = resource_json("Sneaky Shop");
    body["approved"] = json!(true);
    body["verificationStatus"] = json!("live");
    body["isAdminSubmitted"] = json!(true);

    let resp = fixture
        .client
        .post(fixture.url("/api/resources"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["approved"], false);
    assert_eq!(body["data"]["verificationStatus"], "pending");
    assert_eq!(body["data"]["isUserSubmitted"], true);
    assert_eq!(body["data"]["isAdminSubmitted"], false);
}

#[tokio::test]
async fn test_sunrise_clinic_goes_live_after_admin_approval() {
    let fixture = TestFixture::new().await;
    fixture.admin_create("Older Pharmacy").await;

    let visitor = fixture.session("visitor-a", false).await;
    let admin = fixture.session("admin", true).await;

    let submitted = visitor
        .directory
        .create_resource(fields("Sunrise Clinic"))
        .await
        .unwrap();
    assert!(!submitted.approved);
    assert_eq!(submitted.verification_status, VerificationStatus::Pending);
    assert!(!visitor
        .directory
        .live_resources()
        .await
        .iter()
        .any(|r| r.id == submitted.id));

    admin.directory.load().await.unwrap();
    let approved = admin.directory.approve_resource(&submitted.id).await.unwrap();
    assert!(approved.approved);
    assert_eq!(approved.verification_status, VerificationStatus::Live);

    let resp = fixture
        .client
        .get(fixture.url("/api/resources?live=true"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Sunrise Clinic", "Older Pharmacy"]);

    let live = admin.directory.live_resources().await;
    assert_eq!(live[0].id, submitted.id);
    assert_eq!(live.len(), 2);
}

#[tokio::test]
async fn test_duplicate_vote_counts_once() {
    let fixture = TestFixture::new().await;
    let created = fixture.admin_create("Corner Grocery").await;
    let id = created["id"].as_str().unwrap();

    let visitor = fixture.session("203.0.113.7", false).await;
    let receipt = visitor
        .ledger
        .cast_vote(VoteKind::Helpfulness, id, TargetKind::Resource, VoteType::Helpful)
        .await
        .unwrap();
    assert_eq!(receipt.counts.unwrap().helpful_votes, 1);

    let second = visitor
        .ledger
        .cast_vote(VoteKind::Helpfulness, id, TargetKind::Resource, VoteType::Helpful)
        .await;
    assert_eq!(second, Err(ClientError::AlreadyVoted));

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/resources/{}/counts", id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["helpfulVotes"], 1);
    assert_eq!(body["data"]["unhelpfulVotes"], 0);
}

#[tokio::test]
async fn test_approve_edit_applies_fields_once() {
    let fixture = TestFixture::new().await;
    let created = fixture.admin_create("Old Name Clinic").await;
    let id = created["id"].as_str().unwrap();

    let mut proposal = resource_json("New Name Clinic");
    proposal["hours"] = json!("9am - 9pm");
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/resources/{}/edits", id)))
        .json(&proposal)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let edit_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["verificationStatus"], "pending");

    // Resource untouched until approval
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/resources/{}", id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Old Name Clinic");

    let visitor = fixture.session("visitor-a", false).await;
    let updated = visitor.directory.approve_edit(&edit_id).await.unwrap();
    assert_eq!(updated.fields.name, "New Name Clinic");
    assert_eq!(updated.fields.hours.as_deref(), Some("9am - 9pm"));
    assert_eq!(updated.verification_status, VerificationStatus::Live);

    let again = visitor.directory.approve_edit(&edit_id).await;
    assert!(matches!(again, Err(ClientError::NotPending(_))));

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/edits/{}/approve", edit_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_PENDING");
}

#[tokio::test]
async fn test_failed_delete_restores_read_model() {
    let fixture = TestFixture::new().await;
    let created = fixture.admin_create("Keep Me Clinic").await;
    let id = created["id"].as_str().unwrap();
    fixture
        .client
        .post(fixture.url("/api/resources"))
        .json(&resource_json("Pending Stall"))
        .send()
        .await
        .unwrap();

    // No admin key: the store refuses the delete
    let visitor = fixture.session("visitor-a", false).await;
    let before = visitor.directory.view().await;
    assert_eq!(before.all_resources().len(), 2);

    let result = visitor.directory.delete_resource(id).await;
    assert!(matches!(result, Err(ClientError::RemoteWriteFailed(_))));

    let after = visitor.directory.view().await;
    assert_eq!(after.live_resources(), before.live_resources());
    assert_eq!(after.all_resources(), before.all_resources());
}

#[tokio::test]
async fn test_live_sync_follows_other_clients() {
    let fixture = TestFixture::new().await;
    let viewer = fixture.session("viewer", false).await;
    let _subscription = viewer.directory.start_sync().await.unwrap();

    let created = fixture.admin_create("Night Chemist").await;
    let id = created["id"].as_str().unwrap().to_string();

    let directory = viewer.directory.clone();
    let target = id.clone();
    assert!(
        eventually(|| {
            let directory = directory.clone();
            let target = target.clone();
            async move {
                directory
                    .live_resources()
                    .await
                    .iter()
                    .any(|r| r.id == target)
            }
        })
        .await
    );

    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/admin/resources/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert!(
        eventually(|| {
            let directory = directory.clone();
            async move { directory.live_count().await == 0 }
        })
        .await
    );
}

#[tokio::test]
async fn test_start_sync_sees_writes_made_after_load() {
    let fixture = TestFixture::new().await;
    fixture.admin_create("Early Pharmacy").await;

    let viewer = fixture.session("viewer", false).await;
    assert_eq!(viewer.directory.live_count().await, 1);

    // Committed between the initial load and the subscription
    let created = fixture.admin_create("Late Pharmacy").await;
    let id = created["id"].as_str().unwrap();

    let _subscription = viewer.directory.start_sync().await.unwrap();

    let live = viewer.directory.live_resources().await;
    assert_eq!(live.len(), 2);
    assert_eq!(live[0].id, id);
}

#[tokio::test]
async fn test_unhelpful_edit_vote_is_per_visitor() {
    let fixture = TestFixture::new().await;
    let created = fixture.admin_create("Station Clinic").await;
    let id = created["id"].as_str().unwrap();

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/resources/{}/edits", id)))
        .json(&resource_json("Station Clinic (moved)"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let edit_id = body["data"]["id"].as_str().unwrap().to_string();

    let a = fixture.session("visitor-a", false).await;
    let b = fixture.session("visitor-b", false).await;

    assert_eq!(
        a.verification.vote_unhelpful_on_edit(&edit_id).await.unwrap(),
        VerificationOutcome::Recorded
    );
    assert_eq!(
        a.verification.vote_unhelpful_on_edit(&edit_id).await.unwrap(),
        VerificationOutcome::AlreadyVerified
    );
    assert!(a.cache.has_completed(&edit_id));
    assert!(a.verification.pending_items().await.is_empty());

    let b_items = b.verification.pending_items().await;
    assert_eq!(b_items.len(), 1);
    assert_eq!(b_items[0].id(), edit_id);

    // The edit stays pending on the store
    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/edits/{}", edit_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["verificationStatus"], "pending");
}

#[tokio::test]
async fn test_visitor_count() {
    let fixture = TestFixture::new().await;
    let remote = fixture.remote(false);

    for visitor in ["a", "a", "b"] {
        remote
            .record_visit(&crate::models::RecordVisitRequest {
                voter_identity: visitor.to_string(),
                user_agent: Some("test-agent".to_string()),
            })
            .await
            .unwrap();
    }

    assert_eq!(remote.visitor_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_ip_lookup_endpoint() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/ip"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ip"], "127.0.0.1");

    let resp = fixture
        .client
        .get(fixture.url("/api/ip"))
        .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ip"], "198.51.100.4");
}

#[tokio::test]
async fn test_validation_errors() {
    let fixture = TestFixture::new().await;

    let mut body = resource_json("");
    body["name"] = json!("   ");
    let resp = fixture
        .client
        .post(fixture.url("/api/resources"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Helpfulness votes cannot target edits
    let resp = fixture
        .client
        .post(fixture.url("/api/votes/helpfulness"))
        .json(&json!({
            "targetId": "whatever",
            "targetKind": "resource_edit",
            "voterIdentity": "visitor-a",
            "voteType": "helpful"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown vote kind
    let resp = fixture
        .client
        .get(fixture.url(
            "/api/votes/popularity?targetId=x&targetKind=resource&voter=visitor-a",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_revision_increments_on_writes() {
    let fixture = TestFixture::new().await;

    let initial_resp = fixture
        .client
        .get(fixture.url("/api/snapshot/revision"))
        .send()
        .await
        .unwrap();
    let initial_body: Value = initial_resp.json().await.unwrap();
    let initial_revision = initial_body["data"]["revisionId"].as_i64().unwrap();

    let create_resp = fixture
        .client
        .post(fixture.url("/api/resources"))
        .json(&resource_json("Revision Clinic"))
        .send()
        .await
        .unwrap();
    let create_body: Value = create_resp.json().await.unwrap();
    assert_eq!(create_body["revisionId"].as_i64().unwrap(), initial_revision + 1);
    let id = create_body["data"]["id"].as_str().unwrap();

    let reject_resp = fixture
        .admin
        .post(fixture.url(&format!("/api/admin/resources/{}/reject", id)))
        .send()
        .await
        .unwrap();
    let reject_body: Value = reject_resp.json().await.unwrap();
    assert_eq!(reject_body["data"]["verificationStatus"], "rejected");
    assert_eq!(reject_body["revisionId"].as_i64().unwrap(), initial_revision + 2);

    let delete_resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/admin/resources/{}", id)))
        .send()
        .await
        .unwrap();
    let delete_body: Value = delete_resp.json().await.unwrap();
    assert_eq!(delete_body["revisionId"].as_i64().unwrap(), initial_revision + 3);

    let snapshot_resp = fixture
        .client
        .get(fixture.url("/api/snapshot"))
        .send()
        .await
        .unwrap();
    let snapshot_body: Value = snapshot_resp.json().await.unwrap();
    assert!(snapshot_body["data"]["resources"].as_array().unwrap().is_empty());
    assert_eq!(
        snapshot_body["data"]["revisionId"].as_i64().unwrap(),
        initial_revision + 3
    );
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/resources/non-existent-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let resp = fixture
        .client
        .post(fixture.url("/api/resources/non-existent-id/edits"))
        .json(&resource_json("Ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .client
        .post(fixture.url("/api/edits/non-existent-id/approve"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
