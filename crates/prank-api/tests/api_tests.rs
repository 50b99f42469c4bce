//! Handler tests over the in-memory store and provider fakes

use actix_web::{test, web, App};
use prank_api::{configure, AppState};
use prank_auth::{CronSecret, JwtService};
use prank_core::models::{
    settings::keys, CallRequest, CallStatus, Package, PackageCatalog, ProviderKind, UserRole,
};
use prank_core::traits::{ModerationClient, ProviderSet};
use prank_services::testing::{
    sample_call, FakeCallProvider, FakeModerationClient, FakePaymentGateway, FakeSmsSender,
    InMemoryStore,
};
use prank_services::{
    CallDispatcher, ContentModerator, PaymentService, RevealNotifier, SchedulerSweep,
    SettingsService, StatusReconciler,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const CRON_SECRET: &str = "cron-test-secret";

struct TestEnv {
    store: Arc<InMemoryStore>,
    twilio: Arc<FakeCallProvider>,
    gateway: Arc<FakePaymentGateway>,
    sms: Arc<FakeSmsSender>,
    jwt: Arc<JwtService>,
    state: AppState,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_classifier(FakeModerationClient::approving())
    }

    fn with_classifier(classifier: FakeModerationClient) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let twilio = Arc::new(FakeCallProvider::new(ProviderKind::Twilio));
        let vapi = Arc::new(FakeCallProvider::new(ProviderKind::Vapi));
        let gateway = Arc::new(FakePaymentGateway::new());
        let providers = ProviderSet::new().with(twilio.clone()).with(vapi);
        let classifier: Arc<dyn ModerationClient> = Arc::new(classifier);
        let moderator = Arc::new(ContentModerator::new(Some(classifier), &[]));

        let dispatcher = Arc::new(CallDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            providers.clone(),
            moderator.clone(),
        ));
        let sms = Arc::new(FakeSmsSender::new());
        let notifier = Arc::new(RevealNotifier::new(store.clone(), store.clone(), sms.clone()));
        let state = AppState {
            dispatcher: dispatcher.clone(),
            reconciler: Arc::new(StatusReconciler::new(
                store.clone(),
                store.clone(),
                store.clone(),
                providers,
                notifier,
            )),
            scheduler: Arc::new(SchedulerSweep::new(store.clone(), store.clone(), dispatcher)),
            moderator,
            payments: Arc::new(PaymentService::new(
                gateway.clone(),
                store.clone(),
                store.clone(),
                PackageCatalog::new(vec![
                    Package::one_time("single", "1 Prank", 1, 299),
                    Package::one_time("pack_3", "3 Pranks", 3, 799),
                    Package::recurring("monthly", "Monthly Prankster", 5, 999),
                ]),
            )),
            settings: Arc::new(SettingsService::new(store.clone(), store.clone())),
            calls: store.clone(),
            ledger: store.clone(),
            payment_records: store.clone(),
            audit: store.clone(),
            media_stream_url: None,
        };
        store.set_setting(keys::CALL_PROVIDER, "twilio");

        Self {
            store,
            twilio,
            gateway,
            sms,
            jwt: Arc::new(JwtService::new("api-test-secret", 3600)),
            state,
        }
    }

    fn token(&self, user_id: Uuid, role: UserRole) -> String {
        format!(
            "Bearer {}",
            self.jwt.create_token_for_user(user_id, role).unwrap()
        )
    }
}

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($env.state.clone()))
                .app_data(web::Data::new($env.jwt.clone()))
                .app_data(web::Data::new(CronSecret::new(CRON_SECRET)))
                .configure(configure),
        )
        .await
    };
}

fn status_form(sid: &str, status: &str, duration: &str) -> String {
    format!(
        "CallSid={}&CallStatus={}&CallDuration={}&AccountSid=AC123",
        sid, status, duration
    )
}

#[actix_web::test]
async fn test_health() {
    let env = TestEnv::new();
    let app = app!(env);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_dispatch_then_duplicate_completion_consumes_once() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(2, None);
    let id = env.store.insert_call(sample_call(user));

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/dispatch")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({ "callRequestId": id }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    let sid = body["providerCallId"].as_str().unwrap().to_string();
    assert_eq!(env.twilio.started(), vec![id]);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/webhooks/twilio/status")
            .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
            .set_payload(status_form(&sid, "completed", "45"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    let call = env.store.call(id).unwrap();
    assert_eq!(call.call_status, CallStatus::Completed);
    assert_eq!(call.duration_seconds, Some(45));
    assert_eq!(env.store.credits(user), 1);
}

#[actix_web::test]
async fn test_dispatch_other_users_request_is_not_found() {
    let env = TestEnv::new();
    let app = app!(env);
    let owner = env.store.add_user(1, None);
    let intruder = env.store.add_user(1, None);
    let id = env.store.insert_call(sample_call(owner));

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/dispatch")
        .insert_header(("Authorization", env.token(intruder, UserRole::User)))
        .set_json(json!({ "callRequestId": id }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(env.twilio.started().is_empty());
}

#[actix_web::test]
async fn test_dispatch_without_credits_is_payment_required() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(0, None);
    let id = env.store.insert_call(sample_call(user));

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/dispatch")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({ "callRequestId": id }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    assert_eq!(env.store.call(id).unwrap().call_status, CallStatus::Pending);
}

#[actix_web::test]
async fn test_dispatch_requires_authentication() {
    let env = TestEnv::new();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/dispatch")
        .set_json(json!({ "callRequestId": Uuid::new_v4() }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_status_webhook_always_acknowledges() {
    let env = TestEnv::new();
    let app = app!(env);

    let unknown = test::TestRequest::post()
        .uri("/webhooks/twilio/status")
        .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
        .set_payload(status_form("CA_unknown", "completed", "10"))
        .to_request();
    assert_eq!(test::call_service(&app, unknown).await.status(), 200);

    let garbage = test::TestRequest::post()
        .uri("/webhooks/twilio/status")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    assert_eq!(test::call_service(&app, garbage).await.status(), 200);
}

#[actix_web::test]
async fn test_vapi_end_of_call_report() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(1, None);
    let id = env.store.insert_call(CallRequest {
        call_status: CallStatus::InProgress,
        call_provider: Some(ProviderKind::Vapi),
        provider_call_id: Some("vapi-abc".to_string()),
        ..sample_call(user)
    });

    let req = test::TestRequest::post()
        .uri("/webhooks/vapi")
        .set_json(json!({
            "message": {
                "type": "end-of-call-report",
                "endedReason": "customer-ended-call",
                "durationSeconds": 62.4,
                "recordingUrl": "https://storage.vapi.ai/rec.wav",
                "call": { "id": "vapi-abc" }
            }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let call = env.store.call(id).unwrap();
    assert_eq!(call.call_status, CallStatus::Completed);
    assert_eq!(call.duration_seconds, Some(62));
    assert_eq!(
        call.recording_url.as_deref(),
        Some("https://storage.vapi.ai/rec.wav")
    );
    assert_eq!(env.store.credits(user), 0);
}

#[actix_web::test]
async fn test_vapi_unanswered_call_is_not_billed() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(2, Some("+393401112233"));
    let id = env.store.insert_call(CallRequest {
        call_status: CallStatus::Ringing,
        call_provider: Some(ProviderKind::Vapi),
        provider_call_id: Some("vapi-na".to_string()),
        send_reveal_sms: true,
        ..sample_call(user)
    });

    let messages = [
        json!({
            "message": { "type": "status-update", "status": "ended", "call": { "id": "vapi-na" } }
        }),
        json!({
            "message": {
                "type": "end-of-call-report",
                "endedReason": "customer-did-not-answer",
                "durationSeconds": 0,
                "call": { "id": "vapi-na" }
            }
        }),
    ];
    for message in messages {
        let req = test::TestRequest::post()
            .uri("/webhooks/vapi")
            .set_json(message)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    assert_eq!(env.store.call(id).unwrap().call_status, CallStatus::NoAnswer);
    assert_eq!(env.store.credits(user), 2);
    assert!(env.sms.sent().is_empty());
}

#[actix_web::test]
async fn test_end_call_without_provider_cancels() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(1, None);
    let id = env.store.insert_call(sample_call(user));

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/end")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({ "callRequestId": id }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "cancelled");
    assert!(env.twilio.ended().is_empty());
}

#[actix_web::test]
async fn test_end_call_requires_an_id() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(1, None);

    let req = test::TestRequest::post()
        .uri("/api/v1/calls/end")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn test_scheduler_sweep_requires_cron_secret() {
    let env = TestEnv::new();
    let app = app!(env);

    let denied = test::TestRequest::post()
        .uri("/api/v1/scheduler/sweep")
        .to_request();
    assert_eq!(test::call_service(&app, denied).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/api/v1/scheduler/sweep")
        .insert_header(("Authorization", format!("Bearer {}", CRON_SECRET)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["processed"], 0);
    assert_eq!(body["provider"], "vapi");
}

#[actix_web::test]
async fn test_verify_payment_is_idempotent() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(0, None);
    env.gateway.add_paid_session("cs_test_paid", user, "pack_3");

    let mut totals = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/payments/verify")
            .insert_header(("Authorization", env.token(user, UserRole::User)))
            .set_json(json!({ "sessionId": "cs_test_paid" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        totals.push((body["credits_added"].clone(), body["total_credits"].clone()));
    }

    assert_eq!(totals[0], (json!(3), json!(3)));
    assert_eq!(totals[1], (json!(0), json!(3)));
    assert_eq!(env.store.credits(user), 3);
}

fn invoice_paid(invoice_id: &str) -> Value {
    json!({
        "id": "evt_test_1",
        "type": "invoice.paid",
        "data": { "object": { "id": invoice_id, "status": "paid" } }
    })
}

#[actix_web::test]
async fn test_stripe_renewal_credits_each_invoice_once() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(1, None);
    env.gateway.add_renewal_invoice("in_test_renewal", user, "monthly");

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/payments/webhook")
            .set_json(invoice_paid("in_test_renewal"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    assert_eq!(env.store.credits(user), 6);

    let other = test::TestRequest::post()
        .uri("/api/v1/payments/webhook")
        .set_json(json!({
            "type": "customer.created",
            "data": { "object": { "id": "cus_test_1" } }
        }))
        .to_request();
    assert_eq!(test::call_service(&app, other).await.status(), 200);
}

#[actix_web::test]
async fn test_stripe_unknown_invoice_is_redelivered() {
    let env = TestEnv::new();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/webhook")
        .set_json(invoice_paid("in_missing"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 502);
    assert_eq!(env.store.payment_count(), 0);
}

#[actix_web::test]
async fn test_verify_payment_of_another_user_is_forbidden() {
    let env = TestEnv::new();
    let app = app!(env);
    let owner = env.store.add_user(0, None);
    let intruder = env.store.add_user(0, None);
    env.gateway.add_paid_session("cs_test_paid", owner, "single");

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/verify")
        .insert_header(("Authorization", env.token(intruder, UserRole::User)))
        .set_json(json!({ "sessionId": "cs_test_paid" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    assert_eq!(env.store.credits(intruder), 0);
}

#[actix_web::test]
async fn test_checkout_returns_url() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(0, None);

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/checkout")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({ "packageId": "single" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["url"].as_str().unwrap().starts_with("https://"));
    assert_eq!(env.gateway.created().len(), 1);
}

#[actix_web::test]
async fn test_content_check_blocks_and_fails_open() {
    let env = TestEnv::with_classifier(FakeModerationClient::blocking(
        "harassment",
        "This theme is not allowed",
    ));
    let app = app!(env);
    let user = env.store.add_user(0, None);

    let req = test::TestRequest::post()
        .uri("/api/v1/content/check")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({ "theme": "Pizza delivery", "language": "English" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["approved"], false);
    assert_eq!(body["blocked"], true);
    assert_eq!(body["category"], "harassment");

    let env = TestEnv::with_classifier(FakeModerationClient::failing());
    let app = app!(env);
    let req = test::TestRequest::post()
        .uri("/api/v1/content/check")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .set_json(json!({ "theme": "Pizza delivery", "language": "English" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["approved"], true);
}

#[actix_web::test]
async fn test_admin_settings_update_and_audit() {
    let env = TestEnv::new();
    let app = app!(env);
    let admin = Uuid::new_v4();

    let req = test::TestRequest::put()
        .uri("/api/v1/admin/settings")
        .insert_header(("Authorization", env.token(admin, UserRole::Admin)))
        .set_json(json!({ "settings": { "count_failed_calls": "true" } }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["settings"]["count_failed_calls"], "true");

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/audit-logs?page=1&per_page=10")
        .insert_header(("Authorization", env.token(admin, UserRole::Admin)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["entity_id"], "count_failed_calls");

    let user = env.store.add_user(0, None);
    let req = test::TestRequest::get()
        .uri("/api/v1/admin/settings")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn test_voice_webhook_falls_back_to_spoken_greeting() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(1, None);
    let id = env.store.insert_call(sample_call(user));

    let req = test::TestRequest::post()
        .uri(&format!("/webhooks/twilio/voice/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body = test::read_body(resp).await;
    let xml = std::str::from_utf8(&body).unwrap();
    assert!(xml.contains("<Say language=\"it-IT\">"));
    assert!(xml.contains("Marco"));
    assert!(xml.contains("<Hangup/>"));
}

#[actix_web::test]
async fn test_credits_and_call_view() {
    let env = TestEnv::new();
    let app = app!(env);
    let user = env.store.add_user(4, None);
    let id = env.store.insert_call(sample_call(user));

    let req = test::TestRequest::get()
        .uri("/api/v1/credits")
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["prank_credits"], 4);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/calls/{}", id))
        .insert_header(("Authorization", env.token(user, UserRole::User)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["victimName"], "Marco Rossi");
    assert_eq!(body["data"]["status"], "pending");
}
