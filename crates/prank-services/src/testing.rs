//! In-memory repositories and provider fakes
//!
//! [`InMemoryStore`] implements every repository trait over one mutex so a
//! test can wire all services to the same state and inspect it afterwards.
//! It mirrors the conditional updates and marker rows of the PostgreSQL
//! repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use prank_core::{
    models::{
        AuditLog, AuditLogData, CallRequest, CallScript, CallStatus, CheckoutRequest,
        CheckoutSession, ConsumeOutcome, ContentCheck, EndCallOutcome, GrantOutcome, Invoice,
        ModerationVerdict, NormalizedStatus, PaymentGrant, PaymentRecord, Profile, PromoCode,
        ProviderKind, RevealNotification, RevealStatus, StatusUpdate, UserRole,
    },
    traits::{
        AuditLogRepository, CallProvider, CallRequestRepository, CreditLedger, ModerationClient,
        PaymentGateway, PaymentRecordRepository, ProfileRepository, PromoCodeRepository,
        RevealNotificationRepository, SettingsRepository, SmsSender,
    },
    AppError, AppResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    calls: HashMap<Uuid, CallRequest>,
    profiles: HashMap<Uuid, Profile>,
    consumptions: HashSet<Uuid>,
    payments: HashMap<String, PaymentRecord>,
    promos: HashMap<String, PromoCode>,
    settings: HashMap<String, String>,
    reveals: HashMap<Uuid, RevealNotification>,
    audit: Vec<AuditLog>,
    lose_dispatch_race: bool,
    fail_settings_writes: bool,
}

/// Shared in-memory implementation of the repository traits
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a profile with `credits` and an optional verified phone
    pub fn add_user(&self, credits: i32, verified_phone: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.state.lock().profiles.insert(
            id,
            Profile {
                id,
                email: Some(format!("{}@example.com", id.simple())),
                verified_phone: verified_phone.map(str::to_string),
                prank_credits: credits,
                role: UserRole::User,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn insert_call(&self, call: CallRequest) -> Uuid {
        let id = call.id;
        self.state.lock().calls.insert(id, call);
        id
    }

    pub fn call(&self, id: Uuid) -> Option<CallRequest> {
        self.state.lock().calls.get(&id).cloned()
    }

    pub fn credits(&self, user_id: Uuid) -> i32 {
        self.state
            .lock()
            .profiles
            .get(&user_id)
            .map(|p| p.prank_credits)
            .unwrap_or_default()
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        self.state
            .lock()
            .settings
            .insert(key.to_string(), value.to_string());
    }

    pub fn add_promo(&self, promo: PromoCode) {
        self.state
            .lock()
            .promos
            .insert(PromoCode::normalize(&promo.code), promo);
    }

    pub fn promo(&self, code: &str) -> Option<PromoCode> {
        self.state.lock().promos.get(&PromoCode::normalize(code)).cloned()
    }

    pub fn reveal(&self, call_request_id: Uuid) -> Option<RevealNotification> {
        self.state.lock().reveals.get(&call_request_id).cloned()
    }

    pub fn audit_entries(&self) -> Vec<AuditLog> {
        self.state.lock().audit.clone()
    }

    pub fn payment_count(&self) -> usize {
        self.state.lock().payments.len()
    }

    /// Make every `mark_initiated` lose, as if another dispatch won first
    pub fn lose_dispatch_race(&self) {
        self.state.lock().lose_dispatch_race = true;
    }

    pub fn fail_settings_writes(&self) {
        self.state.lock().fail_settings_writes = true;
    }
}

#[async_trait]
impl CallRequestRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRequest>> {
        Ok(self.call(id))
    }

    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> AppResult<Option<CallRequest>> {
        Ok(self
            .state
            .lock()
            .calls
            .values()
            .find(|c| c.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned())
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<CallRequest>> {
        let state = self.state.lock();
        let mut due: Vec<CallRequest> = state
            .calls
            .values()
            .filter(|c| c.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_initiated(
        &self,
        id: Uuid,
        provider: ProviderKind,
        provider_call_id: &str,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();
        if state.lose_dispatch_race {
            return Ok(false);
        }
        let taken = state
            .calls
            .values()
            .any(|c| c.provider_call_id.as_deref() == Some(provider_call_id));
        if taken {
            return Err(AppError::Conflict(format!(
                "Provider call {} is already linked to another request",
                provider_call_id
            )));
        }
        match state.calls.get_mut(&id) {
            Some(call)
                if call.provider_call_id.is_none() && call.call_status.is_awaiting_dispatch() =>
            {
                call.call_status = CallStatus::Initiated;
                call.call_provider = Some(provider);
                call.provider_call_id = Some(provider_call_id.to_string());
                call.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: CallStatus,
        update: &StatusUpdate,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.calls.get_mut(&id) {
            Some(call) if call.call_status == expected => {
                call.call_status = update.status;
                if update.status.allows_recording() {
                    if let Some(url) = &update.recording_url {
                        call.recording_url = Some(url.clone());
                    }
                }
                if let Some(duration) = update.duration_seconds {
                    call.duration_seconds = Some(duration);
                }
                call.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CreditLedger for InMemoryStore {
    async fn balance(&self, user_id: Uuid) -> AppResult<i32> {
        self.state
            .lock()
            .profiles
            .get(&user_id)
            .map(|p| p.prank_credits)
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))
    }

    async fn consume_for_call(
        &self,
        user_id: Uuid,
        call_request_id: Uuid,
    ) -> AppResult<ConsumeOutcome> {
        let mut state = self.state.lock();
        if state.consumptions.contains(&call_request_id) {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }
        let Some(profile) = state.profiles.get_mut(&user_id) else {
            return Ok(ConsumeOutcome::InsufficientCredits);
        };
        if profile.prank_credits <= 0 {
            return Ok(ConsumeOutcome::InsufficientCredits);
        }
        profile.prank_credits -= 1;
        let remaining = profile.prank_credits;
        state.consumptions.insert(call_request_id);
        Ok(ConsumeOutcome::Consumed { remaining })
    }

    async fn grant_for_payment(&self, grant: &PaymentGrant) -> AppResult<GrantOutcome> {
        let mut state = self.state.lock();
        if state.payments.contains_key(&grant.session_id) {
            let total = state
                .profiles
                .get(&grant.user_id)
                .map(|p| p.prank_credits)
                .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", grant.user_id)))?;
            return Ok(GrantOutcome::AlreadyGranted { total });
        }

        let profile = state
            .profiles
            .get_mut(&grant.user_id)
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", grant.user_id)))?;
        profile.prank_credits += grant.credits;
        let total = profile.prank_credits;

        if let Some(code) = &grant.promo_code {
            if let Some(promo) = state.promos.get_mut(&PromoCode::normalize(code)) {
                promo.times_used += 1;
            }
        }

        state.payments.insert(
            grant.session_id.clone(),
            PaymentRecord {
                session_id: grant.session_id.clone(),
                user_id: grant.user_id,
                package_id: grant.package_id.clone(),
                credits_granted: grant.credits,
                amount_cents: grant.amount_cents,
                promo_code: grant.promo_code.clone(),
                created_at: Utc::now(),
            },
        );

        Ok(GrantOutcome::Granted {
            credits_added: grant.credits,
            total,
        })
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn get_all(&self) -> AppResult<HashMap<String, String>> {
        Ok(self.state.lock().settings.clone())
    }

    async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.fail_settings_writes {
            return Err(AppError::Database("settings store unavailable".to_string()));
        }
        state.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        Ok(self.state.lock().profiles.get(&user_id).cloned())
    }
}

#[async_trait]
impl RevealNotificationRepository for InMemoryStore {
    async fn claim(&self, call_request_id: Uuid, recipient: &str) -> AppResult<bool> {
        let mut state = self.state.lock();
        if state.reveals.contains_key(&call_request_id) {
            return Ok(false);
        }
        let now = Utc::now();
        state.reveals.insert(
            call_request_id,
            RevealNotification {
                call_request_id,
                status: RevealStatus::Pending,
                recipient: recipient.to_string(),
                message: None,
                provider_message_id: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn finish(
        &self,
        call_request_id: Uuid,
        status: RevealStatus,
        message: Option<&str>,
        provider_message_id: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        if let Some(reveal) = self.state.lock().reveals.get_mut(&call_request_id) {
            reveal.status = status;
            reveal.message = message.map(str::to_string);
            reveal.provider_message_id = provider_message_id.map(str::to_string);
            reveal.error = error.map(str::to_string);
            reveal.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRecordRepository for InMemoryStore {
    async fn find_by_session(&self, session_id: &str) -> AppResult<Option<PaymentRecord>> {
        Ok(self.state.lock().payments.get(session_id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<PaymentRecord>, i64)> {
        let state = self.state.lock();
        let mut records: Vec<PaymentRecord> = state.payments.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = records.len() as i64;
        let page = records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl PromoCodeRepository for InMemoryStore {
    async fn find_by_code(&self, code: &str) -> AppResult<Option<PromoCode>> {
        Ok(self.promo(code))
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryStore {
    async fn insert(&self, entry: AuditLogData) -> AppResult<()> {
        let mut state = self.state.lock();
        let id = state.audit.len() as i64 + 1;
        state.audit.push(AuditLog {
            id,
            user_id: entry.user_id,
            actor: entry.actor,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            ip_address: entry.ip_address,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<AuditLog>, i64)> {
        let state = self.state.lock();
        let total = state.audit.len() as i64;
        let page = state
            .audit
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

/// Call provider that records what it was asked to do
pub struct FakeCallProvider {
    kind: ProviderKind,
    started: Mutex<Vec<Uuid>>,
    ended: Mutex<Vec<String>>,
    failing: Mutex<HashSet<Uuid>>,
    end_outcome: Mutex<EndCallOutcome>,
    counter: AtomicUsize,
}

impl FakeCallProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            started: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            end_outcome: Mutex::new(EndCallOutcome::Ended),
            counter: AtomicUsize::new(0),
        }
    }

    /// Reject `start_call` for this request
    pub fn fail_for(&self, call_request_id: Uuid) {
        self.failing.lock().insert(call_request_id);
    }

    pub fn report_already_ended(&self) {
        *self.end_outcome.lock() = EndCallOutcome::AlreadyEnded;
    }

    pub fn started(&self) -> Vec<Uuid> {
        self.started.lock().clone()
    }

    pub fn ended(&self) -> Vec<String> {
        self.ended.lock().clone()
    }
}

#[async_trait]
impl CallProvider for FakeCallProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn start_call(&self, request: &CallRequest, _script: &CallScript) -> AppResult<String> {
        self.started.lock().push(request.id);
        if self.failing.lock().contains(&request.id) {
            return Err(AppError::provider(
                self.kind.as_str(),
                "HTTP 400: Invalid 'To' phone number",
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}-call-{}", self.kind, n))
    }

    async fn end_call(&self, provider_call_id: &str) -> AppResult<EndCallOutcome> {
        self.ended.lock().push(provider_call_id.to_string());
        Ok(*self.end_outcome.lock())
    }

    fn normalize_status(&self, token: &str) -> NormalizedStatus {
        let status = match (self.kind, token) {
            (ProviderKind::Twilio, "queued") => CallStatus::Pending,
            (ProviderKind::Vapi, "queued") => CallStatus::Initiated,
            (_, "initiated") => CallStatus::Initiated,
            (_, "ringing") => CallStatus::Ringing,
            (_, "in-progress") => CallStatus::InProgress,
            (_, "completed") | (_, "ended") => CallStatus::Completed,
            (ProviderKind::Twilio, "busy" | "no-answer" | "canceled" | "failed") => {
                CallStatus::Failed
            }
            _ => return NormalizedStatus::Passthrough(token.to_string()),
        };
        NormalizedStatus::Known(status)
    }

    fn recording_url(&self, raw: &str) -> String {
        match self.kind {
            ProviderKind::Twilio if !raw.ends_with(".mp3") => format!("{}.mp3", raw),
            _ => raw.to_string(),
        }
    }
}

/// SMS sender that keeps sent messages
#[derive(Default)]
pub struct FakeSmsSender {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl FakeSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SmsSender for FakeSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> AppResult<String> {
        if self.fail {
            return Err(AppError::provider("twilio", "HTTP 400: unreachable destination"));
        }
        let mut sent = self.sent.lock();
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("SM{}", sent.len()))
    }
}

/// Payment gateway with sessions seeded by the test
#[derive(Default)]
pub struct FakePaymentGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    invoices: Mutex<HashMap<String, Invoice>>,
    created: Mutex<Vec<CheckoutRequest>>,
    coupons: Mutex<Vec<i32>>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A completed, paid session created for `user_id`
    pub fn add_paid_session(&self, session_id: &str, user_id: Uuid, package_id: &str) {
        self.add_session(CheckoutSession {
            id: session_id.to_string(),
            url: None,
            paid: true,
            amount_total: Some(799),
            metadata_user_id: Some(user_id.to_string()),
            metadata_package_id: Some(package_id.to_string()),
            metadata_promo_code: None,
        });
    }

    pub fn add_session(&self, session: CheckoutSession) {
        self.sessions.lock().insert(session.id.clone(), session);
    }

    /// A paid renewal invoice of a subscription started by `user_id`
    pub fn add_renewal_invoice(&self, invoice_id: &str, user_id: Uuid, package_id: &str) {
        self.add_invoice(Invoice {
            id: invoice_id.to_string(),
            paid: true,
            billing_reason: Some("subscription_cycle".to_string()),
            amount_paid: Some(999),
            metadata_user_id: Some(user_id.to_string()),
            metadata_package_id: Some(package_id.to_string()),
        });
    }

    pub fn add_invoice(&self, invoice: Invoice) {
        self.invoices.lock().insert(invoice.id.clone(), invoice);
    }

    pub fn created(&self) -> Vec<CheckoutRequest> {
        self.created.lock().clone()
    }

    pub fn coupons(&self) -> Vec<i32> {
        self.coupons.lock().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> AppResult<CheckoutSession> {
        let mut created = self.created.lock();
        created.push(request.clone());
        let id = format!("cs_test_{}", created.len());
        Ok(CheckoutSession {
            url: Some(format!("https://checkout.example.com/{}", id)),
            id,
            metadata_user_id: Some(request.user_id.to_string()),
            metadata_package_id: Some(request.package.id.clone()),
            metadata_promo_code: request.promo_code.clone(),
            ..Default::default()
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> AppResult<CheckoutSession> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                AppError::provider("stripe", format!("No such checkout.session: {}", session_id))
            })
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> AppResult<Invoice> {
        self.invoices
            .lock()
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| {
                AppError::provider("stripe", format!("No such invoice: {}", invoice_id))
            })
    }

    async fn create_coupon(&self, percent_off: i32, _label: &str) -> AppResult<String> {
        let mut coupons = self.coupons.lock();
        coupons.push(percent_off);
        Ok(format!("co_test_{}", coupons.len()))
    }
}

/// Moderation classifier with a fixed answer, or a failure
pub struct FakeModerationClient {
    verdict: Option<ModerationVerdict>,
    calls: AtomicUsize,
}

impl FakeModerationClient {
    pub fn approving() -> Self {
        Self {
            verdict: Some(ModerationVerdict::approve()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn blocking(category: &str, message: &str) -> Self {
        Self {
            verdict: Some(ModerationVerdict::block(category, message)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            verdict: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModerationClient for FakeModerationClient {
    async fn classify(&self, _check: &ContentCheck) -> AppResult<ModerationVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
            .clone()
            .ok_or_else(|| AppError::provider("moderation", "Timeout after 15s"))
    }
}

/// A call request ready for dispatch, owned by `user_id`
pub fn sample_call(user_id: Uuid) -> CallRequest {
    CallRequest {
        user_id,
        victim_first_name: "Marco".to_string(),
        victim_last_name: Some("Rossi".to_string()),
        victim_phone: "+393331234567".to_string(),
        prank_theme: "Consegna di 40 pizze mai ordinate".to_string(),
        ..Default::default()
    }
}
