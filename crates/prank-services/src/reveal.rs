//! Reveal notifier
//!
//! After a qualifying call, tells the victim by SMS that it was a prank and
//! who asked for it. The notification slot is claimed before sending, so at
//! most one message goes out per call request even under redelivery.

use crate::prompt::Language;
use prank_core::{
    models::{CallRequest, RevealStatus},
    traits::{ProfileRepository, RevealNotificationRepository, SmsSender},
    AppResult,
};
use rand::{seq::SliceRandom, Rng};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const ITALIAN: &[&str] = &[
    "Ciao {victim_name}! La chiamata che hai appena ricevuto era uno scherzo 😄 Te l'ha organizzato {caller_number}.",
    "{victim_name}, ci sei cascato! Era tutto uno scherzo telefonico voluto da {caller_number}.",
    "Tranquillo {victim_name}, nessuna consegna e nessun problema: era uno scherzo di {caller_number}!",
];

const ENGLISH: &[&str] = &[
    "Hi {victim_name}! The call you just got was a prank 😄 It was set up by {caller_number}.",
    "{victim_name}, you've been pranked! The whole call was arranged by {caller_number}.",
    "Relax {victim_name}, nothing to worry about: that call was a prank from {caller_number}!",
];

const SPANISH: &[&str] = &[
    "¡Hola {victim_name}! La llamada que acabas de recibir era una broma 😄 La organizó {caller_number}.",
    "{victim_name}, ¡has caído! Todo fue una broma telefónica de {caller_number}.",
];

const FRENCH: &[&str] = &[
    "Salut {victim_name} ! L'appel que tu viens de recevoir était une blague 😄 Organisée par {caller_number}.",
    "{victim_name}, tu t'es fait avoir ! C'était un canular téléphonique de {caller_number}.",
];

const GERMAN: &[&str] = &[
    "Hallo {victim_name}! Der Anruf gerade war ein Streich 😄 Organisiert von {caller_number}.",
    "{victim_name}, reingelegt! Der ganze Anruf war ein Telefonstreich von {caller_number}.",
];

fn templates(language: Language) -> &'static [&'static str] {
    match language {
        Language::Italian => ITALIAN,
        Language::English => ENGLISH,
        Language::Spanish => SPANISH,
        Language::French => FRENCH,
        Language::German => GERMAN,
    }
}

/// Pick a template for `language` and fill in the placeholders
pub fn reveal_message<R: Rng + ?Sized>(
    language: &str,
    victim_name: &str,
    caller_number: &str,
    rng: &mut R,
) -> String {
    let choices = templates(Language::resolve(language));
    let template = choices.choose(rng).copied().unwrap_or(ENGLISH[0]);
    template
        .replace("{victim_name}", victim_name)
        .replace("{caller_number}", caller_number)
}

/// What happened to a reveal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// The call request did not ask for a reveal
    NotRequested,
    /// Another delivery already claimed the notification
    AlreadyHandled,
    Sent { message_id: String },
    /// The caller has no verified number to quote
    Skipped,
    Failed { error: String },
}

/// Sends the reveal SMS for finished calls
pub struct RevealNotifier {
    reveals: Arc<dyn RevealNotificationRepository>,
    profiles: Arc<dyn ProfileRepository>,
    sms: Arc<dyn SmsSender>,
}

impl RevealNotifier {
    pub fn new(
        reveals: Arc<dyn RevealNotificationRepository>,
        profiles: Arc<dyn ProfileRepository>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            reveals,
            profiles,
            sms,
        }
    }

    /// Send the reveal for `call` at most once.
    ///
    /// Delivery failures are recorded on the notification and reported in
    /// the outcome; only storage errors are returned as `Err`.
    #[instrument(skip(self, call), fields(call_request_id = %call.id))]
    pub async fn notify(&self, call: &CallRequest) -> AppResult<RevealOutcome> {
        if !call.send_reveal_sms {
            return Ok(RevealOutcome::NotRequested);
        }

        if !self.reveals.claim(call.id, &call.victim_phone).await? {
            info!("Reveal already handled");
            return Ok(RevealOutcome::AlreadyHandled);
        }

        let caller_number = self
            .profiles
            .find_by_id(call.user_id)
            .await?
            .and_then(|profile| profile.verified_phone)
            .filter(|phone| !phone.trim().is_empty());

        let Some(caller_number) = caller_number else {
            warn!(user_id = %call.user_id, "Caller has no verified phone, skipping reveal");
            self.reveals
                .finish(
                    call.id,
                    RevealStatus::Skipped,
                    None,
                    None,
                    Some("caller has no verified phone number"),
                )
                .await?;
            return Ok(RevealOutcome::Skipped);
        };

        let body = reveal_message(
            &call.language,
            call.victim_first_name.trim(),
            caller_number.trim(),
            &mut rand::thread_rng(),
        );

        match self.sms.send_sms(&call.victim_phone, &body).await {
            Ok(message_id) => {
                info!(message_id = %message_id, "Reveal SMS sent");
                self.reveals
                    .finish(call.id, RevealStatus::Sent, Some(&body), Some(&message_id), None)
                    .await?;
                Ok(RevealOutcome::Sent { message_id })
            }
            Err(e) => {
                warn!(error = %e, "Reveal SMS failed");
                let error = e.to_string();
                self.reveals
                    .finish(call.id, RevealStatus::Failed, Some(&body), None, Some(&error))
                    .await?;
                Ok(RevealOutcome::Failed { error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_call, FakeSmsSender, InMemoryStore};
    use rand::{rngs::StdRng, SeedableRng};

    fn notifier(store: &Arc<InMemoryStore>, sms: &Arc<FakeSmsSender>) -> RevealNotifier {
        RevealNotifier::new(store.clone(), store.clone(), sms.clone())
    }

    #[test]
    fn test_reveal_message_placeholders() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let msg = reveal_message("Italiano", "Marco", "+393401112233", &mut rng);
            assert!(msg.contains("Marco"));
            assert!(msg.contains("+393401112233"));
            assert!(!msg.contains('{'));
            assert!(ITALIAN
                .iter()
                .any(|t| t.replace("{victim_name}", "Marco").replace("{caller_number}", "+393401112233") == msg));
        }
    }

    #[test]
    fn test_unknown_language_uses_english() {
        let mut rng = StdRng::seed_from_u64(1);
        let msg = reveal_message("Klingon", "Ann", "+15550001111", &mut rng);
        assert!(ENGLISH
            .iter()
            .any(|t| t.replace("{victim_name}", "Ann").replace("{caller_number}", "+15550001111") == msg));
    }

    #[tokio::test]
    async fn test_sends_once() {
        let store = Arc::new(InMemoryStore::new());
        let sms = Arc::new(FakeSmsSender::new());
        let user = store.add_user(1, Some("+393401112233"));
        let call = CallRequest {
            send_reveal_sms: true,
            ..sample_call(user)
        };

        let notifier = notifier(&store, &sms);
        assert!(matches!(
            notifier.notify(&call).await.unwrap(),
            RevealOutcome::Sent { .. }
        ));
        assert_eq!(
            notifier.notify(&call).await.unwrap(),
            RevealOutcome::AlreadyHandled
        );

        let sent = sms.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+393331234567");
        assert!(sent[0].1.contains("+393401112233"));
        assert_eq!(store.reveal(call.id).unwrap().status, RevealStatus::Sent);
    }

    #[tokio::test]
    async fn test_skipped_without_verified_phone() {
        let store = Arc::new(InMemoryStore::new());
        let sms = Arc::new(FakeSmsSender::new());
        let user = store.add_user(1, None);
        let call = CallRequest {
            send_reveal_sms: true,
            ..sample_call(user)
        };

        assert_eq!(
            notifier(&store, &sms).notify(&call).await.unwrap(),
            RevealOutcome::Skipped
        );
        assert!(sms.sent().is_empty());
        assert_eq!(store.reveal(call.id).unwrap().status, RevealStatus::Skipped);
    }

    #[tokio::test]
    async fn test_not_requested() {
        let store = Arc::new(InMemoryStore::new());
        let sms = Arc::new(FakeSmsSender::new());
        let call = sample_call(store.add_user(1, Some("+393401112233")));

        assert_eq!(
            notifier(&store, &sms).notify(&call).await.unwrap(),
            RevealOutcome::NotRequested
        );
        assert!(store.reveal(call.id).is_none());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let sms = Arc::new(FakeSmsSender::failing());
        let user = store.add_user(1, Some("+393401112233"));
        let call = CallRequest {
            send_reveal_sms: true,
            ..sample_call(user)
        };

        let outcome = notifier(&store, &sms).notify(&call).await.unwrap();
        assert!(matches!(outcome, RevealOutcome::Failed { .. }));

        let reveal = store.reveal(call.id).unwrap();
        assert_eq!(reveal.status, RevealStatus::Failed);
        assert!(reveal.error.is_some());
    }
}
