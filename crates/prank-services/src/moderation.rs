//! Content Moderator gate
//!
//! Keyword rules run first and always; the LLM classifier runs when one is
//! configured. Any classifier failure approves the content.

use crate::prompt::Language;
use prank_core::{
    models::{ContentCheck, ModerationVerdict},
    traits::ModerationClient,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Blocked keywords per category; matched at word starts
const BUILTIN_RULES: &[(&str, &[&str])] = &[
    (
        "threats",
        &[
            "bomba", "bomb", "uccid", "ammazz", "kill", "minacc", "threat", "sequestr",
            "kidnap", "ostagg", "hostage", "attentat", "terror",
        ],
    ),
    (
        "emergency_services",
        &[
            "polizia", "police", "carabinier", "ambulanz", "ambulance", "pompier",
            "firefighter", "118", "112", "113", "911",
        ],
    ),
    (
        "death_or_accident",
        &[
            "morto", "morta", "morte", "dead", "death", "funeral", "incident",
            "accident", "ricoverat", "hospitali",
        ],
    ),
    (
        "self_harm",
        &["suicid", "autolesion", "self harm", "self-harm"],
    ),
    (
        "sexual",
        &["sesso", "sex", "porn", "nudo", "nude", "molest"],
    ),
    (
        "financial_data",
        &[
            "iban", "carta di credito", "credit card", "password", "codice pin",
            "bonifico", "wire transfer", "riscatto", "ransom",
        ],
    ),
];

struct KeywordRule {
    category: String,
    keywords: Vec<String>,
}

/// Theme gate applied before dispatch and by the content-check endpoint
pub struct ContentModerator {
    classifier: Option<Arc<dyn ModerationClient>>,
    rules: Vec<KeywordRule>,
}

impl ContentModerator {
    pub fn new(classifier: Option<Arc<dyn ModerationClient>>, extra_keywords: &[String]) -> Self {
        let mut rules: Vec<KeywordRule> = BUILTIN_RULES
            .iter()
            .map(|(category, keywords)| KeywordRule {
                category: category.to_string(),
                keywords: keywords.iter().map(|k| normalize(k)).collect(),
            })
            .collect();

        let extra: Vec<String> = extra_keywords
            .iter()
            .map(|k| normalize(k))
            .filter(|k| !k.is_empty())
            .collect();
        if !extra.is_empty() {
            rules.push(KeywordRule {
                category: "custom".to_string(),
                keywords: extra,
            });
        }

        Self { classifier, rules }
    }

    /// Keyword rules only
    pub fn rules_only() -> Self {
        Self::new(None, &[])
    }

    fn match_rules(&self, text: &str) -> Option<&str> {
        let haystack = format!(" {} ", normalize(text));
        self.rules
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|kw| haystack.contains(&format!(" {}", kw)))
            })
            .map(|rule| rule.category.as_str())
    }

    /// Classify a theme.
    ///
    /// Never fails because of the classifier: errors approve the content.
    #[instrument(skip(self, check), fields(language = %check.language))]
    pub async fn check(&self, check: &ContentCheck) -> AppResult<ModerationVerdict> {
        if check.theme.trim().is_empty() {
            return Err(AppError::MissingField("theme".to_string()));
        }

        let text = match check.detail.as_deref() {
            Some(detail) => format!("{} {}", check.theme, detail),
            None => check.theme.clone(),
        };

        if let Some(category) = self.match_rules(&text) {
            info!(category, "Theme blocked by keyword rule");
            return Ok(ModerationVerdict::block(
                category,
                blocked_message(category, &check.language),
            ));
        }

        let Some(classifier) = &self.classifier else {
            return Ok(ModerationVerdict::approve());
        };

        match classifier.classify(check).await {
            Ok(verdict) => {
                debug!(approved = verdict.approved, "Classifier verdict");
                Ok(verdict)
            }
            Err(e) => {
                warn!(error = %e, "Moderation classifier failed, approving content");
                Ok(ModerationVerdict::approve())
            }
        }
    }

    /// Reject blocked content with the gate's reason
    pub async fn gate(&self, check: &ContentCheck) -> AppResult<()> {
        let verdict = self.check(check).await?;
        if verdict.approved {
            return Ok(());
        }
        Err(AppError::ModerationBlocked {
            category: verdict
                .category
                .unwrap_or_else(|| "inappropriate".to_string()),
            message: verdict.message,
        })
    }
}

/// Lowercase, punctuation to spaces, single spaced
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn blocked_message(category: &str, language: &str) -> String {
    let italian = Language::resolve(language) == Language::Italian;
    let reason = match (category, italian) {
        ("threats", true) => "il tema contiene minacce o violenza",
        ("threats", false) => "the theme contains threats or violence",
        ("emergency_services", true) => "non è consentito fingersi forze dell'ordine o soccorsi",
        ("emergency_services", false) => "impersonating police or emergency services is not allowed",
        ("death_or_accident", true) => "non sono consentiti scherzi su incidenti o lutti",
        ("death_or_accident", false) => "pranks about accidents or deaths are not allowed",
        ("self_harm", true) => "il tema riguarda l'autolesionismo",
        ("self_harm", false) => "the theme involves self-harm",
        ("sexual", true) => "il tema contiene riferimenti sessuali",
        ("sexual", false) => "the theme contains sexual content",
        ("financial_data", true) => "non è consentito chiedere dati bancari o personali",
        ("financial_data", false) => "asking for bank or personal data is not allowed",
        (_, true) => "il tema non rispetta le regole del servizio",
        (_, false) => "the theme breaks the service rules",
    };

    if italian {
        format!("Tema non consentito: {}.", reason)
    } else {
        format!("Theme not allowed: {}.", reason)
    }
}
