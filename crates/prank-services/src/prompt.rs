//! Call Request Builder
//!
//! Renders the system prompt and first message handed to the voice
//! provider. Greetings follow the wall clock of a fixed reference zone
//! (Europe/Rome) so the result only depends on the instant and language.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use prank_core::{
    models::{CallRequest, CallScript},
    AppResult,
};

/// Zone the time-of-day greeting is computed in
pub const REFERENCE_TZ: Tz = chrono_tz::Europe::Rome;

/// ElevenLabs multilingual voices used when the request names none
const DEFAULT_MALE_VOICE: &str = "pNInz6obpgDQGcFmaJgB";
const DEFAULT_FEMALE_VOICE: &str = "EXAVITQu4vr4xnSDxMaL";

/// Conversation languages with localized greetings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Italian,
    English,
    Spanish,
    French,
    German,
}

impl Language {
    /// Parse a display name or language tag; `None` for anything else
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let primary = lower.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "italiano" | "italian" | "it" => Some(Language::Italian),
            "english" | "inglese" | "en" => Some(Language::English),
            "español" | "espanol" | "spanish" | "spagnolo" | "es" => Some(Language::Spanish),
            "français" | "francais" | "french" | "francese" | "fr" => Some(Language::French),
            "deutsch" | "german" | "tedesco" | "de" => Some(Language::German),
            _ => None,
        }
    }

    /// Unknown languages are handled as English
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Language::English)
    }

    /// BCP-47 tag for transcription and speech
    pub fn code(&self) -> &'static str {
        match self {
            Language::Italian => "it-IT",
            Language::English => "en-US",
            Language::Spanish => "es-ES",
            Language::French => "fr-FR",
            Language::German => "de-DE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Italian => "Italiano",
            Language::English => "English",
            Language::Spanish => "Español",
            Language::French => "Français",
            Language::German => "Deutsch",
        }
    }

    fn first_message(&self, greeting: &str, first_name: &str) -> String {
        let greeting = capitalize(greeting);
        match self {
            Language::Italian => format!("{}, parlo con {}?", greeting, first_name),
            Language::English => format!("{}, am I speaking with {}?", greeting, first_name),
            Language::Spanish => format!("{}, ¿hablo con {}?", greeting, first_name),
            Language::French => format!("{}, je parle bien à {} ?", greeting, first_name),
            Language::German => format!("{}, spreche ich mit {}?", greeting, first_name),
        }
    }
}

/// Time-of-day greeting for `language` at local time `time`.
///
/// Italian has two bands split at 06:00 and 18:00; every other language has
/// morning (06-12), afternoon (12-18) and evening.
pub fn greeting_for(language: &str, time: NaiveTime) -> &'static str {
    let hour = time.hour();
    let lang = Language::resolve(language);

    if lang == Language::Italian {
        return if (6..18).contains(&hour) {
            "buongiorno"
        } else {
            "buonasera"
        };
    }

    let band = match hour {
        6..=11 => 0,
        12..=17 => 1,
        _ => 2,
    };
    let greetings: [&'static str; 3] = match lang {
        Language::Spanish => ["buenos días", "buenas tardes", "buenas noches"],
        Language::French => ["bonjour", "bon après-midi", "bonsoir"],
        Language::German => ["guten Morgen", "guten Tag", "guten Abend"],
        Language::English | Language::Italian => {
            ["good morning", "good afternoon", "good evening"]
        }
    };
    greetings[band]
}

/// Wall-clock time in the reference zone
pub fn reference_time(now: DateTime<Utc>) -> NaiveTime {
    now.with_timezone(&REFERENCE_TZ).time()
}

/// Creativity 0-100 mapped linearly onto temperature 0.3-1.2
pub fn temperature_for(creativity_level: i32) -> f32 {
    let level = creativity_level.clamp(0, 100) as f32;
    ((0.3 + level / 100.0 * 0.9) * 100.0).round() / 100.0
}

fn personality_description(tag: Option<&str>) -> &'static str {
    match tag.map(|t| t.trim().to_lowercase()).as_deref() {
        Some("serious") | Some("serio") => {
            "Formal and completely serious. Never laugh, stay polite and insistent."
        }
        Some("funny") | Some("divertente") => {
            "Cheerful and a little absurd. Add odd details with a straight voice."
        }
        Some("confused") | Some("confuso") => {
            "Scatterbrained. Mix up details, apologise, then carry on with the story."
        }
        Some("angry") | Some("arrabbiato") => {
            "Irritated and impatient, but never insulting or threatening."
        }
        Some("bureaucratic") | Some("burocratico") => {
            "A slow clerk obsessed with procedures, forms and reference numbers."
        }
        Some("friendly") | Some("amichevole") => {
            "Warm and chatty, as if you already know the person a little."
        }
        _ => "Natural and believable, like a real person with an ordinary job.",
    }
}

fn gender_clause(gender: Option<&str>) -> &'static str {
    match gender.map(|g| g.trim().to_lowercase()).as_deref() {
        Some("male") | Some("m") | Some("maschio") | Some("uomo") => {
            " Address them with masculine grammatical forms."
        }
        Some("female") | Some("f") | Some("femmina") | Some("donna") => {
            " Address them with feminine grammatical forms."
        }
        _ => "",
    }
}

fn voice_for(request: &CallRequest) -> String {
    if let Some(voice) = request.voice_id.as_deref().filter(|v| !v.trim().is_empty()) {
        return voice.trim().to_string();
    }
    match request.voice_gender.as_deref().map(str::to_lowercase).as_deref() {
        Some("female") | Some("f") | Some("femmina") => DEFAULT_FEMALE_VOICE.to_string(),
        _ => DEFAULT_MALE_VOICE.to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn render_system_prompt(request: &CallRequest, language: Language, greeting: &str) -> String {
    let first_name = request.victim_first_name.trim();
    let mut prompt = format!(
        "You are placing a harmless prank phone call. Speak only {language}.\n\
         You are calling {name}.{gender}\n\n\
         Scenario: {theme}\n",
        language = language.display_name(),
        name = request.victim_full_name(),
        gender = gender_clause(request.victim_gender.as_deref()),
        theme = request.prank_theme.trim(),
    );

    if let Some(detail) = request.real_detail.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        prompt.push_str(&format!(
            "A real detail about {} you can weave in to sound credible: {}\n",
            first_name, detail
        ));
    }

    prompt.push_str(&format!(
        "\nPersonality: {}\n\n\
         Rules:\n\
         - Open with the greeting \"{}\" and confirm you are talking to {}.\n\
         - Keep sentences short and react to what {} says.\n\
         - Never say this is a prank and never say you are an AI.\n\
         - Never ask for passwords, bank details or other sensitive data.\n\
         - If {} gets upset or asks to stop, apologise and end the call politely.\n",
        personality_description(request.personality.as_deref()),
        greeting,
        first_name,
        first_name,
        first_name,
    ));

    prompt
}

/// Build the script for `request` at instant `now`.
///
/// Fails with a validation error before any provider is contacted when the
/// request is incomplete.
pub fn build_script(request: &CallRequest, now: DateTime<Utc>) -> AppResult<CallScript> {
    request.validate_for_dispatch()?;

    let language = Language::resolve(&request.language);
    let greeting = greeting_for(&request.language, reference_time(now));

    Ok(CallScript {
        system_prompt: render_system_prompt(request, language, greeting),
        first_message: language.first_message(greeting, request.victim_first_name.trim()),
        greeting: greeting.to_string(),
        temperature: temperature_for(request.creativity_level),
        language_code: language.code().to_string(),
        voice_id: voice_for(request),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use prank_core::AppError;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn request() -> CallRequest {
        CallRequest {
            victim_first_name: "Marco".to_string(),
            victim_last_name: Some("Rossi".to_string()),
            victim_phone: "+393331234567".to_string(),
            victim_gender: Some("male".to_string()),
            prank_theme: "Consegna di 40 pizze mai ordinate".to_string(),
            real_detail: Some("Tifa Inter".to_string()),
            personality: Some("bureaucratic".to_string()),
            creativity_level: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_italian_greeting_boundaries() {
        assert_eq!(greeting_for("Italiano", at(9, 0)), "buongiorno");
        assert_eq!(greeting_for("Italiano", at(20, 0)), "buonasera");
        assert_eq!(greeting_for("Italiano", at(6, 0)), "buongiorno");
        assert_eq!(greeting_for("Italiano", at(17, 59)), "buongiorno");
        assert_eq!(greeting_for("Italiano", at(18, 0)), "buonasera");
        assert_eq!(greeting_for("Italiano", at(5, 59)), "buonasera");
    }

    #[test]
    fn test_english_greeting_bands() {
        assert_eq!(greeting_for("English", at(7, 0)), "good morning");
        assert_eq!(greeting_for("English", at(14, 0)), "good afternoon");
        assert_eq!(greeting_for("English", at(21, 0)), "good evening");
        assert_eq!(greeting_for("English", at(12, 0)), "good afternoon");
        assert_eq!(greeting_for("English", at(3, 0)), "good evening");
    }

    #[test]
    fn test_other_languages_and_fallback() {
        assert_eq!(greeting_for("Español", at(13, 0)), "buenas tardes");
        assert_eq!(greeting_for("Deutsch", at(8, 0)), "guten Morgen");
        assert_eq!(greeting_for("fr-FR", at(22, 0)), "bonsoir");
        assert_eq!(greeting_for("Klingon", at(8, 0)), "good morning");
    }

    #[test]
    fn test_reference_time_uses_rome() {
        // 07:30 UTC in July is 09:30 in Rome
        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 7, 30, 0).unwrap();
        assert_eq!(reference_time(summer), at(9, 30));

        // 17:30 UTC in January is 18:30 in Rome
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 17, 30, 0).unwrap();
        assert_eq!(greeting_for("Italiano", reference_time(winter)), "buonasera");
    }

    #[test]
    fn test_temperature_mapping() {
        assert_eq!(temperature_for(0), 0.3);
        assert_eq!(temperature_for(50), 0.75);
        assert_eq!(temperature_for(100), 1.2);
        assert_eq!(temperature_for(250), 1.2);
    }

    #[test]
    fn test_build_script() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 7, 30, 0).unwrap();
        let script = build_script(&request(), now).unwrap();

        assert_eq!(script.greeting, "buongiorno");
        assert_eq!(script.first_message, "Buongiorno, parlo con Marco?");
        assert_eq!(script.language_code, "it-IT");
        assert_eq!(script.voice_id, DEFAULT_MALE_VOICE);
        assert!(script.system_prompt.contains("Speak only Italiano"));
        assert!(script.system_prompt.contains("Marco Rossi"));
        assert!(script.system_prompt.contains("Consegna di 40 pizze"));
        assert!(script.system_prompt.contains("Tifa Inter"));
        assert!(script.system_prompt.contains("masculine"));
        assert!(script.system_prompt.contains("procedures"));
    }

    #[test]
    fn test_requested_voice_wins() {
        let req = CallRequest {
            voice_id: Some("custom_voice".to_string()),
            voice_gender: Some("female".to_string()),
            ..request()
        };
        let script = build_script(&req, Utc::now()).unwrap();
        assert_eq!(script.voice_id, "custom_voice");
    }

    #[test]
    fn test_missing_fields_block_building() {
        let no_phone = CallRequest {
            victim_phone: String::new(),
            ..request()
        };
        assert!(matches!(
            build_script(&no_phone, Utc::now()),
            Err(AppError::MissingField(_))
        ));

        let no_theme = CallRequest {
            prank_theme: "   ".to_string(),
            ..request()
        };
        assert!(matches!(
            build_script(&no_theme, Utc::now()),
            Err(AppError::MissingField(_))
        ));
    }
}
