//! Provider webhooks
//!
//! Twilio and VAPI deliver call progress here. These handlers always answer
//! 200 so providers never retry or mark the endpoint unhealthy; every
//! internal failure is logged and swallowed.

use crate::state::AppState;
use actix_web::{http::header::ContentType, web, HttpResponse};
use chrono::Utc;
use prank_providers::{twilio::twiml, vapi::parse_server_message};
use prank_services::{build_script, TwilioStatusCallback};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Spoken when no media bridge is configured
const FALLBACK_LANGUAGE: &str = "it-IT";

fn twiml_response(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::xml())
        .body(body)
}

/// Twilio status and recording callbacks (form-encoded)
#[instrument(skip_all)]
pub async fn twilio_status(
    state: web::Data<AppState>,
    form: Result<web::Form<TwilioStatusCallback>, actix_web::Error>,
) -> HttpResponse {
    let callback = match form {
        Ok(form) => form.into_inner(),
        Err(e) => {
            warn!(error = %e, "Malformed Twilio status callback");
            return HttpResponse::Ok().finish();
        }
    };

    match state.reconciler.handle_twilio_callback(&callback).await {
        Ok(outcome) => debug!(call_sid = %callback.call_sid, ?outcome, "Twilio callback handled"),
        Err(e) => error!(
            call_sid = %callback.call_sid,
            status = ?callback.call_status,
            error = %e,
            "Twilio callback failed"
        ),
    }

    HttpResponse::Ok().finish()
}

/// Twilio call-control webhook; answers with TwiML
#[instrument(skip(state))]
pub async fn twilio_voice(state: web::Data<AppState>, path: web::Path<Uuid>) -> HttpResponse {
    let id = path.into_inner();

    let call = match state.calls.find_by_id(id).await {
        Ok(Some(call)) => call,
        Ok(None) => {
            warn!(call_request_id = %id, "Voice webhook for unknown call request");
            return twiml_response(twiml::hangup());
        }
        Err(e) => {
            error!(call_request_id = %id, error = %e, "Voice webhook lookup failed");
            return twiml_response(twiml::hangup());
        }
    };

    if let Some(stream_url) = state.media_stream_url.as_deref() {
        info!(call_request_id = %id, "Connecting call to media bridge");
        return twiml_response(twiml::connect_stream(stream_url, &id.to_string()));
    }

    match build_script(&call, Utc::now()) {
        Ok(script) => twiml_response(twiml::say_and_hangup(
            &script.first_message,
            &script.language_code,
        )),
        Err(e) => {
            warn!(call_request_id = %id, error = %e, "No script for voice webhook");
            twiml_response(twiml::say_and_hangup("Arrivederci", FALLBACK_LANGUAGE))
        }
    }
}

/// VAPI server messages (JSON)
#[instrument(skip_all)]
pub async fn vapi_events(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let ack = HttpResponse::Ok().json(json!({ "received": true }));

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Malformed VAPI webhook body");
            return ack;
        }
    };

    let Some(event) = parse_server_message(&payload) else {
        debug!("VAPI message without a call status, ignored");
        return ack;
    };

    match state.reconciler.handle_event(&event).await {
        Ok(outcome) => debug!(provider_call_id = %event.provider_call_id, ?outcome, "VAPI event handled"),
        Err(e) => error!(
            provider_call_id = %event.provider_call_id,
            error = %e,
            "VAPI event failed"
        ),
    }

    ack
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks")
            .route("/twilio/status", web::post().to(twilio_status))
            .route("/twilio/voice/{id}", web::post().to(twilio_voice))
            .route("/vapi", web::post().to(vapi_events)),
    );
}
