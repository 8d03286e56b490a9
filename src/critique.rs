//! Contract with the external critique service.
//!
//! The service receives the script and the recorded take and answers with a
//! JSON scorecard. Any failure on that path is replaced by
//! [`CritiqueResult::fallback`] so callers always get a result to show.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::RecordedTake;

#[derive(Debug, Error)]
pub enum CritiqueError {
    #[error("critique service unavailable: {0}")]
    Unavailable(String),
    #[error("empty response from critique service")]
    EmptyResponse,
    #[error("malformed critique: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{field} out of range: {value}")]
    ScoreOutOfRange { field: &'static str, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueResult {
    pub overall_score: u32,
    pub clarity_score: u32,
    pub emotion_score: u32,
    pub pacing_score: u32,
    pub feedback: String,
    pub best_line: String,
    pub improvement_tip: String,
}

impl CritiqueResult {
    /// The scorecard shown when the service could not be used.
    pub fn fallback() -> Self {
        Self {
            overall_score: 75,
            clarity_score: 80,
            emotion_score: 70,
            pacing_score: 75,
            feedback: "We couldn't reach the judges (API Error), but you sounded passionate! \
                       Keep practicing your pauses to let the weight of the words sink in."
                .into(),
            best_line: "N/A".into(),
            improvement_tip: "Check your internet connection (or API Key) and try again.".into(),
        }
    }

    pub fn validate(&self) -> Result<(), CritiqueError> {
        for (field, value) in [
            ("overallScore", self.overall_score),
            ("clarityScore", self.clarity_score),
            ("emotionScore", self.emotion_score),
            ("pacingScore", self.pacing_score),
        ] {
            if value > 100 {
                return Err(CritiqueError::ScoreOutOfRange { field, value });
            }
        }
        Ok(())
    }
}

/// What the service is asked to judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueRequest {
    pub title: String,
    pub text: String,
    /// Base64 of the recorded WAV, without any data-URL prefix.
    pub audio_base64: String,
}

impl CritiqueRequest {
    pub fn new(title: impl Into<String>, text: impl Into<String>, take: &RecordedTake) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            audio_base64: take.to_base64(),
        }
    }
}

pub trait CritiqueService {
    fn critique(&self, request: &CritiqueRequest) -> Result<CritiqueResult, CritiqueError>;
}

/// Parse and check the service's JSON answer. Every field is required.
pub fn parse_response(body: &str) -> Result<CritiqueResult, CritiqueError> {
    if body.trim().is_empty() {
        return Err(CritiqueError::EmptyResponse);
    }
    let result: CritiqueResult = serde_json::from_str(body)?;
    result.validate()?;
    Ok(result)
}

/// Ask `service`; on any error log it and return the fallback scorecard.
pub fn critique_or_fallback(service: &dyn CritiqueService, request: &CritiqueRequest) -> CritiqueResult {
    match service.critique(request).and_then(|r| r.validate().map(|()| r)) {
        Ok(result) => {
            log::info!(
                "[speechoke][critique] received overall={} for \"{}\"",
                result.overall_score,
                request.title
            );
            result
        }
        Err(err) => {
            log::error!("[speechoke][critique] analysis failed: {err}");
            CritiqueResult::fallback()
        }
    }
}

/// Run [`critique_or_fallback`] on a worker thread; the receiver yields
/// exactly one result. If the thread cannot be spawned the fallback is sent
/// right away.
pub fn spawn_critique(
    service: Arc<dyn CritiqueService + Send + Sync>,
    request: CritiqueRequest,
) -> Receiver<CritiqueResult> {
    let (tx, rx) = bounded(1);
    let fallback_tx = tx.clone();
    let spawned = thread::Builder::new()
        .name("speechoke-critique".into())
        .spawn(move || {
            let _ = tx.send(critique_or_fallback(service.as_ref(), &request));
        });
    if let Err(err) = spawned {
        log::error!("[speechoke][critique] could not start worker: {err}");
        let _ = fallback_tx.send(CritiqueResult::fallback());
    }
    rx
}

/// Used when no service is configured; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineCritic;

impl CritiqueService for OfflineCritic {
    fn critique(&self, _request: &CritiqueRequest) -> Result<CritiqueResult, CritiqueError> {
        Err(CritiqueError::Unavailable("no critique service configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{
        "overallScore": 88, "clarityScore": 90, "emotionScore": 85, "pacingScore": 80,
        "feedback": "Strong.", "bestLine": "We shall fight", "improvementTip": "Breathe."
    }"#;

    struct Canned(&'static str);

    impl CritiqueService for Canned {
        fn critique(&self, _request: &CritiqueRequest) -> Result<CritiqueResult, CritiqueError> {
            parse_response(self.0)
        }
    }

    fn request() -> CritiqueRequest {
        CritiqueRequest {
            title: "Test".into(),
            text: "Words.".into(),
            audio_base64: String::new(),
        }
    }

    #[test]
    fn parses_camel_case_scorecard() {
        let result = parse_response(GOOD).unwrap();
        assert_eq!(result.overall_score, 88);
        assert_eq!(result.best_line, "We shall fight");
    }

    #[test]
    fn missing_field_is_malformed() {
        let body = r#"{"overallScore": 88}"#;
        assert!(matches!(parse_response(body), Err(CritiqueError::Malformed(_))));
        assert!(matches!(parse_response("  "), Err(CritiqueError::EmptyResponse)));
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let body = GOOD.replace("\"pacingScore\": 80", "\"pacingScore\": 180");
        assert!(matches!(
            parse_response(&body),
            Err(CritiqueError::ScoreOutOfRange { field: "pacingScore", value: 180 })
        ));
    }

    #[test]
    fn failures_become_the_fallback() {
        let result = critique_or_fallback(&OfflineCritic, &request());
        assert_eq!(result.overall_score, 75);
        assert_eq!(result.best_line, "N/A");
        assert_eq!(critique_or_fallback(&Canned("not json"), &request()), CritiqueResult::fallback());
        assert_eq!(critique_or_fallback(&Canned(GOOD), &request()).overall_score, 88);
    }

    #[test]
    fn worker_delivers_one_result() {
        let rx = spawn_critique(Arc::new(OfflineCritic), request());
        let result = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(result, CritiqueResult::fallback());
    }

    #[test]
    fn request_serialises_camel_case() {
        let json = serde_json::to_value(request()).unwrap();
        assert!(json.get("audioBase64").is_some());
    }
}
