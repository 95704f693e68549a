//! Recognition payload mapping
//!
//! Pure mapping from the raw recognition JSON into the normalized result
//! shape. The backend's field names (`documentName`, `ocr.validState`,
//! `image.documentFrontSide`, ...) are an external contract.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Sentinel value of `ocr.validState` meaning the document checks passed
const VALID_STATE_OK: i64 = 1;

#[derive(Debug, Error)]
pub enum ResultError {
    #[error("recognition result is missing a document type")]
    MissingDocumentType,
}

/// Cropped image payloads returned by the recognition backend
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageBundle {
    pub portrait: Option<String>,
    pub signature: Option<String>,
    pub document_front: Option<String>,
    pub document_back: Option<String>,
}

/// Normalized identity-verification result, derived from one recognition
/// call and owned by the orchestration unit that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub personal_number: Option<String>,
    pub issuing_state: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub document_valid: bool,
    pub document_score: f64,
    pub vendor_id: Option<String>,
    pub images: ImageBundle,
}

fn str_at(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl VerificationResult {
    /// Map a raw recognition payload.
    ///
    /// Name handling is intentionally lossy: the backend returns a single
    /// full-name string which is split on the first space — first token
    /// becomes first_name, second becomes last_name, anything beyond the
    /// second token is dropped.
    pub fn from_raw(raw: &Value) -> Self {
        let name = raw.pointer("/ocr/name").and_then(Value::as_str);
        let first_name = name
            .and_then(|n| n.split(' ').next())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let last_name = name
            .and_then(|n| n.split(' ').nth(1))
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let vendor_id = match raw.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            document_type: str_at(raw, "/documentName"),
            document_number: str_at(raw, "/ocr/identityCardNumber"),
            personal_number: str_at(raw, "/ocr/personalNumber"),
            issuing_state: str_at(raw, "/countryName"),
            first_name,
            last_name,
            date_of_birth: str_at(raw, "/ocr/dateOfBirth"),
            document_valid: raw.pointer("/ocr/validState").and_then(Value::as_i64)
                == Some(VALID_STATE_OK),
            document_score: raw.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            vendor_id,
            images: ImageBundle {
                portrait: str_at(raw, "/image/portrait"),
                signature: str_at(raw, "/image/signature"),
                document_front: str_at(raw, "/image/documentFrontSide"),
                document_back: str_at(raw, "/image/documentBackSide"),
            },
        }
    }

    /// The single validation gate before a result is accepted: a result
    /// without a document type is unusable.
    pub fn validate(self) -> Result<Self, ResultError> {
        if self.document_type.is_none() {
            return Err(ResultError::MissingDocumentType);
        }
        Ok(self)
    }
}
