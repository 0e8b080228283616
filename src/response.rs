//! Mapping an [`AnalysisResult`] to the caller-facing response.
//!
//! ```text
//! Success → 200 {"success":true, "data":{"ingredients":[…], "rawText":"…"}}
//! NO_FILE → 400 {"success":false,"error":{"code":"NO_FILE","message":"…"}}
//! other   → 500 {"success":false,"error":{"code":"RECEIPT_ANALYSIS_ERROR","message":"…"}}
//! ```
//!
//! The stage-specific code never leaves the process; only the message of the
//! triggering error is passed through.

use crate::output::AnalysisResult;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Status plus JSON body, ready for any HTTP layer to send.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl AnalysisResponse {
    /// Body as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SuccessData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessData {
    pub ingredients: Vec<String>,
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Build the external response for an invocation outcome.
pub fn build_response(result: &AnalysisResult) -> AnalysisResponse {
    match result {
        AnalysisResult::Success {
            ingredients,
            raw_text,
        } => AnalysisResponse {
            status: StatusCode::OK,
            body: ResponseBody {
                success: true,
                data: Some(SuccessData {
                    ingredients: ingredients.as_slice().to_vec(),
                    raw_text: raw_text.content.clone(),
                }),
                error: None,
            },
        },
        AnalysisResult::Failure { code, message } => AnalysisResponse {
            status: if code.is_client_fault() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            body: ResponseBody {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: code.external().to_string(),
                    message: message.clone(),
                }),
            },
        },
    }
}

impl From<&AnalysisResult> for AnalysisResponse {
    fn from(result: &AnalysisResult) -> Self {
        build_response(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, StageError};
    use crate::output::ExtractedText;
    use crate::pipeline::validate::validate;
    use serde_json::json;

    #[test]
    fn success_shape() {
        let result = AnalysisResult::Success {
            ingredients: validate(json!(["rice", "kimchi"])).unwrap(),
            raw_text: ExtractedText::new("rice 3000\nkimchi 2000", "/tmp/r.png"),
        };
        let response = build_response(&result);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.to_json(),
            json!({
                "success": true,
                "data": {
                    "ingredients": ["rice", "kimchi"],
                    "rawText": "rice 3000\nkimchi 2000"
                }
            })
        );
    }

    #[test]
    fn no_file_is_bad_request() {
        let response = build_response(&AnalysisResult::from(StageError::NoFile));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.to_json(),
            json!({
                "success": false,
                "error": {"code": "NO_FILE", "message": "No receipt image provided"}
            })
        );
    }

    #[test]
    fn stage_failures_collapse_to_analysis_error() {
        let result = AnalysisResult::Failure {
            code: ErrorCode::ResponseNotArray,
            message: "Response is not an array (got object)".into(),
        };
        let response = AnalysisResponse::from(&result);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = response.body.error.unwrap();
        assert_eq!(error.code, "RECEIPT_ANALYSIS_ERROR");
        assert_eq!(error.message, "Response is not an array (got object)");
        assert!(response.body.data.is_none());
    }
}
