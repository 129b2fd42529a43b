//! CRM payloads and operation results.
//!
//! These are the standardized structures every CRM adapter speaks, keeping
//! the orchestration core independent of any concrete CRM's field layout.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standardized customer fields.
///
/// Only `name` is required at creation; updates may carry any subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerData {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Search criteria for customer lookup. All fields are partial matches;
/// an empty query lists the most recent customers up to `limit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub limit: u32,
}

impl CustomerQuery {
    /// Whether any search criterion is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none() && self.company.is_none()
    }
}

/// Standardized order payload: one customer, one or more product lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub customer_id: String,
    pub lines: Vec<OrderLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One product line within an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: u32,
}

/// Outcome of one CRM adapter invocation.
///
/// Folded into exactly one assistant turn by the response emitter; `message`
/// is user-facing text, `error_code` is machine-readable observability
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl OperationResult {
    /// A successful result with a payload.
    pub fn ok(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_code: None,
            error_details: None,
        }
    }

    /// A successful result with no payload.
    pub fn ok_empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error_code: None,
            error_details: None,
        }
    }

    /// A failed result carrying an error classification.
    pub fn failed(
        message: impl Into<String>,
        error_code: impl Into<String>,
        error_details: Option<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(error_code.into()),
            error_details,
        }
    }

    /// A local validation failure, produced without calling the adapter.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::failed(message, "validation-error", None)
    }
}
