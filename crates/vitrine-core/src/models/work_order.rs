use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Service request status values written by the work-order operations.
pub mod service_request_status {
    pub const CONVERTED_TO_WORK_ORDER: &str = "converted_to_work_order";
    pub const WORK_ORDER_PAUSED: &str = "work_order_paused";
    pub const COMPLETED: &str = "completed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkOrderStatus {
    Issued,
    Paused,
    Completed,
}

impl WorkOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed)
    }

    /// Service request status mirrored for this work-order status.
    pub fn request_status(&self) -> &'static str {
        match self {
            WorkOrderStatus::Issued => service_request_status::CONVERTED_TO_WORK_ORDER,
            WorkOrderStatus::Paused => service_request_status::WORK_ORDER_PAUSED,
            WorkOrderStatus::Completed => service_request_status::COMPLETED,
        }
    }
}

impl Display for WorkOrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            WorkOrderStatus::Issued => write!(f, "issued"),
            WorkOrderStatus::Paused => write!(f, "paused"),
            WorkOrderStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Document in `serviceRequests`. Fields not touched by the work-order operations
/// are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    #[serde(default)]
    pub is_work_order: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_work_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Document in `workOrders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub work_order_number: String,
    pub source_request_id: String,
    pub status: WorkOrderStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// `counters/workOrders`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderCounter {
    pub next: u64,
}

/// Human readable work-order number, e.g. `WO-000123`.
pub fn format_work_order_number(sequence: u64) -> String {
    format!("WO-{:06}", sequence)
}

/// Payload accepted by every work-order operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_emit: Option<bool>,
}

impl WorkOrderPayload {
    pub fn for_request(source_request_id: impl Into<String>) -> Self {
        Self {
            source_request_id: Some(source_request_id.into()),
            ..Default::default()
        }
    }

    pub fn for_work_order(work_order_id: impl Into<String>) -> Self {
        Self {
            work_order_id: Some(work_order_id.into()),
            ..Default::default()
        }
    }

    pub fn with_force_emit(mut self, force_emit: bool) -> Self {
        self.force_emit = Some(force_emit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkOrderResponse {
    pub work_order_id: String,
    pub work_order_number: String,
    pub already_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderTransitionResponse {
    pub work_order_id: String,
    pub source_request_id: String,
    pub status: WorkOrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteServiceRequestResponse {
    pub source_request_id: String,
    pub archived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_work_order_numbers() {
        assert_eq!(format_work_order_number(123), "WO-000123");
        assert_eq!(format_work_order_number(1_234_567), "WO-1234567");
    }

    #[test]
    fn service_request_preserves_unknown_fields() {
        let doc = json!({
            "isWorkOrder": true,
            "status": "open",
            "title": "Leaking roof",
            "requester": {"name": "Sam"}
        });
        let request: ServiceRequest = serde_json::from_value(doc.clone()).unwrap();
        assert!(request.is_work_order);
        assert_eq!(request.extra["title"], "Leaking roof");
        assert_eq!(serde_json::to_value(&request).unwrap(), doc);
    }

    #[test]
    fn payload_uses_camel_case() {
        let payload: WorkOrderPayload =
            serde_json::from_value(json!({"sourceRequestId": "req1", "forceEmit": true})).unwrap();
        assert_eq!(payload, WorkOrderPayload::for_request("req1").with_force_emit(true));
    }

    #[test]
    fn status_mirrors_request_status() {
        assert_eq!(
            WorkOrderStatus::Paused.request_status(),
            service_request_status::WORK_ORDER_PAUSED
        );
        assert!(WorkOrderStatus::Completed.is_terminal());
        assert!(!WorkOrderStatus::Issued.is_terminal());
    }
}
