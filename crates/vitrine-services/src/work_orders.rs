//! Work-order lifecycle over paired service requests and work orders.
//!
//! `issued -> paused -> issued -> completed`, with `completed` terminal. Every
//! operation reads and writes both documents inside one document-store transaction,
//! so a work order and its service request never disagree on status.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use vitrine_core::constants::{
    COUNTERS_COLLECTION, DELETED_SERVICE_REQUESTS_COLLECTION, SERVICE_REQUESTS_COLLECTION,
    WORK_ORDERS_COLLECTION, WORK_ORDER_COUNTER_ID,
};
use vitrine_core::models::{
    format_work_order_number, CallerContext, CreateWorkOrderResponse,
    DeleteServiceRequestResponse, ServiceRequest, WorkOrder, WorkOrderCounter, WorkOrderPayload,
    WorkOrderStatus, WorkOrderTransitionResponse,
};
use vitrine_core::{CallableError, ErrorMetadata, LogLevel};
use vitrine_db::{
    DbError, Direction, DocumentStore, DocumentTransaction, DocumentTransactionExt, FilterOp,
    Query, SetOptions,
};

fn internal(err: DbError) -> CallableError {
    CallableError::internal(err.to_string())
}

fn log_error(operation: &'static str, error: &CallableError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(operation, code, error = %error, "Work-order operation rejected"),
        LogLevel::Warn => tracing::warn!(operation, code, error = %error, "Work-order operation rejected"),
        LogLevel::Error => tracing::error!(operation, code, error = %error, "Work-order operation failed"),
    }
}

/// Trimmed, non-empty identifier or `invalid-argument`.
fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, CallableError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CallableError::invalid_argument(format!("{} is required", field))),
    }
}

async fn load_request(
    tx: &mut Box<dyn DocumentTransaction>,
    source_request_id: &str,
) -> Result<ServiceRequest, CallableError> {
    tx.get_as::<ServiceRequest>(SERVICE_REQUESTS_COLLECTION, source_request_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            CallableError::not_found(format!("Service request {} not found", source_request_id))
        })
}

async fn load_work_order(
    tx: &mut Box<dyn DocumentTransaction>,
    work_order_id: &str,
) -> Result<Option<WorkOrder>, CallableError> {
    tx.get_as::<WorkOrder>(WORK_ORDERS_COLLECTION, work_order_id)
        .await
        .map_err(internal)
}

/// The order a service request points at, else its most recently created order.
async fn find_order_for_request(
    tx: &mut Box<dyn DocumentTransaction>,
    source_request_id: &str,
) -> Result<(String, WorkOrder), CallableError> {
    let request = load_request(tx, source_request_id).await?;
    if let Some(linked_id) = request.linked_work_order_id.as_deref() {
        if let Some(order) = load_work_order(tx, linked_id).await? {
            if order.source_request_id == source_request_id {
                return Ok((linked_id.to_string(), order));
            }
        }
    }

    let query = Query::new()
        .filter("sourceRequestId", FilterOp::Eq, source_request_id)
        .order_by("createdAt", Direction::Descending)
        .limit(1);
    let found = tx
        .query(WORK_ORDERS_COLLECTION, &query)
        .await
        .map_err(internal)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            CallableError::not_found(format!(
                "No work order for service request {}",
                source_request_id
            ))
        })?;
    let order: WorkOrder =
        serde_json::from_value(found.data).map_err(|e| CallableError::internal(e.to_string()))?;
    Ok((found.id, order))
}

/// Write the work-order status and mirror it on the service request.
async fn write_status(
    tx: &mut Box<dyn DocumentTransaction>,
    work_order_id: &str,
    source_request_id: &str,
    status: WorkOrderStatus,
) -> Result<(), CallableError> {
    let now = serde_json::to_value(Utc::now()).map_err(|e| CallableError::internal(e.to_string()))?;
    let mut order_fields = json!({ "status": status, "modifiedAt": now.clone() });
    if status == WorkOrderStatus::Completed {
        order_fields["completedAt"] = now.clone();
    }
    tx.set(WORK_ORDERS_COLLECTION, work_order_id, order_fields, SetOptions::merge())
        .await
        .map_err(internal)?;
    tx.set(
        SERVICE_REQUESTS_COLLECTION,
        source_request_id,
        json!({ "status": status.request_status(), "modifiedAt": now }),
        SetOptions::merge(),
    )
    .await
    .map_err(internal)
}

#[derive(Clone)]
pub struct WorkOrderService {
    store: Arc<dyn DocumentStore>,
}

impl WorkOrderService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn begin(&self) -> Result<Box<dyn DocumentTransaction>, CallableError> {
        self.store.begin().await.map_err(internal)
    }

    /// Convert a service request into an issued work order.
    ///
    /// Returns the existing order with `already_exists` when the request is already
    /// linked to a work order that still exists.
    #[tracing::instrument(skip(self, caller, payload), fields(source_request_id = ?payload.source_request_id))]
    pub async fn create(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<CreateWorkOrderResponse, CallableError> {
        let result = self.create_inner(caller, payload).await;
        if let Err(e) = &result {
            log_error("create", e);
        }
        result
    }

    async fn create_inner(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<CreateWorkOrderResponse, CallableError> {
        let uid = caller.require_uid()?;
        let source_request_id = required(payload.source_request_id.as_deref(), "sourceRequestId")?;
        let force_emit = payload.force_emit.unwrap_or(false);

        let mut tx = self.begin().await?;
        let request = load_request(&mut tx, source_request_id).await?;
        if !request.is_work_order && !force_emit {
            return Err(CallableError::failed_precondition(format!(
                "Service request {} is not flagged as a work order",
                source_request_id
            )));
        }

        if let Some(linked_id) = request.linked_work_order_id.as_deref() {
            if let Some(existing) = load_work_order(&mut tx, linked_id).await? {
                tracing::info!(work_order_id = %linked_id, "Work order already exists");
                return Ok(CreateWorkOrderResponse {
                    work_order_id: linked_id.to_string(),
                    work_order_number: existing.work_order_number,
                    already_exists: true,
                });
            }
            tracing::warn!(work_order_id = %linked_id, "Linked work order is missing, issuing a new one");
        }

        let counter = tx
            .get_as::<WorkOrderCounter>(COUNTERS_COLLECTION, WORK_ORDER_COUNTER_ID)
            .await
            .map_err(internal)?
            .unwrap_or_default();
        let sequence = counter.next.max(1);
        tx.set_as(
            COUNTERS_COLLECTION,
            WORK_ORDER_COUNTER_ID,
            &WorkOrderCounter { next: sequence + 1 },
            SetOptions::overwrite(),
        )
        .await
        .map_err(internal)?;

        let now = Utc::now();
        let work_order_id = Uuid::new_v4().to_string();
        let work_order = WorkOrder {
            work_order_number: format_work_order_number(sequence),
            source_request_id: source_request_id.to_string(),
            status: WorkOrderStatus::Issued,
            created_by: uid.to_string(),
            created_at: now,
            modified_at: now,
            completed_at: None,
        };
        tx.set_as(WORK_ORDERS_COLLECTION, &work_order_id, &work_order, SetOptions::overwrite())
            .await
            .map_err(internal)?;
        tx.set(
            SERVICE_REQUESTS_COLLECTION,
            source_request_id,
            json!({
                "linkedWorkOrderId": work_order_id,
                "status": WorkOrderStatus::Issued.request_status(),
                "modifiedAt": now,
            }),
            SetOptions::merge(),
        )
        .await
        .map_err(internal)?;
        tx.commit().await.map_err(internal)?;

        tracing::info!(
            work_order_id = %work_order_id,
            work_order_number = %work_order.work_order_number,
            created_by = %uid,
            "Work order issued"
        );
        Ok(CreateWorkOrderResponse {
            work_order_id,
            work_order_number: work_order.work_order_number,
            already_exists: false,
        })
    }

    /// Pause the work order linked to a service request.
    #[tracing::instrument(skip(self, caller, payload), fields(source_request_id = ?payload.source_request_id))]
    pub async fn pause(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<WorkOrderTransitionResponse, CallableError> {
        let result = self.transition(caller, payload, WorkOrderStatus::Paused).await;
        if let Err(e) = &result {
            log_error("pause", e);
        }
        result
    }

    /// Resume a paused work order.
    #[tracing::instrument(skip(self, caller, payload), fields(source_request_id = ?payload.source_request_id))]
    pub async fn resume(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<WorkOrderTransitionResponse, CallableError> {
        let result = self.transition(caller, payload, WorkOrderStatus::Issued).await;
        if let Err(e) = &result {
            log_error("resume", e);
        }
        result
    }

    async fn transition(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
        target: WorkOrderStatus,
    ) -> Result<WorkOrderTransitionResponse, CallableError> {
        caller.require_uid()?;
        let source_request_id = required(payload.source_request_id.as_deref(), "sourceRequestId")?;

        let mut tx = self.begin().await?;
        let request = load_request(&mut tx, source_request_id).await?;
        let work_order_id = request.linked_work_order_id.ok_or_else(|| {
            CallableError::failed_precondition(format!(
                "Service request {} has no linked work order",
                source_request_id
            ))
        })?;
        let order = load_work_order(&mut tx, &work_order_id)
            .await?
            .ok_or_else(|| CallableError::not_found(format!("Work order {} not found", work_order_id)))?;

        let response = WorkOrderTransitionResponse {
            work_order_id: work_order_id.clone(),
            source_request_id: source_request_id.to_string(),
            status: target,
        };

        if order.status.is_terminal() {
            return Err(CallableError::failed_precondition(format!(
                "Work order {} is already completed",
                work_order_id
            )));
        }
        if order.status == target {
            tracing::debug!(work_order_id = %work_order_id, status = %target, "Work order already in target status");
            return Ok(response);
        }

        write_status(&mut tx, &work_order_id, source_request_id, target).await?;
        tx.commit().await.map_err(internal)?;

        tracing::info!(
            work_order_id = %work_order_id,
            from = %order.status,
            to = %target,
            "Work order status changed"
        );
        Ok(response)
    }

    /// Complete a work order, located by id or by its source request.
    #[tracing::instrument(skip(self, caller, payload), fields(work_order_id = ?payload.work_order_id, source_request_id = ?payload.source_request_id))]
    pub async fn complete(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<WorkOrderTransitionResponse, CallableError> {
        let result = self.complete_inner(caller, payload).await;
        if let Err(e) = &result {
            log_error("complete", e);
        }
        result
    }

    async fn complete_inner(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<WorkOrderTransitionResponse, CallableError> {
        caller.require_uid()?;
        let work_order_id = required(payload.work_order_id.as_deref(), "workOrderId").ok();
        let source_request_id =
            required(payload.source_request_id.as_deref(), "sourceRequestId").ok();

        let (mut tx, work_order_id, order) = match (work_order_id, source_request_id) {
            (Some(id), _) => {
                let mut tx = self.begin().await?;
                let order = load_work_order(&mut tx, id)
                    .await?
                    .ok_or_else(|| CallableError::not_found(format!("Work order {} not found", id)))?;
                (tx, id.to_string(), order)
            }
            (None, Some(request_id)) => {
                let mut tx = self.begin().await?;
                let (id, order) = find_order_for_request(&mut tx, request_id).await?;
                (tx, id, order)
            }
            (None, None) => {
                return Err(CallableError::invalid_argument(
                    "workOrderId or sourceRequestId is required",
                ))
            }
        };

        // The referenced request must still exist.
        load_request(&mut tx, &order.source_request_id).await?;

        let response = WorkOrderTransitionResponse {
            work_order_id: work_order_id.clone(),
            source_request_id: order.source_request_id.clone(),
            status: WorkOrderStatus::Completed,
        };
        if order.status == WorkOrderStatus::Completed {
            tracing::debug!(work_order_id = %work_order_id, "Work order already completed");
            return Ok(response);
        }

        write_status(
            &mut tx,
            &work_order_id,
            &order.source_request_id,
            WorkOrderStatus::Completed,
        )
        .await?;
        tx.commit().await.map_err(internal)?;

        tracing::info!(work_order_id = %work_order_id, "Work order completed");
        Ok(response)
    }

    /// Archive a service request to `deletedServiceRequests` and delete it.
    #[tracing::instrument(skip(self, caller, payload), fields(source_request_id = ?payload.source_request_id))]
    pub async fn delete_service_request(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<DeleteServiceRequestResponse, CallableError> {
        let result = self.delete_service_request_inner(caller, payload).await;
        if let Err(e) = &result {
            log_error("delete_service_request", e);
        }
        result
    }

    async fn delete_service_request_inner(
        &self,
        caller: &CallerContext,
        payload: &WorkOrderPayload,
    ) -> Result<DeleteServiceRequestResponse, CallableError> {
        let uid = caller.require_uid()?;
        let source_request_id = required(payload.source_request_id.as_deref(), "sourceRequestId")?;

        let mut tx = self.begin().await?;
        let mut archived = tx
            .get(SERVICE_REQUESTS_COLLECTION, source_request_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| {
                CallableError::not_found(format!("Service request {} not found", source_request_id))
            })?;

        if let JsonValue::Object(fields) = &mut archived {
            fields.insert("deletedBy".to_string(), json!(uid));
            fields.insert("deletedAt".to_string(), json!(Utc::now()));
        }
        tx.set(
            DELETED_SERVICE_REQUESTS_COLLECTION,
            source_request_id,
            archived,
            SetOptions::overwrite(),
        )
        .await
        .map_err(internal)?;
        tx.delete(SERVICE_REQUESTS_COLLECTION, source_request_id)
            .await
            .map_err(internal)?;
        tx.commit().await.map_err(internal)?;

        tracing::info!(deleted_by = %uid, "Service request archived and deleted");
        Ok(DeleteServiceRequestResponse {
            source_request_id: source_request_id.to_string(),
            archived: true,
        })
    }
}
