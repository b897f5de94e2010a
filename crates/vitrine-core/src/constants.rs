//! Collection names, key prefixes and custom-metadata field names.

/// Collection holding one `MediaAsset` document per ingested upload.
pub const MEDIA_COLLECTION: &str = "media";
pub const SERVICE_REQUESTS_COLLECTION: &str = "serviceRequests";
pub const WORK_ORDERS_COLLECTION: &str = "workOrders";
/// Archive of deleted service requests (soft delete via copy).
pub const DELETED_SERVICE_REQUESTS_COLLECTION: &str = "deletedServiceRequests";
pub const COUNTERS_COLLECTION: &str = "counters";
/// Counter document used to mint work-order numbers.
pub const WORK_ORDER_COUNTER_ID: &str = "workOrders";

pub const DEFAULT_IMAGE_UPLOAD_PREFIX: &str = "uploads/images/";
pub const DEFAULT_VIDEO_UPLOAD_PREFIX: &str = "uploads/videos/";
pub const DEFAULT_DERIVATIVE_PREFIX: &str = "media";

/// Custom metadata keys read from the finalize event.
pub mod metadata_keys {
    pub const UPLOAD_ID: &str = "uploadId";
    pub const ORIGINAL_FILENAME: &str = "originalFilename";
    pub const ORIGIN_CONTEXT: &str = "originContext";
    pub const ORIGIN_ROLE: &str = "originRole";
    pub const EXHIBITION_ID: &str = "exhibitionId";
    /// Written by blob backends that mint token-bearing read URLs.
    pub const DOWNLOAD_TOKENS: &str = "downloadTokens";
}
