use serde::Serialize;

/// Canonical success envelope for single-object, mutation, and
/// sub-resource list responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn created(data: T, resource: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(format!("{resource} created successfully")),
        }
    }

    pub fn updated(data: T, resource: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(format!("{resource} updated successfully")),
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Canonical list envelope: items plus pagination metadata.
#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize> {
    pub success: bool,
    pub items: Vec<T>,
    pub meta: ListMeta,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    pub has_more: bool,
}

impl<T: Serialize> ListResponse<T> {
    pub fn new(items: Vec<T>, total: i64, skip: i64, limit: i64) -> Self {
        Self {
            success: true,
            items,
            meta: ListMeta {
                total,
                skip,
                limit,
                has_more: skip + limit < total,
            },
        }
    }
}

/// Outcome of a bulk batch: items are attempted independently, nothing is
/// rolled back, and both counters are reported to the caller.
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub success: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub message: String,
}

impl BulkResponse {
    pub fn new(action: &str, resource: &str, succeeded: usize, failed: usize) -> Self {
        Self {
            success: failed == 0,
            succeeded,
            failed,
            message: format!("{action} {succeeded} {resource}(s), {failed} failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_more_reflects_the_window() {
        let page = ListResponse::new(vec![1, 2, 3], 10, 0, 3);
        assert!(page.meta.has_more);
        let last = ListResponse::new(vec![10], 10, 9, 3);
        assert!(!last.meta.has_more);
        // skip + limit == total means the window is exhausted
        let exact = ListResponse::new(vec![1, 2], 4, 2, 2);
        assert!(!exact.meta.has_more);
    }

    #[test]
    fn sub_resource_lists_share_the_envelope() {
        let body = serde_json::to_value(ApiResponse::data(vec![1, 2, 3])).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([1, 2, 3]));
        assert!(body.get("message").is_none());
    }

    #[test]
    fn mutation_envelope_carries_message() {
        let body = serde_json::to_value(ApiResponse::created(1, "Team")).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], 1);
        assert_eq!(body["message"], "Team created successfully");
    }

    #[test]
    fn bulk_partial_failure_is_visible() {
        let body = BulkResponse::new("Created", "Ticket", 2, 1);
        assert!(!body.success);
        assert_eq!(body.succeeded, 2);
        assert_eq!(body.failed, 1);
    }
}
