use std::future::Future;

use archive_core::{Page, PageRequest, Paginator};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ApiError;

/// Items gathered by one traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub items: Vec<T>,
    /// Non-empty pages fetched.
    pub pages: usize,
    /// Set when the traversal stopped on cancellation; `items` holds what was fetched before.
    pub cancelled: bool,
}

/// Drives `paginator` to completion from offset 0, awaiting `fetch` per page.
///
/// Cancellation is checked before every page. Errors other than
/// [`ApiError::Cancelled`] end the traversal and are returned as-is.
pub async fn collect_pages<T, F, Fut>(
    mut paginator: Paginator,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<Collected<T>, ApiError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    paginator.restart();
    let mut collected = Collected {
        items: Vec::new(),
        pages: 0,
        cancelled: false,
    };
    while let Some(request) = paginator.next_request() {
        if cancel.is_cancelled() {
            collected.cancelled = true;
            break;
        }
        let page = match fetch(request).await {
            Ok(page) => page,
            Err(ApiError::Cancelled) => {
                collected.cancelled = true;
                break;
            }
            Err(err) => return Err(err),
        };
        let items = paginator.accept(page);
        if !items.is_empty() {
            collected.pages += 1;
        }
        collected.items.extend(items);
    }
    Ok(collected)
}

/// Splits a `{"count": n, "items": [...]}` response into a page.
pub fn raw_page(response: Value) -> Page<Value> {
    counted_page(response, &["count"])
}

/// Like [`raw_page`], taking the total from the first present key of `total_keys`.
pub fn counted_page(response: Value, total_keys: &[&str]) -> Page<Value> {
    let total = total_keys
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_u64))
        .and_then(|n| usize::try_from(n).ok());
    let items = match response {
        Value::Object(mut fields) => match fields.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    Page::new(items, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_present_total_key_wins() {
        let page = counted_page(
            json!({"count": 40, "current_level_count": 12, "items": [1, 2]}),
            &["current_level_count", "count"],
        );
        assert_eq!(page.total, Some(12));
        assert_eq!(page.items.len(), 2);
        assert_eq!(raw_page(json!({"items": "nope"})), Page::new(Vec::new(), None));
    }
}
