use super::*;

impl ApprovalService {
    /// Times out a request that is still pending. No-op once resolved.
    ///
    /// A request with an approval mint in flight is left to that mint; the
    /// timeout is applied only if the mint fails.
    pub(super) async fn expire(&self, request_id: &RequestId) {
        let Some(request) = self.store.get(request_id).await else {
            return;
        };
        if !request.is_pending() {
            return;
        }

        match self.store.timeout(request_id).await {
            Ok(true) => self.announce_timeout(&request).await,
            Ok(false) => {}
            Err(store_error) => error!(
                request_id = %request_id,
                error = %store_error,
                "timeout store transition failed"
            ),
        }
    }

    pub(super) async fn announce_timeout(&self, request: &AccessRequest) {
        info!(
            request_id = %request.id(),
            timeout_seconds = self.request_timeout.as_secs(),
            "request timed out"
        );

        if let Some(handle) = request.notification() {
            let notice = self.notice(request);
            if let Err(notify_error) = self.notifier.mark_timed_out(handle, &notice).await {
                warn!(
                    request_id = %request.id(),
                    error = %notify_error,
                    "failed to update approval message"
                );
            }
        }
    }
}
