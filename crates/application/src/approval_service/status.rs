use super::*;

impl ApprovalService {
    /// Returns a request's status, claiming its credential if it is approved.
    ///
    /// The credential appears in exactly one returned view. Later polls report
    /// `claimed` without it.
    pub async fn poll_status(&self, request_id: &RequestId) -> AppResult<RequestStatusView> {
        let request = self
            .store
            .get(request_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("request not found: {request_id}")))?;

        if request.status() != RequestStatus::Approved {
            return Ok(RequestStatusView {
                request_id: request_id.clone(),
                status: request.status(),
                credential: None,
            });
        }

        match self.store.claim(request_id).await? {
            Some(credential) => {
                info!(request_id = %request_id, "credential claimed");
                Ok(RequestStatusView {
                    request_id: request_id.clone(),
                    status: RequestStatus::Approved,
                    credential: Some(credential),
                })
            }
            None => {
                let status = self
                    .store
                    .get(request_id)
                    .await
                    .map_or(RequestStatus::Claimed, |current| current.status());
                Ok(RequestStatusView {
                    request_id: request_id.clone(),
                    status,
                    credential: None,
                })
            }
        }
    }
}
