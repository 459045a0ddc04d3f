use super::*;

impl ApprovalService {
    /// Applies an approve or deny decision from the approval channel.
    ///
    /// Missing and already-resolved requests are ignored, so duplicate or
    /// late callbacks are harmless.
    pub async fn handle_callback(
        &self,
        decision: ApprovalDecision,
        request_id: &RequestId,
    ) -> CallbackOutcome {
        let Some(request) = self.store.get(request_id).await else {
            warn!(request_id = %request_id, %decision, "callback for unknown request");
            return CallbackOutcome::Ignored;
        };

        if !request.is_pending() {
            warn!(
                request_id = %request_id,
                status = %request.status(),
                %decision,
                "callback for request that is not pending"
            );
            return CallbackOutcome::Ignored;
        }

        match decision {
            ApprovalDecision::Approve => self.approve(request_id).await,
            ApprovalDecision::Deny => self.deny(&request).await,
        }
    }

    async fn approve(&self, request_id: &RequestId) -> CallbackOutcome {
        let request = match self.store.reserve_mint(request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(
                    request_id = %request_id,
                    "approve ignored, request resolved or already being approved"
                );
                return CallbackOutcome::Ignored;
            }
            Err(store_error) => {
                error!(
                    request_id = %request_id,
                    error = %store_error,
                    "approve reservation failed"
                );
                return CallbackOutcome::Ignored;
            }
        };

        let minted = match self.tier_config(request.tier()) {
            Ok(tier) => self.mint_for(&request, &tier).await.map(|credential| (tier, credential)),
            Err(tier_error) => Err(tier_error),
        };
        let (tier, credential) = match minted {
            Ok(minted) => minted,
            Err(mint_error) => return self.approval_failed(&request, mint_error).await,
        };

        let backend = credential.metadata().get("backend").cloned().unwrap_or_default();
        let lease_id = credential.lease_id().to_owned();
        if let Err(store_error) = self
            .store
            .approve(request.id(), credential, tier.ttl())
            .await
        {
            error!(
                request_id = %request.id(),
                error = %store_error,
                backend = %backend,
                lease_id = %lease_id,
                "approve store transition failed, minted credential discarded"
            );
            return CallbackOutcome::Ignored;
        }

        info!(
            request_id = %request.id(),
            approver = "human",
            ttl_seconds = tier.ttl().as_secs(),
            backend = %backend,
            "approved"
        );

        if let Some(handle) = request.notification() {
            let notice = self.notice(&request);
            if let Err(notify_error) = self.notifier.mark_approved(handle, &notice).await {
                warn!(
                    request_id = %request.id(),
                    error = %notify_error,
                    "failed to update approval message"
                );
            }
        }

        CallbackOutcome::Approved
    }

    async fn deny(&self, request: &AccessRequest) -> CallbackOutcome {
        if let Err(store_error) = self.store.deny(request.id()).await {
            warn!(
                request_id = %request.id(),
                error = %store_error,
                "deny store transition failed"
            );
            return CallbackOutcome::Ignored;
        }

        info!(request_id = %request.id(), approver = "human", "denied");

        if let Some(handle) = request.notification() {
            let notice = self.notice(request);
            if let Err(notify_error) = self.notifier.mark_denied(handle, &notice).await {
                warn!(
                    request_id = %request.id(),
                    error = %notify_error,
                    "failed to update approval message"
                );
            }
        }

        CallbackOutcome::Denied
    }

    async fn approval_failed(&self, request: &AccessRequest, cause: AppError) -> CallbackOutcome {
        let release = self.store.release_mint(request.id()).await;
        error!(
            request_id = %request.id(),
            error = %cause,
            "approve mint failed"
        );

        if let Some(handle) = request.notification() {
            let notice = self.notice(request);
            if let Err(notify_error) = self
                .notifier
                .mark_error(handle, &notice, &cause.to_string())
                .await
            {
                warn!(
                    request_id = %request.id(),
                    error = %notify_error,
                    "failed to update approval message"
                );
            }
        }

        match release {
            Ok(MintRelease::Pending) => {}
            Ok(MintRelease::TimedOut) => self.announce_timeout(request).await,
            Err(store_error) => error!(
                request_id = %request.id(),
                error = %store_error,
                "mint reservation release failed"
            ),
        }

        CallbackOutcome::MintFailed
    }
}
