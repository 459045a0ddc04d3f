use super::*;

impl ApprovalService {
    /// Admits, validates and stores a new access request.
    ///
    /// Auto-approve tiers are minted before returning; other tiers are sent to
    /// the approval channel with a timeout watcher. Nothing is stored when any
    /// check fails. The returned snapshot reflects the state after auto-approval.
    pub async fn submit(&self, input: NewAccessRequest) -> AppResult<AccessRequest> {
        if !self.is_requester_allowed(input.requester()) {
            warn!(
                requester = input.requester(),
                resource = input.resource(),
                "request rejected, requester not allowed"
            );
            return Err(AppError::Forbidden("requester not allowed".to_owned()));
        }

        self.rate_limiter
            .check_rate_limit(input.resource(), input.requester())
            .await
            .inspect_err(|_| {
                warn!(
                    requester = input.requester(),
                    resource = input.resource(),
                    "request rejected, rate limited"
                );
            })?;

        let tier = self.tier_config(input.tier())?;
        self.tiers
            .check_minimum(input.resource(), input.tier())
            .inspect_err(|_| {
                warn!(
                    requester = input.requester(),
                    resource = input.resource(),
                    requested_tier = input.tier(),
                    "request rejected, tier below resource minimum"
                );
            })?;

        if input.is_vault() {
            self.vault_rules.validate(input.vault_paths())?;
        }

        let input = if input.scopes().is_empty() {
            let scopes = self.default_scopes.clone();
            input.with_scopes(scopes)
        } else {
            input
        };

        let request = self.store.create(input).await.inspect_err(|create_error| {
            error!(error = %create_error, "store create failed");
        })?;

        info!(
            request_id = %request.id(),
            requester = request.requester(),
            resource = request.resource(),
            tier = request.tier(),
            reason = request.reason(),
            scopes = ?request.scopes(),
            "request received"
        );

        if tier.auto_approve() {
            self.auto_approve(&request, &tier).await;
        } else {
            self.request_approval(&request, &tier).await;
        }

        Ok(self.store.get(request.id()).await.unwrap_or(request))
    }

    async fn auto_approve(&self, request: &AccessRequest, tier: &TierConfig) {
        info!(
            request_id = %request.id(),
            tier = request.tier(),
            resource = request.resource(),
            "auto approve"
        );

        let credential = match self.mint_for(request, tier).await {
            Ok(credential) => credential,
            Err(mint_error) => {
                error!(
                    request_id = %request.id(),
                    error = %mint_error,
                    "auto approve mint failed, request left pending"
                );
                self.spawn_timeout_watcher(request.id().clone());
                return;
            }
        };

        let backend = credential.metadata().get("backend").cloned().unwrap_or_default();
        match self
            .store
            .approve(request.id(), credential, tier.ttl())
            .await
        {
            Ok(()) => info!(
                request_id = %request.id(),
                approver = "auto",
                ttl_seconds = tier.ttl().as_secs(),
                backend = %backend,
                "approved"
            ),
            Err(store_error) => error!(
                request_id = %request.id(),
                error = %store_error,
                "auto approve store transition failed"
            ),
        }
    }

    async fn request_approval(&self, request: &AccessRequest, tier: &TierConfig) {
        let notice = ApprovalNotice::from_request(request, tier.ttl());
        match self.notifier.send_approval(&notice).await {
            Ok(handle) => {
                info!(
                    request_id = %request.id(),
                    notification = handle.as_str(),
                    "approval sent"
                );
                if let Err(attach_error) = self
                    .store
                    .attach_notification(request.id(), handle)
                    .await
                {
                    error!(
                        request_id = %request.id(),
                        error = %attach_error,
                        "failed to record approval message"
                    );
                }
            }
            Err(send_error) => error!(
                request_id = %request.id(),
                error = %send_error,
                "approval message send failed"
            ),
        }

        self.spawn_timeout_watcher(request.id().clone());
    }
}
