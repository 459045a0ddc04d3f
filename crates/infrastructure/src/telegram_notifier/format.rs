use chrono::{DateTime, Utc};

use jitbroker_application::ApprovalNotice;

use super::human_ttl;

const ELEVATED_TIER: u32 = 3;

pub(super) enum Resolution {
    Approved,
    Denied,
}

/// Escapes text for Telegram's HTML parse mode.
pub(super) fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub(super) fn approval_prompt(notice: &ApprovalNotice) -> String {
    let (emoji, label) = if notice.tier >= ELEVATED_TIER {
        ("🔒", "Elevated")
    } else {
        ("🔐", "Quick Approve")
    };

    let mut text = format!(
        "{emoji} <b>JIT Access Request</b> [{id}]\n\n\
         <b>Resource:</b> {resource}\n\
         <b>Tier:</b> {tier} ({label})\n\
         <b>TTL:</b> {ttl}\n\
         <b>Requester:</b> {requester}\n\
         <b>Reason:</b> {reason}\n",
        id = escape_html(notice.request_id.as_str()),
        resource = escape_html(&notice.resource),
        tier = notice.tier,
        ttl = human_ttl(notice.ttl),
        requester = escape_html(&notice.requester),
        reason = escape_html(&notice.reason),
    );

    if !notice.scopes.is_empty() {
        text.push_str(&format!(
            "<b>Scopes:</b> {}\n",
            escape_html(&notice.scopes.join(", "))
        ));
    }

    if !notice.vault_paths.is_empty() {
        text.push_str("\n📂 <b>Vault Paths Requested:</b>\n");
        for path in &notice.vault_paths {
            text.push_str(&format!(
                "  • <code>{}</code> [{}]\n",
                escape_html(&path.path),
                escape_html(&path.capabilities.join(", "))
            ));
        }
    }

    text.push_str("\n⏳ Awaiting approval...");
    text
}

pub(super) fn resolved(notice: &ApprovalNotice, resolution: Resolution, at: DateTime<Utc>) -> String {
    let (headline, time_label) = match resolution {
        Resolution::Approved => ("✅ <b>Approved</b>", "Approved at"),
        Resolution::Denied => ("❌ <b>Denied</b>", "Denied at"),
    };

    format!(
        "{headline} [{id}]\n\n<b>Resource:</b> {resource}\n<b>{time_label}:</b> {time}",
        id = escape_html(notice.request_id.as_str()),
        resource = escape_html(&notice.resource),
        time = at.format("%H:%M:%S"),
    )
}

pub(super) fn timed_out(notice: &ApprovalNotice) -> String {
    format!(
        "⏰ <b>Expired</b> [{id}]\n\n<b>Resource:</b> {resource}\n<b>Reason:</b> Request timed out",
        id = escape_html(notice.request_id.as_str()),
        resource = escape_html(&notice.resource),
    )
}

pub(super) fn failed(notice: &ApprovalNotice, message: &str) -> String {
    format!(
        "⚠️ <b>Error</b> [{id}]\n\n<b>Resource:</b> {resource}\n<b>Error:</b> {message}",
        id = escape_html(notice.request_id.as_str()),
        resource = escape_html(&notice.resource),
        message = escape_html(message),
    )
}
