// SPDX-License-Identifier: MIT OR Apache-2.0
use jct_core::{CAP_SUBMISSION, CAP_VACATION};
use jct_runtime::{RunContext, SkipDecision};

/// Run only when the session exposes a second mail account.
pub fn needs_cross_account(ctx: &RunContext) -> SkipDecision {
    SkipDecision::run_if(
        ctx.cross_account_id.is_some(),
        "No cross-account access available",
    )
}

/// Run only when the server advertises submission.
pub fn needs_submission(ctx: &RunContext) -> SkipDecision {
    SkipDecision::run_if(
        ctx.has_capability(CAP_SUBMISSION),
        "Server does not support submission capability",
    )
}

/// Run only when seeding discovered at least one identity.
pub fn needs_identity(ctx: &RunContext) -> SkipDecision {
    match needs_submission(ctx) {
        SkipDecision::Run => {
            SkipDecision::run_if(!ctx.identity_ids.is_empty(), "No identities available")
        }
        skip => skip,
    }
}

/// Run only when the server advertises vacation responses.
pub fn needs_vacation(ctx: &RunContext) -> SkipDecision {
    SkipDecision::run_if(
        ctx.has_capability(CAP_VACATION),
        "Server does not support vacationresponse",
    )
}

/// Run only when the session names an event source endpoint.
pub fn needs_event_source(ctx: &RunContext) -> SkipDecision {
    SkipDecision::run_if(
        !ctx.session.event_source_url.is_empty(),
        "Session has no eventSourceUrl",
    )
}

/// Run only when a second user's client is configured.
pub fn needs_secondary(ctx: &RunContext) -> SkipDecision {
    SkipDecision::run_if(
        ctx.secondary.is_some() && ctx.secondary_email.is_some(),
        "No secondary account configured",
    )
}

/// Run only when a message can be sent from an identity to the secondary
/// user.
pub fn needs_recipient(ctx: &RunContext) -> SkipDecision {
    match needs_identity(ctx) {
        SkipDecision::Run => needs_secondary(ctx),
        skip => skip,
    }
}

/// Run only when a relay channel is open.
pub fn needs_relay(ctx: &RunContext) -> SkipDecision {
    SkipDecision::run_if(ctx.relay.is_some(), "No push relay channel available")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jct_config::HarnessConfig;
    use jct_mock::MockAccount;
    use std::sync::Arc;

    fn ctx(mock: MockAccount) -> RunContext {
        RunContext::new(Arc::new(mock), HarnessConfig::default())
    }

    #[test]
    fn capability_predicates_follow_session() {
        let plain = ctx(MockAccount::new());
        assert!(matches!(needs_submission(&plain), SkipDecision::Skip(_)));
        assert!(matches!(needs_vacation(&plain), SkipDecision::Skip(_)));

        let rich = ctx(MockAccount::new().with_submission().with_vacation());
        assert_eq!(needs_submission(&rich), SkipDecision::Run);
        assert_eq!(needs_vacation(&rich), SkipDecision::Run);
    }

    #[test]
    fn identity_predicate_reports_capability_first() {
        let plain = ctx(MockAccount::new());
        assert_eq!(
            needs_identity(&plain),
            SkipDecision::skip("Server does not support submission capability")
        );
        let mut rich = ctx(MockAccount::new().with_submission());
        assert_eq!(needs_identity(&rich), SkipDecision::skip("No identities available"));
        rich.identity_ids.push("I1".into());
        assert_eq!(needs_identity(&rich), SkipDecision::Run);
    }

    #[test]
    fn relay_and_cross_account_default_to_skip() {
        let plain = ctx(MockAccount::new());
        assert!(matches!(needs_relay(&plain), SkipDecision::Skip(_)));
        assert!(matches!(needs_cross_account(&plain), SkipDecision::Skip(_)));
        assert!(matches!(needs_secondary(&plain), SkipDecision::Skip(_)));
    }

    #[test]
    fn event_source_follows_session_url() {
        let mut with_url = ctx(MockAccount::new());
        assert_eq!(needs_event_source(&with_url), SkipDecision::Run);
        with_url.session.event_source_url.clear();
        assert_eq!(
            needs_event_source(&with_url),
            SkipDecision::skip("Session has no eventSourceUrl")
        );
    }

    #[test]
    fn secondary_needs_client_and_address() {
        let mut two = ctx(MockAccount::new()).with_secondary(Arc::new(MockAccount::named("bob", "A2")));
        two.secondary_email = None;
        assert!(matches!(needs_secondary(&two), SkipDecision::Skip(_)));
        two.secondary_email = Some("user2@example.com".into());
        assert_eq!(needs_secondary(&two), SkipDecision::Run);
    }

    #[test]
    fn recipient_needs_identity_then_secondary() {
        let mut rich = ctx(MockAccount::new().with_submission());
        rich.identity_ids.push("I1".into());
        assert_eq!(needs_recipient(&rich), SkipDecision::skip("No secondary account configured"));
        let mut ready = rich.with_secondary(Arc::new(MockAccount::named("bob", "A2")));
        ready.secondary_email = Some("bob@example.com".into());
        assert_eq!(needs_recipient(&ready), SkipDecision::Run);
    }
}
