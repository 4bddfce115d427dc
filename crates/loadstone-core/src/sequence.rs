//! C6 Sequence Manager: ensures a cached `access_token` exists before a
//! dependent step runs, by executing an auth prelude at most once per VU
//! (§4.6).

use std::time::Duration;

use tracing::warn;

use crate::collection::RequestTemplate;
use crate::config::SuccessCriteria;
use crate::http::client::HttpClient;
use crate::http::executor::{self, ExecutionOutcome};
use crate::request_builder::build_request;
use crate::script::{self, ScriptContext};
use crate::variables::VariableStore;

/// The ordered auth prelude: by convention a JWT issuance step followed by
/// an access-token exchange step (§4.6).
pub struct AuthPrelude<'a> {
    pub steps: &'a [RequestTemplate],
}

/// Before dispatching `template`, ensure any auth prerequisite it needs is
/// satisfied. Runs the prelude once if `access_token` is missing from
/// `store`; prelude failure is logged but never aborts the VU (§4.6, §7) —
/// the dependent step proceeds and fails validation on its own.
///
/// Returns the prelude's own execution outcomes, for metrics recording,
/// if the prelude actually ran this call.
pub async fn ensure_prerequisites<'a>(
    template: &RequestTemplate,
    prelude: Option<&AuthPrelude<'a>>,
    client: &HttpClient,
    store: &mut VariableStore,
    timeout: Duration,
) -> Vec<ExecutionOutcome> {
    if !template.needs_auth_token() || store.get("access_token").is_some() {
        return Vec::new();
    }
    let Some(prelude) = prelude else {
        return Vec::new();
    };

    let mut outcomes = Vec::new();
    for step in prelude.steps {
        let resolved = build_request(step, store);
        let outcome = executor::execute(
            client,
            &resolved,
            &step.name,
            &SuccessCriteria::default(),
            timeout,
        )
        .await;

        if !outcome.is_success {
            warn!(step = %step.name, "auth prelude step failed, dependent step will proceed unauthenticated");
        }

        let mut ctx = ScriptContext {
            temp: std::collections::HashMap::new(),
            store,
            response_body: &outcome.body,
            request_body: "",
        };
        script::run(&step.post_script, &mut ctx);

        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{KeyValue, Method};

    fn token_step() -> RequestTemplate {
        let mut step = RequestTemplate::new("issue-token", Method::Post, "http://127.0.0.1:1/token");
        step.post_script = vec![
            r#"var tok = JSON.parse(responseBody).token"#.to_string(),
            r#"pm.collectionVariables.set("access_token", tok)"#.to_string(),
        ];
        step
    }

    fn dependent_step() -> RequestTemplate {
        let mut step = RequestTemplate::new("get-profile", Method::Get, "http://x/me");
        step.headers.push(KeyValue::new("Authorization", "Bearer {{access_token}}"));
        step
    }

    #[tokio::test]
    async fn no_prelude_run_when_step_does_not_need_auth() {
        let client = HttpClient::new();
        let mut store = VariableStore::new();
        let plain_step = RequestTemplate::new("ping", Method::Get, "http://x/ping");
        let prelude = AuthPrelude { steps: &[token_step()] };
        let outcomes = ensure_prerequisites(
            &plain_step,
            Some(&prelude),
            &client,
            &mut store,
            Duration::from_millis(100),
        )
        .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn no_prelude_run_when_token_already_cached() {
        let client = HttpClient::new();
        let mut store = VariableStore::new();
        store.set("access_token", "cached");
        let prelude = AuthPrelude { steps: &[token_step()] };
        let outcomes = ensure_prerequisites(
            &dependent_step(),
            Some(&prelude),
            &client,
            &mut store,
            Duration::from_millis(100),
        )
        .await;
        assert!(outcomes.is_empty());
        assert_eq!(store.get("access_token"), Some("cached"));
    }

    #[tokio::test]
    async fn missing_prelude_leaves_token_unset_without_panicking() {
        let client = HttpClient::new();
        let mut store = VariableStore::new();
        let outcomes =
            ensure_prerequisites(&dependent_step(), None, &client, &mut store, Duration::from_millis(100)).await;
        assert!(outcomes.is_empty());
        assert!(store.get("access_token").is_none());
    }

    #[tokio::test]
    async fn prelude_failure_does_not_abort_and_leaves_dependent_step_to_fail_naturally() {
        let client = HttpClient::new();
        let mut store = VariableStore::new();
        let prelude = AuthPrelude { steps: &[token_step()] };
        let outcomes = ensure_prerequisites(
            &dependent_step(),
            Some(&prelude),
            &client,
            &mut store,
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_success);
        assert!(store.get("access_token").is_none());
    }
}
