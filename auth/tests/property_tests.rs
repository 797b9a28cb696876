//! Property tests for identity attribute handling, output escaping, the
//! signed handshake state and device isolation.

use chrono::Duration;
use proptest::collection::btree_map;
use proptest::prelude::*;
use relay_auth::{
    mocks::{MockClock, MockResourceStore},
    relay::state_token::StateSigner,
    utils::{derive_uid, escape_html, normalize_email, script_safe_json, squish},
    AllowList, AuthEnvironment, HandshakeContext, HashCost, RelayConfig, ResourceRegistry,
    ResourceStore, TokenConfig,
};
use std::sync::Arc;

proptest! {
    #[test]
    fn normalize_email_is_idempotent(email in "[ A-Za-z0-9@._+-]{0,40}") {
        let once = normalize_email(&email);
        prop_assert_eq!(normalize_email(&once), once);
    }

    #[test]
    fn squish_leaves_single_inner_spaces(value in "[ \\ta-z]{0,40}") {
        let squished = squish(&value);

        prop_assert!(!squished.contains("  "));
        prop_assert!(!squished.contains('\t'));
        prop_assert_eq!(squished.trim(), squished.as_str());
        prop_assert_eq!(squish(&squished), squished.clone());
    }

    #[test]
    fn derive_uid_strips_configured_prefix(id in "[A-Za-z0-9_-]{1,24}") {
        let prefixes = vec!["https://openid.intuit.com/".to_string()];

        prop_assert_eq!(derive_uid(&format!("https://openid.intuit.com/{id}"), &prefixes), id.clone());
        prop_assert_eq!(derive_uid(&id, &prefixes), id);
    }

    #[test]
    fn escape_html_leaves_no_markup(text in "\\PC{0,60}") {
        let escaped = escape_html(&text);

        for c in ['<', '>', '"', '\''] {
            prop_assert!(!escaped.contains(c));
        }
    }

    #[test]
    fn script_safe_json_preserves_value(text in "\\PC{0,60}") {
        let value = serde_json::json!({ "message": text });
        let embedded = script_safe_json(&value);

        prop_assert!(!embedded.contains('<'));
        let parsed: serde_json::Value = serde_json::from_str(&embedded).unwrap();
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn allow_list_filter_only_keeps_permitted(
        params in btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..8),
    ) {
        let allow = AllowList::new(["nickname", "locale"]);
        let filtered = allow.filter(&params);

        for (key, value) in &filtered {
            prop_assert!(allow.permits(key));
            prop_assert_eq!(params.get(key), Some(value));
        }
        for key in params.keys().filter(|key| allow.permits(key)) {
            prop_assert!(filtered.contains_key(key));
        }
    }

    #[test]
    fn state_round_trips_any_context(
        origin in "https://[a-z]{1,12}\\.example\\.com",
        config in proptest::option::of("[a-z]{1,10}"),
        params in btree_map("[a-z]{1,8}", "\\PC{0,16}", 0..4),
    ) {
        let signer = StateSigner::new(b"prop-secret", Duration::minutes(10), Arc::new(MockClock::default())).unwrap();
        let mut context = HandshakeContext::new("User").with_origin_url(origin);
        if let Some(config) = config {
            context = context.with_config_name(config);
        }
        for (key, value) in params {
            context = context.with_param(key, value);
        }

        let token = signer.seal("acme", context.clone()).unwrap();
        let claims = signer.open(&token).unwrap();

        prop_assert_eq!(claims.context, context);
        prop_assert_eq!(claims.provider, "acme");
    }

    #[test]
    fn state_rejects_other_secret(provider in "[a-z]{1,10}") {
        let clock = Arc::new(MockClock::default());
        let signer = StateSigner::new(b"prop-secret", Duration::minutes(10), clock.clone()).unwrap();
        let other = StateSigner::new(b"other-secret", Duration::minutes(10), clock).unwrap();

        let token = signer.seal(&provider, HandshakeContext::new("User")).unwrap();

        prop_assert!(other.open(&token).is_err());
    }
}

fn sign_in_env() -> AuthEnvironment<MockResourceStore> {
    AuthEnvironment::new(
        MockResourceStore::new(),
        ResourceRegistry::default(),
        &TokenConfig::new(Duration::hours(1)).with_hash_cost(HashCost::minimal()),
        RelayConfig::new(b"prop-secret".to_vec()),
        Arc::new(MockClock::default()),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn verifying_one_device_leaves_others_untouched(devices in 1usize..5, pick in 0usize..5) {
        let pick = pick % devices;

        tokio_test::block_on(async {
            let env = sign_in_env();
            env.credentials.register("User", "p@example.com", "pw").await.unwrap();

            let mut sessions = Vec::new();
            for _ in 0..devices {
                sessions.push(env.credentials.sign_in("User", "p@example.com", "pw").await.unwrap().1);
            }
            let before = env.store.find_by_email("User", "p@example.com").await.unwrap().unwrap();

            let chosen = &sessions[pick];
            let verification = env
                .verifier
                .verify("User", &chosen.uid, &chosen.client_id, &chosen.auth_token)
                .await
                .unwrap();
            assert!(verification.is_authenticated());

            let after = env.store.find_by_email("User", "p@example.com").await.unwrap().unwrap();
            assert_eq!(after.tokens.len(), devices);
            for (i, session) in sessions.iter().enumerate().filter(|(i, _)| *i != pick) {
                assert_eq!(
                    after.tokens.get(&session.client_id),
                    before.tokens.get(&session.client_id),
                    "device {i} changed"
                );
            }
            assert_ne!(
                after.tokens.get(&chosen.client_id),
                before.tokens.get(&chosen.client_id)
            );
        });
    }
}
