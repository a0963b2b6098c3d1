//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on IAM operations.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use iamsys_iam::{BootstrapOptions, Credential, IamSys, testutil::test_config};
use iamsys_storage::testutil::object_config_store;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

fn has(recorded: &[String], name: &str) -> bool {
    recorded.iter().any(|s| s == name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_bootstrap_creates_manager_and_store_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let (store, _) = object_config_store();
    let iam = IamSys::new(store, test_config(), BootstrapOptions::default());
    iam.init().await.expect("init should succeed");

    let recorded = spans.lock().expect("lock poisoned").clone();
    for name in ["init", "load", "bootstrap", "save", "get", "put"] {
        assert!(has(&recorded, name), "expected a '{name}' span, got: {recorded:?}");
    }
    iam.shutdown().await;
}

#[tokio::test]
async fn set_user_creates_nested_credential_span() {
    let (store, _) = object_config_store();
    let iam = IamSys::new(store, test_config(), BootstrapOptions::default());
    iam.init().await.expect("init should succeed");

    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    iam.set_user("AKSPAN", Credential::new("AKSPAN", "secret")).await.expect("set_user");

    let recorded = spans.lock().expect("lock poisoned").clone();
    assert!(has(&recorded, "set_user"), "expected a 'set_user' span, got: {recorded:?}");
    assert!(has(&recorded, "set"), "expected the credential store 'set' span, got: {recorded:?}");
    iam.shutdown().await;
}
