//! Shared fixtures for app integration tests.

use std::sync::Arc;

use ecomops_api::{ApiClient, RetryPolicy, ScriptedTransport};
use ecomops_app::{AppServices, PollPolicy, ProgressPoller, RecordingSleeper};
use ecomops_auth::{AuthClient, MemoryTokenStore, SyntheticAuthProvider, persist_session};

/// Account registered with every fixture provider.
#[allow(dead_code)]
pub const EMAIL: &str = "ops@example.test";
/// Password of [`EMAIL`].
#[allow(dead_code)]
pub const PASSWORD: &str = "correct horse";
/// Backend base used by every fixture client.
pub const API_BASE: &str = "https://api.ecomops.test";

/// Synthetic provider, memory cache and scripted backend wired together.
pub struct Fixture {
    pub provider: Arc<SyntheticAuthProvider>,
    pub store: Arc<MemoryTokenStore>,
    pub transport: Arc<ScriptedTransport>,
}

impl Fixture {
    /// Registered account, nobody signed in.
    #[allow(dead_code)]
    pub fn signed_out() -> Self {
        Self {
            provider: Arc::new(SyntheticAuthProvider::with_account(EMAIL, PASSWORD)),
            store: Arc::new(MemoryTokenStore::new()),
            transport: Arc::new(ScriptedTransport::new()),
        }
    }

    /// Provider holds a live session whose tokens are also cached.
    #[allow(dead_code)]
    pub fn signed_in() -> Self {
        let fixture = Self::signed_out();
        let session = fixture
            .provider
            .issue_session(EMAIL)
            .expect("fixture session should issue");
        persist_session(fixture.store.as_ref(), &session).expect("fixture cache should write");
        fixture
    }

    /// Services over the fixture adapters.
    pub fn services(&self) -> AppServices {
        AppServices {
            auth: AuthClient::new(self.provider.clone()),
            store: self.store.clone(),
            api: ApiClient::new(API_BASE, self.transport.clone())
                .expect("fixture api base should be valid"),
            reset_redirect: "https://ecomops.example.test/forgot-password.html".to_string(),
        }
    }
}

/// Poller with a small budget that records delays instead of sleeping.
#[allow(dead_code)]
pub fn fast_poller(max_polls: u32, sleeper: Arc<RecordingSleeper>) -> ProgressPoller {
    ProgressPoller::new(
        PollPolicy {
            interval_ms: 3_000,
            max_polls,
            retry: RetryPolicy {
                max_retries: 2,
                base_delay_ms: 100,
                max_delay_ms: 1_000,
                jitter_ms: 0,
            },
        },
        sleeper,
    )
}

/// Summary body with two channels.
#[allow(dead_code)]
pub const SUMMARY_BODY: &str = r#"{
    "shipped_orders": 12,
    "cancelled_orders": 2,
    "returned_orders": 1,
    "total_order_value": 45000.5,
    "total_paid": 40000,
    "total_charges": 1200,
    "total_outstanding": 3800.5,
    "by_website": {
        "amazon": {"orders": 9, "paid": 30000, "charges": 900, "order_value": 33000, "outstanding": 2100},
        "jiomart": {"orders": 3, "paid": 10000, "charges": 300, "order_value": 12000.5, "outstanding": 1700.5}
    }
}"#;

/// Upload list body with one processed record.
#[allow(dead_code)]
pub const UPLOADS_BODY: &str = r#"[
    {"id": 7, "website": "amazon", "report_type": "orders", "duration": "2024-01-01 to 2024-01-31",
     "file_url": "https://files.example.test/7.csv", "status": "completed"}
]"#;
