//! Shared harness for workflow integration tests: an in-memory SQLite
//! database with the real schema, plus a scriptable payment rail so tests
//! never touch the network.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use tourbook_api::{
    config::AppConfig,
    db,
    entities::tour,
    events::{event_channel, EventSender},
    models::PaymentMethod,
    rails::{
        PaymentHandle, PaymentRail, RailError, RailMetadata, RefundResult, VerificationResult,
    },
    services::payments::{PaymentWorkflow, WorkflowPolicy},
};

pub struct TestHarness {
    pub db: Arc<DatabaseConnection>,
    pub events: EventSender,
    _drain: tokio::task::JoinHandle<()>,
}

impl TestHarness {
    /// Fresh in-memory database with migrations applied. One connection so
    /// the in-memory database is shared across the whole test.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations");

        let (events, mut receiver) = event_channel(256);
        let drain = tokio::spawn(async move { while receiver.recv().await.is_some() {} });

        Self {
            db: Arc::new(pool),
            events,
            _drain: drain,
        }
    }

    /// Workflow wired with the given mock rails and fast test timings.
    pub fn workflow(&self, rails: Vec<Arc<MockRail>>) -> PaymentWorkflow {
        let mut map: HashMap<PaymentMethod, Arc<dyn PaymentRail>> = HashMap::new();
        for rail in rails {
            map.insert(rail.method(), rail);
        }
        let policy = WorkflowPolicy {
            retry_base_delay: std::time::Duration::from_millis(1),
            ..WorkflowPolicy::default()
        };
        PaymentWorkflow::new(self.db.clone(), self.events.clone(), policy, map)
    }

    /// Tour priced at 100 USD / 1.5 SOL / 0.0025 BTC / 0.05 ETH.
    pub async fn seed_tour(&self, capacity: Option<i32>) -> tour::Model {
        tour::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Walking tour of the old town".to_string()),
            description: Set(Some("Two hours on foot".to_string())),
            price: Set(dec!(100)),
            price_sol: Set(dec!(1.5)),
            price_btc: Set(dec!(0.0025)),
            price_eth: Set(dec!(0.05)),
            duration: Set(Some("2h".to_string())),
            location: Set(Some("Lisbon".to_string())),
            image_url: Set(None),
            capacity: Set(capacity),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed tour")
    }
}

/// Scriptable rail. Verification outcomes are popped from a queue; an empty
/// queue means "settled for exactly the expected amount".
pub struct MockRail {
    method: PaymentMethod,
    initiate_error: Mutex<Option<RailError>>,
    verify_script: Mutex<VecDeque<Result<VerificationResult, RailError>>>,
    pub initiate_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl MockRail {
    pub fn new(method: PaymentMethod) -> Arc<Self> {
        Arc::new(Self {
            method,
            initiate_error: Mutex::new(None),
            verify_script: Mutex::new(VecDeque::new()),
            initiate_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_initiate(&self, err: RailError) {
        *self.initiate_error.lock().unwrap() = Some(err);
    }

    pub fn push_verify(&self, result: Result<VerificationResult, RailError>) {
        self.verify_script.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl PaymentRail for MockRail {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(
        &self,
        _amount: Decimal,
        metadata: &RailMetadata,
    ) -> Result<PaymentHandle, RailError> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.initiate_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(if self.method.is_chain() {
            PaymentHandle::DepositAddress {
                address: format!("addr_{}", metadata.payment_id.simple()),
            }
        } else {
            PaymentHandle::CardIntent {
                intent_id: format!("pi_{}", metadata.payment_id.simple()),
                client_secret: "pi_secret_test".to_string(),
            }
        })
    }

    async fn verify(
        &self,
        _handle: &PaymentHandle,
        _external_ref: &str,
        expected_amount: Decimal,
    ) -> Result<VerificationResult, RailError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_script.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(VerificationResult::succeeded(expected_amount, Some(12))),
        }
    }

    async fn refund(
        &self,
        _external_ref: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult, RailError> {
        Ok(RefundResult {
            external_ref: (!self.method.is_chain()).then(|| "re_test".to_string()),
            amount: amount.unwrap_or(Decimal::ZERO),
            requires_manual_settlement: self.method.is_chain(),
        })
    }
}
