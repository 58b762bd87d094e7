#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::mock;
use rust_decimal::Decimal;
use uuid::Uuid;

use meal_checkout::{
    config::AppConfig,
    entities::Order,
    events::{self, EventSender},
    gateway::{
        GatewayCallback, GatewayError, GatewayNotification, PaymentGateway, PaymentWidget,
        SessionGrant, SessionRequest, SessionToken, TransactionResult, WidgetRuntime,
    },
    models::{Child, CustomerDetails, Guardian, MenuItem},
    notifications::RecordingNotifier,
    repositories::{InMemoryChildDirectory, InMemoryOrderStore},
    services::{CheckoutServices, CheckoutSession, ReconcileOutcome},
    AppState,
};

pub const SERVER_KEY: &str = "SB-Mid-server-test-key";
pub const CLIENT_KEY: &str = "SB-Mid-client-test-key";

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, GatewayError>;
    }
}

/// Gateway double that hands out sequential tokens and records every request.
#[derive(Default)]
pub struct StubGateway {
    calls: AtomicUsize,
    failures: AtomicUsize,
    requests: Mutex<Vec<SessionRequest>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` session requests are refused.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let pending_failures = self.failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failures.store(pending_failures - 1, Ordering::SeqCst);
            return Err(GatewayError::Transport("connection reset".to_string()));
        }

        Ok(SessionGrant {
            token: SessionToken::new(format!("snap-token-{}", n)),
            redirect_url: Some(format!("https://pay.test/{}", n)),
        })
    }
}

/// Gateway that answers only after `delay`.
pub struct SlowGateway {
    pub delay: Duration,
}

#[async_trait]
impl PaymentGateway for SlowGateway {
    async fn create_session(&self, _request: &SessionRequest) -> Result<SessionGrant, GatewayError> {
        tokio::time::sleep(self.delay).await;
        Ok(SessionGrant {
            token: SessionToken::new("late-token"),
            redirect_url: None,
        })
    }
}

/// Widget that plays back queued callbacks; the payer closes it once the
/// script runs out.
#[derive(Default)]
pub struct ScriptedWidget {
    script: Mutex<VecDeque<GatewayCallback>>,
    opened: Mutex<Vec<SessionToken>>,
}

impl ScriptedWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, callback: GatewayCallback) {
        self.script.lock().unwrap().push_back(callback);
    }

    pub fn opened(&self) -> Vec<SessionToken> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentWidget for ScriptedWidget {
    async fn open(&self, token: &SessionToken) -> GatewayCallback {
        self.opened.lock().unwrap().push(token.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(GatewayCallback::Closed)
    }
}

pub fn success() -> GatewayCallback {
    GatewayCallback::Success(TransactionResult {
        transaction_status: Some("settlement".into()),
        status_code: Some("200".into()),
        ..Default::default()
    })
}

pub fn pending() -> GatewayCallback {
    GatewayCallback::Pending(TransactionResult {
        transaction_status: Some("pending".into()),
        status_code: Some("201".into()),
        ..Default::default()
    })
}

pub fn error() -> GatewayCallback {
    GatewayCallback::Error(TransactionResult {
        status_message: Some("card declined".into()),
        ..Default::default()
    })
}

/// Gateway push for `order`, signed with the harness server key.
pub fn signed_notification(order: &Order, transaction_status: &str) -> GatewayNotification {
    let mut notification = GatewayNotification {
        order_id: order.gateway_order_id.clone(),
        status_code: "200".to_string(),
        gross_amount: format!("{:.2}", order.total_amount),
        signature_key: String::new(),
        transaction_status: transaction_status.to_string(),
        fraud_status: Some("accept".to_string()),
        transaction_id: Some("txn-settle".to_string()),
        payment_type: Some("bank_transfer".to_string()),
    };
    notification.signature_key = notification.expected_signature(SERVER_KEY);
    notification
}

pub fn menu_item(name: &str, price: Decimal) -> MenuItem {
    MenuItem {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price,
    }
}

pub fn delivery_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        0,
        "test".to_string(),
    );
    cfg.gateway_server_key = SERVER_KEY.to_string();
    cfg.gateway_client_key = CLIENT_KEY.to_string();
    cfg
}

/// In-memory wiring of every checkout collaborator for one guardian with
/// two children.
pub struct Harness {
    pub config: AppConfig,
    pub store: Arc<InMemoryOrderStore>,
    pub directory: Arc<InMemoryChildDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<StubGateway>,
    pub widget: Arc<ScriptedWidget>,
    pub widgets: Arc<WidgetRuntime>,
    pub event_sender: Arc<EventSender>,
    pub services: CheckoutServices,
    pub guardian: Guardian,
    pub ayu: Child,
    pub budi: Child,
}

impl Harness {
    pub fn new() -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryOrderStore::new());
        let directory = Arc::new(InMemoryChildDirectory::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let gateway = Arc::new(StubGateway::new());
        let widget = Arc::new(ScriptedWidget::new());
        let widgets = Arc::new(WidgetRuntime::loaded(widget.clone()));

        let (event_sender, rx) = EventSender::channel(1024);
        tokio::spawn(events::process_events(rx, Vec::new()));
        let event_sender = Arc::new(event_sender);

        let guardian = Guardian {
            id: Uuid::new_v4(),
            customer: CustomerDetails::new(
                Some("Sari Wijaya".to_string()),
                "sari@example.com",
                Some("081234567890".to_string()),
            ),
        };
        let ayu = Child {
            id: Uuid::new_v4(),
            name: "Ayu".to_string(),
            class_name: Some("3A".to_string()),
        };
        let budi = Child {
            id: Uuid::new_v4(),
            name: "Budi".to_string(),
            class_name: Some("5B".to_string()),
        };
        directory.insert(guardian.id, ayu.clone());
        directory.insert(guardian.id, budi.clone());

        let services = CheckoutServices::new(
            &config,
            store.clone(),
            directory.clone(),
            gateway.clone(),
            widgets.clone(),
            notifier.clone(),
            event_sender.clone(),
        );

        Self {
            config,
            store,
            directory,
            notifier,
            gateway,
            widget,
            widgets,
            event_sender,
            services,
            guardian,
            ayu,
            budi,
        }
    }

    /// Rebuilds the services around a different gateway.
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.services = CheckoutServices::new(
            &self.config,
            self.store.clone(),
            self.directory.clone(),
            gateway,
            self.widgets.clone(),
            self.notifier.clone(),
            self.event_sender.clone(),
        );
        self
    }

    pub fn session(&self) -> CheckoutSession {
        CheckoutSession::new(self.guardian.clone(), self.services.clone())
    }

    /// Delivers a signed `settlement` notification for `order`.
    pub async fn settle(&self, order: &Order) -> ReconcileOutcome {
        self.services
            .reconciler
            .apply_notification(&signed_notification(order, "settlement"), SERVER_KEY)
            .await
            .unwrap()
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(Arc::new(self.config.clone()), None, &self.services)
    }
}
