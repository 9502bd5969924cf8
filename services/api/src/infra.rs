use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use edutravel::identity::UserId;
use edutravel::workflows::eligibility::{
    AcademicProfile, AcademicRecord, AcademicRepository, Document, EducationHistoryEntry,
    EducationLevel, EligibilityResult, EligibilityStore, Program, ProgramCatalog, ProgramId,
    ProgramRequirements, RepositoryError, TestRequirement, TestScore, TestType,
};
use edutravel::workflows::payments::{
    CommitOutcome, GatewayAuthorization, GatewayError, GatewayVerification,
    InitializeTransaction, NotificationError, NotificationKind, NotificationPublisher, Order,
    OrderId, OrderRepository, OrderStatus, PaymentGateway, PaymentStatus, PaystackGateway,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAcademicRepository {
    records: Arc<Mutex<HashMap<UserId, AcademicRecord>>>,
}

impl InMemoryAcademicRepository {
    fn with_record<T>(
        &self,
        user_id: &UserId,
        apply: impl FnOnce(&mut AcademicRecord) -> T,
    ) -> Result<T, RepositoryError> {
        let mut guard = self.records.lock().expect("academic mutex poisoned");
        let record = guard.get_mut(user_id).ok_or(RepositoryError::NotFound)?;
        Ok(apply(record))
    }
}

impl AcademicRepository for InMemoryAcademicRepository {
    fn load_record(&self, user_id: &UserId) -> Result<Option<AcademicRecord>, RepositoryError> {
        let guard = self.records.lock().expect("academic mutex poisoned");
        Ok(guard.get(user_id).cloned())
    }

    fn fetch_profile(&self, user_id: &UserId) -> Result<Option<AcademicProfile>, RepositoryError> {
        let guard = self.records.lock().expect("academic mutex poisoned");
        Ok(guard.get(user_id).map(|record| record.profile.clone()))
    }

    fn save_profile(&self, profile: AcademicProfile) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("academic mutex poisoned");
        match guard.get_mut(&profile.user_id) {
            Some(record) => record.profile = profile,
            None => {
                guard.insert(
                    profile.user_id.clone(),
                    AcademicRecord {
                        profile,
                        education_history: Vec::new(),
                        test_scores: Vec::new(),
                        documents: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    fn insert_education_entry(
        &self,
        user_id: &UserId,
        entry: EducationHistoryEntry,
    ) -> Result<(), RepositoryError> {
        self.with_record(user_id, |record| record.education_history.push(entry))
    }

    fn delete_education_entry(
        &self,
        user_id: &UserId,
        entry_id: &str,
    ) -> Result<bool, RepositoryError> {
        self.with_record(user_id, |record| {
            let before = record.education_history.len();
            record.education_history.retain(|entry| entry.id != entry_id);
            record.education_history.len() != before
        })
        .or_else(|err| match err {
            RepositoryError::NotFound => Ok(false),
            other => Err(other),
        })
    }

    fn insert_test_score(&self, user_id: &UserId, score: TestScore) -> Result<(), RepositoryError> {
        self.with_record(user_id, |record| record.test_scores.push(score))
    }

    fn delete_test_score(&self, user_id: &UserId, score_id: &str) -> Result<bool, RepositoryError> {
        self.with_record(user_id, |record| {
            let before = record.test_scores.len();
            record.test_scores.retain(|score| score.id != score_id);
            record.test_scores.len() != before
        })
        .or_else(|err| match err {
            RepositoryError::NotFound => Ok(false),
            other => Err(other),
        })
    }

    fn insert_document(&self, user_id: &UserId, document: Document) -> Result<(), RepositoryError> {
        self.with_record(user_id, |record| record.documents.push(document))
    }

    fn set_document_verified(
        &self,
        user_id: &UserId,
        document_id: &str,
        verified: bool,
    ) -> Result<bool, RepositoryError> {
        self.with_record(user_id, |record| {
            match record
                .documents
                .iter_mut()
                .find(|document| document.id == document_id)
            {
                Some(document) => {
                    document.verified = verified;
                    true
                }
                None => false,
            }
        })
        .or_else(|err| match err {
            RepositoryError::NotFound => Ok(false),
            other => Err(other),
        })
    }
}

#[derive(Clone)]
pub(crate) struct InMemoryProgramCatalog {
    programs: Arc<Vec<Program>>,
}

impl InMemoryProgramCatalog {
    pub(crate) fn new(programs: Vec<Program>) -> Self {
        Self {
            programs: Arc::new(programs),
        }
    }
}

impl ProgramCatalog for InMemoryProgramCatalog {
    fn active_programs(&self) -> Result<Vec<Program>, RepositoryError> {
        Ok(self
            .programs
            .iter()
            .filter(|program| program.active)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryEligibilityStore {
    rows: Arc<Mutex<BTreeMap<(UserId, ProgramId), EligibilityResult>>>,
}

impl EligibilityStore for InMemoryEligibilityStore {
    fn upsert(&self, result: EligibilityResult) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("eligibility mutex poisoned");
        guard.insert((result.user_id.clone(), result.program_id.clone()), result);
        Ok(())
    }

    fn prune(&self, user_id: &UserId, keep: &[ProgramId]) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("eligibility mutex poisoned");
        guard.retain(|(owner, program_id), _| owner != user_id || keep.contains(program_id));
        Ok(())
    }

    fn results_for(&self, user_id: &UserId) -> Result<Vec<EligibilityResult>, RepositoryError> {
        let guard = self.rows.lock().expect("eligibility mutex poisoned");
        Ok(guard
            .values()
            .filter(|result| &result.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Orders keyed by id. Check-and-set transitions run under one guard.
#[derive(Default, Clone)]
pub(crate) struct InMemoryOrderRepository {
    orders: Arc<Mutex<HashMap<OrderId, Order>>>,
}

impl OrderRepository for InMemoryOrderRepository {
    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let guard = self.orders.lock().expect("order mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, RepositoryError> {
        let guard = self.orders.lock().expect("order mutex poisoned");
        Ok(guard
            .values()
            .find(|order| order.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        let mut guard = self.orders.lock().expect("order mutex poisoned");
        if guard.contains_key(&order.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    fn attach_reference(&self, id: &OrderId, reference: &str) -> Result<Order, RepositoryError> {
        let mut guard = self.orders.lock().expect("order mutex poisoned");
        let order = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !order.is_open() {
            return Err(RepositoryError::Conflict);
        }
        order.payment_reference = Some(reference.to_string());
        Ok(order.clone())
    }

    fn commit_payment(
        &self,
        id: &OrderId,
        reference: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut guard = self.orders.lock().expect("order mutex poisoned");
        let settled_elsewhere = guard.values().any(|other| {
            &other.id != id
                && other.payment_status == PaymentStatus::Paid
                && other.payment_reference.as_deref() == Some(reference)
        });
        let order = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if order.payment_status == PaymentStatus::Paid {
            return Ok(CommitOutcome::AlreadyPaid(order.clone()));
        }
        if order.status != OrderStatus::Pending || settled_elsewhere {
            return Err(RepositoryError::Conflict);
        }

        order.payment_status = PaymentStatus::Paid;
        order.status = OrderStatus::Confirmed;
        order.confirmed_at = Some(confirmed_at);
        order.payment_reference = Some(reference.to_string());
        Ok(CommitOutcome::Committed(order.clone()))
    }

    fn cancel(&self, id: &OrderId) -> Result<Order, RepositoryError> {
        let mut guard = self.orders.lock().expect("order mutex poisoned");
        let order = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !order.is_open() {
            return Err(RepositoryError::Conflict);
        }
        order.status = OrderStatus::Cancelled;
        Ok(order.clone())
    }
}

/// Notification sink that records deliveries and mirrors them to the log.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    deliveries: Arc<Mutex<Vec<String>>>,
}

impl LoggingNotifier {
    pub(crate) fn deliveries(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .expect("notifier mutex poisoned")
            .clone()
    }
}

impl NotificationPublisher for LoggingNotifier {
    fn notify_user(
        &self,
        user_id: &UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        info!(user_id = %user_id, ?kind, %payload, "user notification queued");
        self.deliveries
            .lock()
            .expect("notifier mutex poisoned")
            .push(format!("user {user_id}: {kind:?}"));
        Ok(())
    }

    fn notify_admins(
        &self,
        title: &str,
        message: &str,
        link: &str,
    ) -> Result<(), NotificationError> {
        info!(title, message, link, "admin notification queued");
        self.deliveries
            .lock()
            .expect("notifier mutex poisoned")
            .push(format!("admins: {title}"));
        Ok(())
    }
}

/// Gateway chosen at startup: Paystack when a secret is configured, otherwise disabled.
pub(crate) enum ConfiguredGateway {
    Paystack(PaystackGateway),
    Disabled,
}

#[async_trait]
impl PaymentGateway for ConfiguredGateway {
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<GatewayVerification, GatewayError> {
        match self {
            ConfiguredGateway::Paystack(gateway) => gateway.verify_transaction(reference).await,
            ConfiguredGateway::Disabled => {
                warn!(reference, "payment verification requested but gateway is disabled");
                Err(GatewayError::NotConfigured)
            }
        }
    }

    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<GatewayAuthorization, GatewayError> {
        match self {
            ConfiguredGateway::Paystack(gateway) => gateway.initialize_transaction(request).await,
            ConfiguredGateway::Disabled => Err(GatewayError::NotConfigured),
        }
    }
}

const SIMULATED_PREFIX: &str = "sim-";

/// Offline gateway for the CLI demo: every reference settles for a fixed amount and echoes
/// the order its checkout was opened for.
pub(crate) struct SimulatedGateway {
    settled_minor_units: i64,
    currency: String,
}

impl SimulatedGateway {
    pub(crate) fn settling(settled_minor_units: i64, currency: impl Into<String>) -> Self {
        Self {
            settled_minor_units,
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<GatewayVerification, GatewayError> {
        Ok(GatewayVerification {
            success: true,
            status: "success".to_string(),
            amount_minor_units: self.settled_minor_units,
            currency: Some(self.currency.clone()),
            order_id: reference.strip_prefix(SIMULATED_PREFIX).map(OrderId::new),
        })
    }

    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let reference = format!("{SIMULATED_PREFIX}{}", request.metadata.order_id);
        Ok(GatewayAuthorization {
            authorization_url: format!("https://checkout.invalid/{reference}"),
            reference,
        })
    }
}

/// Program catalog served until an admin-managed catalog is wired in.
pub(crate) fn default_programs() -> Vec<Program> {
    vec![
        Program {
            id: ProgramId("msc-computer-science-toronto".to_string()),
            name: "MSc Computer Science (Toronto)".to_string(),
            active: true,
            requirements: ProgramRequirements {
                minimum_education_level: Some(EducationLevel::Undergraduate),
                test_requirements: vec![TestRequirement {
                    test_type: TestType::Ielts,
                    minimum_score: Some(6.5),
                    required: true,
                }],
                fields_of_study: vec!["computer".to_string(), "software".to_string()],
                countries: vec!["Canada".to_string()],
            },
        },
        Program {
            id: ProgramId("mba-london".to_string()),
            name: "MBA (London)".to_string(),
            active: true,
            requirements: ProgramRequirements {
                minimum_education_level: Some(EducationLevel::Undergraduate),
                test_requirements: vec![
                    TestRequirement {
                        test_type: TestType::Gmat,
                        minimum_score: Some(550.0),
                        required: true,
                    },
                    TestRequirement {
                        test_type: TestType::Ielts,
                        minimum_score: Some(7.0),
                        required: false,
                    },
                ],
                fields_of_study: Vec::new(),
                countries: vec!["United Kingdom".to_string()],
            },
        },
        Program {
            id: ProgramId("foundation-engineering-kl".to_string()),
            name: "Foundation in Engineering (Kuala Lumpur)".to_string(),
            active: true,
            requirements: ProgramRequirements {
                minimum_education_level: Some(EducationLevel::HighSchool),
                test_requirements: vec![TestRequirement {
                    test_type: TestType::Ielts,
                    minimum_score: None,
                    required: false,
                }],
                fields_of_study: vec!["engineering".to_string(), "science".to_string()],
                countries: vec!["Malaysia".to_string()],
            },
        },
    ]
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
