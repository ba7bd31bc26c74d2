//! Propagation Executor Tests
//!
//! End-to-end runs of subjects through the manager and executor against
//! in-memory connectors:
//! - Creation, idempotent updates and renames
//! - Mandatory attributes on create and update
//! - Delete turned into update while the subject is still assigned
//! - Timeouts, trace levels and two-phase propagation
//! - Priority resources stopping a batch

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::operation::{
    AttributeSet, ConnectorObject, OperationOptions, Uid, NAME_ATTR, PASSWORD_ATTR,
};
use xavyo_connector::traits::{Connector, CreateOp, DeleteOp, FullConnector, GetOp, UpdateOp};
use xavyo_connector::types::{OperationType, PropagationMode};
use xavyo_propagation::prelude::*;
use xavyo_propagation::{
    ActionCriticality, ActionError, ActionResult, FailureKind, InMemorySubjectDirectory,
    InMemoryTaskStore, InMemoryVirAttrCache, PasswordPolicySpec, PlainAttr, PropagationActions,
    RecordingAuditSink, ReportedOutcome, User, MANDATORY_MISSING_ATTR,
};

// =============================================================================
// Mocks
// =============================================================================

/// What the mock connector does on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteBehavior {
    Succeed,
    TimeOut,
    Fail,
}

struct TestConnector {
    objects: Mutex<HashMap<String, ConnectorObject>>,
    behavior: Mutex<WriteBehavior>,
    last_update: Mutex<Option<AttributeSet>>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl TestConnector {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            behavior: Mutex::new(WriteBehavior::Succeed),
            last_update: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    fn with_behavior(self, behavior: WriteBehavior) -> Self {
        *self.behavior.lock().unwrap() = behavior;
        self
    }

    /// Seed a remote account.
    fn seed(&self, name: &str, attributes: AttributeSet) {
        self.objects.lock().unwrap().insert(
            name.to_string(),
            ConnectorObject::new("__ACCOUNT__", Uid::new("cn", name), name, attributes),
        );
    }

    fn object(&self, name: &str) -> Option<ConnectorObject> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    fn last_update(&self) -> Option<AttributeSet> {
        self.last_update.lock().unwrap().clone()
    }

    fn write_result(&self) -> ConnectorResult<()> {
        match *self.behavior.lock().unwrap() {
            WriteBehavior::Succeed => Ok(()),
            WriteBehavior::TimeOut => Err(ConnectorError::Timeout { timeout_secs: 30 }),
            WriteBehavior::Fail => Err(ConnectorError::operation_failed("entry rejected")),
        }
    }

    fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

fn stored_attributes(attributes: &AttributeSet) -> AttributeSet {
    attributes
        .iter()
        .filter(|(name, _)| name.as_str() != NAME_ATTR && name.as_str() != PASSWORD_ATTR)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[async_trait]
impl Connector for TestConnector {
    fn display_name(&self) -> &str {
        "test"
    }
}

#[async_trait]
impl CreateOp for TestConnector {
    async fn create(
        &self,
        _mode: PropagationMode,
        object_class: &str,
        attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.write_result()?;
        let name = attributes.get_string(NAME_ATTR).unwrap_or_default().to_string();
        let uid = Uid::new("cn", name.clone());
        self.objects.lock().unwrap().insert(
            name.clone(),
            ConnectorObject::new(object_class, uid.clone(), name, stored_attributes(&attributes)),
        );
        Ok(uid)
    }
}

#[async_trait]
impl UpdateOp for TestConnector {
    async fn update(
        &self,
        _mode: PropagationMode,
        _object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_update.lock().unwrap() = Some(attributes.clone());
        self.write_result()?;
        let mut objects = self.objects.lock().unwrap();
        let mut object = objects
            .remove(uid.value())
            .ok_or_else(|| ConnectorError::not_found(uid.to_string()))?;
        for (name, value) in stored_attributes(&attributes).iter() {
            object.attributes.set(name.clone(), value.clone());
        }
        if let Some(name) = attributes.get_string(NAME_ATTR) {
            object.name = name.to_string();
            object.uid = Uid::new("cn", name);
        }
        let uid = object.uid.clone();
        objects.insert(object.name.clone(), object);
        Ok(uid)
    }
}

#[async_trait]
impl DeleteOp for TestConnector {
    async fn delete(
        &self,
        _mode: PropagationMode,
        _object_class: &str,
        uid: &Uid,
        _options: &OperationOptions,
    ) -> ConnectorResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.write_result()?;
        self.objects.lock().unwrap().remove(uid.value());
        Ok(())
    }
}

#[async_trait]
impl GetOp for TestConnector {
    async fn get(
        &self,
        _mode: PropagationMode,
        _operation: OperationType,
        _object_class: &str,
        uid: &Uid,
        _options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(uid.value()))
    }
}

/// Serves connectors by the resource's connector name.
#[derive(Default)]
struct TestConnectorProvider {
    connectors: HashMap<String, Arc<TestConnector>>,
}

impl TestConnectorProvider {
    fn with(mut self, connector_name: &str, connector: Arc<TestConnector>) -> Self {
        self.connectors.insert(connector_name.to_string(), connector);
        self
    }
}

#[async_trait]
impl ConnectorProvider for TestConnectorProvider {
    async fn get_connector(&self, resource: &ExternalResource) -> Option<Arc<dyn FullConnector>> {
        self.connectors
            .get(&resource.connector)
            .map(|c| Arc::clone(c) as Arc<dyn FullConnector>)
    }
}

struct VetoAction {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PropagationActions for VetoAction {
    fn name(&self) -> &str {
        "veto"
    }

    fn criticality(&self) -> ActionCriticality {
        ActionCriticality::Fatal
    }

    async fn before(
        &self,
        _task: &PropagationTask,
        _before: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ActionError::Rejected {
            reason: "change freeze".into(),
        })
    }
}

struct VetoFactory {
    calls: Arc<AtomicUsize>,
}

impl xavyo_propagation::PropagationActionsFactory for VetoFactory {
    fn create(&self, _resource: &ExternalResource) -> Vec<Box<dyn PropagationActions>> {
        vec![Box::new(VetoAction {
            calls: Arc::clone(&self.calls),
        })]
    }
}

// =============================================================================
// Fixtures
// =============================================================================

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

struct Harness {
    executor: PropagationExecutor,
    store: Arc<InMemoryTaskStore>,
    directory: Arc<InMemorySubjectDirectory>,
    audit: Arc<RecordingAuditSink>,
    notifications: Arc<RecordingAuditSink>,
}

fn harness(provider: TestConnectorProvider) -> Harness {
    init_test_logging();
    let store = Arc::new(InMemoryTaskStore::new());
    let directory = Arc::new(InMemorySubjectDirectory::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let notifications = Arc::new(RecordingAuditSink::new());
    let executor = PropagationExecutor::new(
        Arc::new(provider),
        store.clone(),
        directory.clone(),
        audit.clone(),
        notifications.clone(),
    );
    Harness {
        executor,
        store,
        directory,
        audit,
        notifications,
    }
}

fn ldap_resource(key: &str, connector: &str) -> ExternalResource {
    let mut resource = ExternalResource::new(key, connector);
    resource.user_mapping = Some(
        Mapping::new("__ACCOUNT__")
            .with_item(MappingItem::new("username", InternalKind::Username, "cn").as_account_id())
            .with_item(MappingItem::new("email", InternalKind::UserPlain, "mail")),
    );
    resource
}

fn jdoe(email: Option<&str>) -> Subject {
    let mut user = User::new("jdoe");
    if let Some(email) = email {
        user.attributes = user.attributes.with_plain(PlainAttr::string("email", email));
    }
    Subject::from(user)
}

fn manager() -> PropagationManager {
    PropagationManager::new(
        MappingResolver::default(),
        Arc::new(InMemoryVirAttrCache::new()),
    )
}

async fn task_for(
    subject: &Subject,
    resource: &ExternalResource,
    request: TaskRequest,
) -> PropagationTask {
    manager().create_task(subject, resource, &request).await.unwrap()
}

// =============================================================================
// Create and update
// =============================================================================

#[tokio::test]
async fn test_create_new_account() {
    let connector = Arc::new(TestConnector::new());
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "ldap-connector"),
        TaskRequest::create(),
    )
    .await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.creates(), 1);
    assert_eq!(connector.updates(), 0);
    // Read before and after the write.
    assert_eq!(connector.get_calls.load(Ordering::SeqCst), 2);
    let created = connector.object("jdoe").unwrap();
    assert_eq!(created.attributes.get_string("cn"), Some("jdoe"));
    assert_eq!(created.attributes.get_string("mail"), Some("jdoe@x.org"));

    let audited = h.audit.events();
    assert_eq!(audited.len(), 1);
    assert!(audited[0].before.is_none());
    assert_eq!(audited[0].after.as_ref().map(|o| o.name.as_str()), Some("jdoe"));
    assert_eq!(h.notifications.events().len(), 1);

    // Default trace level only keeps failures.
    assert!(h.store.executions(task.id()).is_empty());
    assert!(execution.id().is_none());
}

#[tokio::test]
async fn test_unchanged_account_is_not_touched() {
    let connector = Arc::new(TestConnector::new());
    connector.seed(
        "jdoe",
        AttributeSet::new().with("cn", "jdoe").with("mail", "jdoe@x.org"),
    );
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let resource = ldap_resource("ldap", "ldap-connector").with_trace_level(TraceLevel::All);
    let task = task_for(&jdoe(Some("jdoe@x.org")), &resource, TaskRequest::update()).await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.creates(), 0);
    assert_eq!(connector.updates(), 0);
    // Nothing was attempted, so nothing is registered even at full tracing.
    assert!(h.store.executions(task.id()).is_empty());
    assert_eq!(h.audit.events().len(), 1);
}

#[tokio::test]
async fn test_create_on_existing_account_updates_only_changes() {
    let connector = Arc::new(TestConnector::new());
    connector.seed(
        "jdoe",
        AttributeSet::new().with("cn", "jdoe").with("mail", "old@x.org"),
    );
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "ldap-connector"),
        TaskRequest::create(),
    )
    .await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.creates(), 0);
    assert_eq!(connector.updates(), 1);
    let sent = connector.last_update().unwrap();
    assert_eq!(sent.get_string("mail"), Some("jdoe@x.org"));
    assert!(!sent.has("cn"));
    assert!(!sent.has(NAME_ATTR));
}

#[tokio::test]
async fn test_rename_reads_old_account() {
    let connector = Arc::new(TestConnector::new());
    connector.seed(
        "john",
        AttributeSet::new().with("cn", "john").with("mail", "jdoe@x.org"),
    );
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "ldap-connector"),
        TaskRequest::update().with_old_account_id("john"),
    )
    .await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.updates(), 1);
    let sent = connector.last_update().unwrap();
    assert_eq!(sent.get_string(NAME_ATTR), Some("jdoe"));
    assert_eq!(sent.get_string("cn"), Some("jdoe"));
    assert!(connector.object("jdoe").is_some());
    assert!(connector.object("john").is_none());
}

// =============================================================================
// Mandatory attributes
// =============================================================================

fn mandatory_mail_resource() -> ExternalResource {
    let mut resource = ExternalResource::new("ldap", "ldap-connector");
    resource.user_mapping = Some(
        Mapping::new("__ACCOUNT__")
            .with_item(MappingItem::new("username", InternalKind::Username, "cn").as_account_id())
            .with_item(MappingItem::new("email", InternalKind::UserPlain, "mail").mandatory("true")),
    );
    resource
}

#[tokio::test]
async fn test_create_rejected_when_mandatory_attribute_missing() {
    let connector = Arc::new(TestConnector::new());
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(&jdoe(None), &mandatory_mail_resource(), TaskRequest::create()).await;

    let err = h.executor.execute(&task).await.unwrap_err();

    match err {
        PropagationError::Validation { attributes } => assert_eq!(attributes, vec!["mail"]),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(connector.creates(), 0);
    assert!(h.audit.events().is_empty());
}

#[tokio::test]
async fn test_update_proceeds_with_mandatory_attribute_missing() {
    let connector = Arc::new(TestConnector::new());
    connector.seed(
        "jdoe",
        AttributeSet::new().with("cn", "jdoe").with("mail", "old@x.org"),
    );
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(&jdoe(None), &mandatory_mail_resource(), TaskRequest::update()).await;
    assert!(task.attributes().has(MANDATORY_MISSING_ATTR));

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.updates(), 1);
    assert!(!connector.last_update().unwrap().has(MANDATORY_MISSING_ATTR));
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_becomes_update_while_still_assigned() {
    let connector = Arc::new(TestConnector::new());
    connector.seed(
        "jdoe",
        AttributeSet::new().with("cn", "jdoe").with("mail", "old@x.org"),
    );
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let subject = jdoe(Some("jdoe@x.org"));
    h.directory
        .assign(SubjectKind::User, subject.key(), vec!["ldap".to_string()]);

    let mut resource = ldap_resource("ldap", "ldap-connector");
    if let Some(mapping) = resource.user_mapping.take() {
        resource.user_mapping = Some(mapping.with_item(MappingItem::password_item()));
    }
    resource.random_password_if_not_provided = true;
    resource.password_policy = Some(PasswordPolicySpec {
        min_length: 10,
        ..Default::default()
    });
    let task = task_for(&subject, &resource, TaskRequest::delete()).await;
    assert!(!task.attributes().has(PASSWORD_ATTR));

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.deletes(), 0);
    assert_eq!(connector.updates(), 1);
    assert!(connector.object("jdoe").is_some());
    let sent = connector.last_update().unwrap();
    assert_eq!(sent.get_string("mail"), Some("jdoe@x.org"));
    assert!(!sent.has(PASSWORD_ATTR));
    assert!(!sent.has("cn"));
    assert_eq!(sent.len(), 1);
}

#[tokio::test]
async fn test_delete_removes_unassigned_account() {
    let connector = Arc::new(TestConnector::new());
    connector.seed("jdoe", AttributeSet::new().with("cn", "jdoe"));
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let subject = jdoe(Some("jdoe@x.org"));
    h.directory.assign(SubjectKind::User, subject.key(), Vec::new());
    let task = task_for(&subject, &ldap_resource("ldap", "ldap-connector"), TaskRequest::delete()).await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.deletes(), 1);
    assert!(connector.object("jdoe").is_none());
    assert!(h.audit.events()[0].after.is_none());
}

#[tokio::test]
async fn test_delete_of_absent_account_is_skipped() {
    let connector = Arc::new(TestConnector::new());
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let resource = ldap_resource("ldap", "ldap-connector").with_trace_level(TraceLevel::All);
    let task = task_for(&jdoe(None), &resource, TaskRequest::delete()).await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert_eq!(connector.deletes(), 0);
    assert!(h.store.executions(task.id()).is_empty());
}

// =============================================================================
// Failures and tracing
// =============================================================================

#[tokio::test]
async fn test_timeout_is_reported_apart() {
    let connector = Arc::new(TestConnector::new().with_behavior(WriteBehavior::TimeOut));
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "ldap-connector"),
        TaskRequest::create(),
    )
    .await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Failure);
    assert_eq!(execution.failure_kind(), Some(FailureKind::Timeout));
    assert!(execution.message().unwrap().starts_with("Remote timeout on ldap"));
    assert!(execution.diagnostic().unwrap().contains("REMOTE_TIMEOUT"));

    let stored = h.store.executions(task.id());
    assert_eq!(stored.len(), 1);
    assert_eq!(execution.id(), stored[0].id());
    assert!(h.store.task(task.id()).is_some());
}

#[tokio::test]
async fn test_remote_failure_is_not_a_timeout() {
    let connector = Arc::new(TestConnector::new().with_behavior(WriteBehavior::Fail));
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "ldap-connector"),
        TaskRequest::create(),
    )
    .await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Failure);
    assert_eq!(execution.failure_kind(), Some(FailureKind::Remote));
    assert!(execution.message().unwrap().contains("entry rejected"));
}

#[tokio::test]
async fn test_trace_level_controls_registration() {
    let connector = Arc::new(TestConnector::new());
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));

    let traced = ldap_resource("ldap", "ldap-connector").with_trace_level(TraceLevel::All);
    let task = task_for(&jdoe(Some("jdoe@x.org")), &traced, TaskRequest::create()).await;
    let execution = h.executor.execute(&task).await.unwrap();
    assert_eq!(execution.status(), ExecutionStatus::Success);
    assert!(execution.id().is_some());
    assert_eq!(h.store.executions(task.id()).len(), 1);

    let failing = Arc::new(TestConnector::new().with_behavior(WriteBehavior::Fail));
    let h = harness(TestConnectorProvider::default().with("ldap-connector", failing));
    let untraced = ldap_resource("ldap", "ldap-connector").with_trace_level(TraceLevel::None);
    let task = task_for(&jdoe(Some("jdoe@x.org")), &untraced, TaskRequest::create()).await;
    let execution = h.executor.execute(&task).await.unwrap();
    assert_eq!(execution.status(), ExecutionStatus::Failure);
    assert!(h.store.executions(task.id()).is_empty());
    assert_eq!(h.store.flush_count(), 0);
}

#[tokio::test]
async fn test_missing_connector_fails_execution() {
    let h = harness(TestConnectorProvider::default());
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "unknown-connector"),
        TaskRequest::create(),
    )
    .await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Failure);
    assert!(execution.message().unwrap().contains("Connector not found"));
    assert_eq!(h.audit.events().len(), 1);
}

#[tokio::test]
async fn test_fatal_action_blocks_connector() {
    let connector = Arc::new(TestConnector::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let executor = h.executor.with_actions_factory(Arc::new(VetoFactory {
        calls: calls.clone(),
    }));
    let task = task_for(
        &jdoe(Some("jdoe@x.org")),
        &ldap_resource("ldap", "ldap-connector"),
        TaskRequest::create(),
    )
    .await;

    let execution = executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Failure);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.creates(), 0);
}

// =============================================================================
// Two-phase propagation
// =============================================================================

#[tokio::test]
async fn test_two_phase_submission_and_report() {
    let connector = Arc::new(TestConnector::new());
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector.clone()));
    let mut resource = ldap_resource("ldap", "ldap-connector");
    resource.propagation_mode = PropagationMode::TwoPhases;
    let task = task_for(&jdoe(Some("jdoe@x.org")), &resource, TaskRequest::create()).await;

    let submitted = h.executor.execute(&task).await.unwrap();
    assert_eq!(submitted.status(), ExecutionStatus::Submitted);

    let confirmed = submitted
        .report(ExecutionStatus::Success, Some("applied by target".into()))
        .unwrap();
    assert_eq!(confirmed.status(), ExecutionStatus::Success);
    assert_eq!(confirmed.task_id(), task.id());
    assert!(confirmed.report(ExecutionStatus::Failure, None).is_err());
}

#[tokio::test]
async fn test_two_phase_failure_is_unsubmitted() {
    let connector = Arc::new(TestConnector::new().with_behavior(WriteBehavior::Fail));
    let h = harness(TestConnectorProvider::default().with("ldap-connector", connector));
    let mut resource = ldap_resource("ldap", "ldap-connector");
    resource.propagation_mode = PropagationMode::TwoPhases;
    let task = task_for(&jdoe(Some("jdoe@x.org")), &resource, TaskRequest::create()).await;

    let execution = h.executor.execute(&task).await.unwrap();

    assert_eq!(execution.status(), ExecutionStatus::Unsubmitted);
    assert_eq!(h.store.executions(task.id()).len(), 1);
}

// =============================================================================
// Batches
// =============================================================================

#[tokio::test]
async fn test_priority_failure_stops_batch() {
    let db = Arc::new(TestConnector::new().with_behavior(WriteBehavior::Fail));
    let ldap = Arc::new(TestConnector::new());
    let h = harness(
        TestConnectorProvider::default()
            .with("db-connector", db.clone())
            .with("ldap-connector", ldap.clone()),
    );
    let mut priority = ldap_resource("db", "db-connector");
    priority.propagation_priority = true;
    let subject = jdoe(Some("jdoe@x.org"));
    let tasks = vec![
        task_for(&subject, &priority, TaskRequest::create()).await,
        task_for(&subject, &ldap_resource("ldap", "ldap-connector"), TaskRequest::create()).await,
    ];

    let mut reporter = PropagationReporter::new();
    h.executor.execute_all(&tasks, &mut reporter).await;

    assert_eq!(db.creates(), 1);
    assert_eq!(ldap.creates(), 0);
    assert_eq!(
        reporter.status_of("db").unwrap().outcome,
        ReportedOutcome::Executed {
            status: ExecutionStatus::Failure
        }
    );
    assert_eq!(
        reporter.status_of("ldap").unwrap().outcome,
        ReportedOutcome::NotAttempted
    );
    assert!(reporter.has_failures());
}

#[tokio::test]
async fn test_non_priority_failure_continues_batch() {
    let db = Arc::new(TestConnector::new().with_behavior(WriteBehavior::Fail));
    let ldap = Arc::new(TestConnector::new());
    let h = harness(
        TestConnectorProvider::default()
            .with("db-connector", db.clone())
            .with("ldap-connector", ldap.clone()),
    );
    let subject = jdoe(Some("jdoe@x.org"));
    let tasks = vec![
        task_for(&subject, &ldap_resource("db", "db-connector"), TaskRequest::create()).await,
        task_for(&subject, &ldap_resource("ldap", "ldap-connector"), TaskRequest::create()).await,
    ];

    let mut reporter = PropagationReporter::new();
    h.executor.execute_all(&tasks, &mut reporter).await;

    assert_eq!(ldap.creates(), 1);
    assert_eq!(reporter.statuses().len(), 2);
    assert_eq!(
        reporter.status_of("ldap").unwrap().outcome,
        ReportedOutcome::Executed {
            status: ExecutionStatus::Success
        }
    );
}
