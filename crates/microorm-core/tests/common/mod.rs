use microorm_core::{
    Collection, Command, Component, ComponentMap, Configuration, Connection, Dialect, Entity,
    EntityMap, Reference, Result, Row, Session, SessionFactory, Value,
};
use microorm_core::{ColumnInfo, OrmError};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

// ===== Fixture entities =====

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Name {
    pub first: String,
    pub last: String,
}

impl Component for Name {
    fn map(map: &mut ComponentMap<Self>) {
        map.column("first", |n| &n.first, |n| &mut n.first)
            .column("last", |n| &n.last, |n| &mut n.last);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: i32,
    pub account_number: String,
    pub name: Name,
    pub transactions: Collection<AccountTransaction>,
}

impl Entity for Account {
    fn map(map: &mut EntityMap<Self>) {
        map.table("Account")
            .primary_key_as("id", "AccountId", |a| &a.id, |a| &mut a.id)
            .column_as("account_number", "AccountNumber", |a| &a.account_number, |a| &mut a.account_number)
            .component_with(
                "name",
                |a| &a.name,
                |a| &mut a.name,
                &[("first", "FirstName"), ("last", "LastName")],
            )
            .collection("transactions", |a| &a.transactions, |a| &mut a.transactions);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountTransaction {
    pub id: i32,
    pub amount: f64,
    pub memo: Option<String>,
    pub account: Reference<Account>,
}

impl Entity for AccountTransaction {
    fn map(map: &mut EntityMap<Self>) {
        map.table("AccountTransaction")
            .primary_key_as("id", "TransactionId", |t| &t.id, |t| &mut t.id)
            .column("amount", |t| &t.amount, |t| &mut t.amount)
            .column("memo", |t| &t.memo, |t| &mut t.memo)
            .reference("account", |t| &t.account, |t| &mut t.account);
    }
}

/// Read-only projection: no primary key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSummary {
    pub account_number: String,
    pub total: f64,
}

impl Entity for AccountSummary {
    fn map(map: &mut EntityMap<Self>) {
        map.table("Account")
            .column_as("account_number", "AccountNumber", |s| &s.account_number, |s| &mut s.account_number)
            .column("total", |s| &s.total, |s| &mut s.total);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Department {
    pub code: String,
    pub title: String,
}

impl Entity for Department {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key("code", |d| &d.code, |d| &mut d.code)
            .column("title", |d| &d.title, |d| &mut d.title);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub salary: f64,
    pub department: Reference<Department>,
}

impl Entity for Employee {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key("id", |e| &e.id, |e| &mut e.id)
            .column("name", |e| &e.name, |e| &mut e.name)
            .column("salary", |e| &e.salary, |e| &mut e.salary)
            .reference_as("department", "DepartmentCode", |e| &e.department, |e| &mut e.department);
    }
}

/// Malformed on purpose: the same property twice
#[derive(Debug, Default)]
pub struct Broken {
    pub id: i32,
}

impl Entity for Broken {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key("id", |b| &b.id, |b| &mut b.id)
            .column("id", |b| &b.id, |b| &mut b.id);
    }
}

// ===== Recording connection =====

/// Shared view of everything a [`RecordingConnection`] was asked to run
#[derive(Clone, Default)]
pub struct Recorder {
    commands: Rc<RefCell<Vec<Command>>>,
    results: Rc<RefCell<VecDeque<Vec<Row>>>>,
    next_identity: Rc<Cell<i64>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Self {
        let recorder = Self::default();
        recorder.next_identity.set(1);
        recorder
    }

    /// Rows returned by the next SELECT
    pub fn push_result(&self, rows: Vec<Row>) {
        self.results.borrow_mut().push_back(rows);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.borrow().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(|c| c.text().to_string())
            .collect()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.texts().iter().filter(|t| t.starts_with(prefix)).count()
    }

    pub fn last(&self) -> Option<Command> {
        self.commands.borrow().last().cloned()
    }

    pub fn connection(&self) -> Box<dyn Connection> {
        Box::new(RecordingConnection {
            recorder: self.clone(),
        })
    }

    fn record(&self, command: &Command) {
        self.commands.borrow_mut().push(command.clone());
    }
}

pub struct RecordingConnection {
    recorder: Recorder,
}

impl Connection for RecordingConnection {
    fn query(&self, command: &Command) -> Result<Vec<Row>> {
        self.recorder.record(command);
        if command.text().starts_with("SELECT") {
            return Ok(self.recorder.results.borrow_mut().pop_front().unwrap_or_default());
        }
        Ok(Vec::new())
    }

    fn query_scalar(&self, command: &Command) -> Result<Value> {
        self.recorder.record(command);
        let id = self.recorder.next_identity.get();
        self.recorder.next_identity.set(id + 1);
        Ok(Value::Int64(id))
    }

    fn execute(&self, command: &Command) -> Result<usize> {
        self.recorder.record(command);
        Ok(1)
    }

    fn begin(&self) -> Result<()> {
        self.recorder.record(&Command::new("BEGIN"));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.recorder.record(&Command::new("COMMIT"));
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.recorder.record(&Command::new("ROLLBACK"));
        Ok(())
    }
}

/// Statement strategy used by the core tests
#[derive(Default)]
pub struct TestDialect {
    pub procedures: BTreeMap<String, String>,
}

impl Dialect for TestDialect {
    fn name(&self) -> &str {
        "test"
    }

    fn create_connection(&self, _connection_string: &str) -> Result<Box<dyn Connection>> {
        Ok(Recorder::new().connection())
    }

    fn identity_statement(&self, primary_key: &ColumnInfo) -> Option<String> {
        primary_key
            .is_generated()
            .then(|| format!(" RETURNING [{}]", primary_key.column()))
    }

    fn procedure_statement(&self, name: &str) -> Result<String> {
        self.procedures
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownProcedure {
                name: name.to_string(),
            })
    }
}

// ===== Helpers =====

#[allow(dead_code)]
pub fn row(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[allow(dead_code)]
pub fn account_row(id: i32, number: &str, first: &str, last: &str) -> Row {
    row(&[
        ("AccountId", Value::Int64(i64::from(id))),
        ("AccountNumber", Value::from(number)),
        ("FirstName", Value::from(first)),
        ("LastName", Value::from(last)),
    ])
}

#[allow(dead_code)]
pub fn transaction_row(id: i32, amount: f64, account_id: i32) -> Row {
    row(&[
        ("TransactionId", Value::Int64(i64::from(id))),
        ("amount", Value::Double(amount)),
        ("memo", Value::Null),
        ("AccountId", Value::Int64(i64::from(account_id))),
    ])
}

#[allow(dead_code)]
pub fn factory_with(configuration: Configuration) -> SessionFactory {
    let dialect = TestDialect {
        procedures: BTreeMap::from([(
            "accounts_by_number".to_string(),
            "SELECT * FROM [Account] WHERE [AccountNumber] = @number".to_string(),
        )]),
    };
    SessionFactory::builder(configuration, Arc::new(dialect))
        .register::<Account>()
        .register::<AccountTransaction>()
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub fn factory() -> SessionFactory {
    factory_with(Configuration::default())
}

/// A session over a fresh recording connection
#[allow(dead_code)]
pub fn recorded_session(factory: &SessionFactory) -> (Session, Recorder) {
    let recorder = Recorder::new();
    let session = factory.open_session_on(recorder.connection());
    (session, recorder)
}
