use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use microorm_core::{
    column_enum, Collection, Command, Component, ComponentMap, Configuration, Connection, Entity, EntityMap,
    Reference, Result, Row, Session, SessionFactory, Value,
};
use microorm_sqlite::SqliteConnection;
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;
use uuid::Uuid;

pub const SCHEMA: &str = r#"
CREATE TABLE [Branch] (
    [Code] TEXT PRIMARY KEY,
    [City] TEXT NOT NULL
);
CREATE TABLE [Account] (
    [AccountId] INTEGER PRIMARY KEY,
    [AccountNumber] TEXT NOT NULL,
    [Balance] REAL NOT NULL,
    [FirstName] TEXT,
    [LastName] TEXT,
    [BranchCode] TEXT REFERENCES [Branch]([Code])
);
CREATE TABLE [AccountTransaction] (
    [TransactionId] INTEGER PRIMARY KEY,
    [Amount] REAL NOT NULL,
    [Kind] INTEGER NOT NULL,
    [Memo] TEXT,
    [PostedAt] TEXT NOT NULL,
    [AccountId] INTEGER REFERENCES [Account]([AccountId]) ON DELETE CASCADE
);
CREATE TABLE [AuditEntry] (
    [AuditId] TEXT PRIMARY KEY,
    [Message] TEXT NOT NULL,
    [Active] INTEGER NOT NULL,
    [RecordedAt] TEXT NOT NULL,
    [Payload] BLOB
);
CREATE TABLE [Tag] (
    [Id] INTEGER PRIMARY KEY
);
"#;

pub const ACCOUNTS_IN_CITY: &str = "SELECT [Account].* FROM [Account] \
     INNER JOIN [Branch] ON [Branch].[Code] = [Account].[BranchCode] \
     WHERE [Branch].[City] = @city ORDER BY [Account].[AccountNumber]";

// ===== Model =====

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    pub code: String,
    pub city: String,
}

impl Entity for Branch {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key_as("code", "Code", |b| &b.code, |b| &mut b.code)
            .column_as("city", "City", |b| &b.city, |b| &mut b.city);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Owner {
    pub first: String,
    pub last: String,
}

impl Component for Owner {
    fn map(map: &mut ComponentMap<Self>) {
        map.column_as("first", "FirstName", |o| &o.first, |o| &mut o.first)
            .column_as("last", "LastName", |o| &o.last, |o| &mut o.last);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: i32,
    pub number: String,
    pub balance: f64,
    pub owner: Owner,
    pub branch: Reference<Branch>,
    pub transactions: Collection<AccountTransaction>,
}

impl Entity for Account {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key_as("id", "AccountId", |a| &a.id, |a| &mut a.id)
            .column_as("number", "AccountNumber", |a| &a.number, |a| &mut a.number)
            .column_as("balance", "Balance", |a| &a.balance, |a| &mut a.balance)
            .component("owner", |a| &a.owner, |a| &mut a.owner)
            .reference_as("branch", "BranchCode", |a| &a.branch, |a| &mut a.branch)
            .collection("transactions", |a| &a.transactions, |a| &mut a.transactions);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TransactionKind {
    #[default]
    Deposit = 1,
    Withdrawal = 2,
}

impl From<TransactionKind> for i32 {
    fn from(kind: TransactionKind) -> i32 {
        kind as i32
    }
}

impl TryFrom<i32> for TransactionKind {
    type Error = ();

    fn try_from(value: i32) -> std::result::Result<Self, ()> {
        match value {
            1 => Ok(TransactionKind::Deposit),
            2 => Ok(TransactionKind::Withdrawal),
            _ => Err(()),
        }
    }
}

column_enum!(TransactionKind);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountTransaction {
    pub id: i64,
    pub amount: f64,
    pub kind: TransactionKind,
    pub memo: Option<String>,
    pub posted_at: NaiveDateTime,
    pub account: Reference<Account>,
}

impl Entity for AccountTransaction {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key_as("id", "TransactionId", |t| &t.id, |t| &mut t.id)
            .column_as("amount", "Amount", |t| &t.amount, |t| &mut t.amount)
            .column_as("kind", "Kind", |t| &t.kind, |t| &mut t.kind)
            .column_as("memo", "Memo", |t| &t.memo, |t| &mut t.memo)
            .column_as("posted_at", "PostedAt", |t| &t.posted_at, |t| &mut t.posted_at)
            .reference("account", |t| &t.account, |t| &mut t.account);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub message: String,
    pub active: bool,
    pub recorded_at: DateTime<Utc>,
    pub payload: Option<Vec<u8>>,
}

impl Entity for AuditEntry {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key_as("id", "AuditId", |e| &e.id, |e| &mut e.id)
            .column_as("message", "Message", |e| &e.message, |e| &mut e.message)
            .column_as("active", "Active", |e| &e.active, |e| &mut e.active)
            .column_as("recorded_at", "RecordedAt", |e| &e.recorded_at, |e| &mut e.recorded_at)
            .column_as("payload", "Payload", |e| &e.payload, |e| &mut e.payload);
    }
}

/// A row that is nothing but its generated key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: i64,
}

impl Entity for Tag {
    fn map(map: &mut EntityMap<Self>) {
        map.primary_key_as("id", "Id", |t| &t.id, |t| &mut t.id);
    }
}

/// Per-account totals read through a grouped query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountTotal {
    pub number: String,
    pub total: f64,
}

impl Entity for AccountTotal {
    fn map(map: &mut EntityMap<Self>) {
        map.table("Account")
            .column_as("number", "AccountNumber", |t| &t.number, |t| &mut t.number)
            .column("total", |t| &t.total, |t| &mut t.total);
    }
}

// ===== Statement log =====

/// Texts of every statement a [`LoggedConnection`] ran
#[derive(Clone, Default)]
pub struct StatementLog {
    texts: Rc<RefCell<Vec<String>>>,
}

#[allow(dead_code)]
impl StatementLog {
    pub fn texts(&self) -> Vec<String> {
        self.texts.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.texts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.borrow().is_empty()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.texts.borrow().iter().filter(|t| t.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.texts.borrow_mut().clear();
    }

    fn push(&self, text: &str) {
        self.texts.borrow_mut().push(text.to_string());
    }
}

/// Delegates to SQLite and records each statement on the way
pub struct LoggedConnection {
    inner: SqliteConnection,
    log: StatementLog,
}

impl Connection for LoggedConnection {
    fn query(&self, command: &Command) -> Result<Vec<Row>> {
        self.log.push(command.text());
        self.inner.query(command)
    }

    fn query_scalar(&self, command: &Command) -> Result<Value> {
        self.log.push(command.text());
        self.inner.query_scalar(command)
    }

    fn execute(&self, command: &Command) -> Result<usize> {
        self.log.push(command.text());
        self.inner.execute(command)
    }

    fn begin(&self) -> Result<()> {
        self.log.push("BEGIN");
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.log.push("COMMIT");
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.log.push("ROLLBACK");
        self.inner.rollback()
    }
}

// ===== Helpers =====

#[allow(dead_code)]
pub fn configuration() -> Configuration {
    Configuration::default().with_procedure("accounts_in_city", ACCOUNTS_IN_CITY)
}

#[allow(dead_code)]
pub fn factory_with(configuration: Configuration) -> SessionFactory {
    microorm_sqlite::session_factory_builder(configuration)
        .unwrap()
        .register::<Branch>()
        .register::<Account>()
        .register::<AccountTransaction>()
        .register::<AuditEntry>()
        .register::<Tag>()
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub fn factory() -> SessionFactory {
    factory_with(configuration())
}

/// A session over a fresh in-memory database carrying the schema
#[allow(dead_code)]
pub fn memory_session(factory: &SessionFactory) -> (Session, StatementLog) {
    let inner = SqliteConnection::open_in_memory().unwrap();
    inner.execute_batch(SCHEMA).unwrap();
    logged_session(factory, inner)
}

#[allow(dead_code)]
pub fn logged_session(factory: &SessionFactory, inner: SqliteConnection) -> (Session, StatementLog) {
    let log = StatementLog::default();
    let connection = LoggedConnection {
        inner,
        log: log.clone(),
    };
    (factory.open_session_on(Box::new(connection)), log)
}

/// File database with the schema applied; sessions opened on it share data
#[allow(dead_code)]
pub struct FileDatabase {
    pub dir: TempDir,
    pub path: String,
}

#[allow(dead_code)]
impl FileDatabase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.db").to_string_lossy().into_owned();
        let conn = microorm_sqlite::db::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self { dir, path }
    }

    pub fn factory(&self) -> SessionFactory {
        factory_with(configuration().with_connection_string(self.path.clone()))
    }

    /// Session on this database with statement logging
    pub fn session(&self, factory: &SessionFactory) -> (Session, StatementLog) {
        logged_session(factory, SqliteConnection::open(&self.path).unwrap())
    }
}

#[allow(dead_code)]
pub fn posted_at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

#[allow(dead_code)]
pub fn account(number: &str, balance: f64) -> Account {
    Account {
        number: number.to_string(),
        balance,
        owner: Owner {
            first: "Ada".to_string(),
            last: "Lovelace".to_string(),
        },
        ..Account::default()
    }
}

#[allow(dead_code)]
pub fn transaction(amount: f64, kind: TransactionKind, day: u32) -> AccountTransaction {
    AccountTransaction {
        amount,
        kind,
        posted_at: posted_at(day),
        ..AccountTransaction::default()
    }
}
