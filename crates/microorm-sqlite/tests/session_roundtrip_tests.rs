#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::{TimeZone, Utc};
use common::{
    account, factory, memory_session, posted_at, transaction, Account, AccountTransaction, AuditEntry, Branch,
    FileDatabase, Tag, TransactionKind,
};
use microorm_core::{shared, Collection, DataInvocation, InsertInterceptor, OrmError, Reference, Value};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ===== Round trips =====

#[test]
fn test_every_column_kind_survives_a_round_trip() {
    // Given: a branch, an account in it and a transaction against the account
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, _) = db.session(&factory);

    let branch = shared(Branch {
        code: "NYC".to_string(),
        city: "New York".to_string(),
    });
    writer.save(&branch).unwrap();

    let acct = shared(Account {
        branch: Reference::new(branch.borrow().clone()),
        ..account("100-200", 50.0)
    });
    writer.save_or_update(&acct).unwrap();
    let account_id = acct.borrow().id;

    let tx = shared(AccountTransaction {
        memo: Some("rent".to_string()),
        account: Reference::from_key(account_id),
        ..transaction(-25.5, TransactionKind::Withdrawal, 15)
    });
    writer.save_or_update(&tx).unwrap();
    let tx_id = tx.borrow().id;

    // When: a second session reads them back
    let (mut reader, log) = db.session(&factory);
    let loaded_tx = reader.get::<AccountTransaction>(tx_id).unwrap().unwrap();
    let loaded_account = reader.get::<Account>(account_id).unwrap().unwrap();

    // Then: scalars, enum, date, nullable text and the component match
    {
        let t = loaded_tx.borrow();
        assert_eq!(t.amount, -25.5);
        assert_eq!(t.kind, TransactionKind::Withdrawal);
        assert_eq!(t.memo.as_deref(), Some("rent"));
        assert_eq!(t.posted_at, posted_at(15));
        assert_eq!(t.account.key(), &Value::Int64(i64::from(account_id)));
    }
    let a = loaded_account.borrow();
    assert_eq!(a.number, "100-200");
    assert_eq!(a.balance, 50.0);
    assert_eq!(a.owner.first, "Ada");
    assert_eq!(a.owner.last, "Lovelace");
    assert_eq!(a.branch.key(), &Value::from("NYC"));
    assert_eq!(log.count_starting_with("SELECT"), 2);
}

#[test]
fn test_guid_keyed_entity_gets_generated_id_and_reads_back() {
    // Given: an audit entry without an id
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, log) = db.session(&factory);
    let recorded_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let entry = shared(AuditEntry {
        message: "opened".to_string(),
        active: true,
        recorded_at,
        payload: Some(vec![0, 1, 2, 255]),
        ..AuditEntry::default()
    });

    // When: saved
    writer.save_or_update(&entry).unwrap();

    // Then: a fresh id was assigned and written with the row
    let id = entry.borrow().id;
    assert_ne!(id, Uuid::nil());
    assert!(log.texts()[0].starts_with("INSERT INTO [AuditEntry] ("));
    assert!(log.texts()[0].contains("[AuditId]"));

    let (mut reader, _) = db.session(&factory);
    let loaded = reader.get::<AuditEntry>(id).unwrap().unwrap();
    let loaded = loaded.borrow();
    assert_eq!(loaded.message, "opened");
    assert!(loaded.active);
    assert_eq!(loaded.recorded_at, recorded_at);
    assert_eq!(loaded.payload.as_deref(), Some(&[0u8, 1, 2, 255][..]));
}

#[test]
fn test_nullable_columns_read_back_as_none() {
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, _) = db.session(&factory);
    let entry = shared(AuditEntry {
        message: "no payload".to_string(),
        ..AuditEntry::default()
    });
    writer.save(&entry).unwrap();
    let id = entry.borrow().id;

    let (mut reader, _) = db.session(&factory);
    let loaded = reader.get::<AuditEntry>(id).unwrap().unwrap();
    assert_eq!(loaded.borrow().payload, None);
    assert!(!loaded.borrow().active);
}

// ===== Identity =====

#[test]
fn test_saved_entity_is_tracked_without_select() {
    let factory = factory();
    let (mut session, log) = memory_session(&factory);
    let acct = shared(account("1", 1.0));
    session.save_or_update(&acct).unwrap();

    let tracked = session.get::<Account>(1).unwrap().unwrap();

    assert!(Rc::ptr_eq(&tracked, &acct));
    assert_eq!(log.count_starting_with("SELECT"), 0);
}

#[test]
fn test_get_twice_hits_database_once() {
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, _) = db.session(&factory);
    writer.save_or_update(&shared(account("2", 2.0))).unwrap();

    let (mut reader, log) = db.session(&factory);
    let first = reader.get::<Account>(1).unwrap().unwrap();
    let second = reader.get::<Account>(1).unwrap().unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(log.count_starting_with("SELECT"), 1);
}

#[test]
fn test_get_with_wrong_id_type_runs_no_statement() {
    let factory = factory();
    let (mut session, log) = memory_session(&factory);

    let err = session.get::<Account>("1").unwrap_err();

    assert!(matches!(err, OrmError::IdTypeMismatch { .. }));
    assert!(log.is_empty());
}

#[test]
fn test_get_missing_row_is_none() {
    let factory = factory();
    let (mut session, _) = memory_session(&factory);
    assert!(session.get::<Account>(404).unwrap().is_none());
    assert!(session.get::<Branch>("LON").unwrap().is_none());
}

// ===== Insert vs update =====

#[test]
fn test_save_or_update_inserts_then_updates() {
    // Given: a new account
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut session, log) = db.session(&factory);
    let acct = shared(account("300", 10.0));

    // When: saved, changed and saved again
    session.save_or_update(&acct).unwrap();
    acct.borrow_mut().balance = 99.5;
    session.save_or_update(&acct).unwrap();

    // Then: one INSERT then one UPDATE hit the same row
    assert_eq!(acct.borrow().id, 1);
    assert_eq!(log.count_starting_with("INSERT"), 1);
    assert_eq!(log.count_starting_with("UPDATE"), 1);

    let (mut reader, _) = db.session(&factory);
    let loaded = reader.get::<Account>(1).unwrap().unwrap();
    assert_eq!(loaded.borrow().balance, 99.5);
}

#[test]
fn test_generated_keys_increase_per_insert() {
    let factory = factory();
    let (mut session, _) = memory_session(&factory);
    let first = shared(account("a", 0.0));
    let second = shared(account("b", 0.0));

    session.save(&first).unwrap();
    session.save(&second).unwrap();

    assert_eq!(first.borrow().id, 1);
    assert_eq!(second.borrow().id, 2);
}

#[test]
fn test_key_only_entity_inserts_default_row_and_skips_update() {
    // Given: rows with nothing but a generated key
    let factory = factory();
    let (mut session, log) = memory_session(&factory);
    let first = shared(Tag::default());
    let second = shared(Tag::default());

    // When
    session.save(&first).unwrap();
    session.save(&second).unwrap();

    // Then: each insert takes the table defaults and returns its key
    assert_eq!(first.borrow().id, 1);
    assert_eq!(second.borrow().id, 2);
    assert_eq!(log.texts()[0], "INSERT INTO [Tag] DEFAULT VALUES RETURNING [Id]");

    // and an update has nothing to assign
    log.clear();
    session.save_or_update(&first).unwrap();
    assert!(log.is_empty());
    assert_eq!(first.borrow().id, 1);
}

// ===== Cascades =====

#[test]
fn test_unsaved_parent_is_inserted_before_child() {
    // Given: a transaction pointing at an account that has no key yet
    let factory = factory();
    let (mut session, log) = memory_session(&factory);
    let tx = shared(AccountTransaction {
        account: Reference::new(account("parent", 0.0)),
        ..transaction(10.0, TransactionKind::Deposit, 2)
    });

    // When
    session.save_or_update(&tx).unwrap();

    // Then: the account row went first and the child carries its key
    let texts = log.texts();
    assert!(texts[0].starts_with("INSERT INTO [Account]"));
    assert!(texts[1].starts_with("INSERT INTO [AccountTransaction]"));
    let tx = tx.borrow();
    assert_eq!(tx.account.loaded().unwrap().id, 1);
    assert_eq!(tx.id, 1);
}

#[test]
fn test_loaded_children_are_saved_after_parent() {
    // Given: an account carrying two new transactions
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, log) = db.session(&factory);
    let acct = shared(Account {
        transactions: Collection::new(vec![
            transaction(5.0, TransactionKind::Deposit, 1),
            transaction(7.0, TransactionKind::Deposit, 2),
        ]),
        ..account("with-children", 12.0)
    });

    // When
    writer.save_or_update(&acct).unwrap();

    // Then: three inserts, children linked to the new key
    assert_eq!(log.count_starting_with("INSERT"), 3);
    assert!(log.texts()[0].starts_with("INSERT INTO [Account]"));

    let (mut reader, reader_log) = db.session(&factory);
    let loaded = reader.get::<Account>(1).unwrap().unwrap();
    let amounts: Vec<f64> = loaded
        .borrow_mut()
        .transactions
        .get(&reader)
        .unwrap()
        .iter()
        .map(|t| t.amount)
        .collect();
    assert_eq!(amounts.len(), 2);
    assert!(amounts.contains(&5.0));
    assert!(amounts.contains(&7.0));
    assert_eq!(reader_log.count_starting_with("SELECT"), 2);
}

// ===== Lazy loading =====

#[test]
fn test_lazy_collection_runs_one_follow_up_query() {
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, _) = db.session(&factory);
    writer
        .save_or_update(&shared(Account {
            transactions: Collection::new(vec![
                transaction(1.0, TransactionKind::Deposit, 1),
                transaction(2.0, TransactionKind::Deposit, 2),
                transaction(3.0, TransactionKind::Withdrawal, 3),
            ]),
            ..account("lazy", 0.0)
        }))
        .unwrap();

    let (mut reader, log) = db.session(&factory);
    let acct = reader.get::<Account>(1).unwrap().unwrap();
    assert!(!acct.borrow().transactions.is_loaded());
    assert_eq!(log.len(), 1);

    // first access fetches, second reads the materialized children
    assert_eq!(acct.borrow_mut().transactions.get(&reader).unwrap().len(), 3);
    assert_eq!(acct.borrow_mut().transactions.get(&reader).unwrap().len(), 3);

    assert_eq!(log.len(), 2);
    assert!(log.texts()[1].ends_with("WHERE [AccountTransaction].[AccountId] = @AccountId"));
}

#[test]
fn test_lazy_reference_resolves_parent() {
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, _) = db.session(&factory);
    let branch = shared(Branch {
        code: "SFO".to_string(),
        city: "San Francisco".to_string(),
    });
    writer.save(&branch).unwrap();
    writer
        .save_or_update(&shared(Account {
            branch: Reference::from_key("SFO"),
            ..account("west", 0.0)
        }))
        .unwrap();

    let (mut reader, log) = db.session(&factory);
    let acct = reader.get::<Account>(1).unwrap().unwrap();
    let city = acct
        .borrow_mut()
        .branch
        .get(&reader)
        .unwrap()
        .map(|b| b.city.clone());

    assert_eq!(city.as_deref(), Some("San Francisco"));
    assert_eq!(log.count_starting_with("SELECT"), 2);
}

#[test]
fn test_lazy_loading_disabled_reads_relations_up_front() {
    let db = FileDatabase::new();
    let factory = common::factory_with(
        common::configuration()
            .with_connection_string(db.path.clone())
            .with_lazy_loading(false),
    );
    let (mut writer, _) = db.session(&factory);
    writer
        .save_or_update(&shared(Account {
            transactions: Collection::new(vec![transaction(4.0, TransactionKind::Deposit, 4)]),
            ..account("eager", 4.0)
        }))
        .unwrap();

    let (mut reader, log) = db.session(&factory);
    let acct = reader.get::<Account>(1).unwrap().unwrap();
    let statements_after_get = log.len();

    assert!(acct.borrow().transactions.is_loaded());
    assert_eq!(acct.borrow().transactions.loaded().unwrap().len(), 1);
    assert!(statements_after_get >= 2);
}

#[test]
fn test_update_of_fetched_account_leaves_deferred_relations_unfetched() {
    // Given: an account with a branch and a transaction, fetched by a fresh session
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut writer, _) = db.session(&factory);
    writer
        .save(&shared(Branch {
            code: "NYC".to_string(),
            city: "New York".to_string(),
        }))
        .unwrap();
    writer
        .save_or_update(&shared(Account {
            branch: Reference::from_key("NYC"),
            transactions: Collection::new(vec![transaction(8.0, TransactionKind::Deposit, 8)]),
            ..account("armed", 1.0)
        }))
        .unwrap();

    let (mut session, log) = db.session(&factory);
    let acct = session.get::<Account>(1).unwrap().unwrap();
    assert!(!acct.borrow().branch.is_loaded());
    assert!(!acct.borrow().transactions.is_loaded());
    log.clear();

    // When: the balance changes and the account is saved
    acct.borrow_mut().balance = 42.0;
    session.save_or_update(&acct).unwrap();

    // Then: only the UPDATE ran; neither relation was fetched for the save
    let texts = log.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("UPDATE [Account] SET"));
    {
        let a = acct.borrow();
        assert!(!a.branch.is_loaded());
        assert!(!a.transactions.is_loaded());
        assert!(a.branch.is_armed());
        assert!(a.transactions.is_armed());
    }

    // the foreign key was written back unchanged
    let (mut reader, _) = db.session(&factory);
    let reread = reader.get::<Account>(1).unwrap().unwrap();
    assert_eq!(reread.borrow().balance, 42.0);
    assert_eq!(reread.borrow().branch.key(), &Value::from("NYC"));

    // lazy loading is back on: the first access fetches once
    log.clear();
    assert_eq!(acct.borrow_mut().transactions.get(&session).unwrap().len(), 1);
    assert_eq!(acct.borrow_mut().transactions.get(&session).unwrap().len(), 1);
    assert_eq!(log.len(), 1);
    assert!(log.texts()[0].starts_with("SELECT"));
    assert!(log.texts()[0].contains("FROM [AccountTransaction]"));
}

// ===== Delete =====

#[test]
fn test_delete_without_key_runs_nothing() {
    let factory = factory();
    let (mut session, log) = memory_session(&factory);

    session.delete(&shared(account("never-saved", 0.0))).unwrap();

    assert!(log.is_empty());
}

#[test]
fn test_delete_removes_row_and_cascades_children() {
    // Given: a saved account with a child transaction
    let factory = factory();
    let (mut session, log) = memory_session(&factory);
    let acct = shared(Account {
        transactions: Collection::new(vec![transaction(1.0, TransactionKind::Deposit, 1)]),
        ..account("doomed", 0.0)
    });
    session.save_or_update(&acct).unwrap();

    // When
    session.delete(&acct).unwrap();

    // Then: the row is gone and the cache no longer answers for it
    assert!(log.texts().iter().any(|t| t.starts_with("DELETE FROM [Account]")));
    log.clear();
    assert!(session.get::<Account>(1).unwrap().is_none());
    assert_eq!(log.count_starting_with("SELECT"), 1);
    assert!(session.get::<AccountTransaction>(1_i64).unwrap().is_none());
}

#[test]
fn test_delete_of_guid_keyed_entity_leaves_row_in_place() {
    // Given: a saved audit entry, whose Guid key never counts as set
    let db = FileDatabase::new();
    let factory = db.factory();
    let (mut session, log) = db.session(&factory);
    let entry = shared(AuditEntry {
        message: "retained".to_string(),
        ..AuditEntry::default()
    });
    session.save(&entry).unwrap();
    let id = entry.borrow().id;
    log.clear();

    // When
    session.delete(&entry).unwrap();

    // Then: no statement ran and the row is still there
    assert!(log.is_empty());
    let (mut reader, _) = db.session(&factory);
    assert!(reader.get::<AuditEntry>(id).unwrap().is_some());
}

// ===== Interceptors =====

struct RejectFrozen {
    post_calls: Arc<AtomicUsize>,
}

impl InsertInterceptor for RejectFrozen {
    fn on_pre_insert(&self, invocation: &mut DataInvocation<'_>) -> bool {
        invocation
            .entity::<Account>()
            .map_or(true, |a| !a.number.starts_with("FROZEN"))
    }

    fn on_post_insert(&self, _invocation: &mut DataInvocation<'_>) {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_insert_interceptor_veto_leaves_table_untouched() {
    // Given: an interceptor rejecting frozen accounts
    let post_calls = Arc::new(AtomicUsize::new(0));
    let factory = microorm_sqlite::session_factory_builder(common::configuration())
        .unwrap()
        .insert_interceptor(RejectFrozen {
            post_calls: Arc::clone(&post_calls),
        })
        .build()
        .unwrap();
    let (mut session, log) = memory_session(&factory);

    // When: one rejected and one accepted save
    let frozen = shared(account("FROZEN-1", 0.0));
    session.save_or_update(&frozen).unwrap();
    let open = shared(account("OPEN-1", 0.0));
    session.save_or_update(&open).unwrap();

    // Then: only the accepted row was written and post hooks ran once
    assert_eq!(frozen.borrow().id, 0);
    assert_eq!(open.borrow().id, 1);
    assert_eq!(log.count_starting_with("INSERT"), 1);
    assert_eq!(post_calls.load(Ordering::SeqCst), 1);
}
