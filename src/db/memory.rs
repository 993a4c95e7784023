//! In-memory engine standing in for Postgres in tests. Mirrors the schema's
//! constraints (unique email, order owner, positive quantity) and the
//! user -> orders cascade.
//!
//! A session works on its own snapshot and records every write. Committing
//! replays that log against the current shared store, so constraints are
//! checked again against whatever other sessions committed in the meantime.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{DbError, Engine, ScopedConnection, Session};
use crate::orders::repo::OrderRepository;
use crate::orders::repo_types::{NewOrder, Order};
use crate::users::repo::UserRepository;
use crate::users::repo_types::{NewUser, User};

/// Key generators shared by every snapshot. Like database sequences they are
/// not rolled back.
#[derive(Debug, Default)]
struct Sequences {
    users: AtomicI64,
    orders: AtomicI64,
}

impl Sequences {
    fn next(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Clone)]
enum Write {
    InsertUser(User),
    UpdateUser(User),
    DeleteUser(i64),
    InsertOrder(Order),
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: Vec<User>,
    orders: Vec<Order>,
    sequences: Arc<Sequences>,
    pending: Vec<Write>,
}

impl MemoryStore {
    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users.iter().find(|u| u.email == email).cloned()
    }

    pub fn insert_user(&mut self, new_user: NewUser) -> Result<User, DbError> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Sequences::next(&self.sequences.users),
            name: new_user.name,
            email: new_user.email,
            password: new_user.password,
            phone: new_user.phone,
            address: new_user.address,
            created_at: now,
            updated_at: now,
        };
        self.record(Write::InsertUser(user.clone()))?;
        Ok(user)
    }

    pub fn update_user(&mut self, user: &User) -> Result<User, DbError> {
        let stored = self
            .users
            .iter()
            .find(|u| u.id == user.id)
            .ok_or(DbError::NotFound)?;
        let updated = User {
            created_at: stored.created_at,
            updated_at: OffsetDateTime::now_utc(),
            ..user.clone()
        };
        self.record(Write::UpdateUser(updated.clone()))?;
        Ok(updated)
    }

    pub fn delete_user(&mut self, id: i64) -> Result<bool, DbError> {
        let existed = self.users.iter().any(|u| u.id == id);
        self.record(Write::DeleteUser(id))?;
        Ok(existed)
    }

    pub fn insert_order(&mut self, new_order: NewOrder) -> Result<Order, DbError> {
        let order = Order {
            id: Sequences::next(&self.sequences.orders),
            user_id: new_order.user_id,
            item: new_order.item,
            quantity: new_order.quantity,
            created_at: OffsetDateTime::now_utc(),
        };
        self.record(Write::InsertOrder(order.clone()))?;
        Ok(order)
    }

    pub fn orders_for_user(&self, user_id: i64) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect()
    }

    fn record(&mut self, write: Write) -> Result<(), DbError> {
        self.apply(write.clone())?;
        self.pending.push(write);
        Ok(())
    }

    fn apply(&mut self, write: Write) -> Result<(), DbError> {
        match write {
            Write::InsertUser(user) => {
                if self.users.iter().any(|u| u.email == user.email) {
                    return Err(DbError::Conflict("users_email_key".into()));
                }
                self.users.push(user);
            }
            Write::UpdateUser(user) => {
                let index = self
                    .users
                    .iter()
                    .position(|u| u.id == user.id)
                    .ok_or(DbError::NotFound)?;
                if self
                    .users
                    .iter()
                    .any(|u| u.id != user.id && u.email == user.email)
                {
                    return Err(DbError::Conflict("users_email_key".into()));
                }
                self.users[index] = user;
            }
            Write::DeleteUser(id) => {
                self.users.retain(|u| u.id != id);
                self.orders.retain(|o| o.user_id != id);
            }
            Write::InsertOrder(order) => {
                if order.quantity <= 0 {
                    return Err(DbError::Constraint("orders_quantity_check".into()));
                }
                if !self.users.iter().any(|u| u.id == order.user_id) {
                    return Err(DbError::Constraint("orders_user_id_fkey".into()));
                }
                self.orders.push(order);
            }
        }
        Ok(())
    }
}

type Shared = Arc<Mutex<MemoryStore>>;

fn lock(store: &Shared) -> MutexGuard<'_, MemoryStore> {
    store.lock().expect("memory store lock poisoned")
}

fn snapshot(store: &Shared) -> MemoryStore {
    let mut working = lock(store).clone();
    working.pending.clear();
    working
}

/// Replays `working`'s writes on top of the shared store. Nothing is applied
/// unless every write succeeds.
fn commit_writes(store: &Shared, working: MemoryStore) -> Result<(), DbError> {
    let mut shared = lock(store);
    let mut next = shared.clone();
    for write in working.pending {
        next.apply(write)?;
    }
    *shared = next;
    Ok(())
}

/// Cloning shares the underlying store, so a test can keep a handle and
/// inspect committed state after handing the engine to a manager.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    store: Shared,
    disposed: Arc<AtomicBool>,
}

impl MemoryEngine {
    pub fn users(&self) -> Vec<User> {
        lock(&self.store).users.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        lock(&self.store).orders.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    type Connection = MemoryConnection;
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemoryConnection, DbError> {
        Ok(MemoryConnection {
            store: Arc::clone(&self.store),
            working: snapshot(&self.store),
        })
    }

    async fn open_session(&self) -> Result<MemorySession, DbError> {
        Ok(MemorySession {
            store: Arc::clone(&self.store),
            working: None,
            closed: false,
        })
    }

    async fn ensure_schema(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// Transaction over a snapshot of the store.
pub struct MemoryConnection {
    store: Shared,
    pub working: MemoryStore,
}

#[async_trait]
impl ScopedConnection for MemoryConnection {
    async fn commit(self) -> Result<(), DbError> {
        commit_writes(&self.store, self.working)
    }

    async fn rollback(self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Writes go to a private snapshot, taken lazily on the first write.
pub struct MemorySession {
    store: Shared,
    working: Option<MemoryStore>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            Err(DbError::SessionClosed)
        } else {
            Ok(())
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&MemoryStore) -> R) -> Result<R, DbError> {
        self.ensure_open()?;
        Ok(match &self.working {
            Some(working) => f(working),
            None => f(&lock(&self.store)),
        })
    }

    pub fn write<R>(
        &mut self,
        f: impl FnOnce(&mut MemoryStore) -> Result<R, DbError>,
    ) -> Result<R, DbError> {
        self.ensure_open()?;
        let store = &self.store;
        let working = self.working.get_or_insert_with(|| snapshot(store));
        f(working)
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        match self.working.take() {
            Some(working) => commit_writes(&self.store, working),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.working = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.working = None;
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryUserRepository;

#[async_trait]
impl UserRepository<MemorySession> for MemoryUserRepository {
    async fn find_by_email(
        &self,
        session: &mut MemorySession,
        email: &str,
    ) -> Result<Option<User>, DbError> {
        session.read(|store| store.find_user_by_email(email))
    }

    async fn create(&self, session: &mut MemorySession, new_user: NewUser) -> Result<User, DbError> {
        let user = session.write(|store| store.insert_user(new_user))?;
        session.commit().await?;
        Ok(user)
    }

    async fn save(&self, session: &mut MemorySession, user: &User) -> Result<User, DbError> {
        let saved = session.write(|store| store.update_user(user))?;
        session.commit().await?;
        Ok(saved)
    }

    async fn delete(&self, session: &mut MemorySession, id: i64) -> Result<bool, DbError> {
        let existed = session.write(|store| store.delete_user(id))?;
        session.commit().await?;
        Ok(existed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryOrderRepository;

#[async_trait]
impl OrderRepository<MemorySession> for MemoryOrderRepository {
    async fn create(
        &self,
        session: &mut MemorySession,
        new_order: NewOrder,
    ) -> Result<Order, DbError> {
        let order = session.write(|store| store.insert_order(new_order))?;
        session.commit().await?;
        Ok(order)
    }

    async fn list_for_user(
        &self,
        session: &mut MemorySession,
        user_id: i64,
    ) -> Result<Vec<Order>, DbError> {
        session.read(|store| store.orders_for_user(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "A".into(),
            email: email.into(),
            password: "hashed".into(),
            phone: "1234567890".into(),
            address: None,
        }
    }

    #[tokio::test]
    async fn rollback_hides_uncommitted_writes() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();

        session
            .write(|store| store.insert_user(new_user("a@example.com")))
            .unwrap();
        assert!(MemoryUserRepository
            .email_exists(&mut session, "a@example.com")
            .await
            .unwrap());
        assert!(engine.users().is_empty());

        session.rollback().await.unwrap();
        assert!(!MemoryUserRepository
            .email_exists(&mut session, "a@example.com")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn closed_session_rejects_reads_and_writes() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();

        assert!(matches!(
            MemoryUserRepository.find_by_email(&mut session, "a@example.com").await,
            Err(DbError::SessionClosed)
        ));
        assert!(matches!(
            MemoryUserRepository.create(&mut session, new_user("a@example.com")).await,
            Err(DbError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();
        MemoryUserRepository
            .create(&mut session, new_user("a@example.com"))
            .await
            .unwrap();
        let err = MemoryUserRepository
            .create(&mut session, new_user("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(engine.users().len(), 1);
    }

    #[tokio::test]
    async fn save_refreshes_updated_at_and_keeps_created_at() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();
        let mut user = MemoryUserRepository
            .create(&mut session, new_user("a@example.com"))
            .await
            .unwrap();

        user.phone = "0987654321".into();
        let saved = MemoryUserRepository.save(&mut session, &user).await.unwrap();
        assert_eq!(saved.phone, "0987654321");
        assert_eq!(saved.created_at, user.created_at);
        assert!(saved.updated_at >= user.updated_at);

        user.id = 99;
        assert!(matches!(
            MemoryUserRepository.save(&mut session, &user).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_orders() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();
        let owner = MemoryUserRepository
            .create(&mut session, new_user("owner@example.com"))
            .await
            .unwrap();
        let other = MemoryUserRepository
            .create(&mut session, new_user("other@example.com"))
            .await
            .unwrap();
        for user_id in [owner.id, owner.id, other.id] {
            MemoryOrderRepository
                .create(
                    &mut session,
                    NewOrder {
                        user_id,
                        item: "tea".into(),
                        quantity: 2,
                    },
                )
                .await
                .unwrap();
        }

        assert!(MemoryUserRepository.delete(&mut session, owner.id).await.unwrap());
        assert!(MemoryOrderRepository
            .list_for_user(&mut session, owner.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(engine.orders().len(), 1);
        assert!(!MemoryUserRepository.delete(&mut session, owner.id).await.unwrap());
    }

    #[tokio::test]
    async fn order_requires_existing_user() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();
        let err = MemoryOrderRepository
            .create(
                &mut session,
                NewOrder {
                    user_id: 1,
                    item: "tea".into(),
                    quantity: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn connection_scope_commits_snapshot() {
        let engine = MemoryEngine::default();
        let mut conn = engine.begin().await.unwrap();
        conn.working.insert_user(new_user("a@example.com")).unwrap();
        assert!(engine.users().is_empty());
        conn.commit().await.unwrap();
        assert_eq!(engine.users().len(), 1);
    }

    #[tokio::test]
    async fn independent_commits_keep_each_others_writes() {
        let engine = MemoryEngine::default();
        let mut first = engine.open_session().await.unwrap();
        let mut second = engine.open_session().await.unwrap();

        first
            .write(|store| store.insert_user(new_user("a@example.com")))
            .unwrap();
        second
            .write(|store| store.insert_user(new_user("b@example.com")))
            .unwrap();
        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let mut emails: Vec<_> = engine.users().into_iter().map(|u| u.email).collect();
        emails.sort();
        assert_eq!(emails, ["a@example.com", "b@example.com"]);
        let ids: Vec<_> = engine.users().into_iter().map(|u| u.id).collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn racing_duplicate_fails_at_commit() {
        let engine = MemoryEngine::default();
        let mut first = engine.open_session().await.unwrap();
        let mut second = engine.open_session().await.unwrap();

        for session in [&mut first, &mut second] {
            assert!(!MemoryUserRepository
                .email_exists(session, "a@example.com")
                .await
                .unwrap());
        }
        MemoryUserRepository
            .create(&mut first, new_user("a@example.com"))
            .await
            .unwrap();
        let err = MemoryUserRepository
            .create(&mut second, new_user("a@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Conflict(ref c) if c == "users_email_key"));
        assert_eq!(engine.users().len(), 1);
    }

    #[tokio::test]
    async fn order_quantity_must_be_positive() {
        let engine = MemoryEngine::default();
        let mut session = engine.open_session().await.unwrap();
        let owner = MemoryUserRepository
            .create(&mut session, new_user("owner@example.com"))
            .await
            .unwrap();
        let err = MemoryOrderRepository
            .create(
                &mut session,
                NewOrder {
                    user_id: owner.id,
                    item: "tea".into(),
                    quantity: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(ref c) if c == "orders_quantity_check"));
        assert!(engine.orders().is_empty());
    }
}
