//! # Session Reconciler
//!
//! Opens and closes cashier sessions and reconciles the cash drawer.
//!
//! ## Close
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE store_sessions SET closed_at = now                             │
//! │   WHERE id = ? AND status = 'open'            ◄── guarded first write  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cash_sales = Σ cash payments of completed sales in the session       │
//! │  expected   = opening_cash + cash_sales                                │
//! │  variance   = actual_cash - expected                                   │
//! │       │                                                                 │
//! │       ├── variance == 0 ──► closed                                     │
//! │       └── variance != 0 ──► pending_approval ──approve──► approved     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one session per (cashier, store) is open; the partial unique
//! index `idx_store_sessions_one_open` backs the check made on open.
//! Sessions never touch stock.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use stockroom_core::numbering::SequenceKind;
use stockroom_core::session::{
    reconcile, CloseSession, SessionStatus, SessionSummary, StoreSession,
};
use stockroom_core::validation::{normalize_note, validate_amount};
use stockroom_core::{Actor, CoreError, Money};

use crate::error::{DbError, DbResult, ServiceError, ServiceResult};
use crate::repository::store::StoreRepository;
use crate::sequencer;
use crate::uow::UnitOfWork;

const SESSION_COLUMNS: &str = "id, tenant_id, store_id, cashier_id, session_number, status, \
     opening_cash, closing_cash, expected_cash, actual_cash, variance, variance_reason, \
     opened_at, closed_at, approved_by, approved_at, approval_notes, updated_at";

async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StoreSession>> {
    let sql = format!("SELECT {} FROM store_sessions WHERE id = ?1", SESSION_COLUMNS);
    let session = sqlx::query_as::<_, StoreSession>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(session)
}

/// Explains why a guarded session UPDATE matched no row.
async fn refusal(
    conn: &mut SqliteConnection,
    id: &str,
    expected: SessionStatus,
    action: &str,
) -> ServiceError {
    let status: Result<Option<SessionStatus>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM store_sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(conn)
            .await;

    match status {
        Ok(None) => ServiceError::not_found("store session", id),
        Ok(Some(current)) if current == expected => {
            ServiceError::conflict(format!("store session {} was modified concurrently", id))
        }
        Ok(Some(current)) => {
            CoreError::invalid_transition("store session", id, current.as_str(), action).into()
        }
        Err(err) => err.into(),
    }
}

/// Cash taken by completed sales of a session, net of change.
async fn cash_sales(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Money> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(p.amount), 0)
        FROM transaction_payments p
        JOIN transactions t ON t.id = p.transaction_id
        WHERE t.store_session_id = ?1 AND t.status = 'completed' AND p.method = 'cash'
        "#,
    )
    .bind(session_id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from_minor(total))
}

fn warn_failed(id: &str, actor: &Actor, action: &str, err: &ServiceError) {
    warn!(session = id, actor = %actor, action, error = %err, "Session action failed");
}

/// Cashier session lifecycle.
///
/// ## Usage
/// ```rust,ignore
/// let sessions = db.sessions();
/// let session = sessions.open_session(&store.id, Money::from_minor(200_000), &cashier).await?;
/// // ... sales ...
/// let closed = sessions.close_session(&session.id, close, &cashier).await?;
/// if closed.status == SessionStatus::PendingApproval {
///     sessions.approve_session(&closed.id, Some("counted twice"), &manager).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionReconciler {
    pool: SqlitePool,
}

impl SessionReconciler {
    pub fn new(pool: SqlitePool) -> Self {
        SessionReconciler { pool }
    }

    /// Opens a session numbered `SES-{store}-{date}-{seq}` for the cashier.
    ///
    /// ## Errors
    /// - `Conflict` when the cashier already has an open session at the store
    pub async fn open_session(
        &self,
        store_id: &str,
        opening_cash: Money,
        cashier: &Actor,
    ) -> ServiceResult<StoreSession> {
        let result = async {
            validate_amount("opening cash", opening_cash)?;
            let store = StoreRepository::new(self.pool.clone())
                .require(store_id)
                .await?;
            if let Some(open) = self.active_session(cashier.id(), &store.id).await? {
                return Err(ServiceError::conflict(format!(
                    "cashier {} already has open session {}",
                    cashier, open.session_number
                )));
            }

            let id = Uuid::new_v4().to_string();
            let now = Utc::now();
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let date = store.business_date(now);
            let number =
                sequencer::next_number(&mut uow, SequenceKind::Session, &store, date).await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO store_sessions (
                    id, tenant_id, store_id, cashier_id, session_number, status,
                    opening_cash, opened_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                "#,
            )
            .bind(&id)
            .bind(&store.tenant_id)
            .bind(&store.id)
            .bind(cashier.id())
            .bind(&number)
            .bind(SessionStatus::Open)
            .bind(opening_cash)
            .bind(now)
            .execute(uow.conn())
            .await;

            match inserted.map_err(DbError::from) {
                Ok(_) => {}
                Err(DbError::UniqueViolation { .. }) => {
                    return Err(ServiceError::conflict(format!(
                        "cashier {} already has an open session",
                        cashier
                    )));
                }
                Err(err) => return Err(err.into()),
            }
            uow.commit().await?;

            info!(id = %id, number = %number, cashier = %cashier, %opening_cash, "Session opened");
            self.session(&id).await
        }
        .await;

        result.inspect_err(|err| warn_failed(store_id, cashier, "open", err))
    }

    /// Closes an open session and reconciles the drawer.
    ///
    /// Ends `closed` when the count matches and `pending_approval`
    /// otherwise.
    pub async fn close_session(
        &self,
        id: &str,
        close: CloseSession,
        actor: &Actor,
    ) -> ServiceResult<StoreSession> {
        let result = async {
            close.validate()?;
            let variance_reason =
                normalize_note("variance reason", close.variance_reason.as_deref())?;
            let now = Utc::now();

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let claimed = sqlx::query(
                "UPDATE store_sessions SET closed_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = ?3",
            )
            .bind(now)
            .bind(id)
            .bind(SessionStatus::Open)
            .execute(uow.conn())
            .await?;
            if claimed.rows_affected() == 0 {
                return Err(refusal(uow.conn(), id, SessionStatus::Open, "close").await);
            }

            let opening_cash: Money =
                sqlx::query_scalar("SELECT opening_cash FROM store_sessions WHERE id = ?1")
                    .bind(id)
                    .fetch_one(uow.conn())
                    .await?;
            let cash_sales = cash_sales(uow.conn(), id).await?;
            let reconciliation = reconcile(opening_cash, cash_sales, close.actual_cash);

            sqlx::query(
                r#"
                UPDATE store_sessions
                SET status = ?1, closing_cash = ?2, expected_cash = ?3, actual_cash = ?4,
                    variance = ?5, variance_reason = ?6
                WHERE id = ?7
                "#,
            )
            .bind(reconciliation.status)
            .bind(close.closing_cash.unwrap_or(close.actual_cash))
            .bind(reconciliation.expected_cash)
            .bind(close.actual_cash)
            .bind(reconciliation.variance)
            .bind(&variance_reason)
            .bind(id)
            .execute(uow.conn())
            .await?;
            uow.commit().await?;

            info!(
                id,
                actor = %actor,
                expected = %reconciliation.expected_cash,
                actual = %close.actual_cash,
                variance = %reconciliation.variance,
                status = %reconciliation.status,
                "Session closed"
            );
            self.session(id).await
        }
        .await;

        result.inspect_err(|err| warn_failed(id, actor, "close", err))
    }

    /// Signs off a session whose drawer did not match.
    pub async fn approve_session(
        &self,
        id: &str,
        notes: Option<&str>,
        actor: &Actor,
    ) -> ServiceResult<StoreSession> {
        let result = async {
            let notes = normalize_note("approval notes", notes)?;
            let now = Utc::now();

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let approved = sqlx::query(
                r#"
                UPDATE store_sessions
                SET status = ?1, approved_by = ?2, approved_at = ?3, approval_notes = ?4,
                    updated_at = ?3
                WHERE id = ?5 AND status = ?6
                "#,
            )
            .bind(SessionStatus::Approved)
            .bind(actor.id())
            .bind(now)
            .bind(&notes)
            .bind(id)
            .bind(SessionStatus::PendingApproval)
            .execute(uow.conn())
            .await?;
            if approved.rows_affected() == 0 {
                return Err(
                    refusal(uow.conn(), id, SessionStatus::PendingApproval, "approve").await,
                );
            }
            uow.commit().await?;

            info!(id, actor = %actor, "Session approved");
            self.session(id).await
        }
        .await;

        result.inspect_err(|err| warn_failed(id, actor, "approve", err))
    }

    /// The open session of a cashier at a store, if any.
    pub async fn active_session(
        &self,
        cashier_id: &str,
        store_id: &str,
    ) -> ServiceResult<Option<StoreSession>> {
        let sql = format!(
            "SELECT {} FROM store_sessions WHERE cashier_id = ?1 AND store_id = ?2 AND status = 'open'",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, StoreSession>(&sql)
            .bind(cashier_id)
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    pub async fn session(&self, id: &str) -> ServiceResult<StoreSession> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("store session", id))
    }

    /// Sessions of a store, newest first, optionally by status.
    pub async fn list_sessions(
        &self,
        store_id: &str,
        status: Option<SessionStatus>,
    ) -> ServiceResult<Vec<StoreSession>> {
        let sql = format!(
            "SELECT {} FROM store_sessions WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY opened_at DESC",
            SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, StoreSession>(&sql)
            .bind(store_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    /// Sale counts and takings of a session.
    pub async fn summary(&self, id: &str) -> ServiceResult<SessionSummary> {
        let mut conn = self.pool.acquire().await?;
        if fetch(&mut conn, id).await?.is_none() {
            return Err(ServiceError::not_found("store session", id));
        }

        let (transaction_count, voided_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'voided' THEN 1 ELSE 0 END), 0)
            FROM transactions
            WHERE store_session_id = ?1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        let non_cash: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(p.amount), 0)
            FROM transaction_payments p
            JOIN transactions t ON t.id = p.transaction_id
            WHERE t.store_session_id = ?1 AND t.status = 'completed' AND p.method <> 'cash'
            "#,
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(SessionSummary {
            session_id: id.to_string(),
            transaction_count,
            voided_count,
            cash_total: cash_sales(&mut conn, id).await?,
            non_cash_total: Money::from_minor(non_cash),
        })
    }
}
