//! Postgres Backend
//!
//! The redemption ledger runs as one transaction per redemption: a
//! conditional `UPDATE ... RETURNING` on the global counter and a
//! conditional upsert on the per-user row. A refused condition rolls the
//! whole transaction back, so the counters never move independently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::catalog::CatalogIndex;
use crate::domain::{
    Coupon, CouponScope, CouponType, CouponUsage, OrderLine, OrderSnapshot, UsageTicket,
};
use crate::error::{CouponError, Result};
use crate::store::{CouponStore, OrderStore, RedemptionLedger};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    kind: String,
    value: Decimal,
    description: Option<String>,
    min_order_amount: Option<Decimal>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    usage_limit: Option<i32>,
    used_count: i32,
    usage_limit_per_user: Option<i32>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_domain(self, scope: CouponScope) -> Result<Coupon> {
        let kind = CouponType::parse(&self.kind).ok_or_else(|| {
            CouponError::StorageUnavailable(format!("unknown coupon type: {}", self.kind))
        })?;
        Ok(Coupon {
            id: self.id,
            code: self.code,
            kind,
            value: self.value,
            description: self.description,
            min_order_amount: self.min_order_amount,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            usage_limit: self.usage_limit.map(|l| l.max(0) as u32),
            used_count: self.used_count.max(0) as u32,
            usage_limit_per_user: self.usage_limit_per_user.map(|l| l.max(0) as u32),
            active: self.active,
            scope,
            created_at: self.created_at,
        })
    }
}

/// Serialization failures and deadlocks are worth retrying; anything else
/// means the store itself is unhealthy.
fn map_db_err(e: sqlx::Error) -> CouponError {
    if let sqlx::Error::Database(db) = &e {
        if let Some(code) = db.code() {
            if code == "40001" || code == "40P01" {
                return CouponError::TransientConflict;
            }
        }
    }
    CouponError::StorageUnavailable(e.to_string())
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_scope(&self, coupon_id: Uuid) -> Result<CouponScope> {
        let tables = [
            "coupon_applicable_products",
            "coupon_applicable_categories",
            "coupon_excluded_products",
            "coupon_excluded_categories",
        ];
        let columns = ["product_id", "category_id", "product_id", "category_id"];
        let mut sets: Vec<HashSet<Uuid>> = Vec::with_capacity(4);
        for (table, column) in tables.iter().zip(columns) {
            let ids: Vec<Uuid> =
                sqlx::query_scalar(&format!("SELECT {column} FROM {table} WHERE coupon_id = $1"))
                    .bind(coupon_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_db_err)?;
            sets.push(ids.into_iter().collect());
        }
        let mut sets = sets.into_iter();
        Ok(CouponScope {
            applicable_products: sets.next().unwrap_or_default(),
            applicable_categories: sets.next().unwrap_or_default(),
            excluded_products: sets.next().unwrap_or_default(),
            excluded_categories: sets.next().unwrap_or_default(),
        })
    }

    pub async fn get_coupon(&self, coupon_id: Uuid) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1")
            .bind(coupon_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        match row {
            Some(row) => {
                let scope = self.load_scope(row.id).await?;
                Ok(Some(row.into_domain(scope)?))
            }
            None => Ok(None),
        }
    }

    pub async fn list_coupons(&self, page: u32, per_page: u32) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(
            "SELECT * FROM coupons ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(per_page as i64)
        .bind(((page.saturating_sub(1)) * per_page) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        let mut coupons = Vec::with_capacity(rows.len());
        for row in rows {
            let scope = self.load_scope(row.id).await?;
            coupons.push(row.into_domain(scope)?);
        }
        Ok(coupons)
    }

    pub async fn create_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        sqlx::query(
            "INSERT INTO coupons (id, code, kind, value, description, min_order_amount, \
             starts_at, ends_at, usage_limit, used_count, usage_limit_per_user, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12)",
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(coupon.kind.to_string())
        .bind(coupon.value)
        .bind(&coupon.description)
        .bind(coupon.min_order_amount)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .bind(coupon.usage_limit.map(|l| l as i32))
        .bind(coupon.usage_limit_per_user.map(|l| l as i32))
        .bind(coupon.active)
        .bind(coupon.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let scope_rows: [(&str, &str, &HashSet<Uuid>); 4] = [
            ("coupon_applicable_products", "product_id", &coupon.scope.applicable_products),
            ("coupon_applicable_categories", "category_id", &coupon.scope.applicable_categories),
            ("coupon_excluded_products", "product_id", &coupon.scope.excluded_products),
            ("coupon_excluded_categories", "category_id", &coupon.scope.excluded_categories),
        ];
        for (table, column, ids) in scope_rows {
            for id in ids {
                sqlx::query(&format!(
                    "INSERT INTO {table} (coupon_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
                ))
                .bind(coupon.id)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_err)?;
            }
        }
        tx.commit().await.map_err(map_db_err)
    }

    pub async fn delete_coupon(&self, coupon_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(coupon_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Per-user usage rows for one coupon, heaviest users first.
    pub async fn list_usages(&self, coupon_id: Uuid) -> Result<Vec<CouponUsage>> {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT user_id, count FROM coupon_usages WHERE coupon_id = $1 ORDER BY count DESC",
        )
        .bind(coupon_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(rows
            .into_iter()
            .map(|(user_id, count)| CouponUsage {
                coupon_id,
                user_id,
                count: count.max(0) as u32,
            })
            .collect())
    }

    pub async fn set_active(&self, coupon_id: Uuid, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE coupons SET active = $2 WHERE id = $1")
            .bind(coupon_id)
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        match row {
            Some(row) => {
                let scope = self.load_scope(row.id).await?;
                Ok(Some(row.into_domain(scope)?))
            }
            None => Ok(None),
        }
    }

    async fn user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> Result<u32> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(count.unwrap_or(0).max(0) as u32)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn order_snapshot(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>> {
        let totals: Option<(Decimal, Decimal)> =
            sqlx::query_as("SELECT total, shipping_fee FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;
        let Some((total, shipping_fee)) = totals else {
            return Ok(None);
        };

        let lines: Vec<(Uuid, Option<Uuid>, Decimal)> = sqlx::query_as(
            "SELECT product_id, category_id, line_amount FROM order_items WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(Some(OrderSnapshot {
            order_id,
            lines: lines
                .into_iter()
                .map(|(product_id, category_id, line_amount)| OrderLine {
                    product_id,
                    category_id,
                    line_amount,
                })
                .collect(),
            total,
            shipping_fee,
        }))
    }
}

#[async_trait]
impl RedemptionLedger for PgStore {
    async fn try_redeem(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<UsageTicket> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // Global counter: increment only while below the cap. The row lock
        // taken here serializes concurrent redemptions of the same coupon.
        let updated: Option<(i32, Option<i32>)> = sqlx::query_as(
            "UPDATE coupons SET used_count = used_count + 1 \
             WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit) \
             RETURNING used_count, usage_limit_per_user",
        )
        .bind(coupon_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let per_user_limit = match updated {
            Some((_, limit)) => limit,
            None => {
                let exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT id FROM coupons WHERE id = $1")
                        .bind(coupon_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(map_db_err)?;
                return Err(match exists {
                    Some(_) => CouponError::GlobalLimitReached,
                    None => CouponError::CouponNotFound,
                });
            }
        };

        if per_user_limit == Some(0) {
            return Err(CouponError::PerUserLimitReached);
        }

        // Per-user row: first redemption inserts count 1, later ones
        // increment only while below the per-user cap. A refused condition
        // returns no row, and dropping the transaction rolls the global
        // increment back with it.
        let per_user_count: Option<i32> = sqlx::query_scalar(
            "INSERT INTO coupon_usages (coupon_id, user_id, count) VALUES ($1, $2, 1) \
             ON CONFLICT (coupon_id, user_id) DO UPDATE \
             SET count = coupon_usages.count + 1 \
             WHERE $3::INT IS NULL OR coupon_usages.count < $3 \
             RETURNING count",
        )
        .bind(coupon_id)
        .bind(user_id)
        .bind(per_user_limit)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if per_user_count.is_none() {
            return Err(CouponError::PerUserLimitReached);
        }

        let ticket = UsageTicket::new();
        sqlx::query(
            "INSERT INTO coupon_redemptions (id, coupon_id, user_id, order_id, created_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(ticket.0)
        .bind(coupon_id)
        .bind(user_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(ticket)
    }

    async fn release(&self, ticket: UsageTicket) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let row: Option<(Uuid, Uuid)> = sqlx::query_as(
            "DELETE FROM coupon_redemptions WHERE id = $1 RETURNING coupon_id, user_id",
        )
        .bind(ticket.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;
        let Some((coupon_id, user_id)) = row else {
            return Err(CouponError::TicketNotFound);
        };

        sqlx::query("UPDATE coupons SET used_count = used_count - 1 WHERE id = $1 AND used_count > 0")
            .bind(coupon_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        sqlx::query(
            "UPDATE coupon_usages SET count = count - 1 \
             WHERE coupon_id = $1 AND user_id = $2 AND count > 0",
        )
        .bind(coupon_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)
    }

    async fn find_ticket(&self, order_id: Uuid, coupon_id: Uuid) -> Result<Option<UsageTicket>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM coupon_redemptions WHERE order_id = $1 AND coupon_id = $2 LIMIT 1",
        )
        .bind(order_id)
        .bind(coupon_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(id.map(UsageTicket))
    }
}

#[async_trait]
impl CatalogIndex for PgStore {
    async fn category_ancestors(&self, category_id: Uuid) -> Result<Vec<Uuid>> {
        let chain: Vec<Uuid> = sqlx::query_scalar(
            "WITH RECURSIVE chain AS ( \
                 SELECT id, parent_id, 1 AS depth FROM categories WHERE id = $1 \
                 UNION ALL \
                 SELECT c.id, c.parent_id, chain.depth + 1 \
                 FROM categories c JOIN chain ON c.id = chain.parent_id \
                 WHERE chain.depth < 64 \
             ) SELECT id FROM chain ORDER BY depth",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        if chain.is_empty() {
            // unknown category resolves to itself
            Ok(vec![category_id])
        } else {
            Ok(chain)
        }
    }
}
