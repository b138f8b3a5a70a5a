use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SagaId, VariantId};
use domain::{Money, Order, OrderOwner, PaymentMethod, Product, Variant};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::saga_log::validate_records_for_append;
use crate::{
    CatalogStore, OrderQuery, OrderStore, Result, SagaLog, SagaRecord, StoreError, Version,
};

/// PostgreSQL-backed store implementation.
///
/// Stock decrements are single conditional `UPDATE` statements, so two
/// requests racing for the last units can never both succeed.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn insert_variants(
        tx: &mut Transaction<'_, Postgres>,
        product: &Product,
    ) -> Result<()> {
        for (position, variant) in product.variants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO variants (product_id, id, position, attributes, price_cents, stock, on_sale, sale_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(product.id.as_uuid())
            .bind(variant.id.as_uuid())
            .bind(position as i32)
            .bind(serde_json::to_value(&variant.attributes)?)
            .bind(variant.price.cents())
            .bind(i64::from(variant.stock))
            .bind(variant.on_sale)
            .bind(variant.sale_price.map(|p| p.cents()))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Loads products with their variants for the given product rows.
    async fn hydrate_products(&self, rows: Vec<PgRow>) -> Result<Vec<Product>> {
        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            products.push(Product {
                id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                category: row.try_get("category")?,
                subcategory: row.try_get("subcategory")?,
                variants: Vec::new(),
            });
        }
        if products.is_empty() {
            return Ok(products);
        }

        let ids: Vec<Uuid> = products.iter().map(|p| p.id.as_uuid()).collect();
        let variant_rows = sqlx::query(
            r#"
            SELECT product_id, id, attributes, price_cents, stock, on_sale, sale_price_cents
            FROM variants
            WHERE product_id = ANY($1)
            ORDER BY product_id, position ASC
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for row in variant_rows {
            let product_id: Uuid = row.try_get("product_id")?;
            by_product
                .entry(product_id)
                .or_default()
                .push(Self::row_to_variant(&row)?);
        }

        for product in &mut products {
            product.variants = by_product.remove(&product.id.as_uuid()).unwrap_or_default();
        }
        Ok(products)
    }

    fn row_to_variant(row: &PgRow) -> Result<Variant> {
        let attributes: serde_json::Value = row.try_get("attributes")?;
        let sale_price: Option<i64> = row.try_get("sale_price_cents")?;

        Ok(Variant {
            id: VariantId::from_uuid(row.try_get::<Uuid, _>("id")?),
            attributes: serde_json::from_value(attributes)?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: stock_from_column(row.try_get("stock")?)?,
            on_sale: row.try_get("on_sale")?,
            sale_price: sale_price.map(Money::from_cents),
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let method: String = row.try_get("payment_method")?;
        let payment_result: Option<serde_json::Value> = row.try_get("payment_result")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner: serde_json::from_value(row.try_get("owner")?)?,
            lines: serde_json::from_value(row.try_get("lines")?)?,
            shipping_address: serde_json::from_value(row.try_get("shipping_address")?)?,
            payment_method: method
                .parse::<PaymentMethod>()
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            is_paid: row.try_get("is_paid")?,
            paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at")?,
            payment_result: payment_result.map(serde_json::from_value).transpose()?,
            is_seen: row.try_get("is_seen")?,
            is_delivered: row.try_get("is_delivered")?,
            delivered_at: row.try_get::<Option<DateTime<Utc>>, _>("delivered_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_record(row: PgRow) -> Result<SagaRecord> {
        Ok(SagaRecord {
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            version: Version::new(row.try_get("version")?),
            event_type: row.try_get("event_type")?,
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
        })
    }

    async fn current_stock(&self, product_id: ProductId, variant_id: VariantId) -> Result<Option<u32>> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM variants WHERE product_id = $1 AND id = $2")
                .bind(product_id.as_uuid())
                .bind(variant_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        stock.map(stock_from_column).transpose()
    }
}

fn stock_from_column(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidData(format!("stock out of range: {value}")))
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO products (id, name, category, subcategory) VALUES ($1, $2, $3, $4)",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.subcategory)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("products_pkey")
            {
                return StoreError::DuplicateProduct(product.id);
            }
            StoreError::Database(e)
        })?;

        Self::insert_variants(&mut tx, product).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE products SET name = $2, category = $3, subcategory = $4 WHERE id = $1",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.subcategory)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product.id));
        }

        sqlx::query("DELETE FROM variants WHERE product_id = $1")
            .bind(product.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::insert_variants(&mut tx, product).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.get_products(&[id]).await?.into_iter().next())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, name, category, subcategory
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_products(rows).await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name, category, subcategory FROM products ORDER BY name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_products(rows).await
    }

    async fn decrement_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<u32> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE variants
            SET stock = stock - $3
            WHERE product_id = $1 AND id = $2 AND stock >= $3
            RETURNING stock
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(variant_id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return stock_from_column(remaining);
        }

        match self.current_stock(product_id, variant_id).await? {
            Some(available) => {
                metrics::counter!("stock_decrement_rejected_total").increment(1);
                tracing::debug!(%product_id, %variant_id, quantity, available, "conditional decrement rejected");
                Err(StoreError::InsufficientStock {
                    product_id,
                    variant_id,
                    requested: quantity,
                    available,
                })
            }
            None => Err(StoreError::VariantNotFound {
                product_id,
                variant_id,
            }),
        }
    }

    async fn increment_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<u32> {
        let stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE variants
            SET stock = stock + $3
            WHERE product_id = $1 AND id = $2
            RETURNING stock
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(variant_id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        match stock {
            Some(stock) => stock_from_column(stock),
            None => Err(StoreError::VariantNotFound {
                product_id,
                variant_id,
            }),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let guest_phone = match &order.owner {
            OrderOwner::Guest(guest) => Some(guest.phone.as_str()),
            OrderOwner::Registered(_) => None,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, guest_phone, owner, lines, shipping_address, payment_method,
                total_price_cents, is_paid, paid_at, payment_result, is_seen, is_delivered,
                delivered_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.owner.user_id().map(|id| id.as_uuid()))
        .bind(guest_phone)
        .bind(serde_json::to_value(&order.owner)?)
        .bind(serde_json::to_value(&order.lines)?)
        .bind(serde_json::to_value(&order.shipping_address)?)
        .bind(order.payment_method.as_str())
        .bind(order.total_price.cents())
        .bind(order.is_paid)
        .bind(order.paid_at)
        .bind(order.payment_result.as_ref().map(serde_json::to_value).transpose()?)
        .bind(order.is_seen)
        .bind(order.is_delivered)
        .bind(order.delivered_at)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update_order_flags(&self, order: &Order) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET is_paid = $2, paid_at = $3, payment_result = $4, is_seen = $5,
                is_delivered = $6, delivered_at = $7
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.is_paid)
        .bind(order.paid_at)
        .bind(order.payment_result.as_ref().map(serde_json::to_value).transpose()?)
        .bind(order.is_seen)
        .bind(order.is_delivered)
        .bind(order.delivered_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.id));
        }
        Ok(())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = String::from("SELECT * FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.guest_phone.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND guest_phone = ${param_count}"));
        }
        if query.is_seen.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_seen = ${param_count}"));
        }
        if query.is_paid.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_paid = ${param_count}"));
        }
        if query.is_delivered.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_delivered = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_uuid());
        }
        if let Some(phone) = query.guest_phone {
            sqlx_query = sqlx_query.bind(phone);
        }
        if let Some(seen) = query.is_seen {
            sqlx_query = sqlx_query.bind(seen);
        }
        if let Some(paid) = query.is_paid {
            sqlx_query = sqlx_query.bind(paid);
        }
        if let Some(delivered) = query.is_delivered {
            sqlx_query = sqlx_query.bind(delivered);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl SagaLog for PostgresStore {
    async fn append_records(
        &self,
        records: Vec<SagaRecord>,
        expected_version: Version,
    ) -> Result<Version> {
        let saga_id = validate_records_for_append(&records, expected_version)?;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM saga_records WHERE saga_id = $1")
                .bind(saga_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let actual = Version::new(current.unwrap_or(0));
        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                saga_id,
                expected: expected_version,
                actual,
            });
        }

        let mut last_version = expected_version;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO saga_records (saga_id, version, event_type, recorded_at, payload)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.saga_id.as_uuid())
            .bind(record.version.as_i64())
            .bind(&record.event_type)
            .bind(record.recorded_at)
            .bind(&record.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer claimed the same version first
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_saga_version")
                {
                    return StoreError::ConcurrencyConflict {
                        saga_id,
                        expected: expected_version,
                        actual: record.version,
                    };
                }
                StoreError::Database(e)
            })?;

            last_version = record.version;
        }

        tx.commit().await?;
        Ok(last_version)
    }

    async fn load_records(&self, saga_id: SagaId) -> Result<Vec<SagaRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT saga_id, version, event_type, recorded_at, payload
            FROM saga_records
            WHERE saga_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}
