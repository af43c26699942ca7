//! Database service for bookkeeping-service.

use crate::models::{
    Category, Company, CreateInvoice, CreateInvoiceItem, CreateLabel, CreateReceiver, Invoice,
    InvoiceItem, InvoiceReceiver, InvoiceStatus, InvoiceTotals, Tag,
};
use crate::services::metrics::DB_QUERY_DURATION;
use anyhow::anyhow;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, user_id, title, status, currency, due_date, \
     category_id, company_id, receiver_id, created_utc";

const ITEM_COLUMNS: &str = "item_id, invoice_id, user_id, description, quantity, unit_price, \
     amount, target_currency, target_amount, fx_rate_used, target_amount_overridden, \
     created_utc, updated_utc";

const RECEIVER_COLUMNS: &str =
    "receiver_id, user_id, name, is_organization, alternate_names, created_utc";

/// Labels an invoice may reference. Each maps to a fixed table and key.
#[derive(Debug, Clone, Copy)]
enum LabelTable {
    Category,
    Company,
    Receiver,
    Tag,
}

impl LabelTable {
    fn table_and_key(&self) -> (&'static str, &'static str) {
        match self {
            LabelTable::Category => ("categories", "category_id"),
            LabelTable::Company => ("companies", "company_id"),
            LabelTable::Receiver => ("invoice_receivers", "receiver_id"),
            LabelTable::Tag => ("tags", "tag_id"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LabelTable::Category => "Category",
            LabelTable::Company => "Company",
            LabelTable::Receiver => "Receiver",
            LabelTable::Tag => "Tag",
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "bookkeeping-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Receiver Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_receiver(&self, input: &CreateReceiver) -> Result<InvoiceReceiver, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_receiver"])
            .start_timer();

        let receiver = sqlx::query_as::<_, InvoiceReceiver>(&format!(
            r#"
            INSERT INTO invoice_receivers (receiver_id, user_id, name, is_organization, alternate_names)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECEIVER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(input.is_organization)
        .bind(&input.alternate_names)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to create receiver: {}", e)))?;

        timer.observe_duration();

        info!(receiver_id = %receiver.receiver_id, "Receiver created");

        Ok(receiver)
    }

    #[instrument(skip(self), fields(user_id = %user_id, receiver_id = %receiver_id))]
    pub async fn get_receiver(
        &self,
        user_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Option<InvoiceReceiver>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_receiver"])
            .start_timer();

        let receiver = sqlx::query_as::<_, InvoiceReceiver>(&format!(
            r#"
            SELECT {RECEIVER_COLUMNS}
            FROM invoice_receivers
            WHERE user_id = $1 AND receiver_id = $2 AND deleted_utc IS NULL
            "#
        ))
        .bind(user_id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to get receiver: {}", e)))?;

        timer.observe_duration();

        Ok(receiver)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_receivers(&self, user_id: Uuid) -> Result<Vec<InvoiceReceiver>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_receivers"])
            .start_timer();

        let receivers = sqlx::query_as::<_, InvoiceReceiver>(&format!(
            r#"
            SELECT {RECEIVER_COLUMNS}
            FROM invoice_receivers
            WHERE user_id = $1 AND deleted_utc IS NULL
            ORDER BY name, receiver_id
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to list receivers: {}", e)))?;

        timer.observe_duration();

        Ok(receivers)
    }

    /// Soft delete. Invoices keep pointing at the row; reports show them as
    /// having no receiver.
    #[instrument(skip(self), fields(user_id = %user_id, receiver_id = %receiver_id))]
    pub async fn delete_receiver(&self, user_id: Uuid, receiver_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_receiver"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoice_receivers
            SET deleted_utc = NOW()
            WHERE user_id = $1 AND receiver_id = $2 AND deleted_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to delete receiver: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Label Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_category(&self, input: &CreateLabel) -> Result<Category, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_category"])
            .start_timer();

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (category_id, user_id, name, color)
            VALUES ($1, $2, $3, $4)
            RETURNING category_id, user_id, name, color, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.color)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to create category: {}", e)))?;

        timer.observe_duration();

        Ok(category)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_company(&self, input: &CreateLabel) -> Result<Company, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_company"])
            .start_timer();

        let company = sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (company_id, user_id, name)
            VALUES ($1, $2, $3)
            RETURNING company_id, user_id, name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to create company: {}", e)))?;

        timer.observe_duration();

        Ok(company)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_tag(&self, input: &CreateLabel) -> Result<Tag, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tag"])
            .start_timer();

        let tag = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (tag_id, user_id, name, color)
            VALUES ($1, $2, $3, $4)
            RETURNING tag_id, user_id, name, color, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.color)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to create tag: {}", e)))?;

        timer.observe_duration();

        Ok(tag)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create an invoice and its tag links in one transaction. Every
    /// referenced label must belong to the same user.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow!("Failed to begin transaction: {}", e))
        })?;

        let references = [
            (LabelTable::Category, input.category_id),
            (LabelTable::Company, input.company_id),
            (LabelTable::Receiver, input.receiver_id),
        ];
        for (table, id) in references {
            if let Some(id) = id {
                ensure_owned(&mut tx, table, input.user_id, id).await?;
            }
        }
        for tag_id in &input.tag_ids {
            ensure_owned(&mut tx, LabelTable::Tag, input.user_id, *tag_id).await?;
        }

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (
                invoice_id, user_id, title, status, currency, due_date,
                category_id, company_id, receiver_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.title)
        .bind(input.status.as_str())
        .bind(&input.currency)
        .bind(input.due_date)
        .bind(input.category_id)
        .bind(input.company_id)
        .bind(input.receiver_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to create invoice: {}", e)))?;

        if !input.tag_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO invoice_tags (invoice_id, tag_id)
                SELECT $1, UNNEST($2::uuid[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(invoice.invoice_id)
            .bind(&input.tag_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow!("Failed to tag invoice: {}", e)))?;
        }

        tx.commit().await.map_err(|e| {
            AppError::TransactionFailed(anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, tags = input.tag_ids.len(), "Invoice created");

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE user_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL
            "#
        ))
        .bind(user_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice_tag_ids(&self, invoice_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_tag_ids"])
            .start_timer();

        let tag_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT tag_id FROM invoice_tags WHERE invoice_id = $1 ORDER BY tag_id",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to get invoice tags: {}", e)))?;

        timer.observe_duration();

        Ok(tag_ids)
    }

    /// Display and normalized totals, summed from the items at read time.
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn get_invoice_totals(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceTotals, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_totals"])
            .start_timer();

        let (amount, target_total) = sqlx::query_as::<_, (Decimal, Decimal)>(
            r#"
            SELECT COALESCE(SUM(amount), 0), COALESCE(SUM(target_amount), 0)
            FROM invoice_items
            WHERE user_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to sum invoice: {}", e)))?;

        timer.observe_duration();

        Ok(InvoiceTotals {
            amount,
            target_total,
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id, status = status.as_str()))]
    pub async fn update_invoice_status(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice_status"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status = $3
            WHERE user_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(invoice_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to update invoice status: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET deleted_utc = NOW()
            WHERE user_id = $1 AND invoice_id = $2 AND deleted_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Line Item Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id, invoice_id = %input.invoice_id))]
    pub async fn insert_item(&self, input: &CreateInvoiceItem) -> Result<InvoiceItem, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_item"])
            .start_timer();

        let item = sqlx::query_as::<_, InvoiceItem>(&format!(
            r#"
            INSERT INTO invoice_items (
                item_id, invoice_id, user_id, description, quantity, unit_price,
                amount, target_currency, target_amount, fx_rate_used, target_amount_overridden
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.invoice_id)
        .bind(input.user_id)
        .bind(&input.description)
        .bind(input.quantity)
        .bind(input.unit_price)
        .bind(input.amounts.amount)
        .bind(&input.target_currency)
        .bind(input.amounts.target_amount)
        .bind(input.amounts.fx_rate_used)
        .bind(input.amounts.overridden)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to insert item: {}", e)))?;

        timer.observe_duration();

        info!(
            item_id = %item.item_id,
            amount = %item.amount,
            target_amount = %item.target_amount,
            "Line item added"
        );

        Ok(item)
    }

    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn get_item(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_item"])
            .start_timer();

        let item = sqlx::query_as::<_, InvoiceItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM invoice_items
            WHERE user_id = $1 AND invoice_id = $2 AND item_id = $3
            "#
        ))
        .bind(user_id)
        .bind(invoice_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to get item: {}", e)))?;

        timer.observe_duration();

        Ok(item)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn list_items(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM invoice_items
            WHERE user_id = $1 AND invoice_id = $2
            ORDER BY created_utc, item_id
            "#
        ))
        .bind(user_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to list items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    /// Persist recomputed items. All rows are written in one transaction; an
    /// item that disappeared in the meantime fails the whole batch.
    #[instrument(skip(self, items), fields(user_id = %user_id, count = items.len()))]
    pub async fn save_items(
        &self,
        user_id: Uuid,
        items: &[InvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_items"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut saved = Vec::with_capacity(items.len());
        for item in items {
            let row = sqlx::query_as::<_, InvoiceItem>(&format!(
                r#"
                UPDATE invoice_items
                SET description = $4,
                    quantity = $5,
                    unit_price = $6,
                    amount = $7,
                    target_currency = $8,
                    target_amount = $9,
                    fx_rate_used = $10,
                    target_amount_overridden = $11,
                    updated_utc = NOW()
                WHERE user_id = $1 AND invoice_id = $2 AND item_id = $3
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(user_id)
            .bind(item.invoice_id)
            .bind(item.item_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.amount)
            .bind(&item.target_currency)
            .bind(item.target_amount)
            .bind(item.fx_rate_used)
            .bind(item.target_amount_overridden)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow!("Failed to update item: {}", e)))?
            .ok_or_else(|| AppError::NotFound(anyhow!("Item {} not found", item.item_id)))?;

            saved.push(row);
        }

        tx.commit().await.map_err(|e| {
            AppError::TransactionFailed(anyhow!("Failed to commit item update: {}", e))
        })?;

        timer.observe_duration();

        Ok(saved)
    }
}

/// Fail with `NotFound` unless `id` is a live label owned by `user_id`.
async fn ensure_owned(
    tx: &mut Transaction<'_, Postgres>,
    table: LabelTable,
    user_id: Uuid,
    id: Uuid,
) -> Result<(), AppError> {
    let (name, key) = table.table_and_key();
    let exists = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS (SELECT 1 FROM {name} WHERE {key} = $1 AND user_id = $2 AND deleted_utc IS NULL)"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow!("Failed to check {}: {}", name, e)))?;

    if !exists {
        return Err(AppError::NotFound(anyhow!("{} {} not found", table.label(), id)));
    }
    Ok(())
}
