//! Database service for billcraft-api.

use crate::models::{
    Client, CreateClient, CreateInvoice, CreateInvoiceItem, Invoice, InvoiceItem, InvoiceTotals,
    ListInvoicesFilter, Subscriber, UpdateClient, UpdateInvoice,
};
use crate::numbering;
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billcraft-api"))]
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
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
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
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    /// Create a new client.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client_id = Uuid::new_v4();
        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, user_id, name, email, phone, address, city, state, zip, country)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING client_id, user_id, name, email, phone, address, city, state, zip, country,
                created_utc, updated_utc
            "#,
        )
        .bind(client_id)
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip)
        .bind(&input.country)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e)))?;

        timer.observe_duration();

        info!(client_id = %client.client_id, "Client created");

        Ok(client)
    }

    /// Get a client by ID.
    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn get_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, name, email, phone, address, city, state, zip, country,
                created_utc, updated_utc
            FROM clients
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// List a user's clients, ordered by name.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, name, email, phone, address, city, state, zip, country,
                created_utc, updated_utc
            FROM clients
            WHERE user_id = $1
            ORDER BY name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    /// Update a client.
    #[instrument(skip(self, input), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn update_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = COALESCE($3, name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                city = COALESCE($7, city),
                state = COALESCE($8, state),
                zip = COALESCE($9, zip),
                country = COALESCE($10, country),
                updated_utc = NOW()
            WHERE user_id = $1 AND client_id = $2
            RETURNING client_id, user_id, name, email, phone, address, city, state, zip, country,
                created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip)
        .bind(&input.country)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// Delete a client. Invoices referencing it keep their rows with the
    /// reference cleared.
    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn delete_client(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM clients
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete client: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    /// Count a user's clients, for plan gating.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn count_clients(&self, user_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_clients"])
            .start_timer();

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM clients WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count clients: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Invoice Numbering
    // -------------------------------------------------------------------------

    /// Most recently created invoice number for a user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn latest_invoice_number(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["latest_invoice_number"])
            .start_timer();

        let number: Option<String> = sqlx::query_scalar(
            r#"
            SELECT invoice_number FROM invoices
            WHERE user_id = $1
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read latest invoice number: {}", e))
        })?;

        timer.observe_duration();

        Ok(number)
    }

    /// Allocate the next invoice number for a user.
    ///
    /// The per-user/per-month counter row is upserted in a single atomic
    /// statement, so concurrent creators serialize on the row and receive
    /// distinct sequences. The first allocation of a month seeds the row
    /// from the user's most recent invoice number, which also carries
    /// sequences forward from data that predates the counter table.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn allocate_invoice_number(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<String, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["allocate_invoice_number"])
            .start_timer();

        let period = numbering::period_key(today);
        let previous = self.latest_invoice_number(user_id).await?;
        let seed = numbering::seed_sequence(previous.as_deref(), &period);

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_counters (user_id, period, seq)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, period) DO UPDATE SET seq = invoice_counters.seq + 1
            RETURNING seq
            "#,
        )
        .bind(user_id)
        .bind(&period)
        .bind(seed)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
        })?;

        timer.observe_duration();

        Ok(numbering::format_number(&period, seq))
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create an invoice and its line items.
    ///
    /// Totals are computed from the submitted items; item amounts are
    /// derived from quantity × rate. If number allocation fails because the
    /// store read errors, creation proceeds with the timestamp fallback
    /// rather than blocking.
    #[instrument(skip(self, input, items), fields(user_id = %input.user_id))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let today = input.issue_date.unwrap_or_else(|| Utc::now().date_naive());
        let invoice_number = match self.allocate_invoice_number(input.user_id, today).await {
            Ok(number) => number,
            Err(e) => {
                warn!(error = %e, "Invoice number allocation failed, using timestamp fallback");
                numbering::fallback_number(Utc::now())
            }
        };

        let totals = InvoiceTotals::compute(items, input.tax_rate);

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, user_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_rate, tax_amount, total, notes, terms
            )
            VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING invoice_id, user_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_rate, tax_amount, total, notes, terms,
                sent_at, paid_at, created_utc, updated_utc
            "#,
        )
        .bind(invoice_id)
        .bind(input.user_id)
        .bind(input.client_id)
        .bind(&invoice_number)
        .bind(&input.currency)
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(totals.subtotal)
        .bind(totals.tax_rate)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .bind(&input.notes)
        .bind(&input.terms)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Invoice number '{}' already exists",
                    invoice_number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        let stored_items = Self::insert_items(&mut tx, invoice.invoice_id, items).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();

        INVOICES_TOTAL.with_label_values(&["draft"]).inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[invoice.currency.as_str()])
            .inc_by(totals.total.to_f64().unwrap_or(0.0));

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Invoice created"
        );

        Ok((invoice, stored_items))
    }

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, user_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_rate, tax_amount, total, notes, terms,
                sent_at, paid_at, created_utc, updated_utc
            FROM invoices
            WHERE user_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get the line items of an invoice, in display order.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT item_id, invoice_id, description, quantity, unit_rate, amount, sort_order,
                created_utc
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY sort_order, created_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
        })?;

        timer.observe_duration();

        Ok(items)
    }

    /// List a user's invoices.
    #[instrument(skip(self, filter), fields(user_id = %user_id))]
    pub async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status = filter.status.map(|s| s.as_str());

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, user_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_rate, tax_amount, total, notes, terms,
                sent_at, paid_at, created_utc, updated_utc
            FROM invoices
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::uuid IS NULL OR invoice_id > $4)
            ORDER BY invoice_id
            LIMIT $5
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(filter.client_id)
        .bind(filter.page_token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Update an invoice, recomputing totals.
    ///
    /// When `items` is given the stored line items are replaced; otherwise
    /// the existing items feed the recomputation. The invoice number is
    /// never touched.
    #[instrument(skip(self, input, items), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
        items: Option<&[CreateInvoiceItem]>,
    ) -> Result<Option<(Invoice, Vec<InvoiceItem>)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, user_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_rate, tax_amount, total, notes, terms,
                sent_at, paid_at, created_utc, updated_utc
            FROM invoices
            WHERE user_id = $1 AND invoice_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let existing = match existing {
            Some(invoice) => invoice,
            None => return Ok(None),
        };

        // Effective inputs for the totals recomputation.
        let tax_rate = input.tax_rate.unwrap_or(existing.tax_rate);
        let item_inputs: Vec<CreateInvoiceItem> = match items {
            Some(list) => list.to_vec(),
            None => {
                let stored = sqlx::query_as::<_, InvoiceItem>(
                    r#"
                    SELECT item_id, invoice_id, description, quantity, unit_rate, amount,
                        sort_order, created_utc
                    FROM invoice_items
                    WHERE invoice_id = $1
                    ORDER BY sort_order, created_utc
                    "#,
                )
                .bind(invoice_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
                })?;

                stored
                    .into_iter()
                    .map(|item| CreateInvoiceItem {
                        description: item.description,
                        quantity: item.quantity,
                        unit_rate: item.unit_rate,
                    })
                    .collect()
            }
        };

        let totals = InvoiceTotals::compute(&item_inputs, tax_rate);
        let status = input.status.map(|s| s.as_str());

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET client_id = COALESCE($3::uuid, client_id),
                status = COALESCE($4::text, status),
                currency = COALESCE($5::text, currency),
                issue_date = COALESCE($6::date, issue_date),
                due_date = COALESCE($7::date, due_date),
                tax_rate = $8,
                subtotal = $9,
                tax_amount = $10,
                total = $11,
                notes = COALESCE($12::text, notes),
                terms = COALESCE($13::text, terms),
                sent_at = CASE WHEN $4::text = 'sent' AND sent_at IS NULL THEN NOW() ELSE sent_at END,
                paid_at = CASE WHEN $4::text = 'paid' AND paid_at IS NULL THEN NOW() ELSE paid_at END,
                updated_utc = NOW()
            WHERE user_id = $1 AND invoice_id = $2
            RETURNING invoice_id, user_id, client_id, invoice_number, status, currency,
                issue_date, due_date, subtotal, tax_rate, tax_amount, total, notes, terms,
                sent_at, paid_at, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .bind(input.client_id)
        .bind(status)
        .bind(&input.currency)
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(totals.tax_rate)
        .bind(totals.subtotal)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .bind(&input.notes)
        .bind(&input.terms)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        let stored_items = if let Some(list) = items {
            sqlx::query(
                r#"
                DELETE FROM invoice_items WHERE invoice_id = $1
                "#,
            )
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to replace invoice items: {}", e))
            })?;

            Self::insert_items(&mut tx, invoice_id, list).await?
        } else {
            sqlx::query_as::<_, InvoiceItem>(
                r#"
                SELECT item_id, invoice_id, description, quantity, unit_rate, amount, sort_order,
                    created_utc
                FROM invoice_items
                WHERE invoice_id = $1
                ORDER BY sort_order, created_utc
                "#,
            )
            .bind(invoice_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
            })?
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice update: {}", e))
        })?;

        timer.observe_duration();

        if let Some(new_status) = status {
            if new_status != existing.status {
                INVOICES_TOTAL.with_label_values(&[new_status]).inc();
            }
        }

        Ok(Some((invoice, stored_items)))
    }

    /// Delete an invoice. Line items cascade.
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM invoices
            WHERE user_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    /// Count a user's invoices created at or after `since`, for plan gating.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn count_invoices_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_invoices_since"])
            .start_timer();

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoices WHERE user_id = $1 AND created_utc >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    async fn insert_items(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        invoice_id: Uuid,
        items: &[CreateInvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let mut stored = Vec::with_capacity(items.len());

        for (position, item) in items.iter().enumerate() {
            let amount = InvoiceTotals::line_amount(item.quantity, item.unit_rate);
            let row = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (
                    item_id, invoice_id, description, quantity, unit_rate, amount, sort_order
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING item_id, invoice_id, description, quantity, unit_rate, amount,
                    sort_order, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_rate)
            .bind(amount)
            .bind(position as i32)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert line item: {}", e))
            })?;

            stored.push(row);
        }

        Ok(stored)
    }

    // -------------------------------------------------------------------------
    // Subscriber Operations
    // -------------------------------------------------------------------------

    /// Get a user's subscriber row, when one exists.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_subscriber(&self, user_id: Uuid) -> Result<Option<Subscriber>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscriber"])
            .start_timer();

        let subscriber = sqlx::query_as::<_, Subscriber>(
            r#"
            SELECT subscriber_id, user_id, email, stripe_customer_id, subscribed,
                subscription_tier, subscription_end, created_utc, updated_utc
            FROM subscribers
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscriber: {}", e)))?;

        timer.observe_duration();

        Ok(subscriber)
    }

    /// Record the payment provider customer id for a user, creating the
    /// subscriber row when absent.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn upsert_stripe_customer(
        &self,
        user_id: Uuid,
        email: &str,
        customer_id: &str,
    ) -> Result<Subscriber, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_stripe_customer"])
            .start_timer();

        let subscriber = sqlx::query_as::<_, Subscriber>(
            r#"
            INSERT INTO subscribers (subscriber_id, user_id, email, stripe_customer_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
                SET email = EXCLUDED.email,
                    stripe_customer_id = EXCLUDED.stripe_customer_id,
                    updated_utc = NOW()
            RETURNING subscriber_id, user_id, email, stripe_customer_id, subscribed,
                subscription_tier, subscription_end, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(email)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to upsert subscriber: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscriber)
    }

    /// Apply a subscription change reported by the payment provider,
    /// addressed by customer id. Returns the number of rows touched; zero
    /// means no subscriber matched the customer.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn update_subscription_by_customer(
        &self,
        customer_id: &str,
        subscribed: bool,
        tier: &str,
        subscription_end: Option<DateTime<Utc>>,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_subscription_by_customer"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET subscribed = $2,
                subscription_tier = $3,
                subscription_end = $4,
                updated_utc = NOW()
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(subscribed)
        .bind(tier)
        .bind(subscription_end)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update subscription: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }
}
