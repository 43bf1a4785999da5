//! Derived analytical relations
//!
//! Builds the customer-purchases view, the user-full-data table, and the RFM
//! base table from the staged WooCommerce tables. Every relation is a
//! deterministic function of the current staging tables and is rebuilt wholly
//! on each run; a derived relation exists only when its source group was
//! imported complete.

use chrono::NaiveDate;
use rusqlite::params;
use tracing::info;

use crate::error::Result;
use crate::schema::{customer_purchases, rfm_data, user_full_data};
use crate::store::StagingStore;

/// Order statuses that count toward RFM metrics. Refunded and cancelled
/// orders would distort monetary totals.
const QUALIFYING_STATUSES: &str = "('wc-completed', 'wc-processing')";

/// Builds derived relations from the staged base tables
pub struct DerivedViewBuilder<'a> {
    store: &'a StagingStore,
}

impl<'a> DerivedViewBuilder<'a> {
    /// Create a builder reading from and writing into `store`
    #[must_use]
    pub const fn new(store: &'a StagingStore) -> Self {
        Self { store }
    }

    /// Create the customer purchases view: one row per (customer, order),
    /// joining user identity fields with order totals and status.
    pub fn build_customer_purchases(&self) -> Result<u64> {
        let view = customer_purchases::VIEW;
        let sql = format!(
            "DROP VIEW IF EXISTS \"{view}\";
             CREATE VIEW \"{view}\" AS
             SELECT
                 cl.user_id            AS user_id,
                 COALESCE(u.display_name, cl.first_name || ' ' || cl.last_name) AS user_name,
                 COALESCE(u.user_email, cl.email) AS email,
                 pm.meta_value         AS phone,
                 o.order_id            AS order_id,
                 o.date_created        AS order_date,
                 o.total_sales         AS order_total,
                 o.status              AS order_status
             FROM wc_order_stats o
             JOIN wc_customer_lookup cl ON cl.customer_id = o.customer_id
             LEFT JOIN users u ON u.ID = cl.user_id
             LEFT JOIN usermeta pm
                 ON pm.user_id = cl.user_id AND pm.meta_key = 'billing_phone'
             WHERE cl.user_id IS NOT NULL;"
        );
        self.store.execute_batch(&sql)?;

        let count = self.store.row_count(view)?;
        info!(view, rows = count, "Customer purchases view created");
        Ok(count)
    }

    /// Create the user full data table: one row per customer merging profile,
    /// contact, and meta fields.
    pub fn build_user_full_data(&self) -> Result<u64> {
        let table = user_full_data::TABLE;
        let sql = format!(
            "DROP TABLE IF EXISTS \"{table}\";
             CREATE TABLE \"{table}\" AS
             SELECT
                 u.ID              AS user_id,
                 u.user_login      AS user_login,
                 u.display_name    AS display_name,
                 u.user_email      AS email,
                 u.user_registered AS registered_at,
                 MAX(CASE WHEN m.meta_key = 'first_name' THEN m.meta_value END)        AS first_name,
                 MAX(CASE WHEN m.meta_key = 'last_name' THEN m.meta_value END)         AS last_name,
                 MAX(CASE WHEN m.meta_key = 'billing_phone' THEN m.meta_value END)     AS billing_phone,
                 MAX(CASE WHEN m.meta_key = 'billing_address_1' THEN m.meta_value END) AS billing_address,
                 MAX(CASE WHEN m.meta_key = 'billing_city' THEN m.meta_value END)      AS billing_city,
                 MAX(CASE WHEN m.meta_key = 'billing_postcode' THEN m.meta_value END)  AS billing_postcode,
                 MAX(CASE WHEN m.meta_key = 'billing_country' THEN m.meta_value END)   AS billing_country
             FROM users u
             LEFT JOIN usermeta m ON m.user_id = u.ID
             GROUP BY u.ID;"
        );
        self.store.execute_batch(&sql)?;

        let count = self.store.row_count(table)?;
        info!(table, rows = count, "User full data table created");
        Ok(count)
    }

    /// Create the RFM base table: one row per customer with recency,
    /// frequency, and monetary raw metrics.
    ///
    /// With a cutoff date, only orders up to that date qualify and recency is
    /// measured from the cutoff instead of from now. Customers with zero
    /// qualifying orders are excluded.
    pub fn build_rfm_base(&self, cutoff: Option<NaiveDate>) -> Result<u64> {
        let table = rfm_data::TABLE;
        self.store
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;

        let (date_filter, reference_date) = match cutoff {
            Some(_) => (
                "AND date(o.date_created) <= date(?1)",
                "date(?1)".to_string(),
            ),
            None => ("", "date('now')".to_string()),
        };

        let sql = format!(
            "CREATE TABLE \"{table}\" AS
             WITH qualifying AS (
                 SELECT o.customer_id, o.order_id, o.date_created, o.total_sales
                 FROM wc_order_stats o
                 WHERE o.status IN {QUALIFYING_STATUSES} {date_filter}
             )
             SELECT
                 cl.user_id AS user_id,
                 CAST(julianday({reference_date}) - julianday(date(MAX(q.date_created))) AS INTEGER)
                     AS recency_days,
                 COUNT(q.order_id)  AS total_orders,
                 SUM(q.total_sales) AS total_spent,
                 (SELECT q2.total_sales
                  FROM qualifying q2
                  WHERE q2.customer_id = q.customer_id
                  ORDER BY q2.date_created DESC, q2.order_id DESC
                  LIMIT 1)          AS last_order_amount,
                 MAX(q.date_created) AS last_order_date
             FROM qualifying q
             JOIN wc_customer_lookup cl ON cl.customer_id = q.customer_id
             WHERE cl.user_id IS NOT NULL
             GROUP BY cl.user_id;"
        );

        let conn = self.store.conn()?;
        match cutoff {
            Some(date) => {
                conn.execute(&sql, params![date.format("%Y-%m-%d").to_string()])?;
            }
            None => {
                conn.execute(&sql, [])?;
            }
        }
        drop(conn);

        let count = self.store.row_count(table)?;
        info!(table, rows = count, cutoff = ?cutoff, "RFM base table created");
        Ok(count)
    }
}
