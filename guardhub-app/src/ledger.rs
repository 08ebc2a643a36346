//! In-memory invoice ledger standing in for the hosted database.
//!
//! Every call is async and takes a short simulated round trip so the
//! console shows the same loading/success/error flow a remote store would.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

pub type InvoiceId = u64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub branch_id: String,
    pub customer: String,
    pub amount_cents: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub branch_id: String,
    pub customer: String,
    pub amount_cents: u64,
}

pub struct Ledger {
    invoices: Mutex<Vec<Invoice>>,
    next_id: AtomicU64,
    fail_next: AtomicBool,
    latency: Duration,
}

impl Ledger {
    pub fn new(latency: Duration) -> Self {
        Self {
            invoices: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_next: AtomicBool::new(false),
            latency,
        }
    }

    /// Make the next write fail as if the backend were unreachable.
    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn create(&self, new: NewInvoice) -> anyhow::Result<Invoice> {
        self.round_trip().await?;
        if new.customer.trim().is_empty() {
            bail!("invalid-argument: customer is required");
        }
        let invoice = Invoice {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            branch_id: new.branch_id,
            customer: new.customer.trim().to_string(),
            amount_cents: new.amount_cents,
            created_at: Utc::now(),
        };
        self.invoices.lock().push(invoice.clone());
        Ok(invoice)
    }

    pub async fn delete(&self, id: InvoiceId) -> anyhow::Result<Invoice> {
        self.round_trip().await?;
        let mut invoices = self.invoices.lock();
        let idx = invoices
            .iter()
            .position(|inv| inv.id == id)
            .ok_or_else(|| anyhow!("not-found: invoice {id}"))?;
        Ok(invoices.remove(idx))
    }

    /// Invoices of `branch_id`, oldest first.
    pub async fn list(&self, branch_id: &str) -> anyhow::Result<Vec<Invoice>> {
        tokio::time::sleep(self.latency).await;
        Ok(self
            .invoices
            .lock()
            .iter()
            .filter(|inv| inv.branch_id == branch_id)
            .cloned()
            .collect())
    }

    async fn round_trip(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.latency).await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("unavailable: ledger backend offline");
        }
        Ok(())
    }
}

/// Parse `"1200"`, `"1200.5"` or `"1200.50"` into cents.
pub fn parse_amount(raw: &str) -> anyhow::Result<u64> {
    let raw = raw.trim();
    let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || frac.len() > 2 || !digits(whole) || !digits(frac) {
        bail!("invalid amount '{raw}'");
    }
    let whole: u64 = whole
        .parse()
        .with_context(|| format!("invalid amount '{raw}'"))?;
    let frac_cents: u64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<u64>().with_context(|| format!("invalid amount '{raw}'"))? * 10,
        _ => frac.parse().with_context(|| format!("invalid amount '{raw}'"))?,
    };
    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac_cents))
        .ok_or_else(|| anyhow!("amount '{raw}' is too large"))
}

pub fn format_amount(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}
