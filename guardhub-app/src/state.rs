//! Host application state.
//!
//! `AppState` owns the core services plus the hooks the console drives. It
//! is built once in `main` and shared with the command handlers.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use guardhub_core::bus::payload_from_value;
use guardhub_core::{
    AppEvent, MutationHook, MutationOptions, QueryHook, QueryOptions, QueryWatch, Services,
    Subscription, ToastCenter,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::ledger::{Invoice, InvoiceId, Ledger, NewInvoice};
use crate::settings::AppSettings;

/// Currently selected branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: "HQ".into(),
            name: "Head Office".into(),
        }
    }
}

pub struct AppState {
    pub services: Services,
    /// The toast list rendered by the console.
    pub toasts: Arc<ToastCenter>,
    pub ledger: Arc<Ledger>,
    pub branch_tx: watch::Sender<Branch>,
    pub create_invoice: MutationHook<NewInvoice, Invoice>,
    pub delete_invoice: MutationHook<InvoiceId, Invoice>,
    pub invoices: QueryHook<Vec<Invoice>>,
    /// Settings as saved on disk, without env overrides. `set` edits them.
    pub settings: Arc<Mutex<AppSettings>>,
    pub settings_path: PathBuf,
    pub commands_run: AtomicUsize,
    pub commands_failed: AtomicUsize,
    /// Bus registrations and watch loops kept alive for the process lifetime.
    bindings: Mutex<Vec<Subscription>>,
    watches: Mutex<Vec<QueryWatch>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDiagnostics {
    pub commands_run: usize,
    pub commands_failed: usize,
    pub events_emitted: usize,
    pub subscriber_panics: usize,
    pub refresh_counter: u64,
    pub clips_played: usize,
    pub tones_synthesized: usize,
    pub muted_skips: usize,
    pub playback_failures: usize,
}

impl AppState {
    pub fn new(
        services: Services,
        toasts: Arc<ToastCenter>,
        ledger: Arc<Ledger>,
        settings: AppSettings,
        settings_path: PathBuf,
    ) -> Self {
        let (branch_tx, _) = watch::channel(Branch::default());
        let timeout = settings.request_timeout();

        let create_invoice = {
            let ledger = Arc::clone(&ledger);
            let mut options = MutationOptions::new()
                .success_message("Invoice created")
                .error_title("Could not create invoice")
                .emits_with(AppEvent::InvoiceCreated, invoice_payload);
            options.timeout = timeout;
            MutationHook::new(
                &services,
                move |new: NewInvoice| {
                    let ledger = Arc::clone(&ledger);
                    async move { ledger.create(new).await }
                },
                options,
            )
        };

        let delete_invoice = {
            let ledger = Arc::clone(&ledger);
            let mut options = MutationOptions::new()
                .success_message("Invoice deleted")
                .error_title("Could not delete invoice")
                .emits_with(AppEvent::InvoiceDeleted, invoice_payload);
            options.timeout = timeout;
            MutationHook::new(
                &services,
                move |id: InvoiceId| {
                    let ledger = Arc::clone(&ledger);
                    async move { ledger.delete(id).await }
                },
                options,
            )
        };

        let invoices = {
            let ledger = Arc::clone(&ledger);
            let branch_rx = branch_tx.subscribe();
            let mut options = QueryOptions::new().error_title("Could not load invoices");
            options.timeout = timeout;
            QueryHook::new(
                &services,
                move || {
                    let ledger = Arc::clone(&ledger);
                    let branch = branch_rx.borrow().id.clone();
                    async move { ledger.list(&branch).await }
                },
                options,
            )
        };

        Self {
            services,
            toasts,
            ledger,
            branch_tx,
            create_invoice,
            delete_invoice,
            invoices,
            settings: Arc::new(Mutex::new(settings)),
            settings_path,
            commands_run: AtomicUsize::new(0),
            commands_failed: AtomicUsize::new(0),
            bindings: Mutex::new(Vec::new()),
            watches: Mutex::new(Vec::new()),
        }
    }

    /// Register the standing listeners and start the invoice list watch.
    ///
    /// Must be called from within the tokio runtime.
    pub fn start(&self) {
        let bus = &self.services.bus;
        let branch_log = bus.subscribe(AppEvent::BranchChanged, |payload| {
            let branch = payload
                .and_then(|p| p.get("branchName"))
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            info!(event = AppEvent::BranchChanged.as_str(), branch, "branch switched");
        });
        let manual_refresh = self
            .services
            .refresh
            .invalidate_on(bus, &[AppEvent::DataRefresh]);
        self.bindings.lock().extend([branch_log, manual_refresh]);

        let watch = self.invoices.watch(self.branch_tx.subscribe());
        self.watches.lock().push(watch);
    }

    /// Stop watch loops and drop bus registrations.
    pub fn shutdown(&self) {
        for watch in self.watches.lock().drain(..) {
            watch.stop();
        }
        for sub in self.bindings.lock().drain(..) {
            sub.unsubscribe();
        }
    }

    pub fn branch(&self) -> Branch {
        self.branch_tx.borrow().clone()
    }

    /// Switch branch: dependent queries re-fetch and `branch:changed` goes
    /// out on the bus.
    pub fn switch_branch(&self, branch: Branch) {
        let payload = payload_from_value(json!({
            "branchId": branch.id,
            "branchName": branch.name,
        }));
        self.branch_tx.send_replace(branch);
        self.services
            .bus
            .emit(AppEvent::BranchChanged, payload.as_ref());
    }

    pub fn diagnostics_snapshot(&self) -> AppDiagnostics {
        let bus = self.services.bus.diagnostics_snapshot();
        let sound = self.services.sound.diagnostics_snapshot();
        AppDiagnostics {
            commands_run: self.commands_run.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            events_emitted: bus.emitted,
            subscriber_panics: bus.subscriber_panics,
            refresh_counter: self.services.refresh.value(),
            clips_played: sound.clips_played,
            tones_synthesized: sound.tones_synthesized,
            muted_skips: sound.muted_skips,
            playback_failures: sound.playback_failures,
        }
    }
}

fn invoice_payload(invoice: &Invoice) -> Option<guardhub_core::Payload> {
    payload_from_value(json!({
        "invoiceId": invoice.id,
        "branchId": invoice.branch_id,
        "amountCents": invoice.amount_cents,
    }))
}
