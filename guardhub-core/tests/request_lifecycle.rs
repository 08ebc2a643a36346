use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use guardhub_core::bus::payload_from_value;
use guardhub_core::notify::center::Toast;
use guardhub_core::{
    AppEvent, MutationHook, MutationOptions, Payload, QueryHook, QueryOptions, RequestStatus,
    Services, Severity,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{broadcast, watch, Notify};

#[derive(Debug, Clone)]
struct Input {
    fail: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Created {
    id: u32,
}

fn boom_mutation(services: &Services) -> MutationHook<Input, Created> {
    MutationHook::new(
        services,
        |input: Input| async move {
            if input.fail {
                anyhow::bail!("boom");
            }
            Ok(Created { id: 1 })
        },
        MutationOptions::new()
            .success_message("Invoice saved")
            .error_title("Could not save invoice"),
    )
}

fn drain(rx: &mut broadcast::Receiver<RequestStatus>) -> Vec<RequestStatus> {
    let mut seen = Vec::new();
    while let Ok(status) = rx.try_recv() {
        seen.push(status);
    }
    seen
}

/// Wait for the next `Success` or `Error`.
async fn settled(rx: &mut broadcast::Receiver<RequestStatus>) -> RequestStatus {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(status @ (RequestStatus::Success | RequestStatus::Error)) => return status,
                Ok(_) => continue,
                Err(e) => panic!("status channel: {e}"),
            }
        }
    })
    .await
    .expect("request did not settle")
}

fn titles(toasts: &[Toast]) -> Vec<(&str, Severity)> {
    toasts.iter().map(|t| (t.title.as_str(), t.severity)).collect()
}

#[tokio::test]
async fn successful_mutation_runs_loading_then_success() {
    let (services, toasts) = Services::headless();
    let hook = boom_mutation(&services);
    let mut status = hook.subscribe_status();
    assert_eq!(hook.status(), RequestStatus::Idle);
    let before = services.refresh.value();

    let created = hook.mutate(Input { fail: false }).await.unwrap();

    assert_eq!(created, Created { id: 1 });
    assert_eq!(drain(&mut status), vec![RequestStatus::Loading, RequestStatus::Success]);
    assert_eq!(hook.state().data, Some(Created { id: 1 }));
    assert!(hook.state().error.is_none());
    assert_eq!(services.refresh.value(), before + 1);
    assert_eq!(
        titles(&toasts.active()),
        vec![("Invoice saved", Severity::Success)]
    );
}

#[tokio::test]
async fn failing_mutation_rethrows_and_leaves_refresh_alone() {
    let (services, toasts) = Services::headless();
    let hook = boom_mutation(&services);
    let mut status = hook.subscribe_status();
    let before = services.refresh.value();

    let err = hook.mutate(Input { fail: true }).await.unwrap_err();

    assert_eq!(err.to_string(), "boom");
    assert!(!err.is_timeout());
    assert_eq!(drain(&mut status), vec![RequestStatus::Loading, RequestStatus::Error]);
    assert!(hook.state().error.is_some());
    assert_eq!(services.refresh.value(), before);

    let shown = toasts.active();
    assert_eq!(
        titles(&shown),
        vec![("Could not save invoice", Severity::Error)]
    );
    assert_eq!(shown[0].description.as_deref(), Some("boom"));
}

#[tokio::test]
async fn mutation_emits_its_domain_event_with_payload() {
    let (services, _toasts) = Services::headless();
    let seen: Arc<Mutex<Vec<Payload>>> = Arc::default();
    let sink = seen.clone();
    let _sub = services
        .bus
        .subscribe(AppEvent::InvoiceCreated, move |p| sink.lock().extend(p.cloned()));

    let hook = MutationHook::new(
        &services,
        |amount: u64| async move { Ok(Created { id: amount as u32 }) },
        MutationOptions::new().emits_with(AppEvent::InvoiceCreated, |c: &Created| {
            payload_from_value(json!({ "invoiceId": c.id }))
        }),
    );
    hook.mutate(42).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["invoiceId"], json!(42));
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let (services, toasts) = Services::headless();
    let batch = boom_mutation(&services).batch();
    let mut status = batch.subscribe_status();
    let emitted = services.bus.diagnostics_snapshot().emitted;

    let result = batch.mutate_batch(Vec::new()).await.unwrap();

    assert!(result.is_none());
    assert_eq!(batch.state().status, RequestStatus::Idle);
    assert!(drain(&mut status).is_empty());
    assert_eq!(services.refresh.value(), 0);
    assert_eq!(services.bus.diagnostics_snapshot().emitted, emitted);
    assert!(toasts.active().is_empty());
}

#[tokio::test]
async fn batch_settles_once_for_all_inputs() {
    let (services, _toasts) = Services::headless();
    let deleted = Arc::new(AtomicUsize::new(0));
    let events = deleted.clone();
    let _sub = services.bus.subscribe(AppEvent::InvoiceDeleted, move |_| {
        events.fetch_add(1, Ordering::SeqCst);
    });

    let hook = MutationHook::new(
        &services,
        |id: u32| async move { Ok(id) },
        MutationOptions::new().emits(AppEvent::InvoiceDeleted),
    );
    let batch = hook.batch();
    let mut status = batch.subscribe_status();

    let ids = batch.mutate_batch(vec![3, 5, 8]).await.unwrap();

    assert_eq!(ids, Some(vec![3, 5, 8]));
    assert_eq!(drain(&mut status), vec![RequestStatus::Loading, RequestStatus::Success]);
    assert_eq!(services.refresh.value(), 1);
    assert_eq!(deleted.load(Ordering::SeqCst), 3);
    assert_eq!(hook.status(), RequestStatus::Idle, "single-input state is separate");
}

#[tokio::test]
async fn batch_fails_as_a_whole() {
    let (services, _toasts) = Services::headless();
    let batch = boom_mutation(&services).batch();

    let inputs = vec![Input { fail: false }, Input { fail: true }];
    let err = batch.mutate_batch(inputs).await.unwrap_err();

    assert_eq!(err.to_string(), "boom");
    assert_eq!(batch.state().status, RequestStatus::Error);
    assert_eq!(services.refresh.value(), 0);
}

#[tokio::test]
async fn reset_returns_to_idle_without_touching_refresh() {
    let (services, _toasts) = Services::headless();
    let first = boom_mutation(&services);
    let second = boom_mutation(&services);
    first.mutate(Input { fail: false }).await.unwrap();
    second.mutate(Input { fail: false }).await.unwrap();
    let counter = services.refresh.value();

    first.reset();

    let state = first.state();
    assert_eq!(state.status, RequestStatus::Idle);
    assert!(state.data.is_none());
    assert!(state.error.is_none());
    assert_eq!(services.refresh.value(), counter);
    assert_eq!(second.status(), RequestStatus::Success);
}

#[tokio::test]
async fn mutation_timeout_is_its_own_error_kind() {
    let (services, toasts) = Services::headless();
    let hook: MutationHook<(), ()> = MutationHook::new(
        &services,
        |_: ()| std::future::pending::<anyhow::Result<()>>(),
        MutationOptions::new().timeout(Duration::from_millis(20)),
    );

    let err = hook.mutate(()).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(hook.status(), RequestStatus::Error);
    assert_eq!(services.refresh.value(), 0);
    assert_eq!(toasts.active()[0].severity, Severity::Error);
}

#[tokio::test]
async fn result_arriving_after_reset_is_dropped() {
    let (services, _toasts) = Services::headless();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let hook: MutationHook<(), u32> = MutationHook::new(
        &services,
        move |_: ()| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(7)
            }
        },
        MutationOptions::new(),
    );
    let mut status = hook.subscribe_status();

    let running = tokio::spawn({
        let hook = hook.clone();
        async move { hook.mutate(()).await }
    });
    assert_eq!(status.recv().await.unwrap(), RequestStatus::Loading);

    hook.reset();
    release.notify_one();

    assert_eq!(running.await.unwrap().unwrap(), 7);
    let state = hook.state();
    assert_eq!(state.status, RequestStatus::Idle);
    assert!(state.data.is_none());
}

fn counting_query(services: &Services) -> (QueryHook<usize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let hook = QueryHook::new(
        services,
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n) }
        },
        QueryOptions::default(),
    );
    (hook, calls)
}

#[tokio::test]
async fn successful_mutation_refetches_watching_queries() {
    let (services, _toasts) = Services::headless();
    let (query, calls) = counting_query(&services);
    let mut status = query.subscribe_status();
    let _watch = query.watch_refresh();
    assert_eq!(settled(&mut status).await, RequestStatus::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    boom_mutation(&services)
        .mutate(Input { fail: false })
        .await
        .unwrap();
    assert_eq!(settled(&mut status).await, RequestStatus::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.state().data, Some(2));

    let _ = boom_mutation(&services).mutate(Input { fail: true }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2, "failed mutation does not refetch");
}

#[tokio::test]
async fn refresh_bumps_are_not_coalesced() {
    let (services, _toasts) = Services::headless();
    let (query, calls) = counting_query(&services);
    let mut status = query.subscribe_status();
    let _watch = query.watch_refresh();
    settled(&mut status).await;

    services.refresh.trigger();
    services.refresh.trigger();
    settled(&mut status).await;
    settled(&mut status).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn dependency_changes_refetch_and_equal_values_do_not() {
    let (services, _toasts) = Services::headless();
    let (query, calls) = counting_query(&services);
    let (branch_tx, branch_rx) = watch::channel(String::from("B1"));
    let mut status = query.subscribe_status();
    let _watch = query.watch(branch_rx);
    settled(&mut status).await;

    branch_tx.send(String::from("B2")).unwrap();
    settled(&mut status).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    branch_tx.send(String::from("B2")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    drop(branch_tx);
    services.refresh.trigger();
    settled(&mut status).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3, "refresh still works without deps");
}

#[tokio::test]
async fn stopped_watch_no_longer_refetches() {
    let (services, _toasts) = Services::headless();
    let (query, calls) = counting_query(&services);
    let mut status = query.subscribe_status();
    let watch = query.watch_refresh();
    settled(&mut status).await;

    watch.stop();
    assert!(!watch.is_active());
    services.refresh.trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(query.state().data, Some(1));
}

#[tokio::test]
async fn in_flight_failure_after_teardown_is_not_reported() {
    let (services, toasts) = Services::headless();
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let query: QueryHook<u32> = QueryHook::new(
        &services,
        move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Err::<u32, _>(anyhow::anyhow!("unavailable"))
            }
        },
        QueryOptions::default(),
    );
    let mut status = query.subscribe_status();

    let watch = query.watch_refresh();
    assert_eq!(status.recv().await.unwrap(), RequestStatus::Loading);
    drop(watch);
    release.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(status.try_recv().ok(), Some(RequestStatus::Idle));
    assert_eq!(query.status(), RequestStatus::Idle);
    assert!(toasts.active().is_empty());
}

#[tokio::test]
async fn query_failure_under_a_context_toasts_the_root_cause() {
    let (services, toasts) = Services::headless();
    let query: QueryHook<u32> = QueryHook::new(
        &services,
        || async {
            Err::<u32, _>(anyhow::anyhow!("unavailable: backend offline").context("loading invoices"))
        },
        QueryOptions::new().error_title("Could not load invoices"),
    );

    let err = query.fetch().await.unwrap_err();
    assert_eq!(err.to_string(), "loading invoices: unavailable: backend offline");

    let shown = toasts.active();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Could not load invoices");
    assert_eq!(
        shown[0].description.as_deref(),
        Some("The service is unreachable. Check your connection and try again.")
    );
}

#[tokio::test]
async fn branch_change_invalidates_queries_through_the_bus() {
    let (services, _toasts) = Services::headless();
    let _binding = services
        .refresh
        .invalidate_on(&services.bus, &[AppEvent::BranchChanged]);
    let (query, calls) = counting_query(&services);
    let mut status = query.subscribe_status();
    let _watch = query.watch_refresh();
    settled(&mut status).await;

    let payload = payload_from_value(json!({ "branchId": "B1", "branchName": "Mumbai" }));
    services.bus.emit(AppEvent::BranchChanged, payload.as_ref());
    settled(&mut status).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
