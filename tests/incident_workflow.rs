//! Incident workflow tests

mod common;

use common::{Call, Harness};
use guardpost::{
    DeliveryOptions, GatewayError, IncidentDraft, IncidentField, IncidentFilter, IncidentOptions,
    IncidentStatus, IncidentStep, Outcome, Photo, ScanTarget, WorkflowError,
};
use std::time::Duration;

async fn open_form(h: &Harness) {
    assert_eq!(
        h.incident.open_create().await,
        Ok(Outcome::Applied(IncidentStep::Create))
    );
}

fn fill(h: &Harness, kind: &str, description: &str) {
    h.incident
        .update_field(IncidentField::Type(kind.into()))
        .unwrap();
    h.incident
        .update_field(IncidentField::Description(description.into()))
        .unwrap();
}

#[tokio::test]
async fn open_create_loads_catalog_once() {
    let h = Harness::new();
    open_form(&h).await;
    assert_eq!(h.incident.snapshot().catalog.len(), 3);

    h.incident.back().unwrap();
    open_form(&h).await;
    let type_calls = h
        .gateway
        .calls()
        .into_iter()
        .filter(|c| *c == Call::ListIncidentTypes)
        .count();
    assert_eq!(type_calls, 1);
}

#[tokio::test]
async fn catalog_failure_is_logged_only() {
    let h = Harness::new();
    h.gateway.fail_types(GatewayError::Network("down".into()));
    open_form(&h).await;

    let snap = h.incident.snapshot();
    assert!(snap.catalog.is_empty());
    assert!(snap.last_error.is_none());
    // Without a catalog any type value is accepted.
    h.incident
        .update_field(IncidentField::Type("sistema_caido".into()))
        .unwrap();
}

#[tokio::test]
async fn empty_description_short_circuits() {
    let h = Harness::new();
    open_form(&h).await;
    h.incident
        .update_field(IncidentField::Type("caja_danada".into()))
        .unwrap();
    h.incident
        .update_field(IncidentField::Description("   ".into()))
        .unwrap();

    let err = h.incident.submit().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { .. }));
    let snap = h.incident.snapshot();
    assert_eq!(snap.step, IncidentStep::Create);
    assert_eq!(snap.last_error, Some(err));
    assert!(!h
        .gateway
        .calls()
        .iter()
        .any(|c| matches!(c, Call::CreateIncident(_))));
}

#[tokio::test]
async fn missing_type_short_circuits() {
    let h = Harness::new();
    open_form(&h).await;
    h.incident
        .update_field(IncidentField::Description("La caja llegó abierta".into()))
        .unwrap();
    assert!(matches!(
        h.incident.submit().await,
        Err(WorkflowError::Validation { .. })
    ));
    assert_eq!(h.gateway.calls(), vec![Call::ListIncidentTypes]);
}

#[tokio::test]
async fn unknown_type_rejected_against_catalog() {
    let h = Harness::new();
    open_form(&h).await;
    assert!(matches!(
        h.incident.update_field(IncidentField::Type("volcan".into())),
        Err(WorkflowError::Validation { .. })
    ));
    assert!(h.incident.snapshot().draft.incident_type.is_none());
}

#[tokio::test]
async fn oversized_photo_rejected_before_upload() {
    let options = IncidentOptions {
        max_photo_bytes: 1_024,
        ..IncidentOptions::default()
    };
    let h = Harness::with_options(DeliveryOptions::default(), options);
    open_form(&h).await;

    let big = Photo::new("caja.jpg", "image/jpeg", vec![0u8; 1_025]);
    assert!(matches!(
        h.incident.update_field(IncidentField::Photo(big)),
        Err(WorkflowError::Validation { .. })
    ));
    assert!(h.incident.snapshot().draft.photo.is_none());

    let ok = Photo::new("caja.jpg", "image/jpeg", vec![0u8; 1_024]);
    h.incident.update_field(IncidentField::Photo(ok)).unwrap();
    assert!(h.incident.snapshot().last_error.is_none());
    h.incident.update_field(IncidentField::ClearPhoto).unwrap();
    assert!(h.incident.snapshot().draft.photo.is_none());
}

#[tokio::test(start_paused = true)]
async fn submit_success_confirms_then_returns_to_menu() {
    let h = Harness::new();
    open_form(&h).await;
    fill(&h, "caja_danada", "Caja CAJA-IND-001 llegó rota");
    h.incident
        .update_field(IncidentField::WorkerRut("12.345.678-9".into()))
        .unwrap();
    h.incident
        .update_field(IncidentField::BoxCode(" CAJA-IND-001 ".into()))
        .unwrap();

    assert_eq!(
        h.incident.submit().await,
        Ok(Outcome::Applied(IncidentStep::Confirmation))
    );
    let snap = h.incident.snapshot();
    assert_eq!(snap.draft, IncidentDraft::default());
    let created = snap.last_created.unwrap();
    assert_eq!(created.worker_rut.as_deref(), Some("12345678-9"));
    assert_eq!(created.box_code.as_deref(), Some("CAJA-IND-001"));

    tokio::time::sleep(Duration::from_millis(1_499)).await;
    assert_eq!(h.incident.step(), IncidentStep::Confirmation);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(h.incident.step(), IncidentStep::Menu);
}

#[tokio::test]
async fn submit_failure_keeps_form() {
    let h = Harness::new();
    open_form(&h).await;
    fill(&h, "otro", "Lector no enciende");
    h.gateway.fail_incident(GatewayError::validation("Tipo inválido"));

    let err = h.incident.submit().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { .. }));
    let snap = h.incident.snapshot();
    assert_eq!(snap.step, IncidentStep::Create);
    assert_eq!(snap.draft.description, "Lector no enciende");
    assert_eq!(snap.last_error, Some(err));
    assert!(!snap.loading);

    assert_eq!(
        h.incident.submit().await,
        Ok(Outcome::Applied(IncidentStep::Confirmation))
    );
}

#[tokio::test]
async fn history_and_detail() {
    let h = Harness::new();
    assert_eq!(
        h.incident.open_history().await,
        Ok(Outcome::Applied(IncidentStep::History))
    );
    assert_eq!(h.incident.snapshot().incidents.len(), 2);

    assert_eq!(h.incident.open_detail(2), Ok(IncidentStep::Detail));
    assert_eq!(h.incident.snapshot().selected.unwrap().id, 2);

    assert_eq!(h.incident.back(), Ok(IncidentStep::History));
    assert!(h.incident.snapshot().selected.is_none());

    let err = h.incident.open_detail(99).unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));
    assert_eq!(h.incident.step(), IncidentStep::History);

    assert_eq!(h.incident.back(), Ok(IncidentStep::Menu));
}

#[tokio::test]
async fn history_filter_is_forwarded() {
    let h = Harness::new();
    let filter = IncidentFilter {
        status: Some(IncidentStatus::Resuelto),
    };
    h.incident.open_history_filtered(Some(filter)).await.unwrap();

    let snap = h.incident.snapshot();
    assert_eq!(snap.incidents.len(), 1);
    assert_eq!(snap.incidents[0].status, IncidentStatus::Resuelto);
    assert_eq!(h.gateway.calls(), vec![Call::ListIncidents(Some(filter))]);
}

#[tokio::test]
async fn history_failure_shows_empty_list_with_error() {
    let h = Harness::new();
    h.gateway.fail_list(GatewayError::Network("timeout".into()));

    assert!(matches!(
        h.incident.open_history().await,
        Err(WorkflowError::Network { .. })
    ));
    let snap = h.incident.snapshot();
    assert_eq!(snap.step, IncidentStep::History);
    assert!(snap.incidents.is_empty());
    assert!(snap.last_error.is_some());
}

#[tokio::test]
async fn scan_prefills_form_and_leaving_create_stops_scan() {
    let h = Harness::new();
    open_form(&h).await;

    h.incident.begin_scan_prefill(ScanTarget::Box).unwrap();
    assert_eq!(h.incident.snapshot().scanning, Some(ScanTarget::Box));
    h.camera.push_decoded("CAJA-PF-001");
    assert_eq!(
        h.incident.await_scan().await.unwrap().applied(),
        Some(IncidentStep::Create)
    );
    let snap = h.incident.snapshot();
    assert_eq!(snap.draft.box_code.as_deref(), Some("CAJA-PF-001"));
    assert_eq!(snap.scanning, None);

    h.incident.begin_scan_prefill(ScanTarget::Worker).unwrap();
    assert!(h.camera.is_acquired());
    h.incident.back().unwrap();
    assert!(!h.scanner.is_active());
    assert!(!h.camera.is_acquired());
}

#[tokio::test]
async fn reset_discards_in_flight_submit() {
    let h = Harness::new();
    open_form(&h).await;
    fill(&h, "caja_danada", "Caja rota");
    h.gateway.hold();

    let incident = h.incident.clone();
    let pending = tokio::spawn(async move { incident.submit().await });
    h.gateway.wait_for_calls(2).await;
    assert_eq!(h.incident.step(), IncidentStep::Submitting);
    assert_eq!(h.incident.back(), Err(WorkflowError::Busy));

    h.incident.reset();
    h.gateway.release(1);
    assert_eq!(pending.await.unwrap(), Ok(Outcome::Discarded));

    let snap = h.incident.snapshot();
    assert_eq!(snap.step, IncidentStep::Menu);
    assert_eq!(snap.draft, IncidentDraft::default());
    assert!(snap.last_created.is_none());
    assert!(!snap.loading);
}

#[tokio::test]
async fn operations_outside_their_screen_are_rejected() {
    let h = Harness::new();
    assert!(matches!(
        h.incident.update_field(IncidentField::Description("x".into())),
        Err(WorkflowError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.incident.submit().await,
        Err(WorkflowError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.incident.open_detail(1),
        Err(WorkflowError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.incident.back(),
        Err(WorkflowError::InvalidTransition { .. })
    ));
    assert!(h.incident.snapshot().last_error.is_none());
}

#[tokio::test]
async fn leaving_history_mid_fetch_discards_the_late_list() {
    let h = Harness::new();
    h.gateway.hold();

    let incident = h.incident.clone();
    let pending = tokio::spawn(async move { incident.open_history().await });
    h.gateway.wait_for_calls(1).await;
    assert!(h.incident.snapshot().loading);

    assert_eq!(h.incident.back(), Ok(IncidentStep::Menu));
    assert!(!h.incident.snapshot().loading);

    h.gateway.release(1);
    assert_eq!(pending.await.unwrap(), Ok(Outcome::Discarded));
    let snap = h.incident.snapshot();
    assert_eq!(snap.step, IncidentStep::Menu);
    assert!(snap.incidents.is_empty());
    assert!(snap.last_error.is_none());

    // Not stuck behind the abandoned fetch.
    h.gateway.release(1);
    assert_eq!(
        h.incident.open_create().await,
        Ok(Outcome::Applied(IncidentStep::Create))
    );
}
