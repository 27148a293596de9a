//! End-to-end handshake tests against a scripted transport

mod common;

use common::*;
use std::time::Duration;
use tminit_lib::{PrimingPolicy, Session, SessionConfig};

async fn run(transport: &MockTransport, config: SessionConfig) -> State {
    init_tracing();
    let session = Session::attach(transport.clone(), config)
        .await
        .expect("attach failed");
    tokio::time::timeout(Duration::from_secs(5), session.wait())
        .await
        .expect("handshake did not finish")
}

#[tokio::test]
async fn test_t150_long_response_is_switched() {
    let transport = MockTransport::responding(T150_RESPONSE);
    let state = run(&transport, SessionConfig::default()).await;

    let State::SwitchAcked(entry) = state else {
        panic!("Expected SwitchAcked, got {:?}", state);
    };
    assert_eq!(entry.name, "Thrustmaster T150RS");
    assert_eq!(entry.switch_value, 0x0006);

    assert_eq!(transport.control_in_requests(), vec![ControlRequest::identify()]);
    let switches = transport.control_out_requests();
    assert_eq!(switches.len(), 1);
    assert_eq!(switches[0].value, 0x0006);
    assert_eq!(hex::encode(switches[0].to_bytes()), "4153060000000000");
}

#[tokio::test]
async fn test_t500_short_response_is_switched() {
    let transport = MockTransport::responding(T500_RESPONSE);
    let state = run(&transport, SessionConfig::default()).await;

    assert_eq!(state.model().map(|m| m.name), Some("Thrustmaster T500RS"));
    assert!(matches!(state, State::SwitchAcked(_)));
    assert_eq!(transport.control_out_requests()[0].value, 0x0002);
}

#[tokio::test]
async fn test_long_type_answered_with_eight_bytes_is_switched() {
    let transport = MockTransport::responding("49 00 00 00 00 00 06 03");
    let state = run(&transport, SessionConfig::default()).await;

    assert!(matches!(state, State::SwitchAcked(entry) if entry.name == "Thrustmaster T150RS"));
    let switches = transport.control_out_requests();
    assert_eq!(switches.len(), 1);
    assert_eq!(switches[0].value, 0x0006);
}

#[tokio::test]
async fn test_answer_too_short_for_model_word() {
    let transport = MockTransport::responding("49 00 00 00 00 00");
    let state = run(&transport, SessionConfig::default()).await;

    assert_eq!(state, State::IdentifyFailed);
    assert!(transport.control_out_requests().is_empty());
}

#[tokio::test]
async fn test_priming_runs_before_identify() {
    let transport = MockTransport::responding(T500_RESPONSE);
    run(&transport, SessionConfig::default()).await;

    assert_eq!(transport.interrupts().len(), 5);
    assert_eq!(transport.control_in_requests().len(), 1);
}

#[tokio::test]
async fn test_identify_transport_error_stops_handshake() {
    let transport = MockTransport::new().with_identify(Completion {
        data: Vec::new(),
        status: TransferStatus::Other,
    });
    let state = run(&transport, SessionConfig::default()).await;

    assert_eq!(state, State::IdentifyFailed);
    assert!(transport.control_out_requests().is_empty());
}

#[tokio::test]
async fn test_unknown_model_is_not_switched() {
    let transport = MockTransport::responding("47 00 00 00 00 00 34 12");
    let state = run(&transport, SessionConfig::default()).await;

    assert_eq!(state, State::IdentifyFailed);
    assert!(transport.control_out_requests().is_empty());
}

#[tokio::test]
async fn test_unrecognized_packet_type_is_not_switched() {
    let transport = MockTransport::responding("50 00 00 00 00 00 06 03 00 00 00 00 00 00 00 00");
    let state = run(&transport, SessionConfig::default()).await;

    assert_eq!(state, State::IdentifyFailed);
    assert!(transport.control_out_requests().is_empty());
}

#[tokio::test]
async fn test_switch_disconnect_errors_count_as_success() {
    for status in [TransferStatus::Protocol, TransferStatus::Stall] {
        let transport = MockTransport::responding(T150_RESPONSE).with_switch_status(status);
        let state = run(&transport, SessionConfig::default()).await;
        assert!(
            matches!(state, State::SwitchAcked(_)),
            "{status} should be accepted, got {state:?}"
        );
    }
}

#[tokio::test]
async fn test_other_switch_errors_are_ignored() {
    for status in [
        TransferStatus::Disconnected,
        TransferStatus::Cancelled,
        TransferStatus::Other,
    ] {
        let transport = MockTransport::responding(T150_RESPONSE).with_switch_status(status);
        let state = run(&transport, SessionConfig::default()).await;
        assert!(
            matches!(state, State::SwitchIgnored(_)),
            "{status} should be ignored, got {state:?}"
        );
        // never retried
        assert_eq!(transport.control_out_requests().len(), 1);
    }
}

#[tokio::test]
async fn test_rejected_switch_submission() {
    let transport = MockTransport::responding(T150_RESPONSE).rejecting_switch();
    let state = run(&transport, SessionConfig::default()).await;
    assert!(matches!(state, State::SwitchIgnored(_)));
}

#[tokio::test]
async fn test_rejected_identify_fails_attach() {
    let transport = MockTransport::responding(T150_RESPONSE).rejecting_identify();
    let result = Session::attach(transport.clone(), SessionConfig::default()).await;

    assert!(matches!(result, Err(TmError::Submit(_))));
    assert!(transport.control_out_requests().is_empty());
}

#[tokio::test]
async fn test_priming_failure_continues_by_default() {
    let transport = MockTransport::responding(T150_RESPONSE).failing_priming_at(1);
    let state = run(&transport, SessionConfig::default()).await;

    assert_eq!(transport.interrupts().len(), 2);
    assert!(matches!(state, State::SwitchAcked(_)));
}

#[tokio::test]
async fn test_priming_failure_aborts_when_configured() {
    let transport = MockTransport::responding(T150_RESPONSE).failing_priming_at(3);
    let config = SessionConfig::default().with_priming(PrimingPolicy::Abort);
    let result = Session::attach(transport.clone(), config).await;

    assert!(matches!(result, Err(TmError::Priming { step: 3, .. })));
    assert_eq!(transport.interrupts().len(), 4);
    assert!(transport.control_in_requests().is_empty());
}

#[tokio::test]
async fn test_missing_priming_endpoint() {
    let transport = MockTransport::responding(T150_RESPONSE).without_priming_endpoint();
    let state = run(&transport, SessionConfig::default()).await;
    assert!(matches!(state, State::SwitchAcked(_)));
    assert!(transport.interrupts().is_empty());

    let config = SessionConfig::default().with_priming(PrimingPolicy::Abort);
    let result = Session::attach(transport.clone(), config).await;
    assert!(matches!(result, Err(TmError::Setup(_))));
}

#[tokio::test]
async fn test_requests_address_configured_interface() {
    let transport = MockTransport::responding(T150_RESPONSE);
    let config = SessionConfig::default().with_interface(1);
    run(&transport, config).await;

    assert_eq!(transport.control_in_requests()[0].index, 1);
    let switches = transport.control_out_requests();
    assert_eq!(hex::encode(switches[0].to_bytes()), "4153060001000000");
}

#[tokio::test]
async fn test_priming_skipped() {
    let transport = MockTransport::responding(T150_RESPONSE);
    let config = SessionConfig::default().with_priming(PrimingPolicy::Skip);
    run(&transport, config).await;
    assert!(transport.interrupts().is_empty());
}

#[tokio::test]
async fn test_detach_during_identify() {
    // No scripted identify completion: the wheel never answers
    let transport = MockTransport::new();
    let session = Session::attach(transport.clone(), SessionConfig::default())
        .await
        .expect("attach failed");
    assert_eq!(session.state(), State::IdentifyPending);

    let state = session.detach().await;

    assert_eq!(state, State::IdentifyPending);
    assert_eq!(transport.dropped_transfers(), 1);
    assert!(transport.control_out_requests().is_empty());
}

#[tokio::test]
async fn test_detach_after_completion() {
    let transport = MockTransport::responding(T500_RESPONSE);
    let session = Session::attach(transport.clone(), SessionConfig::default())
        .await
        .expect("attach failed");
    let finished = session.wait().await;
    let detached = session.detach().await;

    assert_eq!(finished, detached);
    assert_eq!(transport.dropped_transfers(), 0);
}

#[tokio::test]
async fn test_drop_releases_pending_transfer() {
    let transport = MockTransport::new();
    let session = Session::attach(transport.clone(), SessionConfig::default())
        .await
        .expect("attach failed");
    drop(session);

    // abort takes effect the next time the runtime gets control
    for _ in 0..10 {
        if transport.dropped_transfers() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.dropped_transfers(), 1);
}
