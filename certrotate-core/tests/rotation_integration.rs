//! Integration tests for certificate rotation.

mod common;

use std::collections::BTreeSet;

use certrotate_core::rotation::replicate_bindings;
use certrotate_core::{
    CertificateStatus, InMemoryRegistry, Registry, ResponsePayload, RotationError,
    RotationSuccess,
};
use common::{certificate_id, Harness, CSR};
use serde_json::{json, Value};
use test_case::test_case;

fn issue_event(principal: &str) -> Value {
    json!({
        "principal": principal,
        "clientId": "sensor-42",
        "response": { "csr": CSR },
    })
}

fn activate_event(new_certificate_id: &str) -> Value {
    json!({
        "principal": "anything",
        "clientId": "sensor-42",
        "response": { "newCertificateId": new_certificate_id },
    })
}

fn deactivate_event(principal: &str, old_certificate_id: &str) -> Value {
    json!({
        "principal": principal,
        "clientId": "sensor-42",
        "response": { "oldCertificateId": old_certificate_id },
    })
}

fn issued_id(success: &RotationSuccess) -> String {
    match success {
        RotationSuccess::Issued {
            new_certificate_id, ..
        } => new_certificate_id.clone(),
        other => panic!("expected an issued certificate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_issue_binds_new_certificate_like_the_old_one() {
    let harness = Harness::new();
    let c_old = certificate_id('a');
    let old_arn = harness
        .seed_device(&c_old, &["DevicePolicy", "TelemetryPolicy"], &["sensor-42"])
        .await;

    let success = harness
        .service
        .handle_issue(&issue_event(&c_old))
        .await
        .unwrap();
    let c_new = issued_id(&success);
    let new_arn = harness.registry.arn(&c_new).unwrap();

    assert_eq!(
        harness.registry.status(&c_new),
        Some(CertificateStatus::PendingActivation)
    );
    assert_eq!(
        harness.registry.status(&c_old),
        Some(CertificateStatus::Active)
    );
    assert_eq!(
        harness.registry.policies_of(&new_arn),
        harness.registry.policies_of(&old_arn)
    );
    assert_eq!(
        harness.registry.things_of(&new_arn),
        BTreeSet::from(["sensor-42".to_string()])
    );

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "certificate/rotation/result/sensor-42");
    assert_eq!(messages[0].qos, 1);
    match &messages[0].payload {
        ResponsePayload::Issued {
            new_certificate_arn,
            new_certificate_id,
            new_certificate_pem,
            old_certificate_id,
        } => {
            assert_eq!(new_certificate_id, &c_new);
            assert_eq!(new_certificate_arn, &new_arn);
            assert!(new_certificate_pem.starts_with("-----BEGIN CERTIFICATE-----"));
            assert_eq!(old_certificate_id, &c_old);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_issue_drains_every_page_before_attaching() {
    let harness = Harness::with_registry(InMemoryRegistry::with_page_size(2));
    let c_old = certificate_id('b');
    let policies = ["P1", "P2", "P3", "P4", "P5"];
    let things = ["thing-1", "thing-2", "thing-3"];
    let old_arn = harness.seed_device(&c_old, &policies, &things).await;
    let seeded_calls = harness.registry.calls().len();

    let success = harness
        .service
        .handle_issue(&issue_event(&c_old))
        .await
        .unwrap();
    let new_arn = harness.registry.arn(&issued_id(&success)).unwrap();

    assert_eq!(harness.registry.policies_of(&new_arn).len(), 5);
    assert_eq!(harness.registry.things_of(&new_arn).len(), 3);
    assert_eq!(
        harness.registry.policies_of(&new_arn),
        harness.registry.policies_of(&old_arn)
    );
    assert_eq!(
        harness.registry.things_of(&new_arn),
        harness.registry.things_of(&old_arn)
    );

    let calls = harness.registry.calls().split_off(seeded_calls);
    let listing_calls: Vec<_> = calls
        .iter()
        .filter(|call| call.starts_with("list_"))
        .collect();
    assert_eq!(listing_calls.len(), 3 + 2);
    let last_listing = calls.iter().rposition(|call| call.starts_with("list_")).unwrap();
    let first_attach = calls.iter().position(|call| call.starts_with("attach_")).unwrap();
    assert!(last_listing < first_attach);
}

#[tokio::test]
async fn test_replication_is_idempotent() {
    let harness = Harness::with_registry(InMemoryRegistry::with_page_size(1));
    let c_old = certificate_id('c');
    let old_arn = harness
        .seed_device(&c_old, &["DevicePolicy", "OtaPolicy"], &["sensor-42", "gateway-1"])
        .await;
    let issued = harness
        .registry
        .create_certificate_from_csr(CSR)
        .await
        .unwrap();

    let first = replicate_bindings(
        harness.registry.as_ref(),
        &old_arn,
        &issued.certificate_id,
        &issued.certificate_arn,
    )
    .await
    .unwrap();
    let policies_once = harness.registry.policies_of(&issued.certificate_arn);
    let things_once = harness.registry.things_of(&issued.certificate_arn);

    let second = replicate_bindings(
        harness.registry.as_ref(),
        &old_arn,
        &issued.certificate_id,
        &issued.certificate_arn,
    )
    .await
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.registry.policies_of(&issued.certificate_arn), policies_once);
    assert_eq!(harness.registry.things_of(&issued.certificate_arn), things_once);
    assert_eq!(policies_once.len(), 2);
    assert_eq!(things_once.len(), 2);
}

#[tokio::test]
async fn test_failed_attach_leaves_pending_certificate_and_retry_succeeds() {
    let harness = Harness::new();
    let c_old = certificate_id('d');
    harness
        .seed_device(&c_old, &["DevicePolicy"], &["sensor-42"])
        .await;
    harness.registry.fail_operation("attach_thing_principal");

    let err = harness
        .service
        .handle_issue(&issue_event(&c_old))
        .await
        .unwrap_err();

    let RotationError::BindingIncomplete {
        new_certificate_id,
        binding,
        ..
    } = &err
    else {
        panic!("expected an incomplete binding, got {err:?}");
    };
    assert_eq!(binding, "thing sensor-42");
    let orphan_arn = harness.registry.arn(new_certificate_id).unwrap();
    assert_eq!(
        harness.registry.status(new_certificate_id),
        Some(CertificateStatus::PendingActivation)
    );
    assert_eq!(
        harness.registry.policies_of(&orphan_arn),
        BTreeSet::from(["DevicePolicy".to_string()])
    );

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    match &messages[0].payload {
        ResponsePayload::Failure { error, result, .. } => {
            assert!(error.contains("injected failure"));
            assert_eq!(
                result.as_deref(),
                Some(
                    format!("certificate {new_certificate_id} was left pending activation")
                        .as_str()
                )
            );
        }
        other => panic!("unexpected payload {other:?}"),
    }

    harness.registry.clear_failures();
    let success = harness
        .service
        .handle_issue(&issue_event(&c_old))
        .await
        .unwrap();
    let c_new = issued_id(&success);
    assert_ne!(&c_new, new_certificate_id);
    assert_eq!(harness.registry.certificate_count(), 3);
    assert_eq!(
        harness.registry.things_of(&harness.registry.arn(&c_new).unwrap()),
        BTreeSet::from(["sensor-42".to_string()])
    );
}

#[tokio::test]
async fn test_listing_failure_attaches_nothing() {
    let harness = Harness::new();
    let c_old = certificate_id('e');
    harness
        .seed_device(&c_old, &["DevicePolicy"], &["sensor-42"])
        .await;
    let seeded_calls = harness.registry.calls().len();
    harness.registry.fail_operation("list_principal_things");

    let err = harness
        .service
        .handle_issue(&issue_event(&c_old))
        .await
        .unwrap_err();

    assert!(matches!(err, RotationError::Registry(_)));
    let calls = harness.registry.calls();
    assert!(calls[seeded_calls..]
        .iter()
        .all(|call| !call.starts_with("attach_")));
    assert!(harness.publisher.messages()[0].payload.is_failure());
}

#[tokio::test]
async fn test_issue_for_unknown_principal_reports_registry_error() {
    let harness = Harness::new();

    let err = harness
        .service
        .handle_issue(&issue_event(&certificate_id('f')))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RotationError::Registry(certrotate_core::RegistryError::NotFound { .. })
    ));
    assert_eq!(harness.publisher.messages().len(), 1);
}

#[tokio::test]
async fn test_activation_sets_certificate_active_and_is_idempotent() {
    let harness = Harness::new();
    let c_new = certificate_id('1');
    harness
        .registry
        .register_certificate(&c_new, CertificateStatus::PendingActivation);

    for _ in 0..2 {
        let success = harness
            .service
            .handle_activate(&activate_event(&c_new))
            .await
            .unwrap();
        assert_eq!(
            success,
            RotationSuccess::Activated {
                certificate_id: c_new.clone()
            }
        );
    }

    assert_eq!(
        harness.registry.status(&c_new),
        Some(CertificateStatus::Active)
    );
    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[1].payload,
        ResponsePayload::message(format!("certificate {c_new} was set as active"))
    );
}

#[tokio::test]
async fn test_deactivation_with_new_certificate() {
    let harness = Harness::new();
    let c_old = certificate_id('2');
    let c_new = certificate_id('3');
    harness
        .registry
        .register_certificate(&c_old, CertificateStatus::Active);
    harness
        .registry
        .register_certificate(&c_new, CertificateStatus::Active);

    harness
        .service
        .handle_deactivate(&deactivate_event(&c_new, &c_old))
        .await
        .unwrap();

    assert_eq!(
        harness.registry.status(&c_old),
        Some(CertificateStatus::Inactive)
    );
    assert_eq!(
        harness.registry.status(&c_new),
        Some(CertificateStatus::Active)
    );
    assert_eq!(
        harness.publisher.messages()[0].payload,
        ResponsePayload::Result {
            result: format!("{c_old} was successfully set as inactive")
        }
    );
}

#[tokio::test]
async fn test_self_lockout_is_refused_without_registry_call() {
    let harness = Harness::new();
    let c_old = certificate_id('4');
    harness
        .registry
        .register_certificate(&c_old, CertificateStatus::Active);

    let err = harness
        .service
        .handle_deactivate(&deactivate_event(&c_old, &c_old))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RotationError::SelfLockout {
            client_id: "sensor-42".to_string()
        }
    );
    assert_eq!(
        harness.registry.status(&c_old),
        Some(CertificateStatus::Active)
    );
    assert!(harness.registry.calls().is_empty());
    assert_eq!(
        harness.publisher.messages()[0].payload,
        ResponsePayload::Failure {
            error: "You must connect with your new certificate to deactivate".to_string(),
            client_id: Some("sensor-42".to_string()),
            result: None,
        }
    );
}

#[test_case("abc123" ; "too short")]
#[test_case("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz" ; "not hex")]
#[test_case("0x0000000000000000000000000000000000000000000000000000000000000000" ; "prefixed and too long")]
#[test_case("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" ; "path separator")]
#[tokio::test]
async fn test_malformed_old_certificate_id_never_reaches_registry(old_certificate_id: &str) {
    let harness = Harness::new();

    let err = harness
        .service
        .handle_deactivate(&deactivate_event(&certificate_id('5'), old_certificate_id))
        .await
        .unwrap_err();

    assert!(matches!(err, RotationError::InvalidCertificateId { .. }));
    assert!(harness.registry.calls().is_empty());
    assert_eq!(
        harness.publisher.messages()[0].payload,
        ResponsePayload::error("you have passed an invalid old certificate id")
    );
}

#[tokio::test]
async fn test_deactivation_registry_failure_asks_for_manual_action() {
    let harness = Harness::new();
    let c_old = certificate_id('6');

    let err = harness
        .service
        .handle_deactivate(&deactivate_event(&certificate_id('7'), &c_old))
        .await
        .unwrap_err();

    assert!(matches!(err, RotationError::DeactivationFailed { .. }));
    match &harness.publisher.messages()[0].payload {
        ResponsePayload::Failure { result, .. } => assert_eq!(
            result.as_deref(),
            Some(format!("you must manually deactivate the certificate with id {c_old}").as_str())
        ),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test_case("attach", json!({ "clientId": "sensor-42", "response": { "csr": CSR } }), "principal" ; "issue without principal")]
#[test_case("attach", json!({ "clientId": "sensor-42", "principal": "p" }), "response.csr" ; "issue without csr")]
#[test_case("activate", json!({ "clientId": "sensor-42", "response": {} }), "response.newCertificateId" ; "activate without id")]
#[test_case("detach", json!({ "clientId": "sensor-42", "response": { "oldCertificateId": "x" } }), "principal" ; "deactivate without principal")]
#[test_case("detach", json!({ "clientId": "sensor-42", "principal": "p" }), "response.oldCertificateId" ; "deactivate without old id")]
#[tokio::test]
async fn test_missing_field_is_named_and_reported_once(phase: &str, event: Value, field: &str) {
    let harness = Harness::new();
    let topic = format!("certificate/rotation/{phase}/sensor-42");

    let err = harness
        .service
        .handle_topic(&topic, &event)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RotationError::MissingField {
            field: field.to_string()
        }
    );
    assert!(harness.registry.calls().is_empty());
    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].payload,
        ResponsePayload::error(format!("user failed to supply the {field}"))
    );
}

#[tokio::test]
async fn test_missing_client_id_cannot_be_published() {
    let harness = Harness::new();

    let err = harness
        .service
        .handle_activate(&json!({ "response": { "newCertificateId": certificate_id('8') } }))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RotationError::MissingField {
            field: "clientId".to_string()
        }
    );
    assert!(harness.publisher.messages().is_empty());
    assert!(harness.registry.calls().is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_the_operation() {
    let harness = Harness::new();
    let c_new = certificate_id('9');
    harness
        .registry
        .register_certificate(&c_new, CertificateStatus::PendingActivation);
    harness.publisher.set_failing(true);

    let result = harness
        .service
        .handle_activate(&activate_event(&c_new))
        .await;

    assert!(result.is_ok());
    assert_eq!(
        harness.registry.status(&c_new),
        Some(CertificateStatus::Active)
    );
    assert_eq!(harness.publisher.messages().len(), 1);
}

#[tokio::test]
async fn test_unknown_topic_is_reported_to_the_client() {
    let harness = Harness::new();

    let err = harness
        .service
        .handle_topic(
            "certificate/rotation/renew/sensor-42",
            &issue_event(&certificate_id('a')),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RotationError::InvalidField { ref field, .. } if field == "topic"));
    assert!(harness.registry.calls().is_empty());
    assert!(harness.publisher.messages()[0].payload.is_failure());
}

#[tokio::test]
async fn test_full_rotation_over_request_topics() {
    let harness = Harness::new();
    let c_old = certificate_id('a');
    let old_arn = harness
        .seed_device(&c_old, &["DevicePolicy", "TelemetryPolicy"], &["sensor-42"])
        .await;

    let issued = harness
        .service
        .handle_topic("certificate/rotation/attach/sensor-42", &issue_event(&c_old))
        .await
        .unwrap();
    let c_new = issued_id(&issued);

    harness
        .service
        .handle_topic(
            "certificate/rotation/activate/sensor-42",
            &json!({
                "principal": c_old,
                "clientId": "sensor-42",
                "response": { "newCertificateId": c_new },
            }),
        )
        .await
        .unwrap();

    let premature = harness
        .service
        .handle_topic(
            "certificate/rotation/detach/sensor-42",
            &deactivate_event(&c_old, &c_old),
        )
        .await;
    assert!(matches!(premature, Err(RotationError::SelfLockout { .. })));

    harness
        .service
        .handle_topic(
            "certificate/rotation/detach/sensor-42",
            &deactivate_event(&c_new, &c_old),
        )
        .await
        .unwrap();

    let new_arn = harness.registry.arn(&c_new).unwrap();
    assert_eq!(
        harness.registry.status(&c_new),
        Some(CertificateStatus::Active)
    );
    assert_eq!(
        harness.registry.status(&c_old),
        Some(CertificateStatus::Inactive)
    );
    assert_eq!(
        harness.registry.policies_of(&new_arn),
        harness.registry.policies_of(&old_arn)
    );

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 4);
    assert!(messages
        .iter()
        .all(|message| message.topic == "certificate/rotation/result/sensor-42"));
}
