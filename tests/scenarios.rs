//! End-to-end workflow scenarios against a real sled database
//!
//! Sled uses file-based locking to prevent concurrent access, so each
//! test opens its own database under a tempdir for simplified cleanup.

use std::sync::Arc;

use anyhow::Context;
use certificate_approval::{
    certificate::CertificateDraft,
    error::EngineError,
    ledger::{ApprovalAction, ApprovalRecord},
    request::CertificateRequest,
    service::CertificateService,
    status::RequestStatus,
    timestamp::TimeStamp,
    utils::new_uuid_to_bech32,
    verification::{Document, VerificationAction, VerificationStatus, VerificationStep},
};
use sled::open;
use tempfile::tempdir;

fn service_in(
    dir: &tempfile::TempDir,
    name: &str,
) -> anyhow::Result<(CertificateService, Arc<sled::Db>)> {
    let db = open(dir.path().join(name))?;
    let db = Arc::new(db);
    db.clear()?;
    Ok((CertificateService::new(db.clone()), db))
}

fn draft_request() -> anyhow::Result<CertificateRequest> {
    let id = new_uuid_to_bech32("req_")?;
    Ok(CertificateRequest::new(id, TimeStamp::new())
        .client("client_123", "Ada Lovelace", "ada@example.edu")
        .organization("org_1", "Example University")
        .certificate_type("diploma")
        .title("BSc Mathematics")
        .description("Completed course of study")
        .purpose("employment"))
}

fn reviewer_record(action: ApprovalAction, comment: Option<&str>) -> ApprovalRecord {
    ApprovalRecord::new(
        "ca_456",
        "Certificate Authority",
        "authority",
        action,
        comment.map(String::from),
        TimeStamp::new(),
    )
}

fn issuable_draft() -> CertificateDraft {
    CertificateDraft::new()
        .issuer("ca_456", "Registrar")
        .recipient("client_123", "Ada Lovelace", "ada@example.edu")
        .organization("org_1", "Example University")
        .title("BSc Mathematics")
        .certificate_type("diploma")
        .verification_code("VC-2026-0001")
        .content_hash("0f1e2d3c")
        .signature(b"registrar-signature")
}

#[test]
fn submit_assign_and_reject() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "submit_assign_and_reject.db")?;

    let request = service.open_request(draft_request()?)?;
    assert_eq!(request.status, RequestStatus::Draft);

    let request = service
        .submit_request(&request.id)
        .context("request failed on submit: ")?;
    assert_eq!(request.status, RequestStatus::Submitted);
    assert!(request.submitted_at.is_some());

    let request = service.assign_reviewer(&request.id, "ca_456", "Certificate Authority")?;
    assert!(!request.can_assign());

    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Rejected, Some("incomplete transcript")),
    )?;
    assert_eq!(request.status, RequestStatus::Rejected);
    assert_eq!(
        request.rejection_reason.as_deref(),
        Some("incomplete transcript")
    );
    assert_eq!(request.history.len(), 1);

    // the request is terminal, every further mutation is refused
    let err = service
        .review_request(
            &request.id,
            reviewer_record(ApprovalAction::Approved, None),
        )
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::AlreadyFinalized("Rejected".into()))
    );

    let err = service.submit_request(&request.id).unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::AlreadyFinalized("Rejected".into()))
    );

    Ok(())
}

#[test]
fn approve_and_issue_certificate() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "approve_and_issue.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.assign_reviewer(&request.id, "ca_456", "Certificate Authority")?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, Some("records verified")),
    )?;
    assert_eq!(request.status, RequestStatus::Approved);
    assert!(request.approved_at.is_some());
    assert!(request.certificate_id.is_none());

    let (request, certificate) = service.issue_certificate(&request.id, issuable_draft())?;
    assert_eq!(request.status, RequestStatus::Issued);
    assert_eq!(request.certificate_id.as_deref(), Some(certificate.id.as_str()));
    let first_issued_at = request.issued_at.clone().unwrap();

    // reload: the issued/certificate-id invariant survives persistence
    let reloaded = service.get_request(&request.id)?;
    assert_eq!(reloaded.status, RequestStatus::Issued);
    assert_eq!(reloaded.certificate_id, request.certificate_id);
    assert_eq!(reloaded.issued_at, Some(first_issued_at));

    // a second issuance fails the precondition and changes nothing
    let err = service
        .issue_certificate(&request.id, issuable_draft())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::PreconditionFailed(_))
    ));
    assert_eq!(service.get_request(&request.id)?, reloaded);

    let stored = service.get_certificate(&certificate.id)?;
    assert_eq!(stored, certificate);

    Ok(())
}

#[test]
fn changes_requested_roundtrip() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "changes_requested.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::ChangesRequested, Some("attach transcript")),
    )?;
    assert_eq!(request.status, RequestStatus::ChangesRequested);
    assert_eq!(request.change_request_comments, vec!["attach transcript"]);

    // the client may edit again, then resubmit
    let edited = service.update_request(request.attach("doc_transcript"))?;
    let request = service.submit_request(&edited.id)?;
    assert_eq!(request.status, RequestStatus::Submitted);

    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, None),
    )?;
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.history.len(), 2);

    Ok(())
}

#[test]
fn share_token_lifecycle() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "share_token_lifecycle.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, None),
    )?;
    let (_, certificate) = service.issue_certificate(&request.id, issuable_draft())?;

    // negative ttl is refused outright
    let err = service
        .share_certificate(&certificate.id, "client_123", -1, None, None)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::Validation(vec!["ttl".into()]))
    );

    // seven days, three accesses allowed
    let token = service.share_certificate(
        &certificate.id,
        "client_123",
        7 * 24 * 3600,
        Some(3),
        None,
    )?;

    for expected in 1..=3u64 {
        let viewed = service.access_shared(&token.token, None)?;
        assert_eq!(viewed.access_count, expected);
        assert!(viewed.last_accessed_at.is_some());
    }

    let err = service.access_shared(&token.token, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::TokenExhausted { used: 3, max: 3 })
    );

    // the certificate remembers the token for audit
    let stored = service.get_certificate(&certificate.id)?;
    assert_eq!(stored.share_count, 1);
    assert!(stored.share_tokens.contains(&token.token));

    // revocation deactivates without deleting
    let revoked = service.revoke_share(&token.token)?;
    assert!(!revoked.is_active);
    assert_eq!(service.get_token(&token.token)?, revoked);

    Ok(())
}

#[test]
fn default_limit_allows_one_hundred_accesses() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "default_limit.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, None),
    )?;
    let (_, certificate) = service.issue_certificate(&request.id, issuable_draft())?;

    // seven day ttl, default limit of 100
    let token =
        service.share_certificate(&certificate.id, "client_123", 7 * 24 * 3600, None, None)?;

    for _ in 0..100 {
        service.access_shared(&token.token, None)?;
    }

    let err = service.access_shared(&token.token, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::TokenExhausted { used: 100, max: 100 })
    );
    assert_eq!(service.get_certificate(&certificate.id)?.access_count, 100);

    Ok(())
}

#[test]
fn exhausted_token_never_yields_two_successes() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "last_slot_race.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, None),
    )?;
    let (_, certificate) = service.issue_certificate(&request.id, issuable_draft())?;

    let token = service.share_certificate(&certificate.id, "client_123", 3600, Some(1), None)?;

    let service = Arc::new(service);
    let mut successes = 0;
    let mut failures = Vec::new();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let token = token.token.clone();
                scope.spawn(move || service.access_shared(&token, None))
            })
            .collect();

        for handle in handles {
            match handle.join().expect("access thread panicked") {
                Ok(_) => successes += 1,
                Err(err) => failures.push(err),
            }
        }
    });

    assert_eq!(successes, 1, "exactly one consumer may take the last slot");
    // the loser either lost the swap or observed the exhausted counter
    for err in &failures {
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ConcurrentModification(_))
                | Some(EngineError::TokenExhausted { .. })
        ));
    }

    let stored = service.get_token(&token.token)?;
    assert_eq!(stored.current_access, 1);

    Ok(())
}

#[test]
fn concurrent_accesses_through_distinct_tokens_all_count() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "counter_contention.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, None),
    )?;
    let (_, certificate) = service.issue_certificate(&request.id, issuable_draft())?;

    // one token per viewer, so only the access counter is contended
    let tokens: Vec<_> = (0..4)
        .map(|_| service.share_certificate(&certificate.id, "client_123", 3600, None, None))
        .collect::<anyhow::Result<_>>()?;

    let service = Arc::new(service);
    std::thread::scope(|scope| {
        let handles: Vec<_> = tokens
            .iter()
            .map(|token| {
                let service = Arc::clone(&service);
                let token = token.token.clone();
                scope.spawn(move || service.access_shared(&token, None))
            })
            .collect();

        // every holder of a live slot gets through, races or not
        for handle in handles {
            handle
                .join()
                .expect("access thread panicked")
                .expect("access through a live token must succeed");
        }
    });

    assert_eq!(service.get_certificate(&certificate.id)?.access_count, 4);
    for token in &tokens {
        assert_eq!(service.get_token(&token.token)?.current_access, 1);
    }

    Ok(())
}

#[test]
fn revoked_certificate_cannot_be_shared() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "revoked_certificate.db")?;

    let request = service.open_request(draft_request()?)?;
    let request = service.submit_request(&request.id)?;
    let request = service.review_request(
        &request.id,
        reviewer_record(ApprovalAction::Approved, None),
    )?;
    let (_, certificate) = service.issue_certificate(&request.id, issuable_draft())?;

    let revoked = service.revoke_certificate(&certificate.id, "credential fraud")?;
    assert!(revoked.is_revoked);
    assert_eq!(revoked.revocation_reason.as_deref(), Some("credential fraud"));
    // workflow status still records the issuance
    assert_eq!(revoked.status, certificate.status);

    let err = service
        .share_certificate(&certificate.id, "client_123", 3600, None, None)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::PreconditionFailed(_))
    ));

    Ok(())
}

#[test]
fn document_verification_trail() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let (service, _db) = service_in(&temp_dir, "document_verification.db")?;

    let document = Document::new(
        new_uuid_to_bech32("doc_")?,
        "client_123",
        "Official transcript",
        TimeStamp::new(),
    );
    let document = service.register_document(document)?;
    assert_eq!(document.trail.current_status(), VerificationStatus::Pending);

    let document = service.record_verification(
        &document.id,
        VerificationStep::new(
            "ver_1",
            "Verifier",
            VerificationAction::RequestInfo,
            Some("need the original scan".into()),
            TimeStamp::new(),
        ),
    )?;
    assert_eq!(document.trail.current_status(), VerificationStatus::Pending);
    assert!(!document.trail.can_back_template());

    let document = service.record_verification(
        &document.id,
        VerificationStep::new(
            "ver_1",
            "Verifier",
            VerificationAction::Verify,
            None,
            TimeStamp::new(),
        )
        .level(2)
        .checked("watermark")
        .checked("registrar seal"),
    )?;
    assert_eq!(document.trail.current_status(), VerificationStatus::Verified);
    assert!(document.trail.can_back_template());
    assert_eq!(document.trail.steps().len(), 2);

    let reloaded = service.get_document(&document.id)?;
    assert_eq!(reloaded, document);

    Ok(())
}
