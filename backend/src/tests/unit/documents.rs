// Proposal and contract lifecycles through the services

use chrono::{Datelike, Duration, Utc};
use flowdesk_shared::{ContractStatus, DocumentKind, PartyType, ProposalStatus};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::documents::SignContract;
use crate::error::DomainError;
use crate::store::DocumentRepository;
use crate::tests::fixtures::{contract_request, party, proposal_request, signature};
use crate::tests::{InterleavingStore, Interleaved, TestContext};
use crate::workflows::TriggerType;

fn sign_as(party_id: &str) -> SignContract {
    SignContract {
        party_id: party_id.to_string(),
        signature_data: "data:image/png;base64,AAAA".to_string(),
        signer_name: None,
        signer_email: None,
    }
}

// ============================================
// Proposals
// ============================================

#[tokio::test]
async fn test_create_numbers_and_totals_proposal() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let year = Utc::now().year();

    let first = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    let second = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();

    assert_eq!(first.status, ProposalStatus::Draft);
    assert_eq!(first.total, Decimal::new(12500, 2));
    assert_eq!(first.number, format!("PROP-{}-0001", year));
    assert_eq!(second.number, format!("PROP-{}-0002", year));
    assert_ne!(first.access_token, second.access_token);
    assert_eq!(first.access_token.len(), 64);
}

#[tokio::test]
async fn test_create_applies_discount_then_tax() {
    let ctx = TestContext::new().await;
    let mut request = proposal_request(ctx.client.id);
    request.discount = Some(Decimal::from(25));
    request.tax_rate = Some(Decimal::from(10));

    let proposal = ctx.proposals().create(ctx.workspace.id, request).await.unwrap();

    assert_eq!(proposal.subtotal, Decimal::from(125));
    assert_eq!(proposal.total, Decimal::new(11000, 2));
}

#[tokio::test]
async fn test_discount_above_subtotal_is_rejected() {
    let ctx = TestContext::new().await;
    let mut request = proposal_request(ctx.client.id);
    request.discount = Some(Decimal::from(126));

    let attempt = ctx.proposals().create(ctx.workspace.id, request).await;

    assert!(matches!(attempt, Err(DomainError::Invalid { field, .. }) if field == "discount"));

    let mut request = proposal_request(ctx.client.id);
    request.discount = Some(Decimal::from(125));
    let free = ctx.proposals().create(ctx.workspace.id, request).await.unwrap();
    assert_eq!(free.total, Decimal::ZERO);
    assert!(free.number.ends_with("-0001"));
}

#[tokio::test]
async fn test_create_for_unknown_client_fails() {
    let ctx = TestContext::new().await;
    let other = crate::tests::fixtures::client(ctx.workspace.id);

    let attempt = ctx.proposals().create(ctx.workspace.id, proposal_request(other.id)).await;

    assert!(matches!(attempt, Err(DomainError::NotFound { entity: "Client", .. })));
}

#[tokio::test]
async fn test_views_count_and_move_sent_to_viewed() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let proposal = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    let sent = service.send(ctx.workspace.id, proposal.id).await.unwrap();
    assert_eq!(sent.status, ProposalStatus::Sent);
    assert!(sent.sent_at.is_some());

    service.view(&proposal.access_token).await.unwrap();
    let viewed = service.view(&proposal.access_token).await.unwrap();

    assert_eq!(viewed.status, ProposalStatus::Viewed);
    assert_eq!(viewed.view_count, 2);

    let resend = service.send(ctx.workspace.id, proposal.id).await;
    assert!(matches!(resend, Err(DomainError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_accepting_a_draft_is_an_invalid_transition() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let proposal = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();

    let attempt = service.accept(&proposal.access_token, signature("Ada Lovelace")).await;

    assert!(matches!(attempt, Err(DomainError::InvalidTransition { .. })));
    assert!(ctx.store.contracts().await.is_empty());
}

#[tokio::test]
async fn test_accept_derives_contract_and_publishes_event() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let proposal = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    service.send(ctx.workspace.id, proposal.id).await.unwrap();

    let accepted = service
        .accept(&proposal.access_token, signature("Ada Lovelace"))
        .await
        .unwrap();

    assert_eq!(accepted.proposal.status, ProposalStatus::Accepted);
    assert_eq!(accepted.proposal.signer_name.as_deref(), Some("Ada Lovelace"));

    let contract = &accepted.contract;
    assert_eq!(contract.status, ContractStatus::Sent);
    assert_eq!(contract.proposal_id, Some(proposal.id));
    assert_eq!(contract.number, format!("CTR-{}-0001", Utc::now().year()));
    // pricing dropped, text carried over as a clause
    assert_eq!(contract.content.sections.len(), 1);
    assert_eq!(contract.content.sections[0].kind, "clause");
    assert!(!contract.parties[0].signed);
    assert!(contract.parties[1].signed);
    assert_eq!(contract.parties[1].name, "Ada Lovelace");
    assert_eq!(contract.parties[0].name, ctx.workspace.name);

    let signatures = ctx
        .store
        .signatures_for(DocumentKind::Proposal, proposal.id)
        .await
        .unwrap();
    assert_eq!(signatures.len(), 1);

    let events = ctx.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trigger_type, TriggerType::ProposalAccepted);
    assert_eq!(events[0].payload["contract_id"], contract.id.to_string());
}

#[tokio::test]
async fn test_second_acceptance_is_rejected() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let proposal = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    service.send(ctx.workspace.id, proposal.id).await.unwrap();

    service.accept(&proposal.access_token, signature("First")).await.unwrap();
    let again = service.accept(&proposal.access_token, signature("Second")).await;

    assert!(matches!(again, Err(DomainError::AlreadyAccepted)));
    assert_eq!(ctx.store.contracts().await.len(), 1);
}

#[tokio::test]
async fn test_racing_acceptances_produce_one_contract() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let proposal = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    service.send(ctx.workspace.id, proposal.id).await.unwrap();

    let (a, b) = tokio::join!(
        service.accept(&proposal.access_token, signature("A")),
        service.accept(&proposal.access_token, signature("B")),
    );

    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(DomainError::AlreadyAccepted)));
    assert_eq!(ctx.store.contracts().await.len(), 1);
}

#[tokio::test]
async fn test_view_between_load_and_commit_does_not_block_acceptance() {
    let ctx = TestContext::new().await;
    let proposal = ctx
        .proposals()
        .create(ctx.workspace.id, proposal_request(ctx.client.id))
        .await
        .unwrap();
    ctx.proposals().send(ctx.workspace.id, proposal.id).await.unwrap();

    let documents = Arc::new(InterleavingStore::new(ctx.store.clone(), Interleaved::View));
    let accepted = ctx
        .proposals_over(documents.clone())
        .accept(&proposal.access_token, signature("Ada"))
        .await
        .unwrap();

    assert!(documents.fired().await);
    assert_eq!(accepted.proposal.status, ProposalStatus::Accepted);
    assert_eq!(accepted.proposal.view_count, 1);
    assert_eq!(ctx.store.contracts().await.len(), 1);
    assert_eq!(ctx.events.types().await, vec![TriggerType::ProposalAccepted]);
}

#[tokio::test]
async fn test_accept_after_validity_is_expired() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let mut request = proposal_request(ctx.client.id);
    request.valid_until = Some(Utc::now() - Duration::days(1));
    let proposal = service.create(ctx.workspace.id, request).await.unwrap();
    service.send(ctx.workspace.id, proposal.id).await.unwrap();

    let attempt = service.accept(&proposal.access_token, signature("Late")).await;

    assert!(matches!(attempt, Err(DomainError::ProposalExpired)));
    let stored = service.get(ctx.workspace.id, proposal.id).await.unwrap();
    assert_eq!(stored.status, ProposalStatus::Sent);
    assert_eq!(stored.effective_status(Utc::now()), ProposalStatus::Expired);
}

#[tokio::test]
async fn test_decline_records_reason_and_closes_proposal() {
    let ctx = TestContext::new().await;
    let service = ctx.proposals();
    let proposal = service.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    service.send(ctx.workspace.id, proposal.id).await.unwrap();

    let declined = service
        .decline(&proposal.access_token, Some("Over budget".to_string()))
        .await
        .unwrap();
    assert_eq!(declined.status, ProposalStatus::Declined);
    assert_eq!(declined.decline_reason.as_deref(), Some("Over budget"));

    let accept = service.accept(&proposal.access_token, signature("Ada")).await;
    assert!(matches!(accept, Err(DomainError::AlreadyDeclined)));
}

// ============================================
// Contracts
// ============================================

#[tokio::test]
async fn test_last_signature_completes_derived_contract() {
    let ctx = TestContext::new().await;
    let proposals = ctx.proposals();
    let proposal = proposals.create(ctx.workspace.id, proposal_request(ctx.client.id)).await.unwrap();
    proposals.send(ctx.workspace.id, proposal.id).await.unwrap();
    let accepted = proposals.accept(&proposal.access_token, signature("Ada")).await.unwrap();

    let contracts = ctx.contracts();
    let signed = contracts
        .sign(&accepted.contract.access_token, sign_as("party_1"))
        .await
        .unwrap();

    assert!(signed.fully_signed);
    assert!(signed.fully_signed_at.is_some());
    assert_eq!(signed.status, ContractStatus::Signed);
    assert_eq!(
        ctx.events.types().await,
        vec![TriggerType::ProposalAccepted, TriggerType::ContractSigned]
    );

    let again = contracts
        .sign(&accepted.contract.access_token, sign_as("party_2"))
        .await;
    assert!(matches!(again, Err(DomainError::AlreadyFullySigned)));
}

#[tokio::test]
async fn test_standalone_contract_lifecycle() {
    let ctx = TestContext::new().await;
    let service = ctx.contracts();

    let contract = service
        .create(ctx.workspace.id, contract_request(Some(ctx.client.id)))
        .await
        .unwrap();
    assert_eq!(contract.status, ContractStatus::Draft);
    assert_eq!(contract.content.sections.len(), 3);
    assert_eq!(contract.parties[1].id, "party_2");

    let early = service.sign(&contract.access_token, sign_as("party_1")).await;
    assert!(matches!(early, Err(DomainError::InvalidTransition { .. })));

    service.send(ctx.workspace.id, contract.id).await.unwrap();
    let viewed = service.view(&contract.access_token).await.unwrap();
    assert_eq!(viewed.status, ContractStatus::Viewed);

    let partial = service.sign(&contract.access_token, sign_as("party_1")).await.unwrap();
    assert!(!partial.fully_signed);
    assert_eq!(partial.status, ContractStatus::Viewed);

    let twice = service.sign(&contract.access_token, sign_as("party_1")).await;
    assert!(matches!(twice, Err(DomainError::PartyAlreadySigned(id)) if id == "party_1"));

    let stranger = service.sign(&contract.access_token, sign_as("party_9")).await;
    assert!(matches!(stranger, Err(DomainError::NotFound { entity: "Party", .. })));

    let signed = service.sign(&contract.access_token, sign_as("party_2")).await.unwrap();
    assert_eq!(signed.status, ContractStatus::Signed);

    let signatures = service.signatures(ctx.workspace.id, contract.id).await.unwrap();
    assert_eq!(signatures.len(), 2);

    let completed = service.complete(ctx.workspace.id, contract.id).await.unwrap();
    assert_eq!(completed.status, ContractStatus::Completed);

    let cancel = service.cancel(ctx.workspace.id, contract.id).await;
    assert!(matches!(cancel, Err(DomainError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_concurrent_writes_do_not_block_a_signature() {
    let ctx = TestContext::new().await;
    let mut request = contract_request(None);
    request.parties.push(party(PartyType::Individual, "Witness"));
    let contract = ctx.contracts().create(ctx.workspace.id, request).await.unwrap();
    ctx.contracts().send(ctx.workspace.id, contract.id).await.unwrap();

    let viewing = Arc::new(InterleavingStore::new(ctx.store.clone(), Interleaved::View));
    let first = ctx
        .contracts_over(viewing.clone())
        .sign(&contract.access_token, sign_as("party_1"))
        .await
        .unwrap();
    assert!(viewing.fired().await);
    assert!(first.party("party_1").is_some_and(|p| p.signed));
    assert_eq!(first.view_count, 1);

    // party_3 signs after party_2 loaded the row; both signatures survive
    let signing = Arc::new(InterleavingStore::new(
        ctx.store.clone(),
        Interleaved::Signature(sign_as("party_3")),
    ));
    let last = ctx
        .contracts_over(signing.clone())
        .sign(&contract.access_token, sign_as("party_2"))
        .await
        .unwrap();

    assert!(signing.fired().await);
    assert!(last.fully_signed);
    assert_eq!(last.status, ContractStatus::Signed);
    assert_eq!(
        ctx.contracts().signatures(ctx.workspace.id, contract.id).await.unwrap().len(),
        3
    );
    assert_eq!(ctx.events.types().await, vec![TriggerType::ContractSigned]);
}

#[tokio::test]
async fn test_party_signing_while_another_loaded_reports_already_signed() {
    let ctx = TestContext::new().await;
    let contract = ctx.contracts().create(ctx.workspace.id, contract_request(None)).await.unwrap();
    ctx.contracts().send(ctx.workspace.id, contract.id).await.unwrap();

    let documents = Arc::new(InterleavingStore::new(
        ctx.store.clone(),
        Interleaved::Signature(sign_as("party_1")),
    ));
    let attempt = ctx
        .contracts_over(documents)
        .sign(&contract.access_token, sign_as("party_1"))
        .await;

    assert!(matches!(attempt, Err(DomainError::PartyAlreadySigned(id)) if id == "party_1"));
}

#[tokio::test]
async fn test_cancel_and_complete_guards() {
    let ctx = TestContext::new().await;
    let service = ctx.contracts();
    let first = service.create(ctx.workspace.id, contract_request(None)).await.unwrap();
    let second = service.create(ctx.workspace.id, contract_request(None)).await.unwrap();

    let cancelled = service.cancel(ctx.workspace.id, first.id).await.unwrap();
    assert_eq!(cancelled.status, ContractStatus::Cancelled);

    service.send(ctx.workspace.id, second.id).await.unwrap();
    let early = service.complete(ctx.workspace.id, second.id).await;
    assert!(matches!(early, Err(DomainError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_duplicate_party_ids_are_rejected() {
    let ctx = TestContext::new().await;
    let mut request = contract_request(None);
    for party in &mut request.parties {
        party.id = Some("signer".to_string());
    }

    let attempt = ctx.contracts().create(ctx.workspace.id, request).await;

    assert!(matches!(attempt, Err(DomainError::Invalid { field, .. }) if field == "parties"));
}

#[tokio::test]
async fn test_contract_without_parties_is_rejected() {
    let ctx = TestContext::new().await;
    let mut request = contract_request(None);
    request.parties.clear();

    let attempt = ctx.contracts().create(ctx.workspace.id, request).await;

    assert!(matches!(attempt, Err(DomainError::Invalid { field, .. }) if field == "parties"));
}

#[tokio::test]
async fn test_invalid_party_email_is_rejected() {
    let ctx = TestContext::new().await;
    let mut request = contract_request(None);
    request.parties[1].email = Some("not-an-email".to_string());

    let attempt = ctx.contracts().create(ctx.workspace.id, request).await;

    assert!(matches!(attempt, Err(DomainError::Invalid { field, .. }) if field == "parties"));
}

#[tokio::test]
async fn test_stale_version_write_is_refused() {
    let ctx = TestContext::new().await;
    let contract = ctx.contracts().create(ctx.workspace.id, contract_request(None)).await.unwrap();
    ctx.contracts().send(ctx.workspace.id, contract.id).await.unwrap();

    // `contract` still carries the version read before the send
    let mut stale = contract.clone();
    stale.status = ContractStatus::Cancelled;
    stale.version += 1;
    let written = ctx.store.update_contract(&stale, contract.version).await.unwrap();

    assert!(!written);
}
