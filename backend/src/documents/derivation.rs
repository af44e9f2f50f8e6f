// Contract derivation from an accepted proposal

use chrono::{DateTime, Utc};
use flowdesk_shared::{
    Client, Contract, ContractStatus, DocumentContent, Party, PartyType, Proposal, Section,
    Workspace,
};
use uuid::Uuid;

/// Section types that only make sense in a priced proposal.
const PRICING_SECTIONS: [&str; 2] = ["pricing", "invoice"];

fn contract_section_kind(proposal_kind: &str) -> &'static str {
    match proposal_kind {
        "header" => "header",
        "text" => "clause",
        _ => "terms",
    }
}

/// Non-pricing proposal sections remapped to contract sections, in order.
/// Line items never carry over.
pub fn derive_sections(content: &DocumentContent, reference: &str) -> DocumentContent {
    let sections: Vec<Section> = content
        .sections
        .iter()
        .filter(|s| !PRICING_SECTIONS.contains(&s.kind.as_str()))
        .map(|s| Section {
            kind: contract_section_kind(&s.kind).to_string(),
            title: s.title.clone(),
            body: s.body.clone(),
            items: Vec::new(),
        })
        .collect();

    if sections.is_empty() {
        boilerplate_sections(reference)
    } else {
        DocumentContent { sections }
    }
}

pub fn boilerplate_sections(reference: &str) -> DocumentContent {
    DocumentContent {
        sections: vec![
            Section::new("header").with_title("Service Agreement"),
            Section::new("clause")
                .with_title("Scope of Work")
                .with_body(format!(
                    "The services described in {} will be delivered as agreed by both parties.",
                    reference
                )),
            Section::new("terms")
                .with_title("Terms and Conditions")
                .with_body(
                    "Payment is due according to the agreed schedule. Either party may terminate \
                     this agreement with written notice.",
                ),
        ],
    }
}

/// Build the contract produced by accepting `proposal`.
///
/// Party 1 is the workspace and still has to sign. Party 2 is the signer
/// (or the client when no signer name was given) and counts as signed by
/// the acceptance itself.
pub fn derive_contract(
    proposal: &Proposal,
    workspace: &Workspace,
    client: Option<&Client>,
    number: String,
    access_token: String,
    now: DateTime<Utc>,
) -> Contract {
    let accepted_at = proposal.accepted_at.unwrap_or(now);

    let provider = Party {
        id: "party_1".to_string(),
        kind: PartyType::Company,
        name: workspace.name.clone(),
        email: workspace.email.clone(),
        role: "Service Provider".to_string(),
        signed: false,
        signature_data: None,
        signed_at: None,
    };

    let client_party = Party {
        id: "party_2".to_string(),
        kind: PartyType::Individual,
        name: proposal
            .signer_name
            .clone()
            .or_else(|| client.map(|c| c.name.clone()))
            .unwrap_or_else(|| "Client".to_string()),
        email: proposal
            .signer_email
            .clone()
            .or_else(|| client.and_then(|c| c.email.clone())),
        role: "Client".to_string(),
        signed: true,
        signature_data: proposal.signature_data.clone(),
        signed_at: Some(proposal.signed_at.unwrap_or(accepted_at)),
    };

    Contract {
        id: Uuid::new_v4(),
        workspace_id: proposal.workspace_id,
        client_id: Some(proposal.client_id),
        proposal_id: Some(proposal.id),
        number,
        title: proposal.title.clone(),
        content: derive_sections(&proposal.content, &format!("proposal {}", proposal.number)),
        parties: vec![provider, client_party],
        status: ContractStatus::Sent,
        fully_signed: false,
        fully_signed_at: None,
        effective_date: Some(accepted_at),
        expiry_date: proposal.valid_until,
        access_token,
        sent_at: Some(now),
        viewed_at: None,
        view_count: 0,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}
