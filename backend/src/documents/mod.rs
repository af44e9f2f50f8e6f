// Document lifecycle: proposals, contracts and the derivation between them

pub mod contract;
pub mod derivation;
pub mod lifecycle;
pub mod numbering;
pub mod proposal;

pub use contract::{ContractService, NewContract, NewParty, SignContract, SignOutcome};
pub use derivation::{boilerplate_sections, derive_contract, derive_sections};
pub use lifecycle::{Lifecycle, Stage};
pub use numbering::{format_number, DocumentNumbering};
pub use proposal::{AcceptedProposal, NewProposal, ProposalService, SignatureInput};

use rand::RngCore;

/// Random 32-byte token, hex encoded, used in public document links.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
