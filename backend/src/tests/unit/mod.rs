pub mod documents;
pub mod scheduling;
pub mod workflows;
