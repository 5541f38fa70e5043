//! Leads domain module (event-sourced).
//!
//! Pre-sales inquiries from a buyer contact to a seller. A lead is never
//! deleted; it only moves along `NEW → CONTACTED → QUALIFIED → CONVERTED`,
//! drops to `LOST`, or fans out to other sellers and becomes `FORWARDED`.

pub mod lead;

pub use lead::{
    ContactLead, ConversionTerms, ConvertLead, CreateLead, ForwardLead, ForwardTarget, Lead, LeadCommand,
    LeadContacted, LeadConverted, LeadCreated, LeadEvent, LeadForwarded, LeadId, LeadLost,
    LeadQualified, LeadStatus, MarkLeadLost, QualifyLead,
};
