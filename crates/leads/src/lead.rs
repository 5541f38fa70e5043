use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_auth::{Actor, Requirement, ResourceOwners, authorize};
use tradedesk_core::{
    AddressId, Aggregate, AggregateId, AggregateRoot, Currency, DomainError, StorefrontId, TenantId,
};
use tradedesk_events::Event;

/// Lead identifier (streams are owned by the lead's seller).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub AggregateId);

/// Aggregate type tag of lead streams.
pub const AGGREGATE_TYPE: &str = "leads.lead";

impl LeadId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LeadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Lead status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
    /// Fanned out to other sellers; pseudo-terminal.
    Forwarded,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::Qualified => "QUALIFIED",
            LeadStatus::Converted => "CONVERTED",
            LeadStatus::Lost => "LOST",
            LeadStatus::Forwarded => "FORWARDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadStatus::Converted | LeadStatus::Lost | LeadStatus::Forwarded
        )
    }

    /// Edges of the lead graph.
    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        use LeadStatus::*;
        match (self, next) {
            (New, Contacted) | (Contacted, Qualified) | (Qualified, Converted) => true,
            (New, Forwarded) => true,
            (from, Lost) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl core::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One child lead spawned by a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub lead_id: LeadId,
    pub seller_id: TenantId,
}

/// Terms the quote of a converted lead is opened with.
///
/// Recorded on the lead so the quote can be (re)created from the lead alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTerms {
    pub buyer_id: TenantId,
    pub destination_id: AddressId,
    pub currency: Currency,
    pub storefront_id: Option<StorefrontId>,
}

/// Aggregate root: Lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    id: LeadId,
    tenant_id: Option<TenantId>,
    buyer_email: String,
    details: String,
    parent_id: Option<LeadId>,
    children: Vec<ForwardTarget>,
    quote_id: Option<AggregateId>,
    conversion: Option<ConversionTerms>,
    lost_reason: Option<String>,
    status: LeadStatus,
    status_history: Vec<LeadStatus>,
    version: u64,
    created: bool,
}

impl Lead {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LeadId) -> Self {
        Self {
            id,
            tenant_id: None,
            buyer_email: String::new(),
            details: String::new(),
            parent_id: None,
            children: Vec::new(),
            quote_id: None,
            conversion: None,
            lost_reason: None,
            status: LeadStatus::New,
            status_history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LeadId {
        self.id
    }

    /// The seller the inquiry is directed at.
    pub fn seller_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn buyer_email(&self) -> &str {
        &self.buyer_email
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn parent_id(&self) -> Option<LeadId> {
        self.parent_id
    }

    pub fn children(&self) -> &[ForwardTarget] {
        &self.children
    }

    pub fn quote_id(&self) -> Option<AggregateId> {
        self.quote_id
    }

    pub fn conversion_terms(&self) -> Option<ConversionTerms> {
        self.conversion
    }

    pub fn lost_reason(&self) -> Option<&str> {
        self.lost_reason.as_deref()
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    /// Every status visited, oldest first.
    pub fn status_history(&self) -> &[LeadStatus] {
        &self.status_history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Lead {
    type Id = LeadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub buyer_email: String,
    pub details: String,
    /// Set when the lead is a fan-out child.
    pub parent_id: Option<LeadId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ContactLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: QualifyLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConvertLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub quote_id: AggregateId,
    pub terms: ConversionTerms,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkLeadLost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLeadLost {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub reason_code: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ForwardLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardLead {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub targets: Vec<ForwardTarget>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadCommand {
    CreateLead(CreateLead),
    ContactLead(ContactLead),
    QualifyLead(QualifyLead),
    ConvertLead(ConvertLead),
    MarkLeadLost(MarkLeadLost),
    ForwardLead(ForwardLead),
}

/// Event: LeadCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCreated {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub buyer_email: String,
    pub details: String,
    pub parent_id: Option<LeadId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadContacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadContacted {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadQualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadQualified {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadConverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadConverted {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub quote_id: AggregateId,
    pub terms: ConversionTerms,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadLost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadLost {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub reason_code: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadForwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadForwarded {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub targets: Vec<ForwardTarget>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadEvent {
    LeadCreated(LeadCreated),
    LeadContacted(LeadContacted),
    LeadQualified(LeadQualified),
    LeadConverted(LeadConverted),
    LeadLost(LeadLost),
    LeadForwarded(LeadForwarded),
}

impl Event for LeadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeadEvent::LeadCreated(_) => "leads.lead.created",
            LeadEvent::LeadContacted(_) => "leads.lead.contacted",
            LeadEvent::LeadQualified(_) => "leads.lead.qualified",
            LeadEvent::LeadConverted(_) => "leads.lead.converted",
            LeadEvent::LeadLost(_) => "leads.lead.lost",
            LeadEvent::LeadForwarded(_) => "leads.lead.forwarded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LeadEvent::LeadCreated(e) => e.occurred_at,
            LeadEvent::LeadContacted(e) => e.occurred_at,
            LeadEvent::LeadQualified(e) => e.occurred_at,
            LeadEvent::LeadConverted(e) => e.occurred_at,
            LeadEvent::LeadLost(e) => e.occurred_at,
            LeadEvent::LeadForwarded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lead {
    type Command = LeadCommand;
    type Event = LeadEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeadEvent::LeadCreated(e) => {
                self.id = e.lead_id;
                self.tenant_id = Some(e.tenant_id);
                self.buyer_email = e.buyer_email.clone();
                self.details = e.details.clone();
                self.parent_id = e.parent_id;
                self.status = LeadStatus::New;
                self.status_history = vec![LeadStatus::New];
                self.created = true;
            }
            LeadEvent::LeadContacted(_) => self.enter(LeadStatus::Contacted),
            LeadEvent::LeadQualified(_) => self.enter(LeadStatus::Qualified),
            LeadEvent::LeadConverted(e) => {
                self.quote_id = Some(e.quote_id);
                self.conversion = Some(e.terms);
                self.enter(LeadStatus::Converted);
            }
            LeadEvent::LeadLost(e) => {
                self.lost_reason = Some(e.reason_code.clone());
                self.enter(LeadStatus::Lost);
            }
            LeadEvent::LeadForwarded(e) => {
                self.children = e.targets.clone();
                self.enter(LeadStatus::Forwarded);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LeadCommand::CreateLead(cmd) => self.handle_create(cmd),
            LeadCommand::ContactLead(cmd) => self.handle_contact(cmd),
            LeadCommand::QualifyLead(cmd) => self.handle_qualify(cmd),
            LeadCommand::ConvertLead(cmd) => self.handle_convert(cmd),
            LeadCommand::MarkLeadLost(cmd) => self.handle_mark_lost(cmd),
            LeadCommand::ForwardLead(cmd) => self.handle_forward(cmd),
        }
    }
}

impl Lead {
    fn enter(&mut self, status: LeadStatus) {
        self.status = status;
        self.status_history.push(status);
    }

    fn ensure_exists(&self, tenant_id: TenantId, lead_id: LeadId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != lead_id {
            return Err(DomainError::invariant("lead_id mismatch"));
        }
        Ok(())
    }

    fn ensure_transition(&self, next: LeadStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::transition(self.status.as_str(), next.as_str()));
        }
        Ok(())
    }

    /// Only the lead's seller acts on a lead; the buyer is a contact, not a tenant.
    fn ensure_seller(&self, actor: &Actor) -> Result<(), DomainError> {
        let Some(seller) = self.tenant_id else {
            return Err(DomainError::not_found());
        };
        authorize(actor, &ResourceOwners::new(seller, None), Requirement::SellerOnly)?;
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateLead) -> Result<Vec<LeadEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invariant("lead already exists"));
        }
        let email = cmd.buyer_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("buyer email is required"));
        }
        if cmd.parent_id == Some(cmd.lead_id) {
            return Err(DomainError::validation("a lead cannot be its own parent"));
        }

        Ok(vec![LeadEvent::LeadCreated(LeadCreated {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            buyer_email: email.to_string(),
            details: cmd.details.clone(),
            parent_id: cmd.parent_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_contact(&self, cmd: &ContactLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_transition(LeadStatus::Contacted)?;
        self.ensure_seller(&cmd.actor)?;

        Ok(vec![LeadEvent::LeadContacted(LeadContacted {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_qualify(&self, cmd: &QualifyLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_transition(LeadStatus::Qualified)?;
        self.ensure_seller(&cmd.actor)?;

        Ok(vec![LeadEvent::LeadQualified(LeadQualified {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &ConvertLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_transition(LeadStatus::Converted)?;
        self.ensure_seller(&cmd.actor)?;
        if cmd.terms.buyer_id == cmd.tenant_id {
            return Err(DomainError::validation("seller and buyer must differ"));
        }

        Ok(vec![LeadEvent::LeadConverted(LeadConverted {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            quote_id: cmd.quote_id,
            terms: cmd.terms,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_lost(&self, cmd: &MarkLeadLost) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_transition(LeadStatus::Lost)?;
        self.ensure_seller(&cmd.actor)?;

        let reason = cmd.reason_code.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a reason code is required"));
        }

        Ok(vec![LeadEvent::LeadLost(LeadLost {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            reason_code: reason.to_string(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_forward(&self, cmd: &ForwardLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.lead_id)?;
        self.ensure_transition(LeadStatus::Forwarded)?;
        self.ensure_seller(&cmd.actor)?;

        if self.parent_id.is_some() {
            return Err(DomainError::invariant(
                "a forwarded lead cannot be forwarded again",
            ));
        }
        if cmd.targets.is_empty() {
            return Err(DomainError::validation(
                "forwarding requires at least one candidate seller",
            ));
        }
        let mut sellers = HashSet::new();
        let mut leads = HashSet::new();
        for target in &cmd.targets {
            if Some(target.seller_id) == self.tenant_id {
                return Err(DomainError::validation(
                    "a lead cannot be forwarded to its own seller",
                ));
            }
            if !sellers.insert(target.seller_id) || !leads.insert(target.lead_id) {
                return Err(DomainError::validation("candidate sellers must be distinct"));
            }
            if target.lead_id == self.id {
                return Err(DomainError::validation("child lead id must be new"));
            }
        }

        Ok(vec![LeadEvent::LeadForwarded(LeadForwarded {
            tenant_id: cmd.tenant_id,
            lead_id: cmd.lead_id,
            targets: cmd.targets.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tradedesk_events::execute;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_lead_id() -> LeadId {
        LeadId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_lead(seller: TenantId, parent_id: Option<LeadId>) -> Lead {
        let lead_id = test_lead_id();
        let mut lead = Lead::empty(lead_id);
        execute(
            &mut lead,
            &LeadCommand::CreateLead(CreateLead {
                tenant_id: seller,
                lead_id,
                buyer_email: "buyer@example.com".to_string(),
                details: "200 pallets".to_string(),
                parent_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        lead
    }

    fn contact(lead: &Lead, actor: Actor) -> LeadCommand {
        LeadCommand::ContactLead(ContactLead {
            tenant_id: lead.seller_id().unwrap(),
            lead_id: lead.id_typed(),
            actor,
            occurred_at: test_time(),
        })
    }

    fn qualify(lead: &Lead, actor: Actor) -> LeadCommand {
        LeadCommand::QualifyLead(QualifyLead {
            tenant_id: lead.seller_id().unwrap(),
            lead_id: lead.id_typed(),
            actor,
            occurred_at: test_time(),
        })
    }

    fn convert(lead: &Lead, actor: Actor) -> LeadCommand {
        LeadCommand::ConvertLead(ConvertLead {
            tenant_id: lead.seller_id().unwrap(),
            lead_id: lead.id_typed(),
            quote_id: AggregateId::new(),
            terms: terms(),
            actor,
            occurred_at: test_time(),
        })
    }

    fn terms() -> ConversionTerms {
        ConversionTerms {
            buyer_id: TenantId::new(),
            destination_id: AddressId::new(),
            currency: Currency::new("EUR").unwrap(),
            storefront_id: None,
        }
    }

    fn lose(lead: &Lead, actor: Actor, reason: &str) -> LeadCommand {
        LeadCommand::MarkLeadLost(MarkLeadLost {
            tenant_id: lead.seller_id().unwrap(),
            lead_id: lead.id_typed(),
            reason_code: reason.to_string(),
            actor,
            occurred_at: test_time(),
        })
    }

    fn forward(lead: &Lead, actor: Actor, sellers: &[TenantId]) -> LeadCommand {
        LeadCommand::ForwardLead(ForwardLead {
            tenant_id: lead.seller_id().unwrap(),
            lead_id: lead.id_typed(),
            targets: sellers
                .iter()
                .map(|s| ForwardTarget {
                    lead_id: test_lead_id(),
                    seller_id: *s,
                })
                .collect(),
            actor,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_lead_emits_lead_created_event() {
        let seller = test_tenant_id();
        let lead_id = test_lead_id();
        let lead = Lead::empty(lead_id);
        let events = lead
            .handle(&LeadCommand::CreateLead(CreateLead {
                tenant_id: seller,
                lead_id,
                buyer_email: " buyer@example.com ".to_string(),
                details: String::new(),
                parent_id: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            LeadEvent::LeadCreated(e) => {
                assert_eq!(e.tenant_id, seller);
                assert_eq!(e.lead_id, lead_id);
                assert_eq!(e.buyer_email, "buyer@example.com");
            }
            _ => panic!("Expected LeadCreated event"),
        }
    }

    #[test]
    fn create_lead_requires_an_email() {
        let lead_id = test_lead_id();
        let err = Lead::empty(lead_id)
            .handle(&LeadCommand::CreateLead(CreateLead {
                tenant_id: test_tenant_id(),
                lead_id,
                buyer_email: "nobody".to_string(),
                details: String::new(),
                parent_id: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn happy_path_visits_every_edge_in_order() {
        let seller = test_tenant_id();
        let mut lead = created_lead(seller, None);
        let actor = Actor::seller(seller);

        let cmd = contact(&lead, actor.clone());

        execute(&mut lead, &cmd).unwrap();
        let cmd = qualify(&lead, actor.clone());
        execute(&mut lead, &cmd).unwrap();
        let cmd = convert(&lead, actor);
        execute(&mut lead, &cmd).unwrap();

        assert_eq!(lead.status(), LeadStatus::Converted);
        assert!(lead.quote_id().is_some());
        assert_eq!(
            lead.status_history(),
            &[
                LeadStatus::New,
                LeadStatus::Contacted,
                LeadStatus::Qualified,
                LeadStatus::Converted
            ]
        );
        assert_eq!(lead.version(), 4);
    }

    #[test]
    fn conversion_keeps_the_quote_terms() {
        let seller = test_tenant_id();
        let mut lead = created_lead(seller, None);
        let actor = Actor::seller(seller);
        let cmd = contact(&lead, actor.clone());
        execute(&mut lead, &cmd).unwrap();
        let cmd = qualify(&lead, actor.clone());
        execute(&mut lead, &cmd).unwrap();
        assert_eq!(lead.conversion_terms(), None);

        let mut own = terms();
        own.buyer_id = seller;
        let LeadCommand::ConvertLead(mut cmd) = convert(&lead, actor) else {
            unreachable!()
        };
        let agreed = cmd.terms;
        cmd.terms = own;
        let err = lead.handle(&LeadCommand::ConvertLead(cmd.clone())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(lead.status(), LeadStatus::Qualified);

        cmd.terms = agreed;
        execute(&mut lead, &LeadCommand::ConvertLead(cmd)).unwrap();
        assert_eq!(lead.conversion_terms(), Some(agreed));
    }

    #[test]
    fn skipping_an_edge_is_an_invalid_transition() {
        let seller = test_tenant_id();
        let lead = created_lead(seller, None);
        let err = lead
            .handle(&convert(&lead, Actor::seller(seller)))
            .unwrap_err();
        assert_eq!(err, DomainError::transition("NEW", "CONVERTED"));
    }

    #[test]
    fn lost_lead_cannot_be_contacted() {
        let seller = test_tenant_id();
        let mut lead = created_lead(seller, None);
        let cmd = lose(&lead, Actor::seller(seller), "NO_BUDGET");
        execute(&mut lead, &cmd).unwrap();
        let before = lead.clone();

        let err = lead
            .handle(&contact(&lead, Actor::seller(seller)))
            .unwrap_err();

        assert_eq!(err, DomainError::transition("LOST", "CONTACTED"));
        assert_eq!(lead, before);
        assert_eq!(lead.lost_reason(), Some("NO_BUDGET"));
    }

    #[test]
    fn marking_lost_requires_a_reason_code() {
        let seller = test_tenant_id();
        let lead = created_lead(seller, None);
        let err = lead
            .handle(&lose(&lead, Actor::seller(seller), "  "))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn only_the_leads_seller_may_act() {
        let seller = test_tenant_id();
        let lead = created_lead(seller, None);

        let err = lead
            .handle(&contact(&lead, Actor::seller(test_tenant_id())))
            .unwrap_err();
        assert!(matches!(err, DomainError::AuthorizationDenied(_)));

        let err = lead
            .handle(&contact(&lead, Actor::system("sweeper")))
            .unwrap_err();
        assert!(matches!(err, DomainError::AuthorizationDenied(_)));
    }

    #[test]
    fn forward_fans_out_and_marks_lead_forwarded() {
        let seller = test_tenant_id();
        let mut lead = created_lead(seller, None);
        let others = [test_tenant_id(), test_tenant_id()];

        let cmd = forward(&lead, Actor::seller(seller), &others);

        let events = execute(&mut lead, &cmd).unwrap();

        match &events[0] {
            LeadEvent::LeadForwarded(e) => assert_eq!(e.targets.len(), 2),
            _ => panic!("Expected LeadForwarded event"),
        }
        assert_eq!(lead.status(), LeadStatus::Forwarded);
        assert!(lead.status().is_terminal());
        assert_eq!(lead.children().len(), 2);
    }

    #[test]
    fn forward_rejects_duplicates_self_and_empty_targets() {
        let seller = test_tenant_id();
        let lead = created_lead(seller, None);
        let actor = Actor::seller(seller);
        let other = test_tenant_id();

        for sellers in [vec![], vec![seller], vec![other, other]] {
            let err = lead.handle(&forward(&lead, actor.clone(), &sellers)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{sellers:?}");
        }
    }

    #[test]
    fn child_lead_cannot_be_forwarded_again() {
        let seller = test_tenant_id();
        let child = created_lead(seller, Some(test_lead_id()));
        let err = child
            .handle(&forward(&child, Actor::seller(seller), &[test_tenant_id()]))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn forward_is_only_allowed_from_new() {
        let seller = test_tenant_id();
        let mut lead = created_lead(seller, None);
        let cmd = contact(&lead, Actor::seller(seller));
        execute(&mut lead, &cmd).unwrap();
        let err = lead
            .handle(&forward(&lead, Actor::seller(seller), &[test_tenant_id()]))
            .unwrap_err();
        assert_eq!(err, DomainError::transition("CONTACTED", "FORWARDED"));
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Contact,
        Qualify,
        Convert,
        Lose,
        Forward,
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Contact),
            Just(Step::Qualify),
            Just(Step::Convert),
            Just(Step::Lose),
            Just(Step::Forward),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever is attempted, the visited statuses form a
        /// valid path through the lead graph.
        #[test]
        fn status_history_is_a_valid_path(steps in prop::collection::vec(arb_step(), 0..12)) {
            let seller = test_tenant_id();
            let actor = Actor::seller(seller);
            let mut lead = created_lead(seller, None);

            for step in steps {
                let cmd = match step {
                    Step::Contact => contact(&lead, actor.clone()),
                    Step::Qualify => qualify(&lead, actor.clone()),
                    Step::Convert => convert(&lead, actor.clone()),
                    Step::Lose => lose(&lead, actor.clone(), "NO_FIT"),
                    Step::Forward => forward(&lead, actor.clone(), &[test_tenant_id()]),
                };
                let before = lead.clone();
                if execute(&mut lead, &cmd).is_err() {
                    prop_assert_eq!(&lead, &before);
                }
            }

            let history = lead.status_history();
            prop_assert_eq!(history[0], LeadStatus::New);
            for pair in history.windows(2) {
                prop_assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
            }
            prop_assert_eq!(lead.version() as usize, history.len());
        }
    }
}
