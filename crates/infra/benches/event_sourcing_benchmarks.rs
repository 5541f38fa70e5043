use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use tradedesk_auth::Actor;
use tradedesk_core::{AddressId, AggregateId, Currency, ExpectedVersion, SkuId, TenantId};
use tradedesk_events::{EventEnvelope, InMemoryEventBus};
use tradedesk_infra::command_dispatcher::CommandDispatcher;
use tradedesk_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use tradedesk_infra::projections::QuoteBoard;
use tradedesk_leads::{CreateLead, Lead, LeadCommand, LeadCreated, LeadEvent, LeadId};
use tradedesk_quotes::{
    CounterOffer, CreateQuote, LineUpdate, Quote, QuoteCommand, QuoteId, QuoteItem,
    SubmissionGates, SubmitQuote, quote,
};

type Dispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

fn dispatcher() -> Dispatcher {
    CommandDispatcher::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
    )
}

fn make_quote(_: TenantId, id: AggregateId) -> Quote {
    Quote::empty(QuoteId::new(id))
}

/// A quote in seller review after `rounds` counter-offers.
fn negotiated_quote(d: &Dispatcher, seller: TenantId, buyer: TenantId, rounds: u32) -> QuoteId {
    let quote_id = QuoteId::new(AggregateId::new());
    let now = Utc::now();
    let run = |cmd| {
        d.dispatch(seller, quote_id.0, quote::AGGREGATE_TYPE, cmd, make_quote)
            .unwrap();
    };
    run(QuoteCommand::CreateQuote(CreateQuote {
        tenant_id: seller,
        quote_id,
        number: "QT-000001".to_string(),
        buyer_id: buyer,
        storefront_id: None,
        destination_id: AddressId::new(),
        currency: Currency::new("USD").unwrap(),
        lead_id: None,
        expires_at: now + Duration::days(7),
        actor: Actor::buyer(buyer),
        occurred_at: now,
    }));
    run(QuoteCommand::SubmitQuote(SubmitQuote {
        tenant_id: seller,
        quote_id,
        items: (1..=5)
            .map(|line_no| QuoteItem {
                line_no,
                sku_id: SkuId::new(),
                quantity: 100,
                unit_price: 1_000,
                tier_id: None,
                seller_notes: None,
            })
            .collect(),
        shipping_cost: 2_500,
        gates: SubmissionGates {
            association_active: true,
            allow_associationless: false,
            require_approval: true,
            auto_approve: false,
            min_order_value: 0,
        },
        actor: Actor::buyer(buyer),
        occurred_at: now,
    }));
    for round in 0..rounds {
        let actor = if round % 2 == 0 {
            Actor::seller(seller)
        } else {
            Actor::buyer(buyer)
        };
        run(QuoteCommand::CounterOffer(CounterOffer {
            tenant_id: seller,
            quote_id,
            updates: vec![LineUpdate {
                line_no: 1,
                quantity: None,
                unit_price: Some(1_000 - u64::from(round % 100)),
                seller_notes: None,
            }],
            shipping_cost: None,
            actor,
            occurred_at: now,
        }));
    }
    quote_id
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");

    group.bench_function("create_lead_fresh", |b| {
        let d = dispatcher();
        let seller = TenantId::new();
        b.iter(|| {
            let lead_id = LeadId::new(AggregateId::new());
            d.dispatch(
                seller,
                lead_id.0,
                tradedesk_leads::lead::AGGREGATE_TYPE,
                LeadCommand::CreateLead(CreateLead {
                    tenant_id: seller,
                    lead_id,
                    buyer_email: black_box("buyer@example.com".to_string()),
                    details: "pallets".to_string(),
                    parent_id: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| Lead::empty(LeadId::new(id)),
            )
            .unwrap();
        });
    });

    for rounds in [0u32, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::new("rehydrate_quote", rounds),
            rounds,
            |b, &rounds| {
                let d = dispatcher();
                let seller = TenantId::new();
                let quote_id = negotiated_quote(&d, seller, TenantId::new(), rounds);
                b.iter(|| black_box(d.load(seller, quote_id.0, make_quote).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1usize, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let lead_id = LeadId::new(AggregateId::new());

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|_| {
                            let event = LeadEvent::LeadCreated(LeadCreated {
                                tenant_id,
                                lead_id,
                                buyer_email: "buyer@example.com".to_string(),
                                details: String::new(),
                                parent_id: None,
                                occurred_at: Utc::now(),
                            });
                            UncommittedEvent::from_typed(
                                tenant_id,
                                lead_id.0,
                                tradedesk_leads::lead::AGGREGATE_TYPE,
                                uuid::Uuid::now_v7(),
                                &event,
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(store.append(events, ExpectedVersion::Any).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_board_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("board_rebuild_speed");
    group.sample_size(20);

    for quotes in [10usize, 100].iter() {
        let d = dispatcher();
        let seller = TenantId::new();
        for _ in 0..*quotes {
            negotiated_quote(&d, seller, TenantId::new(), 4);
        }
        let events = d.store().load_by_type(quote::AGGREGATE_TYPE).unwrap().len();

        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::new("quote_board", quotes), &d, |b, d| {
            b.iter(|| {
                let board = QuoteBoard::default();
                black_box(board.rebuild(d.store()).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_board_rebuild_speed
);
criterion_main!(benches);
