//! Purchase Orders domain module (event-sourced).
//!
//! Orders come from an accepted quote or straight from direct checkout; both
//! run the same `PLACED → CONFIRMED → SHIPPED → DELIVERED` lifecycle and only
//! differ in provenance. Ordered lines are an immutable snapshot.

pub mod order;
pub mod shipment;

pub use order::{
    AttachShipmentAdvice, CancelOrder, Cancellation, ConfirmDelivery, ConfirmOrder, OrderCancelled,
    OrderConfirmed, OrderDelivered, OrderId, OrderLine, OrderPlaced, OrderShipped, OrderSource,
    OrderStatus, PlaceOrder, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
    ShipOrder, ShipmentAdviceAttached,
};
pub use shipment::ShipmentAdvice;
