use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use tradedesk_core::{DomainError, DomainResult, SkuId};
use tradedesk_pricing::PriceTierId;

/// A quote line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItem {
    pub line_no: u32,
    pub sku_id: SkuId,
    pub quantity: u32,
    /// Smallest currency unit.
    pub unit_price: u64,
    /// Tier the price was resolved from; `None` for list-price fallback or
    /// after a counter-offer changed the price.
    pub tier_id: Option<PriceTierId>,
    pub seller_notes: Option<String>,
}

impl QuoteItem {
    pub fn line_total(&self) -> DomainResult<u64> {
        self.unit_price
            .checked_mul(u64::from(self.quantity))
            .ok_or_else(|| DomainError::validation("line total overflow"))
    }
}

/// Sum of line totals.
pub fn subtotal(items: &[QuoteItem]) -> DomainResult<u64> {
    items.iter().try_fold(0u64, |acc, item| {
        acc.checked_add(item.line_total()?)
            .ok_or_else(|| DomainError::validation("subtotal overflow"))
    })
}

/// Validate a full line set: non-empty, unique line numbers, positive values.
pub(crate) fn validate_items(items: &[QuoteItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("a quote needs at least one line item"));
    }
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.line_no) {
            return Err(DomainError::validation(format!(
                "duplicate line number {}",
                item.line_no
            )));
        }
        if item.quantity == 0 {
            return Err(DomainError::validation(format!(
                "line {} quantity must be positive",
                item.line_no
            )));
        }
        if item.unit_price == 0 {
            return Err(DomainError::validation(format!(
                "line {} unit price must be positive",
                item.line_no
            )));
        }
    }
    subtotal(items).map(|_| ())
}

/// A counter-offer change to one existing line. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUpdate {
    pub line_no: u32,
    pub quantity: Option<u32>,
    pub unit_price: Option<u64>,
    pub seller_notes: Option<String>,
}

impl LineUpdate {
    fn is_noop(&self) -> bool {
        self.quantity.is_none() && self.unit_price.is_none() && self.seller_notes.is_none()
    }
}

/// Produce the item set after applying `updates`; the input is untouched.
/// Only the seller may write `seller_notes`.
pub(crate) fn apply_updates(
    items: &[QuoteItem],
    updates: &[LineUpdate],
    by_seller: bool,
) -> DomainResult<Vec<QuoteItem>> {
    let mut next = items.to_vec();
    let mut touched = HashSet::new();
    for update in updates {
        if update.is_noop() {
            return Err(DomainError::validation(format!(
                "update for line {} changes nothing",
                update.line_no
            )));
        }
        if !touched.insert(update.line_no) {
            return Err(DomainError::validation(format!(
                "line {} updated twice",
                update.line_no
            )));
        }
        let line = next
            .iter_mut()
            .find(|l| l.line_no == update.line_no)
            .ok_or_else(|| DomainError::validation(format!("unknown line {}", update.line_no)))?;
        if let Some(q) = update.quantity {
            line.quantity = q;
        }
        if let Some(p) = update.unit_price {
            line.unit_price = p;
            line.tier_id = None;
        }
        if let Some(notes) = &update.seller_notes {
            if !by_seller {
                return Err(DomainError::denied(format!(
                    "line {} seller notes can only be set by the seller",
                    update.line_no
                )));
            }
            line.seller_notes = Some(notes.clone());
        }
    }
    validate_items(&next)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(line_no: u32, quantity: u32, unit_price: u64) -> QuoteItem {
        QuoteItem {
            line_no,
            sku_id: SkuId::new(),
            quantity,
            unit_price,
            tier_id: Some(PriceTierId::new()),
            seller_notes: None,
        }
    }

    #[test]
    fn subtotal_sums_line_totals() {
        assert_eq!(subtotal(&[item(1, 3, 100), item(2, 2, 50)]).unwrap(), 400);
        assert!(subtotal(&[item(1, u32::MAX, u64::MAX)]).is_err());
    }

    #[test]
    fn updates_change_only_named_lines_and_clear_tier_on_price_change() {
        let items = vec![item(1, 10, 100), item(2, 5, 200)];
        let next = apply_updates(
            &items,
            &[LineUpdate {
                line_no: 2,
                quantity: None,
                unit_price: Some(180),
                seller_notes: Some("bulk rate".to_string()),
            }],
            true,
        )
        .unwrap();

        assert_eq!(next[0], items[0]);
        assert_eq!(next[1].unit_price, 180);
        assert_eq!(next[1].tier_id, None);
        assert_eq!(next[1].seller_notes.as_deref(), Some("bulk rate"));
    }

    #[test]
    fn updates_reject_unknown_lines_and_zero_quantities() {
        let items = vec![item(1, 10, 100)];
        let unknown = LineUpdate {
            line_no: 9,
            quantity: Some(1),
            unit_price: None,
            seller_notes: None,
        };
        assert!(apply_updates(&items, &[unknown], true).is_err());

        let zero = LineUpdate {
            line_no: 1,
            quantity: Some(0),
            unit_price: None,
            seller_notes: None,
        };
        assert!(apply_updates(&items, &[zero], true).is_err());
    }

    #[test]
    fn buyer_updates_cannot_touch_seller_notes() {
        let items = vec![item(1, 10, 100)];
        let notes = LineUpdate {
            line_no: 1,
            quantity: Some(12),
            unit_price: None,
            seller_notes: Some("free shipping".to_string()),
        };
        let err = apply_updates(&items, std::slice::from_ref(&notes), false).unwrap_err();
        assert!(matches!(err, DomainError::AuthorizationDenied(_)));

        let quantity_only = LineUpdate { seller_notes: None, ..notes };
        let next = apply_updates(&items, &[quantity_only], false).unwrap();
        assert_eq!(next[0].quantity, 12);
        assert_eq!(next[0].seller_notes, None);
    }

    #[test]
    fn duplicate_line_numbers_are_rejected() {
        assert!(validate_items(&[item(1, 1, 1), item(1, 2, 2)]).is_err());
        assert!(validate_items(&[]).is_err());
    }
}
