//! Products and their finished-goods variants

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use super::movement::{MovementContext, MovementDirection, NewStockMovement, StockItem};
use crate::error::LedgerResult;
use crate::validation::{check_field, validate_non_negative, validate_positive_quantity};

/// Kind given to a variant when none is specified
pub const DEFAULT_VARIANT_KIND: &str = "Padrão";

/// Maximum length of a variant code, suffix included
pub const VARIANT_CODE_MAX_LEN: usize = 40;
const VARIANT_CODE_BASE_LEN: usize = 36;
const PRODUCT_FRAGMENT_LEN: usize = 8;

/// A grouping of sellable variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

/// A sellable configuration of a product with its own stock and cost
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinishedVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: String,
    /// Assigned once at creation, never rewritten
    pub code: String,
    pub quantity_on_hand: Decimal,
    pub unit_cost: Decimal,
    pub suggested_price: Decimal,
}

impl FinishedVariant {
    /// Add finished pieces at the variant's current unit cost
    pub fn credit(
        &mut self,
        quantity: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        check_field("quantity", validate_positive_quantity(quantity))?;
        self.quantity_on_hand += quantity;

        Ok(NewStockMovement {
            item: StockItem::Variant(self.id),
            direction: MovementDirection::In,
            quantity,
            unit_cost: self.unit_cost,
            context,
        })
    }

    /// Set a freshly computed unit cost, then credit the produced pieces
    pub fn record_production(
        &mut self,
        quantity: Decimal,
        unit_cost: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        check_field("quantity", validate_positive_quantity(quantity))?;
        check_field("unit_cost", validate_non_negative(unit_cost))?;
        self.unit_cost = unit_cost;
        self.credit(quantity, context)
    }
}

/// Upper-case ASCII fragment of `text` with everything but letters and digits removed
pub fn code_fragment(text: &str) -> String {
    text.nfkd()
        .filter(char::is_ascii)
        .map(|c| c.to_ascii_uppercase())
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Candidate code for a new variant, before collision handling
pub fn variant_code_base(product_id: Uuid, product_name: &str, kind: &str) -> String {
    let short_id = product_id.simple().to_string()[..8].to_ascii_uppercase();
    let product: String = code_fragment(product_name)
        .chars()
        .take(PRODUCT_FRAGMENT_LEN)
        .collect();
    let product = if product.is_empty() { "PROD".to_string() } else { product };

    let mut base = format!("{short_id}-{product}-{}", code_fragment(kind))
        .trim_matches('-')
        .to_string();
    base.truncate(VARIANT_CODE_BASE_LEN);
    base
}

/// First code derived from `base` that `is_taken` rejects, using `-2`, `-3`, ... suffixes
pub fn unique_variant_code<F>(base: &str, is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut code = base.to_string();
    let mut n = 1u32;
    while is_taken(&code) {
        n += 1;
        let suffix = format!("-{n}");
        let head: String = base
            .chars()
            .take(VARIANT_CODE_MAX_LEN.saturating_sub(suffix.len()))
            .collect();
        code = format!("{head}{suffix}");
    }
    code
}

/// Kinds to create when the caller passes none
pub fn kinds_or_default(kinds: &[String]) -> Vec<String> {
    let cleaned: Vec<String> = kinds
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if cleaned.is_empty() {
        vec![DEFAULT_VARIANT_KIND.to_string()]
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovementReason;
    use std::collections::HashSet;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn product_id() -> Uuid {
        Uuid::parse_str("0a1b2c3d-0000-4000-8000-000000000000").unwrap()
    }

    #[test]
    fn test_code_fragment_folds_accents_and_symbols() {
        assert_eq!(code_fragment("Padrão"), "PADRAO");
        assert_eq!(code_fragment("Baby look (M)"), "BABYLOOKM");
        assert_eq!(code_fragment("Camiseta Básica 100%"), "CAMISETABASICA100");
    }

    #[test]
    fn test_variant_code_base_layout() {
        let code = variant_code_base(product_id(), "Camiseta Básica", "Padrão");
        assert_eq!(code, "0A1B2C3D-CAMISETA-PADRAO");
    }

    #[test]
    fn test_variant_code_base_is_truncated() {
        let code = variant_code_base(product_id(), "Camiseta", &"Manga Longa Extra ".repeat(4));
        assert_eq!(code.len(), 36);
        assert!(code.starts_with("0A1B2C3D-CAMISETA-MANGALONGA"));
    }

    #[test]
    fn test_unique_code_appends_suffix() {
        let taken: HashSet<String> = ["ABC".to_string(), "ABC-2".to_string()].into();
        assert_eq!(unique_variant_code("ABC", |c| taken.contains(c)), "ABC-3");
        assert_eq!(unique_variant_code("XYZ", |c| taken.contains(c)), "XYZ");
    }

    #[test]
    fn test_unique_code_stays_within_limit() {
        let base = "A".repeat(36);
        let taken: HashSet<String> = [base.clone()].into();
        let code = unique_variant_code(&base, |c| taken.contains(c));
        assert_eq!(code, format!("{base}-2"));
        assert!(code.len() <= VARIANT_CODE_MAX_LEN);

        let long = "B".repeat(40);
        let code = unique_variant_code(&long, |c| c == long);
        assert_eq!(code.len(), VARIANT_CODE_MAX_LEN);
        assert!(code.ends_with("-2"));
    }

    #[test]
    fn test_unique_code_truncates_on_char_boundaries() {
        let base = "Ç".repeat(39);
        let code = unique_variant_code(&base, |c| c == base);
        assert_eq!(code, format!("{}-2", "Ç".repeat(38)));
        assert_eq!(code.chars().count(), VARIANT_CODE_MAX_LEN);
    }

    #[test]
    fn test_kinds_default_to_padrao() {
        assert_eq!(kinds_or_default(&[]), vec![DEFAULT_VARIANT_KIND.to_string()]);
        assert_eq!(
            kinds_or_default(&[" ".to_string(), "Baby look".to_string()]),
            vec!["Baby look".to_string()]
        );
    }

    #[test]
    fn test_record_production_sets_cost_and_credits() {
        let mut variant = FinishedVariant {
            id: Uuid::new_v4(),
            product_id: product_id(),
            kind: "Padrão".to_string(),
            code: "0A1B2C3D-CAMISETA-PADRAO".to_string(),
            quantity_on_hand: dec("2"),
            unit_cost: dec("10"),
            suggested_price: dec("49.90"),
        };
        let movement = variant
            .record_production(
                dec("5"),
                dec("12.3456"),
                MovementContext::new(MovementReason::ProductionOutput),
            )
            .unwrap();

        assert_eq!(variant.quantity_on_hand, dec("7"));
        assert_eq!(variant.unit_cost, dec("12.3456"));
        assert_eq!(movement.item, StockItem::Variant(variant.id));
        assert_eq!(movement.unit_cost, dec("12.3456"));
        assert_eq!(variant.code, "0A1B2C3D-CAMISETA-PADRAO");
    }
}
