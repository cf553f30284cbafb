//! Bills of materials and consumption phase resolution

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::types::quantize_quantity;
use crate::validation::{check_field, validate_positive_quantity};

/// Normalized name of the category consumed at cutting time
pub const FABRIC_CATEGORY: &str = "tecido";

/// Phase configured on a BOM entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BomPhase {
    /// Decide from the material's category
    #[default]
    Auto,
    Cut,
    Sew,
}

impl BomPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BomPhase::Auto => "auto",
            BomPhase::Cut => "cut",
            BomPhase::Sew => "sew",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(BomPhase::Auto),
            "cut" => Some(BomPhase::Cut),
            "sew" => Some(BomPhase::Sew),
            _ => None,
        }
    }
}

/// Phase at which a material is actually consumed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionPhase {
    Cut,
    Sew,
}

/// Case- and accent-insensitive form of a category name
pub fn normalize_category_name(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Effective consumption phase of a BOM entry
///
/// Explicit phases win. `Auto` means fabric is consumed when cutting and
/// every other category when sewing.
pub fn resolve_phase(category_name: &str, configured: BomPhase) -> ConsumptionPhase {
    match configured {
        BomPhase::Cut => ConsumptionPhase::Cut,
        BomPhase::Sew => ConsumptionPhase::Sew,
        BomPhase::Auto if normalize_category_name(category_name) == FABRIC_CATEGORY => {
            ConsumptionPhase::Cut
        }
        BomPhase::Auto => ConsumptionPhase::Sew,
    }
}

/// Material quantity needed for `units` pieces, 4 decimals
pub fn consumption_quantity(quantity_per_unit: Decimal, units: Decimal) -> Decimal {
    quantize_quantity(quantity_per_unit * units)
}

/// One line of a variant's recipe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BomEntry {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub material_id: Uuid,
    pub quantity_per_unit: Decimal,
    pub phase: BomPhase,
}

/// Input for adding a BOM entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBomEntry {
    pub variant_id: Uuid,
    pub material_id: Uuid,
    pub quantity_per_unit: Decimal,
    #[serde(default)]
    pub phase: BomPhase,
}

impl NewBomEntry {
    pub fn validate(&self) -> LedgerResult<()> {
        check_field(
            "quantity_per_unit",
            validate_positive_quantity(self.quantity_per_unit),
        )
    }
}

/// A BOM entry joined with the material data needed to consume it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomItem {
    pub entry: BomEntry,
    pub material_name: String,
    pub category_name: String,
}

impl BomItem {
    pub fn resolved_phase(&self) -> ConsumptionPhase {
        resolve_phase(&self.category_name, self.entry.phase)
    }
}

/// A quantity to issue from one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    pub material_id: Uuid,
    pub quantity: Decimal,
}

/// BOM items grouped by variant
#[derive(Debug, Clone, Default)]
pub struct BomIndex {
    items: BTreeMap<Uuid, Vec<BomItem>>,
}

impl BomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: BomItem) {
        self.items.entry(item.entry.variant_id).or_default().push(item);
    }

    pub fn items_for(&self, variant_id: Uuid) -> &[BomItem] {
        self.items.get(&variant_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Materials to issue for `units` pieces of a variant
    ///
    /// `phase` of `None` means every entry. Quantities that round to zero are left out.
    pub fn consumption(
        &self,
        variant_id: Uuid,
        phase: Option<ConsumptionPhase>,
        units: Decimal,
    ) -> Vec<Consumption> {
        self.items_for(variant_id)
            .iter()
            .filter(|item| phase.map_or(true, |p| item.resolved_phase() == p))
            .map(|item| Consumption {
                material_id: item.entry.material_id,
                quantity: consumption_quantity(item.entry.quantity_per_unit, units),
            })
            .filter(|c| c.quantity > Decimal::ZERO)
            .collect()
    }

    /// Every material referenced by the index
    pub fn material_ids(&self) -> BTreeSet<Uuid> {
        self.items
            .values()
            .flatten()
            .map(|item| item.entry.material_id)
            .collect()
    }
}

impl FromIterator<BomItem> for BomIndex {
    fn from_iter<I: IntoIterator<Item = BomItem>>(iter: I) -> Self {
        let mut index = BomIndex::new();
        for item in iter {
            index.insert(item);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(variant_id: Uuid, category: &str, qpu: &str, phase: BomPhase) -> BomItem {
        BomItem {
            entry: BomEntry {
                id: Uuid::new_v4(),
                variant_id,
                material_id: Uuid::new_v4(),
                quantity_per_unit: dec(qpu),
                phase,
            },
            material_name: format!("{category} item"),
            category_name: category.to_string(),
        }
    }

    #[test]
    fn test_auto_fabric_resolves_to_cut() {
        for name in ["Tecido", "TECIDO", "tecido", "Tecidó", "  Tecido  ", "TÉCIDO"] {
            assert_eq!(resolve_phase(name, BomPhase::Auto), ConsumptionPhase::Cut, "{name}");
        }
    }

    #[test]
    fn test_auto_other_categories_resolve_to_sew() {
        for name in ["Linha", "Botão", "Tecidos", "Papel de Estampa", ""] {
            assert_eq!(resolve_phase(name, BomPhase::Auto), ConsumptionPhase::Sew, "{name}");
        }
    }

    #[test]
    fn test_explicit_phase_wins() {
        assert_eq!(resolve_phase("Tecido", BomPhase::Sew), ConsumptionPhase::Sew);
        assert_eq!(resolve_phase("Linha", BomPhase::Cut), ConsumptionPhase::Cut);
    }

    #[test]
    fn test_consumption_filters_by_phase_and_quantizes() {
        let variant = Uuid::new_v4();
        let fabric = item(variant, "Tecido", "0.33333", BomPhase::Auto);
        let thread = item(variant, "Linha", "12.5", BomPhase::Auto);
        let index: BomIndex = [fabric.clone(), thread.clone()].into_iter().collect();

        let cut = index.consumption(variant, Some(ConsumptionPhase::Cut), dec("3"));
        assert_eq!(
            cut,
            vec![Consumption {
                material_id: fabric.entry.material_id,
                quantity: dec("1.0000"),
            }]
        );

        let sew = index.consumption(variant, Some(ConsumptionPhase::Sew), dec("2"));
        assert_eq!(sew.len(), 1);
        assert_eq!(sew[0].quantity, dec("25"));

        assert_eq!(index.consumption(variant, None, dec("1")).len(), 2);
    }

    #[test]
    fn test_consumption_skips_zero_quantities() {
        let variant = Uuid::new_v4();
        let index: BomIndex = [item(variant, "Etiqueta", "0.0001", BomPhase::Sew)]
            .into_iter()
            .collect();
        assert!(index.consumption(variant, None, dec("0.4")).is_empty());
    }

    #[test]
    fn test_unknown_variant_has_no_items() {
        let index = BomIndex::new();
        assert!(index.items_for(Uuid::new_v4()).is_empty());
        assert!(index.material_ids().is_empty());
    }

    #[test]
    fn test_new_entry_requires_positive_quantity() {
        let entry = NewBomEntry {
            variant_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            quantity_per_unit: Decimal::ZERO,
            phase: BomPhase::Auto,
        };
        assert!(entry.validate().is_err());
    }
}
