//! In-memory working set of stock rows for one unit of work
//!
//! A service loads and locks the materials and variants an operation
//! touches into a [`StockBook`], runs the domain operation against it, then
//! writes back the touched rows and the journal in the same transaction.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{FinishedVariant, Material, MovementContext, NewStockMovement};

#[derive(Debug, Clone, Default)]
pub struct StockBook {
    materials: BTreeMap<Uuid, Material>,
    variants: BTreeMap<Uuid, FinishedVariant>,
    journal: Vec<NewStockMovement>,
    touched_materials: BTreeSet<Uuid>,
    touched_variants: BTreeSet<Uuid>,
}

impl StockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_material(&mut self, material: Material) {
        self.materials.insert(material.id, material);
    }

    pub fn insert_variant(&mut self, variant: FinishedVariant) {
        self.variants.insert(variant.id, variant);
    }

    pub fn material(&self, id: Uuid) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn variant(&self, id: Uuid) -> Option<&FinishedVariant> {
        self.variants.get(&id)
    }

    fn material_mut(&mut self, id: Uuid) -> LedgerResult<&mut Material> {
        self.materials
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("Material {id}")))
    }

    fn variant_mut(&mut self, id: Uuid) -> LedgerResult<&mut FinishedVariant> {
        self.variants
            .get_mut(&id)
            .ok_or_else(|| LedgerError::NotFound(format!("Variant {id}")))
    }

    fn record(&mut self, movement: NewStockMovement) -> NewStockMovement {
        if let Some(id) = movement.item.material_id() {
            self.touched_materials.insert(id);
        }
        if let Some(id) = movement.item.variant_id() {
            self.touched_variants.insert(id);
        }
        self.journal.push(movement.clone());
        movement
    }

    pub fn receive_material(
        &mut self,
        material_id: Uuid,
        quantity: Decimal,
        unit_cost: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        let movement = self
            .material_mut(material_id)?
            .receive(quantity, unit_cost, context)?;
        Ok(self.record(movement))
    }

    pub fn issue_material(
        &mut self,
        material_id: Uuid,
        quantity: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        let movement = self.material_mut(material_id)?.issue(quantity, context)?;
        Ok(self.record(movement))
    }

    pub fn credit_variant(
        &mut self,
        variant_id: Uuid,
        quantity: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        let movement = self.variant_mut(variant_id)?.credit(quantity, context)?;
        Ok(self.record(movement))
    }

    pub fn record_production(
        &mut self,
        variant_id: Uuid,
        quantity: Decimal,
        unit_cost: Decimal,
        context: MovementContext,
    ) -> LedgerResult<NewStockMovement> {
        let movement = self
            .variant_mut(variant_id)?
            .record_production(quantity, unit_cost, context)?;
        Ok(self.record(movement))
    }

    /// Run `f` against a scratch copy and keep its effects only on success
    pub fn transact<T, F>(&mut self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut StockBook) -> LedgerResult<T>,
    {
        let mut draft = self.clone();
        let value = f(&mut draft)?;
        *self = draft;
        Ok(value)
    }

    pub fn journal(&self) -> &[NewStockMovement] {
        &self.journal
    }

    /// Hand over the pending movements, leaving the journal empty
    pub fn take_journal(&mut self) -> Vec<NewStockMovement> {
        std::mem::take(&mut self.journal)
    }

    pub fn touched_materials(&self) -> impl Iterator<Item = &Material> + '_ {
        self.touched_materials
            .iter()
            .filter_map(|id| self.materials.get(id))
    }

    pub fn touched_variants(&self) -> impl Iterator<Item = &FinishedVariant> + '_ {
        self.touched_variants
            .iter()
            .filter_map(|id| self.variants.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovementReason, UnitOfMeasure};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn material(qty: &str, cost: &str) -> Material {
        Material {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            category_name: "Linha".to_string(),
            name: "Linha 120".to_string(),
            unit: UnitOfMeasure::Roll,
            quantity_on_hand: dec(qty),
            weighted_avg_cost: dec(cost),
            active: true,
        }
    }

    fn issue_ctx() -> MovementContext {
        MovementContext::new(MovementReason::ManualIssue)
    }

    #[test]
    fn test_operations_journal_and_mark_touched() {
        let a = material("10", "2");
        let b = material("5", "1");
        let (a_id, b_id) = (a.id, b.id);
        let mut book = StockBook::new();
        book.insert_material(a);
        book.insert_material(b);

        book.issue_material(a_id, dec("4"), issue_ctx()).unwrap();

        assert_eq!(book.journal().len(), 1);
        assert_eq!(book.material(a_id).unwrap().quantity_on_hand, dec("6"));
        let touched: Vec<Uuid> = book.touched_materials().map(|m| m.id).collect();
        assert_eq!(touched, vec![a_id]);
        assert_eq!(book.material(b_id).unwrap().quantity_on_hand, dec("5"));
    }

    #[test]
    fn test_missing_material_is_not_found() {
        let mut book = StockBook::new();
        let err = book
            .issue_material(Uuid::new_v4(), dec("1"), issue_ctx())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_transact_rolls_back_on_failure() {
        let a = material("10", "2");
        let b = material("1", "1");
        let (a_id, b_id) = (a.id, b.id);
        let mut book = StockBook::new();
        book.insert_material(a);
        book.insert_material(b);

        let result = book.transact(|book| {
            book.issue_material(a_id, dec("4"), issue_ctx())?;
            book.issue_material(b_id, dec("2"), issue_ctx())
        });

        assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
        assert_eq!(book.material(a_id).unwrap().quantity_on_hand, dec("10"));
        assert!(book.journal().is_empty());
        assert_eq!(book.touched_materials().count(), 0);
    }

    #[test]
    fn test_transact_commits_on_success() {
        let a = material("10", "2");
        let a_id = a.id;
        let mut book = StockBook::new();
        book.insert_material(a);

        book.transact(|book| {
            let receipt = MovementContext::new(MovementReason::Receipt);
            book.receive_material(a_id, dec("10"), dec("4"), receipt)
        })
        .unwrap();

        assert_eq!(book.material(a_id).unwrap().weighted_avg_cost, dec("3"));
        assert_eq!(book.take_journal().len(), 1);
        assert!(book.journal().is_empty());
    }
}
