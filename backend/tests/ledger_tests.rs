//! Material ledger tests
//!
//! Tests for the material stock rules including:
//! - Stock never goes negative across receipt/issue sequences
//! - A refused issue leaves the material untouched
//! - Weighted-average cost is exact in fixed-point decimals
//! - Automatic BOM phases resolve fabric to cutting

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    resolve_phase, BomPhase, ConsumptionPhase, LedgerError, Material, MovementContext,
    MovementDirection, MovementReason, StockBook, UnitOfMeasure,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn empty_material(name: &str) -> Material {
    Material {
        id: Uuid::new_v4(),
        category_id: Uuid::new_v4(),
        category_name: "Tecido".to_string(),
        name: name.to_string(),
        unit: UnitOfMeasure::Metre,
        quantity_on_hand: Decimal::ZERO,
        weighted_avg_cost: Decimal::ZERO,
        active: true,
    }
}

fn receipt() -> MovementContext {
    MovementContext::new(MovementReason::Receipt)
}

fn manual_issue() -> MovementContext {
    MovementContext::new(MovementReason::ManualIssue)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Two receipts average by quantity
    #[test]
    fn test_weighted_average_two_receipts() {
        let mut material = empty_material("Malha PV");
        material.receive(dec("10"), dec("2"), receipt()).unwrap();
        material.receive(dec("30"), dec("4"), receipt()).unwrap();

        assert_eq!(material.quantity_on_hand, dec("40"));
        assert_eq!(material.weighted_avg_cost, dec("3.5"));
    }

    /// Issues are valued at the average and leave it unchanged
    #[test]
    fn test_issue_uses_current_average() {
        let mut material = empty_material("Malha PV");
        material.receive(dec("4"), dec("3"), receipt()).unwrap();
        material.receive(dec("4"), dec("5"), receipt()).unwrap();

        let movement = material.issue(dec("2"), manual_issue()).unwrap();
        assert_eq!(movement.direction, MovementDirection::Out);
        assert_eq!(movement.unit_cost, dec("4"));
        assert_eq!(movement.value(), dec("8"));
        assert_eq!(material.weighted_avg_cost, dec("4"));
        assert_eq!(material.quantity_on_hand, dec("6"));
    }

    /// Refused issue reports the shortfall
    #[test]
    fn test_insufficient_stock_reports_shortfall() {
        let mut material = empty_material("Ribana");
        material.receive(dec("1.5"), dec("10"), receipt()).unwrap();

        let err = material.issue(dec("2"), manual_issue()).unwrap_err();
        assert_eq!(err.shortfall(), Some(dec("0.5")));
        match err {
            LedgerError::InsufficientStock {
                material_name,
                requested,
                available,
                ..
            } => {
                assert_eq!(material_name, "Ribana");
                assert_eq!(requested, dec("2"));
                assert_eq!(available, dec("1.5"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Zero and negative quantities are rejected
    #[test]
    fn test_non_positive_quantities_rejected() {
        let mut material = empty_material("Linha 120");
        assert!(matches!(
            material.receive(Decimal::ZERO, dec("1"), receipt()),
            Err(LedgerError::Validation { .. })
        ));
        assert!(matches!(
            material.issue(dec("-1"), manual_issue()),
            Err(LedgerError::Validation { .. })
        ));
        assert!(matches!(
            material.receive(dec("1"), dec("-0.01"), receipt()),
            Err(LedgerError::Validation { .. })
        ));
    }

    /// Every ledger call journals exactly one movement
    #[test]
    fn test_book_journals_one_movement_per_call() {
        let material = empty_material("Malha PV");
        let id = material.id;
        let mut book = StockBook::new();
        book.insert_material(material);

        book.receive_material(id, dec("5"), dec("2"), receipt()).unwrap();
        book.issue_material(id, dec("1"), manual_issue()).unwrap();
        assert!(book.issue_material(id, dec("10"), manual_issue()).is_err());

        assert_eq!(book.journal().len(), 2);
        assert_eq!(book.touched_materials().count(), 1);
    }

    /// Phase resolution for automatic entries
    #[test]
    fn test_phase_resolution_vocabulary() {
        for category in ["Tecido", "TECIDO", "tecido", "Tecidó", "  tecido  "] {
            assert_eq!(resolve_phase(category, BomPhase::Auto), ConsumptionPhase::Cut);
        }
        for category in ["Linha", "Etiqueta", "Botão", "Tecidos", ""] {
            assert_eq!(resolve_phase(category, BomPhase::Auto), ConsumptionPhase::Sew);
        }
    }

    /// Explicit phases override the category
    #[test]
    fn test_explicit_phase_wins() {
        assert_eq!(resolve_phase("Tecido", BomPhase::Sew), ConsumptionPhase::Sew);
        assert_eq!(resolve_phase("Linha", BomPhase::Cut), ConsumptionPhase::Cut);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Receive(Decimal, Decimal),
        Issue(Decimal),
    }

    // Quantities with up to 4 decimals
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..500_000i64).prop_map(|n| Decimal::new(n, 4))
    }

    fn cost_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (quantity_strategy(), cost_strategy()).prop_map(|(q, c)| Op::Receive(q, c)),
            quantity_strategy().prop_map(Op::Issue),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Stock never goes negative; refused issues change nothing
        #[test]
        fn prop_stock_never_negative(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut material = empty_material("Malha PV");

            for op in ops {
                match op {
                    Op::Receive(quantity, cost) => {
                        prop_assert!(material.receive(quantity, cost, receipt()).is_ok());
                    }
                    Op::Issue(quantity) => {
                        let before = material.clone();
                        match material.issue(quantity, manual_issue()) {
                            Ok(_) => {
                                prop_assert!(quantity <= before.quantity_on_hand);
                            }
                            Err(LedgerError::InsufficientStock { .. }) => {
                                prop_assert!(quantity > before.quantity_on_hand);
                                prop_assert_eq!(&material, &before);
                            }
                            Err(other) => {
                                prop_assert!(false, "unexpected error: {:?}", other);
                            }
                        }
                    }
                }
                prop_assert!(material.quantity_on_hand >= Decimal::ZERO);
            }
        }

        /// Two receipts reproduce (q1*c1 + q2*c2) / (q1 + q2)
        #[test]
        fn prop_weighted_average_exact(
            q1 in quantity_strategy(),
            c1 in cost_strategy(),
            q2 in quantity_strategy(),
            c2 in cost_strategy(),
        ) {
            let mut material = empty_material("Malha PV");
            material.receive(q1, c1, receipt()).unwrap();
            material.receive(q2, c2, receipt()).unwrap();

            let expected = (q1 * c1 + q2 * c2) / (q1 + q2);
            prop_assert!((material.weighted_avg_cost - expected).abs() < Decimal::new(1, 20));
            prop_assert_eq!(material.quantity_on_hand, q1 + q2);
        }

        /// A failing unit of work leaves the book as it was
        #[test]
        fn prop_failed_transaction_rolls_back(
            stock in quantity_strategy(),
            first in quantity_strategy(),
        ) {
            let material = empty_material("Malha PV");
            let id = material.id;
            let mut book = StockBook::new();
            book.insert_material(material);
            book.receive_material(id, stock, dec("2"), receipt()).unwrap();
            let before = book.material(id).cloned();
            let journal_len = book.journal().len();

            let result = book.transact(|book| {
                if first <= stock {
                    book.issue_material(id, first, manual_issue())?;
                }
                book.issue_material(id, stock + dec("1"), manual_issue())
            });

            prop_assert!(result.is_err());
            prop_assert_eq!(book.material(id).cloned(), before);
            prop_assert_eq!(book.journal().len(), journal_len);
        }
    }
}
