//! Successor shipments seeded from a previous phase

use rust_decimal::Decimal;
use uuid::Uuid;

use super::shipment::{NewShipment, PhaseType, PlannedLine, Shipment, ShipmentLine};
use crate::error::{LedgerError, LedgerResult};

/// Phase for the next shipment in a chain
///
/// Without an explicit request, cut chains to sew. A successor never
/// repeats the source's phase.
pub fn successor_phase(source: PhaseType, requested: Option<PhaseType>) -> LedgerResult<PhaseType> {
    let next = requested
        .or_else(|| source.default_successor())
        .ok_or_else(|| {
            LedgerError::validation(
                "phase_type",
                format!("A next phase type is required after {}", source.as_str()),
            )
        })?;
    if next == source {
        return Err(LedgerError::validation(
            "phase_type",
            "A successor shipment must use a different phase type",
        ));
    }
    Ok(next)
}

/// Draft of the shipment that follows `source`
///
/// One line per source line, planned at the accepted quantity. Lines with
/// nothing accepted are kept so the two shipments map one to one.
pub fn successor_draft(
    source: &Shipment,
    source_lines: &[ShipmentLine],
    next_phase: Option<PhaseType>,
    contractor_id: Option<Uuid>,
) -> LedgerResult<NewShipment> {
    let phase_type = successor_phase(source.phase_type, next_phase)?;

    Ok(NewShipment {
        contractor_id: contractor_id.unwrap_or(source.contractor_id),
        phase_type,
        product_id: source.product_id,
        predecessor_id: Some(source.id),
        kg_sent: Decimal::ZERO,
        notes: Some(format!("Generated from {}", source.number)),
        lines: source_lines
            .iter()
            .map(|line| PlannedLine {
                variant_id: line.variant_id,
                planned_qty: line.ok_qty,
                unit_price_override: Decimal::ZERO,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{apply_returns, LineReturn};
    use chrono::Utc;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn cut_shipment(variants: &[Uuid]) -> (Shipment, Vec<ShipmentLine>) {
        NewShipment {
            contractor_id: Uuid::new_v4(),
            phase_type: PhaseType::Cut,
            product_id: Some(Uuid::new_v4()),
            predecessor_id: None,
            kg_sent: dec("2.5"),
            notes: None,
            lines: variants
                .iter()
                .map(|&variant_id| PlannedLine {
                    variant_id,
                    planned_qty: dec("10"),
                    unit_price_override: dec("0.75"),
                })
                .collect(),
        }
        .open(Uuid::new_v4(), "R20240315-12345".to_string(), Utc::now())
    }

    #[test]
    fn test_successor_phase_defaults_and_rules() {
        assert_eq!(successor_phase(PhaseType::Cut, None).unwrap(), PhaseType::Sew);
        assert_eq!(
            successor_phase(PhaseType::Sew, Some(PhaseType::Correction)).unwrap(),
            PhaseType::Correction
        );
        assert!(successor_phase(PhaseType::Sew, None).is_err());
        assert!(successor_phase(PhaseType::Cut, Some(PhaseType::Cut)).is_err());
    }

    #[test]
    fn test_draft_plans_accepted_quantities() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (source, mut lines) = cut_shipment(&[a, b]);
        apply_returns(
            &mut lines,
            &[LineReturn {
                variant_id: a,
                ok_qty: dec("8"),
                loss_qty: dec("2"),
                missing_qty: Decimal::ZERO,
                returned_qty: Decimal::ZERO,
                unit_price_override: None,
            }],
        )
        .unwrap();

        let draft = successor_draft(&source, &lines, None, None).unwrap();

        assert_eq!(draft.phase_type, PhaseType::Sew);
        assert_eq!(draft.contractor_id, source.contractor_id);
        assert_eq!(draft.product_id, source.product_id);
        assert_eq!(draft.predecessor_id, Some(source.id));
        assert_eq!(draft.kg_sent, Decimal::ZERO);
        assert_eq!(draft.notes.as_deref(), Some("Generated from R20240315-12345"));
        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[0].variant_id, a);
        assert_eq!(draft.lines[0].planned_qty, dec("8"));
        assert_eq!(draft.lines[0].unit_price_override, Decimal::ZERO);
        assert_eq!(draft.lines[1].planned_qty, Decimal::ZERO);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_draft_contractor_override() {
        let (source, lines) = cut_shipment(&[Uuid::new_v4()]);
        let other = Uuid::new_v4();
        let draft = successor_draft(&source, &lines, Some(PhaseType::Sew), Some(other)).unwrap();
        assert_eq!(draft.contractor_id, other);
    }

    #[test]
    fn test_draft_rejects_same_phase() {
        let (source, lines) = cut_shipment(&[Uuid::new_v4()]);
        let err = successor_draft(&source, &lines, Some(PhaseType::Cut), None).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
    }
}
