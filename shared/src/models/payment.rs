//! Contractor payments derived from finalized shipments

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::shipment::{PhaseType, Shipment};
use crate::types::DateRange;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

/// Amount owed to a contractor for one shipment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractorPayment {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub contractor_id: Uuid,
    pub total_amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ContractorPayment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// Returns false when the payment was already paid
    pub fn mark_paid(&mut self, when: DateTime<Utc>) -> bool {
        if self.is_paid() {
            return false;
        }
        self.status = PaymentStatus::Paid;
        self.paid_at = Some(when);
        true
    }

    /// Returns false when the payment was already pending
    pub fn mark_pending(&mut self) -> bool {
        if !self.is_paid() {
            return false;
        }
        self.status = PaymentStatus::Pending;
        self.paid_at = None;
        true
    }
}

/// Create or correct the payment for a shipment
///
/// An existing payment keeps its status and paid date; only the amount and
/// contractor follow the shipment. A new payment starts pending.
pub fn upsert_payment(
    existing: Option<ContractorPayment>,
    shipment: &Shipment,
    amount: Decimal,
    now: DateTime<Utc>,
) -> ContractorPayment {
    match existing {
        Some(mut payment) => {
            payment.total_amount = amount;
            payment.contractor_id = shipment.contractor_id;
            payment
        }
        None => ContractorPayment {
            id: Uuid::new_v4(),
            shipment_id: shipment.id,
            contractor_id: shipment.contractor_id,
            total_amount: amount,
            status: PaymentStatus::Pending,
            created_at: now,
            paid_at: None,
            notes: None,
        },
    }
}

/// Filter for the payments report; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub contractor_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub phase_type: Option<PhaseType>,
    pub created: Option<DateRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentSummary {
    pub pending_total: Decimal,
    pub pending_count: u64,
    pub paid_total: Decimal,
    pub paid_count: u64,
}

impl PaymentSummary {
    pub fn add(&mut self, payment: &ContractorPayment) {
        match payment.status {
            PaymentStatus::Pending => {
                self.pending_total += payment.total_amount;
                self.pending_count += 1;
            }
            PaymentStatus::Paid => {
                self.paid_total += payment.total_amount;
                self.paid_count += 1;
            }
        }
    }

    pub fn grand_total(&self) -> Decimal {
        self.pending_total + self.paid_total
    }
}

impl<'a> FromIterator<&'a ContractorPayment> for PaymentSummary {
    fn from_iter<I: IntoIterator<Item = &'a ContractorPayment>>(iter: I) -> Self {
        let mut summary = PaymentSummary::default();
        for payment in iter {
            summary.add(payment);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewShipment, PlannedLine};
    use chrono::{Duration, TimeZone};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn shipment() -> Shipment {
        NewShipment {
            contractor_id: Uuid::new_v4(),
            phase_type: PhaseType::Sew,
            product_id: None,
            predecessor_id: None,
            kg_sent: Decimal::ZERO,
            notes: None,
            lines: vec![PlannedLine {
                variant_id: Uuid::new_v4(),
                planned_qty: dec("5"),
                unit_price_override: Decimal::ZERO,
            }],
        }
        .open(Uuid::new_v4(), "R20240101-00042".to_string(), Utc::now())
        .0
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_payment_starts_pending() {
        let shipment = shipment();
        let payment = upsert_payment(None, &shipment, dec("20.00"), noon());
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.shipment_id, shipment.id);
        assert_eq!(payment.contractor_id, shipment.contractor_id);
        assert_eq!(payment.total_amount, dec("20.00"));
        assert_eq!(payment.paid_at, None);
    }

    #[test]
    fn test_upsert_preserves_paid_state() {
        let shipment = shipment();
        let mut payment = upsert_payment(None, &shipment, dec("20.00"), noon());
        payment.mark_paid(noon());
        let id = payment.id;

        let corrected = upsert_payment(Some(payment), &shipment, dec("24.00"), noon() + Duration::days(1));

        assert_eq!(corrected.id, id);
        assert_eq!(corrected.total_amount, dec("24.00"));
        assert_eq!(corrected.status, PaymentStatus::Paid);
        assert_eq!(corrected.paid_at, Some(noon()));
        assert_eq!(corrected.created_at, noon());
    }

    #[test]
    fn test_mark_paid_and_pending_are_noops_when_unchanged() {
        let mut payment = upsert_payment(None, &shipment(), dec("1"), noon());
        assert!(!payment.mark_pending());

        assert!(payment.mark_paid(noon()));
        assert!(!payment.mark_paid(noon() + Duration::hours(1)));
        assert_eq!(payment.paid_at, Some(noon()));

        assert!(payment.mark_pending());
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.paid_at, None);
    }

    #[test]
    fn test_summary_totals_by_status() {
        let shipment = shipment();
        let mut paid = upsert_payment(None, &shipment, dec("10.50"), noon());
        paid.mark_paid(noon());
        let pending_a = upsert_payment(None, &shipment, dec("3.25"), noon());
        let pending_b = upsert_payment(None, &shipment, dec("1.75"), noon());

        let summary: PaymentSummary = [&paid, &pending_a, &pending_b].into_iter().collect();

        assert_eq!(summary.paid_total, dec("10.50"));
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.pending_total, dec("5.00"));
        assert_eq!(summary.pending_count, 2);
        assert_eq!(summary.grand_total(), dec("15.50"));
    }
}
