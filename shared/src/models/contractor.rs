//! Outsourced contractors and their per-piece rates

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::shipment::PhaseType;
use crate::error::LedgerResult;
use crate::validation::{check_field, validate_br_phone, validate_name, validate_non_negative};

/// An external workshop paid per piece for cutting, sewing or corrections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contractor {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub rates: ContractorRates,
    pub active: bool,
}

/// Base price per piece for each phase type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractorRates {
    pub cut_price: Decimal,
    pub sew_price: Decimal,
    pub correction_price: Decimal,
}

impl ContractorRates {
    pub fn validate(&self) -> LedgerResult<()> {
        check_field("cut_price", validate_non_negative(self.cut_price))?;
        check_field("sew_price", validate_non_negative(self.sew_price))?;
        check_field("correction_price", validate_non_negative(self.correction_price))
    }

    pub fn for_phase(&self, phase: PhaseType) -> Decimal {
        match phase {
            PhaseType::Cut => self.cut_price,
            PhaseType::Sew => self.sew_price,
            PhaseType::Correction => self.correction_price,
        }
    }
}

impl Contractor {
    pub fn base_price(&self, phase: PhaseType) -> Decimal {
        self.rates.for_phase(phase)
    }
}

/// Input for registering a contractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContractor {
    pub name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub rates: ContractorRates,
}

impl NewContractor {
    pub fn validate(&self) -> LedgerResult<()> {
        check_field("name", validate_name(&self.name))?;
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            check_field("phone", validate_br_phone(phone))?;
        }
        self.rates.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn rates() -> ContractorRates {
        ContractorRates {
            cut_price: dec("0.80"),
            sew_price: dec("3.50"),
            correction_price: dec("1.00"),
        }
    }

    #[test]
    fn test_base_price_per_phase() {
        let contractor = Contractor {
            id: Uuid::new_v4(),
            name: "Ateliê da Rosa".to_string(),
            phone: None,
            rates: rates(),
            active: true,
        };
        assert_eq!(contractor.base_price(PhaseType::Cut), dec("0.80"));
        assert_eq!(contractor.base_price(PhaseType::Sew), dec("3.50"));
        assert_eq!(contractor.base_price(PhaseType::Correction), dec("1.00"));
    }

    #[test]
    fn test_new_contractor_validation() {
        let mut input = NewContractor {
            name: "Ateliê da Rosa".to_string(),
            phone: Some("(11) 91234-5678".to_string()),
            rates: rates(),
        };
        assert!(input.validate().is_ok());

        input.phone = Some("".to_string());
        assert!(input.validate().is_ok());

        input.rates.sew_price = dec("-1");
        assert!(input.validate().is_err());

        input.rates = rates();
        input.name = " ".to_string();
        assert!(input.validate().is_err());
    }
}
