use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicely_core::{CompanyId, CustomerId, DomainError, DomainResult, UserId};

/// Contact information shared by companies and customers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Input for registering a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    /// Business registration number.
    pub registration_no: Option<String>,
    pub vat_no: Option<String>,
    pub contact: ContactInfo,
    pub bank_account: Option<String>,
}

/// Tenant boundary. Every other record hangs off a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub registration_no: Option<String>,
    pub vat_no: Option<String>,
    pub contact: ContactInfo,
    pub bank_account: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn create(id: CompanyId, input: &NewCompany, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: required_name(&input.name, "company")?,
            registration_no: input.registration_no.clone(),
            vat_no: input.vat_no.clone(),
            contact: input.contact.clone(),
            bank_account: input.bank_account.clone(),
            created_at: now,
        })
    }
}

/// Input for adding a customer to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub company_id: CompanyId,
    pub name: String,
    pub registration_no: Option<String>,
    pub vat_no: Option<String>,
    pub contact: ContactInfo,
}

/// Customer of one company. Soft-deleted through `is_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub company_id: CompanyId,
    pub name: String,
    pub registration_no: Option<String>,
    pub vat_no: Option<String>,
    pub contact: ContactInfo,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn create(id: CustomerId, input: &NewCustomer, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            company_id: input.company_id,
            name: required_name(&input.name, "customer")?,
            registration_no: input.registration_no.clone(),
            vat_no: input.vat_no.clone(),
            contact: input.contact.clone(),
            is_active: true,
            created_at: now,
        })
    }

    /// Inactive customers keep their invoices but cannot be billed again.
    pub fn can_be_invoiced(&self) -> bool {
        self.is_active
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

/// Acting user, referenced by history entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(id: UserId, display_name: &str, email: Option<String>) -> DomainResult<Self> {
        Ok(Self {
            id,
            display_name: required_name(display_name, "user")?,
            email,
        })
    }
}

fn required_name(name: &str, what: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation(format!("{what} name must not be empty")));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_starts_active_and_can_be_deactivated() {
        let mut customer = Customer::create(
            CustomerId::new(),
            &NewCustomer {
                company_id: CompanyId::new(),
                name: "  Acme s.r.o. ".to_string(),
                registration_no: Some("12345678".to_string()),
                vat_no: None,
                contact: ContactInfo::default(),
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(customer.name, "Acme s.r.o.");
        assert!(customer.can_be_invoiced());
        customer.deactivate();
        assert!(!customer.can_be_invoiced());
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = Company::create(
            CompanyId::new(),
            &NewCompany {
                name: " ".to_string(),
                registration_no: None,
                vat_no: None,
                contact: ContactInfo::default(),
                bank_account: None,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(User::new(UserId::new(), "", None).is_err());
    }
}
