use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoicely_core::{CompanyId, DomainError, DomainResult, InvoiceId, InvoiceItemId, ScheduleId};
use invoicely_invoicing::{Invoice, InvoiceItem, InvoiceNumber};

use crate::schedule::ensure_usable_template;

/// One invoice produced by a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedInvoice {
    pub schedule_id: ScheduleId,
    pub company_id: CompanyId,
    pub template_invoice_id: InvoiceId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
}

pub fn generated_note(template_number: &InvoiceNumber) -> String {
    format!("Automatically generated from invoice {template_number}")
}

/// Clone `template` into a new draft issued `today` and due `due_in_days`
/// later. Line items are copied verbatim under new ids.
pub fn materialize(
    template: &Invoice,
    template_items: &[InvoiceItem],
    invoice_id: InvoiceId,
    invoice_number: InvoiceNumber,
    today: NaiveDate,
    due_in_days: u32,
    now: DateTime<Utc>,
) -> DomainResult<(Invoice, Vec<InvoiceItem>)> {
    ensure_usable_template(template)?;
    let due_date = today
        .checked_add_days(Days::new(u64::from(due_in_days)))
        .ok_or_else(|| DomainError::validation("generated due date is out of range"))?;

    let items: Vec<InvoiceItem> = template_items
        .iter()
        .map(|item| item.copy_to(InvoiceItemId::new(), invoice_id))
        .collect();

    let mut invoice = template.duplicate(
        invoice_id,
        invoice_number,
        today,
        due_date,
        Some(generated_note(&template.invoice_number)),
        now,
    )?;
    invoice.recalculate(&items, now);

    Ok((invoice, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::tests::{date, template};
    use invoicely_invoicing::InvoiceStatus;

    #[test]
    fn clone_is_a_fresh_draft_due_in_fourteen_days() {
        let (mut template, items) = template();
        template.transition(InvoiceStatus::Sent, Utc::now()).unwrap();

        let (invoice, copied) = materialize(
            &template,
            &items,
            InvoiceId::new(),
            InvoiceNumber::format(2024, 7),
            date(2024, 2, 15),
            14,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(invoice.stored_status(), InvoiceStatus::Draft);
        assert_eq!(invoice.issue_date, date(2024, 2, 15));
        assert_eq!(invoice.due_date, date(2024, 2, 29));
        assert_eq!(invoice.customer_id, template.customer_id);
        assert_eq!(invoice.currency, template.currency);
        assert_eq!(invoice.exchange_rate, template.exchange_rate);
        assert_eq!(invoice.payment, template.payment);
        assert_eq!(invoice.total(), template.total());
        assert_eq!(
            invoice.notes.as_deref(),
            Some("Automatically generated from invoice 20240001")
        );

        assert_eq!(copied.len(), items.len());
        assert!(copied.iter().all(|i| i.invoice_id == invoice.id));
        assert_ne!(copied[0].id, items[0].id);
        assert_eq!(copied[0].description, items[0].description);
        assert_eq!(copied[0].total, items[0].total);
    }

    #[test]
    fn deleted_template_cannot_be_materialized() {
        let (mut template, items) = template();
        template.mark_deleted(Utc::now()).unwrap();

        let err = materialize(
            &template,
            &items,
            InvoiceId::new(),
            InvoiceNumber::format(2024, 2),
            date(2024, 2, 1),
            14,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
