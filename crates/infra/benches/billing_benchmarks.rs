use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use invoicely_core::{CompanyId, CustomerId, ManualClock};
use invoicely_infra::invoices::InvoiceService;
use invoicely_infra::parties::PartyService;
use invoicely_infra::store::InMemoryBillingStore;
use invoicely_invoicing::{
    ContactInfo, InvoiceType, NewCompany, NewCustomer, NewInvoice, NewInvoiceItem, PaymentDetails,
};
use invoicely_recurring::{Interval, Recurrence};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn bench_date_advancement(c: &mut Criterion) {
    let mut group = c.benchmark_group("date_advancement");
    let start = date(2024, 1, 31);

    let recurrences = [
        Recurrence::Daily { interval: Interval::ONE },
        Recurrence::Weekly { interval: Interval::new(2).unwrap() },
        Recurrence::Monthly { interval: Interval::ONE },
        Recurrence::Quarterly { interval: Interval::ONE },
        Recurrence::Yearly { interval: Interval::ONE },
    ];

    for recurrence in recurrences {
        group.bench_with_input(
            BenchmarkId::new("advance_100", recurrence.frequency()),
            &recurrence,
            |b, recurrence| {
                b.iter(|| {
                    let mut current = start;
                    for _ in 0..100 {
                        current = recurrence.advance(black_box(current)).unwrap();
                    }
                    black_box(current)
                });
            },
        );
    }

    group.finish();
}

fn setup() -> (InvoiceService<Arc<InMemoryBillingStore>>, CompanyId, CustomerId) {
    let store = Arc::new(InMemoryBillingStore::new());
    let clock = Arc::new(ManualClock::at_date(date(2024, 6, 1)));
    let parties = PartyService::new(store.clone(), clock.clone());

    let company = parties
        .create_company(NewCompany {
            name: "Bench Co".to_string(),
            registration_no: None,
            vat_no: None,
            contact: ContactInfo::default(),
            bank_account: None,
        })
        .unwrap();
    let customer = parties
        .create_customer(NewCustomer {
            company_id: company.id,
            name: "Bench Customer".to_string(),
            registration_no: None,
            vat_no: None,
            contact: ContactInfo::default(),
        })
        .unwrap();

    (InvoiceService::new(store, clock), company.id, customer.id)
}

fn new_invoice(company_id: CompanyId, customer_id: CustomerId, lines: usize) -> NewInvoice {
    NewInvoice {
        company_id,
        customer_id,
        invoice_type: InvoiceType::Invoice,
        invoice_number: None,
        issue_date: date(2024, 6, 1),
        due_date: date(2024, 6, 15),
        currency: "EUR".to_string(),
        exchange_rate: None,
        payment: PaymentDetails::default(),
        notes: None,
        items: (0..lines)
            .map(|i| NewInvoiceItem {
                description: format!("Line {i}"),
                quantity: Decimal::from(i as i64 + 1),
                unit: Some("h".to_string()),
                unit_price: Decimal::new(12_550, 2),
                vat_rate: Decimal::from(21),
            })
            .collect(),
    }
}

fn bench_invoice_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_creation");
    group.throughput(Throughput::Elements(1));

    for lines in [1usize, 10, 50] {
        group.bench_with_input(BenchmarkId::new("create_invoice", lines), &lines, |b, &lines| {
            // Each iteration allocates a fresh number, so the store keeps growing.
            let (service, company_id, customer_id) = setup();
            b.iter(|| {
                black_box(
                    service
                        .create_invoice(None, new_invoice(company_id, customer_id, lines))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_date_advancement, bench_invoice_creation);
criterion_main!(benches);
