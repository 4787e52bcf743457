use std::collections::HashMap;

use invoicely_core::CompanyId;
use invoicely_invoicing::InvoiceNumber;
use invoicely_invoicing::numbering::MAX_SEQUENCE;

use crate::error::StoreError;

/// Per company+year invoice counters.
///
/// A counter is seeded from the highest `{year}{digits}` number already
/// stored the first time its key is used, then only moves forward. Callers
/// must hold the store's write lock while allocating.
#[derive(Debug, Clone, Default)]
pub struct InvoiceSequences {
    counters: HashMap<(CompanyId, i32), u32>,
}

impl InvoiceSequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next number for the key without reserving it.
    pub fn peek<'a>(
        &self,
        company_id: CompanyId,
        year: i32,
        existing: impl IntoIterator<Item = &'a InvoiceNumber>,
    ) -> InvoiceNumber {
        let current = match self.counters.get(&(company_id, year)) {
            Some(current) => *current,
            None => highest(year, existing),
        };
        InvoiceNumber::format(year, current.saturating_add(1))
    }

    /// Reserve and return the next number for the key.
    pub fn allocate<'a>(
        &mut self,
        company_id: CompanyId,
        year: i32,
        existing: impl IntoIterator<Item = &'a InvoiceNumber>,
    ) -> Result<InvoiceNumber, StoreError> {
        let counter = self
            .counters
            .entry((company_id, year))
            .or_insert_with(|| highest(year, existing));
        let next = counter
            .checked_add(1)
            .filter(|next| *next <= MAX_SEQUENCE)
            .ok_or_else(|| StoreError::Storage(format!("invoice sequence for {year} exhausted")))?;
        *counter = next;
        Ok(InvoiceNumber::format(year, next))
    }

    /// Move the counter past a caller-chosen number so allocation never
    /// hands it out again. The counter moved is the one of the year in the
    /// number's prefix, not the invoice's issue year.
    pub fn observe(&mut self, company_id: CompanyId, number: &InvoiceNumber) {
        if let Some((year, seq)) = number.scheme_parts() {
            let counter = self.counters.entry((company_id, year)).or_insert(0);
            *counter = (*counter).max(seq);
        }
    }
}

fn highest<'a>(year: i32, existing: impl IntoIterator<Item = &'a InvoiceNumber>) -> u32 {
    existing
        .into_iter()
        .filter_map(|n| n.sequence_for(year))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn first_allocation_of_a_year() {
        let mut seq = InvoiceSequences::new();
        let company = CompanyId::new();
        let none: Vec<InvoiceNumber> = Vec::new();

        assert_eq!(seq.peek(company, 2024, &none).as_str(), "20240001");
        assert_eq!(seq.allocate(company, 2024, &none).unwrap().as_str(), "20240001");
        assert_eq!(seq.allocate(company, 2024, &none).unwrap().as_str(), "20240002");
        assert_eq!(seq.allocate(company, 2025, &none).unwrap().as_str(), "20250001");
    }

    #[test]
    fn seeds_from_existing_numbers() {
        let mut seq = InvoiceSequences::new();
        let company = CompanyId::new();
        let existing = vec![
            InvoiceNumber::format(2024, 7),
            InvoiceNumber::parse("ADHOC-1").unwrap(),
        ];

        assert_eq!(seq.peek(company, 2024, &existing).as_str(), "20240008");
        assert_eq!(seq.allocate(company, 2024, &existing).unwrap().as_str(), "20240008");
    }

    #[test]
    fn observed_numbers_are_skipped() {
        let mut seq = InvoiceSequences::new();
        let company = CompanyId::new();
        let none: Vec<InvoiceNumber> = Vec::new();

        seq.allocate(company, 2024, &none).unwrap();
        seq.observe(company, &InvoiceNumber::format(2024, 5));
        assert_eq!(seq.allocate(company, 2024, &none).unwrap().as_str(), "20240006");
    }

    #[test]
    fn observing_moves_the_counter_of_the_prefix_year() {
        let mut seq = InvoiceSequences::new();
        let company = CompanyId::new();
        let none: Vec<InvoiceNumber> = Vec::new();

        assert_eq!(seq.allocate(company, 2025, &none).unwrap().as_str(), "20250001");
        seq.observe(company, &InvoiceNumber::parse("20250002").unwrap());
        assert_eq!(seq.allocate(company, 2025, &none).unwrap().as_str(), "20250003");
        assert_eq!(seq.allocate(company, 2024, &none).unwrap().as_str(), "20240001");
    }

    #[test]
    fn huge_manual_suffix_leaves_the_counter_alone() {
        let mut seq = InvoiceSequences::new();
        let company = CompanyId::new();
        let existing = vec![InvoiceNumber::parse("20244294967295").unwrap()];

        seq.observe(company, &existing[0]);
        assert_eq!(seq.allocate(company, 2024, &existing).unwrap().as_str(), "20240001");
    }

    #[test]
    fn allocation_stops_at_the_ceiling() {
        let mut seq = InvoiceSequences::new();
        let company = CompanyId::new();
        let existing = vec![InvoiceNumber::format(2024, MAX_SEQUENCE)];

        let err = seq.allocate(company, 2024, &existing).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[test]
    fn companies_do_not_share_counters() {
        let mut seq = InvoiceSequences::new();
        let none: Vec<InvoiceNumber> = Vec::new();
        let a = seq.allocate(CompanyId::new(), 2024, &none).unwrap();
        let b = seq.allocate(CompanyId::new(), 2024, &none).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        /// Property: interleaving allocations and observed manual numbers
        /// never yields the same number twice for one company and year.
        #[test]
        fn allocation_never_repeats(ops in prop::collection::vec(prop::option::of(1u32..200), 1..100)) {
            let mut seq = InvoiceSequences::new();
            let company = CompanyId::new();
            let none: Vec<InvoiceNumber> = Vec::new();
            let mut seen = HashSet::new();

            for op in ops {
                match op {
                    Some(manual) => {
                        let number = InvoiceNumber::format(2024, manual);
                        seq.observe(company, &number);
                        seen.insert(number);
                    }
                    None => {
                        let number = seq.allocate(company, 2024, &none).unwrap();
                        prop_assert!(seen.insert(number));
                    }
                }
            }
        }
    }
}
