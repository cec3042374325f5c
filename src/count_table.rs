//! # Count tables
//!
//! Maps from an integer key (usually a motif-copy count) to the number of
//! reads supporting it.
use std::collections::BTreeMap;
use std::fmt;

/// Count table keyed by integer elements; zero counts are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTable {
    counts: BTreeMap<i32, i32>,
}

impl CountTable {
    pub fn new() -> Self {
        CountTable::default()
    }

    pub fn count_of(&self, element: i32) -> i32 {
        self.counts.get(&element).copied().unwrap_or(0)
    }

    pub fn increment_count_of(&mut self, element: i32) {
        self.increment_count_of_by(element, 1);
    }

    pub fn increment_count_of_by(&mut self, element: i32, increment: i32) {
        assert!(increment > 0, "Count tables require positive increments");
        *self.counts.entry(element).or_insert(0) += increment;
    }

    pub fn set_count_of(&mut self, element: i32, count: i32) {
        if count == 0 {
            self.counts.remove(&element);
        } else {
            self.counts.insert(element, count);
        }
    }

    pub fn elements_with_nonzero_counts(&self) -> Vec<i32> {
        self.counts.keys().copied().collect()
    }

    pub fn total_count(&self) -> i32 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.counts.iter().map(|(&element, &count)| (element, count))
    }
}

impl fmt::Display for CountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return write!(f, "()");
        }
        let encoding: Vec<String> = self
            .iter()
            .map(|(element, count)| format!("({element}, {count})"))
            .collect();
        write!(f, "{}", encoding.join(", "))
    }
}

impl FromIterator<(i32, i32)> for CountTable {
    fn from_iter<I: IntoIterator<Item = (i32, i32)>>(pairs: I) -> Self {
        let mut table = CountTable::new();
        for (element, count) in pairs {
            table.set_count_of(element, count);
        }
        table
    }
}

/// Merges every element at or above `upper_bound` into `upper_bound`,
/// preserving the total count.
pub fn collapse_top_elements(table: &CountTable, upper_bound: i32) -> CountTable {
    assert!(upper_bound >= 0, "Count tables cannot be truncated to negative values");

    let mut collapsed = CountTable::new();
    for (element, count) in table.iter() {
        if element < upper_bound {
            collapsed.set_count_of(element, count);
        } else {
            collapsed.increment_count_of_by(upper_bound, count);
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_element() {
        let mut table = CountTable::new();
        assert_eq!(0, table.count_of(7));

        table.increment_count_of(7);
        table.increment_count_of(7);
        table.increment_count_of(4);
        assert_eq!(2, table.count_of(7));
        assert_eq!(1, table.count_of(4));
        assert_eq!(vec![4, 7], table.elements_with_nonzero_counts());
    }

    #[test]
    fn setting_count_to_zero_removes_the_element() {
        let mut table = CountTable::new();
        table.set_count_of(5, 3);
        table.set_count_of(5, 0);
        assert!(table.is_empty());
    }

    #[test]
    fn collapsing_merges_the_tail_and_preserves_totals() {
        let table: CountTable = vec![(3, 2), (5, 10), (7, 5), (9, 12)].into_iter().collect();

        let collapsed = collapse_top_elements(&table, 5);
        let expected: CountTable = vec![(3, 2), (5, 27)].into_iter().collect();
        assert_eq!(expected, collapsed);
        assert_eq!(table.total_count(), collapsed.total_count());
    }

    #[test]
    fn collapsing_at_the_max_element_is_a_noop() {
        let table: CountTable = vec![(3, 2), (9, 12)].into_iter().collect();
        assert_eq!(table, collapse_top_elements(&table, 9));
    }

    #[test]
    fn tables_render_compactly() {
        let table: CountTable = vec![(2, 1), (4, 3)].into_iter().collect();
        assert_eq!("(2, 1), (4, 3)", format!("{table}"));
        assert_eq!("()", format!("{}", CountTable::new()));
    }
}
