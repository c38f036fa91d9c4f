/// A batch of work items, partitioned into groups.
///
/// Items inside one group keep their order. Backends are free to process
/// groups concurrently, so nothing is promised about ordering across groups.
/// Empty groups are dropped on insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite<T> {
    groups: Vec<Vec<T>>,
}

impl<T> Default for Composite<T> {
    fn default() -> Self {
        Self { groups: Vec::new() }
    }
}

impl<T> Composite<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(item: T) -> Self {
        Self {
            groups: vec![vec![item]],
        }
    }

    /// One group holding every item, in order.
    pub fn from_vec(items: Vec<T>) -> Self {
        let mut composite = Self::new();
        composite.push_group(items);
        composite
    }

    pub fn from_groups(groups: Vec<Vec<T>>) -> Self {
        let mut composite = Self::new();
        for group in groups {
            composite.push_group(group);
        }
        composite
    }

    pub fn push_group(&mut self, group: Vec<T>) {
        if !group.is_empty() {
            self.groups.push(group);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[Vec<T>] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<Vec<T>> {
        self.groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.groups.iter().flatten()
    }

    /// Transforms every item, keeping the grouping.
    pub fn map<U, F>(self, mut f: F) -> Composite<U>
    where
        F: FnMut(T) -> U,
    {
        Composite {
            groups: self
                .groups
                .into_iter()
                .map(|group| group.into_iter().map(&mut f).collect())
                .collect(),
        }
    }

    pub fn fold<A, F>(&self, init: A, f: F) -> A
    where
        F: FnMut(A, &T) -> A,
    {
        self.iter().fold(init, f)
    }

    /// Calls `visitor` once per item.
    pub fn broadcast<F>(&self, visitor: F)
    where
        F: FnMut(&T),
    {
        self.iter().for_each(visitor);
    }
}

impl<T> From<Vec<T>> for Composite<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> FromIterator<T> for Composite<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Composite<T> {
    type Item = T;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Vec<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_is_preserved() {
        let mut batch = Composite::from_groups(vec![vec![1, 2], vec![], vec![3]]);
        assert_eq!(batch.group_count(), 2);
        batch.push_group(vec![4, 5, 6]);
        assert_eq!(batch.len(), 6);

        let doubled = batch.clone().map(|x| x * 2);
        assert_eq!(doubled.groups(), &[vec![2, 4], vec![6], vec![8, 10, 12]]);
        assert_eq!(batch.fold(0, |acc, x| acc + x), 21);
        assert_eq!(batch.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_single_and_empty() {
        let empty: Composite<u8> = Composite::new();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert!(Composite::from_vec(Vec::<u8>::new()).is_empty());

        let one = Composite::single("k");
        let mut seen = Vec::new();
        one.broadcast(|item| seen.push(*item));
        assert_eq!(seen, vec!["k"]);
    }
}
