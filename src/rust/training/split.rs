use std::collections::BTreeMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::classifier::ClassifierError;

/// Row indices of each partition, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partitions rows so each class keeps roughly its proportion in both halves.
///
/// Per class, `round(count * test_size)` rows go to the test set, clamped so that both
/// partitions receive at least one row of every class. The same `targets`, `test_size`
/// and `seed` always produce the same split.
pub fn stratified_split(
    targets: &[usize],
    test_size: f32,
    seed: u64,
) -> Result<TrainTestSplit, ClassifierError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ClassifierError::ValidationError(format!(
            "test_size must be between 0 and 1 (exclusive), got {}",
            test_size
        )));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &class) in targets.iter().enumerate() {
        by_class.entry(class).or_default().push(row);
    }
    if by_class.len() < 2 {
        return Err(ClassifierError::ValidationError(format!(
            "Stratified split needs at least two classes, found {}",
            by_class.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(targets.len());
    let mut test = Vec::new();

    for (class, mut rows) in by_class {
        let count = rows.len();
        if count < 2 {
            return Err(ClassifierError::ValidationError(format!(
                "Class {} has {} example(s); at least 2 are needed to appear in both partitions",
                class, count
            )));
        }
        let n_test = ((count as f32 * test_size).round() as usize).clamp(1, count - 1);
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_class_in_both_partitions() -> Result<(), ClassifierError> {
        let targets = vec![0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2];
        let split = stratified_split(&targets, 0.2, 42)?;
        for class in 0..3 {
            assert!(split.train.iter().any(|&i| targets[i] == class), "class {} missing from train", class);
            assert!(split.test.iter().any(|&i| targets[i] == class), "class {} missing from test", class);
        }
        assert_eq!(split.train.len() + split.test.len(), targets.len());
        Ok(())
    }

    #[test]
    fn test_proportions() -> Result<(), ClassifierError> {
        let targets: Vec<usize> = (0..100).map(|i| if i < 60 { 0 } else { 1 }).collect();
        let split = stratified_split(&targets, 0.2, 7)?;
        let test_zero = split.test.iter().filter(|&&i| targets[i] == 0).count();
        assert_eq!(test_zero, 12);
        assert_eq!(split.test.len(), 20);
        Ok(())
    }

    #[test]
    fn test_partitions_are_disjoint() -> Result<(), ClassifierError> {
        let targets: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let split = stratified_split(&targets, 0.3, 1)?;
        assert!(split.test.iter().all(|i| !split.train.contains(i)));
        Ok(())
    }

    #[test]
    fn test_same_seed_same_split() -> Result<(), ClassifierError> {
        let targets: Vec<usize> = (0..50).map(|i| i % 4).collect();
        assert_eq!(stratified_split(&targets, 0.2, 42)?, stratified_split(&targets, 0.2, 42)?);
        Ok(())
    }

    #[test]
    fn test_rejects_unsplittable_input() {
        assert!(stratified_split(&[0, 0, 0], 0.2, 42).is_err());
        assert!(stratified_split(&[0, 0, 1], 0.2, 42).is_err());
        assert!(stratified_split(&[0, 0, 1, 1], 0.0, 42).is_err());
        assert!(stratified_split(&[0, 0, 1, 1], 1.0, 42).is_err());
    }
}
