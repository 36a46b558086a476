//! Seeded stratified train/evaluation split

use crate::error::{PipelineError, PipelineResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

/// Row indices of each subset, ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub eval: Vec<usize>,
}

/// Split `labels` so both subsets keep the class proportions.
///
/// The evaluation subset has `ceil(test_fraction * n)` rows. Per-class
/// evaluation counts use largest-remainder allocation and every class keeps
/// at least one row on each side.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> PipelineResult<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::DataQuality(format!(
            "test fraction {} must be strictly between 0 and 1",
            test_fraction
        )));
    }

    let n = labels.len();
    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        by_class[usize::from(label.min(1))].push(i);
    }

    for (class, members) in by_class.iter().enumerate() {
        if members.len() < 2 {
            return Err(PipelineError::DataQuality(format!(
                "class {} has {} sample(s); stratified split needs at least 2 per class",
                class,
                members.len()
            )));
        }
    }

    let n_eval = ((test_fraction * n as f64).ceil() as usize).max(2);
    if n - n_eval < 2 {
        return Err(PipelineError::DataQuality(format!(
            "{} samples leave fewer than 2 for training at test fraction {}",
            n, test_fraction
        )));
    }

    let counts = [by_class[0].len(), by_class[1].len()];
    let eval_counts = allocate(counts, n_eval);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_eval);
    let mut eval = Vec::with_capacity(n_eval);
    for (members, take) in by_class.iter_mut().zip(eval_counts) {
        members.shuffle(&mut rng);
        eval.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }
    train.sort_unstable();
    eval.sort_unstable();

    Ok(SplitIndices { train, eval })
}

/// Largest-remainder allocation of `total` across classes, each kept in `1..count`
fn allocate(counts: [usize; 2], total: usize) -> [usize; 2] {
    let n: usize = counts.iter().sum();
    let exact = counts.map(|c| total as f64 * c as f64 / n as f64);
    let mut alloc = exact.map(|e| e.floor() as usize);

    let mut order = [0usize, 1];
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.partial_cmp(&fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(counts[b].cmp(&counts[a]))
    });
    let mut remaining = total - alloc.iter().sum::<usize>();
    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        alloc[class] += 1;
        remaining -= 1;
    }

    for class in 0..2 {
        alloc[class] = alloc[class].clamp(1, counts[class] - 1);
    }
    // Clamping can move the sum off target; shift between classes to restore it
    while alloc.iter().sum::<usize>() > total {
        let class = if alloc[0] >= alloc[1] { 0 } else { 1 };
        if alloc[class] <= 1 {
            break;
        }
        alloc[class] -= 1;
    }
    while alloc.iter().sum::<usize>() < total {
        let headroom = [counts[0] - 1 - alloc[0], counts[1] - 1 - alloc[1]];
        let class = if headroom[0] >= headroom[1] { 0 } else { 1 };
        if headroom[class] == 0 {
            break;
        }
        alloc[class] += 1;
    }
    alloc
}
