use crate::history::HistoryItem;

/// Indices of scored items below `threshold`, in answering order.
pub fn select_for_review(history: &[HistoryItem], threshold: u32) -> Vec<usize> {
    history
        .iter()
        .enumerate()
        .filter(|(_, item)| item.awarded_score.is_some_and(|score| score < threshold))
        .map(|(index, _)| index)
        .collect()
}

/// Builds the queue for a new review round: entries left unresolved by an
/// earlier round plus everything currently eligible, deduplicated and in
/// answering order. Stale indices are dropped.
pub fn merge_queue(unresolved: &[usize], eligible: &[usize], history_len: usize) -> Vec<usize> {
    let mut queue: Vec<usize> = unresolved
        .iter()
        .chain(eligible.iter())
        .copied()
        .filter(|&index| index < history_len)
        .collect();
    queue.sort_unstable();
    queue.dedup();
    queue
}

/// Drops entries after `cursor` that are no longer eligible. Visited entries are kept
/// so the cursor keeps pointing at the same item.
pub fn prune_tail(queue: &mut Vec<usize>, cursor: usize, history: &[HistoryItem], threshold: u32) {
    let eligible = select_for_review(history, threshold);
    let split = (cursor + 1).min(queue.len());
    let tail: Vec<usize> = queue
        .drain(split..)
        .filter(|index| eligible.contains(index))
        .collect();
    queue.extend(tail);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::REVIEW_THRESHOLD;

    fn history(scores: &[Option<u32>]) -> Vec<HistoryItem> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let mut item = HistoryItem::new(format!("question {i}"), "answer");
                if let Some(score) = score {
                    item.record("answer".into(), *score, "explanation".into(), None);
                }
                item
            })
            .collect()
    }

    #[test]
    fn test_threshold_is_strict() {
        let history = history(&[Some(2), Some(3), Some(0), Some(5), None]);
        assert_eq!(select_for_review(&history, REVIEW_THRESHOLD), vec![0, 2]);
    }

    #[test]
    fn test_single_low_score_is_eligible() {
        let history = history(&[Some(2)]);
        assert_eq!(select_for_review(&history, REVIEW_THRESHOLD), vec![0]);
    }

    #[test]
    fn test_merge_keeps_unresolved_and_orders() {
        let queue = merge_queue(&[4, 1], &[1, 2, 9], 5);
        assert_eq!(queue, vec![1, 2, 4]);
    }

    #[test]
    fn test_prune_tail_only_touches_unvisited() {
        let mut history = history(&[Some(1), Some(1), Some(1)]);
        let mut queue = vec![0, 1, 2];
        history[2].record("better".into(), 5, "good".into(), None);
        history[0].record("better".into(), 5, "good".into(), None);

        prune_tail(&mut queue, 0, &history, REVIEW_THRESHOLD);
        assert_eq!(queue, vec![0, 1]);
    }
}
