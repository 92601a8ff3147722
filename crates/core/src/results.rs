//! Result aggregation
//!
//! Tallies ballots per item and partitions the items into three disjoint
//! buckets. Classification uses only each item's own tally:
//!
//! - a tie with at least one vote is **controversial**,
//! - more likes than dislikes is **approved**,
//! - everything else, including items nobody voted on, is **rejected**.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Ballot, BallotKey, Decision, Item};

/// Which bucket an item lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Approved,
    Rejected,
    Controversial,
}

impl Category {
    /// Classify a tally
    pub fn classify(likes: u32, dislikes: u32) -> Self {
        if likes + dislikes > 0 && likes == dislikes {
            Category::Controversial
        } else if likes > dislikes {
            Category::Approved
        } else {
            Category::Rejected
        }
    }
}

/// An item with its tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub item: Item,
    pub likes: u32,
    pub dislikes: u32,
    /// Non-empty ballot comments, in ballot order
    pub comments: Vec<String>,
}

impl ItemResult {
    pub fn total(&self) -> u32 {
        self.likes + self.dislikes
    }

    /// Share of likes, 0 when nobody voted
    pub fn percentage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => f64::from(self.likes) / f64::from(total) * 100.0,
        }
    }

    pub fn category(&self) -> Category {
        Category::classify(self.likes, self.dislikes)
    }
}

/// The three result buckets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    pub approved: Vec<ItemResult>,
    pub rejected: Vec<ItemResult>,
    pub controversial: Vec<ItemResult>,
}

impl Results {
    pub fn len(&self) -> usize {
        self.approved.len() + self.rejected.len() + self.controversial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ballots counted across all items
    pub fn total_ballots(&self) -> u32 {
        self.iter().map(ItemResult::total).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemResult> {
        self.approved
            .iter()
            .chain(self.rejected.iter())
            .chain(self.controversial.iter())
    }

    pub fn bucket(&self, category: Category) -> &[ItemResult] {
        match category {
            Category::Approved => &self.approved,
            Category::Rejected => &self.rejected,
            Category::Controversial => &self.controversial,
        }
    }
}

/// Tally `ballots` against `items` and partition the items
///
/// Ballots are deduplicated by (participant, item); the last one in input
/// order counts. Ballots for unknown items are ignored. Items repeating an
/// earlier id are skipped.
pub fn compute_results<'a, B>(items: &[Item], ballots: B) -> Results
where
    B: IntoIterator<Item = &'a Ballot>,
{
    let mut latest: HashMap<BallotKey, (usize, &Ballot)> = HashMap::new();
    for (position, ballot) in ballots.into_iter().enumerate() {
        latest.insert(ballot.key(), (position, ballot));
    }
    let mut counted: Vec<(usize, &Ballot)> = latest.into_values().collect();
    counted.sort_by_key(|(position, _)| *position);

    // An item id listed twice is tallied once, at its first position
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut tallies: Vec<ItemResult> = Vec::with_capacity(items.len());
    for item in items {
        if index.contains_key(item.id.as_str()) {
            continue;
        }
        index.insert(item.id.as_str(), tallies.len());
        tallies.push(ItemResult {
            item: item.clone(),
            likes: 0,
            dislikes: 0,
            comments: Vec::new(),
        });
    }

    for (_, ballot) in counted {
        let Some(&i) = index.get(ballot.item_id.as_str()) else {
            continue;
        };
        let tally = &mut tallies[i];
        match ballot.decision {
            Decision::Like => tally.likes += 1,
            Decision::Dislike => tally.dislikes += 1,
        }
        if let Some(comment) = ballot.comment.as_deref().map(str::trim) {
            if !comment.is_empty() {
                tally.comments.push(comment.to_string());
            }
        }
    }

    let mut results = Results::default();
    for tally in tallies {
        match tally.category() {
            Category::Approved => results.approved.push(tally),
            Category::Rejected => results.rejected.push(tally),
            Category::Controversial => results.controversial.push(tally),
        }
    }

    // Stable sorts: input order breaks ties
    results.approved.sort_by(|a, b| b.likes.cmp(&a.likes));
    results.rejected.sort_by(|a, b| b.dislikes.cmp(&a.dislikes));
    results.controversial.sort_by(|a, b| b.total().cmp(&a.total()));

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            room_id: "ROOM01".to_string(),
            name: format!("Mod {}", id),
            description: "desc".to_string(),
            url: None,
            image: None,
            proposed_by: "u0".to_string(),
            created_at: Utc::now(),
        }
    }

    fn ballot(participant: &str, item: &str, decision: Decision) -> Ballot {
        Ballot::new(
            "ROOM01".to_string(),
            item.to_string(),
            participant.to_string(),
            decision,
            None,
        )
    }

    fn votes(item: &str, likes: u32, dislikes: u32) -> Vec<Ballot> {
        let mut out = Vec::new();
        for i in 0..likes {
            out.push(ballot(&format!("like{}", i), item, Decision::Like));
        }
        for i in 0..dislikes {
            out.push(ballot(&format!("dislike{}", i), item, Decision::Dislike));
        }
        out
    }

    fn ids(bucket: &[ItemResult]) -> Vec<&str> {
        bucket.iter().map(|r| r.item.id.as_str()).collect()
    }

    #[test]
    fn test_example_scenario() {
        let items = vec![item("A"), item("B"), item("C")];
        let mut ballots = votes("A", 3, 1);
        ballots.extend(votes("B", 1, 1));

        let results = compute_results(&items, &ballots);
        assert_eq!(ids(&results.approved), vec!["A"]);
        assert_eq!(ids(&results.controversial), vec!["B"]);
        assert_eq!(ids(&results.rejected), vec!["C"]);
        assert_eq!(results.approved[0].likes, 3);
        assert_eq!(results.approved[0].dislikes, 1);
    }

    #[test]
    fn test_no_items() {
        let results = compute_results(&[], &votes("A", 2, 0));
        assert!(results.is_empty());
    }

    #[test]
    fn test_unvoted_item_rejected() {
        let results = compute_results(&[item("A")], &Vec::<Ballot>::new());
        assert_eq!(ids(&results.rejected), vec!["A"]);
        assert_eq!(results.rejected[0].percentage(), 0.0);
    }

    #[test]
    fn test_tie_is_controversial() {
        for n in 1..5 {
            let results = compute_results(&[item("A")], &votes("A", n, n));
            assert_eq!(ids(&results.controversial), vec!["A"]);
            assert!(results.approved.is_empty());
            assert!(results.rejected.is_empty());
        }
    }

    #[test]
    fn test_majorities() {
        let items = vec![item("A"), item("B")];
        let mut ballots = votes("A", 2, 1);
        ballots.extend(votes("B", 1, 2));
        let results = compute_results(&items, &ballots);
        assert_eq!(ids(&results.approved), vec!["A"]);
        assert_eq!(ids(&results.rejected), vec!["B"]);
    }

    #[test]
    fn test_unknown_item_ignored() {
        let results = compute_results(&[item("A")], &votes("ghost", 5, 0));
        assert_eq!(ids(&results.rejected), vec!["A"]);
        assert_eq!(results.total_ballots(), 0);
    }

    #[test]
    fn test_duplicate_ballots_last_wins() {
        let ballots = vec![
            ballot("u1", "A", Decision::Like),
            ballot("u1", "A", Decision::Dislike),
        ];
        let results = compute_results(&[item("A")], &ballots);
        assert_eq!(results.rejected[0].likes, 0);
        assert_eq!(results.rejected[0].dislikes, 1);
    }

    #[test]
    fn test_bucket_ordering() {
        let items = vec![item("A"), item("B"), item("C"), item("D"), item("E"), item("F")];
        let mut ballots = votes("A", 2, 0);
        ballots.extend(votes("B", 5, 1));
        ballots.extend(votes("C", 0, 1));
        ballots.extend(votes("D", 1, 4));
        ballots.extend(votes("E", 1, 1));
        ballots.extend(votes("F", 3, 3));

        let results = compute_results(&items, &ballots);
        assert_eq!(ids(&results.approved), vec!["B", "A"]);
        assert_eq!(ids(&results.rejected), vec!["D", "C"]);
        assert_eq!(ids(&results.controversial), vec!["F", "E"]);
    }

    #[test]
    fn test_partition_complete_and_disjoint() {
        let items: Vec<Item> = (0..12).map(|i| item(&format!("m{}", i))).collect();
        let mut ballots = Vec::new();
        for (i, it) in items.iter().enumerate() {
            ballots.extend(votes(&it.id, (i % 4) as u32, (i % 3) as u32));
        }

        let results = compute_results(&items, &ballots);
        assert_eq!(results.len(), items.len());

        let seen: HashSet<&str> = results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(seen.len(), items.len());
        for it in &items {
            assert!(seen.contains(it.id.as_str()));
        }
        for r in results.iter() {
            assert_eq!(
                results.bucket(r.category()).iter().filter(|x| x.item.id == r.item.id).count(),
                1
            );
        }
    }

    #[test]
    fn test_comments_collected() {
        let mut with_comment = ballot("u1", "A", Decision::Like);
        with_comment.comment = Some("  great  ".to_string());
        let mut blank = ballot("u2", "A", Decision::Like);
        blank.comment = Some("   ".to_string());

        let results = compute_results(&[item("A")], &vec![with_comment, blank]);
        assert_eq!(results.approved[0].comments, vec!["great".to_string()]);
        assert_eq!(results.approved[0].percentage(), 100.0);
    }
}
