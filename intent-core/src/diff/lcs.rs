use std::collections::{BTreeMap, BTreeSet};

/// Longest common subsequence of two identifier sequences.
///
/// Shared leading and trailing runs are matched directly. When each side
/// holds distinct identifiers, as rule and NAT sequences do, the middle is
/// the longest increasing run of right-hand positions: O(n log n) time and
/// linear memory. Repeated identifiers fall back to the quadratic table.
pub fn longest_common_subsequence<'a>(left: &[&'a str], right: &[&'a str]) -> Vec<&'a str> {
    let prefix = left.iter().zip(right).take_while(|(l, r)| l == r).count();
    let (left_rest, right_rest) = (&left[prefix..], &right[prefix..]);
    let suffix = left_rest
        .iter()
        .rev()
        .zip(right_rest.iter().rev())
        .take_while(|(l, r)| l == r)
        .count();
    let left_mid = &left_rest[..left_rest.len() - suffix];
    let right_mid = &right_rest[..right_rest.len() - suffix];

    let mut out = Vec::with_capacity(prefix + suffix + left_mid.len().min(right_mid.len()));
    out.extend_from_slice(&left[..prefix]);
    match distinct_positions(left_mid, right_mid) {
        Some(positions) => out.extend(
            increasing_run(&positions)
                .into_iter()
                .map(|i| right_mid[positions[i]]),
        ),
        None => out.extend(table_lcs(left_mid, right_mid)),
    }
    out.extend_from_slice(&left_rest[left_rest.len() - suffix..]);
    out
}

/// Right-hand index of each left identifier found on the right, in left
/// order. `None` when either side repeats an identifier.
fn distinct_positions(left: &[&str], right: &[&str]) -> Option<Vec<usize>> {
    let mut index = BTreeMap::new();
    for (pos, name) in right.iter().enumerate() {
        if index.insert(*name, pos).is_some() {
            return None;
        }
    }
    let mut seen = BTreeSet::new();
    let mut positions = Vec::with_capacity(left.len());
    for name in left {
        if !seen.insert(*name) {
            return None;
        }
        if let Some(&pos) = index.get(name) {
            positions.push(pos);
        }
    }
    Some(positions)
}

/// Indices into `values` of one longest strictly increasing run.
fn increasing_run(values: &[usize]) -> Vec<usize> {
    // tails[k]: index of the smallest value ending a run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];
    for (idx, &value) in values.iter().enumerate() {
        let len = tails.partition_point(|&t| values[t] < value);
        if len > 0 {
            prev[idx] = Some(tails[len - 1]);
        }
        if len == tails.len() {
            tails.push(idx);
        } else {
            tails[len] = idx;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(idx) = cursor {
        run.push(idx);
        cursor = prev[idx];
    }
    run.reverse();
    run
}

fn table_lcs<'a>(left: &[&'a str], right: &[&'a str]) -> Vec<&'a str> {
    let rows = left.len();
    let cols = right.len();
    let mut table = vec![vec![0usize; cols + 1]; rows + 1];

    for i in (0..rows).rev() {
        for j in (0..cols).rev() {
            table[i][j] = if left[i] == right[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(table[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < rows && j < cols {
        if left[i] == right[j] {
            out.push(left[i]);
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{longest_common_subsequence, table_lcs};

    #[test]
    fn identical_sequences_are_fully_common() {
        let seq = ["a", "b", "c"];
        assert_eq!(longest_common_subsequence(&seq, &seq), vec!["a", "b", "c"]);
    }

    #[test]
    fn single_move_leaves_rest_common() {
        let left = ["a", "b", "c", "d"];
        let right = ["b", "c", "d", "a"];
        assert_eq!(longest_common_subsequence(&left, &right), vec!["b", "c", "d"]);
    }

    #[test]
    fn empty_side_yields_empty() {
        assert!(longest_common_subsequence(&[], &["a"]).is_empty());
    }

    #[test]
    fn distinct_identifiers_match_the_table_length() {
        let cases: [(&[&str], &[&str]); 4] = [
            (&["a", "b", "c", "d", "e"], &["e", "b", "d", "a", "c"]),
            (&["a", "b", "c", "d", "e", "f"], &["a", "d", "c", "b", "e", "f"]),
            (&["a", "b"], &["b", "a"]),
            (&["x", "a", "y", "b"], &["b", "a", "z"]),
        ];
        for (left, right) in cases {
            let fast = longest_common_subsequence(left, right);
            assert_eq!(fast.len(), table_lcs(left, right).len(), "{left:?} {right:?}");
            let mut rest = right.iter();
            assert!(fast.iter().all(|name| rest.any(|r| r == name)), "{fast:?}");
        }
    }

    #[test]
    fn repeated_identifiers_use_the_table() {
        let left = ["a", "b", "a", "c"];
        let right = ["b", "a", "c", "a"];
        assert_eq!(longest_common_subsequence(&left, &right), vec!["b", "a", "c"]);
    }

    #[test]
    fn long_sequences_need_no_quadratic_table() {
        let names: Vec<String> = (0..50_000).map(|n| format!("rule-{n}")).collect();
        let left: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut right = left.clone();
        let moved = right.remove(10);
        right.insert(40_000, moved);

        let common = longest_common_subsequence(&left, &right);

        assert_eq!(common.len(), left.len() - 1);
        assert!(!common.contains(&"rule-10"));
    }
}
