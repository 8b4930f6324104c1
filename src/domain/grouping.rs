//! Identity grouping of name variants.
//!
//! Surface forms such as "Jon", "John", and "J. Smith" are clustered so
//! that one identity receives one substitute. Forms are linked when their
//! similarity strictly exceeds a cutoff; the partition is the set of
//! connected components of that graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Lowercases and collapses whitespace runs.
///
/// ```
/// use phi_redactor::domain::grouping::normalize_form;
///
/// assert_eq!(normalize_form("  Jennifer   K.  Lee "), "jennifer k. lee");
/// ```
pub fn normalize_form(surface: &str) -> String {
    surface
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(form: &str) -> Vec<&str> {
    form.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn ratio(a: &str, b: &str) -> f64 {
    100.0 * strsim::normalized_levenshtein(a, b)
}

/// Similarity of two normalized forms on a 0..=100 scale.
///
/// The score is the best of a whole-string edit ratio, an order-insensitive
/// token ratio, an aligned token-window ratio for forms with different word
/// counts, and a word-by-word prefix match for multi-word forms
/// ("j smith" / "john smith", "jen lee" / "jennifer lee").
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }

    let (ta, tb) = (tokens(a), tokens(b));
    let mut best = ratio(a, b);

    let mut sorted_a = ta.clone();
    let mut sorted_b = tb.clone();
    sorted_a.sort_unstable();
    sorted_b.sort_unstable();
    best = best.max(0.95 * ratio(&sorted_a.join(" "), &sorted_b.join(" ")));

    let (short, long) = if ta.len() <= tb.len() { (&ta, &tb) } else { (&tb, &ta) };
    if short.is_empty() {
        return best;
    }

    if short.len() < long.len() {
        let joined_short = short.join(" ");
        for window in long.windows(short.len()) {
            best = best.max(0.9 * ratio(&joined_short, &window.join(" ")));
        }
    }

    let has_anchor = short.iter().any(|t| t.chars().count() >= 3);
    if short.len() >= 2 && short.len() == long.len() && has_anchor {
        let prefixed = short.iter().zip(long.iter()).all(|(s, l)| l.starts_with(s) || s.starts_with(l));
        if prefixed {
            best = best.max(85.0);
        }
    }

    best
}

/// A partition of person surface forms into identities.
#[derive(Debug, Clone, Default)]
pub struct IdentityGroups {
    groups: Vec<BTreeSet<String>>,
    canonical: HashMap<String, String>,
}

impl IdentityGroups {
    /// Groups surface forms, linking pairs whose similarity exceeds `cutoff`.
    ///
    /// The result depends only on the set of forms and the cutoff, never on
    /// input order.
    pub fn build<S: AsRef<str>>(surfaces: &[S], cutoff: f64) -> Self {
        let forms: Vec<String> = surfaces
            .iter()
            .map(|s| normalize_form(s.as_ref()))
            .filter(|f| !f.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..forms.len() {
            for j in (i + 1)..forms.len() {
                if similarity(&forms[i], &forms[j]) > cutoff {
                    adjacency.entry(i).or_default().push(j);
                    adjacency.entry(j).or_default().push(i);
                }
            }
        }

        let mut visited = vec![false; forms.len()];
        let mut groups = Vec::new();
        for root in 0..forms.len() {
            if visited[root] {
                continue;
            }
            visited[root] = true;

            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([root]);
            while let Some(node) = queue.pop_front() {
                component.insert(forms[node].clone());
                for &next in adjacency.get(&node).into_iter().flatten() {
                    if !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            groups.push(component);
        }

        let mut canonical = HashMap::new();
        for group in &groups {
            if let Some(key) = group.iter().next() {
                for member in group {
                    canonical.insert(member.clone(), key.clone());
                }
            }
        }

        Self { groups, canonical }
    }

    /// The components, each a set of normalized forms.
    pub fn groups(&self) -> &[BTreeSet<String>] {
        &self.groups
    }

    /// The identity key for a surface form: the smallest normalized member
    /// of its group, or the form itself if it was never grouped.
    pub fn canonical_key(&self, surface: &str) -> String {
        let form = normalize_form(surface);
        self.canonical.get(&form).cloned().unwrap_or(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_jon_and_john_grouped() {
        assert!(similarity("jon", "john") > 70.0);
        let groups = IdentityGroups::build(&["Jon", "John"], 70.0);
        assert_eq!(groups.groups(), &[set(&["john", "jon"])]);
        assert_eq!(groups.canonical_key("Jon"), groups.canonical_key("JOHN"));
    }

    #[test]
    fn test_unrelated_names_are_singletons() {
        let groups = IdentityGroups::build(&["Mary Jones", "Jon", "Luke"], 70.0);
        assert_eq!(groups.groups().len(), 3);
    }

    #[test]
    fn test_partial_and_prefix_forms() {
        assert!(similarity("jennifer", "jennifer lee") > 70.0);
        assert!(similarity("jen lee", "jennifer lee") > 70.0);
        assert!(similarity("j smith", "john smith") > 70.0);
        assert!(similarity("jon", "mary jones") <= 70.0);
    }

    #[test]
    fn test_transitive_components() {
        let groups = IdentityGroups::build(&["Jen Lee", "Jennifer", "Jennifer Lee", "Luke"], 70.0);
        let as_sets: BTreeSet<BTreeSet<String>> = groups.groups().iter().cloned().collect();
        let expected: BTreeSet<BTreeSet<String>> = [
            set(&["jen lee", "jennifer", "jennifer lee"]),
            set(&["luke"]),
        ]
        .into_iter()
        .collect();
        assert_eq!(as_sets, expected);
    }

    #[test]
    fn test_partition_ignores_input_order() {
        let a = IdentityGroups::build(&["Luke", "John", "Jon", "Jenny"], 70.0);
        let b = IdentityGroups::build(&["Jenny", "Jon", "Luke", "John"], 70.0);
        let sa: BTreeSet<_> = a.groups().iter().cloned().collect();
        let sb: BTreeSet<_> = b.groups().iter().cloned().collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_ungrouped_form_is_its_own_key() {
        let groups = IdentityGroups::build(&["John"], 70.0);
        assert_eq!(groups.canonical_key("Someone  Else"), "someone else");
    }
}
