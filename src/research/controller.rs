use super::reflection::ReflectionOutcome;
use super::web::ResearchBranch;

/// Where the pipeline goes after a reflection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    FinalizeAnswer,
    WebResearch(Vec<ResearchBranch>),
}

/// Decide between another research round and answer synthesis.
///
/// Stops when the evidence is sufficient, the loop ceiling is reached, or
/// the model offered nothing further to search. Follow-up branch ids
/// continue from the number of queries already run.
pub fn evaluate_research(outcome: &ReflectionOutcome, max_research_loops: u32) -> NextStep {
    let verdict = &outcome.verdict;
    if verdict.is_sufficient
        || outcome.research_loop_count >= max_research_loops
        || verdict.follow_up_queries.is_empty()
    {
        return NextStep::FinalizeAnswer;
    }

    let branches = verdict
        .follow_up_queries
        .iter()
        .enumerate()
        .map(|(i, query)| ResearchBranch {
            id: outcome.number_of_ran_queries + i,
            query: query.clone(),
        })
        .collect();

    NextStep::WebResearch(branches)
}

/// Branches for the first round: ids `0..queries.len()`.
pub fn initial_branches<'a>(queries: impl IntoIterator<Item = &'a str>) -> Vec<ResearchBranch> {
    queries
        .into_iter()
        .enumerate()
        .map(|(id, query)| ResearchBranch {
            id,
            query: query.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::reflection::Reflection;

    fn outcome(sufficient: bool, follow_ups: &[&str], loops: u32, ran: usize) -> ReflectionOutcome {
        ReflectionOutcome {
            verdict: Reflection {
                is_sufficient: sufficient,
                knowledge_gap: String::new(),
                follow_up_queries: follow_ups.iter().map(|s| s.to_string()).collect(),
            },
            research_loop_count: loops,
            number_of_ran_queries: ran,
        }
    }

    #[test]
    fn test_sufficient_finalizes() {
        let next = evaluate_research(&outcome(true, &["more?"], 1, 3), 5);
        assert_eq!(next, NextStep::FinalizeAnswer);
    }

    #[test]
    fn test_loop_ceiling_finalizes() {
        assert_eq!(
            evaluate_research(&outcome(false, &["more?"], 2, 3), 2),
            NextStep::FinalizeAnswer
        );
        assert_eq!(
            evaluate_research(&outcome(false, &["more?"], 1, 3), 0),
            NextStep::FinalizeAnswer
        );
    }

    #[test]
    fn test_terminates_exactly_at_max() {
        let max = 4;
        let passes = (1..=10).find(|&loop_count| {
            evaluate_research(&outcome(false, &["again"], loop_count, 1), max)
                == NextStep::FinalizeAnswer
        });
        assert_eq!(passes, Some(max));
    }

    #[test]
    fn test_follow_up_ids_continue_from_ran_queries() {
        let next = evaluate_research(&outcome(false, &["a", "b", "c"], 1, 4), 3);
        let NextStep::WebResearch(branches) = next else {
            panic!("expected more research");
        };
        let ids: Vec<usize> = branches.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(branches[1].query, "b");
    }

    #[test]
    fn test_no_follow_ups_finalizes() {
        let next = evaluate_research(&outcome(false, &[], 1, 2), 3);
        assert_eq!(next, NextStep::FinalizeAnswer);
    }

    #[test]
    fn test_initial_branches_are_dense() {
        let branches = initial_branches(["x", "y"]);
        assert_eq!(branches[0].id, 0);
        assert_eq!(branches[1].id, 1);
        assert_eq!(branches[1].query, "y");
    }
}
