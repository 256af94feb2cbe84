//! Funnel plans: a step pattern folded into a chain of named filter stages.
//!
//! A plan is evaluated in two places: rendered to SQL by `FunnelSqlRenderer`
//! and run per session by [`FunnelPlan::evaluate_session`]. Both read the
//! same stages.

use tracing::debug;
use waypoint_query::{HitFilter, HitKind, NormalizedHit, ValuePattern};

use crate::types::{EntryMode, EventScope, ParamFilter, Step, StepPattern};

/// What a single hit must look like to satisfy a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitPredicate {
    pub kind: HitKind,
    pub pattern: ValuePattern,
    pub param_filters: Vec<ParamFilter>,
}

impl HitPredicate {
    fn from_step(step: &Step) -> Self {
        Self {
            kind: step.kind.hit_kind(),
            pattern: step.pattern.clone(),
            param_filters: step.param_filters.clone(),
        }
    }

    pub fn matches(&self, hit: &NormalizedHit) -> bool {
        hit.kind == self.kind
            && self.pattern.matches(&hit.path_or_name)
            && self.param_filters.iter().all(|f| f.matches(&hit.params))
    }
}

/// One step of the plan.
///
/// A session's qualifying hit for this stage is its earliest hit that
/// - satisfies `predicate`,
/// - is strictly later than the qualifying hit of `follows`,
/// - when `same_page` is set, is on the page of the `follows` match,
/// - when `adjacency` is set, directly follows a hit satisfying it (and,
///   with `same_page`, that hit is on the page of the `follows` match too).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStage {
    pub name: String,
    pub index: usize,
    pub follows: Option<String>,
    pub predicate: HitPredicate,
    pub same_page: bool,
    pub adjacency: Option<HitPredicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelPlan {
    mode: EntryMode,
    stages: Vec<PlanStage>,
}

pub fn stage_name(index: usize) -> String {
    format!("step_{index}")
}

impl FunnelPlan {
    pub fn compile(pattern: &StepPattern, mode: EntryMode) -> Self {
        let steps = pattern.steps();
        let stages: Vec<PlanStage> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let previous = index.checked_sub(1).map(|i| &steps[i]);
                let stage = PlanStage {
                    name: stage_name(index),
                    index,
                    follows: previous.map(|_| stage_name(index - 1)),
                    predicate: HitPredicate::from_step(step),
                    same_page: previous.is_some() && step.scope == EventScope::CurrentPath,
                    adjacency: previous
                        .filter(|_| mode.is_strict())
                        .map(HitPredicate::from_step),
                };
                debug!(
                    "Compiled stage {} ({:?} '{}', follows {:?}, same_page {}, adjacent {})",
                    stage.name,
                    step.kind,
                    step.value,
                    stage.follows,
                    stage.same_page,
                    stage.adjacency.is_some()
                );
                stage
            })
            .collect();

        Self { mode, stages }
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub fn stages(&self) -> &[PlanStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Sessions without a hit for the first stage cannot count anywhere
    pub fn entry_filter(&self) -> Option<HitFilter> {
        self.stages
            .first()
            .map(|stage| HitFilter::new(stage.predicate.kind, stage.predicate.pattern.clone()))
    }

    /// Positions in `hits` of the qualifying hit for each stage the session
    /// reached, in stage order. `hits` must be ordered by `(timestamp, seq)`.
    pub fn evaluate_session(&self, hits: &[NormalizedHit]) -> Vec<usize> {
        let mut matched: Vec<usize> = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let found = match matched.last() {
                None => hits.iter().position(|hit| stage.predicate.matches(hit)),
                Some(&previous) => find_after(stage, hits, previous),
            };

            match found {
                Some(position) => matched.push(position),
                None => break,
            }
        }

        matched
    }

    /// Number of sessions reaching each stage
    pub fn count_sessions<'a>(
        &self,
        sessions: impl IntoIterator<Item = &'a [NormalizedHit]>,
    ) -> Vec<u64> {
        let mut counts = vec![0u64; self.stages.len()];
        for hits in sessions {
            let reached = self.evaluate_session(hits).len();
            for count in counts.iter_mut().take(reached) {
                *count += 1;
            }
        }
        counts
    }
}

fn find_after(stage: &PlanStage, hits: &[NormalizedHit], previous: usize) -> Option<usize> {
    let anchor = &hits[previous];
    let page = anchor.page();

    (previous + 1..hits.len()).find(|&position| {
        let candidate = &hits[position];
        if candidate.timestamp <= anchor.timestamp || !stage.predicate.matches(candidate) {
            return false;
        }
        if stage.same_page && candidate.page() != page {
            return false;
        }
        match &stage.adjacency {
            None => true,
            Some(adjacency) => {
                let preceding = &hits[position - 1];
                adjacency.matches(preceding) && (!stage.same_page || preceding.page() == page)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamOperator, StepDefinition};
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use waypoint_query::SessionHits;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn pageviews(session: &str, visits: &[(&str, i64)]) -> Vec<NormalizedHit> {
        visits
            .iter()
            .enumerate()
            .map(|(seq, (path, secs))| {
                NormalizedHit::pageview(session, at(*secs), seq as u64, path)
            })
            .collect()
    }

    fn url_pattern(values: &[&str]) -> StepPattern {
        StepPattern::new(values.iter().map(|v| StepDefinition::url(*v)).collect()).unwrap()
    }

    fn counts(pattern: &StepPattern, mode: EntryMode, sessions: &[Vec<NormalizedHit>]) -> Vec<u64> {
        FunnelPlan::compile(pattern, mode).count_sessions(sessions.iter().map(Vec::as_slice))
    }

    #[test]
    fn test_compile_names_and_links_stages() {
        let plan = FunnelPlan::compile(&url_pattern(&["/a", "/b", "/c"]), EntryMode::Strict);

        let names: Vec<&str> = plan.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["step_0", "step_1", "step_2"]);
        assert_eq!(plan.stages()[0].follows, None);
        assert_eq!(plan.stages()[2].follows.as_deref(), Some("step_1"));
        assert!(plan.stages()[0].adjacency.is_none());
        assert_eq!(
            plan.stages()[1].adjacency.as_ref().map(|a| a.pattern.to_string()),
            Some("/a".to_string())
        );

        let loose = FunnelPlan::compile(&url_pattern(&["/a", "/b"]), EntryMode::Loose);
        assert!(loose.stages().iter().all(|s| s.adjacency.is_none()));
    }

    #[test]
    fn test_strict_and_loose_example_sessions() {
        let sessions = vec![
            pageviews("s1", &[("/a", 0), ("/b", 60), ("/c", 120)]),
            pageviews("s2", &[("/a", 0), ("/x", 30), ("/b", 60), ("/c", 120)]),
        ];
        let pattern = url_pattern(&["/a", "/b", "/c"]);

        assert_eq!(counts(&pattern, EntryMode::Strict, &sessions), vec![2, 1, 1]);
        assert_eq!(counts(&pattern, EntryMode::Loose, &sessions), vec![2, 2, 2]);
    }

    #[test]
    fn test_later_step_requires_strictly_later_hit() {
        let sessions = vec![pageviews("s1", &[("/b", 0), ("/a", 10)])];
        let pattern = url_pattern(&["/a", "/b"]);
        assert_eq!(counts(&pattern, EntryMode::Loose, &sessions), vec![1, 0]);

        // Same timestamp is not "after"
        let tied = vec![pageviews("s1", &[("/a", 0), ("/b", 0)])];
        assert_eq!(counts(&pattern, EntryMode::Loose, &tied), vec![1, 0]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        // Step 0 anchors on the first /a; the later /a -> /b pair still
        // satisfies strict adjacency because the hit before /b is an /a.
        let session = pageviews("s1", &[("/a", 0), ("/x", 5), ("/a", 10), ("/b", 15)]);
        let plan = FunnelPlan::compile(&url_pattern(&["/a", "/b"]), EntryMode::Strict);
        assert_eq!(plan.evaluate_session(&session), vec![0, 3]);
    }

    #[test]
    fn test_truncation_reports_zero_for_later_steps() {
        let sessions = vec![pageviews("s1", &[("/a", 0), ("/c", 10)])];
        let pattern = url_pattern(&["/a", "/b", "/c"]);
        assert_eq!(counts(&pattern, EntryMode::Loose, &sessions), vec![1, 0, 0]);
    }

    #[test]
    fn test_self_transition_counts() {
        let pattern = url_pattern(&["/a", "/a"]);
        let sessions = vec![
            pageviews("s1", &[("/a", 0), ("/a", 10)]),
            pageviews("s2", &[("/a", 0), ("/b", 5), ("/a", 10)]),
        ];

        assert_eq!(counts(&pattern, EntryMode::Loose, &sessions), vec![2, 2]);
        assert_eq!(counts(&pattern, EntryMode::Strict, &sessions), vec![2, 1]);
    }

    #[test]
    fn test_wildcard_steps() {
        let pattern = url_pattern(&["/blog/*", "/signup"]);
        let sessions = vec![
            pageviews("s1", &[("/blog/rust", 0), ("/signup", 10)]),
            pageviews("s2", &[("/blog", 0), ("/signup", 10)]),
        ];
        assert_eq!(counts(&pattern, EntryMode::Strict, &sessions), vec![1, 1]);
    }

    #[test]
    fn test_params_apply_to_the_evaluated_hit() {
        let pattern = StepPattern::new(vec![
            StepDefinition::url("/pricing"),
            StepDefinition::event("purchase").with_param("plan", ParamOperator::Equals, "pro"),
        ])
        .unwrap();

        // The matching param sits on a different purchase hit than the
        // first one, and on an earlier one than /pricing.
        let session = vec![
            NormalizedHit::event("s1", at(0), 0, "purchase", "/").with_param("plan", "pro"),
            NormalizedHit::pageview("s1", at(5), 1, "/pricing"),
            NormalizedHit::event("s1", at(10), 2, "purchase", "/pricing")
                .with_param("plan", "free"),
        ];
        let plan = FunnelPlan::compile(&pattern, EntryMode::Loose);
        assert_eq!(plan.evaluate_session(&session), vec![1]);

        let converted = vec![
            NormalizedHit::pageview("s2", at(0), 0, "/pricing"),
            NormalizedHit::event("s2", at(10), 1, "purchase", "/pricing")
                .with_param("plan", "free"),
            NormalizedHit::event("s2", at(20), 2, "purchase", "/pricing")
                .with_param("plan", "pro"),
        ];
        assert_eq!(plan.evaluate_session(&converted), vec![0, 2]);
    }

    #[test]
    fn test_current_path_scope_compares_page_of_previous_match() {
        let pattern = StepPattern::new(vec![
            StepDefinition::url("/product"),
            StepDefinition::event("add_to_cart").scoped(EventScope::CurrentPath),
        ])
        .unwrap();
        let plan = FunnelPlan::compile(&pattern, EntryMode::Loose);

        let elsewhere = vec![
            NormalizedHit::pageview("s1", at(0), 0, "/product"),
            NormalizedHit::pageview("s1", at(5), 1, "/home"),
            NormalizedHit::event("s1", at(10), 2, "add_to_cart", "/home"),
        ];
        assert_eq!(plan.evaluate_session(&elsewhere), vec![0]);

        let same_page = vec![
            NormalizedHit::pageview("s2", at(0), 0, "/product"),
            NormalizedHit::pageview("s2", at(5), 1, "/home"),
            NormalizedHit::event("s2", at(10), 2, "add_to_cart", "/product/"),
        ];
        assert_eq!(plan.evaluate_session(&same_page), vec![0, 2]);

        let anywhere = FunnelPlan::compile(
            &StepPattern::new(vec![
                StepDefinition::url("/product"),
                StepDefinition::event("add_to_cart"),
            ])
            .unwrap(),
            EntryMode::Loose,
        );
        assert_eq!(anywhere.evaluate_session(&elsewhere), vec![0, 2]);
    }

    #[test]
    fn test_strict_current_path_checks_preceding_hit_page() {
        let pattern = StepPattern::new(vec![
            StepDefinition::event("open_modal"),
            StepDefinition::event("submit").scoped(EventScope::CurrentPath),
        ])
        .unwrap();
        let plan = FunnelPlan::compile(&pattern, EntryMode::Strict);

        let session = vec![
            NormalizedHit::event("s1", at(0), 0, "open_modal", "/settings"),
            NormalizedHit::event("s1", at(5), 1, "submit", "/settings"),
        ];
        assert_eq!(plan.evaluate_session(&session), vec![0, 1]);

        // The hit before "submit" is an open_modal, but on another page
        let moved = vec![
            NormalizedHit::event("s2", at(0), 0, "open_modal", "/settings"),
            NormalizedHit::event("s2", at(3), 1, "open_modal", "/billing"),
            NormalizedHit::event("s2", at(5), 2, "submit", "/settings"),
        ];
        assert_eq!(plan.evaluate_session(&moved), vec![0]);
    }

    #[test]
    fn test_current_path_strict_can_exceed_loose() {
        // Loose takes the first click (on /a), strict the one right after /p;
        // the submit only happens on /p.
        let pattern = StepPattern::new(vec![
            StepDefinition::url("/p"),
            StepDefinition::event("click"),
            StepDefinition::event("submit").scoped(EventScope::CurrentPath),
        ])
        .unwrap();
        let session = vec![
            NormalizedHit::pageview("s1", at(0), 0, "/p"),
            NormalizedHit::pageview("s1", at(1), 1, "/z"),
            NormalizedHit::event("s1", at(2), 2, "click", "/a"),
            NormalizedHit::pageview("s1", at(3), 3, "/p"),
            NormalizedHit::event("s1", at(4), 4, "click", "/p"),
            NormalizedHit::event("s1", at(5), 5, "submit", "/p"),
        ];

        let strict = FunnelPlan::compile(&pattern, EntryMode::Strict);
        let loose = FunnelPlan::compile(&pattern, EntryMode::Loose);
        assert_eq!(strict.evaluate_session(&session), vec![0, 4, 5]);
        assert_eq!(loose.evaluate_session(&session), vec![0, 2]);

        let sessions = [session];
        assert_eq!(counts(&pattern, EntryMode::Strict, &sessions), vec![1, 1, 1]);
        assert_eq!(counts(&pattern, EntryMode::Loose, &sessions), vec![1, 1, 0]);
    }

    #[test]
    fn test_mixed_url_and_event_chain() {
        let pattern = StepPattern::new(vec![
            StepDefinition::url("/signup"),
            StepDefinition::event("signup_submitted"),
            StepDefinition::url("/welcome"),
        ])
        .unwrap();
        let session = vec![
            NormalizedHit::pageview("s1", at(0), 0, "/signup"),
            NormalizedHit::event("s1", at(10), 1, "signup_submitted", "/signup"),
            NormalizedHit::pageview("s1", at(11), 2, "/welcome"),
        ];

        let strict = FunnelPlan::compile(&pattern, EntryMode::Strict);
        assert_eq!(strict.evaluate_session(&session), vec![0, 1, 2]);
    }

    fn random_session(rng: &mut StdRng, id: usize) -> Vec<NormalizedHit> {
        const PAGES: [&str; 4] = ["/a", "/b", "/c", "/d"];
        let len = rng.gen_range(0..12);
        let mut secs = 0;
        let hits = (0..len)
            .map(|seq| {
                secs += rng.gen_range(0..3);
                let session = format!("s{id}");
                if rng.gen_bool(0.2) {
                    let page = PAGES[rng.gen_range(0..4)];
                    NormalizedHit::event(session, at(secs), seq, "click", page)
                } else {
                    NormalizedHit::pageview(session, at(secs), seq, PAGES[rng.gen_range(0..4)])
                }
            })
            .collect();
        SessionHits::new(format!("s{id}"), hits).hits
    }

    #[test]
    fn test_random_sessions_loose_covers_strict_and_chain_is_monotonic() {
        let mut rng = StdRng::seed_from_u64(7);
        let sessions: Vec<Vec<NormalizedHit>> =
            (0..400).map(|i| random_session(&mut rng, i)).collect();

        let patterns = [
            url_pattern(&["/a", "/b", "/c"]),
            url_pattern(&["/a", "/a", "/b"]),
            StepPattern::new(vec![
                StepDefinition::url("/b"),
                StepDefinition::event("click"),
                StepDefinition::url("/*"),
            ])
            .unwrap(),
        ];

        for pattern in &patterns {
            let strict_plan = FunnelPlan::compile(pattern, EntryMode::Strict);
            let loose_plan = FunnelPlan::compile(pattern, EntryMode::Loose);

            for hits in &sessions {
                let strict = strict_plan.evaluate_session(hits);
                let loose = loose_plan.evaluate_session(hits);
                assert!(strict.len() <= loose.len(), "session {hits:?}");

                // Every recorded match is later than the previous one
                for pair in strict.windows(2) {
                    assert!(hits[pair[1]].timestamp > hits[pair[0]].timestamp);
                }
            }

            let strict_counts = strict_plan.count_sessions(sessions.iter().map(Vec::as_slice));
            let loose_counts = loose_plan.count_sessions(sessions.iter().map(Vec::as_slice));
            for step in 0..pattern.len() {
                assert!(strict_counts[step] <= loose_counts[step]);
                if step > 0 {
                    assert!(strict_counts[step] <= strict_counts[step - 1]);
                }
            }
        }
    }
}
