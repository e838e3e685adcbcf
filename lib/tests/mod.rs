use crate::analysis::{
    fixed_point_forward, AnalysisOptions, AnalysisResult, WarningKind, WarningMessage,
};
use crate::collections::RangeTree;
use crate::domain::{
    AbstractPointer, Domain, Intervals, Phased, QueryChannel, RegionPermissions, Segments,
};
use crate::il::{constant, var, Cfa, Instruction, Linear, NumVar, ProgramPoint, Test};
use crate::numeric::{FiniteRange, Range};
use crate::Error;
use num_bigint::BigInt;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// 0 -> 1: i = 0
/// 1 -> 2: i <= last
/// 2 -> 3: store [base + i], 1
/// 3 -> 1: i = i + 1
/// 1 -> 4: i > last
fn fill_loop(i: &NumVar, base: &NumVar, last: i64) -> Cfa {
    let bound = Test::less_or_equal(&var(i), &constant(last));
    Cfa::from_transitions(
        0,
        4,
        vec![
            (0, 1, Instruction::assign(i.clone(), constant(0))),
            (1, 2, Instruction::test(bound.clone())),
            (
                2,
                3,
                Instruction::store(var(base).add(&var(i)), 1, constant(0)),
            ),
            (3, 1, Instruction::assign(i.clone(), var(i).add_constant(1))),
            (1, 4, Instruction::test(bound.not())),
        ],
    )
    .unwrap()
}

fn range_at<D: Domain>(result: &AnalysisResult<D>, vertex: usize, v: &NumVar) -> Range {
    result
        .state(&ProgramPoint::vertex_only(vertex))
        .unwrap()
        .query_range(&var(v))
        .unwrap()
}

#[test]
fn buffer_fill_stays_in_bounds() {
    let (state, _, base) = Segments::new(Phased::new(Intervals::new()))
        .add_symbolic_region("buffer", 16, RegionPermissions::ALL)
        .unwrap();
    let i = NumVar::fresh("i");
    let cfa = fill_loop(&i, &base, 15);

    let result = fixed_point_forward(&cfa, state, &AnalysisOptions::default()).unwrap();

    assert!(result.warnings().is_empty());
    let exit = range_at(&result, 4, &i);
    assert!(exit.contains(&BigInt::from(16)));
    assert!(!exit.contains(&BigInt::from(15)));
    assert_eq!(range_at(&result, 2, &i), Range::finite(0, 15).unwrap());
}

#[test]
fn buffer_overflow_is_reported_once() {
    let (state, _, base) = Segments::new(Intervals::new())
        .add_symbolic_region("buffer", 16, RegionPermissions::ALL)
        .unwrap();
    let i = NumVar::fresh("i");
    let cfa = fill_loop(&i, &base, 16);

    let result = fixed_point_forward(&cfa, state, &AnalysisOptions::default()).unwrap();

    let store = ProgramPoint::vertex_only(2);
    let warnings = result.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings.count_of(WarningKind::OutOfRegionAbove), 1);
    assert_eq!(warnings.count_of(WarningKind::OutOfRegionBelow), 0);
    assert!(warnings.first_iteration(&store).is_some());
    assert_eq!(warnings.get(&store).len(), 1);

    // The store is only continued with its in-bounds executions.
    assert_eq!(range_at(&result, 3, &i), Range::finite(0, 15).unwrap());

    let json: serde_json::Value = serde_json::from_str(&warnings.to_json().unwrap()).unwrap();
    assert_eq!(json[0]["point"]["vertex"], 2);
}

#[test]
fn decrementing_loop_reports_both_ends() {
    let (state, _, base) = Segments::new(Intervals::new())
        .add_symbolic_region("buffer", 16, RegionPermissions::ALL)
        .unwrap();
    let i = NumVar::fresh("i");
    let bound = Test::less_or_equal(&constant(-5), &var(&i));
    let cfa = Cfa::from_transitions(
        0,
        4,
        vec![
            (0, 1, Instruction::assign(i.clone(), constant(20))),
            (1, 2, Instruction::test(bound.clone())),
            (
                2,
                3,
                Instruction::store(var(&base).add(&var(&i)), 1, constant(0)),
            ),
            (3, 1, Instruction::assign(i.clone(), var(&i).add_constant(-1))),
            (1, 4, Instruction::test(bound.not())),
        ],
    )
    .unwrap();

    // The warnings raised at the store grow from one to two before the loop
    // is widened.
    let result = fixed_point_forward(&cfa, state, &AnalysisOptions::default()).unwrap();

    let store = ProgramPoint::vertex_only(2);
    let warnings = result.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings.get(&store).len(), 2);
    assert_eq!(warnings.count_of(WarningKind::OutOfRegionAbove), 1);
    assert_eq!(warnings.count_of(WarningKind::OutOfRegionBelow), 1);
    assert!(warnings
        .get(&store)
        .iter()
        .all(|message| matches!(message, WarningMessage::StateRestrictionWarning { .. })));
    assert!(warnings.first_iteration(&store).is_some());
    assert_eq!(range_at(&result, 2, &i), Range::finite(-5, 20).unwrap());
}

#[test]
fn evaluation_defects_carry_their_location() {
    let state = Segments::new(Phased::new(Intervals::new()));
    let x = NumVar::fresh("x");
    let unknown = NumVar::fresh("unknown");
    let cfa = Cfa::from_transitions(
        0,
        2,
        vec![
            (0, 1, Instruction::assign(x.clone(), constant(1))),
            (1, 2, Instruction::assign(x.clone(), var(&unknown).add_constant(1))),
        ],
    )
    .unwrap();

    let error = fixed_point_forward(&cfa, state, &AnalysisOptions::default()).unwrap_err();
    match &error {
        Error::Evaluation {
            point, instruction, ..
        } => {
            assert_eq!(point.vertex(), 1);
            assert!(instruction.contains("unknown"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(matches!(error.root_cause(), Error::UnknownVariable { .. }));
}

/// `Intervals`, counting how often it is asked to evaluate something.
#[derive(Clone, Debug)]
struct Counting {
    inner: Intervals,
    evals: Rc<Cell<usize>>,
}

impl Counting {
    fn wrap(&self, inner: Intervals) -> Counting {
        Counting {
            inner,
            evals: self.evals.clone(),
        }
    }
}

impl PartialEq for Counting {
    fn eq(&self, other: &Counting) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Counting {}

impl fmt::Display for Counting {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl QueryChannel for Counting {
    fn query_range(&self, expr: &Linear) -> Result<Range, Error> {
        self.inner.query_range(expr)
    }
}

impl Domain for Counting {
    fn eval(&self, instruction: &Instruction) -> Result<Counting, Error> {
        self.evals.set(self.evals.get() + 1);
        Ok(self.wrap(self.inner.eval(instruction)?))
    }

    fn join(&self, other: &Counting) -> Result<Counting, Error> {
        Ok(self.wrap(self.inner.join(&other.inner)?))
    }

    fn widen(&self, other: &Counting) -> Result<Counting, Error> {
        Ok(self.wrap(self.inner.widen(&other.inner)?))
    }

    fn subsumes(&self, other: &Counting) -> Result<bool, Error> {
        self.inner.subsumes(&other.inner)
    }

    fn introduce(&self, var: &NumVar, value: &Range) -> Result<Counting, Error> {
        Ok(self.wrap(self.inner.introduce(var, value)?))
    }

    fn project(&self, var: &NumVar) -> Result<Counting, Error> {
        Ok(self.wrap(self.inner.project(var)?))
    }

    fn substitute(&self, from: &NumVar, to: &NumVar) -> Result<Counting, Error> {
        Ok(self.wrap(self.inner.substitute(from, to)?))
    }
}

#[test]
fn repeated_test_does_not_reach_the_child_domain() {
    let x = NumVar::fresh("x");
    let cases = vec![
        (
            Range::finite(0, 3).unwrap(),
            Test::less_or_equal(&var(&x), &constant(5)),
        ),
        (Range::constant(3), Test::equal(&var(&x), &constant(3))),
        (
            Range::finite(0, 5).unwrap(),
            Test::not_equal(&var(&x), &constant(7)),
        ),
    ];

    for (range, test) in cases {
        let evals = Rc::new(Cell::new(0));
        let counting = Counting {
            inner: Intervals::new().introduce(&x, &range).unwrap(),
            evals: evals.clone(),
        };
        let test = Instruction::test(test);

        let first = Phased::new(counting).eval(&test).unwrap();
        assert!(evals.get() > 0);

        evals.set(0);
        let second = first.eval(&test).unwrap();
        assert_eq!(evals.get(), 0, "`{}` reached the child domain again", test);
        assert_eq!(second, first);
        assert_eq!(second.query_range(&var(&x)).unwrap(), range);
    }
}

#[test]
fn bounds_checks_on_a_phased_state() {
    let i = NumVar::fresh("i");
    let state = Phased::new(
        Intervals::new()
            .introduce(&i, &Range::finite(4, 8).unwrap())
            .unwrap(),
    );
    let pointer = AbstractPointer::absolute(var(&i));

    let below = pointer.calc_below_access(&state, &constant(0));
    assert!(matches!(below, Err(Error::Unreachable)));

    let above = pointer.calc_above_access(&state, &constant(6)).unwrap();
    assert_eq!(
        above.query_range(&var(&i)).unwrap(),
        Range::finite(6, 8).unwrap()
    );
}

#[test]
fn region_lookup_by_overlap() {
    let span = |low: i64, high: i64| FiniteRange::new(low, high).unwrap();
    let regions: RangeTree<&str> = vec![
        (span(0x1000, 0x1fff), "text"),
        (span(0x2000, 0x23ff), "data"),
        (span(0x8000, 0x8fff), "stack"),
    ]
    .into_iter()
    .collect();

    let mut hits = regions
        .search_overlaps(&span(0x1ff0, 0x2010))
        .into_iter()
        .map(|(_, name)| name)
        .collect::<Vec<&str>>();
    hits.sort();
    assert_eq!(hits, vec!["data", "text"]);
    assert!(!regions.has_overlaps(&span(0x2400, 0x7fff)));
    assert_eq!(regions.get(&span(0x8000, 0x8fff)), Some(&"stack"));
}
