use boolopt::{
    lit,
    postsolve::SatPostsolver,
    presolve::SatPresolver,
    probing::probe_and_find_equivalent_literals,
    solvers::{Dpll, Solve, SolveStatus},
    types::{Assignment, Lit},
    Parameters,
};

/// Checks that `solution` satisfies every clause of `original`
fn satisfies_all(original: &[Vec<Lit>], solution: &[bool]) {
    let assignment: Assignment = solution
        .iter()
        .enumerate()
        .map(|(idx, &val)| {
            let l = lit![u32::try_from(idx).unwrap()];
            if val {
                l
            } else {
                !l
            }
        })
        .collect();
    for clause in original {
        assert!(
            clause.iter().any(|&l| assignment.lit_is_true(l)),
            "clause {clause:?} violated by postsolved solution"
        );
    }
}

/// Presolves `original`, solves the reduced formula and checks that the
/// postsolved solution is a model of the original formula
fn presolve_solve_postsolve(num_vars: usize, original: &[Vec<Lit>]) {
    let mut postsolver = SatPostsolver::new(num_vars);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    for clause in original {
        presolver.add_clause(clause);
    }
    presolver.presolve().unwrap();
    presolver.check_invariants();

    let mut solver = Dpll::new();
    presolver.load_problem_into_sat_solver(&mut solver);
    assert_eq!(
        solver.reset_and_solve_with_assumptions(&[]),
        SolveStatus::Sat
    );
    let solution = postsolver.extract_and_postsolve(&solver);
    satisfies_all(original, &solution);
}

#[test]
fn trivial_subsumption() {
    let original = vec![vec![lit![0], lit![1]], vec![lit![0], lit![1], lit![2]]];
    let mut postsolver = SatPostsolver::new(3);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    for clause in &original {
        presolver.add_clause(clause);
    }
    presolver.process_all_clauses().unwrap();
    presolver.check_invariants();
    // only (x0 | x1) remains and pure subsumption leaves no postsolve entry
    assert_eq!(presolver.stats().num_clauses, 1);
    assert_eq!(postsolver.num_log_entries(), 0);

    presolve_solve_postsolve(3, &original);
}

#[test]
fn self_subsuming_resolution() {
    let mut postsolver = SatPostsolver::new(3);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    presolver.add_clause(&[lit![0], lit![1]]);
    presolver.add_clause(&[!lit![0], lit![1], lit![2]]);
    assert_eq!(presolver.occurrence_count(!lit![0]), 1);
    presolver.process_all_clauses().unwrap();
    presolver.check_invariants();
    // (~x0 | x1 | x2) was strengthened to (x1 | x2)
    assert_eq!(presolver.occurrence_count(!lit![0]), 0);
    assert_eq!(presolver.occurrence_count(lit![1]), 2);
    let stats = presolver.stats();
    assert_eq!(stats.num_clauses, 2);
    assert_eq!(stats.num_literals, 4);
}

#[test]
fn unit_bve() {
    // {x, a}, {~x, b}: eliminating x replaces both clauses with {a, b}
    let mut postsolver = SatPostsolver::new(3);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    presolver.add_clause(&[lit![0], lit![1]]);
    presolver.add_clause(&[!lit![0], lit![2]]);
    assert!(presolver.cross_product(lit![0]));
    presolver.check_invariants();

    let stats = presolver.stats();
    assert_eq!(stats.num_clauses, 1);
    assert_eq!(presolver.occurrence_count(lit![0]), 0);
    assert_eq!(presolver.occurrence_count(!lit![0]), 0);

    // load the reduced formula and check the reduced model {a, b} postsolves
    // to a model assigning x true
    let mut solver = Dpll::new();
    presolver.load_problem_into_sat_solver(&mut solver);
    // both deletions are in the log, with x and ~x as associated literals
    assert_eq!(postsolver.num_log_entries(), 2);
    assert_eq!(solver.num_variables(), 2);
    assert_eq!(
        solver.reset_and_solve_with_assumptions(&[]),
        SolveStatus::Sat
    );
    let solution = postsolver.extract_and_postsolve(&solver);
    assert!(solution[0]);
    satisfies_all(
        &[vec![lit![0], lit![1]], vec![!lit![0], lit![2]]],
        &solution,
    );
}

#[test]
fn blocked_clause() {
    // {x, a} with no ~x clause: x blocks the clause, which is removed
    let mut postsolver = SatPostsolver::new(2);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    presolver.add_clause(&[lit![0], lit![1]]);
    assert!(presolver.cross_product(lit![0]));
    presolver.check_invariants();
    assert_eq!(presolver.stats().num_clauses, 0);
    assert_eq!(postsolver.num_log_entries(), 1);

    // a reduced model unconstrained on x postsolves to x = true when a is
    // false
    let solution = postsolver.postsolve_solution(&[]);
    assert!(solution[0] || solution[1]);
}

#[test]
fn bve_respects_threshold() {
    let params = Parameters {
        presolve_bve_threshold: 3,
        ..Parameters::default()
    };
    let mut postsolver = SatPostsolver::new(6);
    let mut presolver = SatPresolver::new(&mut postsolver, &params);
    // x0 occurs twice in each polarity: 2 * 2 > 3 aborts the elimination
    presolver.add_clause(&[lit![0], lit![1]]);
    presolver.add_clause(&[lit![0], lit![2]]);
    presolver.add_clause(&[!lit![0], lit![3]]);
    presolver.add_clause(&[!lit![0], lit![4]]);
    assert!(!presolver.cross_product(lit![0]));
    assert_eq!(presolver.stats().num_clauses, 4);
    assert_eq!(postsolver.num_log_entries(), 0);
}

#[test]
fn strengthening_to_empty_clause_is_unsat() {
    let mut postsolver = SatPostsolver::new(1);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    presolver.add_clause(&[lit![0]]);
    presolver.add_clause(&[!lit![0]]);
    assert!(presolver.presolve().is_err());
}

#[test]
fn presolve_idempotence() {
    let original = vec![
        vec![lit![0], lit![1], lit![2]],
        vec![!lit![0], lit![2]],
        vec![lit![1], !lit![2], lit![3]],
        vec![!lit![3], lit![4]],
        vec![lit![0], !lit![4]],
    ];
    let mut postsolver = SatPostsolver::new(5);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    for clause in &original {
        presolver.add_clause(clause);
    }
    presolver.presolve().unwrap();
    presolver.check_invariants();
    let stats = presolver.stats();
    let log_len = postsolver.num_log_entries();

    // a second run reaches the same fixpoint without touching anything
    presolver.presolve().unwrap();
    presolver.check_invariants();
    assert_eq!(presolver.stats(), stats);
    assert_eq!(postsolver.num_log_entries(), log_len);
}

#[test]
fn postsolve_soundness_mixed_formula() {
    let original = vec![
        vec![lit![0], lit![1]],
        vec![lit![0], lit![1], lit![2]],
        vec![!lit![0], lit![3]],
        vec![!lit![1], lit![3], lit![4]],
        vec![lit![2], lit![5]],
        vec![!lit![5], lit![6]],
        vec![!lit![6], !lit![2], lit![0]],
        vec![lit![4], lit![5], lit![6]],
    ];
    presolve_solve_postsolve(7, &original);
}

#[test]
fn equivalent_literal_pipeline() {
    // x3 <=> x4 inside a satisfiable formula; presolve, load, probe, solve
    // and postsolve back to the original namespace
    let original = vec![
        vec![!lit![3], lit![4]],
        vec![!lit![4], lit![3]],
        vec![lit![0], lit![3]],
        vec![lit![1], !lit![3], lit![2]],
        vec![lit![2], lit![4], lit![0]],
    ];
    let mut postsolver = SatPostsolver::new(5);
    let mut presolver = SatPresolver::new(&mut postsolver, &Parameters::default());
    for clause in &original {
        presolver.add_clause(clause);
    }
    presolver.presolve().unwrap();
    let mut solver = Dpll::new();
    presolver.load_problem_into_sat_solver(&mut solver);

    let params = Parameters::default();
    probe_and_find_equivalent_literals(
        &mut solver,
        &mut postsolver,
        params.presolve_probing_deterministic_time_limit,
    );

    assert_eq!(
        solver.reset_and_solve_with_assumptions(&[]),
        SolveStatus::Sat
    );
    let solution = postsolver.extract_and_postsolve(&solver);
    satisfies_all(&original, &solution);
}
