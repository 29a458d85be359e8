use gravel::engine::validate;
use gravel::query::{Adjacency, Statement};
use gravel::{expr, CompileError, DataType, ExtensionContext, Query};

fn ext(starting: DataType) -> ExtensionContext {
    let mut ext = ExtensionContext {
        starting_type: Some(starting),
        ..Default::default()
    };
    ext.mark_types.insert("m".into(), DataType::Vertex);
    ext
}

fn after(starting: DataType, stmt: Statement) -> Result<DataType, CompileError> {
    validate(&[stmt], Some(&ext(starting))).map(|state| state.last_type)
}

const ALL_TYPES: [DataType; 7] = [
    DataType::Vertex,
    DataType::Edge,
    DataType::Count,
    DataType::Selection,
    DataType::Render,
    DataType::Path,
    DataType::Aggregation,
];

fn check(stmt: Statement, legal: &[(DataType, DataType)]) {
    for input in ALL_TYPES {
        let got = after(input, stmt.clone());
        match legal.iter().find(|(from, _)| *from == input) {
            Some((_, to)) => assert_eq!(got, Ok(*to), "{stmt:?} after {input:?}"),
            None => {
                let err = got.expect_err(&format!("{stmt:?} after {input:?} should fail"));
                assert_eq!(err.code(), "TypeMismatch", "{stmt:?} after {input:?}");
                assert_eq!(err.index(), Some(0));
            }
        }
    }
}

#[test]
fn adjacency_steps() {
    let elements = [(DataType::Vertex, DataType::Vertex), (DataType::Edge, DataType::Vertex)];
    check(Statement::Out(Adjacency::default()), &elements);
    check(Statement::In(Adjacency::default()), &elements);
    check(Statement::Both(Adjacency::labels(["x"])), &elements);

    let vertices = [(DataType::Vertex, DataType::Edge)];
    check(Statement::OutE(Adjacency::default()), &vertices);
    check(Statement::InE(Adjacency::default()), &vertices);
    check(Statement::BothE(Adjacency::default().or_null()), &vertices);
}

#[test]
fn filters_keep_the_element_type() {
    let keep = [(DataType::Vertex, DataType::Vertex), (DataType::Edge, DataType::Edge)];
    check(Statement::Has(expr::eq("name", "x")), &keep);
    check(Statement::HasLabel(vec!["l".into()]), &keep);
    check(Statement::HasKey(vec!["k".into()]), &keep);
    check(Statement::HasId(vec!["1".into()]), &keep);
    check(Statement::Distinct(vec![]), &keep);
    check(Statement::As("here".into()), &keep);
    check(Statement::Fields(vec!["name".into()]), &keep);
}

#[test]
fn positional_steps_accept_any_data() {
    let same: Vec<_> = ALL_TYPES.iter().map(|t| (*t, *t)).collect();
    check(Statement::Limit(3), &same);
    check(Statement::Skip(1), &same);
    check(Statement::Range { start: 1, stop: 4 }, &same);
    let counted: Vec<_> = ALL_TYPES.iter().map(|t| (*t, DataType::Count)).collect();
    check(Statement::Count, &counted);
}

#[test]
fn terminal_steps() {
    let to = |t| [(DataType::Vertex, t), (DataType::Edge, t)];
    check(Statement::Render("$.name".into()), &to(DataType::Render));
    check(Statement::Path, &to(DataType::Path));
    check(Statement::Aggregate(vec![expr::count("n")]), &to(DataType::Aggregation));
    check(Statement::Select(vec!["m".into()]), &to(DataType::Vertex));
    check(Statement::Select(vec!["m".into(), "m".into()]), &to(DataType::Selection));
}

#[test]
fn starts_only_on_empty_pipelines() {
    let twice = [Statement::V(vec![]), Statement::V(vec!["1".into()])];
    let err = validate(&twice, None).unwrap_err();
    assert_eq!(err.index(), Some(1));
    assert_eq!(err.code(), "TypeMismatch");

    let err = validate(&[Statement::Count], None).unwrap_err();
    assert_eq!(err.code(), "InvalidStart");

    let state = validate(&Query::e(["e1"]).into_statements(), None).unwrap();
    assert_eq!(state.last_type, DataType::Edge);
}

#[test]
fn argument_and_name_checks() {
    let cases: Vec<(Vec<Statement>, &str, usize)> = vec![
        (
            Query::all_vertices().has_label(Vec::<String>::new()).into_statements(),
            "EmptyArguments",
            1,
        ),
        (Query::all_vertices().mark("").into_statements(), "EmptyMarkName", 1),
        (Query::all_vertices().mark("_current").into_statements(), "ReservedMarkName", 1),
        (Query::all_vertices().mark("a.b").into_statements(), "InvalidMarkName", 1),
        (Query::all_vertices().out(["x"]).select(["nope"]).into_statements(), "UnknownMark", 2),
        (
            Query::all_vertices()
                .aggregate(vec![expr::count("dup"), expr::term("dup", "name", 0)])
                .into_statements(),
            "DuplicateAggregation",
            1,
        ),
        (
            Query::all_vertices().aggregate(vec![expr::histogram("h", "n", 0.0)]).into_statements(),
            "InvalidInterval",
            1,
        ),
        (
            Query::all_vertices()
                .aggregate(vec![expr::percentile("p", "n", vec![101.0])])
                .into_statements(),
            "InvalidPercentile",
            1,
        ),
        (Query::all_vertices().range(5, 2).into_statements(), "InvalidRange", 1),
    ];
    for (stmts, code, index) in cases {
        let err = validate(&stmts, None).unwrap_err();
        assert_eq!(err.code(), code, "{stmts:?}");
        assert_eq!(err.index(), Some(index), "{stmts:?}");
    }
}

#[test]
fn marks_carry_their_types() {
    let stmts = Query::all_vertices()
        .mark("p")
        .out_e(["knows"])
        .mark("k")
        .out(Vec::<String>::new())
        .select(["k"])
        .into_statements();
    let state = validate(&stmts, None).unwrap();
    assert_eq!(state.last_type, DataType::Edge);
    assert_eq!(state.mark_types["p"], DataType::Vertex);
    assert_eq!(state.mark_types["k"], DataType::Edge);

    let jump_with_emit = Query::all_vertices()
        .mark("p")
        .out_e(Vec::<String>::new())
        .jump("p", None, true)
        .into_statements();
    assert_eq!(validate(&jump_with_emit, None).unwrap_err().code(), "TypeMismatch");

    let jump = Query::all_vertices()
        .mark("p")
        .out_e(Vec::<String>::new())
        .jump("p", None, false)
        .into_statements();
    assert_eq!(validate(&jump, None).unwrap().last_type, DataType::Vertex);

    let conditional_jump = Query::all_vertices()
        .mark("p")
        .out_e(Vec::<String>::new())
        .jump("p", Some(expr::eq("_label", "nope")), false)
        .into_statements();
    let err = validate(&conditional_jump, None).unwrap_err();
    assert_eq!(err.code(), "TypeMismatch");

    let same_type = Query::all_vertices()
        .mark("p")
        .out(Vec::<String>::new())
        .jump("p", Some(expr::eq("_label", "person")), false)
        .into_statements();
    assert_eq!(validate(&same_type, None).unwrap().last_type, DataType::Vertex);
}

#[test]
fn empty_query_is_rejected() {
    assert_eq!(validate(&[], None).unwrap_err(), CompileError::EmptyQuery);
}
