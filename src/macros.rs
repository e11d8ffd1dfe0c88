// Macros to simplify rule and graph declarations in tests

macro_rules! rule {
    ($($body:literal $(~ $metric:expr)?),* $(,)?) => {
        vec![$(
            $crate::clause::ClauseSpec::from_body($body, None::<f64> $(.or(Some($metric as f64)))?)
        ),*]
    };
}

macro_rules! graph {
    ($direction:expr; $([$($rule:tt)*]),* $(,)?) => {{
        let direction = $crate::rule::Direction::from_sign($direction);
        let mut graph = $crate::graph::Graph::new();
        $(
            let clauses = $crate::rule::Rule::from_specs(&rule!($($rule)*), direction);
            graph.add_rule(clauses.into_clauses(), direction);
        )*
        graph
    }};
}
