use fluxir_core::{
    DataFlowEngine, Edge, LivenessAnalysis, LivenessFact, ReachingAnalysis, ReachingFact,
};
use pretty_assertions::assert_eq;

const COUNT_LOOP: &str = r"
func @count(%n) {
entry:
    jmp header
header:
    %i = phi [entry, 0], [body, %next]
    %more = lt %i, %n
    br %more, body, done
body:
    %next = add %i, 1
    jmp header
done:
    ret %i
}
";

#[test]
fn multiple_functions_parse_in_order() {
    let input = r"
func @first() {
entry:
    ret
}

func @second(%a, %b) {
entry:
    %sum = add %a, %b
    ret %sum
}
";
    let functions = fluxir_parser::parse(input).unwrap();
    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0].name, "first");
    assert_eq!(functions[1].name, "second");
    assert_eq!(functions[1].params.len(), 2);
}

#[test]
fn parsed_loop_runs_reaching_definitions() {
    // points: 0 jmp, 1 phi, 2 lt, 3 br, 4 add, 5 jmp, 6 ret
    let function = &fluxir_parser::parse(COUNT_LOOP).unwrap()[0];
    let mut engine =
        DataFlowEngine::new(ReachingAnalysis, ReachingFact::new(), ReachingFact::new());
    engine.run(function).unwrap();

    let mut expected = ReachingFact::new();
    for p in [1, 2, 4] {
        expected.insert(p);
    }
    // the loop-carried add reaches back through the header phi
    assert_eq!(engine.fact_at(1), expected);
    assert_eq!(engine.fact_at(6), expected);
}

#[test]
fn parsed_loop_runs_liveness() {
    let function = &fluxir_parser::parse(COUNT_LOOP).unwrap()[0];
    let mut engine =
        DataFlowEngine::new(LivenessAnalysis, LivenessFact::new(), LivenessFact::new());
    engine.run(function).unwrap();

    // on the back edge only %next feeds the phi
    let mut back_edge = LivenessFact::new();
    back_edge.insert(4);
    assert_eq!(*engine.edge_fact(Edge::Flow(1, 5)), back_edge);

    // nothing is live entering the loop from entry
    assert_eq!(*engine.edge_fact(Edge::Flow(1, 0)), LivenessFact::new());

    // both the counter and the compare are live across the branch
    let mut before_branch = LivenessFact::new();
    before_branch.insert(1);
    before_branch.insert(2);
    assert_eq!(engine.fact_at(2), before_branch);
}

#[test]
fn readme_example_parses_and_analyzes() {
    let input = r"
func @main(%a, %b) {
entry:
    %p = alloca
    %s = add %a, %b
    store %s, %p
    %c = lt %s, 10
    br %c, then, done
then:
    %t = load %p
    jmp done
done:
    %m = phi [then, %t], [entry, %s]
    ret %m
}
";
    let function = &fluxir_parser::parse(input).unwrap()[0];
    assert_eq!(function.body.blocks.len(), 3);
    assert_eq!(function.body.instruction_count(), 9);

    let mut engine =
        DataFlowEngine::new(ReachingAnalysis, ReachingFact::new(), ReachingFact::new());
    engine.run(function).unwrap();
    // points: 0 alloca, 1 add, 2 store, 3 lt, 4 br, 5 load, 6 jmp, 7 phi, 8 ret
    let mut at_ret = ReachingFact::new();
    for p in [0, 1, 3, 5, 7] {
        at_ret.insert(p);
    }
    assert_eq!(engine.fact_at(8), at_ret);
}

#[test]
fn pointer_program_parses_with_memory_ops() {
    let input = r"
func @swap_cell(%flag) {
entry:
    %cell = alloca
    %first = alloca
    %second = alloca
    %chosen = select %flag, %first, %second
    store %chosen, %cell
    %back = load %cell
    %elem = getelementptr %back, 0, 1
    %raw = cast %elem
    ret %raw
}
";
    let function = &fluxir_parser::parse(input).unwrap()[0];
    assert_eq!(function.body.instruction_count(), 9);
}
